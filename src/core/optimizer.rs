//! Box-constrained L-BFGS.
//!
//! Each iteration takes a two-loop-recursion quasi-Newton step, backtracks until
//! the Armijo condition holds, and clips the result back into the box. The loop
//! keeps going while it is on its first iteration, or while it is under
//! `max_iter` and the projected gradient norm is at least `tol`.

use std::collections::VecDeque;

const ARMIJO_C1: f64 = 1e-4;
const BACKTRACK_FACTOR: f64 = 0.5;
const MAX_LINE_SEARCH_STEPS: usize = 40;
const CURVATURE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeOptions {
    pub max_iter: usize,
    pub tol: f64,
    pub history: usize,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-3,
            history: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeResult {
    pub x: Vec<f64>,
    pub value: f64,
    pub grad_norm: f64,
    pub iterations: usize,
    pub converged: bool,
}

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *xi = xi.clamp(lo, hi);
    }
}

/// Gradient with the components that push against an active bound removed.
pub fn projected_gradient(x: &[f64], grad: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(grad)
        .zip(bounds)
        .map(|((&xi, &gi), &(lo, hi))| {
            if (xi <= lo && gi > 0.0) || (xi >= hi && gi < 0.0) {
                0.0
            } else {
                gi
            }
        })
        .collect()
}

fn two_loop(grad: &[f64], memory: &VecDeque<Correction>) -> Vec<f64> {
    let mut q = grad.to_vec();
    let mut alphas = Vec::with_capacity(memory.len());

    for c in memory.iter().rev() {
        let a = c.rho * dot(&c.s, &q);
        for (qi, yi) in q.iter_mut().zip(&c.y) {
            *qi -= a * yi;
        }
        alphas.push(a);
    }

    let gamma = match memory.back() {
        Some(last) => dot(&last.s, &last.y) / dot(&last.y, &last.y),
        None => 1.0 / norm(grad).max(1.0),
    };
    for qi in q.iter_mut() {
        *qi *= gamma;
    }

    for (c, a) in memory.iter().zip(alphas.into_iter().rev()) {
        let b = c.rho * dot(&c.y, &q);
        for (qi, si) in q.iter_mut().zip(&c.s) {
            *qi += si * (a - b);
        }
    }

    q.iter().map(|v| -v).collect()
}

/// 移除會把參數推出邊界的方向分量
fn mask_direction(direction: &mut [f64], x: &[f64], bounds: &[(f64, f64)]) {
    for ((di, &xi), &(lo, hi)) in direction.iter_mut().zip(x).zip(bounds) {
        if (xi <= lo && *di < 0.0) || (xi >= hi && *di > 0.0) {
            *di = 0.0;
        }
    }
}

fn bounds_are_valid(bounds: &[(f64, f64)], dim: usize) -> bool {
    bounds.len() == dim
        && bounds
            .iter()
            .all(|&(lo, hi)| !lo.is_nan() && !hi.is_nan() && lo <= hi)
}

fn failed(x: Vec<f64>) -> OptimizeResult {
    OptimizeResult {
        x,
        value: f64::NAN,
        grad_norm: f64::NAN,
        iterations: 0,
        converged: false,
    }
}

/// Minimizes `objective` inside the box `bounds`. Malformed bounds (wrong length,
/// `lo > hi` or NaN) and a non-finite start give a NaN result.
pub fn minimize<F>(
    objective: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    options: &OptimizeOptions,
) -> OptimizeResult
where
    F: Fn(&[f64]) -> (f64, Vec<f64>),
{
    let mut x = x0.to_vec();
    if !bounds_are_valid(bounds, x.len()) {
        tracing::debug!("Rejecting malformed bounds {:?}", bounds);
        return failed(x);
    }
    project(&mut x, bounds);

    let (mut value, mut grad) = objective(&x);
    if !value.is_finite() || grad.iter().any(|g| !g.is_finite()) {
        tracing::debug!("Objective is not finite at the starting point {:?}", x);
        return failed(x);
    }

    let mut memory: VecDeque<Correction> = VecDeque::with_capacity(options.history);
    let mut iterations = 0;

    loop {
        let grad_norm = norm(&projected_gradient(&x, &grad, bounds));
        if iterations > 0 && (iterations >= options.max_iter || grad_norm < options.tol) {
            break;
        }

        let mut direction = two_loop(&grad, &memory);
        mask_direction(&mut direction, &x, bounds);

        if dot(&direction, &grad) >= 0.0 {
            // 不是下降方向，清空曲率記憶改走最陡下降
            memory.clear();
            direction = two_loop(&grad, &memory);
            mask_direction(&mut direction, &x, bounds);
            if dot(&direction, &grad) >= 0.0 {
                break;
            }
        }

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_LINE_SEARCH_STEPS {
            let mut candidate: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(xi, di)| xi + step * di)
                .collect();
            project(&mut candidate, bounds);

            let (new_value, new_grad) = objective(&candidate);
            let moved: Vec<f64> = candidate.iter().zip(&x).map(|(c, xi)| c - xi).collect();
            if new_value.is_finite()
                && new_grad.iter().all(|g| g.is_finite())
                && new_value <= value + ARMIJO_C1 * dot(&grad, &moved)
            {
                accepted = Some((candidate, new_value, new_grad, moved));
                break;
            }
            step *= BACKTRACK_FACTOR;
        }

        let Some((next_x, next_value, next_grad, s)) = accepted else {
            tracing::debug!("Line search stalled after {} iterations", iterations);
            break;
        };

        iterations += 1;
        if norm(&s) == 0.0 {
            break;
        }

        let y: Vec<f64> = next_grad.iter().zip(&grad).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > CURVATURE_EPS {
            if memory.len() == options.history.max(1) {
                memory.pop_front();
            }
            memory.push_back(Correction { s, y, rho: 1.0 / sy });
        } else {
            memory.clear();
        }

        x = next_x;
        value = next_value;
        grad = next_grad;
    }

    let grad_norm = norm(&projected_gradient(&x, &grad, bounds));
    OptimizeResult {
        x,
        value,
        grad_norm,
        iterations,
        converged: grad_norm < options.tol,
    }
}
