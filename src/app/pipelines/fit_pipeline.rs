use crate::app::output::{format_number, write_table};
use crate::app::trial_csv::parse_trials;
use crate::core::fitting::fit_multiple_participants;
use crate::core::{ConfigProvider, Participant, Pipeline, Storage, TableOutput};
use crate::domain::model::{Params, ParticipantFit};
use crate::utils::error::Result;

const HEADER: [&str; 10] = [
    "participant",
    "model",
    "n_trials",
    "alpha",
    "alpha_stable",
    "alpha_volatile",
    "beta",
    "loss",
    "iterations",
    "converged",
];

/// Reads trial data, fits every participant and writes the `fit_results` table.
pub struct FitPipeline<S: Storage, C: ConfigProvider> {
    pub(crate) storage: S,
    pub(crate) config: C,
}

impl<S: Storage, C: ConfigProvider> FitPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }
}

fn fit_row(fit: &ParticipantFit) -> Vec<String> {
    let outcome = &fit.outcome;
    let (alpha, alpha_stable, alpha_volatile) = match outcome.params {
        Params::SameAlpha { alpha, .. } => (format_number(alpha), String::new(), String::new()),
        Params::AlphaDifference {
            alpha_stable,
            alpha_volatile,
            ..
        } => (
            String::new(),
            format_number(alpha_stable),
            format_number(alpha_volatile),
        ),
    };

    vec![
        fit.participant.clone(),
        outcome.params.model_kind().to_string(),
        fit.n_trials.to_string(),
        alpha,
        alpha_stable,
        alpha_volatile,
        format_number(outcome.params.beta()),
        format_number(outcome.loss),
        outcome.iterations.to_string(),
        outcome.converged.to_string(),
    ]
}

/// Participants whose best fit stopped without meeting the gradient tolerance,
/// whether from `max_iter`, a stalled line search or no descent direction.
pub fn unconverged(fits: &[ParticipantFit]) -> Vec<&str> {
    fits.iter()
        .filter(|f| !f.outcome.converged)
        .map(|f| f.participant.as_str())
        .collect()
}

/// Builds the `fit_results` table and its summary.
pub fn fits_to_table(fits: &[ParticipantFit]) -> Result<TableOutput> {
    let converged = fits.iter().filter(|f| f.outcome.converged).count();
    let mean_loss = if fits.is_empty() {
        None
    } else {
        let mean = fits.iter().map(|f| f.outcome.loss).sum::<f64>() / fits.len() as f64;
        mean.is_finite().then_some(mean)
    };

    let summary = serde_json::json!({
        "n_participants": fits.len(),
        "n_converged": converged,
        "mean_loss": mean_loss,
        "generated_at": chrono::Utc::now().to_rfc3339(),
    });

    Ok(TableOutput {
        header: HEADER.iter().map(|h| h.to_string()).collect(),
        rows: fits.iter().map(fit_row).collect(),
        records: serde_json::to_value(fits)?,
        summary: Some(summary),
    })
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for FitPipeline<S, C> {
    type Input = Vec<Participant>;

    fn describe(&self, input: &Self::Input) -> String {
        let trials: usize = input.iter().map(|p| p.data.n_trials()).sum();
        format!("{} participants, {} trials", input.len(), trials)
    }

    async fn extract(&self) -> Result<Vec<Participant>> {
        tracing::debug!("Reading trial data from: {}", self.config.input_path());
        let bytes = self.storage.read_file(self.config.input_path()).await?;
        parse_trials(&bytes, self.config.model_kind())
    }

    async fn transform(&self, data: Vec<Participant>) -> Result<TableOutput> {
        let options = self.config.fit_options();
        tracing::debug!(
            "Fitting {} model with {} starts per participant, {} workers",
            self.config.model_kind(),
            options.n_inits,
            self.config.workers()
        );

        let fits = fit_multiple_participants(data, options, self.config.workers()).await?;

        let not_converged = unconverged(&fits);
        if !not_converged.is_empty() {
            tracing::warn!(
                "⚠️ {} participant(s) did not converge: {}",
                not_converged.len(),
                not_converged.join(", ")
            );
        }

        fits_to_table(&fits)
    }

    async fn load(&self, result: TableOutput) -> Result<String> {
        write_table(
            &self.storage,
            self.config.output_path(),
            "fit_results",
            &result,
            self.config.output_formats(),
            self.config.bundle(),
        )
        .await
    }
}
