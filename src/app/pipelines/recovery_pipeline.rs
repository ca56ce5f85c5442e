use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::app::output::{format_number, write_table};
use crate::config::toml_config::{RecoveryConfig, StudyKind};
use crate::core::recovery::{
    run_parameter_recovery, run_parameter_recovery_with_difference, DifferenceSummary,
    RecoverySummary,
};
use crate::core::{Pipeline, Storage, TableOutput};
use crate::utils::error::{FitError, Result};
use crate::utils::validation::validate_required_field;

/// True reward probabilities for the simulated task.
#[derive(Debug, Clone)]
pub struct RewardSchedules {
    /// The whole task for a grid study, the stable block for a difference study.
    pub primary: Vec<f64>,
    pub volatile: Option<Vec<f64>>,
}

/// Simulates participants from known parameters, refits them and writes the `recovery` table.
pub struct RecoveryPipeline<S: Storage> {
    pub(crate) storage: S,
    pub(crate) config: RecoveryConfig,
}

impl<S: Storage> RecoveryPipeline<S> {
    pub fn new(storage: S, config: RecoveryConfig) -> Self {
        Self { storage, config }
    }

    fn seed(&self) -> u64 {
        match self.config.study.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                tracing::info!("🎲 No seed configured, using {}", seed);
                seed
            }
        }
    }

    fn summary_json(&self, seed: u64, study: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "study": self.config.study.name,
            "kind": self.config.study.kind,
            "seed": seed,
            "summary": study,
            "generated_at": chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn run_grid(
        &self,
        schedules: &RewardSchedules,
        rng: &mut StdRng,
        seed: u64,
    ) -> Result<TableOutput> {
        let grid = validate_required_field("grid", &self.config.grid)?;
        let rows = run_parameter_recovery(
            &grid.alphas,
            &grid.betas,
            &schedules.primary,
            self.config.fit_options(),
            self.config.workers(),
            rng,
        )
        .await?;

        let summary = RecoverySummary::from_rows(&rows);
        tracing::info!(
            "📈 Recovery correlations: alpha={:?} beta={:?}",
            summary.alpha_correlation,
            summary.beta_correlation
        );

        Ok(TableOutput {
            header: ["simulated_alpha", "simulated_beta", "recovered_alpha", "recovered_beta"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        format_number(r.simulated_alpha),
                        format_number(r.simulated_beta),
                        format_number(r.recovered_alpha),
                        format_number(r.recovered_beta),
                    ]
                })
                .collect(),
            records: serde_json::to_value(&rows)?,
            summary: Some(self.summary_json(seed, serde_json::to_value(&summary)?)),
        })
    }

    async fn run_difference(
        &self,
        schedules: &RewardSchedules,
        rng: &mut StdRng,
        seed: u64,
    ) -> Result<TableOutput> {
        let diff = validate_required_field("difference", &self.config.difference)?;
        let volatile = validate_required_field("volatile_schedule", &schedules.volatile)?;
        let rows = run_parameter_recovery_with_difference(
            &diff.stable_alphas,
            &diff.volatile_alphas,
            &diff.betas,
            &schedules.primary,
            volatile,
            self.config.fit_options(),
            self.config.workers(),
            rng,
        )
        .await?;

        let summary = DifferenceSummary::from_rows(&rows);
        if let Some(share) = summary.share_volatile_higher {
            tracing::info!(
                "📈 Volatile learning rate higher for {:.1}% of subjects",
                share * 100.0
            );
        }

        Ok(TableOutput {
            header: [
                "simulated_alpha_stable",
                "simulated_alpha_volatile",
                "simulated_beta",
                "alpha_stable",
                "alpha_volatile",
                "inverse_temperature",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        format_number(r.simulated_alpha_stable),
                        format_number(r.simulated_alpha_volatile),
                        format_number(r.simulated_beta),
                        format_number(r.alpha_stable),
                        format_number(r.alpha_volatile),
                        format_number(r.inverse_temperature),
                    ]
                })
                .collect(),
            records: serde_json::to_value(&rows)?,
            summary: Some(self.summary_json(seed, serde_json::to_value(&summary)?)),
        })
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for RecoveryPipeline<S> {
    type Input = RewardSchedules;

    fn describe(&self, input: &Self::Input) -> String {
        match &input.volatile {
            Some(volatile) => format!(
                "{} stable + {} volatile trials for {} subjects",
                input.primary.len(),
                volatile.len(),
                self.config.n_subjects()
            ),
            None => format!(
                "{} trials for {} subjects",
                input.primary.len(),
                self.config.n_subjects()
            ),
        }
    }

    async fn extract(&self) -> Result<RewardSchedules> {
        let primary = self.config.schedule.probabilities("schedule")?;
        let volatile = match self.config.study.kind {
            StudyKind::Grid => None,
            StudyKind::Difference => {
                let section = self.config.volatile_schedule.as_ref().ok_or_else(|| {
                    FitError::MissingConfigError {
                        field: "volatile_schedule".to_string(),
                    }
                })?;
                Some(section.probabilities("volatile_schedule")?)
            }
        };
        Ok(RewardSchedules { primary, volatile })
    }

    async fn transform(&self, data: RewardSchedules) -> Result<TableOutput> {
        let seed = self.seed();
        let mut rng = StdRng::seed_from_u64(seed);

        match self.config.study.kind {
            StudyKind::Grid => self.run_grid(&data, &mut rng, seed).await,
            StudyKind::Difference => self.run_difference(&data, &mut rng, seed).await,
        }
    }

    async fn load(&self, result: TableOutput) -> Result<String> {
        write_table(
            &self.storage,
            self.config.output_path(),
            "recovery",
            &result,
            &self.config.load.output_formats,
            self.config.bundle(),
        )
        .await
    }
}
