pub mod fit_pipeline;
pub mod recovery_pipeline;

pub use fit_pipeline::FitPipeline;
pub use recovery_pipeline::{RecoveryPipeline, RewardSchedules};
