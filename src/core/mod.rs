pub mod engine;
pub mod fitting;
pub mod landscape;
pub mod optimizer;
pub mod recovery;
pub mod rl_model;
pub mod schedule;
pub mod utility;

pub use crate::domain::model::{Participant, TableOutput, TaskData, TrialBlock};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
