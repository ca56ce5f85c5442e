pub mod output;
pub mod pipelines;
pub mod trial_csv;
