use crate::domain::model::{FitOptions, ModelKind, TableOutput};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn model_kind(&self) -> ModelKind;
    fn fit_options(&self) -> FitOptions;
    fn workers(&self) -> usize;
    fn output_formats(&self) -> &[String];
    fn bundle(&self) -> bool;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    type Input: Send;

    /// Summary of the extracted input for progress logs.
    fn describe(&self, input: &Self::Input) -> String;

    async fn extract(&self) -> Result<Self::Input>;
    async fn transform(&self, data: Self::Input) -> Result<TableOutput>;
    async fn load(&self, result: TableOutput) -> Result<String>;
}
