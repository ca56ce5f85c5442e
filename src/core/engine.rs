use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct FitEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> FitEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting model fitting run");
        self.monitor.log_stats("start");

        // Extract
        tracing::info!("📥 Loading input...");
        let input = self.pipeline.extract().await?;
        tracing::info!("📥 Loaded {}", self.pipeline.describe(&input));
        self.monitor.log_stats("extract");

        // Transform
        tracing::info!("⚙️ Fitting...");
        let output = self.pipeline.transform(input).await?;
        tracing::info!("⚙️ Produced {} result rows", output.rows.len());
        self.monitor.log_stats("transform");

        // Load
        tracing::info!("💾 Writing results...");
        let output_path = self.pipeline.load(output).await?;
        tracing::info!("💾 Output saved to: {}", output_path);
        self.monitor.log_stats("load");

        self.monitor.log_final_stats();
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::TableOutput;
    use crate::utils::error::FitError;
    use std::sync::Mutex;

    struct RecordingPipeline {
        calls: Mutex<Vec<&'static str>>,
        fail_transform: bool,
    }

    #[async_trait::async_trait]
    impl Pipeline for RecordingPipeline {
        type Input = Vec<u32>;

        fn describe(&self, input: &Self::Input) -> String {
            format!("{} items", input.len())
        }

        async fn extract(&self) -> Result<Self::Input> {
            self.calls.lock().unwrap().push("extract");
            Ok(vec![1, 2, 3])
        }

        async fn transform(&self, data: Self::Input) -> Result<TableOutput> {
            self.calls.lock().unwrap().push("transform");
            if self.fail_transform {
                return Err(FitError::optimization("diverged"));
            }
            Ok(TableOutput {
                header: vec!["value".to_string()],
                rows: data.iter().map(|v| vec![v.to_string()]).collect(),
                ..TableOutput::default()
            })
        }

        async fn load(&self, result: TableOutput) -> Result<String> {
            self.calls.lock().unwrap().push("load");
            Ok(format!("{} rows", result.rows.len()))
        }
    }

    #[tokio::test]
    async fn test_run_calls_phases_in_order() {
        let engine = FitEngine::new(RecordingPipeline {
            calls: Mutex::new(Vec::new()),
            fail_transform: false,
        });
        let path = engine.run().await.unwrap();
        assert_eq!(path, "3 rows");
        assert_eq!(
            *engine.pipeline.calls.lock().unwrap(),
            vec!["extract", "transform", "load"]
        );
    }

    #[tokio::test]
    async fn test_run_stops_at_failing_phase() {
        let engine = FitEngine::new_with_monitoring(
            RecordingPipeline {
                calls: Mutex::new(Vec::new()),
                fail_transform: true,
            },
            true,
        );
        assert!(engine.run().await.is_err());
        assert_eq!(*engine.pipeline.calls.lock().unwrap(), vec!["extract", "transform"]);
    }
}
