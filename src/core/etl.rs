use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

/// Drives extract → transform → load for one batch run.
pub struct CategorizerEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> CategorizerEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("🚀 Starting expense processing...");
        self.monitor.log_stats("Start");

        // Extract
        let batch = self.pipeline.extract().await?;
        self.monitor.log_stats("Extract");

        // Transform
        let result = self.pipeline.transform(batch).await?;
        self.monitor.log_stats("Transform");

        let summary = &result.summary;
        tracing::info!(
            "📊 Summary: {} rows, {} categorized, {} skipped, {} errors, {} deductible (total {})",
            summary.total_rows,
            summary.categorized,
            summary.skipped,
            summary.errors,
            summary.deductible,
            summary.deductible_total
        );
        for (category, count) in &summary.by_category {
            tracing::info!("  🏷️ {}: {}", category, count);
        }

        // Load
        tracing::info!("💾 Saving results...");
        let output_path = self.pipeline.load(result).await?;
        self.monitor.log_stats("Load");
        self.monitor.log_final_stats();

        tracing::info!("✓ Processing complete. Results saved to {}", output_path);
        tracing::info!("⏱️ Total execution time: {:.2?}", started.elapsed());
        Ok(output_path)
    }
}
