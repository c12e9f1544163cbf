//! Wiring shared by the `cumulus` binary: tracing, configuration and the
//! derivative pipeline built on top of Postgres.

use anyhow::{Context, Result};
use cumulus_core::{Config, SettingsProvider};
use cumulus_db::{FileRepository, PgFileRepository, PgSettings};
use cumulus_processing::{
    DerivativePipeline, FfmpegFrameExtractor, GenerationOutcome, SkipReason, WorkerPool,
};
use cumulus_storage::PolicyHandlerProvider;
use std::sync::Arc;
use std::time::Duration;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Everything a command needs.
pub struct App {
    pub config: Config,
    pub files: Arc<dyn FileRepository>,
    pub pipeline: DerivativePipeline,
}

impl App {
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = cumulus_db::connect(&config).await?;
        let settings: Arc<dyn SettingsProvider> = Arc::new(PgSettings::new(pool.clone()));
        let files: Arc<dyn FileRepository> = Arc::new(PgFileRepository::new(pool));

        let handlers = Arc::new(PolicyHandlerProvider::new(
            &config.local_storage_path,
            Duration::from_secs(config.slave_request_timeout_secs),
        ));
        let frames = Arc::new(
            FfmpegFrameExtractor::new(config.ffmpeg_path.clone())
                .context("Failed to set up frame extraction")?,
        );

        let pipeline = DerivativePipeline::new(
            Arc::new(WorkerPool::new(settings.clone())),
            settings,
            files.clone(),
            handlers,
            frames,
        )
        .with_node_mode(config.node_mode);

        tracing::info!(
            node_mode = %config.node_mode,
            local_storage_path = %config.local_storage_path,
            "Derivative pipeline ready"
        );

        Ok(Self {
            config,
            files,
            pipeline,
        })
    }
}

/// JSON summary of a generation outcome.
pub fn outcome_json(outcome: &GenerationOutcome) -> serde_json::Value {
    match outcome {
        GenerationOutcome::Generated(derivative) => serde_json::json!({
            "status": "generated",
            "name": derivative.name,
            "bytes": derivative.bytes,
            "dimensions": derivative.dimensions.map(|(w, h)| [w, h]),
        }),
        GenerationOutcome::Skipped(reason) => serde_json::json!({
            "status": "skipped",
            "reason": match reason {
                SkipReason::Unsupported => "unsupported",
                SkipReason::EmptySource => "empty_source",
                SkipReason::TooLarge => "too_large",
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_processing::Derivative;

    #[test]
    fn test_outcome_json_generated() {
        let outcome = GenerationOutcome::Generated(Derivative {
            name: "a.png._thumb".to_string(),
            bytes: 512,
            dimensions: Some((800, 600)),
        });
        let value = outcome_json(&outcome);
        assert_eq!(value["status"], "generated");
        assert_eq!(value["dimensions"], serde_json::json!([800, 600]));
    }

    #[test]
    fn test_outcome_json_skipped() {
        let value = outcome_json(&GenerationOutcome::Skipped(SkipReason::TooLarge));
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason"], "too_large");
    }
}
