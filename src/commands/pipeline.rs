use anyhow::Result;
use tracing::info;

use crate::cli::RunArgs;
use crate::commands::{extract, import, queue};
use crate::config::PipelineConfig;
use crate::model::StageRunManifest;

pub fn run(args: RunArgs) -> Result<()> {
    let config = PipelineConfig::from_args(&args.pipeline, Some(&args.detection));
    let filter = extract::build_language_filter(&config.detection)?;
    run_all(&config, filter.as_ref())?;
    Ok(())
}

/// Runs the three stages in order. Retained units never stop the chain; a
/// fatal error in one stage skips the stages after it.
pub fn run_all(
    config: &PipelineConfig,
    filter: Option<&extract::LanguageFilter>,
) -> Result<Vec<StageRunManifest>> {
    let manifests = vec![
        queue::run_with_config(config)?,
        extract::run_with_config(config, filter)?,
        import::run_with_config(config)?,
    ];

    for manifest in &manifests {
        info!(
            stage = %manifest.stage,
            status = %manifest.status,
            succeeded = manifest.counts.succeeded,
            retained = manifest.counts.retained,
            "stage finished"
        );
    }

    Ok(manifests)
}
