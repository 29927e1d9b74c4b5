use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::archive::StageTally;
use crate::config::PipelineConfig;
use crate::model::StageRunManifest;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

/// Identity and clock of one stage invocation.
#[derive(Debug, Clone)]
pub struct StageRun {
    pub stage: &'static str,
    pub run_id: String,
    pub started_ts: DateTime<Utc>,
    pub started_at: String,
}

impl StageRun {
    pub fn start(stage: &'static str) -> Self {
        let started_ts = Utc::now();
        Self {
            stage,
            run_id: format!("run-{}", utc_compact_string(started_ts)),
            started_ts,
            started_at: now_utc_string(),
        }
    }

    pub fn run_day(&self) -> String {
        self.started_ts.format("%Y%m%d").to_string()
    }

    pub fn manifest_path(&self, config: &PipelineConfig) -> PathBuf {
        config.manifest_dir.join(format!(
            "{}_run_{}.json",
            self.stage,
            utc_compact_string(self.started_ts)
        ))
    }

    pub fn finish(
        &self,
        config: &PipelineConfig,
        tally: StageTally,
        paths: BTreeMap<String, String>,
        extra_counts: BTreeMap<String, usize>,
        notes: Vec<String>,
    ) -> Result<StageRunManifest> {
        let status = if tally.counts.retained == 0 {
            "completed"
        } else {
            "completed_with_retained_units"
        };

        let manifest = StageRunManifest {
            manifest_version: 1,
            run_id: self.run_id.clone(),
            stage: self.stage.to_string(),
            status: status.to_string(),
            started_at: self.started_at.clone(),
            updated_at: now_utc_string(),
            paths,
            counts: tally.counts,
            extra_counts,
            warnings: tally.warnings,
            notes,
        };

        let path = self.manifest_path(config);
        write_json_pretty(&path, &manifest)?;
        info!(path = %path.display(), stage = self.stage, "wrote stage run manifest");

        Ok(manifest)
    }
}
