use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::cli::{DetectionArgs, PipelineArgs};

pub const ARCHIVE_DIR_NAME: &str = "archive";
pub const NON_ENGLISH_DIR_NAME: &str = "unprocessed_es";

/// Filesystem layout and collaborators for one pipeline invocation. Every
/// stage receives this explicitly instead of reading process-wide constants.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_root: PathBuf,
    pub mirror_root: PathBuf,
    pub queuer_inbox: PathBuf,
    pub extract_inbox: PathBuf,
    pub import_inbox: PathBuf,
    pub db_path: PathBuf,
    pub manifest_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub credentials_path: Option<PathBuf>,
    pub timeout: Duration,
    pub url_root: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            timeout: Duration::from_secs(10),
            url_root: "http://www.kcna.co.jp".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_root(data_root: &Path) -> Self {
        Self {
            data_root: data_root.to_path_buf(),
            mirror_root: data_root.join("mirror").join("www.kcna.co.jp"),
            queuer_inbox: data_root.join("inbox_queuer"),
            extract_inbox: data_root.join("inbox_json"),
            import_inbox: data_root.join("inbox_db"),
            db_path: data_root.join("kcna.sqlite"),
            manifest_dir: data_root.join("manifests"),
            lock_dir: data_root.join("locks"),
            detection: DetectionConfig::default(),
        }
    }

    pub fn from_args(args: &PipelineArgs, detection: Option<&DetectionArgs>) -> Self {
        let mut config = Self::from_root(&args.data_root);

        if let Some(path) = &args.mirror_root {
            config.mirror_root = path.clone();
        }
        if let Some(path) = &args.db_path {
            config.db_path = path.clone();
        }
        if let Some(path) = &args.manifest_dir {
            config.manifest_dir = path.clone();
        }
        if let Some(path) = &args.lock_dir {
            config.lock_dir = path.clone();
        }
        if let Some(detection) = detection {
            config.detection = DetectionConfig {
                credentials_path: detection.language_credentials.clone(),
                timeout: Duration::from_secs(detection.detect_timeout_secs),
                url_root: detection.url_root.trim_end_matches('/').to_string(),
            };
        }

        config
    }

    pub fn queuer_archive(&self) -> PathBuf {
        self.queuer_inbox.join(ARCHIVE_DIR_NAME)
    }

    pub fn extract_archive(&self) -> PathBuf {
        self.extract_inbox.join(ARCHIVE_DIR_NAME)
    }

    pub fn non_english_bucket(&self) -> PathBuf {
        self.extract_inbox.join(NON_ENGLISH_DIR_NAME)
    }

    /// Import archives are partitioned by the calendar day of the run.
    pub fn import_archive(&self, run_day: &str) -> PathBuf {
        self.import_inbox.join(ARCHIVE_DIR_NAME).join(run_day)
    }

    pub fn import_archive_root(&self) -> PathBuf {
        self.import_inbox.join(ARCHIVE_DIR_NAME)
    }

    /// Fails when a directory that must be provisioned externally is absent.
    pub fn require_dir(&self, label: &str, path: &Path) -> Result<()> {
        if !path.is_dir() {
            bail!("required {label} directory missing: {}", path.display());
        }
        Ok(())
    }
}
