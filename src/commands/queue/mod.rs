use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, info_span, warn};

use crate::archive::{Inbox, UnitOutcome};
use crate::cli::QueueArgs;
use crate::commands::run_manifest::StageRun;
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::lock::StageLock;
use crate::model::StageRunManifest;

mod filename;
#[cfg(test)]
mod tests;

pub use filename::{ArticleName, FilenameNormalizer, NameError};

pub const STAGE: &str = "queue";

pub fn run(args: QueueArgs) -> Result<()> {
    let config = PipelineConfig::from_args(&args.pipeline, None);
    run_with_config(&config)?;
    Ok(())
}

pub fn run_with_config(config: &PipelineConfig) -> Result<StageRunManifest> {
    config.require_dir("data root", &config.data_root)?;
    config.require_dir("queuer inbox", &config.queuer_inbox)?;
    config.require_dir("mirror root", &config.mirror_root)?;

    let _lock = StageLock::acquire(&config.lock_dir, STAGE)?;
    let run = StageRun::start(STAGE);
    let _span = info_span!("queue", run_id = %run.run_id).entered();

    info!(
        inbox = %config.queuer_inbox.display(),
        mirror = %config.mirror_root.display(),
        "starting queue"
    );

    let normalizer = FilenameNormalizer::new()?;
    let queuer = ChangeQueuer::new(config, &normalizer);
    let inbox = Inbox {
        stage: STAGE,
        dir: config.queuer_inbox.clone(),
        archive_dir: config.queuer_archive(),
        extensions: &["log"],
    };

    let mut referenced = 0usize;
    let mut copied = 0usize;
    let mut unrecognized = 0usize;
    let mut committed_articles = 0usize;

    let tally = inbox.process(|log_path| match queuer.queue_log(log_path) {
        Ok(batch) => {
            referenced += batch.referenced;
            copied += batch.copied;
            unrecognized += batch.unrecognized;

            if batch.is_complete() {
                committed_articles += batch.referenced;
                UnitOutcome::Succeeded
            } else {
                UnitOutcome::Retained(StageError::TransientIo(format!(
                    "{} of {} articles failed to copy",
                    batch.referenced - batch.copied,
                    batch.referenced
                )))
            }
        }
        Err(err) => UnitOutcome::Retained(err),
    })?;

    info!(
        articles = committed_articles,
        logs = tally.counts.seen,
        "processed articles out of diff logs"
    );

    let paths = BTreeMap::from([
        ("queuer_inbox".to_string(), config.queuer_inbox.display().to_string()),
        ("mirror_root".to_string(), config.mirror_root.display().to_string()),
        ("extract_inbox".to_string(), config.extract_inbox.display().to_string()),
    ]);
    let extra_counts = BTreeMap::from([
        ("articles_referenced".to_string(), referenced),
        ("articles_copied".to_string(), copied),
        ("articles_committed".to_string(), committed_articles),
        ("filenames_unrecognized".to_string(), unrecognized),
    ]);

    run.finish(
        config,
        tally,
        paths,
        extra_counts,
        vec!["Diff logs are archived only when every referenced article copied.".to_string()],
    )
}

/// Outcome of copying every article referenced by one diff log.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct LogBatch {
    pub referenced: usize,
    pub copied: usize,
    pub unrecognized: usize,
}

impl LogBatch {
    pub fn is_complete(&self) -> bool {
        self.referenced == self.copied
    }
}

pub struct ChangeQueuer<'a> {
    mirror_root: &'a Path,
    target_dir: &'a Path,
    normalizer: &'a FilenameNormalizer,
}

impl<'a> ChangeQueuer<'a> {
    pub fn new(config: &'a PipelineConfig, normalizer: &'a FilenameNormalizer) -> Self {
        Self {
            mirror_root: &config.mirror_root,
            target_dir: &config.extract_inbox,
            normalizer,
        }
    }

    /// Resolves the article entries of a diff log to `(mirror path, canonical
    /// name)` pairs. Lines that are not article diff entries are ignored.
    pub fn articles_in(&self, log_text: &str) -> (Vec<(PathBuf, ArticleName)>, usize) {
        let mut articles = Vec::new();
        let mut unrecognized = 0usize;

        for line in log_text.lines() {
            let Some(entry) = self.normalizer.parse_diff_line(line) else {
                continue;
            };

            match self.normalizer.normalize(&entry.path) {
                Ok(name) => {
                    debug!(
                        action = ?entry.action,
                        path = %entry.path,
                        canonical = %name.canonical,
                        era = name.era.as_str(),
                        day = %format!("{}-{}-{}", name.year, name.month, name.day),
                        "resolved diff entry"
                    );
                    articles.push((self.mirror_root.join(&entry.path), name));
                }
                Err(NameError::NotArticlePath(_)) => {}
                Err(err @ NameError::UnrecognizedFilename { .. }) => {
                    unrecognized += 1;
                    warn!(error = %err, "skipping diff entry");
                }
            }
        }

        (articles, unrecognized)
    }

    pub fn queue_log(&self, log_path: &Path) -> Result<LogBatch, StageError> {
        let raw = fs::read(log_path).map_err(|err| StageError::io("read", log_path, err))?;
        let text = String::from_utf8_lossy(&raw);

        let (articles, unrecognized) = self.articles_in(&text);
        let mut batch = LogBatch {
            referenced: articles.len(),
            copied: 0,
            unrecognized,
        };

        for (source, name) in &articles {
            let target = self.target_dir.join(&name.canonical);
            match copy_article(source, self.target_dir, &target) {
                Ok(()) => {
                    batch.copied += 1;
                    info!(
                        source = %source.display(),
                        target = %target.display(),
                        copied = batch.copied,
                        "copied article to extract inbox"
                    );
                }
                Err(err) => warn!(error = %err, "article copy failed"),
            }
        }

        Ok(batch)
    }
}

/// Copies through a `.tmp` sibling and renames it into place, so the extract
/// stage never sees a partial article. The source modification time is kept
/// because the extract stage reports it as `html_modified`.
fn copy_article(source: &Path, target_dir: &Path, target: &Path) -> Result<(), StageError> {
    fs::create_dir_all(target_dir).map_err(|err| StageError::io("create", target_dir, err))?;

    let mut tmp_name = target
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| {
            StageError::MalformedInput(format!("no file name: {}", target.display()))
        })?;
    tmp_name.push(".tmp");
    let tmp_path = target.with_file_name(tmp_name);

    fs::copy(source, &tmp_path).map_err(|err| StageError::io("copy", source, err))?;

    let modified = fs::metadata(source)
        .and_then(|meta| meta.modified())
        .map_err(|err| StageError::io("stat", source, err))?;
    OpenOptions::new()
        .write(true)
        .open(&tmp_path)
        .and_then(|file| file.set_modified(modified))
        .map_err(|err| StageError::io("set mtime", &tmp_path, err))?;

    fs::rename(&tmp_path, target).map_err(|err| StageError::io("move", &tmp_path, err))?;
    Ok(())
}
