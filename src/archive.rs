use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::error::StageError;
use crate::model::StageCounts;
use crate::util::ensure_directory;

/// Where a unit lives on disk. A unit that failed in an earlier run and was
/// retained is indistinguishable from `Pending`: it sits in the inbox and is
/// retried next time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnitState {
    Pending,
    Archived,
    Diverted,
}

/// Result of running a stage transform on a single unit.
#[derive(Debug)]
pub enum UnitOutcome {
    Succeeded,
    Diverted { bucket: PathBuf, reason: String },
    Retained(StageError),
}

#[derive(Debug, Clone)]
pub struct Inbox {
    pub stage: &'static str,
    pub dir: PathBuf,
    pub archive_dir: PathBuf,
    pub extensions: &'static [&'static str],
}

#[derive(Debug, Default)]
pub struct StageTally {
    pub counts: StageCounts,
    pub warnings: Vec<String>,
}

impl StageTally {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

impl Inbox {
    /// Sorted list of units waiting in the inbox. Subdirectories (archives,
    /// buckets), hidden files and in-flight `.tmp` files are never units.
    pub fn pending_units(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            debug!(stage = self.stage, path = %self.dir.display(), "inbox absent; nothing pending");
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?;

        let mut units = Vec::new();
        for entry in entries {
            let entry =
                entry.with_context(|| format!("failed to read entry in {}", self.dir.display()))?;
            let path = entry.path();

            if !entry
                .file_type()
                .with_context(|| format!("failed to inspect file type: {}", path.display()))?
                .is_file()
            {
                continue;
            }

            let hidden = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with('.'))
                .unwrap_or(true);
            if hidden {
                continue;
            }

            if self.accepts(&path) {
                units.push(path);
            }
        }

        units.sort();
        Ok(units)
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|wanted| ext.eq_ignore_ascii_case(wanted))
            })
            .unwrap_or(false)
    }

    pub fn unit_state(&self, file_name: &str, divert_dirs: &[PathBuf]) -> Option<UnitState> {
        if self.dir.join(file_name).is_file() {
            return Some(UnitState::Pending);
        }
        if self.archive_dir.join(file_name).is_file() {
            return Some(UnitState::Archived);
        }
        if divert_dirs.iter().any(|dir| dir.join(file_name).is_file()) {
            return Some(UnitState::Diverted);
        }
        None
    }

    /// Runs `handle` on every pending unit and applies the archive policy:
    /// success moves the unit into the archive, a divert moves it into the
    /// named bucket, a failure leaves it exactly where it was.
    pub fn process<F>(&self, mut handle: F) -> Result<StageTally>
    where
        F: FnMut(&Path) -> UnitOutcome,
    {
        let mut tally = StageTally::default();

        for unit in self.pending_units()? {
            tally.counts.seen += 1;

            match handle(&unit) {
                UnitOutcome::Succeeded => match archive_unit(&unit, &self.archive_dir) {
                    Ok(dest) => {
                        tally.counts.succeeded += 1;
                        debug!(
                            stage = self.stage,
                            from = %unit.display(),
                            to = %dest.display(),
                            "archived unit"
                        );
                    }
                    Err(err) => {
                        tally.counts.retained += 1;
                        tally.warn(format!(
                            "{} unit {} processed but not archived: {err}",
                            self.stage,
                            unit.display()
                        ));
                    }
                },
                UnitOutcome::Diverted { bucket, reason } => match archive_unit(&unit, &bucket) {
                    Ok(dest) => {
                        tally.counts.diverted += 1;
                        info!(
                            stage = self.stage,
                            unit = %unit.display(),
                            to = %dest.display(),
                            reason = %reason,
                            "diverted unit"
                        );
                    }
                    Err(err) => {
                        tally.counts.retained += 1;
                        tally.warn(format!(
                            "{} unit {} could not be diverted: {err}",
                            self.stage,
                            unit.display()
                        ));
                    }
                },
                UnitOutcome::Retained(err) => {
                    tally.counts.retained += 1;
                    tally.warn(format!(
                        "{} unit {} retained ({}): {err}",
                        self.stage,
                        unit.display(),
                        err.kind()
                    ));
                }
            }
        }

        info!(
            stage = self.stage,
            seen = tally.counts.seen,
            succeeded = tally.counts.succeeded,
            diverted = tally.counts.diverted,
            retained = tally.counts.retained,
            "stage batch finished"
        );

        Ok(tally)
    }
}

/// Moves `unit` into `dir`, creating `dir` on first use. An existing file of
/// the same name in `dir` is replaced.
pub fn archive_unit(unit: &Path, dir: &Path) -> Result<PathBuf, StageError> {
    let file_name = unit
        .file_name()
        .ok_or_else(|| StageError::MalformedInput(format!("no file name: {}", unit.display())))?;

    ensure_directory(dir).map_err(|err| StageError::TransientIo(format!("{err:#}")))?;

    let dest = dir.join(file_name);
    fs::rename(unit, &dest).map_err(|err| StageError::io("move", unit, err))?;
    Ok(dest)
}

pub fn count_units(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .count()
}
