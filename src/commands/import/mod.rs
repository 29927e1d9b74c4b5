use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{info, info_span};

use crate::archive::{Inbox, UnitOutcome};
use crate::cli::ImportArgs;
use crate::commands::run_manifest::StageRun;
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::lock::StageLock;
use crate::model::{RecordEnvelope, StageRunManifest};

mod store;
#[cfg(test)]
mod tests;

pub use store::{ArticleStore, InsertOutcome, SearchHit, fts_phrase};

pub const STAGE: &str = "import";

pub fn run(args: ImportArgs) -> Result<()> {
    let config = PipelineConfig::from_args(&args.pipeline, None);
    run_with_config(&config)?;
    Ok(())
}

pub fn run_with_config(config: &PipelineConfig) -> Result<StageRunManifest> {
    config.require_dir("data root", &config.data_root)?;

    let _lock = StageLock::acquire(&config.lock_dir, STAGE)?;
    let run = StageRun::start(STAGE);
    let _span = info_span!("import", run_id = %run.run_id).entered();

    let mut store = ArticleStore::open(&config.db_path)?;
    let archive_dir = config.import_archive(&run.run_day());

    info!(
        inbox = %config.import_inbox.display(),
        db = %config.db_path.display(),
        archive = %archive_dir.display(),
        "starting import"
    );

    let inbox = Inbox {
        stage: STAGE,
        dir: config.import_inbox.clone(),
        archive_dir: archive_dir.clone(),
        extensions: &["json"],
    };

    let mut inserted = 0usize;
    let mut already_present = 0usize;

    let tally = inbox.process(|unit| match import_unit(&mut store, unit) {
        Ok(outcome) => {
            let fresh = matches!(outcome, InsertOutcome::Inserted(_));
            if fresh {
                inserted += 1;
            } else {
                already_present += 1;
            }
            info!(
                source = %unit.display(),
                article_id = outcome.article_id(),
                fresh,
                "stored article"
            );
            UnitOutcome::Succeeded
        }
        Err(err) => UnitOutcome::Retained(err),
    })?;

    info!(
        inserted,
        total = tally.counts.seen,
        "inserted json articles into store"
    );

    store.ensure_text_index()?;
    let articles_total = store.count_articles()?;

    let paths = BTreeMap::from([
        ("import_inbox".to_string(), config.import_inbox.display().to_string()),
        ("archive".to_string(), archive_dir.display().to_string()),
        ("db_path".to_string(), config.db_path.display().to_string()),
    ]);
    let extra_counts = BTreeMap::from([
        ("inserted".to_string(), inserted),
        ("already_present".to_string(), already_present),
        ("articles_total".to_string(), articles_total.max(0) as usize),
    ]);

    run.finish(
        config,
        tally,
        paths,
        extra_counts,
        vec!["Weighted text index ensured after the batch.".to_string()],
    )
}

pub fn import_unit(store: &mut ArticleStore, unit: &Path) -> Result<InsertOutcome, StageError> {
    let raw = fs::read(unit).map_err(|err| StageError::io("read", unit, err))?;
    let envelope = RecordEnvelope::from_json(&raw)?;

    let source_file = unit
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            StageError::MalformedInput(format!("invalid file name: {}", unit.display()))
        })?;

    store.insert(source_file, &raw, &envelope)
}
