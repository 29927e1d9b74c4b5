use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::archive::{Inbox, UnitState, count_units};
use crate::cli::StatusArgs;
use crate::commands::import::ArticleStore;
use crate::config::PipelineConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct StageStatus {
    pub stage: &'static str,
    pub pending: usize,
    pub archived: usize,
    pub diverted: usize,
}

#[derive(Debug, Clone)]
pub struct StoreStatus {
    pub articles: i64,
    pub text_index: bool,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let config = PipelineConfig::from_args(&args.pipeline, None);

    info!(data_root = %config.data_root.display(), "status requested");
    if !config.data_root.is_dir() {
        warn!(path = %config.data_root.display(), "data root missing");
    }

    for stage in stage_statuses(&config) {
        info!(
            stage = stage.stage,
            pending = stage.pending,
            archived = stage.archived,
            diverted = stage.diverted,
            "stage status"
        );
    }

    if let Some(unit) = &args.unit {
        for (stage, state) in unit_states(&config, unit) {
            match state {
                Some(state) => info!(stage, unit = %unit, state = ?state, "unit state"),
                None => info!(stage, unit = %unit, "unit not present"),
            }
        }
    }

    match store_status(&config)? {
        Some(store) => info!(
            path = %config.db_path.display(),
            articles = store.articles,
            text_index = store.text_index,
            "article store status"
        ),
        None => warn!(path = %config.db_path.display(), "article store missing"),
    }

    Ok(())
}

fn import_archive_days(config: &PipelineConfig) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(config.import_archive_root()) else {
        return Vec::new();
    };
    let mut days: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    days.sort();
    days
}

/// Where `file_name` sits in each stage, if anywhere.
pub fn unit_states(
    config: &PipelineConfig,
    file_name: &str,
) -> Vec<(&'static str, Option<UnitState>)> {
    let queue = Inbox {
        stage: "queue",
        dir: config.queuer_inbox.clone(),
        archive_dir: config.queuer_archive(),
        extensions: &["log"],
    };
    let extract = Inbox {
        stage: "extract",
        dir: config.extract_inbox.clone(),
        archive_dir: config.extract_archive(),
        extensions: &["htm", "html"],
    };
    let import_state = import_archive_days(config)
        .into_iter()
        .map(|day| Inbox {
            stage: "import",
            dir: config.import_inbox.clone(),
            archive_dir: day,
            extensions: &["json"],
        })
        .find_map(|inbox| inbox.unit_state(file_name, &[]))
        .or_else(|| {
            config
                .import_inbox
                .join(file_name)
                .is_file()
                .then_some(UnitState::Pending)
        });

    vec![
        (queue.stage, queue.unit_state(file_name, &[])),
        (
            extract.stage,
            extract.unit_state(file_name, &[config.non_english_bucket()]),
        ),
        ("import", import_state),
    ]
}

pub fn stage_statuses(config: &PipelineConfig) -> Vec<StageStatus> {
    let import_archived = import_archive_days(config)
        .iter()
        .map(|day| count_units(day))
        .sum();

    vec![
        StageStatus {
            stage: "queue",
            pending: count_units(&config.queuer_inbox),
            archived: count_units(&config.queuer_archive()),
            diverted: 0,
        },
        StageStatus {
            stage: "extract",
            pending: count_units(&config.extract_inbox),
            archived: count_units(&config.extract_archive()),
            diverted: count_units(&config.non_english_bucket()),
        },
        StageStatus {
            stage: "import",
            pending: count_units(&config.import_inbox),
            archived: import_archived,
            diverted: 0,
        },
    ]
}

pub fn store_status(config: &PipelineConfig) -> Result<Option<StoreStatus>> {
    if !config.db_path.is_file() {
        return Ok(None);
    }

    let store = ArticleStore::open_existing(&config.db_path)?;
    Ok(Some(StoreStatus {
        articles: store.count_articles().unwrap_or(0),
        text_index: store.text_index_exists()?,
    }))
}
