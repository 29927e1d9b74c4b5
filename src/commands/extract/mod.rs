use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::{info, info_span};

use crate::archive::{Inbox, UnitOutcome};
use crate::cli::ExtractArgs;
use crate::commands::run_manifest::StageRun;
use crate::config::{DetectionConfig, PipelineConfig};
use crate::error::StageError;
use crate::lock::StageLock;
use crate::model::{RecordEnvelope, StageRunManifest};
use crate::util::{RECORD_TIMESTAMP_FORMAT, now_local_naive, write_json_atomic};

mod article;
mod html_text;
mod language;

pub use article::{ArticleExtractor, SourceFile};
pub use language::{
    DetectorCredentials, HttpLanguageDetector, LanguageDetector, LanguageFilter, LanguageVerdict,
};

pub const STAGE: &str = "extract";

pub fn run(args: ExtractArgs) -> Result<()> {
    let config = PipelineConfig::from_args(&args.pipeline, Some(&args.detection));
    let filter = build_language_filter(&config.detection)?;
    run_with_config(&config, filter.as_ref())?;
    Ok(())
}

/// The filter is only active when a credential file is configured. An
/// unreadable credential file aborts the run.
pub fn build_language_filter(detection: &DetectionConfig) -> Result<Option<LanguageFilter>> {
    let Some(path) = &detection.credentials_path else {
        return Ok(None);
    };

    let credentials = DetectorCredentials::load(path)?;
    let detector = HttpLanguageDetector::new(credentials, detection.timeout)?;
    info!(
        credentials = %path.display(),
        timeout_secs = detection.timeout.as_secs(),
        "language filter enabled"
    );
    Ok(Some(LanguageFilter::new(Box::new(detector))))
}

pub fn run_with_config(
    config: &PipelineConfig,
    filter: Option<&LanguageFilter>,
) -> Result<StageRunManifest> {
    config.require_dir("data root", &config.data_root)?;

    let _lock = StageLock::acquire(&config.lock_dir, STAGE)?;
    let run = StageRun::start(STAGE);
    let _span = info_span!("extract", run_id = %run.run_id).entered();

    info!(
        inbox = %config.extract_inbox.display(),
        output = %config.import_inbox.display(),
        language_filter = filter.is_some(),
        "starting extract"
    );

    let extractor = ArticleExtractor::new(&config.detection.url_root)?;
    let inbox = Inbox {
        stage: STAGE,
        dir: config.extract_inbox.clone(),
        archive_dir: config.extract_archive(),
        extensions: &["htm", "html"],
    };
    let bucket = config.non_english_bucket();

    let mut language_unknown = 0usize;
    let tally = inbox.process(|unit| {
        let (outcome, verdict) =
            extract_unit(unit, &extractor, filter, &config.import_inbox, &bucket);
        if verdict == Some(LanguageVerdict::Unknown) {
            language_unknown += 1;
        }
        outcome
    })?;

    info!(
        processed = tally.counts.succeeded,
        total = tally.counts.seen,
        "processed HTML articles into JSON"
    );

    let paths = BTreeMap::from([
        ("extract_inbox".to_string(), config.extract_inbox.display().to_string()),
        ("import_inbox".to_string(), config.import_inbox.display().to_string()),
        ("non_english_bucket".to_string(), bucket.display().to_string()),
    ]);
    let extra_counts = BTreeMap::from([
        ("non_english".to_string(), tally.counts.diverted),
        ("language_unknown".to_string(), language_unknown),
    ]);
    let mut notes = vec![
        "Article text recovered from the '>> <date> Juche <year>' marker block.".to_string(),
    ];
    if filter.is_some() {
        notes.push("Titles were screened by the language filter.".to_string());
    }

    run.finish(config, tally, paths, extra_counts, notes)
}

/// Returns the filter verdict alongside the outcome when the filter ran.
fn extract_unit(
    unit: &Path,
    extractor: &ArticleExtractor,
    filter: Option<&LanguageFilter>,
    output_dir: &Path,
    non_english_bucket: &Path,
) -> (UnitOutcome, Option<LanguageVerdict>) {
    let envelope = match read_and_extract(unit, extractor) {
        Ok(envelope) => envelope,
        Err(err) => return (UnitOutcome::Retained(err), None),
    };

    let verdict = filter.map(|filter| filter.classify(&envelope.data.metadata.title));
    match verdict {
        Some(LanguageVerdict::Spanish) => {
            let outcome = UnitOutcome::Diverted {
                bucket: non_english_bucket.to_path_buf(),
                reason: "title detected as es".to_string(),
            };
            return (outcome, verdict);
        }
        Some(LanguageVerdict::Unknown) => {
            let outcome = UnitOutcome::Retained(StageError::TransientIo(format!(
                "language detection inconclusive for title [{}]",
                envelope.data.metadata.title
            )));
            return (outcome, verdict);
        }
        Some(LanguageVerdict::English) | None => {}
    }

    let outcome = match write_record(unit, &envelope, output_dir) {
        Ok(path) => {
            info!(source = %unit.display(), output = %path.display(), "wrote article record");
            UnitOutcome::Succeeded
        }
        Err(err) => UnitOutcome::Retained(err),
    };
    (outcome, verdict)
}

pub fn read_and_extract(
    unit: &Path,
    extractor: &ArticleExtractor,
) -> Result<RecordEnvelope, StageError> {
    let raw = fs::read(unit).map_err(|err| StageError::io("read", unit, err))?;
    let html = String::from_utf8_lossy(&raw);

    let modified = fs::metadata(unit)
        .and_then(|meta| meta.modified())
        .ok()
        .map(|ts| DateTime::<Local>::from(ts).naive_local());

    let file_name = unit
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            StageError::MalformedInput(format!("invalid file name: {}", unit.display()))
        })?;

    let record = extractor.extract(
        &html,
        &SourceFile {
            file_name,
            modified,
        },
    )?;

    Ok(RecordEnvelope::wrap(
        record,
        now_local_naive().format(RECORD_TIMESTAMP_FORMAT).to_string(),
    ))
}

fn write_record(
    unit: &Path,
    envelope: &RecordEnvelope,
    output_dir: &Path,
) -> Result<PathBuf, StageError> {
    let stem = unit
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            StageError::MalformedInput(format!("invalid file name: {}", unit.display()))
        })?;

    fs::create_dir_all(output_dir).map_err(|err| StageError::io("create", output_dir, err))?;
    let path = output_dir.join(format!("{stem}.json"));
    write_json_atomic(&path, envelope).map_err(|err| StageError::TransientIo(format!("{err:#}")))?;
    Ok(path)
}
