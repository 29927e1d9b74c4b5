use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use super::store::{TEXT_INDEX_WEIGHTS, article_id_for};
use super::*;
use crate::model::{ArticleMetadata, ArticleRecord};

fn envelope(title: &str, location: &str, paragraphs: &[&str]) -> RecordEnvelope {
    let record = ArticleRecord::new(
        ArticleMetadata {
            date_published: NaiveDate::from_ymd_opt(2008, 8, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            juche_year: 97,
            article_url: Some(format!(
                "http://www.kcna.co.jp/item/2008/200808/news01/{title}.html"
            )),
            html_modified: None,
            title: title.to_string(),
            location: Some(location.to_string()),
            news_service: Some("KCNA".to_string()),
        },
        paragraphs.iter().map(|p| p.to_string()).collect(),
    )
    .expect("valid record");
    RecordEnvelope::wrap(record, "2008-08-02 10:00:00".to_string())
}

fn raw(envelope: &RecordEnvelope) -> Vec<u8> {
    serde_json::to_vec_pretty(envelope).expect("json")
}

#[test]
fn insert_is_idempotent_per_source_file() {
    let mut store = ArticleStore::open_in_memory().expect("store");
    let record = envelope("Meeting Held", "Pyongyang", &["Officials attended."]);
    let bytes = raw(&record);

    let first = store.insert("20080801-03ee.json", &bytes, &record).expect("insert");
    assert!(matches!(first, InsertOutcome::Inserted(_)));
    assert_eq!(first.article_id(), article_id_for("20080801-03ee.json", &bytes));
    assert!(first.article_id().starts_with("kcna-"));

    let second = store.insert("20080801-03ee.json", &bytes, &record).expect("reinsert");
    assert_eq!(second, InsertOutcome::AlreadyPresent(first.article_id().to_string()));
    assert_eq!(store.count_articles().expect("count"), 1);
}

#[test]
fn title_match_outranks_body_only_match() {
    let mut store = ArticleStore::open_in_memory().expect("store");
    let body_only = envelope(
        "Farm Output Rises",
        "Pyongyang",
        &["Reporters also asked about the satellite launch."],
    );
    let in_title = envelope("Satellite Launch Reported", "Pyongyang", &["The event was covered."]);
    store.insert("a.json", &raw(&body_only), &body_only).expect("insert a");
    store.insert("b.json", &raw(&in_title), &in_title).expect("insert b");

    assert!(!store.text_index_exists().expect("exists"));
    store.ensure_text_index().expect("index");
    store.ensure_text_index().expect("index again");
    assert!(store.text_index_exists().expect("exists"));

    let hits = store.search("satellite launch", 10).expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].title, "Satellite Launch Reported");
    assert!(hits[0].score > hits[1].score);
    assert_eq!(hits[0].location.as_deref(), Some("Pyongyang"));

    assert!(store.search("kimchi", 10).expect("search").is_empty());
}

#[test]
fn location_is_searchable() {
    let mut store = ArticleStore::open_in_memory().expect("store");
    let record = envelope("Delegation Arrives", "Havana", &["A delegation arrived."]);
    store.insert("c.json", &raw(&record), &record).expect("insert");
    store.ensure_text_index().expect("index");

    let hits = store.search("Havana", 5).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "A delegation arrived.");
}

#[test]
fn phrase_quoting_escapes_embedded_quotes() {
    assert_eq!(fts_phrase("U.S."), "\"U.S.\"");
    assert_eq!(fts_phrase("say \"no\""), "\"say \"\"no\"\"\"");
    assert_eq!(TEXT_INDEX_WEIGHTS[1], ("title", 10.0));
}

#[test]
fn rejected_write_is_transient() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("kcna.sqlite");
    drop(ArticleStore::open(&db_path).expect("create store"));

    let mut read_only = ArticleStore::open_existing(&db_path).expect("reopen");
    let record = envelope("Meeting Held", "Pyongyang", &["Officials attended."]);
    let err = read_only
        .insert("x.json", &raw(&record), &record)
        .expect_err("read-only store");
    assert!(matches!(err, StageError::TransientIo(_)));
}

fn stage_config(root: &Path) -> PipelineConfig {
    let config = PipelineConfig::from_root(root);
    fs::create_dir_all(&config.import_inbox).expect("import inbox");
    config
}

#[test]
fn stage_archives_by_run_day_and_retains_bad_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = stage_config(dir.path());

    let good = envelope("Meeting Held", "Pyongyang", &["Officials attended."]);
    fs::write(config.import_inbox.join("20080801-03ee.json"), raw(&good)).expect("good");
    fs::write(config.import_inbox.join("20080801-04ee.json"), "{not json").expect("bad");
    fs::write(
        config.import_inbox.join("20080801-05ee.json"),
        r#"{"app":"x","data_type":"text","data_source":"kcna_article","timestamp":"t","version":1,
            "data":{"metadata":{"juche_year":97,"title":""},"text":["body"]}}"#,
    )
    .expect("empty title");

    let manifest = run_with_config(&config).expect("import run");
    assert_eq!(manifest.counts.seen, 3);
    assert_eq!(manifest.counts.succeeded, 1);
    assert_eq!(manifest.counts.retained, 2);
    assert_eq!(manifest.extra_counts["inserted"], 1);
    assert_eq!(manifest.status, "completed_with_retained_units");

    let archive_days: Vec<_> = fs::read_dir(config.import_archive_root())
        .expect("archive root")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    assert_eq!(archive_days.len(), 1);
    assert!(archive_days[0].join("20080801-03ee.json").is_file());
    assert_eq!(
        archive_days[0].file_name().and_then(|n| n.to_str()).map(str::len),
        Some(8)
    );

    assert!(config.import_inbox.join("20080801-04ee.json").is_file());
    assert!(config.import_inbox.join("20080801-05ee.json").is_file());

    let store = ArticleStore::open_existing(&config.db_path).expect("store");
    assert_eq!(store.count_articles().expect("count"), 1);
    assert!(store.text_index_exists().expect("index"));
    assert_eq!(store.search("officials", 5).expect("search").len(), 1);
}

#[test]
fn reimporting_the_same_file_does_not_duplicate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = stage_config(dir.path());
    let good = envelope("Meeting Held", "Pyongyang", &["Officials attended."]);
    let unit = config.import_inbox.join("20080801-03ee.json");

    fs::write(&unit, raw(&good)).expect("first copy");
    run_with_config(&config).expect("first run");

    fs::write(&unit, raw(&good)).expect("second copy");
    let manifest = run_with_config(&config).expect("second run");
    assert_eq!(manifest.extra_counts["already_present"], 1);
    assert_eq!(manifest.extra_counts["articles_total"], 1);
    assert!(!unit.exists());
}

#[test]
fn missing_data_root_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::from_root(&dir.path().join("absent"));
    assert!(run_with_config(&config).is_err());
}
