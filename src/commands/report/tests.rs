use std::fs;

use super::*;
use crate::model::{ArticleMetadata, ArticleRecord, RecordEnvelope};

fn envelope(title: &str, url: &str, body: &str) -> RecordEnvelope {
    let record = ArticleRecord::new(
        ArticleMetadata {
            date_published: None,
            juche_year: 98,
            article_url: Some(url.to_string()),
            html_modified: None,
            title: title.to_string(),
            location: Some("Pyongyang".to_string()),
            news_service: Some("KCNA".to_string()),
        },
        vec![body.to_string()],
    )
    .expect("record");
    RecordEnvelope::wrap(record, "2009-01-01 00:00:00".to_string())
}

fn seeded_config(root: &Path) -> PipelineConfig {
    let config = PipelineConfig::from_root(root);
    let mut store = ArticleStore::open(&config.db_path).expect("store");
    for (source, record) in [
        (
            "a.json",
            envelope("Cuba Delegation Arrives", "http://x/a.html", "Talks with Cuba."),
        ),
        (
            "b.json",
            envelope("Cuba Delegation Arrives", "http://x/a.html", "Talks with Cuba again."),
        ),
        (
            "c.json",
            envelope("Farm Report", "http://x/c.html", "Visitors from Cuba and Laos."),
        ),
        ("d.json", envelope("Weather", "http://x/d.html", "Rain expected.")),
    ] {
        let raw = serde_json::to_vec(&record).expect("json");
        store.insert(source, &raw, &record).expect("insert");
    }
    store.ensure_text_index().expect("index");
    config
}

#[test]
fn countries_file_yields_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("countries.txt");
    fs::write(&path, "BE|Belgium\nCU|Cuba\n\nLA|Laos\n").expect("countries");

    let countries = load_countries(&path).expect("load");
    assert_eq!(countries, vec!["Belgium", "Cuba", "Laos"]);
}

#[test]
fn missing_or_malformed_countries_file_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(load_countries(&dir.path().join("absent.txt")).is_err());

    let path = dir.path().join("countries.txt");
    fs::write(&path, "BE Belgium\n").expect("countries");
    assert!(load_countries(&path).is_err());
}

#[test]
fn mentions_are_ranked_and_deduped_by_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = seeded_config(dir.path());
    let store = ArticleStore::open_existing(&config.db_path).expect("store");

    let rows = collect_mentions(&store, &["Cuba".to_string(), "Laos".to_string()], 10)
        .expect("mentions");
    let cuba: Vec<_> = rows.iter().filter(|row| row.searchterm == "\"Cuba\"").collect();
    assert_eq!(cuba.len(), 2);
    assert_eq!(cuba[0].url, "http://x/a.html");
    assert_eq!(cuba[1].url, "http://x/c.html");
    assert!(cuba[0].score >= cuba[1].score);

    let laos: Vec<_> = rows.iter().filter(|row| row.searchterm == "\"Laos\"").collect();
    assert_eq!(laos.len(), 1);
    assert_eq!(laos[0].title, "Farm Report");
}

#[test]
fn report_writes_csv_with_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = seeded_config(dir.path());
    let output = dir.path().join("out").join("report.csv");

    write_report(&config, &["Cuba".to_string()], 10, &output).expect("report");

    let mut reader = csv::Reader::from_path(&output).expect("reader");
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["published", "title", "location", "url", "textScore", "searchterm", "text"]
    );
    assert_eq!(reader.records().count(), 2);
}

#[test]
fn report_requires_indexed_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::from_root(dir.path());
    let output = dir.path().join("report.csv");
    assert!(write_report(&config, &["Cuba".to_string()], 10, &output).is_err());

    drop(ArticleStore::open(&config.db_path).expect("empty store"));
    assert!(write_report(&config, &["Cuba".to_string()], 10, &output).is_err());
}
