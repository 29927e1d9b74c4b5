use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use super::filename::{DiffAction, Era};
use super::*;

fn scratch_config(root: &Path) -> PipelineConfig {
    let config = PipelineConfig::from_root(root);
    fs::create_dir_all(&config.queuer_inbox).expect("queuer inbox");
    fs::create_dir_all(&config.mirror_root).expect("mirror root");
    config
}

fn write_mirror_file(config: &PipelineConfig, rel: &str, body: &str) {
    let path = config.mirror_root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mirror dirs");
    fs::write(path, body).expect("mirror file");
}

#[test]
fn new_era_filename_is_returned_unchanged() {
    let normalizer = FilenameNormalizer::new().expect("normalizer");
    let name = normalizer
        .normalize("item/2008/200810/news01/20081001-01ee.html")
        .expect("new era path");

    assert_eq!(name.era, Era::New);
    assert_eq!(name.canonical, "20081001-01ee.html");
    assert_eq!((name.year.as_str(), name.month.as_str(), name.day.as_str()), ("2008", "10", "01"));
}

#[test]
fn old_era_filename_is_synthesized_per_day() {
    let normalizer = FilenameNormalizer::new().expect("normalizer");

    let name = normalizer
        .normalize("item/1998/9806/news06/10.htm")
        .expect("old era path");
    assert_eq!(name.era, Era::Old);
    assert_eq!(name.canonical, "19980610-00ee.html");

    let single_digit_news_dir = normalizer
        .normalize("item/1997/9701/news1/01.htm")
        .expect("old era path");
    assert_eq!(single_digit_news_dir.canonical, "19970101-00ee.html");

    let four_digit_year_dir = normalizer
        .normalize("item/2000/200001/news01/01.htm")
        .expect("old era path");
    assert_eq!(four_digit_year_dir.canonical, "20000101-00ee.html");
}

#[test]
fn normalization_is_deterministic_and_idempotent() {
    let normalizer = FilenameNormalizer::new().expect("normalizer");
    let first = normalizer
        .normalize("item/1998/9806/news06/10.htm")
        .expect("first");
    let second = normalizer
        .normalize("item/1998/9806/news06/10.htm")
        .expect("second");
    assert_eq!(first, second);

    let renormalized = normalizer
        .normalize(&format!("item/1998/9806/news10/{}", first.canonical))
        .expect("canonical name is a new-era name");
    assert_eq!(renormalized.canonical, first.canonical);
}

#[test]
fn unrecognized_filename_is_a_classification_failure() {
    let normalizer = FilenameNormalizer::new().expect("normalizer");

    let err = normalizer
        .normalize("item/2008/200810/news01/index.html")
        .expect_err("unknown shape");
    assert!(matches!(
        err,
        NameError::UnrecognizedFilename { ref file, .. } if file == "index.html"
    ));

    let err = normalizer
        .normalize("images/2008/logo.gif")
        .expect_err("not an article");
    assert!(matches!(err, NameError::NotArticlePath(_)));
}

#[test]
fn parse_diff_line_accepts_add_and_modify_only() {
    let normalizer = FilenameNormalizer::new().expect("normalizer");

    let added = normalizer
        .parse_diff_line("A\titem/1998/9806/news06/10.htm")
        .expect("add entry");
    assert_eq!(added.action, DiffAction::Add);
    assert_eq!(added.path, "item/1998/9806/news06/10.htm");

    let modified = normalizer
        .parse_diff_line("M\t\titem/2008/200810/news01/20081001-01ee.html\r")
        .expect("modify entry");
    assert_eq!(modified.action, DiffAction::Modify);

    assert!(normalizer.parse_diff_line("D\titem/1998/9806/news06/10.htm").is_none());
    assert!(normalizer.parse_diff_line("commit 0123abcd").is_none());
    assert!(normalizer.parse_diff_line("").is_none());
}

#[test]
fn articles_in_ignores_noise_and_counts_unrecognized_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::from_root(dir.path());
    let normalizer = FilenameNormalizer::new().expect("normalizer");
    let queuer = ChangeQueuer::new(&config, &normalizer);

    let log = "commit abc\nAuthor: mirror\n\nM\titem/1998/9806/news06/10.htm\nA\titem/2008/200810/news01/20081001-01ee.html\nA\titem/2008/200810/news01/index.html\nM\tindex.html\nD\titem/1998/9806/news06/11.htm\n";
    let (articles, unrecognized) = queuer.articles_in(log);

    let names: Vec<_> = articles.iter().map(|(_, name)| name.canonical.as_str()).collect();
    assert_eq!(names, vec!["19980610-00ee.html", "20081001-01ee.html"]);
    assert_eq!(unrecognized, 1);
    assert_eq!(
        articles[0].0,
        config.mirror_root.join("item/1998/9806/news06/10.htm")
    );
}

#[test]
fn complete_log_is_archived_and_articles_copied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scratch_config(dir.path());
    write_mirror_file(&config, "item/1998/9806/news06/10.htm", "old day");
    write_mirror_file(&config, "item/2008/200810/news01/20081001-01ee.html", "new article");
    fs::write(
        config.queuer_inbox.join("20240101.log"),
        "M\titem/1998/9806/news06/10.htm\nA\titem/2008/200810/news01/20081001-01ee.html\n",
    )
    .expect("log");

    let manifest = run_with_config(&config).expect("queue run");

    assert_eq!(manifest.counts.seen, 1);
    assert_eq!(manifest.counts.succeeded, 1);
    assert_eq!(manifest.counts.retained, 0);
    assert_eq!(manifest.extra_counts["articles_committed"], 2);
    assert!(!config.queuer_inbox.join("20240101.log").exists());
    assert!(config.queuer_archive().join("20240101.log").is_file());
    assert_eq!(
        fs::read_to_string(config.extract_inbox.join("19980610-00ee.html")).expect("copied"),
        "old day"
    );
    assert!(config.extract_inbox.join("20081001-01ee.html").is_file());
}

#[test]
fn one_failed_copy_keeps_log_and_does_not_roll_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scratch_config(dir.path());
    write_mirror_file(&config, "item/1998/9806/news06/10.htm", "old day");
    fs::write(
        config.queuer_inbox.join("partial.log"),
        "M\titem/1998/9806/news06/10.htm\nA\titem/2008/200810/news01/20081001-01ee.html\n",
    )
    .expect("log");

    let manifest = run_with_config(&config).expect("queue run");

    assert_eq!(manifest.counts.retained, 1);
    assert_eq!(manifest.extra_counts["articles_copied"], 1);
    assert!(config.queuer_inbox.join("partial.log").is_file());
    assert!(!config.queuer_archive().join("partial.log").exists());
    assert!(config.extract_inbox.join("19980610-00ee.html").is_file());

    write_mirror_file(&config, "item/2008/200810/news01/20081001-01ee.html", "late");
    let retry = run_with_config(&config).expect("retry run");
    assert_eq!(retry.counts.succeeded, 1);
    assert!(config.queuer_archive().join("partial.log").is_file());
}

#[test]
fn copy_preserves_source_modification_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scratch_config(dir.path());
    write_mirror_file(&config, "item/1998/9806/news06/10.htm", "old day");

    let source = config.mirror_root.join("item/1998/9806/news06/10.htm");
    let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(900_000_000);
    fs::OpenOptions::new()
        .write(true)
        .open(&source)
        .and_then(|file| file.set_modified(stamp))
        .expect("set mtime");

    fs::write(config.queuer_inbox.join("a.log"), "M\titem/1998/9806/news06/10.htm\n")
        .expect("log");
    run_with_config(&config).expect("queue run");

    let copied = fs::metadata(config.extract_inbox.join("19980610-00ee.html"))
        .and_then(|meta| meta.modified())
        .expect("copied mtime");
    assert_eq!(copied, stamp);
}

#[test]
fn missing_mirror_root_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::from_root(dir.path());
    fs::create_dir_all(&config.queuer_inbox).expect("queuer inbox");

    let err = run_with_config(&config).expect_err("fatal");
    assert!(err.to_string().contains("mirror root"));
}

#[test]
fn copies_land_whole_and_leave_no_partial_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scratch_config(dir.path());
    write_mirror_file(&config, "item/1998/9806/news06/10.htm", "old day");
    fs::create_dir_all(&config.extract_inbox).expect("extract inbox");
    fs::write(config.extract_inbox.join("19980610-00ee.html.tmp"), "stale partial").expect("stale");

    fs::write(config.queuer_inbox.join("a.log"), "M\titem/1998/9806/news06/10.htm\n")
        .expect("log");
    run_with_config(&config).expect("queue run");

    assert_eq!(
        fs::read_to_string(config.extract_inbox.join("19980610-00ee.html")).expect("copied"),
        "old day"
    );
    assert!(!config.extract_inbox.join("19980610-00ee.html.tmp").exists());
}
