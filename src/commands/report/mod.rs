use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::cli::ReportArgs;
use crate::commands::import::{ArticleStore, SearchHit, fts_phrase};
use crate::config::PipelineConfig;
use crate::util::{ensure_directory, utc_compact_string};

#[cfg(test)]
mod tests;

pub const REPORTS_DIR_NAME: &str = "reports";

/// One CSV row; field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentionRow {
    pub published: String,
    pub title: String,
    pub location: String,
    pub url: String,
    #[serde(rename = "textScore")]
    pub score: f64,
    pub searchterm: String,
    pub text: String,
}

impl MentionRow {
    fn from_hit(term: &str, hit: SearchHit) -> Self {
        Self {
            published: hit.published.unwrap_or_default(),
            title: hit.title,
            location: hit.location.unwrap_or_default(),
            url: hit.url.unwrap_or_default(),
            score: hit.score,
            searchterm: fts_phrase(term),
            text: hit.text,
        }
    }
}

pub fn run(args: ReportArgs) -> Result<()> {
    let config = PipelineConfig::from_args(&args.pipeline, None);
    let terms = if args.terms.is_empty() {
        load_countries(&args.countries_path)?
    } else {
        args.terms.clone()
    };

    let output_path = args.output_path.clone().unwrap_or_else(|| {
        config.data_root.join(REPORTS_DIR_NAME).join(format!(
            "country_mentions_{}.csv",
            utc_compact_string(Utc::now())
        ))
    });

    write_report(&config, &terms, args.limit, &output_path)?;
    Ok(())
}

/// Reads `CC|Name` lines and returns the names. Blank lines are skipped.
pub fn load_countries(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        bail!("countries list file missing: {}", path.display());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut countries = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((_, name)) = line.split_once('|') else {
            bail!(
                "malformed countries line {} in {}: {line}",
                idx + 1,
                path.display()
            );
        };
        let name = name.trim();
        if !name.is_empty() {
            countries.push(name.to_string());
        }
    }

    info!(path = %path.display(), countries = countries.len(), "retrieved list of countries");
    Ok(countries)
}

pub fn collect_mentions(
    store: &ArticleStore,
    terms: &[String],
    limit: usize,
) -> Result<Vec<MentionRow>> {
    let mut rows = Vec::new();

    for term in terms {
        let hits = store.search(term, limit)?;
        if hits.is_empty() {
            info!(term = %term, "no results found");
            continue;
        }
        info!(term = %term, results = hits.len(), "results found");

        let mut seen_urls = BTreeSet::new();
        for hit in hits {
            if let Some(url) = &hit.url {
                if !seen_urls.insert(url.clone()) {
                    debug!(term = %term, url = %url, "skipping duplicate url");
                    continue;
                }
            }
            rows.push(MentionRow::from_hit(term, hit));
        }
    }

    Ok(rows)
}

pub fn write_report(
    config: &PipelineConfig,
    terms: &[String],
    limit: usize,
    output_path: &Path,
) -> Result<PathBuf> {
    let _span = info_span!("report").entered();

    if !config.db_path.is_file() {
        bail!("article store missing: {}", config.db_path.display());
    }
    let store = ArticleStore::open_existing(&config.db_path)?;
    if !store.text_index_exists()? {
        bail!(
            "text index missing in {}; run import first",
            config.db_path.display()
        );
    }

    let rows = collect_mentions(&store, terms, limit)?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("failed to create {}", output_path.display()))?;
    for row in &rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write row to {}", output_path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", output_path.display()))?;

    info!(
        path = %output_path.display(),
        terms = terms.len(),
        rows = rows.len(),
        "wrote mention report"
    );
    Ok(output_path.to_path_buf())
}
