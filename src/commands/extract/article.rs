use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::warn;

use super::html_text::{HtmlText, ScraperText};
use crate::error::StageError;
use crate::model::{ArticleMetadata, ArticleRecord};

/// What the extractor knows about the file an article came from.
#[derive(Debug, Clone)]
pub struct SourceFile<'a> {
    pub file_name: &'a str,
    pub modified: Option<NaiveDateTime>,
}

pub struct ArticleExtractor {
    html_text: Box<dyn HtmlText>,
    article: Regex,
    byline: Regex,
    filename_date: Regex,
    url_root: String,
}

impl ArticleExtractor {
    pub fn new(url_root: &str) -> Result<Self> {
        Ok(Self {
            html_text: Box::new(ScraperText),
            article: Regex::new(r"(?s)^.*>> (.* \d{4}) Juche ([0-9]+)(.*)$")
                .context("failed to compile article marker regex")?,
            byline: Regex::new(r"^(.*),.*\((.*)\) -- (.*)$")
                .context("failed to compile byline regex")?,
            filename_date: Regex::new(r"^(\d{4})(\d{2})(\d{2})")
                .context("failed to compile filename date regex")?,
            url_root: url_root.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_html_text(mut self, html_text: Box<dyn HtmlText>) -> Self {
        self.html_text = html_text;
        self
    }

    /// Only a missing marker/date/epoch block (or an empty result) is fatal
    /// for the file; every other step degrades and leaves a field unset.
    pub fn extract(
        &self,
        html: &str,
        source: &SourceFile<'_>,
    ) -> Result<ArticleRecord, StageError> {
        let text = self.html_text.plain_text(html);

        let captures = self.article.captures(&text).ok_or_else(|| {
            StageError::MalformedInput(format!(
                "no dated article marker found in {}",
                source.file_name
            ))
        })?;

        let raw_date = &captures[1];
        let juche_year = captures[2].parse::<i64>().map_err(|err| {
            StageError::MalformedInput(format!("invalid Juche year [{}]: {err}", &captures[2]))
        })?;

        let mut lines = captures[3]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned);

        let title = lines.next().ok_or_else(|| {
            StageError::MalformedInput(format!("article body is empty in {}", source.file_name))
        })?;
        let mut paragraphs: Vec<String> = lines.collect();

        let mut location = None;
        let mut news_service = None;
        if let Some(first) = paragraphs.first_mut() {
            match self.split_byline(first) {
                Some((place, service, start)) => {
                    location = Some(place);
                    news_service = Some(service);
                    *first = start;
                }
                None => warn!(file = source.file_name, "first paragraph has no dateline"),
            }
        }

        // trailing paragraph is the copyright line
        paragraphs.pop();

        let date_published = parse_published_date(raw_date);
        if date_published.is_none() {
            warn!(file = source.file_name, raw = raw_date, "unparseable publication date");
        }

        let article_url = self.article_url(source.file_name);
        if article_url.is_none() {
            warn!(file = source.file_name, "filename carries no date; article url unset");
        }

        ArticleRecord::new(
            ArticleMetadata {
                date_published,
                juche_year,
                article_url,
                html_modified: source.modified,
                title,
                location,
                news_service,
            },
            paragraphs,
        )
    }

    /// `Pyongyang, August 1 (KCNA) -- text` -> (`Pyongyang`, `KCNA`, `text`).
    pub fn split_byline(&self, paragraph: &str) -> Option<(String, String, String)> {
        let captures = self.byline.captures(paragraph)?;
        Some((
            captures[1].trim().to_string(),
            captures[2].trim().to_string(),
            captures[3].to_string(),
        ))
    }

    pub fn article_url(&self, file_name: &str) -> Option<String> {
        let captures = self.filename_date.captures(file_name)?;
        let (year, month, day) = (&captures[1], &captures[2], &captures[3]);
        Some(format!(
            "{}/item/{year}/{year}{month}/news{day}/{file_name}",
            self.url_root
        ))
    }
}

pub fn parse_published_date(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = raw.replace("Juche", "").replace(['.', ','], " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDate::parse_from_str(&cleaned, "%B %d %Y")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
