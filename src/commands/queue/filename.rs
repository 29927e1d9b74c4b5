use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;

/// KCNA switched naming conventions on 2008-10-01. Before that a single
/// `dd.htm` file carried every article of the day; afterwards each article
/// has its own `yyyymmdd-NNee.html` file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Era {
    Old,
    New,
}

impl Era {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Old => "old",
            Self::New => "new",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ArticleName {
    pub era: Era,
    pub year: String,
    pub month: String,
    pub day: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum NameError {
    #[error("path is not an article path: {0}")]
    NotArticlePath(String),

    #[error("unrecognized article filename [{file}] in {path}")]
    UnrecognizedFilename { path: String, file: String },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DiffAction {
    Add,
    Modify,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DiffEntry {
    pub action: DiffAction,
    pub path: String,
}

// Mirror paths seen in diff logs:
//   item/1997/9701/news1/01.htm
//   item/1998/9806/news06/10.htm
//   item/2000/200001/news01/01.htm
//   item/2008/200810/news01/20081001-01ee.html
pub struct FilenameNormalizer {
    diff_line: Regex,
    article_path: Regex,
    new_name: Regex,
    old_name: Regex,
}

impl FilenameNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            diff_line: Regex::new(r"^([MA])\t+(\S+)$")
                .context("failed to compile diff line regex")?,
            article_path: Regex::new(
                r"^item/(?P<year>\d{4})/(?:9\d|20\d\d)(?P<month>\d\d)/news\d{1,2}/(?P<file>[^/]+)$",
            )
            .context("failed to compile article path regex")?,
            new_name: Regex::new(r"^\d{6}(?P<day>\d\d)-\d\dee\.html$")
                .context("failed to compile new-era filename regex")?,
            old_name: Regex::new(r"^(?P<day>\d\d)\.htm$")
                .context("failed to compile old-era filename regex")?,
        })
    }

    /// Reads one diff log line. Anything other than an add/modify entry is
    /// not a diff entry and yields `None`.
    pub fn parse_diff_line(&self, line: &str) -> Option<DiffEntry> {
        let captures = self.diff_line.captures(line.trim_end())?;
        let action = match &captures[1] {
            "A" => DiffAction::Add,
            _ => DiffAction::Modify,
        };
        Some(DiffEntry {
            action,
            path: captures[2].to_string(),
        })
    }

    pub fn normalize(&self, path: &str) -> Result<ArticleName, NameError> {
        let captures = self
            .article_path
            .captures(path)
            .ok_or_else(|| NameError::NotArticlePath(path.to_string()))?;

        let year = captures["year"].to_string();
        let month = captures["month"].to_string();
        let file = &captures["file"];

        if let Some(name) = self.new_name.captures(file) {
            return Ok(ArticleName {
                era: Era::New,
                year,
                month,
                day: name["day"].to_string(),
                canonical: file.to_string(),
            });
        }

        if let Some(name) = self.old_name.captures(file) {
            let day = name["day"].to_string();
            let canonical = format!("{year}{month}{day}-00ee.html");
            return Ok(ArticleName {
                era: Era::Old,
                year,
                month,
                day,
                canonical,
            });
        }

        Err(NameError::UnrecognizedFilename {
            path: path.to_string(),
            file: file.to_string(),
        })
    }
}
