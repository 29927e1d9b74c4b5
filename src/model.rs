use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::util::record_timestamp;

pub const RECORD_APP: &str = "nkir-extract";
pub const RECORD_DATA_TYPE: &str = "text";
pub const RECORD_DATA_SOURCE: &str = "kcna_article";
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    #[serde(default, with = "record_timestamp")]
    pub date_published: Option<NaiveDateTime>,
    pub juche_year: i64,
    #[serde(default)]
    pub article_url: Option<String>,
    #[serde(default, with = "record_timestamp")]
    pub html_modified: Option<NaiveDateTime>,
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub news_service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub metadata: ArticleMetadata,
    pub text: Vec<String>,
}

impl ArticleRecord {
    pub fn new(metadata: ArticleMetadata, text: Vec<String>) -> Result<Self, StageError> {
        let record = Self { metadata, text };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<(), StageError> {
        if self.metadata.title.trim().is_empty() {
            return Err(StageError::MalformedInput("article title is empty".to_string()));
        }
        if self.text.is_empty() {
            return Err(StageError::MalformedInput(
                "article body has no paragraphs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn body_text(&self) -> String {
        self.text.join("\n")
    }
}

/// On-disk envelope exchanged between the extract and import stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub app: String,
    pub data_type: String,
    pub data_source: String,
    pub timestamp: String,
    pub version: u32,
    pub data: ArticleRecord,
}

impl RecordEnvelope {
    pub fn wrap(data: ArticleRecord, timestamp: String) -> Self {
        Self {
            app: RECORD_APP.to_string(),
            data_type: RECORD_DATA_TYPE.to_string(),
            data_source: RECORD_DATA_SOURCE.to_string(),
            timestamp,
            version: RECORD_VERSION,
            data,
        }
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, StageError> {
        let envelope: Self = serde_json::from_slice(raw)
            .map_err(|err| StageError::MalformedInput(format!("invalid record json: {err}")))?;
        envelope.data.validate()?;
        Ok(envelope)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageCounts {
    pub seen: usize,
    pub succeeded: usize,
    pub diverted: usize,
    pub retained: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub stage: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub paths: BTreeMap<String, String>,
    pub counts: StageCounts,
    pub extra_counts: BTreeMap<String, usize>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}
