use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::StageError;
use crate::model::RecordEnvelope;
use crate::util::{RECORD_TIMESTAMP_FORMAT, ensure_directory, now_utc_string};

pub const STORE_SCHEMA_VERSION: &str = "1.0.0";

/// Relative weights of the indexed columns, in `articles_fts` column order.
pub const TEXT_INDEX_WEIGHTS: [(&str, f64); 4] = [
    ("text", 5.0),
    ("title", 10.0),
    ("location", 10.0),
    ("news_service", 1.0),
];

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InsertOutcome {
    Inserted(String),
    AlreadyPresent(String),
}

impl InsertOutcome {
    pub fn article_id(&self) -> &str {
        match self {
            Self::Inserted(id) | Self::AlreadyPresent(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub published: Option<String>,
    pub title: String,
    pub location: Option<String>,
    pub url: Option<String>,
    pub score: f64,
    pub text: String,
}

pub struct ArticleStore {
    connection: Connection,
}

impl ArticleStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        Self::from_connection(connection)
    }

    pub fn open_existing(db_path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .with_context(|| format!("failed to open {}", db_path.display()))?;
        Ok(Self { connection })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Inserts one record in its own transaction. A source file that is
    /// already stored is not written again; its existing id is returned.
    pub fn insert(
        &mut self,
        source_file: &str,
        raw: &[u8],
        envelope: &RecordEnvelope,
    ) -> Result<InsertOutcome, StageError> {
        let tx = self.connection.transaction().map_err(store_error)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT article_id FROM articles WHERE source_file = ?1",
                [source_file],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_error)?;
        if let Some(article_id) = existing {
            return Ok(InsertOutcome::AlreadyPresent(article_id));
        }

        let article_id = article_id_for(source_file, raw);
        let meta = &envelope.data.metadata;
        let document = serde_json::to_string(envelope)
            .map_err(|err| StageError::MalformedInput(format!("record not serializable: {err}")))?;

        tx.execute(
            "
            INSERT INTO articles(
              article_id, source_file, date_published, juche_year, article_url,
              html_modified, title, location, news_service, text, document, imported_at
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
            params![
                &article_id,
                source_file,
                meta.date_published
                    .map(|ts| ts.format(RECORD_TIMESTAMP_FORMAT).to_string()),
                meta.juche_year,
                &meta.article_url,
                meta.html_modified
                    .map(|ts| ts.format(RECORD_TIMESTAMP_FORMAT).to_string()),
                &meta.title,
                &meta.location,
                &meta.news_service,
                envelope.data.body_text(),
                document,
                now_utc_string(),
            ],
        )
        .map_err(store_error)?;

        tx.commit().map_err(store_error)?;
        Ok(InsertOutcome::Inserted(article_id))
    }

    /// Creates the weighted full-text index if needed and refreshes it from
    /// the article table. Safe to call after every batch.
    pub fn ensure_text_index(&self) -> Result<()> {
        self.connection
            .execute(
                "
                CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts
                USING fts5(text, title, location, news_service, content='articles', content_rowid='rowid')
                ",
                [],
            )
            .context("failed to initialize FTS5 table articles_fts")?;

        let weights = TEXT_INDEX_WEIGHTS
            .iter()
            .map(|(_, weight)| format!("{weight:.1}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.connection
            .execute(
                "INSERT INTO articles_fts(articles_fts, rank) VALUES('rank', ?1)",
                [format!("bm25({weights})")],
            )
            .context("failed to configure articles_fts rank weights")?;

        self.connection
            .execute("INSERT INTO articles_fts(articles_fts) VALUES('rebuild')", [])
            .context("failed to rebuild FTS index")?;

        let described = TEXT_INDEX_WEIGHTS
            .iter()
            .map(|(column, weight)| format!("{column}={weight}"))
            .collect::<Vec<_>>()
            .join(",");
        set_metadata(&self.connection, "text_index_weights", &described)?;

        info!(weights = %described, "ensured weighted text index");
        Ok(())
    }

    pub fn text_index_exists(&self) -> Result<bool> {
        let count: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'articles_fts'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count_articles(&self) -> Result<i64> {
        let count = self
            .connection
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Phrase search over the weighted index, best match first.
    pub fn search(&self, term: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let mut statement = self.connection.prepare(
            "
            SELECT
              a.date_published,
              a.title,
              a.location,
              a.article_url,
              articles_fts.rank,
              a.text
            FROM articles_fts
            JOIN articles a ON a.rowid = articles_fts.rowid
            WHERE articles_fts MATCH ?1
            ORDER BY articles_fts.rank
            LIMIT ?2
            ",
        )?;

        let mut rows = statement.query(params![fts_phrase(term), limit as i64])?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let rank: f64 = row.get(4)?;
            hits.push(SearchHit {
                published: row.get(0)?,
                title: row.get(1)?,
                location: row.get(2)?,
                url: row.get(3)?,
                score: -rank,
                text: row.get(5)?,
            });
        }

        Ok(hits)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS articles (
          article_id TEXT PRIMARY KEY,
          source_file TEXT NOT NULL UNIQUE,
          date_published TEXT,
          juche_year INTEGER NOT NULL,
          article_url TEXT,
          html_modified TEXT,
          title TEXT NOT NULL,
          location TEXT,
          news_service TEXT,
          text TEXT NOT NULL,
          document TEXT NOT NULL,
          imported_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_articles_url ON articles(article_url);
        CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(date_published);
        ",
    )?;

    set_metadata(connection, "db_schema_version", STORE_SCHEMA_VERSION)?;
    set_metadata(connection, "db_updated_at", &now_utc_string())?;
    Ok(())
}

fn set_metadata(connection: &Connection, key: &str, value: &str) -> Result<()> {
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [key, value],
    )?;
    Ok(())
}

fn store_error(err: rusqlite::Error) -> StageError {
    StageError::TransientIo(format!("store write failed: {err}"))
}

pub fn article_id_for(source_file: &str, raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_file.as_bytes());
    hasher.update([0_u8]);
    hasher.update(raw);
    let digest = format!("{:x}", hasher.finalize());
    format!("kcna-{}", &digest[..16])
}

/// Quotes a search term as a single FTS5 phrase.
pub fn fts_phrase(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}
