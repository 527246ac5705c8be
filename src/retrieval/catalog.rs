use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::error::{RetrievalError, RetrievalResult};
use crate::model::{ArticleDetail, RankedResult};
use crate::store::{load_article, table_exists};

use super::conditional::{conditional_search, ConditionalQuery};
use super::config::FusionConfig;

/// Read-only view of the article table for exact-match search and lookups.
pub struct Catalog {
    connection: Connection,
    snippet_chars: usize,
}

impl Catalog {
    pub fn open(db_path: &Path) -> RetrievalResult<Self> {
        if !db_path.exists() {
            return Err(RetrievalError::BackendUnavailable(format!(
                "database {} does not exist; run ingest first",
                db_path.display()
            )));
        }

        let connection = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| {
            RetrievalError::BackendUnavailable(format!(
                "failed to open {} read-only: {err}",
                db_path.display()
            ))
        })?;

        Self::from_connection(connection)
    }

    pub fn from_connection(connection: Connection) -> RetrievalResult<Self> {
        if !table_exists(&connection, "articles")? {
            return Err(RetrievalError::BackendUnavailable(
                "articles table is missing; run ingest first".to_string(),
            ));
        }

        Ok(Self {
            connection,
            snippet_chars: FusionConfig::default().snippet_chars,
        })
    }

    /// Snippet length for conditional search results, usually `FusionConfig::snippet_chars`.
    pub fn with_snippet_chars(mut self, snippet_chars: usize) -> Self {
        self.snippet_chars = snippet_chars;
        self
    }

    pub fn conditional_search(&self, query: &ConditionalQuery) -> RetrievalResult<Vec<RankedResult>> {
        conditional_search(&self.connection, query, self.snippet_chars)
    }

    pub fn article(&self, article_id: i64) -> RetrievalResult<ArticleDetail> {
        load_article(&self.connection, article_id)?.ok_or(RetrievalError::NotFound(article_id))
    }
}
