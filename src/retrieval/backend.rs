use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use tracing::debug;

use crate::error::{RetrievalError, RetrievalResult};
use crate::model::Document;
use crate::semantic::{
    cosine_similarity, decode_embedding_blob, embed_text_local, resolve_model_config,
    SemanticModelConfig,
};
use crate::store::table_exists;

/// Equality constraints on document metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    equals: BTreeMap<String, String>,
}

impl SearchFilter {
    pub fn source(value: impl Into<String>) -> Self {
        let mut equals = BTreeMap::new();
        equals.insert("source".to_string(), value.into());
        Self { equals }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.equals.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.equals.keys().map(String::as_str)
    }
}

/// Nearest-neighbour search over embedded chunks.
///
/// Returns at most `k` `(document, distance)` pairs ordered by ascending
/// distance, where lower means more similar.
pub trait SearchBackend: Sync {
    fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> RetrievalResult<Vec<(Document, f64)>>;
}

impl<T: SearchBackend + ?Sized> SearchBackend for &T {
    fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> RetrievalResult<Vec<(Document, f64)>> {
        (**self).search(query, k, filter)
    }
}

/// Brute-force cosine search over the `chunks` table using the local
/// embedding model. Each call opens its own read-only connection.
///
/// The schema's foreign key keeps chunks tied to an article, so a hit with
/// no `article_id` only appears for databases written with foreign keys off.
#[derive(Debug, Clone)]
pub struct SqliteVectorBackend {
    db_path: PathBuf,
    model: SemanticModelConfig,
}

impl SqliteVectorBackend {
    pub fn open(db_path: &Path, model_id: &str) -> RetrievalResult<Self> {
        if !db_path.exists() {
            return Err(RetrievalError::BackendUnavailable(format!(
                "database {} does not exist; run ingest and embed first",
                db_path.display()
            )));
        }

        let backend = Self {
            db_path: db_path.to_path_buf(),
            model: resolve_model_config(model_id),
        };
        let connection = backend.connect()?;
        backend.ensure_index_available(&connection)?;
        Ok(backend)
    }

    pub fn model(&self) -> &SemanticModelConfig {
        &self.model
    }

    fn connect(&self) -> RetrievalResult<Connection> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| {
            RetrievalError::BackendUnavailable(format!(
                "failed to open {} read-only: {err}",
                self.db_path.display()
            ))
        })
    }

    fn ensure_index_available(&self, connection: &Connection) -> RetrievalResult<()> {
        if !table_exists(connection, "chunks")? {
            return Err(RetrievalError::BackendUnavailable(
                "chunks table is missing; run ingest and embed first".to_string(),
            ));
        }

        let embedding_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM chunks WHERE model_id = ?1",
            [&self.model.model_id],
            |row| row.get(0),
        )?;
        if embedding_count <= 0 {
            return Err(RetrievalError::BackendUnavailable(format!(
                "no chunk embeddings for model '{}'",
                self.model.model_id
            )));
        }

        Ok(())
    }
}

impl SearchBackend for SqliteVectorBackend {
    fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> RetrievalResult<Vec<(Document, f64)>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let source_filter = match filter {
            Some(filter) => {
                if let Some(field) = filter.fields().find(|field| *field != "source") {
                    return Err(RetrievalError::InvalidRequest(format!(
                        "unsupported filter field '{field}'"
                    )));
                }
                filter.get("source")
            }
            None => None,
        };

        let connection = self.connect()?;
        let query_embedding = embed_text_local(query, self.model.dimensions);

        let mut statement = connection.prepare(
            "
            SELECT
              c.chunk_id,
              a.id,
              a.title,
              a.publish_date,
              a.source,
              c.content,
              c.embedding,
              c.embedding_dim
            FROM chunks c
            LEFT JOIN articles a ON a.id = c.article_id
            WHERE
              c.model_id = ?1
              AND (?2 IS NULL OR a.source = ?2)
            ",
        )?;
        let mut rows = statement.query(params![self.model.model_id, source_filter])?;

        let mut scored = Vec::<(String, Document, f64)>::new();
        let mut skipped_rows = 0usize;
        while let Some(row) = rows.next()? {
            let row_dim = row.get::<_, i64>(7)? as usize;
            let blob = row.get::<_, Vec<u8>>(6)?;
            let Some(embedding) = (row_dim == self.model.dimensions)
                .then(|| decode_embedding_blob(&blob, row_dim))
                .flatten()
            else {
                skipped_rows += 1;
                continue;
            };

            let distance = 1.0 - cosine_similarity(&query_embedding, &embedding);
            let document = Document {
                article_id: row.get(1)?,
                title: row.get(2)?,
                publish_date: row.get(3)?,
                source: row.get(4)?,
                content: row.get(5)?,
            };
            scored.push((row.get(0)?, document, distance));
        }

        scored.sort_by(|left, right| left.2.total_cmp(&right.2).then(left.0.cmp(&right.0)));
        scored.truncate(k);

        debug!(
            query = %query,
            k,
            source_filter = ?source_filter,
            skipped_rows,
            returned = scored.len(),
            "vector search completed"
        );

        Ok(scored
            .into_iter()
            .map(|(_, document, distance)| (document, distance))
            .collect())
    }
}
