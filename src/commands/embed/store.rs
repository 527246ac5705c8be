use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::util::now_utc_string;

#[derive(Debug, Clone)]
pub(super) struct ArticleRow {
    pub id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ExistingChunk {
    pub model_id: String,
    pub text_hash: String,
    pub embedding_dim: usize,
}

#[derive(Debug, Clone)]
pub(super) struct PendingChunk {
    pub chunk_id: String,
    pub article_id: i64,
    pub chunk_seq: usize,
    pub content: String,
    pub text_hash: String,
    pub embedding_blob: Vec<u8>,
}

pub(super) fn chunk_id(article_id: i64, chunk_seq: usize) -> String {
    format!("{article_id}:{chunk_seq}")
}

pub(super) fn load_article_rows(connection: &Connection) -> Result<Vec<ArticleRow>> {
    let mut statement = connection.prepare(
        "
        SELECT id, COALESCE(title, ''), COALESCE(content, '')
        FROM articles
        ORDER BY id ASC
        ",
    )?;
    let rows = statement.query_map([], |row| {
        Ok(ArticleRow {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
        })
    })?;

    let mut out = Vec::<ArticleRow>::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub(super) fn load_existing_chunk(connection: &Connection, chunk_id: &str) -> Result<Option<ExistingChunk>> {
    let row = connection
        .query_row(
            "
            SELECT model_id, text_hash, embedding_dim
            FROM chunks
            WHERE chunk_id = ?1
            ",
            [chunk_id],
            |row| {
                Ok(ExistingChunk {
                    model_id: row.get(0)?,
                    text_hash: row.get(1)?,
                    embedding_dim: row.get::<_, i64>(2)? as usize,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn upsert_chunk(connection: &Connection, model_id: &str, dimensions: usize, chunk: &PendingChunk) -> Result<()> {
    connection.execute(
        "
        INSERT INTO chunks(chunk_id, article_id, chunk_seq, content, model_id, embedding, embedding_dim, text_hash, generated_at)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(chunk_id) DO UPDATE SET
          article_id=excluded.article_id,
          chunk_seq=excluded.chunk_seq,
          content=excluded.content,
          model_id=excluded.model_id,
          embedding=excluded.embedding,
          embedding_dim=excluded.embedding_dim,
          text_hash=excluded.text_hash,
          generated_at=excluded.generated_at
        ",
        params![
            chunk.chunk_id,
            chunk.article_id,
            chunk.chunk_seq as i64,
            chunk.content,
            model_id,
            chunk.embedding_blob,
            dimensions as i64,
            chunk.text_hash,
            now_utc_string(),
        ],
    )?;
    Ok(())
}

pub(super) fn flush_chunk_batch(
    connection: &mut Connection,
    model_id: &str,
    dimensions: usize,
    pending: &mut Vec<PendingChunk>,
) -> Result<usize> {
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = connection.transaction()?;
    let mut updated = 0usize;
    for chunk in pending.drain(..) {
        upsert_chunk(&tx, model_id, dimensions, &chunk)?;
        updated += 1;
    }
    tx.commit()?;

    Ok(updated)
}

/// Drops chunks past each article's current chunk count, plus chunks whose
/// article no longer exists.
pub(super) fn remove_stale_chunks(connection: &mut Connection, chunk_counts: &[(i64, usize)]) -> Result<usize> {
    let tx = connection.transaction()?;
    let mut removed = 0usize;
    {
        let mut statement = tx.prepare("DELETE FROM chunks WHERE article_id = ?1 AND chunk_seq >= ?2")?;
        for (article_id, count) in chunk_counts {
            removed += statement.execute(params![article_id, *count as i64])?;
        }
    }
    removed += tx.execute(
        "DELETE FROM chunks WHERE article_id NOT IN (SELECT id FROM articles)",
        [],
    )?;
    tx.commit()?;

    Ok(removed)
}
