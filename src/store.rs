use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::model::{ArticleDetail, SourceCount, UNKNOWN_DATE, UNTITLED};

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

pub fn open_read_only(db_path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open database read-only: {}", db_path.display()))
}

pub fn open_read_write(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", true)
        .context("failed to enable foreign_keys")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS articles (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          source TEXT NOT NULL,
          title TEXT,
          publish_date TEXT,
          link TEXT,
          content TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_articles_source_date
          ON articles(source, publish_date);

        CREATE TABLE IF NOT EXISTS chunks (
          chunk_id TEXT PRIMARY KEY,
          article_id INTEGER NOT NULL,
          chunk_seq INTEGER NOT NULL DEFAULT 0,
          content TEXT NOT NULL,
          model_id TEXT NOT NULL,
          embedding BLOB NOT NULL,
          embedding_dim INTEGER NOT NULL,
          text_hash TEXT NOT NULL,
          generated_at TEXT NOT NULL,
          FOREIGN KEY(article_id) REFERENCES articles(id)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_model ON chunks(model_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_article ON chunks(article_id);
        ",
    )?;

    connection.execute(
        "
        INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
        ON CONFLICT(key) DO UPDATE SET value=excluded.value
        ",
        [DB_SCHEMA_VERSION],
    )?;

    Ok(())
}

pub fn table_exists(connection: &Connection, table: &str) -> rusqlite::Result<bool> {
    let found = connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn load_article(connection: &Connection, article_id: i64) -> rusqlite::Result<Option<ArticleDetail>> {
    connection
        .query_row(
            "
            SELECT id, title, publish_date, source, link, content
            FROM articles
            WHERE id = ?1
            ",
            [article_id],
            |row| {
                Ok(ArticleDetail {
                    id: row.get(0)?,
                    title: row
                        .get::<_, Option<String>>(1)?
                        .unwrap_or_else(|| UNTITLED.to_string()),
                    publish_date: row
                        .get::<_, Option<String>>(2)?
                        .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
                    source: row.get(3)?,
                    link: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    content: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            },
        )
        .optional()
}

/// Recorded schema version; `None` when the database predates the metadata table.
pub fn schema_version(connection: &Connection) -> Result<Option<String>> {
    if !table_exists(connection, "metadata")? {
        return Ok(None);
    }
    let version = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .context("failed to read db_schema_version")?;
    Ok(version)
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

pub fn source_counts(connection: &Connection) -> Result<Vec<SourceCount>> {
    let mut statement = connection.prepare(
        "SELECT source, COUNT(*) FROM articles GROUP BY source ORDER BY source ASC",
    )?;
    let rows = statement.query_map([], |row| {
        Ok(SourceCount {
            source: row.get(0)?,
            articles: row.get::<_, i64>(1)? as usize,
        })
    })?;

    let mut out = Vec::<SourceCount>::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// `(publish_date, title)` of the `limit` oldest or newest articles of one source.
pub fn date_extremes(
    connection: &Connection,
    source: &str,
    newest: bool,
    limit: usize,
) -> Result<Vec<(String, String)>> {
    let order = if newest { "DESC" } else { "ASC" };
    let sql = format!(
        "
        SELECT COALESCE(publish_date, ''), COALESCE(title, '')
        FROM articles
        WHERE source = ?1
        ORDER BY publish_date {order}, id {order}
        LIMIT ?2
        "
    );
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map(params![source, limit as i64], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut out = Vec::<(String, String)>::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_article(
    connection: &Connection,
    source: &str,
    title: &str,
    publish_date: &str,
    link: &str,
    content: &str,
) -> rusqlite::Result<i64> {
    connection.execute(
        "
        INSERT INTO articles(source, title, publish_date, link, content)
        VALUES(?1, ?2, ?3, ?4, ?5)
        ",
        params![source, title, publish_date, link, content],
    )?;
    Ok(connection.last_insert_rowid())
}

#[cfg(test)]
pub(crate) fn memory_store() -> Connection {
    let connection = Connection::open_in_memory().expect("in-memory sqlite");
    ensure_schema(&connection).expect("schema");
    connection
}
