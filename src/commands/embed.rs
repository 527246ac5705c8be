mod store;

use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{resolve_db_path, EmbedArgs, EmbedRefreshMode};
use crate::model::EmbedRunManifest;
use crate::semantic::{
    chunk_payload_for_embedding, embed_text_local, embedding_text_hash, encode_embedding_blob,
    resolve_model_config, split_into_chunks,
};
use crate::store::{count_rows, open_read_write};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use self::store::{
    chunk_id, flush_chunk_batch, load_article_rows, load_existing_chunk, remove_stale_chunks,
    PendingChunk,
};

pub fn run(args: EmbedArgs) -> Result<()> {
    let batch_size = args.batch_size.max(1);
    let chunk_chars = args.chunk_chars.max(1);
    let chunk_overlap = args.chunk_overlap.min(chunk_chars.saturating_sub(1));
    let model = resolve_model_config(&args.model_id);

    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let mut connection = open_read_write(&db_path)?;
    let articles = load_article_rows(&connection)?;
    let generated_at = now_utc_string();
    let started = Instant::now();
    let run_id = format!("embed-{}", utc_compact_string(Utc::now()));

    info!(
        db_path = %db_path.display(),
        model_id = %model.model_id,
        articles = articles.len(),
        refresh_mode = args.refresh_mode.as_str(),
        "starting embedding refresh"
    );

    let mut chunks_total = 0usize;
    let mut chunks_updated = 0usize;
    let mut chunk_counts = Vec::<(i64, usize)>::with_capacity(articles.len());
    let mut pending = Vec::<PendingChunk>::new();
    let mut warnings = Vec::<String>::new();

    for article in &articles {
        let chunks = split_into_chunks(&article.content, chunk_chars, chunk_overlap);
        let mut chunk_seq = 0usize;

        for chunk in chunks {
            let Some(payload) = chunk_payload_for_embedding(&article.title, &chunk) else {
                continue;
            };

            let id = chunk_id(article.id, chunk_seq);
            let seq = chunk_seq;
            chunk_seq += 1;
            chunks_total += 1;

            let text_hash = embedding_text_hash(&payload);
            let stale = load_existing_chunk(&connection, &id)?
                .map(|existing| {
                    existing.model_id != model.model_id
                        || existing.text_hash != text_hash
                        || existing.embedding_dim != model.dimensions
                })
                .unwrap_or(true);

            let should_update = match args.refresh_mode {
                EmbedRefreshMode::Full => true,
                EmbedRefreshMode::MissingOrStale => stale,
            };
            if !should_update {
                continue;
            }

            let embedding = embed_text_local(&payload, model.dimensions);
            pending.push(PendingChunk {
                chunk_id: id,
                article_id: article.id,
                chunk_seq: seq,
                content: chunk,
                text_hash,
                embedding_blob: encode_embedding_blob(&embedding),
            });

            if pending.len() >= batch_size {
                chunks_updated +=
                    flush_chunk_batch(&mut connection, &model.model_id, model.dimensions, &mut pending)?;
                info!(
                    model_id = %model.model_id,
                    chunks_updated,
                    chunks_total,
                    "embed batch committed"
                );
            }
        }

        chunk_counts.push((article.id, chunk_seq));
    }

    chunks_updated += flush_chunk_batch(&mut connection, &model.model_id, model.dimensions, &mut pending)?;
    let chunks_removed = remove_stale_chunks(&mut connection, &chunk_counts)?;

    if articles.is_empty() {
        warn!(db_path = %db_path.display(), "no articles to embed; run ingest first");
        warnings.push("no articles found".to_string());
    }

    let embedded_rows = count_rows(&connection, "SELECT COUNT(*) FROM chunks")?;
    let duration_ms = started.elapsed().as_millis();

    let manifest = EmbedRunManifest {
        manifest_version: 1,
        run_id,
        generated_at,
        model_id: model.model_id.clone(),
        model_name: model.model_name.clone(),
        embedding_dim: model.dimensions,
        backend: model.backend.clone(),
        refresh_mode: args.refresh_mode.as_str().to_string(),
        chunk_chars,
        chunk_overlap,
        articles_scanned: articles.len(),
        chunks_total,
        chunks_updated,
        chunks_removed,
        batch_size,
        duration_ms,
        status: "completed".to_string(),
        warnings,
    };

    let manifest_path = manifest_dir.join(format!("embed_run_{}.json", utc_compact_string(Utc::now())));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        model_id = %model.model_id,
        chunks_total,
        chunks_updated,
        chunks_removed,
        embedded_rows,
        "embedding refresh completed"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rusqlite::Connection;

    use super::*;
    use crate::semantic::DEFAULT_MODEL_ID;
    use crate::store::insert_article;

    fn embed_args(cache_root: &Path, refresh_mode: EmbedRefreshMode) -> EmbedArgs {
        EmbedArgs {
            cache_root: cache_root.to_path_buf(),
            db_path: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            refresh_mode,
            batch_size: 2,
            chunk_chars: 40,
            chunk_overlap: 5,
        }
    }

    fn chunk_rows(connection: &Connection) -> Vec<(String, String)> {
        let mut statement = connection
            .prepare("SELECT chunk_id, generated_at FROM chunks ORDER BY chunk_id")
            .expect("prepare");
        statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("query")
            .collect::<rusqlite::Result<Vec<(String, String)>>>()
            .expect("rows")
    }

    #[test]
    fn embed_skips_unchanged_chunks_and_removes_stale_ones() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let cache_root = workspace.path();
        let db_path = cache_root.join(crate::cli::DEFAULT_DB_FILENAME);

        let connection = open_read_write(&db_path).expect("db");
        let long_body = "Robots assemble cars. ".repeat(8);
        let long_id = insert_article(&connection, "news", "Factory", "2024-01-01", "", &long_body).expect("insert");
        insert_article(&connection, "news", "Short", "2024-01-02", "", "A short note.").expect("insert");
        insert_article(&connection, "news", "Empty", "2024-01-03", "", "   ").expect("insert");
        drop(connection);

        run(embed_args(cache_root, EmbedRefreshMode::MissingOrStale)).expect("first embed");
        let connection = Connection::open(&db_path).expect("open");
        let first = chunk_rows(&connection);
        assert!(first.len() > 2);
        assert!(first.iter().all(|(id, _)| !id.starts_with("3:")));

        run(embed_args(cache_root, EmbedRefreshMode::MissingOrStale)).expect("second embed");
        assert_eq!(chunk_rows(&connection), first);

        connection
            .execute("UPDATE articles SET content = 'Now short.' WHERE id = ?1", [long_id])
            .expect("shrink");
        run(embed_args(cache_root, EmbedRefreshMode::MissingOrStale)).expect("third embed");

        let after = chunk_rows(&connection)
            .into_iter()
            .map(|(id, _)| id)
            .collect::<Vec<String>>();
        assert_eq!(after, vec!["1:0".to_string(), "2:0".to_string()]);
    }

    #[test]
    fn full_refresh_rewrites_every_chunk() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let cache_root = workspace.path();
        let db_path = cache_root.join(crate::cli::DEFAULT_DB_FILENAME);

        let connection = open_read_write(&db_path).expect("db");
        insert_article(&connection, "news", "Short", "2024-01-02", "", "A short note.").expect("insert");
        drop(connection);

        run(embed_args(cache_root, EmbedRefreshMode::Full)).expect("first embed");
        let connection = Connection::open(&db_path).expect("open");
        connection
            .execute("UPDATE chunks SET generated_at = 'old'", [])
            .expect("mark");

        run(embed_args(cache_root, EmbedRefreshMode::Full)).expect("second embed");
        let rows = chunk_rows(&connection);
        assert_eq!(rows.len(), 1);
        assert_ne!(rows[0].1, "old");
    }
}
