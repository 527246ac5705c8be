use anyhow::Result;
use tracing::{info, warn};

use crate::cli::{resolve_db_path, StatusArgs};
use crate::store::{
    count_rows, date_extremes, open_read_only, schema_version, source_counts, table_exists,
};

const EXTREME_SAMPLE: usize = 2;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    info!(cache_root = %args.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let conn = open_read_only(&db_path)?;
    if !table_exists(&conn, "articles")? {
        warn!(path = %db_path.display(), "articles table missing; run ingest");
        return Ok(());
    }

    let articles = count_rows(&conn, "SELECT COUNT(*) FROM articles")?;
    let chunks = if table_exists(&conn, "chunks")? {
        count_rows(&conn, "SELECT COUNT(*) FROM chunks")?
    } else {
        0
    };
    let db_schema_version = schema_version(&conn)?.unwrap_or_default();

    info!(
        path = %db_path.display(),
        schema_version = %db_schema_version,
        articles,
        chunks,
        "database status"
    );

    for count in source_counts(&conn)? {
        info!(source = %count.source, articles = count.articles, "source status");

        for (date, title) in date_extremes(&conn, &count.source, false, EXTREME_SAMPLE)? {
            info!(source = %count.source, publish_date = %date, title = %title, "oldest article");
        }
        for (date, title) in date_extremes(&conn, &count.source, true, EXTREME_SAMPLE)? {
            info!(source = %count.source, publish_date = %date, title = %title, "newest article");
        }
    }

    if chunks == 0 {
        warn!(path = %db_path.display(), "no chunk embeddings; run embed before search");
    }

    Ok(())
}
