use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{resolve_db_path, ArticleArgs};
use crate::commands::output::write_json;
use crate::retrieval::Catalog;

pub fn run(args: ArticleArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    let catalog = Catalog::open(&db_path)
        .with_context(|| format!("article store unavailable at {}", db_path.display()))?;

    let article = catalog.article(args.id)?;
    info!(id = article.id, source = %article.source, "article loaded");

    if args.json {
        return write_json(&article);
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "{}", article.title)?;
    writeln!(output, "id={} source={} date={}", article.id, article.source, article.publish_date)?;
    if !article.link.is_empty() {
        writeln!(output, "link: {}", article.link)?;
    }
    writeln!(output)?;
    writeln!(output, "{}", article.content)?;
    output.flush()?;
    Ok(())
}
