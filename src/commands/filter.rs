use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::{resolve_db_path, FilterArgs};
use crate::commands::output::{write_json, write_ranked_text};
use crate::model::RankedResult;
use crate::retrieval::{Catalog, ConditionalQuery, FusionConfig};

#[derive(Debug, Serialize)]
struct FilterResponse<'a> {
    keyword: Option<&'a str>,
    start_date: Option<&'a str>,
    end_date: Option<&'a str>,
    source: Option<&'a str>,
    limit: usize,
    returned: usize,
    results: &'a [RankedResult],
}

pub fn run(args: FilterArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    let config = match &args.fusion_config {
        Some(path) => FusionConfig::load(path)?,
        None => FusionConfig::default(),
    };
    let catalog = Catalog::open(&db_path)
        .with_context(|| format!("article store unavailable at {}", db_path.display()))?
        .with_snippet_chars(config.snippet_chars);

    let query = ConditionalQuery {
        keyword: args.keyword.clone(),
        start_date: args.start_date.clone(),
        end_date: args.end_date.clone(),
        source: args.source.clone(),
        limit: args.limit,
    };
    let results = catalog.conditional_search(&query)?;

    if args.json {
        return write_json(&FilterResponse {
            keyword: query.keyword.as_deref(),
            start_date: query.start_date.as_deref(),
            end_date: query.end_date.as_deref(),
            source: query.source.as_deref(),
            limit: query.limit,
            returned: results.len(),
            results: &results,
        });
    }

    let header = vec![format!(
        "Filter: keyword={} dates={}..{} source={} limit={}",
        query.keyword.as_deref().unwrap_or("-"),
        query.start_date.as_deref().unwrap_or(""),
        query.end_date.as_deref().unwrap_or(""),
        query.source.as_deref().unwrap_or("all"),
        query.limit,
    )];
    write_ranked_text(&header, &results)
}
