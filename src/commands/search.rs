use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{resolve_db_path, DeriverArgs, SearchArgs};
use crate::commands::output::{write_json, write_ranked_text};
use crate::retrieval::{
    FusionConfig, HttpDeriver, HttpDeriverConfig, PassthroughDeriver, QueryDeriver,
    RetrievalService, SearchOutcome, SqliteVectorBackend,
};

pub fn run(args: SearchArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());
    let config = match &args.fusion_config {
        Some(path) => FusionConfig::load(path)?,
        None => FusionConfig::default(),
    };

    let backend = SqliteVectorBackend::open(&db_path, &args.model_id)
        .with_context(|| format!("vector index unavailable at {}", db_path.display()))?;
    info!(
        db_path = %db_path.display(),
        model_id = %backend.model().model_id,
        top_k = args.top_k,
        "vector index opened"
    );

    let outcome = match http_deriver(&args.deriver)? {
        Some(deriver) => execute(backend, deriver, config, &args)?,
        None => execute(backend, PassthroughDeriver, config, &args)?,
    };

    if args.json {
        write_json(&outcome)
    } else {
        write_ranked_text(&text_header(&outcome), &outcome.results)
    }
}

fn http_deriver(args: &DeriverArgs) -> Result<Option<HttpDeriver>> {
    let Some(endpoint) = args.llm_endpoint.as_deref() else {
        return Ok(None);
    };

    info!(endpoint, model = %args.llm_model, timeout_secs = args.llm_timeout_secs, "using llm query deriver");
    let config = HttpDeriverConfig::new(endpoint, args.llm_model.clone(), args.llm_timeout_secs);
    let deriver = HttpDeriver::new(config).context("failed to build llm query deriver")?;
    Ok(Some(deriver))
}

fn execute<D: QueryDeriver>(
    backend: SqliteVectorBackend,
    deriver: D,
    config: FusionConfig,
    args: &SearchArgs,
) -> Result<SearchOutcome> {
    let service = RetrievalService::new(backend, deriver, config);
    let outcome = service
        .search(&args.query, args.top_k, args.source.as_deref())
        .with_context(|| format!("search failed for query '{}'", args.query))?;
    Ok(outcome)
}

fn text_header(outcome: &SearchOutcome) -> Vec<String> {
    let mut header = vec![format!("Query: {}", outcome.query)];
    header.push(format!("Core query: {}", outcome.variants.core()));

    let expansions = &outcome.variants.queries()[1..];
    if !expansions.is_empty() {
        header.push(format!("Expansions: {}", expansions.join(", ")));
    }
    if outcome.variants.degraded() {
        header.push("Note: query derivation degraded; searched with fallback query".to_string());
    }
    header.push(format!(
        "Source: {}  top_k: {}  raw hits: {}",
        outcome.source_filter.as_deref().unwrap_or("all"),
        outcome.top_k,
        outcome.hit_count,
    ));
    header
}
