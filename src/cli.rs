use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub const DEFAULT_CACHE_ROOT: &str = ".kbsearch";
pub const DEFAULT_DB_FILENAME: &str = "knowledge_base.sqlite";

#[derive(Parser, Debug)]
#[command(
    name = "kbsearch",
    version,
    about = "Multi-query retrieval and ranking over an embedded article knowledge base"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Embed(EmbedArgs),
    Search(SearchArgs),
    Filter(FilterArgs),
    Article(ArticleArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Source root as `NAME=DIR`; every `content.txt` below DIR is ingested under NAME.
    #[arg(long = "source-dir", required = true)]
    pub source_dirs: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub append: bool,

    #[arg(long)]
    pub ingest_manifest_path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbedRefreshMode {
    Full,
    MissingOrStale,
}

impl EmbedRefreshMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::MissingOrStale => "missing-or-stale",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value = crate::semantic::DEFAULT_MODEL_ID)]
    pub model_id: String,

    #[arg(long, value_enum, default_value_t = EmbedRefreshMode::MissingOrStale)]
    pub refresh_mode: EmbedRefreshMode,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = crate::semantic::DEFAULT_CHUNK_CHARS)]
    pub chunk_chars: usize,

    #[arg(long, default_value_t = crate::semantic::DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,
}

/// Settings for the query deriver; no endpoint means pass-through derivation.
#[derive(Args, Debug, Clone)]
pub struct DeriverArgs {
    #[arg(long)]
    pub llm_endpoint: Option<String>,

    #[arg(long, default_value = "gpt-4o-mini")]
    pub llm_model: String,

    #[arg(long, default_value_t = 20)]
    pub llm_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub query: String,

    #[arg(long, default_value_t = 10)]
    pub top_k: usize,

    /// Restrict to one source; `all` disables the filter.
    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, default_value = crate::semantic::DEFAULT_MODEL_ID)]
    pub model_id: String,

    #[arg(long)]
    pub fusion_config: Option<PathBuf>,

    #[command(flatten)]
    pub deriver: DeriverArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub keyword: Option<String>,

    #[arg(long)]
    pub start_date: Option<String>,

    #[arg(long)]
    pub end_date: Option<String>,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Fusion config JSON; only `snippet_chars` applies to filtering.
    #[arg(long)]
    pub fusion_config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ArticleArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub id: i64,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

pub fn resolve_db_path(cache_root: &std::path::Path, db_path: Option<&PathBuf>) -> PathBuf {
    db_path
        .cloned()
        .unwrap_or_else(|| cache_root.join(DEFAULT_DB_FILENAME))
}
