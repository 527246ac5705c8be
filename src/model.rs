use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "Untitled";
pub const UNKNOWN_DATE: &str = "Unknown";
pub const UNKNOWN_SOURCE: &str = "unknown";

/// A chunk returned by the similarity backend together with its article metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub article_id: Option<i64>,
    pub title: Option<String>,
    pub publish_date: Option<String>,
    pub source: Option<String>,
    pub content: String,
}

/// Externally visible result row for both search paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub id: i64,
    pub title: String,
    pub publish_date: String,
    pub source: String,
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDetail {
    pub id: i64,
    pub title: String,
    pub publish_date: String,
    pub source: String,
    pub link: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub articles: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub db_path: String,
    pub append: bool,
    pub sources: Vec<SourceCount>,
    pub skipped_files: usize,
    pub articles_total: i64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub model_id: String,
    pub model_name: String,
    pub embedding_dim: usize,
    pub backend: String,
    pub refresh_mode: String,
    pub chunk_chars: usize,
    pub chunk_overlap: usize,
    pub articles_scanned: usize,
    pub chunks_total: usize,
    pub chunks_updated: usize,
    pub chunks_removed: usize,
    pub batch_size: usize,
    pub duration_ms: u128,
    pub status: String,
    pub warnings: Vec<String>,
}
