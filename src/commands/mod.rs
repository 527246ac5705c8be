pub mod article;
pub mod embed;
pub mod filter;
pub mod ingest;
mod output;
pub mod search;
pub mod status;
