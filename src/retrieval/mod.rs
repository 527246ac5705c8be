//! Multi-query retrieval: derive query variants, fan out one similarity
//! search per variant, and fuse the hit lists into one ranked list.

mod backend;
mod catalog;
mod conditional;
mod config;
mod deriver;
mod fanout;
mod format;
mod fusion;
mod service;

pub use backend::SqliteVectorBackend;
pub use catalog::Catalog;
pub use conditional::ConditionalQuery;
pub use config::FusionConfig;
pub use deriver::{HttpDeriver, HttpDeriverConfig, PassthroughDeriver, QueryDeriver};
pub use service::{RetrievalService, SearchOutcome};
