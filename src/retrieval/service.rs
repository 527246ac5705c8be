use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::error::{RetrievalError, RetrievalResult};
use crate::model::RankedResult;

use super::backend::SearchBackend;
use super::config::FusionConfig;
use super::deriver::QueryDeriver;
use super::fanout::{fan_out, source_filter, QueryVariants};
use super::fusion::fuse;

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub variants: QueryVariants,
    pub top_k: usize,
    pub source_filter: Option<String>,
    pub hit_count: usize,
    pub results: Vec<RankedResult>,
}

/// Embedding-fusion search over a backend and a query deriver. Holds no
/// per-request state.
pub struct RetrievalService<B, D> {
    backend: B,
    deriver: D,
    config: FusionConfig,
}

impl<B: SearchBackend, D: QueryDeriver> RetrievalService<B, D> {
    pub fn new(backend: B, deriver: D, config: FusionConfig) -> Self {
        Self {
            backend,
            deriver,
            config,
        }
    }

    pub fn search(
        &self,
        user_query: &str,
        top_k: usize,
        source: Option<&str>,
    ) -> RetrievalResult<SearchOutcome> {
        let started = Instant::now();
        let user_query = user_query.trim();
        if user_query.is_empty() {
            return Err(RetrievalError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let filter = source_filter(source);
        let variants = QueryVariants::derive(&self.deriver, user_query, self.config.max_expansions);

        let (hit_count, results) = if top_k == 0 {
            (0, Vec::new())
        } else {
            let hits = fan_out(&self.backend, &variants, top_k, filter.as_ref(), &self.config)?;
            (hits.len(), fuse(&hits, top_k, &self.config))
        };

        let source_filter = filter
            .as_ref()
            .and_then(|filter| filter.get("source"))
            .map(str::to_string);

        info!(
            query = %user_query,
            core_query = %variants.core(),
            variant_count = variants.len(),
            derivation_degraded = variants.degraded(),
            source_filter = ?source_filter,
            top_k,
            hit_count,
            result_count = results.len(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "search completed"
        );

        Ok(SearchOutcome {
            query: user_query.to_string(),
            variants,
            top_k,
            source_filter,
            hit_count,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model::Document;
    use crate::retrieval::backend::SearchFilter;
    use crate::retrieval::deriver::DeriveError;

    struct ScenarioBackend {
        calls: AtomicUsize,
    }

    fn document(article_id: i64, content: &str) -> Document {
        Document {
            article_id: Some(article_id),
            title: Some(format!("doc {article_id}")),
            publish_date: Some("2024-05-01".to_string()),
            source: Some("news".to_string()),
            content: content.to_string(),
        }
    }

    impl SearchBackend for ScenarioBackend {
        fn search(
            &self,
            query: &str,
            _k: usize,
            _filter: Option<&SearchFilter>,
        ) -> RetrievalResult<Vec<(Document, f64)>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match query {
                "core" => vec![(document(1, "A body"), 0.2), (document(2, "B body"), 0.5)],
                "expansion" => vec![(document(1, "A body"), 0.3), (document(3, "C body"), 0.5)],
                _ => Vec::new(),
            })
        }
    }

    struct UnavailableBackend;

    impl SearchBackend for UnavailableBackend {
        fn search(
            &self,
            _query: &str,
            _k: usize,
            _filter: Option<&SearchFilter>,
        ) -> RetrievalResult<Vec<(Document, f64)>> {
            Err(RetrievalError::BackendUnavailable("index offline".to_string()))
        }
    }

    struct ScenarioDeriver;

    impl QueryDeriver for ScenarioDeriver {
        fn derive(&self, _text: &str) -> Result<String, DeriveError> {
            Ok("core".to_string())
        }

        fn expand(&self, _text: &str) -> Result<Vec<String>, DeriveError> {
            Ok(vec!["expansion".to_string()])
        }
    }

    struct BrokenDeriver;

    impl QueryDeriver for BrokenDeriver {
        fn derive(&self, _text: &str) -> Result<String, DeriveError> {
            Err(DeriveError::EmptyResponse)
        }

        fn expand(&self, _text: &str) -> Result<Vec<String>, DeriveError> {
            Err(DeriveError::EmptyResponse)
        }
    }

    fn scenario_backend() -> ScenarioBackend {
        ScenarioBackend {
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn search_fuses_core_and_expansion_hits() {
        let service = RetrievalService::new(scenario_backend(), ScenarioDeriver, FusionConfig::default());
        let outcome = service.search("tell me about A", 10, Some("all")).expect("search");

        assert_eq!(outcome.variants.queries(), ["core", "expansion"]);
        assert_eq!(outcome.source_filter, None);
        assert_eq!(outcome.hit_count, 4);

        let ranked = outcome
            .results
            .iter()
            .map(|result| (result.id, result.score))
            .collect::<Vec<(i64, f64)>>();
        assert_eq!(ranked, vec![(1, 0.85), (2, 0.5)]);
        assert_eq!(outcome.results[0].snippet, "A body...");
    }

    #[test]
    fn derivation_failure_searches_the_raw_query() {
        let service = RetrievalService::new(scenario_backend(), BrokenDeriver, FusionConfig::default());
        let outcome = service.search("core", 10, None).expect("search");

        assert!(outcome.variants.degraded());
        assert_eq!(outcome.variants.queries(), ["core"]);
        assert_eq!(outcome.results.len(), 2);
    }

    #[test]
    fn unavailable_backend_fails_the_request() {
        let service = RetrievalService::new(UnavailableBackend, ScenarioDeriver, FusionConfig::default());
        let err = service.search("robots", 5, None).expect_err("backend down");
        assert!(matches!(err, RetrievalError::BackendUnavailable(_)));
    }

    #[test]
    fn zero_top_k_skips_the_backend() {
        let backend = scenario_backend();
        let service = RetrievalService::new(&backend, ScenarioDeriver, FusionConfig::default());
        let outcome = service.search("robots", 0, Some("news")).expect("search");

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.source_filter.as_deref(), Some("news"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn blank_query_is_rejected() {
        let service = RetrievalService::new(scenario_backend(), ScenarioDeriver, FusionConfig::default());
        let err = service.search("   ", 5, None).expect_err("blank");
        assert!(matches!(err, RetrievalError::InvalidRequest(_)));
    }
}
