use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::error::{RetrievalError, RetrievalResult};
use crate::model::Document;

use super::backend::{SearchBackend, SearchFilter};
use super::config::FusionConfig;
use super::deriver::{derive_core_query, derive_expansions, QueryDeriver};

const ALL_SOURCES: &str = "all";

/// Ordered query list: index 0 is the core query, the rest are expansions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryVariants {
    queries: Vec<String>,
    core_degraded: bool,
    expansion_degraded: bool,
}

impl QueryVariants {
    pub fn derive<D: QueryDeriver + ?Sized>(
        deriver: &D,
        user_query: &str,
        max_expansions: usize,
    ) -> Self {
        let core = derive_core_query(deriver, user_query);
        let core_degraded = core.is_degraded();
        let core = core.into_inner();

        let expansions = derive_expansions(deriver, &core, max_expansions);
        let expansion_degraded = expansions.is_degraded();

        let mut queries = Vec::with_capacity(1 + max_expansions);
        queries.push(core);
        queries.extend(expansions.into_inner());

        Self {
            queries,
            core_degraded,
            expansion_degraded,
        }
    }

    pub fn core(&self) -> &str {
        &self.queries[0]
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn degraded(&self) -> bool {
        self.core_degraded || self.expansion_degraded
    }
}

#[cfg(test)]
impl QueryVariants {
    pub(crate) fn from_queries(queries: &[&str]) -> Self {
        assert!(!queries.is_empty(), "variants need a core query");
        Self {
            queries: queries.iter().map(|value| value.to_string()).collect(),
            core_degraded: false,
            expansion_degraded: false,
        }
    }
}

/// One `(document, distance)` pair tagged with the variant that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub article_id: i64,
    pub document: Document,
    pub distance: f64,
    pub variant: usize,
}

/// Result count requested for variant `index`: the core query gets wide recall.
pub fn variant_budget(index: usize, top_k: usize, config: &FusionConfig) -> usize {
    if index == 0 {
        config
            .original_floor
            .max(top_k.saturating_mul(config.original_multiplier))
    } else {
        top_k
    }
}

/// `None` when the caller asked for every source.
pub fn source_filter(source: Option<&str>) -> Option<SearchFilter> {
    source
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != ALL_SOURCES)
        .map(SearchFilter::source)
}

/// Issues one search per variant in parallel and returns the tagged hits in
/// variant order. Hits without an article id are dropped.
pub fn fan_out<B: SearchBackend + ?Sized>(
    backend: &B,
    variants: &QueryVariants,
    top_k: usize,
    filter: Option<&SearchFilter>,
    config: &FusionConfig,
) -> RetrievalResult<Vec<RawHit>> {
    let per_variant = variants
        .queries()
        .par_iter()
        .enumerate()
        .map(|(index, query)| -> RetrievalResult<(usize, Vec<(Document, f64)>)> {
            let budget = variant_budget(index, top_k, config);
            let hits = backend
                .search(query, budget, filter)
                .map_err(|source| match source {
                    unavailable @ RetrievalError::BackendUnavailable(_) => unavailable,
                    other => RetrievalError::Search {
                        variant: index,
                        source: Box::new(other),
                    },
                })?;
            debug!(variant = index, query = %query, budget, hits = hits.len(), "variant searched");
            Ok((index, hits))
        })
        .collect::<RetrievalResult<Vec<_>>>()?;

    let mut out = Vec::<RawHit>::new();
    let mut dropped = 0usize;
    for (variant, hits) in per_variant {
        for (document, distance) in hits {
            let Some(article_id) = document.article_id else {
                dropped += 1;
                continue;
            };
            out.push(RawHit {
                article_id,
                document,
                distance,
                variant,
            });
        }
    }

    if dropped > 0 {
        debug!(dropped, "dropped hits without article id");
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::retrieval::deriver::DeriveError;

    #[derive(Default)]
    struct RecordingBackend {
        responses: HashMap<String, Vec<(Document, f64)>>,
        failing_query: Option<String>,
        calls: Mutex<Vec<(String, usize, Option<SearchFilter>)>>,
    }

    impl SearchBackend for RecordingBackend {
        fn search(
            &self,
            query: &str,
            k: usize,
            filter: Option<&SearchFilter>,
        ) -> RetrievalResult<Vec<(Document, f64)>> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((query.to_string(), k, filter.cloned()));
            if self.failing_query.as_deref() == Some(query) {
                return Err(RetrievalError::InvalidRequest("boom".to_string()));
            }
            Ok(self.responses.get(query).cloned().unwrap_or_default())
        }
    }

    struct FixedDeriver;

    impl QueryDeriver for FixedDeriver {
        fn derive(&self, _text: &str) -> Result<String, DeriveError> {
            Ok("robot".to_string())
        }

        fn expand(&self, _text: &str) -> Result<Vec<String>, DeriveError> {
            Ok(vec!["robotics".to_string(), "automaton".to_string()])
        }
    }

    fn document(article_id: Option<i64>) -> Document {
        Document {
            article_id,
            title: Some("t".to_string()),
            publish_date: None,
            source: Some("news".to_string()),
            content: "body".to_string(),
        }
    }

    #[test]
    fn variants_put_core_query_first() {
        let variants = QueryVariants::derive(&FixedDeriver, "show me robot articles", 4);
        assert_eq!(variants.queries(), ["robot", "robotics", "automaton"]);
        assert_eq!(variants.core(), "robot");
        assert!(!variants.degraded());
    }

    #[test]
    fn budgets_widen_the_core_query() {
        let config = FusionConfig::default();
        assert_eq!(variant_budget(0, 3, &config), 20);
        assert_eq!(variant_budget(0, 10, &config), 40);
        assert_eq!(variant_budget(1, 10, &config), 10);
        assert_eq!(variant_budget(4, 3, &config), 3);
    }

    #[test]
    fn source_filter_ignores_all_sentinel_and_blank() {
        assert_eq!(source_filter(None), None);
        assert_eq!(source_filter(Some("all")), None);
        assert_eq!(source_filter(Some("  ")), None);
        assert_eq!(source_filter(Some("wechat")), Some(SearchFilter::source("wechat")));
    }

    #[test]
    fn fan_out_tags_hits_and_drops_missing_ids() {
        let mut backend = RecordingBackend::default();
        backend.responses.insert(
            "robot".to_string(),
            vec![(document(Some(1)), 0.2), (document(None), 0.1)],
        );
        backend
            .responses
            .insert("robotics".to_string(), vec![(document(Some(1)), 0.3)]);

        let variants = QueryVariants::from_queries(&["robot", "robotics"]);
        let filter = SearchFilter::source("news");
        let hits = fan_out(&backend, &variants, 5, Some(&filter), &FusionConfig::default())
            .expect("fan out");

        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].article_id, hits[0].variant), (1, 0));
        assert_eq!((hits[1].article_id, hits[1].variant), (1, 1));

        let mut calls = backend.calls.into_inner().expect("calls");
        calls.sort_by(|left, right| left.0.cmp(&right.0));
        assert_eq!(calls[0], ("robot".to_string(), 20, Some(filter.clone())));
        assert_eq!(calls[1], ("robotics".to_string(), 5, Some(filter)));
    }

    #[test]
    fn fan_out_propagates_variant_failures() {
        let backend = RecordingBackend {
            failing_query: Some("robotics".to_string()),
            ..RecordingBackend::default()
        };
        let variants = QueryVariants::from_queries(&["robot", "robotics"]);

        let err = fan_out(&backend, &variants, 5, None, &FusionConfig::default())
            .expect_err("variant failure");
        assert!(matches!(err, RetrievalError::Search { variant: 1, .. }));
    }
}
