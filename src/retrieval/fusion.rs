use std::collections::HashMap;

use tracing::debug;

use crate::model::{Document, RankedResult};

use super::config::FusionConfig;
use super::fanout::RawHit;
use super::format::to_ranked_result;

/// Per-request aggregation of every hit for one article.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Candidate {
    pub(super) article_id: i64,
    pub(super) document: Document,
    pub(super) best_similarity: f64,
    pub(super) variants: Vec<usize>,
    pub(super) hit_by_original: bool,
}

impl Candidate {
    fn seed(hit: &RawHit, similarity: f64) -> Self {
        Self {
            article_id: hit.article_id,
            document: hit.document.clone(),
            best_similarity: similarity,
            variants: vec![hit.variant],
            hit_by_original: hit.variant == 0,
        }
    }

    fn absorb(&mut self, hit: &RawHit, similarity: f64) {
        if similarity > self.best_similarity {
            self.best_similarity = similarity;
            self.document = hit.document.clone();
        }
        if !self.variants.contains(&hit.variant) {
            self.variants.push(hit.variant);
        }
        self.hit_by_original |= hit.variant == 0;
    }

    /// Distinct variants that returned this article.
    pub(super) fn hit_count(&self) -> usize {
        self.variants.len()
    }

    pub(super) fn score(&self, config: &FusionConfig) -> f64 {
        let weight = if self.hit_by_original {
            config.original_weight
        } else {
            config.expanded_weight
        };
        let extra_hits = self.hit_count().saturating_sub(1) as f64;
        self.best_similarity * weight + config.frequency_boost * extra_hits
    }
}

/// Cosine distance to similarity; distances outside [0, 1] pass through unchecked.
fn similarity(distance: f64) -> f64 {
    1.0 - distance
}

/// Collapses hits into one candidate per article, in first-seen order.
pub(super) fn aggregate(hits: &[RawHit]) -> Vec<Candidate> {
    let mut index = HashMap::<i64, usize>::new();
    let mut arena = Vec::<Candidate>::new();

    for hit in hits {
        let similarity = similarity(hit.distance);
        match index.get(&hit.article_id) {
            Some(&slot) => arena[slot].absorb(hit, similarity),
            None => {
                index.insert(hit.article_id, arena.len());
                arena.push(Candidate::seed(hit, similarity));
            }
        }
    }

    arena
}

/// Scores, thresholds, and ranks the hits of one request.
///
/// Order is score descending, then article id ascending. At most `top_k`
/// results are returned; an empty list is a valid outcome.
pub fn fuse(hits: &[RawHit], top_k: usize, config: &FusionConfig) -> Vec<RankedResult> {
    let candidates = aggregate(hits);
    let candidate_count = candidates.len();

    let mut scored = candidates
        .into_iter()
        .map(|candidate| {
            let score = candidate.score(config);
            (candidate, score)
        })
        .filter(|(_, score)| *score >= config.min_relevance)
        .collect::<Vec<(Candidate, f64)>>();
    let passing_count = scored.len();

    scored.sort_by(|left, right| {
        right
            .1
            .total_cmp(&left.1)
            .then(left.0.article_id.cmp(&right.0.article_id))
    });
    scored.truncate(top_k);

    debug!(
        hits = hits.len(),
        candidate_count,
        passing_count,
        returned = scored.len(),
        "fusion completed"
    );

    scored
        .iter()
        .map(|(candidate, score)| {
            to_ranked_result(
                candidate.article_id,
                &candidate.document,
                *score,
                config.snippet_chars,
            )
        })
        .collect()
}
