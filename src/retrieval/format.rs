use crate::model::{Document, RankedResult, UNKNOWN_DATE, UNKNOWN_SOURCE, UNTITLED};
use crate::util::truncate_chars;

const ELLIPSIS: &str = "...";

pub fn make_snippet(content: &str, max_chars: usize) -> String {
    format!("{}{ELLIPSIS}", truncate_chars(content, max_chars))
}

pub fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

pub fn to_ranked_result(
    article_id: i64,
    document: &Document,
    score: f64,
    snippet_chars: usize,
) -> RankedResult {
    RankedResult {
        id: article_id,
        title: document
            .title
            .clone()
            .unwrap_or_else(|| UNTITLED.to_string()),
        publish_date: document
            .publish_date
            .clone()
            .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
        source: document
            .source
            .clone()
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        snippet: make_snippet(&document.content, snippet_chars),
        score: round_score(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_always_carries_the_ellipsis() {
        assert_eq!(make_snippet("short", 200), "short...");
        let long = "机".repeat(250);
        let snippet = make_snippet(&long, 200);
        assert_eq!(snippet.chars().count(), 203);
    }

    #[test]
    fn scores_round_to_four_places() {
        assert_eq!(round_score(0.123456), 0.1235);
        assert_eq!(round_score(0.85), 0.85);
    }

    #[test]
    fn missing_metadata_uses_placeholders() {
        let document = Document {
            article_id: Some(3),
            title: None,
            publish_date: None,
            source: None,
            content: "body".to_string(),
        };
        let result = to_ranked_result(3, &document, 0.5, 200);
        assert_eq!(result.title, "Untitled");
        assert_eq!(result.publish_date, "Unknown");
        assert_eq!(result.source, "unknown");
        assert_eq!(result.snippet, "body...");
    }
}
