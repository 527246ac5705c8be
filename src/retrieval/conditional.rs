use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::info;

use crate::error::{RetrievalError, RetrievalResult};
use crate::model::{RankedResult, UNKNOWN_DATE, UNTITLED};

use super::format::make_snippet;

const CONDITIONAL_SCORE: f64 = 1.0;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Exact-match search over the article table; no embeddings involved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalQuery {
    pub keyword: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub source: Option<String>,
    pub limit: usize,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn validated_date<'a>(label: &str, value: Option<&'a str>) -> RetrievalResult<Option<&'a str>> {
    let Some(value) = non_blank(value) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|err| {
        RetrievalError::InvalidRequest(format!("{label} '{value}' is not YYYY-MM-DD: {err}"))
    })?;
    Ok(Some(value))
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for character in value.chars() {
        if matches!(character, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(character);
    }
    out
}

/// Matches articles whose title contains the keyword, or whose content
/// contains it at least twice. The content clause is the `%kw%kw%` LIKE
/// pattern: two non-overlapping occurrences, ASCII case-insensitive, so
/// overlapping repeats such as `aa` in `aaa` are not counted.
///
/// Results are newest first (publish date, then id) with a fixed score.
pub(super) fn conditional_search(
    connection: &Connection,
    query: &ConditionalQuery,
    snippet_chars: usize,
) -> RetrievalResult<Vec<RankedResult>> {
    let start_date = validated_date("start_date", query.start_date.as_deref())?;
    let end_date = validated_date("end_date", query.end_date.as_deref())?;
    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "
        SELECT id, title, publish_date, source, COALESCE(content, '')
        FROM articles
        WHERE 1=1
        ",
    );
    let mut bindings = Vec::<Value>::new();

    let keyword = non_blank(query.keyword.as_deref());
    if let Some(keyword) = keyword {
        let escaped = escape_like(keyword);
        sql.push_str(" AND (title LIKE ? ESCAPE '\\' OR content LIKE ? ESCAPE '\\')");
        bindings.push(Value::Text(format!("%{escaped}%")));
        bindings.push(Value::Text(format!("%{escaped}%{escaped}%")));
    }

    if let Some(start_date) = start_date {
        sql.push_str(" AND publish_date >= ?");
        bindings.push(Value::Text(start_date.to_string()));
    }

    if let Some(end_date) = end_date {
        sql.push_str(" AND publish_date <= ?");
        bindings.push(Value::Text(end_date.to_string()));
    }

    let source = non_blank(query.source.as_deref()).filter(|value| *value != "all");
    if let Some(source) = source {
        sql.push_str(" AND source = ?");
        bindings.push(Value::Text(source.to_string()));
    }

    sql.push_str(" ORDER BY publish_date DESC, id DESC LIMIT ?");
    bindings.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));

    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map(params_from_iter(bindings), |row| {
        let content = row.get::<_, String>(4)?;
        Ok(RankedResult {
            id: row.get(0)?,
            title: row
                .get::<_, Option<String>>(1)?
                .unwrap_or_else(|| UNTITLED.to_string()),
            publish_date: row
                .get::<_, Option<String>>(2)?
                .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
            source: row.get(3)?,
            snippet: make_snippet(&content, snippet_chars),
            score: CONDITIONAL_SCORE,
        })
    })?;

    let mut results = Vec::<RankedResult>::new();
    for row in rows {
        results.push(row?);
    }

    info!(
        keyword = ?keyword,
        start_date = ?start_date,
        end_date = ?end_date,
        source = ?source,
        limit = query.limit,
        result_count = results.len(),
        "conditional search completed"
    );

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{insert_article, memory_store};

    fn seeded() -> Connection {
        let connection = memory_store();
        insert_article(&connection, "news", "Robot week", "2024-03-01", "", "campus event").expect("insert");
        insert_article(&connection, "news", "Lab notes", "2024-02-01", "", "robot arms and a robot hand").expect("insert");
        insert_article(&connection, "wechat", "Lab diary", "2023-12-24", "", "one robot only").expect("insert");
        insert_article(&connection, "wechat", "Finance", "2022-01-01", "", "revenue 100% growth").expect("insert");
        connection
    }

    fn keyword_query(keyword: &str) -> ConditionalQuery {
        ConditionalQuery {
            keyword: Some(keyword.to_string()),
            limit: 10,
            ..ConditionalQuery::default()
        }
    }

    #[test]
    fn content_needs_two_occurrences_unless_title_matches() {
        let connection = seeded();
        let results = conditional_search(&connection, &keyword_query("robot"), 200).expect("search");

        let titles = results.iter().map(|result| result.title.as_str()).collect::<Vec<&str>>();
        assert_eq!(titles, vec!["Robot week", "Lab notes"]);
        assert!(results.iter().all(|result| result.score == 1.0));
    }

    #[test]
    fn date_range_and_source_filters_combine() {
        let connection = seeded();
        let query = ConditionalQuery {
            start_date: Some("2023-01-01".to_string()),
            end_date: Some("2024-02-15".to_string()),
            source: Some("wechat".to_string()),
            limit: 10,
            ..ConditionalQuery::default()
        };
        let results = conditional_search(&connection, &query, 200).expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Lab diary");
    }

    #[test]
    fn all_sentinel_and_limit_are_honoured() {
        let connection = seeded();
        let query = ConditionalQuery {
            source: Some("all".to_string()),
            limit: 2,
            ..ConditionalQuery::default()
        };
        let results = conditional_search(&connection, &query, 200).expect("search");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].publish_date, "2024-03-01");
        assert_eq!(results[1].publish_date, "2024-02-01");

        let none = ConditionalQuery {
            limit: 0,
            ..ConditionalQuery::default()
        };
        assert!(conditional_search(&connection, &none, 200).expect("search").is_empty());
    }

    #[test]
    fn like_wildcards_in_keyword_are_literal() {
        let connection = seeded();
        let results = conditional_search(&connection, &keyword_query("_"), 200).expect("search");
        assert!(results.is_empty());

        let results = conditional_search(&connection, &keyword_query("%"), 200).expect("search");
        assert!(results.is_empty());
    }

    #[test]
    fn malformed_dates_are_rejected() {
        let connection = seeded();
        let query = ConditionalQuery {
            start_date: Some("March 2024".to_string()),
            limit: 10,
            ..ConditionalQuery::default()
        };
        let err = conditional_search(&connection, &query, 200).expect_err("bad date");
        assert!(matches!(err, RetrievalError::InvalidRequest(_)));
    }
}
