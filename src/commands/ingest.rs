use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use regex::Regex;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::{resolve_db_path, IngestArgs};
use crate::model::{IngestRunManifest, SourceCount};
use crate::store::{count_rows, insert_article, open_read_write, source_counts, DB_SCHEMA_VERSION};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

const CONTENT_FILENAME: &str = "content.txt";
const HEADER_SEPARATOR: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceRoot {
    name: String,
    dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ParsedArticle {
    title: String,
    publish_date: String,
    link: String,
    content: String,
}

struct HeaderParser {
    pattern: Regex,
}

impl HeaderParser {
    fn new() -> Result<Self> {
        let pattern = Regex::new(r"^(标题|日期|链接)\s*[:：]\s*(.*)$")
            .context("failed to compile article header regex")?;
        Ok(Self { pattern })
    }

    /// Header lines up to the first `---` line, then the body verbatim.
    /// Unknown header lines are ignored; a file without a separator has no body.
    fn parse(&self, raw: &str) -> ParsedArticle {
        let mut article = ParsedArticle::default();
        let mut body_lines = Vec::<&str>::new();
        let mut in_header = true;

        for line in raw.split_inclusive('\n') {
            if !in_header {
                body_lines.push(line);
                continue;
            }

            let trimmed = line.trim();
            if trimmed.starts_with(HEADER_SEPARATOR) {
                in_header = false;
                continue;
            }

            let Some(captures) = self.pattern.captures(trimmed) else {
                continue;
            };
            let value = captures
                .get(2)
                .map(|value| value.as_str().trim().to_string())
                .unwrap_or_default();
            match captures.get(1).map(|key| key.as_str()) {
                Some("标题") => article.title = value,
                Some("日期") => article.publish_date = value,
                Some("链接") => article.link = value,
                _ => {}
            }
        }

        article.content = body_lines.concat().trim().to_string();
        article
    }
}

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("ingest-{}", utc_compact_string(started_ts));

    let source_roots = args
        .source_dirs
        .iter()
        .map(|value| parse_source_root(value))
        .collect::<Result<Vec<SourceRoot>>>()?;

    ensure_directory(&args.cache_root)?;
    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    let ingest_manifest_path = args.ingest_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("ingest_run_{}.json", utc_compact_string(started_ts)))
    });
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_ref());

    info!(
        db_path = %db_path.display(),
        run_id = %run_id,
        sources = source_roots.len(),
        append = args.append,
        "starting ingest"
    );

    let mut connection = open_read_write(&db_path)?;
    if !args.append {
        clear_articles(&connection)?;
    }

    let parser = HeaderParser::new()?;
    let mut warnings = Vec::<String>::new();
    let mut skipped_files = 0usize;
    let mut ingested = Vec::<SourceCount>::new();

    for root in &source_roots {
        if !root.dir.is_dir() {
            warn!(source = %root.name, dir = %root.dir.display(), "source directory not found");
            warnings.push(format!("source directory not found: {}", root.dir.display()));
            ingested.push(SourceCount {
                source: root.name.clone(),
                articles: 0,
            });
            continue;
        }

        let stats = ingest_source(&mut connection, &parser, root)?;
        skipped_files += stats.skipped_files;
        ingested.push(SourceCount {
            source: root.name.clone(),
            articles: stats.inserted,
        });
    }

    let articles_total = count_rows(&connection, "SELECT COUNT(*) FROM articles")?;
    for count in source_counts(&connection)? {
        info!(source = %count.source, articles = count.articles, "source summary");
    }

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id,
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        db_path: db_path.display().to_string(),
        append: args.append,
        sources: ingested,
        skipped_files,
        articles_total,
        warnings,
    };
    write_json_pretty(&ingest_manifest_path, &manifest)?;

    info!(
        path = %ingest_manifest_path.display(),
        articles_total,
        skipped_files,
        "ingest completed"
    );

    Ok(())
}

fn parse_source_root(value: &str) -> Result<SourceRoot> {
    let Some((name, dir)) = value.split_once('=') else {
        bail!("--source-dir expects NAME=DIR, got '{value}'");
    };
    let name = name.trim();
    let dir = dir.trim();
    if name.is_empty() || dir.is_empty() {
        bail!("--source-dir expects NAME=DIR, got '{value}'");
    }
    if name == "all" {
        bail!("'all' is reserved and cannot be used as a source name");
    }

    Ok(SourceRoot {
        name: name.to_string(),
        dir: PathBuf::from(dir),
    })
}

fn clear_articles(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            DELETE FROM chunks;
            DELETE FROM articles;
            DELETE FROM sqlite_sequence WHERE name = 'articles';
            ",
        )
        .context("failed to clear existing articles")?;
    Ok(())
}

#[derive(Debug, Default)]
struct SourceIngestStats {
    inserted: usize,
    skipped_files: usize,
}

fn ingest_source(
    connection: &mut Connection,
    parser: &HeaderParser,
    root: &SourceRoot,
) -> Result<SourceIngestStats> {
    let mut files = Vec::<PathBuf>::new();
    collect_content_files(&root.dir, &mut files)?;
    files.sort();

    let mut stats = SourceIngestStats::default();
    let tx = connection.transaction()?;
    for path in &files {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable article file");
                stats.skipped_files += 1;
                continue;
            }
        };

        let article = parser.parse(&raw);
        insert_article(
            &tx,
            &root.name,
            &article.title,
            &article.publish_date,
            &article.link,
            &article.content,
        )
        .with_context(|| format!("failed to insert {}", path.display()))?;
        stats.inserted += 1;

        if stats.inserted % 100 == 0 {
            info!(source = %root.name, inserted = stats.inserted, "ingest progress");
        }
    }
    tx.commit()?;

    info!(
        source = %root.name,
        dir = %root.dir.display(),
        inserted = stats.inserted,
        skipped_files = stats.skipped_files,
        "source ingested"
    );
    Ok(stats)
}

fn collect_content_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", path.display()))?;

        if file_type.is_dir() {
            collect_content_files(&path, out)?;
        } else if file_type.is_file() && entry.file_name() == CONTENT_FILENAME {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::load_article;

    const SAMPLE: &str = "标题: 机器人实验室开放日\n作者: 新闻中心\n日期: 2024-05-20\n链接: https://news.example.edu/a1\n---\n\n第一段正文。\n第二段正文。\n";

    fn write_article(root: &Path, relative: &str, body: &str) {
        let dir = root.join(relative);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(CONTENT_FILENAME), body).expect("write article");
    }

    fn ingest_args(cache_root: &Path, sources: &[String], append: bool) -> IngestArgs {
        IngestArgs {
            cache_root: cache_root.to_path_buf(),
            db_path: None,
            source_dirs: sources.to_vec(),
            append,
            ingest_manifest_path: Some(cache_root.join("ingest.json")),
        }
    }

    #[test]
    fn header_block_is_split_from_body() {
        let parser = HeaderParser::new().expect("parser");
        let article = parser.parse(SAMPLE);
        assert_eq!(article.title, "机器人实验室开放日");
        assert_eq!(article.publish_date, "2024-05-20");
        assert_eq!(article.link, "https://news.example.edu/a1");
        assert_eq!(article.content, "第一段正文。\n第二段正文。");
    }

    #[test]
    fn header_lookalikes_in_body_are_kept() {
        let parser = HeaderParser::new().expect("parser");
        let article = parser.parse("标题: A\n---\n标题: not a header\n---\nmore");
        assert_eq!(article.title, "A");
        assert_eq!(article.content, "标题: not a header\n---\nmore");
    }

    #[test]
    fn source_root_requires_name_and_dir() {
        assert_eq!(
            parse_source_root("news=/data/news").expect("parse"),
            SourceRoot {
                name: "news".to_string(),
                dir: PathBuf::from("/data/news"),
            }
        );
        assert!(parse_source_root("news").is_err());
        assert!(parse_source_root("=dir").is_err());
        assert!(parse_source_root("all=/data").is_err());
    }

    #[test]
    fn ingest_rebuilds_unless_appending() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let news = workspace.path().join("news");
        write_article(&news, "2024/a1", SAMPLE);
        write_article(&news, "2024/a2", "标题: Second\n日期: 2024-06-01\n---\nbody two");
        fs::create_dir_all(news.join("empty")).expect("mkdir");
        fs::write(news.join("2024/notes.txt"), "ignored").expect("write");

        let cache_root = workspace.path().join("cache");
        let sources = vec![format!("news={}", news.display())];

        run(ingest_args(&cache_root, &sources, false)).expect("first ingest");
        run(ingest_args(&cache_root, &sources, false)).expect("rebuild");

        let db_path = cache_root.join(crate::cli::DEFAULT_DB_FILENAME);
        let connection = Connection::open(&db_path).expect("open");
        assert_eq!(count_rows(&connection, "SELECT COUNT(*) FROM articles").expect("count"), 2);
        let first = load_article(&connection, 1).expect("query").expect("article");
        assert_eq!(first.title, "机器人实验室开放日");
        assert_eq!(first.source, "news");
        drop(connection);

        run(ingest_args(&cache_root, &sources, true)).expect("append");
        let connection = Connection::open(&db_path).expect("open");
        assert_eq!(count_rows(&connection, "SELECT COUNT(*) FROM articles").expect("count"), 4);

        let manifest: serde_json::Value = serde_json::from_slice(
            &fs::read(cache_root.join("ingest.json")).expect("manifest"),
        )
        .expect("json");
        assert_eq!(manifest["articles_total"], 4);
        assert_eq!(manifest["sources"][0]["articles"], 2);
        assert_eq!(manifest["append"], true);
    }

    #[test]
    fn missing_source_directory_is_a_warning() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let cache_root = workspace.path().join("cache");
        let sources = vec![format!("wechat={}", workspace.path().join("absent").display())];

        run(ingest_args(&cache_root, &sources, false)).expect("ingest");

        let manifest: serde_json::Value = serde_json::from_slice(
            &fs::read(cache_root.join("ingest.json")).expect("manifest"),
        )
        .expect("json");
        assert_eq!(manifest["articles_total"], 0);
        assert_eq!(manifest["warnings"].as_array().map(Vec::len), Some(1));
    }
}
