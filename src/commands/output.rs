use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::RankedResult;

pub fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value).context("failed to serialize json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

/// Header lines, then one numbered block per result.
pub fn write_ranked_text(header: &[String], results: &[RankedResult]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    render_ranked_text(&mut output, header, results)?;
    output.flush()?;
    Ok(())
}

fn render_ranked_text<W: Write>(output: &mut W, header: &[String], results: &[RankedResult]) -> io::Result<()> {
    for line in header {
        writeln!(output, "{line}")?;
    }
    writeln!(output, "Results: {}", results.len())?;

    for (index, result) in results.iter().enumerate() {
        writeln!(
            output,
            "{}.\t[{}] {}\t{}\tid={}\tscore={:.4}",
            index + 1,
            result.source,
            result.title,
            result.publish_date,
            result.id,
            result.score,
        )?;
        writeln!(output, "\t{}", result.snippet.replace('\n', " "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_listing_numbers_results_and_flattens_snippets() {
        let results = vec![RankedResult {
            id: 12,
            title: "Lab opening".to_string(),
            publish_date: "2024-05-20".to_string(),
            source: "news".to_string(),
            snippet: "line one\nline two...".to_string(),
            score: 0.85,
        }];

        let mut buffer = Vec::<u8>::new();
        render_ranked_text(&mut buffer, &["Query: robots".to_string()], &results).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");

        assert_eq!(
            text,
            "Query: robots\nResults: 1\n1.\t[news] Lab opening\t2024-05-20\tid=12\tscore=0.8500\n\tline one line two...\n"
        );
    }
}
