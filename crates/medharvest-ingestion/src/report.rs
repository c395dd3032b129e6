//! Report files for a finished run.
//!
//! Three files land in the output directory, sharing one timestamped stem:
//!   `{prefix}-{YYYYmmdd-HHMMSS}.json`          all processed articles
//!   `{prefix}-{YYYYmmdd-HHMMSS}.md`            human-readable report
//!   `{prefix}-{YYYYmmdd-HHMMSS}-summary.json`  run statistics

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use medharvest_common::HarvestError;
use serde::Serialize;
use tracing::info;

use crate::models::{truncate_chars, ProcessedRecord};
use crate::pipeline::{HarvestReport, RunStatistics};

/// Abstract excerpt length in the Markdown report, in characters.
const EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub articles: PathBuf,
    pub markdown: PathBuf,
    pub summary: PathBuf,
}

#[derive(Serialize)]
struct Summary<'a> {
    run_id: String,
    timestamp: String,
    keyword: &'a str,
    statistics: &'a RunStatistics,
    errors: &'a [String],
}

pub fn report_stem(report: &HarvestReport, prefix: &str) -> String {
    format!("{prefix}-{}", report.timestamp.format("%Y%m%d-%H%M%S"))
}

/// Write all three report files into `dir`, creating it when needed.
pub async fn write_reports(report: &HarvestReport, dir: impl AsRef<Path>, prefix: &str) -> Result<ReportPaths, HarvestError> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let stem = report_stem(report, prefix);
    let paths = ReportPaths {
        articles: dir.join(format!("{stem}.json")),
        markdown: dir.join(format!("{stem}.md")),
        summary: dir.join(format!("{stem}-summary.json")),
    };

    let summary = Summary {
        run_id: report.run_id.to_string(),
        timestamp: report.timestamp.to_rfc3339(),
        keyword: &report.keyword,
        statistics: &report.statistics,
        errors: &report.errors,
    };

    tokio::fs::write(&paths.articles, serde_json::to_string_pretty(&report.articles)?).await?;
    tokio::fs::write(&paths.markdown, render_markdown(report)).await?;
    tokio::fs::write(&paths.summary, serde_json::to_string_pretty(&summary)?).await?;

    info!(
        articles = %paths.articles.display(),
        markdown = %paths.markdown.display(),
        summary = %paths.summary.display(),
        "Reports written"
    );
    Ok(paths)
}

fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() { "-" } else { s }
}

fn excerpt(text: &str) -> String {
    let cut = truncate_chars(text, EXCERPT_CHARS);
    if cut.len() < text.len() { format!("{cut}...") } else { cut }
}

fn render_article(out: &mut String, index: usize, a: &ProcessedRecord) {
    let r = &a.record;
    let e = &a.extraction;
    let _ = writeln!(out, "### {}. {}\n", index, or_dash(&r.title));
    let _ = writeln!(out, "- **ID**: {}", or_dash(&r.identifier));
    let _ = writeln!(out, "- **Source**: {}", r.source);
    let _ = writeln!(out, "- **Published**: {}", or_dash(&r.published_at));
    let _ = writeln!(out, "- **URL**: {}", or_dash(&r.url));
    if r.last_corresponding_affiliation.is_empty() {
        let _ = writeln!(out, "- **Corresponding author**: {}", or_dash(&r.last_corresponding_author));
    } else {
        let _ = writeln!(
            out,
            "- **Corresponding author**: {} ({})",
            or_dash(&r.last_corresponding_author),
            r.last_corresponding_affiliation
        );
    }
    let _ = writeln!(out, "- **What was done**: {}", or_dash(&e.what_done));
    let _ = writeln!(out, "- **Role of AI**: {}", or_dash(&e.ai_role));
    let _ = writeln!(out, "- **Models**: {}", or_dash(&e.models));
    let _ = writeln!(out, "- **Data sources**: {}", or_dash(&e.data_sources));
    let _ = writeln!(out, "- **Metrics**: {}", or_dash(&e.metrics));
    if !r.abstract_text.is_empty() {
        let _ = writeln!(out, "\n> {}", excerpt(&r.abstract_text));
    }
    if a.needs_manual_review {
        let _ = writeln!(out, "\n**Needs manual review**");
    }
    out.push('\n');
}

/// Render the Markdown report: header, sources summary, one section per article.
pub fn render_markdown(report: &HarvestReport) -> String {
    let stats = &report.statistics;
    let mut out = String::new();

    let _ = writeln!(out, "# AI in Biomedicine: Abstract Harvest\n");
    let _ = writeln!(out, "- **Generated**: {}", report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "- **Keyword**: {}", report.keyword);
    let _ = writeln!(out, "- **Articles**: {}", stats.total);
    let _ = writeln!(out, "- **Needs manual review**: {}", stats.needs_manual_review.count);
    let _ = writeln!(out, "- **Execution time**: {:.1} s\n", stats.execution_time);

    let _ = writeln!(out, "## Sources\n");
    let _ = writeln!(out, "| Source | Articles | Share |");
    let _ = writeln!(out, "|---|---:|---:|");
    for (source, count) in &stats.source_breakdown {
        let share = if stats.total == 0 { 0.0 } else { *count as f64 * 100.0 / stats.total as f64 };
        let _ = writeln!(out, "| {source} | {count} | {share:.1}% |");
    }
    out.push('\n');

    if !report.errors.is_empty() {
        let _ = writeln!(out, "## Failed sources\n");
        for e in &report.errors {
            let _ = writeln!(out, "- {e}");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Articles\n");
    for (i, article) in report.articles.iter().enumerate() {
        render_article(&mut out, i + 1, article);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionResult, RawRecord, SourceKind};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use uuid::Uuid;

    fn sample_report() -> HarvestReport {
        let mut r1 = RawRecord::new(SourceKind::MedRxiv);
        r1.identifier = "10.1101/2025.01.01.1".into();
        r1.title = "CNN triage".into();
        r1.abstract_text = "x".repeat(400);
        r1.last_corresponding_author = "Ana Ruiz".into();
        r1.last_corresponding_affiliation = "Uni One".into();
        let mut r2 = RawRecord::new(SourceKind::PubMed);
        r2.identifier = "39000001".into();
        r2.title = "Short one".into();

        let articles = vec![
            ProcessedRecord {
                record: r1,
                extraction: ExtractionResult { models: "CNN".into(), ..Default::default() },
                needs_manual_review: false,
                raw_llm_output: None,
            },
            ProcessedRecord {
                record: r2,
                extraction: ExtractionResult::default(),
                needs_manual_review: true,
                raw_llm_output: None,
            },
        ];
        let statistics = RunStatistics::compute(&articles, 3, Duration::from_secs(2));
        HarvestReport {
            run_id: Uuid::nil(),
            timestamp: Utc.with_ymd_and_hms(2025, 7, 1, 9, 5, 3).unwrap(),
            keyword: "artificial intelligence".into(),
            articles,
            statistics,
            errors: vec!["arxiv: timed out".into()],
        }
    }

    #[test]
    fn test_report_stem() {
        assert_eq!(report_stem(&sample_report(), "medrxiv-ai"), "medrxiv-ai-20250701-090503");
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&sample_report());
        assert!(md.contains("| medrxiv | 1 | 50.0% |"));
        assert!(md.contains("| pubmed | 1 | 50.0% |"));
        assert!(md.contains("### 1. CNN triage"));
        assert!(md.contains("- **Corresponding author**: Ana Ruiz (Uni One)"));
        assert!(md.contains("- **Models**: CNN"));
        assert!(md.contains(&format!("> {}...", "x".repeat(300))));
        assert!(md.contains("- arxiv: timed out"));
        assert_eq!(md.matches("**Needs manual review**\n").count(), 1);
    }

    #[tokio::test]
    async fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("data");
        let paths = write_reports(&sample_report(), &out, "medrxiv-ai").await.unwrap();

        assert_eq!(paths.articles, out.join("medrxiv-ai-20250701-090503.json"));
        let articles: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.articles).unwrap()).unwrap();
        assert_eq!(articles.as_array().unwrap().len(), 2);
        assert_eq!(articles[0]["id"], "10.1101/2025.01.01.1");

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.summary).unwrap()).unwrap();
        assert_eq!(summary["statistics"]["total"], 2);
        assert_eq!(summary["statistics"]["needs_manual_review"]["article_ids"][0], "39000001");

        assert!(std::fs::read_to_string(&paths.markdown).unwrap().starts_with("# AI in Biomedicine"));
    }
}
