use chrono::{DateTime, Utc};
use pulldown_cmark::{html, Event, Options, Parser};
use std::path::Path;

use super::batches::escape_cell;
use super::prompt::{fill, thousands};
use crate::config::ReportFormat;
use crate::error::PipelineError;
use crate::models::DiscoveredVideo;

pub const APPENDIX_SIZE: usize = 15;

pub const DEFAULT_REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{BRAND_NAME}} - Strategic Brand Report</title>
<style>
body { font-family: sans-serif; max-width: 960px; margin: 2rem auto; line-height: 1.5; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ccc; padding: 4px 8px; }
</style>
</head>
<body>
<h1>{{BRAND_NAME}}: Strategic Brand Report</h1>
<p><em>Generated {{GENERATED_AT}}</em></p>
{{ANALYSIS_CONTENT}}
</body>
</html>
"#;

/// "Top videos by views" markdown section appended to every report
pub fn appendix(videos: &[DiscoveredVideo]) -> String {
    let mut top: Vec<&DiscoveredVideo> = videos.iter().collect();
    top.sort_by(|a, b| b.views.cmp(&a.views));
    top.truncate(APPENDIX_SIZE);

    let mut section = format!(
        "## Appendix: Top {} videos by views\n\n| Title | Channel | Views | Likes | Comments |\n|---|---|---:|---:|---:|\n",
        APPENDIX_SIZE
    );
    for v in top {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            escape_cell(&v.title),
            escape_cell(&v.channel),
            thousands(v.views),
            thousands(v.likes),
            thousands(v.comments),
        ));
    }
    section
}

/// Render markdown to HTML. Raw HTML in the source (video titles, comments,
/// model output) is emitted as escaped text, never as markup.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Escape plain text for an HTML template slot
fn html_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    html::push_html(&mut out, std::iter::once(Event::Text(text.into())));
    out
}

/// Final report body: analysis plus appendix, as markdown or templated HTML
pub fn render(
    format: ReportFormat,
    brand: &str,
    analysis: &str,
    videos: &[DiscoveredVideo],
    template: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let markdown = format!("{}\n\n---\n\n{}", analysis.trim_end(), appendix(videos));
    let timestamp = generated_at.format("%Y-%m-%d %H:%M UTC").to_string();

    match format {
        ReportFormat::Md => format!("<!-- generated {} -->\n\n{}", timestamp, markdown),
        ReportFormat::Html => fill(
            template,
            &[
                ("BRAND_NAME", &html_text(brand)),
                ("GENERATED_AT", &timestamp),
                ("ANALYSIS_CONTENT", &markdown_to_html(&markdown)),
            ],
        ),
    }
}

/// Write via a temp file and rename, so the file is either complete or absent
pub fn write_atomic(path: &Path, body: &str) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body).map_err(|e| PipelineError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| PipelineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VideoKind;
    use chrono::TimeZone;

    fn videos(n: u64) -> Vec<DiscoveredVideo> {
        (0..n)
            .map(|i| DiscoveredVideo {
                video_id: format!("v{}", i),
                title: format!("Video {}", i),
                url: DiscoveredVideo::watch_url(&format!("v{}", i)),
                channel: "Channel".to_string(),
                published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                views: 1000 * i,
                likes: i,
                comments: i,
                engagement: 2 * i,
                duration_seconds: 120,
                video_type: VideoKind::Video,
                description: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_appendix_keeps_top_fifteen_by_views() {
        let section = appendix(&videos(20));
        let rows = section.lines().filter(|l| l.starts_with("| Video")).count();
        assert_eq!(rows, 15);
        assert!(section.contains("| Video 19 | Channel | 19,000 |"));
        assert!(!section.contains("| Video 4 |"));
    }

    #[test]
    fn test_render_html_uses_template_and_tables() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let body = render(
            ReportFormat::Html,
            "AcmeCo",
            "## Executive Summary\nPositive overall.",
            &videos(2),
            DEFAULT_REPORT_TEMPLATE,
            at,
        );

        assert!(body.contains("<title>AcmeCo - Strategic Brand Report</title>"));
        assert!(body.contains("<h2>Executive Summary</h2>"));
        assert!(body.contains("<table>"));
        assert!(body.contains("2024-06-01 09:30 UTC"));
        assert!(!body.contains("{{"));
    }

    #[test]
    fn test_render_html_escapes_untrusted_markup() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let mut hostile = videos(1);
        hostile[0].title = "<script>alert(1)</script> review".to_string();
        hostile[0].channel = "<img src=x onerror=alert(2)>".to_string();

        let body = render(
            ReportFormat::Html,
            "Acme <b>&</b> Co",
            "## Summary\n<div onclick=\"x()\">quoted comment</div>\n\nSee <em>this</em>.",
            &hostile,
            DEFAULT_REPORT_TEMPLATE,
            at,
        );

        assert!(!body.contains("<script>"));
        assert!(!body.contains("<img"));
        assert!(!body.contains("<div onclick"));
        assert!(!body.contains("<b>"));
        assert!(body.contains("&lt;script&gt;alert(1)&lt;/script&gt; review"));
        assert!(body.contains("<title>Acme &lt;b&gt;&amp;&lt;/b&gt; Co - Strategic Brand Report</title>"));
        assert!(body.contains("<h2>Summary</h2>"));
    }

    #[test]
    fn test_render_markdown_keeps_raw_text() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let body = render(ReportFormat::Md, "AcmeCo", "## Summary", &videos(1), "", at);
        assert!(body.contains("## Summary\n\n---\n\n## Appendix"));
    }

    #[test]
    fn test_write_atomic_replaces_whole_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("brand").join("report.html");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!path.with_extension("tmp").exists());
    }
}
