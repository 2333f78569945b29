//! Static HTML report

use std::fmt::Write;

use crate::runner::SuiteResult;

pub const REPORT_TITLE: &str = "Test execution report";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn render_html(suite: &SuiteResult) -> String {
    let mut html = String::new();

    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
table {{ border-collapse: collapse; }}
th, td {{ border: 1px solid #ccc; padding: 4px 10px; text-align: left; }}
.passed {{ color: #1a7f37; }}
.failed {{ color: #cf222e; }}
pre {{ margin: 0; white-space: pre-wrap; }}
</style>
</head>
<body>
<h1>{title}</h1>
<p>Started {started} &middot; {total} run, <span class="passed">{passed} passed</span>, <span class="failed">{failed} failed</span>, {skipped} skipped &middot; {duration} ms</p>
"#,
        title = REPORT_TITLE,
        started = escape_html(&suite.started_at),
        total = suite.total,
        passed = suite.passed,
        failed = suite.failed,
        skipped = suite.skipped,
        duration = suite.duration_ms,
    );

    if let Some(err) = &suite.error {
        let _ = writeln!(
            html,
            r#"<p class="failed">Session aborted: <pre>{}</pre></p>"#,
            escape_html(err)
        );
    }

    html.push_str("<table>\n<tr><th>Scenario</th><th>Outcome</th><th>Duration (ms)</th><th>Details</th></tr>\n");
    for result in &suite.results {
        let (class, outcome) = if result.success {
            ("passed", "Passed")
        } else {
            ("failed", "Failed")
        };
        let _ = writeln!(
            html,
            r#"<tr><td>{}</td><td class="{}">{}</td><td>{}</td><td><pre>{}</pre></td></tr>"#,
            escape_html(&result.name),
            class,
            outcome,
            result.duration_ms,
            escape_html(result.error.as_deref().unwrap_or("")),
        );
    }
    html.push_str("</table>\n</body>\n</html>\n");

    html
}
