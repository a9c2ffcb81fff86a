//! Result tables and the HTML report.

use crate::error::{BenchError, Result};
use crate::eval::ResultRecord;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tabled::builder::Builder;
use tabled::settings::Style;

/// Width of the accuracy bar in the summary table, in characters.
pub const BAR_WIDTH: usize = 10;

/// Per-model aggregate, derived from result records.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model: String,
    pub correct: usize,
    pub total: usize,
    /// Sum of response times in seconds.
    pub total_time: f64,
}

impl ModelSummary {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            correct: 0,
            total: 0,
            total_time: 0.0,
        }
    }

    /// Percentage of correct results; 0 when nothing ran.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64 * 100.0
        }
    }

    /// Mean response time over every executed case, correct or not.
    pub fn avg_response_time(&self) -> Option<f64> {
        (self.total > 0).then(|| self.total_time / self.total as f64)
    }
}

/// Aggregate records per model.
///
/// One row per entry of `models`, in that order, even for models with no
/// results. Records for other models are ignored.
pub fn summarize(records: &[ResultRecord], models: &[String]) -> Vec<ModelSummary> {
    let mut summaries: Vec<ModelSummary> = models.iter().map(|m| ModelSummary::new(m)).collect();

    for record in records {
        let Some(summary) = summaries.iter_mut().find(|s| s.model == record.model) else {
            continue;
        };
        summary.total += 1;
        if record.correct {
            summary.correct += 1;
        }
        summary.total_time += record.response_time;
    }

    summaries
}

/// Fixed-width bar filled in proportion to `accuracy` (0-100), rounded to
/// the nearest character.
pub fn accuracy_bar(accuracy: f64, width: usize) -> String {
    let filled = ((accuracy.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// One row per (model, file) result.
pub fn detailed_table(records: &[ResultRecord]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Model", "File", "Correct", "Response Time"]);
    for record in records {
        builder.push_record([
            record.model.clone(),
            record.file.clone(),
            if record.correct { "Yes" } else { "No" }.to_string(),
            format!("{:.2}s", record.response_time),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::ascii());
    table.to_string()
}

/// One row per model with accuracy and mean latency.
pub fn summary_table(summaries: &[ModelSummary]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Model", "Correct", "Avg Response Time"]);
    for summary in summaries {
        let accuracy = summary.accuracy();
        builder.push_record([
            summary.model.clone(),
            format!(
                "{}/{} ({:.1}%) [{}]",
                summary.correct,
                summary.total,
                accuracy,
                accuracy_bar(accuracy, BAR_WIDTH)
            ),
            summary
                .avg_response_time()
                .map(|t| format!("{:.2}s", t))
                .unwrap_or_else(|| "N/A".to_string()),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::ascii());
    table.to_string()
}

/// Print both tables to stdout.
pub fn print_report(records: &[ResultRecord], models: &[String]) {
    println!("\nDetailed Results");
    println!("{}", detailed_table(records));

    println!("\nModel Performance Summary");
    println!("{}", summary_table(&summarize(records, models)));
}

/// Render a self-contained HTML report.
///
/// Grid rows follow `summaries`; columns follow the first appearance of each
/// file in `records`.
pub fn render_html(records: &[ResultRecord], summaries: &[ModelSummary]) -> String {
    let mut html = String::new();
    html.push_str(HTML_HEAD);

    html.push_str("<h2>Model Performance Summary</h2>\n<table>\n");
    html.push_str("<tr><th>Model</th><th>Correct</th><th>Avg Response Time</th></tr>\n");
    for summary in summaries {
        let accuracy = summary.accuracy();
        let avg = summary
            .avg_response_time()
            .map(|t| format!("{:.2}s", t))
            .unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}/{} ({:.1}%)<div class=\"bar\"><div class=\"bar-fill\" style=\"width: {:.1}%;\"></div></div></td><td>{}</td></tr>",
            escape_html(&summary.model),
            summary.correct,
            summary.total,
            accuracy,
            accuracy,
            avg
        );
    }
    html.push_str("</table>\n");

    let mut files: Vec<&str> = Vec::new();
    for record in records {
        if !files.contains(&record.file.as_str()) {
            files.push(&record.file);
        }
    }
    let (min_time, max_time) = records.iter().fold((f64::MAX, f64::MIN), |(lo, hi), r| {
        (lo.min(r.response_time), hi.max(r.response_time))
    });
    let range = if max_time > min_time {
        max_time - min_time
    } else {
        1.0
    };

    html.push_str("<h2>Detailed Results</h2>\n<table>\n<tr><th>Model</th>");
    for file in &files {
        let _ = write!(html, "<th>{}</th>", escape_html(file));
    }
    html.push_str("</tr>\n");

    for summary in summaries {
        let model = summary.model.as_str();
        let _ = write!(html, "<tr><td>{}</td>", escape_html(model));
        for file in &files {
            match records.iter().find(|r| r.model == model && r.file == *file) {
                Some(r) => {
                    let t = (r.response_time - min_time) / range;
                    let _ = write!(
                        html,
                        "<td class=\"cell\" style=\"background-color: {};\" title=\"{}\">{:.2}s</td>",
                        cell_color(r.correct, t),
                        escape_html(&r.generated),
                        r.response_time
                    );
                }
                None => html.push_str("<td></td>"),
            }
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");

    html.push_str("<h2>Questions</h2>\n");
    let mut seen: Vec<&str> = Vec::new();
    for record in records {
        if seen.contains(&record.file.as_str()) {
            continue;
        }
        seen.push(&record.file);

        let _ = write!(
            html,
            "<details class=\"question\"><summary>{}</summary>\n<p><strong>Prompt:</strong></p><pre>{}</pre>\n<p><strong>Expected Answer:</strong></p><pre>{}</pre>\n<hr>\n",
            escape_html(&record.file),
            escape_html(&record.prompt),
            escape_html(&record.expected)
        );
        for answer in records.iter().filter(|r| r.file == record.file) {
            let body = match &answer.error {
                Some(e) => format!("Error: {}", e),
                None => answer.generated.clone(),
            };
            let _ = write!(
                html,
                "<div class=\"answer {}\"><h4>{}</h4><pre>{}</pre><p><em>Response Time: {:.2}s</em></p></div>\n",
                if answer.correct { "correct" } else { "incorrect" },
                escape_html(&answer.model),
                escape_html(&body),
                answer.response_time
            );
        }
        html.push_str("</details>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Write the HTML report to `path`.
pub fn write_html_report(records: &[ResultRecord], models: &[String], path: &Path) -> Result<()> {
    let html = render_html(records, &summarize(records, models));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
    }
    fs::write(path, html).map_err(|e| BenchError::io(path, e))
}

/// Green for correct, red for incorrect; faster answers are more saturated.
/// `t` is the response time normalized to 0 (fastest) ..= 1 (slowest).
fn cell_color(correct: bool, t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    if correct {
        let lerp = |fast: f64, slow: f64| (fast + (slow - fast) * t) as u8;
        format!("rgb({}, {}, {})", lerp(0.0, 245.0), lerp(247.0, 255.0), lerp(0.0, 245.0))
    } else {
        format!("hsl(0, 100%, {}%)", (70.0 + 30.0 * t) as u8)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Model Benchmark Report</title>
<style>
body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; margin-bottom: 2em; }
th, td { border: 1px solid #ccc; padding: 4px 8px; }
.cell { text-align: center; font-weight: bold; font-size: 0.9em; }
.bar { width: 120px; height: 8px; background: #eee; margin-top: 4px; }
.bar-fill { height: 100%; background: #3a3; }
.answer.correct { border-left: 4px solid #3a3; padding-left: 8px; }
.answer.incorrect { border-left: 4px solid #c33; padding-left: 8px; }
pre { white-space: pre-wrap; background: #f7f7f7; padding: 6px; }
</style>
</head>
<body>
<h1>Model Benchmark Report</h1>
"#;
