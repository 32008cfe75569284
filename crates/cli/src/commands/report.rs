//! Comparison report, baseline and sort commands

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde_json::{json, Value};
use tabled::{builder::Builder, settings::Style};

use crate::client::{ApiClient, BaselineRequest, ComparisonReport, ComparisonRow};
use crate::output::{
    color_percentile, format_confidence, format_delta, format_metric, format_score, print_json,
    print_success, print_warning, OutputFormat,
};

const METRICS: [(&str, &str); 5] = [
    ("fcp", "FCP"),
    ("si", "SI"),
    ("lcp", "LCP"),
    ("tbt", "TBT"),
    ("cls", "CLS"),
];

/// Column the report can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum SortKey {
    Order,
    Url,
    Score,
    Confidence,
    Samples,
    Fcp,
    Si,
    Lcp,
    Tbt,
    Cls,
}

impl SortKey {
    fn column(self) -> Value {
        match self {
            SortKey::Order => json!("order"),
            SortKey::Url => json!("url"),
            SortKey::Score => json!("score"),
            SortKey::Confidence => json!("confidence"),
            SortKey::Samples => json!("samples"),
            SortKey::Fcp => json!({ "metric": "fcp" }),
            SortKey::Si => json!({ "metric": "si" }),
            SortKey::Lcp => json!({ "metric": "lcp" }),
            SortKey::Tbt => json!({ "metric": "tbt" }),
            SortKey::Cls => json!({ "metric": "cls" }),
        }
    }
}

fn name_cell(row: &ComparisonRow) -> String {
    let name = row.label.clone().unwrap_or_else(|| row.url.clone());
    if row.is_baseline {
        format!("{} {}", name, "(baseline)".bold())
    } else {
        name
    }
}

fn score_cell(row: &ComparisonRow) -> String {
    let text = format_score(row.mean_score);
    match row.score_percentile {
        Some(p) => color_percentile(&text, p),
        None => text,
    }
}

fn metric_cell(row: &ComparisonRow, key: &str) -> String {
    match row.metrics.get(key) {
        Some(column) => {
            let text = format_metric(key, column.mean_value);
            let text = match &column.contribution {
                Some(c) => format!("{} ({:.1}/{:.0})", text, c.points, c.max_points),
                None => text,
            };
            color_percentile(&text, column.percentile)
        }
        None => "--".to_string(),
    }
}

fn render(report: &ComparisonReport) -> String {
    let mut builder = Builder::default();

    let mut header = vec![
        "URL".to_string(),
        "Strategy".to_string(),
        "Samples".to_string(),
        "Score".to_string(),
        "95% CI".to_string(),
    ];
    if report.baseline.is_some() {
        header.push("Δ Baseline".to_string());
    }
    header.extend(METRICS.iter().map(|(_, title)| title.to_string()));
    builder.push_record(header);

    for row in &report.rows {
        let mut record = vec![
            name_cell(row),
            row.strategy.clone(),
            row.samples.to_string(),
            score_cell(row),
            if row.samples == 0 {
                "--".to_string()
            } else {
                format_confidence(row.ci95_half_width)
            },
        ];
        if report.baseline.is_some() {
            record.push(format_delta(row.baseline_delta));
        }
        record.extend(METRICS.iter().map(|(key, _)| metric_cell(row, key)));
        builder.push_record(record);
    }

    builder.build().with(Style::rounded()).to_string()
}

/// Show the side-by-side comparison of every tracked URL
pub async fn show(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: ComparisonReport = client.get("api/report").await?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            if report.rows.is_empty() {
                print_warning("No URLs are being tracked");
                return Ok(());
            }
            println!("{}", render(&report));
        }
    }

    Ok(())
}

/// Set or clear the baseline URL
pub async fn baseline(client: &ApiClient, url: Option<String>, format: OutputFormat) -> Result<()> {
    let request = BaselineRequest { url };
    let response: Value = client.put("api/baseline", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => match response["baseline"].as_str() {
            Some(url) => print_success(&format!("Baseline set to {}", url)),
            None => print_success("Baseline cleared"),
        },
    }
    Ok(())
}

pub async fn sort(client: &ApiClient, key: SortKey, desc: bool, format: OutputFormat) -> Result<()> {
    let request = json!({
        "column": key.column(),
        "direction": if desc { "desc" } else { "asc" },
    });
    let response: Value = client.put("api/sort", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => print_success(&format!(
            "Sorting by {:?} ({})",
            key,
            if desc { "descending" } else { "ascending" }
        )),
    }
    Ok(())
}
