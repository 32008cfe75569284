//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse a format name from the config file
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

pub fn print_json<J: Serialize + ?Sized>(value: &J) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to encode JSON: {e}")),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a raw metric value the way Lighthouse reports show it
pub fn format_metric(key: &str, value: f64) -> String {
    match key {
        "fcp" | "si" | "lcp" => format!("{:.2}s", value / 1000.0),
        "tbt" => format!("{}ms", value.round()),
        "cls" => format!("{:.3}", value),
        _ => format!("{:.1}", value),
    }
}

pub fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "--".to_string(), |s| format!("{:.1}", s))
}

pub fn format_confidence(half_width: Option<f64>) -> String {
    match half_width {
        Some(ci) => format!("±{:.1} pts", ci),
        None => "Need 2+ samples".to_string(),
    }
}

pub fn format_delta(delta: Option<f64>) -> String {
    match delta {
        Some(d) => format!("{:+.1}", d),
        None => "--".to_string(),
    }
}

/// Seconds until `at`, never negative
pub fn format_countdown(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match at {
        Some(at) => {
            let millis = (at - now).num_milliseconds().max(0);
            format!("{}s", (millis as f64 / 1000.0).round())
        }
        None => "--".to_string(),
    }
}

/// Color text by its percentile among all rows
pub fn color_percentile(text: &str, percentile: f64) -> String {
    if percentile >= 75.0 {
        text.green().to_string()
    } else if percentile >= 50.0 {
        text.bright_green().to_string()
    } else if percentile >= 25.0 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

/// Color a tracker phase
pub fn color_phase(phase: &str) -> String {
    match phase {
        "waiting" | "queued" => phase.green().to_string(),
        "running" | "awaiting-google" => phase.cyan().to_string(),
        "paused" => phase.yellow().to_string(),
        _ => phase.to_string(),
    }
}
