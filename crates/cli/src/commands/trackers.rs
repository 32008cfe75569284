//! Tracker lifecycle commands

use anyhow::{bail, Result};
use chrono::Utc;
use colored::Colorize;
use serde::Deserialize;
use tabled::Tabled;

use crate::client::{AddTrackerRequest, ApiClient, MoveRequest, Summary, TrackerView, UrlRequest};
use crate::output::{
    color_phase, format_confidence, format_countdown, format_score, print_info, print_json,
    print_success, print_warning, OutputFormat,
};

/// Row for the tracker list
#[derive(Tabled)]
struct TrackerRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Next")]
    next: String,
    #[tabled(rename = "Mobile")]
    mobile: String,
    #[tabled(rename = "Desktop")]
    desktop: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Counters returned by the bulk endpoints
#[derive(Debug, Deserialize)]
struct BulkCount {
    #[serde(alias = "started", alias = "stopped", alias = "removed")]
    count: usize,
}

fn summary_cell(summary: Option<&Summary>) -> String {
    match summary {
        Some(s) => format!(
            "{} ({}, n={})",
            format_score(Some(s.mean_score)),
            format_confidence(s.ci95_half_width),
            s.samples
        ),
        None => "--".to_string(),
    }
}

fn status_cell(view: &TrackerView) -> String {
    let phase = match view.active_strategy.as_deref() {
        Some(strategy) if view.in_flight => format!("{} ({})", view.phase, strategy),
        _ => view.phase.clone(),
    };
    let mut cell = color_phase(&phase);
    if let Some(reason) = &view.pause_reason {
        cell.push_str(&format!(" [{}]", reason));
    }
    cell
}

fn url_cell(view: &TrackerView) -> String {
    match &view.label {
        Some(label) => format!("{}\n{}", label.bold(), view.url),
        None => view.url.clone(),
    }
}

fn print_view(view: &TrackerView, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(view),
        OutputFormat::Table => {
            println!("URL:      {}", view.url.cyan());
            if let Some(label) = &view.label {
                println!("Label:    {}", label);
            }
            println!("Status:   {}", status_cell(view));
            println!(
                "Next run: {}",
                format_countdown(view.next_run_at, Utc::now())
            );
            println!("Mobile:   {}", summary_cell(view.mobile.as_ref()));
            println!("Desktop:  {}", summary_cell(view.desktop.as_ref()));
            if let Some(error) = &view.last_error {
                println!("Error:    {}", error.red());
            }
        }
    }
}

/// List tracked URLs in display order
pub async fn list(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let views: Vec<TrackerView> = client.get("api/trackers").await?;

    match format {
        OutputFormat::Json => print_json(&views),
        OutputFormat::Table => {
            if views.is_empty() {
                print_warning("No URLs are being tracked");
                return Ok(());
            }

            let now = Utc::now();
            let rows: Vec<TrackerRow> = views
                .iter()
                .enumerate()
                .map(|(i, v)| TrackerRow {
                    position: i,
                    url: url_cell(v),
                    status: status_cell(v),
                    next: format_countdown(v.next_run_at, now),
                    mobile: summary_cell(v.mobile.as_ref()),
                    desktop: summary_cell(v.desktop.as_ref()),
                    error: v.last_error.clone().unwrap_or_default(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            let running = views.iter().filter(|v| v.running).count();
            println!("\nTotal: {} URLs ({} running)", views.len(), running);
        }
    }

    Ok(())
}

/// Add a URL; the daemon starts it immediately
pub async fn add(
    client: &ApiClient,
    url: &str,
    label: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = AddTrackerRequest {
        url: url.to_string(),
        label,
    };
    let view: TrackerView = client.post("api/trackers", &request).await?;

    if format == OutputFormat::Table {
        print_success(&format!("Tracking {}", view.url));
    }
    print_view(&view, format);
    Ok(())
}

async fn url_command(
    client: &ApiClient,
    path: &str,
    url: &str,
    done: &str,
    format: OutputFormat,
) -> Result<()> {
    let request = UrlRequest {
        url: url.to_string(),
    };
    let view: TrackerView = client.post(path, &request).await?;

    if format == OutputFormat::Table {
        print_success(&format!("{} {}", done, view.url));
    }
    print_view(&view, format);
    Ok(())
}

pub async fn start(client: &ApiClient, url: &str, format: OutputFormat) -> Result<()> {
    url_command(client, "api/trackers/start", url, "Started", format).await
}

pub async fn stop(client: &ApiClient, url: &str, format: OutputFormat) -> Result<()> {
    url_command(client, "api/trackers/stop", url, "Stopped", format).await
}

/// Run a cycle now and keep the tracker running
pub async fn run(client: &ApiClient, url: &str, format: OutputFormat) -> Result<()> {
    url_command(client, "api/trackers/run", url, "Triggered", format).await
}

pub async fn remove(client: &ApiClient, url: &str) -> Result<()> {
    client.delete("api/trackers", &[("url", url)]).await?;
    print_success(&format!("Removed {}", url));
    Ok(())
}

pub async fn start_all(client: &ApiClient) -> Result<()> {
    let result: BulkCount = client
        .post("api/trackers/start-all", &serde_json::json!({}))
        .await?;
    print_success(&format!("Started {} trackers", result.count));
    Ok(())
}

pub async fn stop_all(client: &ApiClient) -> Result<()> {
    let result: BulkCount = client
        .post("api/trackers/stop-all", &serde_json::json!({}))
        .await?;
    print_success(&format!("Stopped {} trackers", result.count));
    Ok(())
}

/// Remove every tracker and its samples
pub async fn clear(client: &ApiClient, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to clear all trackers without --yes");
    }
    client.delete("api/trackers/all", &[]).await?;
    print_success("Cleared all trackers");
    Ok(())
}

/// Move a URL to a new position in the display order
pub async fn move_to(client: &ApiClient, url: &str, index: usize, format: OutputFormat) -> Result<()> {
    let request = MoveRequest {
        url: url.to_string(),
        index,
    };
    let order: Vec<String> = client.post("api/trackers/move", &request).await?;

    match format {
        OutputFormat::Json => print_json(&order),
        OutputFormat::Table => {
            print_info("New order:");
            for (i, url) in order.iter().enumerate() {
                println!("  {}. {}", i, url);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(phase: &str) -> TrackerView {
        TrackerView {
            url: "https://a.test/".into(),
            label: None,
            running: true,
            in_flight: false,
            phase: phase.into(),
            active_strategy: None,
            next_run_at: None,
            last_error: None,
            pause_reason: None,
            auto_pause_armed: true,
            mobile: None,
            desktop: None,
        }
    }

    #[test]
    fn test_status_shows_active_strategy_while_in_flight() {
        colored::control::set_override(false);
        let mut v = view("awaiting-google");
        v.in_flight = true;
        v.active_strategy = Some("both".into());
        assert_eq!(status_cell(&v), "awaiting-google (both)");
    }

    #[test]
    fn test_status_shows_pause_reason() {
        colored::control::set_override(false);
        let mut v = view("paused");
        v.running = false;
        v.pause_reason = Some("stat-sig-1".into());
        assert_eq!(status_cell(&v), "paused [stat-sig-1]");
    }

    #[test]
    fn test_summary_cell() {
        assert_eq!(summary_cell(None), "--");
    }

    #[test]
    fn test_bulk_count_accepts_each_key() {
        for body in [r#"{"started":2}"#, r#"{"stopped":2}"#, r#"{"removed":2}"#] {
            let parsed: BulkCount = serde_json::from_str(body).unwrap();
            assert_eq!(parsed.count, 2);
        }
    }
}
