//! Settings commands

use anyhow::{bail, Result};

use crate::client::{ApiClient, SettingsRequest, SettingsResponse};
use crate::output::{print_json, print_success, print_warning, OutputFormat};

fn print_settings(settings: &SettingsResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(settings),
        OutputFormat::Table => {
            println!(
                "API key:       {}",
                if settings.api_key_set { "set" } else { "not set" }
            );
            println!("Poll interval: {}s", settings.poll_interval_secs);
            if !settings.api_key_set {
                print_warning("Trackers cannot run until an API key is set");
            }
        }
    }
}

pub async fn show(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let settings: SettingsResponse = client.get("api/settings").await?;
    print_settings(&settings, format);
    Ok(())
}

/// Save the key, keeping the current interval unless one is given
pub async fn set(
    client: &ApiClient,
    api_key: String,
    interval: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    if api_key.trim().is_empty() {
        bail!("An API key is required to save settings");
    }

    let poll_interval_secs = match interval {
        Some(secs) => secs,
        None => {
            let current: SettingsResponse = client.get("api/settings").await?;
            current.poll_interval_secs
        }
    };

    let request = SettingsRequest {
        api_key,
        poll_interval_secs,
    };
    let updated: SettingsResponse = client.put("api/settings", &request).await?;

    if format == OutputFormat::Table {
        print_success("Settings saved");
    }
    print_settings(&updated, format);
    Ok(())
}
