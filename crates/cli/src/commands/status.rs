//! Service status command

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct StatusOutput {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Show component health and readiness
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get_probe("healthz").await?;
    let readiness: ReadinessResponse = client.get_probe("readyz").await?;

    if let OutputFormat::Json = format {
        print_json(&StatusOutput { health, readiness });
        return Ok(());
    }

    let mut rows: Vec<ComponentRow> = health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(&component.status),
            last_check: format_timestamp(component.last_check_timestamp),
            message: component.message.clone().unwrap_or_default(),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    print_table(&rows);
    println!("Overall: {}", color_status(&health.status));

    if readiness.ready {
        println!("Ready:   {}", color_status("ready"));
    } else {
        println!("Ready:   {}", color_status("not_ready"));
        if let Some(reason) = &readiness.reason {
            print_warning(reason);
        }
    }

    Ok(())
}
