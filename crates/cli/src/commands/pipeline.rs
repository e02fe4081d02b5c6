//! Training and publishing commands

use crate::client::{ApiClient, PublishReport, TrainingReport};
use crate::output::{
    color_status, print_info, print_json, print_message, print_success, print_table,
    print_warning, OutputFormat,
};
use anyhow::{bail, Result};
use tabled::Tabled;

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "Artifact")]
    kind: String,
    #[tabled(rename = "Path")]
    path: String,
}

#[derive(Tabled)]
struct DeltaRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Production")]
    production: String,
    #[tabled(rename = "Staged")]
    staged: String,
    #[tabled(rename = "Delta")]
    delta: String,
}

/// Train a model on the raw data and stage it
pub async fn train(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: TrainingReport = client.get("train").await?;

    if let OutputFormat::Json = format {
        print_json(&report);
        return ensure_success(report.success, "training");
    }

    for message in &report.messages {
        print_message(message);
    }
    println!();

    let rows: Vec<ArtifactRow> = [
        ("model", report.model.as_ref()),
        ("evaluation", report.evaluation.as_ref()),
        ("checksum", report.checksum.as_ref()),
    ]
    .into_iter()
    .filter_map(|(kind, path)| {
        path.map(|p| ArtifactRow {
            kind: kind.to_string(),
            path: p.clone(),
        })
    })
    .collect();

    if !rows.is_empty() {
        print_table(&rows);
    }

    if report.success {
        let accuracy = report
            .accuracy
            .map(|a| format!("{:.3}", a))
            .unwrap_or_else(|| "-".to_string());
        print_success(&format!(
            "Trained on {} records, accuracy {}",
            report.records, accuracy
        ));
    }

    ensure_success(report.success, "training")
}

/// Compare staged against production and promote when better
pub async fn publish(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: PublishReport = client.get("publish").await?;

    if let OutputFormat::Json = format {
        print_json(&report);
        return ensure_success(report.fault.is_none(), "publish");
    }

    for message in &report.messages {
        print_message(message);
    }
    println!();

    if let Some(comparison) = &report.comparison {
        let rows: Vec<DeltaRow> = comparison
            .checked
            .iter()
            .map(|d| DeltaRow {
                metric: d.metric.clone(),
                production: format!("{:.4}", d.production),
                staged: format!("{:.4}", d.staged),
                delta: format!("{:+.4}", d.delta),
            })
            .collect();
        print_table(&rows);
        print_info(&comparison.message);
    }

    println!("Outcome:    {}", color_status(&report.outcome));
    println!("States:     {}", report.states.join(" → "));
    match &report.live_model {
        Some(model) => println!("Live model: {}", model),
        None => print_warning("No model is live in production"),
    }

    if report.promoted {
        print_success("Staged model promoted to production");
    }

    match &report.fault {
        Some(fault) => bail!("publish failed ({})", fault),
        None => Ok(()),
    }
}

fn ensure_success(success: bool, what: &str) -> Result<()> {
    if !success {
        bail!("{} failed", what);
    }
    Ok(())
}
