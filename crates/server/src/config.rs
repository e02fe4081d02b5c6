//! Service configuration

use anyhow::{bail, Context, Result};
use churn_lib::evaluation::Metric;
use churn_lib::store::{GcsConfig, StoreBackend, DEFAULT_GCS_ENDPOINT};
use churn_lib::{Algorithm, PipelineSettings};
use serde::Deserialize;
use std::path::PathBuf;

/// Service configuration, read from the process environment
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_project_id")]
    pub project_id: String,

    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,

    #[serde(default = "default_raw_data_folder_path")]
    pub raw_data_folder_path: String,

    #[serde(default = "default_processed_data_folder_path")]
    pub processed_data_folder_path: String,

    #[serde(default = "default_stage_model_folder_path")]
    pub stage_model_folder_path: String,

    #[serde(default = "default_prod_model_folder_path")]
    pub prod_model_folder_path: String,

    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Comma-separated, checked in order
    #[serde(default = "default_comparison_metrics")]
    pub comparison_metrics: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// `local`, `gcs` or `memory`
    #[serde(default = "default_store_backend")]
    pub store_backend: String,

    #[serde(default = "default_local_store_root")]
    pub local_store_root: PathBuf,

    #[serde(default = "default_gcs_endpoint")]
    pub gcs_endpoint: String,

    #[serde(default)]
    pub gcs_access_token: Option<String>,
}

fn default_project_id() -> String {
    "nimble-octagon-253816".to_string()
}

fn default_bucket_name() -> String {
    "customer-churn-demo".to_string()
}

fn default_raw_data_folder_path() -> String {
    "data/raw/".to_string()
}

fn default_processed_data_folder_path() -> String {
    "data/processed/".to_string()
}

fn default_stage_model_folder_path() -> String {
    "models/stage/".to_string()
}

fn default_prod_model_folder_path() -> String {
    "models/prod/".to_string()
}

fn default_algorithm() -> String {
    Algorithm::LogisticRegression.as_str().to_string()
}

fn default_comparison_metrics() -> String {
    "Accuracy,F1-Score".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_store_backend() -> String {
    "local".to_string()
}

fn default_local_store_root() -> PathBuf {
    PathBuf::from("./artifact-store")
}

fn default_gcs_endpoint() -> String {
    DEFAULT_GCS_ENDPOINT.to_string()
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to read configuration from the environment")?;
        Self::from_config(source)
    }

    pub fn from_config(source: config::Config) -> Result<Self> {
        let config: ServiceConfig = source
            .try_deserialize()
            .context("invalid service configuration")?;
        config.pipeline_settings()?;
        config.store_backend()?;
        Ok(config)
    }

    /// Namespace layout and model options
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let algorithm: Algorithm = self
            .algorithm
            .parse()
            .with_context(|| format!("ALGORITHM={}", self.algorithm))?;
        let comparison_metrics = Metric::parse_list(&self.comparison_metrics)
            .with_context(|| format!("COMPARISON_METRICS={}", self.comparison_metrics))?;

        let settings = PipelineSettings {
            raw_data_prefix: self.raw_data_folder_path.clone(),
            processed_data_prefix: self.processed_data_folder_path.clone(),
            stage_prefix: self.stage_model_folder_path.clone(),
            prod_prefix: self.prod_model_folder_path.clone(),
            algorithm,
            comparison_metrics,
        };
        settings.validate().context("invalid pipeline settings")?;
        Ok(settings)
    }

    pub fn store_backend(&self) -> Result<StoreBackend> {
        match self.store_backend.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StoreBackend::Local {
                root: self.local_store_root.clone(),
                bucket: self.bucket_name.clone(),
            }),
            "gcs" => {
                let Some(token) = self.gcs_access_token.clone().filter(|t| !t.is_empty()) else {
                    bail!("GCS_ACCESS_TOKEN is required when STORE_BACKEND=gcs");
                };
                let mut gcs = GcsConfig::new(&self.project_id, &self.bucket_name);
                gcs.endpoint = self.gcs_endpoint.clone();
                gcs.access_token = Some(token);
                Ok(StoreBackend::Gcs(gcs))
            }
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown STORE_BACKEND {other:?} (expected local, gcs or memory)"),
        }
    }
}
