//! Churn pipeline HTTP service
//!
//! Exposes training, publishing and prediction over HTTP together with
//! health checks and Prometheus metrics.

pub mod api;
pub mod config;
