//! # Application State Management
//!
//! Shared state accessed by every HTTP request handler. All mutable data
//! sits behind `Arc<RwLock<T>>`: many readers or one writer, never both.
//! Locks are held only long enough to copy data out.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::AppConfig;

/// The main application state shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Request metrics, updated by the metrics middleware on every request
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Request metrics for a single endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration. Cloning releases the lock
    /// immediately so handlers never hold it across an await.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Increment the total request counter (called by middleware).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (4xx/5xx responses).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record one request against a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Consistent snapshot of the current metrics, copied out so the lock
    /// is not held during response serialization.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time in milliseconds for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests to this endpoint that failed (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
