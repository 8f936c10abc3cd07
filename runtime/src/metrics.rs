//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for:
//! - Reducer execution and effect handling in the Store
//! - The request lifecycle (issued, cancelled, succeeded, failed)
//!
//! # Example
//!
//! ```rust,no_run
//! use fetchstate_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // Scrape text, served by whatever endpoint the application exposes
//! let body = recorder.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders scrape output. Serving that
/// output over HTTP is left to the host application.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that is not yet installed.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a warning
    /// and succeeds without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the global recorder wasn't installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store Metrics
    describe_counter!("store.commands.total", "Total number of actions sent to stores");
    describe_counter!("store.effects.executed", "Total number of effects executed, by type");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time taken to execute reducers"
    );

    // Request Metrics
    describe_counter!("request.issued.total", "Total number of requests issued");
    describe_counter!(
        "request.cancelled.total",
        "Total number of in-flight requests cancelled by a duplicate"
    );
    describe_counter!("request.succeeded.total", "Total number of successful requests");
    describe_counter!("request.failed.total", "Total number of failed requests");
    describe_histogram!(
        "request.duration_seconds",
        "Time from issuing a request to its outcome"
    );
}

/// Request lifecycle metrics recorder.
pub struct RequestMetrics;

impl RequestMetrics {
    /// Record a request being issued.
    pub fn record_issued() {
        counter!("request.issued.total").increment(1);
    }

    /// Record an in-flight duplicate being cancelled.
    pub fn record_cancelled() {
        counter!("request.cancelled.total").increment(1);
    }

    /// Record a success.
    pub fn record_succeeded(duration: Option<Duration>) {
        counter!("request.succeeded.total").increment(1);
        if let Some(duration) = duration {
            histogram!("request.duration_seconds").record(duration.as_secs_f64());
        }
    }

    /// Record a failure.
    pub fn record_failed(cancelled: bool, duration: Option<Duration>) {
        counter!("request.failed.total", "cancelled" => cancelled.to_string()).increment(1);
        if let Some(duration) = duration {
            histogram!("request.duration_seconds").record(duration.as_secs_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recorder_creation() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.handle().is_none());
        assert!(recorder.render().is_none());
    }

    #[test]
    fn test_request_metrics_render() {
        let mut recorder = MetricsRecorder::new();
        recorder.install().unwrap();

        RequestMetrics::record_issued();
        RequestMetrics::record_cancelled();
        RequestMetrics::record_succeeded(Some(Duration::from_millis(20)));
        RequestMetrics::record_failed(true, None);

        // If another test installed the recorder first, there's no handle.
        // That's OK - metrics are still being recorded.
        if let Some(rendered) = recorder.render() {
            assert!(rendered.contains("request_issued_total"));
            assert!(rendered.contains("request_cancelled_total"));
        }
    }
}
