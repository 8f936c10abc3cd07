//! Keyed Fetch - duplicate request cancellation demo
//!
//! Issues the same request twice in quick succession under one key, so the
//! first is cancelled by the second, then prints the recorded state and the
//! collected metrics.
//!
//! # Running the Example
//!
//! ```bash
//! FETCHSTATE_BASE_URL=https://jsonplaceholder.typicode.com cargo run -p keyed-fetch
//! ```
//!
//! Every `FETCHSTATE_*` variable understood by `ClientConfig::from_env` applies.

#![allow(missing_docs)]

use fetchstate::{ClientConfig, OnSuccess, RequestClient, RequestOptions};
use fetchstate_http::ReqwestTransport;
use fetchstate_runtime::metrics::MetricsRecorder;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fetchstate=debug,keyed_fetch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus recorder
    let mut metrics = MetricsRecorder::new();
    metrics.install()?;

    // 3. Load configuration
    let mut config = ClientConfig::from_env()?.with_header("accept", "application/json");
    if config.defaults.base_url.is_none() {
        config = config.with_base_url(DEFAULT_BASE_URL);
    }
    tracing::info!(
        base_url = config.defaults.base_url.as_deref().unwrap_or_default(),
        dedup_scope = %config.dedup_scope,
        "Configuration loaded"
    );

    let client = RequestClient::new(ReqwestTransport::new(), config);

    // 4. Two identical requests: the first is cancelled by the second
    let options = RequestOptions::get("posts", "/posts")
        .with_param("userId", 1)
        .with_on_success(OnSuccess::new().execute(|resp| {
            let count = resp.data.as_array().map_or(0, Vec::len);
            tracing::info!(count, "Posts received");
        }));

    let first = tokio::spawn({
        let client = client.clone();
        let options = options.clone();
        async move { client.request(options).await }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = client.request(options).await;

    match first.await? {
        Ok(_) => tracing::info!("First request finished before the duplicate was issued"),
        Err(e) if e.is_cancelled() => tracing::info!("First request cancelled by its duplicate"),
        Err(e) => tracing::warn!(error = %e, "First request failed"),
    }
    if let Err(e) = &second {
        tracing::warn!(error = %e, "Second request failed");
    }

    // 5. Display recorded state
    let record = client.record("posts").await;
    println!("{}", serde_json::to_string_pretty(&record)?);

    client.clear("posts").await?;
    println!("after clear: {}", serde_json::to_string(&client.record("posts").await)?);

    // 6. Display metrics
    if let Some(rendered) = metrics.render() {
        println!("{rendered}");
    }

    client.shutdown().await?;
    tracing::info!("Clean shutdown complete");

    Ok(())
}
