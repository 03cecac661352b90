//! lifeboat cache-warming entry point.
//!
//! Loads the gateway configuration, registers a worker against the real
//! fetch client, runs one install + activate cycle, and reports the
//! resulting partition set. Deployments run this to warm the app shell for
//! a new version; a non-zero exit means the rollout was aborted.

use std::sync::Arc;

use anyhow::Result;
use lifeboat_client::{FetchClient, FetchConfig};
use lifeboat_core::AppConfig;
use lifeboat_worker::{HostMessage, Worker};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.version,
        db = %config.db_path.display(),
        manifest_entries = config.static_manifest.len(),
        "warming cache generation"
    );

    let fetch_config = FetchConfig {
        user_agent: config.user_agent.clone(),
        timeout: config.timeout(),
        max_bytes: config.max_bytes,
        ..Default::default()
    };
    let fetcher = Arc::new(FetchClient::new(fetch_config)?);

    let worker = Worker::register(config, fetcher).await?;
    worker.install().await?;
    worker.post_message(HostMessage::SkipWaiting);
    worker.try_activate().await?;

    for name in worker.partition_names().await? {
        tracing::info!(partition = %name, "partition ready");
    }

    Ok(())
}
