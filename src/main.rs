use std::sync::Arc;

use anyhow::Context;

use osw_validation::auth::{Authorizer, create_provider};
use osw_validation::bus::{StdinSubscription, StdoutTopic};
use osw_validation::config::WorkerConfig;
use osw_validation::pipeline::ValidationPipeline;
use osw_validation::storage::{HttpStorageClient, LocalStorageClient, StorageClient};
use osw_validation::validator::CommandValidator;
use osw_validation::worker::Worker;

/// Fallback bus names when the environment leaves them empty.
const DEFAULT_SUBSCRIPTION: &str = "stdin";
const DEFAULT_TOPIC: &str = "stdout";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the bus; logs go to stderr
    let (writer, _log_guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(writer)
        .init();

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    tracing::info!("{} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    tracing::info!("   Container: {}", config.storage.container_name);
    tracing::info!("   Downloads: {}", config.download_dir.display());
    tracing::info!("   Validator: {}", config.validator_command);
    tracing::info!("   Max concurrent messages: {}", config.max_concurrent_messages);

    // ── Storage ─────────────────────────────────────────────────────────
    let storage: Arc<dyn StorageClient> = match &config.storage.local_root {
        Some(root) => {
            tracing::info!("   Storage: local ({})", root.display());
            Arc::new(LocalStorageClient::new(root))
        }
        None => {
            tracing::info!("   Storage: http");
            Arc::new(HttpStorageClient::new().context("Failed to create storage client")?)
        }
    };
    storage
        .get_container(&config.storage.container_name)
        .await
        .with_context(|| format!("Storage container {} unavailable", config.storage.container_name))?;

    // ── Authorization ───────────────────────────────────────────────────
    let provider = create_provider(&config.auth).context("Failed to create permission provider")?;
    let authorizer = Authorizer::new(provider, &config.auth);

    // ── Validator ───────────────────────────────────────────────────────
    let validator = CommandValidator::from_command_line(&config.validator_command)
        .context("Invalid VALIDATOR_COMMAND")?;

    // ── Bus ─────────────────────────────────────────────────────────────
    let subscription_name = non_empty_or(&config.event_bus.upload_subscription, DEFAULT_SUBSCRIPTION);
    let topic_name = non_empty_or(&config.event_bus.validation_topic, DEFAULT_TOPIC);
    let subscription = Arc::new(StdinSubscription::new(subscription_name));
    let topic = Arc::new(StdoutTopic::new(topic_name));

    let pipeline = Arc::new(ValidationPipeline::new(
        &config,
        storage,
        authorizer,
        Arc::new(validator),
        topic,
    ));

    let worker = Worker::new(subscription, pipeline, config.max_concurrent_messages);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl+C received, shutting down...");
    };

    let summary = worker.run(shutdown).await.context("Worker failed")?;
    tracing::info!(
        received = summary.received,
        finished = summary.finished(),
        "Goodbye"
    );

    Ok(())
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value }
}
