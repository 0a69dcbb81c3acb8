//! AIS position tracker

use ais_tracker::{
    config::AppConfig,
    database::Database,
    errors::AisTrackerError,
    pipeline,
    sink::{MemoryStore, PositionSink},
    stream::StreamClient,
};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AisTrackerError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    // Initialize logging, defaulting to info level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("Fatal error during {}: {}", e.stage(), e);
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<(), AisTrackerError> {
    let config = AppConfig::load()?;
    config.validate()?;

    let sink: Box<dyn PositionSink> = match &config.database {
        Some(database) => Box::new(Database::connect(database).await?),
        None => Box::new(MemoryStore::new()),
    };

    let mut client = StreamClient::new(&config.stream)?;
    client.connect().await?;

    // Setup signal handling for graceful shutdown
    let shutdown_signal = signal::ctrl_c();

    let result = tokio::select! {
        result = pipeline::run(&mut client, sink.as_ref()) => result.map(|stats| {
            info!("Pipeline completed: {:?}", stats);
        }),
        _ = shutdown_signal => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    client.close().await;
    result
}
