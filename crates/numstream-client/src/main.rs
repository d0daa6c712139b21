use clap::Parser;
use numstream_client::client::{
    config::{CliArgs, ClientConfig},
    controller::Controller,
    telemetry::init_telemetry,
    transport::GrpcTransport,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ClientConfig::try_from(args)?;

    init_telemetry()?;

    match &config.client_id {
        Some(id) => tracing::debug!("Client ID: {id}"),
        None => tracing::debug!("Running stateless"),
    }
    tracing::debug!(
        strategy = %config.strategy,
        quantity = config.quantity,
        seed = config.seed,
        "Requesting sequence from {}",
        config.dsn
    );

    let transport = Arc::new(GrpcTransport::new(&config)?);
    match Controller::new(transport, &config).run().await {
        Ok(summary) => {
            tracing::info!(
                received = summary.received,
                reconnects = summary.reconnects,
                "Total: {} (checksum={})",
                summary.total,
                summary.verified
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("An unhandled error occurred: {e}");
            Err(e.into())
        }
    }
}
