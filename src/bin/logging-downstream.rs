//! Downstream service: the `LoggingDownstream` role.

use request_telemetry::{server, ServiceRole};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::run(ServiceRole::LoggingDownstream).await?;
    Ok(())
}
