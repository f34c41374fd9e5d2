//! Front service: the `LoggingWeb` role.

use request_telemetry::{server, ServiceRole};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::run(ServiceRole::LoggingWeb).await?;
    Ok(())
}
