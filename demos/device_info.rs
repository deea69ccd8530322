//! Connect to a controller behind a TCP bridge and print its device info.
//!
//! ```text
//! AURORA_ADDR=192.168.4.1:23 RUST_LOG=aurora_client=debug cargo run --example device_info
//! ```

use std::time::Duration;

use aurora_client::transport::tcp;
use aurora_client::{commands, DeviceBuilder, Progress, SessionHooks};

#[tokio::main]
async fn main() -> aurora_client::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aurora_client=info".into()),
        )
        .init();

    let addr = std::env::var("AURORA_ADDR")
        .unwrap_or_else(|_| format!("192.168.4.1:{}", tcp::DEFAULT_PORT));

    let (reader, writer) = tcp::connect(addr.as_str()).await?;
    let device = DeviceBuilder::new(tcp::KIND)
        .hooks(SessionHooks::new().on_timeout(|| tracing::error!("Device did not answer")))
        .spawn(reader, writer)?;

    device
        .dispatch(commands::request_device_info(|info| {
            tracing::info!("Device info: {:?}", info);
        }))
        .await?;

    loop {
        let progress = device.progress().await?;
        if progress.is_terminal_failure() || progress == Progress::Percent(100) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    Ok(())
}
