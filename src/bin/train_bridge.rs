//! MQTT to Bluetooth LE train bridge.
//!
//! Connects to the MQTT broker, drives one LEGO hub over Bluetooth LE and
//! runs until Ctrl+C, then stops the train and reports `offline`.
//!
//! # Usage
//!
//! ```sh
//! TRAIN_ADDRESS=90:84:2B:00:00:01 TRAIN_HUB=duplo \
//!     cargo run --features ble --bin train-bridge
//! ```
//!
//! # Configuration
//!
//! Environment variables only, see [`train_bridge::config`]. Log level via
//! `RUST_LOG` (default `info`).

use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use train_bridge::hal::BtleplugTransport;
use train_bridge::services::{connect_bus, MqttBusAdapter, MqttPublisher, MqttRuntimeConfig};
use train_bridge::{BridgeController, BridgeHandle, Config};

/// Time allowed for the final `offline` publish to reach the broker.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    if !config.device.is_configured() {
        bail!("TRAIN_ADDRESS is not set");
    }

    info!(
        address = %config.device.address,
        hub = %config.device.hub,
        broker = %format_args!("{}:{}", config.mqtt.host, config.mqtt.port),
        prefix = %config.mqtt.topic_prefix,
        speed_mode = %config.bridge.speed_mode,
        "starting train bridge"
    );

    let transport = BtleplugTransport::new()
        .await
        .context("initialising bluetooth")?;

    let (client, eventloop) = connect_bus(&MqttRuntimeConfig::from_config(&config.mqtt));
    let (handle, commands) = BridgeHandle::channel(&config);
    let adapter = MqttBusAdapter::new(
        eventloop,
        client.clone(),
        handle,
        config.mqtt.subscription().as_str(),
    );
    let adapter_task = tokio::spawn(adapter.run());

    let bridge = BridgeController::new(transport, MqttPublisher::new(client.clone()), &config);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("interrupt received");
    };
    bridge.run(commands, shutdown).await;

    if let Err(e) = client.disconnect().await {
        warn!(error = %e, "MQTT disconnect failed");
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, adapter_task).await.is_err() {
        warn!("MQTT adapter did not stop in time");
    }

    info!("train bridge stopped");
    Ok(())
}
