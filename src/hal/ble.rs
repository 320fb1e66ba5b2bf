//! Bluetooth LE transport over `btleplug`.
//!
//! Finds the hub by hardware address (adapter cache first, then an
//! unfiltered scan that is stopped on every exit), connects,
//! resolves the LWP3 command characteristic and writes frames to it without
//! response. A background task watches adapter events and fires the
//! [`SessionLossNotifier`] when the hub disconnects on its own.
//!
//! ```ignore
//! let transport = BtleplugTransport::new().await?;
//! let bridge = BridgeController::new(transport, publisher, &config);
//! ```

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::SessionLossNotifier;
use crate::traits::WirelessTransport;

/// LWP3 command characteristic (`00001624-1212-efde-1623-785feabcd123`).
pub const HUB_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000_1624_1212_efde_1623_785f_eabc_d123);

/// How often the peripheral list is checked while scanning.
pub const SCAN_POLL: Duration = Duration::from_millis(250);

/// Errors from the BLE transport.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// The host has no Bluetooth adapter.
    #[error("no bluetooth adapter found")]
    NoAdapter,

    /// The configured address is not a valid hardware address.
    #[error("invalid hardware address {0:?}")]
    InvalidAddress(String),

    /// Connected, but the hub does not expose the command characteristic.
    #[error("hub command characteristic not found")]
    MissingCharacteristic,

    /// No session is open.
    #[error("no open session")]
    NoSession,

    /// Error from the platform Bluetooth stack.
    #[error(transparent)]
    Btle(#[from] btleplug::Error),
}

pub(crate) fn parse_address(address: &str) -> Result<BDAddr, BleError> {
    BDAddr::from_str(address.trim()).map_err(|_| BleError::InvalidAddress(address.to_string()))
}

/// [`WirelessTransport`] for one LEGO hub over the first system adapter.
pub struct BtleplugTransport {
    adapter: Adapter,
    peripheral: Option<Peripheral>,
    characteristic: Option<Characteristic>,
    watcher: Option<JoinHandle<()>>,
}

impl BtleplugTransport {
    /// Use the first Bluetooth adapter on the system.
    pub async fn new() -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleError::NoAdapter)?;
        info!(adapter = %adapter.adapter_info().await.unwrap_or_default(), "using bluetooth adapter");
        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            peripheral: None,
            characteristic: None,
            watcher: None,
        }
    }

    async fn known_peripheral(&self, address: BDAddr) -> Result<Option<Peripheral>, BleError> {
        Ok(self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.address() == address))
    }

    /// Cached peripheral if the adapter already knows it, otherwise scan
    /// until it shows up. Runs until found; callers bound it.
    async fn find(&self, address: BDAddr) -> Result<Peripheral, BleError> {
        if let Some(peripheral) = self.known_peripheral(address).await? {
            return Ok(peripheral);
        }

        self.adapter.start_scan(ScanFilter::default()).await?;
        let adapter = self.adapter.clone();
        let scan = ScanStop::new(async move {
            if let Err(e) = adapter.stop_scan().await {
                debug!(error = %e, "stop_scan failed");
            }
        });
        debug!(%address, "scanning");

        let found = loop {
            match self.known_peripheral(address).await {
                Ok(Some(peripheral)) => break Ok(peripheral),
                Ok(None) => tokio::time::sleep(SCAN_POLL).await,
                Err(e) => break Err(e),
            }
        };
        scan.finish().await;
        found
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

/// Pending `stop_scan` for an active scan.
///
/// Awaited by [`ScanStop::finish`]; if the scan future is dropped instead
/// (discovery timeout), the stop is spawned onto the current runtime.
struct ScanStop {
    pending: Option<BoxFuture<'static, ()>>,
}

impl ScanStop {
    fn new(stop: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            pending: Some(stop.boxed()),
        }
    }

    async fn finish(mut self) {
        if let Some(stop) = self.pending.take() {
            stop.await;
        }
    }
}

impl Drop for ScanStop {
    fn drop(&mut self) {
        let Some(stop) = self.pending.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(stop);
            }
            Err(_) => warn!("no runtime to stop scan, adapter left scanning"),
        }
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

impl WirelessTransport for BtleplugTransport {
    type Error = BleError;

    async fn discover(&mut self, address: &str) -> Result<(), BleError> {
        let wanted = parse_address(address)?;
        self.peripheral = Some(self.find(wanted).await?);
        Ok(())
    }

    async fn open(&mut self, address: &str, on_lost: SessionLossNotifier) -> Result<(), BleError> {
        let wanted = parse_address(address)?;
        let peripheral = match self.peripheral.clone() {
            Some(p) if p.address() == wanted => p,
            // discovery skipped: scan here, inside the session-open bound
            _ => self.find(wanted).await?,
        };

        // Subscribe before connecting so an early drop is not missed
        let mut events = self.adapter.events().await?;
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == HUB_CHARACTERISTIC)
            .ok_or(BleError::MissingCharacteristic)?;

        let id = peripheral.id();
        self.stop_watcher();
        self.watcher = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event {
                    if gone == id {
                        on_lost.notify();
                        break;
                    }
                }
            }
        }));

        self.peripheral = Some(peripheral);
        self.characteristic = Some(characteristic);
        Ok(())
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), BleError> {
        let (Some(peripheral), Some(characteristic)) = (&self.peripheral, &self.characteristic)
        else {
            return Err(BleError::NoSession);
        };
        peripheral
            .write(characteristic, frame, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BleError> {
        self.stop_watcher();
        self.characteristic = None;
        let Some(peripheral) = self.peripheral.take() else {
            return Ok(());
        };
        match peripheral.disconnect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "disconnect failed");
                Err(e.into())
            }
        }
    }
}
