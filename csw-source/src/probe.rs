//! Availability probing and the capability-snapshot swap.
//!
//! One background task owns all availability transitions. It ticks every
//! second so interval reconfiguration takes effect promptly, and refetches
//! capabilities once the configured poll interval has elapsed. On a
//! successful probe the model is rebuilt and swapped *before* the
//! availability flag flips, so the first observed "available" state already
//! carries current capabilities. A failed probe flips the flag and leaves
//! the previous model in place.

use crate::error::{Result, SourceError};
use crate::transport::CswTransport;
use csw_filter::CapabilityModel;
use csw_protocol::{get_capabilities_xml, parse_exception_report, CapabilitiesDocument};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Probe loop tick; the floor on reaction time to reconfiguration.
const MIN_CADENCE: Duration = Duration::from_secs(1);

/// State shared between the probe task and readers.
pub(crate) struct SharedState {
    model: RwLock<Arc<CapabilityModel>>,
    available: AtomicBool,
    last_success: Mutex<Option<Instant>>,
    availability_tx: watch::Sender<bool>,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        let (availability_tx, _) = watch::channel(false);
        Arc::new(Self {
            model: RwLock::new(Arc::new(CapabilityModel::default())),
            available: AtomicBool::new(false),
            last_success: Mutex::new(None),
            availability_tx,
        })
    }

    /// Current capability snapshot. Readers get a consistent model: either
    /// the predecessor or the fully rebuilt successor, never a partial one.
    pub fn snapshot(&self) -> Arc<CapabilityModel> {
        self.model.read().clone()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn last_success(&self) -> Option<Instant> {
        *self.last_success.lock()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.availability_tx.subscribe()
    }
}

/// Fetch and parse the provider's capabilities document.
pub(crate) async fn fetch_capabilities(
    transport: &dyn CswTransport,
) -> Result<CapabilitiesDocument> {
    let request = get_capabilities_xml()?;
    let body = transport.send(&request).await?;
    if let Some(exception) = parse_exception_report(&body) {
        return Err(SourceError::unsupported_query_with(
            "capabilities fetch rejected",
            exception,
        ));
    }
    Ok(CapabilitiesDocument::parse(&body)?)
}

/// Run one probe cycle, updating model and availability. Returns the
/// resulting availability.
pub(crate) async fn probe_once(transport: &dyn CswTransport, state: &SharedState) -> bool {
    match fetch_capabilities(transport).await {
        Ok(doc) => {
            let model = Arc::new(CapabilityModel::from_document(&doc));
            // Swap the snapshot before flipping the flag.
            *state.model.write() = model;
            *state.last_success.lock() = Some(Instant::now());
            if !state.available.swap(true, Ordering::SeqCst) {
                tracing::info!("source became available");
                // send_replace stores the value even with no subscribers.
                state.availability_tx.send_replace(true);
            }
            true
        }
        Err(e) => {
            if state.available.swap(false, Ordering::SeqCst) {
                tracing::info!(error = %e, "source became unavailable");
                state.availability_tx.send_replace(false);
            } else {
                tracing::debug!(error = %e, "availability probe failed");
            }
            false
        }
    }
}

/// Spawn the periodic probe task. The caller is expected to have run an
/// initial [`probe_once`] already; the task waits a full interval before
/// its first refetch.
pub(crate) fn spawn_probe(
    transport: Arc<dyn CswTransport>,
    state: Arc<SharedState>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_poll = Instant::now();
        loop {
            tokio::time::sleep(MIN_CADENCE).await;
            if last_poll.elapsed() >= interval {
                probe_once(transport.as_ref(), &state).await;
                last_poll = Instant::now();
            }
        }
    })
}
