//! The federated source facade.
//!
//! [`CswSource`] owns the configuration, the transport, the capability
//! snapshot, and the availability probe, and exposes the query/write/
//! availability surface the catalog aggregator calls. Every call captures
//! Arc snapshots of configuration and capabilities on entry, so
//! reconfiguration never affects a call already in flight.

use crate::config::{ConfigPatch, SourceConfiguration};
use crate::error::Result;
use crate::probe::{probe_once, spawn_probe, SharedState};
use crate::record::{IngestResponse, QueryResponse, ResultRecord};
use crate::session::{PostTransform, QueryOptions, QuerySession};
use crate::transaction::TransactionEngine;
use crate::transport::{CswTransport, HttpTransport};
use csw_filter::Predicate;
use csw_protocol::InputRecord;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A configured connection to one remote CSW catalogue.
pub struct CswSource {
    config: RwLock<Arc<SourceConfiguration>>,
    transport: RwLock<Arc<dyn CswTransport>>,
    /// Caller-supplied transports are never rebuilt on reconfigure.
    custom_transport: bool,
    state: Arc<SharedState>,
    probe: Mutex<Option<JoinHandle<()>>>,
    post_transform: RwLock<Option<Arc<PostTransform>>>,
}

impl std::fmt::Debug for CswSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CswSource")
            .field("config", &self.config.read())
            .field("available", &self.state.is_available())
            .finish()
    }
}

impl CswSource {
    /// Connect to the configured endpoint over HTTP.
    ///
    /// The initial capability fetch runs before this returns; if it fails
    /// the source still comes up, marked unavailable, and the probe keeps
    /// trying.
    pub async fn connect(config: SourceConfiguration) -> Result<Self> {
        let transport: Arc<dyn CswTransport> = Arc::new(HttpTransport::from_config(&config)?);
        Ok(Self::init(config, transport, false).await)
    }

    /// Connect over a caller-supplied transport (tests, alternative stacks).
    pub async fn with_transport(
        config: SourceConfiguration,
        transport: Arc<dyn CswTransport>,
    ) -> Self {
        Self::init(config, transport, true).await
    }

    async fn init(
        config: SourceConfiguration,
        transport: Arc<dyn CswTransport>,
        custom_transport: bool,
    ) -> Self {
        let state = SharedState::new();
        probe_once(transport.as_ref(), &state).await;
        let probe = spawn_probe(transport.clone(), state.clone(), config.poll_interval());

        Self {
            config: RwLock::new(Arc::new(config)),
            transport: RwLock::new(transport),
            custom_transport,
            state,
            probe: Mutex::new(Some(probe)),
            post_transform: RwLock::new(None),
        }
    }

    /// Execute a paged query.
    pub async fn query(
        &self,
        predicate: &Predicate,
        options: QueryOptions,
    ) -> Result<QueryResponse> {
        let (config, transport, model, transform) = self.capture();
        let session = QuerySession {
            transport: transport.as_ref(),
            config: &config,
            model: &model,
            post_transform: transform.as_deref(),
        };
        session.query(predicate, &options).await
    }

    /// Insert records and return the canonical stored records.
    pub async fn create(&self, records: Vec<InputRecord>) -> Result<IngestResponse> {
        let (config, transport, model, transform) = self.capture();
        let engine = TransactionEngine {
            session: QuerySession {
                transport: transport.as_ref(),
                config: &config,
                model: &model,
                post_transform: transform.as_deref(),
            },
        };
        engine.create(records).await
    }

    /// Update records matched on the configured identifier property.
    pub async fn update(&self, records: Vec<InputRecord>) -> Result<IngestResponse> {
        let (config, transport, model, transform) = self.capture();
        let engine = TransactionEngine {
            session: QuerySession {
                transport: transport.as_ref(),
                config: &config,
                model: &model,
                post_transform: transform.as_deref(),
            },
        };
        engine.update(records).await
    }

    /// Delete records by identifier.
    pub async fn delete(&self, ids: Vec<String>) -> Result<IngestResponse> {
        let (config, transport, model, transform) = self.capture();
        let engine = TransactionEngine {
            session: QuerySession {
                transport: transport.as_ref(),
                config: &config,
                model: &model,
                post_transform: transform.as_deref(),
            },
        };
        engine.delete(ids).await
    }

    /// Current availability, as last determined by the probe.
    pub fn is_available(&self) -> bool {
        self.state.is_available()
    }

    /// Instant of the last successful probe, if any.
    pub fn last_successful_probe(&self) -> Option<Instant> {
        self.state.last_success()
    }

    /// Observe availability transitions.
    pub fn subscribe_availability(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Install a post-processing transform applied to every mapped record.
    pub fn set_post_transform(
        &self,
        transform: impl Fn(ResultRecord) -> ResultRecord + Send + Sync + 'static,
    ) {
        *self.post_transform.write() = Some(Arc::new(transform));
    }

    /// Apply a partial configuration update.
    ///
    /// Cancels the probe, applies the patch, forces an immediate capability
    /// refetch, and reschedules the probe under the new interval. Calls
    /// already in flight complete under the configuration they captured.
    pub async fn refresh(&self, patch: ConfigPatch) -> Result<()> {
        if let Some(handle) = self.probe.lock().take() {
            handle.abort();
        }

        let next = Arc::new(self.config.read().apply(&patch)?);
        if !self.custom_transport {
            let transport: Arc<dyn CswTransport> = Arc::new(HttpTransport::from_config(&next)?);
            *self.transport.write() = transport;
        }
        *self.config.write() = next.clone();

        let transport = self.transport.read().clone();
        probe_once(transport.as_ref(), &self.state).await;
        *self.probe.lock() = Some(spawn_probe(
            transport,
            self.state.clone(),
            next.poll_interval(),
        ));
        Ok(())
    }

    fn capture(
        &self,
    ) -> (
        Arc<SourceConfiguration>,
        Arc<dyn CswTransport>,
        Arc<csw_filter::CapabilityModel>,
        Option<Arc<PostTransform>>,
    ) {
        (
            self.config.read().clone(),
            self.transport.read().clone(),
            self.state.snapshot(),
            self.post_transform.read().clone(),
        )
    }
}

impl Drop for CswSource {
    fn drop(&mut self) {
        if let Some(handle) = self.probe.lock().take() {
            handle.abort();
        }
    }
}
