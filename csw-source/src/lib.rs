//! Federated-search source adapter for OGC CSW 2.0.2 catalogues.
//!
//! This crate is the runtime half of the adapter: it owns configuration,
//! transport, the capability snapshot, and the availability probe, and
//! drives the translation engine in `csw-filter` per call.
//!
//! # Architecture
//!
//! - [`CswSource`]: the facade a catalog aggregator holds per configured
//!   source
//! - [`SourceConfiguration`] / [`ConfigPatch`]: typed configuration with
//!   partial, copy-on-write reconfiguration
//! - [`CswTransport`]: the request/response exchange trait, implemented for
//!   HTTP by [`HttpTransport`]
//! - Query and transaction execution build each request from a capability
//!   snapshot captured at call entry; a background probe keeps the snapshot
//!   and the availability flag current
//!
//! # Example
//!
//! ```ignore
//! use csw_filter::Predicate;
//! use csw_source::{CswSource, QueryOptions, SourceConfiguration};
//!
//! let config = SourceConfiguration {
//!     endpoint: "https://catalog.example/csw".to_string(),
//!     ..Default::default()
//! };
//! let source = CswSource::connect(config).await?;
//!
//! let response = source
//!     .query(&Predicate::like("title", "charts%"), QueryOptions::default())
//!     .await?;
//! ```

mod config;
mod error;
mod probe;
mod record;
mod session;
mod source;
mod transaction;
mod transport;

pub use config::{ConfigPatch, SourceConfiguration};
pub use error::{Result, SourceError};
pub use record::{
    IngestItemError, IngestResponse, QueryResponse, ResultRecord, DOWNLOAD_URL_ATTRIBUTE,
    RESOURCE_URI_ATTRIBUTE,
};
pub use session::{QueryOptions, SortKey, SORT_DISTANCE, SORT_RELEVANCE};
pub use source::CswSource;
pub use transport::{CswTransport, HttpTransport, TransportError};

// Wire-level types that appear directly in this crate's API surface.
pub use csw_protocol::{ElementSet, InputRecord};
