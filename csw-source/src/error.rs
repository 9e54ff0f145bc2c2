//! The source-level error taxonomy.
//!
//! - [`SourceError::UnsupportedQuery`] — capability mismatch, malformed
//!   constraint, or transport/protocol failure; always surfaced
//! - [`SourceError::UnsupportedOperation`] — raised before any network call
//!   (logical ops undeclared, spatial fallback chain exhausted, transaction
//!   support absent)
//! - Server exception reports are wrapped into `UnsupportedQuery` with the
//!   structured exception chained as the cause
//! - Per-item ingest failures ride inside `IngestResponse`, not here;
//!   [`SourceError::Ingest`] is reserved for batch-level failures
//! - Probe failures flip the availability flag without raising anything

use crate::transport::TransportError;
use csw_filter::TranslateError;
use csw_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by source operations.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The query cannot be executed as asked.
    #[error("unsupported query: {message}")]
    UnsupportedQuery {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation is unsupported by the provider; detected before any
    /// network call.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Batch-level write failure (e.g. server-reported update count does
    /// not match the request).
    #[error("ingest failure: {0}")]
    Ingest(String),

    /// Invalid configuration or configuration patch.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SourceError {
    pub fn unsupported_query(message: impl Into<String>) -> Self {
        SourceError::UnsupportedQuery {
            message: message.into(),
            source: None,
        }
    }

    pub fn unsupported_query_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SourceError::UnsupportedQuery {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<TranslateError> for SourceError {
    fn from(e: TranslateError) -> Self {
        match e {
            TranslateError::UnsupportedSpatial { .. } | TranslateError::UnsupportedOperation(_) => {
                SourceError::UnsupportedOperation(e.to_string())
            }
            other => SourceError::unsupported_query_with("filter translation failed", other),
        }
    }
}

impl From<TransportError> for SourceError {
    fn from(e: TransportError) -> Self {
        SourceError::unsupported_query_with("transport failure", e)
    }
}

impl From<ProtocolError> for SourceError {
    fn from(e: ProtocolError) -> Self {
        SourceError::unsupported_query_with("protocol failure", e)
    }
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
