//! Error types for predicate translation.

use thiserror::Error;

/// Errors raised while translating a predicate tree to the wire grammar.
#[derive(Error, Debug)]
pub enum TranslateError {
    /// A spatial fallback chain was exhausted. Names the requested operator
    /// and the WKT geometry-type header it was asked to carry.
    #[error("unsupported spatial operation: {operator} over {geometry}")]
    UnsupportedSpatial { operator: String, geometry: String },

    /// The server lacks a non-spatial capability the predicate needs
    /// (logical combinators, a comparison operator).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The predicate itself cannot be expressed (malformed, missing
    /// distance, empty combinator).
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Geometry handling failed (WKT parse, bounding box, buffering).
    #[error("geometry error: {0}")]
    Geometry(String),

    /// CQL rendering failed at some stage of the round trip.
    #[error("unable to build CQL filter")]
    Cql {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wire-layer failure bubbled up from serialization.
    #[error(transparent)]
    Protocol(#[from] csw_protocol::ProtocolError),
}

/// Result type for translation operations.
pub type Result<T> = std::result::Result<T, TranslateError>;
