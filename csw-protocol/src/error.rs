//! Error types for the CSW wire layer.

use thiserror::Error;

/// Errors raised while building or parsing CSW payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// XML could not be written or read.
    #[error("XML error: {0}")]
    Xml(String),

    /// A document was well-formed XML but not a valid CSW payload.
    #[error("malformed {document}: {message}")]
    Malformed {
        document: &'static str,
        message: String,
    },

    /// WKT geometry could not be parsed.
    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// A geometry type has no encoding in the target grammar.
    #[error("unencodable geometry: {0}")]
    UnencodableGeometry(String),
}

impl ProtocolError {
    pub(crate) fn malformed(document: &'static str, message: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            document,
            message: message.into(),
        }
    }
}

impl From<quick_xml::Error> for ProtocolError {
    fn from(e: quick_xml::Error) -> Self {
        ProtocolError::Xml(e.to_string())
    }
}

/// Result type for wire-layer operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
