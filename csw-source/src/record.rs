//! Result-side record types and write-path response shapes.

use csw_protocol::RawRecord;
use std::collections::BTreeMap;

/// Attribute carrying a direct download link in provider responses.
pub const DOWNLOAD_URL_ATTRIBUTE: &str = "references";

/// Attribute the download link is promoted to.
pub const RESOURCE_URI_ATTRIBUTE: &str = "resource-uri";

/// A record mapped from a provider response, freshly created per response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRecord {
    /// Provider-assigned identifier.
    pub id: String,
    /// Identifier of the source the record came from.
    pub source_id: String,
    /// Multi-valued translated attributes.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Resource locator promoted from the download-URL attribute.
    pub resource_uri: Option<String>,
}

impl ResultRecord {
    /// Map a wire record, promoting the download-URL attribute to the
    /// resource URI.
    pub(crate) fn from_raw(raw: RawRecord, source_id: &str) -> Self {
        let id = raw.identifier().unwrap_or_default().to_string();
        let mut attributes = raw.attributes;
        let resource_uri = match attributes.remove(DOWNLOAD_URL_ATTRIBUTE) {
            Some(values) => {
                let uri = values.first().cloned();
                attributes.insert(RESOURCE_URI_ATTRIBUTE.to_string(), values);
                uri
            }
            None => None,
        };
        ResultRecord {
            id,
            source_id: source_id.to_string(),
            attributes,
            resource_uri,
        }
    }
}

/// Query result: mapped records plus the provider's total-hits figure when
/// it reported one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub records: Vec<ResultRecord>,
    pub total_hits: Option<u64>,
}

/// One failed item in a write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestItemError {
    /// The caller-side identifier of the failed item.
    pub id: String,
    pub message: String,
}

/// Write result: confirmed records plus per-item failures. Successful items
/// are always returned even when siblings failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestResponse {
    pub records: Vec<ResultRecord>,
    pub errors: Vec<IngestItemError>,
}
