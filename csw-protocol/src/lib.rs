//! Wire contract for the OGC Catalogue Service for Web (CSW) 2.0.2 protocol.
//!
//! This crate defines the payloads a federated source exchanges with a remote
//! catalogue and nothing else: no transport, no negotiation policy. It is used
//! by:
//!
//! - The filter translation engine (`csw-filter`), which emits [`WireFilter`]
//!   trees and reads parsed capabilities
//! - The source runtime (`csw-source`), which builds requests and decodes
//!   responses
//!
//! # Protocol Overview
//!
//! Four operations are modeled:
//!
//! - **GetCapabilities** — response parsing only ([`CapabilitiesDocument`])
//! - **GetRecords** — paged search with a structured Filter or CQL constraint
//! - **GetRecordById** — canonical record fetch by identifier list
//! - **Transaction** — insert/update/delete with an acknowledgement summary
//!
//! All payloads travel as XML; [`quick_xml`] does the reading and writing.
//! Spatial constraint operands are either a GML geometry or a GML envelope,
//! never both — the [`SpatialOperand`] enum makes the exclusivity structural.

mod capabilities;
mod error;
mod filter_xml;
mod record;
mod request;
mod response;

pub use capabilities::{CapabilitiesDocument, DeclaredSpatialOperator};
pub use error::{ProtocolError, Result};
pub use filter_xml::{
    filter_to_xml, parse_filter_xml, ComparisonOp, Envelope, GeometryOperandKind, SpatialOp,
    SpatialOperand, WireFilter,
};
pub use record::InputRecord;
pub use request::{
    get_capabilities_xml, Constraint, ElementSet, GetRecordById, GetRecords, SortOrder, SortSpec,
    Transaction, TransactionOp,
};
pub use response::{
    parse_exception_report, parse_records_response, parse_transaction_response, OwsException,
    RawRecord, SearchResults, TransactionSummary,
};

/// Protocol version spoken by this source.
pub const CSW_VERSION: &str = "2.0.2";

/// CSW namespace; doubles as the default record output schema.
pub const CSW_NS: &str = "http://www.opengis.net/cat/csw/2.0.2";

/// OGC Filter 1.1.0 namespace.
pub const OGC_NS: &str = "http://www.opengis.net/ogc";

/// GML 3.1.1 namespace used for spatial operands.
pub const GML_NS: &str = "http://www.opengis.net/gml";

/// OWS 1.0 namespace (capabilities metadata, exception reports).
pub const OWS_NS: &str = "http://www.opengis.net/ows";

/// Dublin Core element namespace used by `csw:Record`.
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Dublin Core terms namespace.
pub const DCT_NS: &str = "http://purl.org/dc/terms/";

/// Filter spec version carried on `csw:Constraint`.
pub const FILTER_VERSION: &str = "1.1.0";

/// Record type name used for queries and inserts unless configured otherwise.
pub const CSW_RECORD_TYPE: &str = "csw:Record";

/// Constraint-language token for structured XML filters.
pub const LANGUAGE_FILTER: &str = "Filter";

/// Constraint-language token for CQL text.
pub const LANGUAGE_CQL: &str = "CQL_TEXT";

/// Multi-character wildcard used in `PropertyIsLike` patterns.
pub const LIKE_WILDCARD: char = '%';

/// Single-character wildcard used in `PropertyIsLike` patterns.
pub const LIKE_SINGLE_CHAR: char = '_';

/// Escape character used in `PropertyIsLike` patterns.
pub const LIKE_ESCAPE: char = '\\';
