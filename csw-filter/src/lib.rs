//! Filter translation and capability negotiation for CSW sources.
//!
//! This crate decides, per predicate and geometry, whether and how a query
//! can be expressed in terms the target server understands:
//!
//! - [`CapabilityModel`] — immutable snapshot of a server's declared
//!   comparison operators, spatial operator × operand pairs, constraint
//!   languages, output schemas, and element sets
//! - [`spatial`] — graceful-degradation chains for unsupported spatial
//!   operators, including the buffered-intersects fallback for distance
//!   queries and the nearest-neighbor rewrite
//! - [`geometry`] — coordinate-axis normalization and meters→degrees
//!   buffering over WKT
//! - [`FilterTranslator`] — recursive, capability-checked dispatch from the
//!   predicate tree to the wire filter tree
//! - [`render_cql`] — CQL text rendering via round trip through the Filter
//!   XML grammar
//!
//! # Example
//!
//! ```ignore
//! use csw_filter::{CapabilityModel, FilterTranslator, Predicate, TranslationOptions};
//!
//! let model = CapabilityModel::from_document(&capabilities);
//! let options = TranslationOptions::default();
//! let translator = FilterTranslator::new(&model, &options);
//! let wire = translator.translate(&Predicate::like("title", "charts%"))?;
//! ```

pub mod capability;
pub mod cql;
pub mod error;
pub mod geometry;
pub mod predicate;
pub mod spatial;
pub mod translate;

pub use capability::{CapabilityModel, ConstraintLanguage};
pub use cql::render_cql;
pub use error::{Result, TranslateError};
pub use geometry::AxisOrder;
pub use predicate::{
    CompareOp, LogicalOp, Predicate, SpatialPredicateOp, ANY_DATE, ANY_GEO, ANY_TEXT,
};
pub use spatial::{SpatialPlan, NEAREST_NEIGHBOR_DISTANCE_METERS};
pub use translate::{FilterTranslator, TranslationOptions};
