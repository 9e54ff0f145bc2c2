//! The abstraction-layer predicate tree.
//!
//! This is the input side of translation: the catalog aggregator hands a
//! source one of these per query. The tree is built once and consumed
//! read-only; translation never mutates it.

use serde::{Deserialize, Serialize};

/// Synthetic property matching any text field the provider indexes.
pub const ANY_TEXT: &str = "any-text";

/// Synthetic property matching the provider's geometry field.
pub const ANY_GEO: &str = "any-geo";

/// Synthetic property matching the provider's default date field.
pub const ANY_DATE: &str = "any-date";

/// Binary comparison operators at the abstraction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    EqualTo,
    NotEqualTo,
    LessThan,
    GreaterThan,
    LessThanOrEqualTo,
    GreaterThanOrEqualTo,
}

/// Logical combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Spatial operators at the abstraction layer.
///
/// `NearestNeighbor` has no wire equivalent; resolution rewrites it to a
/// fixed-radius `DWithin` before anything touches the wire grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpatialPredicateOp {
    BBox,
    Beyond,
    Contains,
    Crosses,
    Disjoint,
    DWithin,
    Intersects,
    NearestNeighbor,
    Overlaps,
    Touches,
    Within,
}

impl SpatialPredicateOp {
    pub fn name(&self) -> &'static str {
        match self {
            SpatialPredicateOp::BBox => "BBOX",
            SpatialPredicateOp::Beyond => "BEYOND",
            SpatialPredicateOp::Contains => "CONTAINS",
            SpatialPredicateOp::Crosses => "CROSSES",
            SpatialPredicateOp::Disjoint => "DISJOINT",
            SpatialPredicateOp::DWithin => "DWITHIN",
            SpatialPredicateOp::Intersects => "INTERSECTS",
            SpatialPredicateOp::NearestNeighbor => "NEAREST_NEIGHBOR",
            SpatialPredicateOp::Overlaps => "OVERLAPS",
            SpatialPredicateOp::Touches => "TOUCHES",
            SpatialPredicateOp::Within => "WITHIN",
        }
    }

    /// Parse a configuration token (the forced-operator override).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "BBOX" => Some(SpatialPredicateOp::BBox),
            "BEYOND" => Some(SpatialPredicateOp::Beyond),
            "CONTAINS" => Some(SpatialPredicateOp::Contains),
            "CROSSES" => Some(SpatialPredicateOp::Crosses),
            "DISJOINT" => Some(SpatialPredicateOp::Disjoint),
            "DWITHIN" | "D_WITHIN" => Some(SpatialPredicateOp::DWithin),
            "INTERSECTS" => Some(SpatialPredicateOp::Intersects),
            "NEAREST_NEIGHBOR" => Some(SpatialPredicateOp::NearestNeighbor),
            "OVERLAPS" => Some(SpatialPredicateOp::Overlaps),
            "TOUCHES" => Some(SpatialPredicateOp::Touches),
            "WITHIN" => Some(SpatialPredicateOp::Within),
            _ => None,
        }
    }
}

/// An immutable predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Binary comparison against a literal.
    Comparison {
        op: CompareOp,
        property: String,
        value: String,
        case_sensitive: bool,
    },
    /// Pattern match with `%` / `_` / `\` wildcards. Fuzzy matching has no
    /// wire equivalent and degrades to a plain pattern match.
    Like {
        property: String,
        pattern: String,
        case_sensitive: bool,
        fuzzy: bool,
    },
    /// Null check.
    IsNull { property: String },
    /// Spatial predicate over a WKT geometry. `distance_meters` is required
    /// for Beyond/DWithin and ignored elsewhere.
    Spatial {
        op: SpatialPredicateOp,
        property: String,
        wkt: String,
        distance_meters: Option<f64>,
    },
    /// Logical combinator over child predicates.
    Logical {
        op: LogicalOp,
        children: Vec<Predicate>,
    },
    /// Match records no older than `within`, resolved against the clock at
    /// translation time.
    RelativeDate {
        property: String,
        within: chrono::Duration,
    },
}

impl Predicate {
    pub fn equal_to(property: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Comparison {
            op: CompareOp::EqualTo,
            property: property.into(),
            value: value.into(),
            case_sensitive: true,
        }
    }

    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            property: property.into(),
            pattern: pattern.into(),
            case_sensitive: false,
            fuzzy: false,
        }
    }

    pub fn spatial(
        op: SpatialPredicateOp,
        property: impl Into<String>,
        wkt: impl Into<String>,
    ) -> Self {
        Predicate::Spatial {
            op,
            property: property.into(),
            wkt: wkt.into(),
            distance_meters: None,
        }
    }

    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::Logical {
            op: LogicalOp::And,
            children,
        }
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Logical {
            op: LogicalOp::Or,
            children,
        }
    }

    pub fn not(child: Predicate) -> Self {
        Predicate::Logical {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }
}
