//! Spatial operator resolution with graceful-degradation chains.
//!
//! For a requested spatial predicate, picks the wire operator and operand
//! shape the server can actually accept, walking a documented equivalence
//! chain when the exact operator is undeclared:
//!
//! - CONTAINS ⇔ NOT(WITHIN)
//! - DISJOINT ⇔ NOT(BBOX) ⇔ NOT(INTERSECTS)
//! - INTERSECTS ⇔ BBOX ⇔ NOT(DISJOINT)
//! - WITHIN ⇔ CONTAINS (argument roles not swapped)
//! - DWITHIN(d) ⇔ NOT(BEYOND(d)) ⇔ INTERSECTS over the buffered geometry
//! - BEYOND(d) ⇔ NOT(DWITHIN(d))
//! - NEAREST_NEIGHBOR rewrites unconditionally to DWITHIN(1000 NM)
//!
//! Each chain member is checked for direct (operator, operand) support, so
//! resolution always terminates. Envelope members send the geometry's
//! bounding box; Beyond/DWithin never accept an envelope.

use crate::capability::CapabilityModel;
use crate::error::{Result, TranslateError};
use crate::geometry::wkt_type_header;
use crate::predicate::SpatialPredicateOp;
use csw_protocol::{GeometryOperandKind, SpatialOp};

/// Distance used when rewriting nearest-neighbor requests: 1000 nautical
/// miles in meters.
pub const NEAREST_NEIGHBOR_DISTANCE_METERS: f64 = 1_852_000.0;

/// How the resolved clause embeds its geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandChoice {
    Geometry,
    Envelope,
}

/// A realizable wire-level plan for a spatial predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialPlan {
    /// Wire operator to emit.
    pub op: SpatialOp,
    /// Send the geometry's bounding envelope instead of its shape.
    pub envelope: bool,
    /// Wrap the clause in `ogc:Not`.
    pub negate: bool,
    /// Distance to carry on the wire clause; present iff `op` is a
    /// distance operator. Nearest-neighbor rewrites arrive here with the
    /// fixed constant.
    pub distance_meters: Option<f64>,
    /// Buffer the geometry by this many meters before embedding (the
    /// DWithin→Intersects fallback).
    pub buffer_meters: Option<f64>,
}

/// Resolve a requested operator against the capability snapshot.
///
/// `wkt` is the predicate's geometry in its original axis order; only its
/// type header matters here. `distance_meters` must be present for
/// Beyond/DWithin requests.
pub fn resolve(
    requested: SpatialPredicateOp,
    wkt: &str,
    distance_meters: Option<f64>,
    model: &CapabilityModel,
) -> Result<SpatialPlan> {
    let geometry_kind = GeometryOperandKind::for_wkt(wkt)
        .map_err(|_| unsupported(requested, wkt))?;

    let (wire_op, distance) = match requested {
        SpatialPredicateOp::NearestNeighbor => {
            (SpatialOp::DWithin, Some(NEAREST_NEIGHBOR_DISTANCE_METERS))
        }
        other => (
            wire_equivalent(other),
            distance_meters,
        ),
    };

    if wire_op.is_distance_op() && distance.is_none() {
        return Err(TranslateError::UnsupportedFilter(format!(
            "{} requires a distance",
            requested.name()
        )));
    }

    for candidate in candidates(wire_op) {
        if supports(model, candidate, geometry_kind) {
            return Ok(SpatialPlan {
                op: candidate.op,
                envelope: candidate.operand == OperandChoice::Envelope,
                negate: candidate.negate,
                distance_meters: candidate.op.is_distance_op().then_some(distance).flatten(),
                buffer_meters: None,
            });
        }
    }

    // Last resort for distance-within: intersect with the buffered geometry.
    // Buffering always yields a polygon, so candidates are re-checked
    // against the Polygon operand.
    if wire_op == SpatialOp::DWithin {
        for candidate in candidates(SpatialOp::Intersects) {
            if supports(model, candidate, GeometryOperandKind::Polygon) {
                return Ok(SpatialPlan {
                    op: candidate.op,
                    envelope: candidate.operand == OperandChoice::Envelope,
                    negate: candidate.negate,
                    distance_meters: None,
                    buffer_meters: distance,
                });
            }
        }
    }

    Err(unsupported(requested, wkt))
}

fn unsupported(requested: SpatialPredicateOp, wkt: &str) -> TranslateError {
    TranslateError::UnsupportedSpatial {
        operator: requested.name().to_string(),
        geometry: wkt_type_header(wkt),
    }
}

fn wire_equivalent(op: SpatialPredicateOp) -> SpatialOp {
    match op {
        SpatialPredicateOp::BBox => SpatialOp::BBox,
        SpatialPredicateOp::Beyond => SpatialOp::Beyond,
        SpatialPredicateOp::Contains => SpatialOp::Contains,
        SpatialPredicateOp::Crosses => SpatialOp::Crosses,
        SpatialPredicateOp::Disjoint => SpatialOp::Disjoint,
        SpatialPredicateOp::DWithin => SpatialOp::DWithin,
        SpatialPredicateOp::Intersects => SpatialOp::Intersects,
        SpatialPredicateOp::Overlaps => SpatialOp::Overlaps,
        SpatialPredicateOp::Touches => SpatialOp::Touches,
        SpatialPredicateOp::Within => SpatialOp::Within,
        // Rewritten before this point.
        SpatialPredicateOp::NearestNeighbor => SpatialOp::DWithin,
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    op: SpatialOp,
    operand: OperandChoice,
    negate: bool,
}

const fn cand(op: SpatialOp, operand: OperandChoice, negate: bool) -> Candidate {
    Candidate {
        op,
        operand,
        negate,
    }
}

use OperandChoice::{Envelope as E, Geometry as G};

const INTERSECTS_CHAIN: [Candidate; 5] = [
    cand(SpatialOp::Intersects, G, false),
    cand(SpatialOp::Intersects, E, false),
    cand(SpatialOp::BBox, E, false),
    cand(SpatialOp::Disjoint, G, true),
    cand(SpatialOp::Disjoint, E, true),
];

const DISJOINT_CHAIN: [Candidate; 5] = [
    cand(SpatialOp::Disjoint, G, false),
    cand(SpatialOp::Disjoint, E, false),
    cand(SpatialOp::BBox, E, true),
    cand(SpatialOp::Intersects, G, true),
    cand(SpatialOp::Intersects, E, true),
];

const CONTAINS_CHAIN: [Candidate; 4] = [
    cand(SpatialOp::Contains, G, false),
    cand(SpatialOp::Contains, E, false),
    cand(SpatialOp::Within, G, true),
    cand(SpatialOp::Within, E, true),
];

const WITHIN_CHAIN: [Candidate; 4] = [
    cand(SpatialOp::Within, G, false),
    cand(SpatialOp::Within, E, false),
    cand(SpatialOp::Contains, G, false),
    cand(SpatialOp::Contains, E, false),
];

const BBOX_CHAIN: [Candidate; 3] = [
    cand(SpatialOp::BBox, E, false),
    cand(SpatialOp::Intersects, E, false),
    cand(SpatialOp::Intersects, G, false),
];

const DWITHIN_CHAIN: [Candidate; 2] = [
    cand(SpatialOp::DWithin, G, false),
    cand(SpatialOp::Beyond, G, true),
];

const BEYOND_CHAIN: [Candidate; 2] = [
    cand(SpatialOp::Beyond, G, false),
    cand(SpatialOp::DWithin, G, true),
];

const CROSSES_CHAIN: [Candidate; 2] = [
    cand(SpatialOp::Crosses, G, false),
    cand(SpatialOp::Crosses, E, false),
];

const OVERLAPS_CHAIN: [Candidate; 2] = [
    cand(SpatialOp::Overlaps, G, false),
    cand(SpatialOp::Overlaps, E, false),
];

const TOUCHES_CHAIN: [Candidate; 2] = [
    cand(SpatialOp::Touches, G, false),
    cand(SpatialOp::Touches, E, false),
];

/// Ordered fallback candidates per requested wire operator. The exact
/// operator with a Geometry operand always comes first.
fn candidates(op: SpatialOp) -> &'static [Candidate] {
    match op {
        SpatialOp::Intersects => &INTERSECTS_CHAIN,
        SpatialOp::Disjoint => &DISJOINT_CHAIN,
        SpatialOp::Contains => &CONTAINS_CHAIN,
        SpatialOp::Within => &WITHIN_CHAIN,
        SpatialOp::BBox => &BBOX_CHAIN,
        SpatialOp::DWithin => &DWITHIN_CHAIN,
        SpatialOp::Beyond => &BEYOND_CHAIN,
        SpatialOp::Crosses => &CROSSES_CHAIN,
        SpatialOp::Overlaps => &OVERLAPS_CHAIN,
        SpatialOp::Touches => &TOUCHES_CHAIN,
    }
}

fn supports(
    model: &CapabilityModel,
    candidate: &Candidate,
    geometry_kind: GeometryOperandKind,
) -> bool {
    let operand = match candidate.operand {
        OperandChoice::Geometry => geometry_kind,
        OperandChoice::Envelope => GeometryOperandKind::Envelope,
    };
    // Distance operators measure from the shape itself; an envelope would
    // change the distance semantics.
    if candidate.op.is_distance_op() && candidate.operand == OperandChoice::Envelope {
        return false;
    }
    model.supports_spatial(candidate.op, operand)
}
