//! Predicate-tree to wire-filter translation.
//!
//! Recursive, capability-checked dispatch over the predicate tree:
//!
//! - Comparison leaves verify operator membership before building and apply
//!   the configured property remap (synthetic any-text/any-geo/any-date
//!   tokens resolve first, then the remap table, then the original name)
//! - Equality on the identifier property becomes an identifier-list filter;
//!   AND/OR whose children are all identifier lists collapse to one
//! - Spatial leaves delegate to the fallback resolver, buffer in the
//!   predicate's original axis order, and normalize axis order on the WKT
//!   immediately before embedding
//! - Relative-date predicates become absolute bounds at translation time

use crate::capability::CapabilityModel;
use crate::error::{Result, TranslateError};
use crate::geometry::{buffer_wkt, envelope_of, normalize_axis_order, AxisOrder};
use crate::predicate::{
    CompareOp, LogicalOp, Predicate, SpatialPredicateOp, ANY_DATE, ANY_GEO, ANY_TEXT,
};
use crate::spatial;
use chrono::{DateTime, SecondsFormat, Utc};
use csw_protocol::{ComparisonOp, SpatialOperand, WireFilter};
use std::collections::BTreeMap;

/// Source-level knobs the translator needs besides the capability model.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOptions {
    /// Abstraction-layer property name → provider property name.
    pub property_map: BTreeMap<String, String>,
    /// Axis order the server expects in GML operands.
    pub axis_order: AxisOrder,
    /// When set, every spatial predicate is rewritten to this operator
    /// before resolution.
    pub forced_spatial_operator: Option<SpatialPredicateOp>,
    /// Provider property holding record identifiers.
    pub id_property: String,
    /// Provider wildcard property substituted for the any-text token.
    pub any_text_property: String,
    /// Provider geometry property substituted for the any-geo token.
    pub any_geo_property: String,
    /// Concrete property substituted for the any-date token.
    pub default_date_property: String,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            property_map: BTreeMap::new(),
            axis_order: AxisOrder::LonLat,
            forced_spatial_operator: None,
            id_property: "identifier".to_string(),
            any_text_property: "csw:AnyText".to_string(),
            any_geo_property: "ows:BoundingBox".to_string(),
            default_date_property: "modified".to_string(),
        }
    }
}

/// Walks a predicate tree and emits the equivalent wire filter tree.
#[derive(Debug)]
pub struct FilterTranslator<'a> {
    model: &'a CapabilityModel,
    options: &'a TranslationOptions,
}

impl<'a> FilterTranslator<'a> {
    pub fn new(model: &'a CapabilityModel, options: &'a TranslationOptions) -> Self {
        Self { model, options }
    }

    /// Translate against the current clock.
    pub fn translate(&self, predicate: &Predicate) -> Result<WireFilter> {
        self.translate_at(predicate, Utc::now())
    }

    /// Translate with an explicit clock; relative-date bounds are computed
    /// from `now`.
    pub fn translate_at(&self, predicate: &Predicate, now: DateTime<Utc>) -> Result<WireFilter> {
        match predicate {
            Predicate::Comparison {
                op,
                property,
                value,
                case_sensitive,
            } => self.translate_comparison(*op, property, value, *case_sensitive),
            Predicate::Like {
                property,
                pattern,
                case_sensitive,
                fuzzy: _,
            } => {
                self.require_comparison(ComparisonOp::Like)?;
                Ok(WireFilter::Like {
                    property: self.resolve_property(property),
                    pattern: pattern.clone(),
                    match_case: *case_sensitive,
                })
            }
            Predicate::IsNull { property } => {
                self.require_comparison(ComparisonOp::NullCheck)?;
                Ok(WireFilter::IsNull {
                    property: self.resolve_property(property),
                })
            }
            Predicate::RelativeDate { property, within } => {
                self.require_comparison(ComparisonOp::Between)?;
                let upper = now;
                let lower = upper - *within;
                Ok(WireFilter::Between {
                    property: self.resolve_property(property),
                    lower: lower.to_rfc3339_opts(SecondsFormat::Secs, true),
                    upper: upper.to_rfc3339_opts(SecondsFormat::Secs, true),
                })
            }
            Predicate::Logical { op, children } => self.translate_logical(*op, children, now),
            Predicate::Spatial {
                op,
                property,
                wkt,
                distance_meters,
            } => self.translate_spatial(*op, property, wkt, *distance_meters),
        }
    }

    fn translate_comparison(
        &self,
        op: CompareOp,
        property: &str,
        value: &str,
        case_sensitive: bool,
    ) -> Result<WireFilter> {
        let wire_op = match op {
            CompareOp::EqualTo => ComparisonOp::EqualTo,
            CompareOp::NotEqualTo => ComparisonOp::NotEqualTo,
            CompareOp::LessThan => ComparisonOp::LessThan,
            CompareOp::GreaterThan => ComparisonOp::GreaterThan,
            CompareOp::LessThanOrEqualTo => ComparisonOp::LessThanOrEqualTo,
            CompareOp::GreaterThanOrEqualTo => ComparisonOp::GreaterThanOrEqualTo,
        };
        let resolved = self.resolve_property(property);

        // Identifier equality is a feature-id lookup, not a comparison.
        if wire_op == ComparisonOp::EqualTo && resolved == self.options.id_property {
            return Ok(WireFilter::FeatureIds(vec![value.to_string()]));
        }

        self.require_comparison(wire_op)?;
        Ok(WireFilter::Comparison {
            op: wire_op,
            property: resolved,
            literal: value.to_string(),
            match_case: case_sensitive,
        })
    }

    fn translate_logical(
        &self,
        op: LogicalOp,
        children: &[Predicate],
        now: DateTime<Utc>,
    ) -> Result<WireFilter> {
        if !self.model.logical_ops_supported() {
            return Err(TranslateError::UnsupportedOperation(
                "provider does not declare logical operators".to_string(),
            ));
        }
        if children.is_empty() {
            return Err(TranslateError::UnsupportedFilter(
                "logical combinator without children".to_string(),
            ));
        }

        match op {
            LogicalOp::Not => {
                if children.len() != 1 {
                    return Err(TranslateError::UnsupportedFilter(format!(
                        "NOT takes exactly one child, got {}",
                        children.len()
                    )));
                }
                let inner = self.translate_at(&children[0], now)?;
                Ok(WireFilter::Not(Box::new(inner)))
            }
            LogicalOp::And | LogicalOp::Or => {
                let translated = children
                    .iter()
                    .map(|c| self.translate_at(c, now))
                    .collect::<Result<Vec<_>>>()?;

                // A combinator whose children are all identifier lists is a
                // single identifier list.
                if translated
                    .iter()
                    .all(|f| matches!(f, WireFilter::FeatureIds(_)))
                {
                    let mut ids: Vec<String> = Vec::new();
                    for filter in translated {
                        if let WireFilter::FeatureIds(child_ids) = filter {
                            for id in child_ids {
                                if !ids.contains(&id) {
                                    ids.push(id);
                                }
                            }
                        }
                    }
                    return Ok(WireFilter::FeatureIds(ids));
                }

                if op == LogicalOp::And {
                    Ok(WireFilter::And(translated))
                } else {
                    Ok(WireFilter::Or(translated))
                }
            }
        }
    }

    fn translate_spatial(
        &self,
        op: SpatialPredicateOp,
        property: &str,
        wkt: &str,
        distance_meters: Option<f64>,
    ) -> Result<WireFilter> {
        let requested = self.options.forced_spatial_operator.unwrap_or(op);
        if requested != op {
            tracing::debug!(
                requested = op.name(),
                forced = requested.name(),
                "spatial operator overridden by configuration"
            );
        }

        let plan = spatial::resolve(requested, wkt, distance_meters, self.model)?;

        // Buffering and envelope math run in the predicate's original axis
        // order; the swap happens immediately before embedding.
        let shaped = match plan.buffer_meters {
            Some(meters) => buffer_wkt(wkt, meters)?,
            None => wkt.to_string(),
        };
        let normalized = normalize_axis_order(&shaped, self.options.axis_order)?;

        let operand = if plan.envelope {
            SpatialOperand::Envelope(envelope_of(&normalized)?)
        } else {
            SpatialOperand::Geometry { wkt: normalized }
        };

        let clause = WireFilter::Spatial {
            op: plan.op,
            property: self.resolve_property(property),
            operand,
            distance_meters: plan.distance_meters,
        };

        if plan.negate {
            Ok(WireFilter::Not(Box::new(clause)))
        } else {
            Ok(clause)
        }
    }

    fn require_comparison(&self, op: ComparisonOp) -> Result<()> {
        if self.model.supports_comparison(op) {
            Ok(())
        } else {
            Err(TranslateError::UnsupportedFilter(format!(
                "comparison operator {} not declared by provider",
                op.capability_name()
            )))
        }
    }

    fn resolve_property(&self, property: &str) -> String {
        let synthetic = match property {
            ANY_TEXT => Some(self.options.any_text_property.as_str()),
            ANY_GEO => Some(self.options.any_geo_property.as_str()),
            ANY_DATE => Some(self.options.default_date_property.as_str()),
            _ => None,
        };
        if let Some(name) = synthetic {
            return name.to_string();
        }
        self.options
            .property_map
            .get(property)
            .cloned()
            .unwrap_or_else(|| property.to_string())
    }
}
