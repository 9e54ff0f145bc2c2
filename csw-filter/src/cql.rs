//! CQL text rendering via round trip through the Filter XML grammar.
//!
//! There is no direct CQL serializer for the in-process tree. Instead the
//! wire filter is serialized to its `ogc:Filter` XML fragment, reparsed
//! through the filter parser, and the reparsed tree is lowered to CQL text.
//! The round trip guarantees the rendered constraint corresponds to a
//! syntactically valid filter; any stage failure surfaces as "unable to
//! build CQL filter" with the cause retained.

use crate::error::{Result, TranslateError};
use csw_protocol::{
    filter_to_xml, parse_filter_xml, ComparisonOp, Envelope, SpatialOp, SpatialOperand, WireFilter,
};

/// Render a wire filter as CQL text.
pub fn render_cql(filter: &WireFilter) -> Result<String> {
    let xml = filter_to_xml(filter).map_err(cql_failure)?;
    let reparsed = parse_filter_xml(&xml).map_err(cql_failure)?;
    render_node(&reparsed)
}

fn cql_failure(e: impl std::error::Error + Send + Sync + 'static) -> TranslateError {
    TranslateError::Cql {
        source: Box::new(e),
    }
}

fn render_node(filter: &WireFilter) -> Result<String> {
    match filter {
        WireFilter::Comparison {
            op,
            property,
            literal,
            ..
        } => {
            let symbol = comparison_symbol(*op)?;
            Ok(format!("{property} {symbol} {}", quote(literal)))
        }
        WireFilter::Like {
            property,
            pattern,
            match_case,
        } => {
            let keyword = if *match_case { "LIKE" } else { "ILIKE" };
            Ok(format!("{property} {keyword} {}", quote_string(pattern)))
        }
        WireFilter::Between {
            property,
            lower,
            upper,
        } => Ok(format!(
            "{property} BETWEEN {} AND {}",
            quote(lower),
            quote(upper)
        )),
        WireFilter::IsNull { property } => Ok(format!("{property} IS NULL")),
        WireFilter::And(children) => render_combinator(children, "AND"),
        WireFilter::Or(children) => render_combinator(children, "OR"),
        WireFilter::Not(inner) => Ok(format!("NOT ({})", render_node(inner)?)),
        WireFilter::FeatureIds(ids) => {
            let list = ids
                .iter()
                .map(|id| quote_string(id))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!("IN ({list})"))
        }
        WireFilter::Spatial {
            op,
            property,
            operand,
            distance_meters,
        } => render_spatial(*op, property, operand, *distance_meters),
    }
}

fn render_combinator(children: &[WireFilter], keyword: &str) -> Result<String> {
    let parts = children
        .iter()
        .map(render_node)
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(&format!(" {keyword} "))))
}

fn render_spatial(
    op: SpatialOp,
    property: &str,
    operand: &SpatialOperand,
    distance_meters: Option<f64>,
) -> Result<String> {
    // BBOX has its own corner-list form.
    if op == SpatialOp::BBox {
        let env = match operand {
            SpatialOperand::Envelope(env) => *env,
            SpatialOperand::Geometry { .. } => {
                return Err(TranslateError::Cql {
                    source: "BBOX clause carried a geometry operand".into(),
                })
            }
        };
        return Ok(format!(
            "BBOX({property}, {}, {}, {}, {})",
            env.min_x, env.min_y, env.max_x, env.max_y
        ));
    }

    let wkt = match operand {
        SpatialOperand::Geometry { wkt } => wkt.clone(),
        SpatialOperand::Envelope(env) => envelope_polygon(env),
    };

    let function = match op {
        SpatialOp::Beyond => "BEYOND",
        SpatialOp::Contains => "CONTAINS",
        SpatialOp::Crosses => "CROSSES",
        SpatialOp::Disjoint => "DISJOINT",
        SpatialOp::DWithin => "DWITHIN",
        SpatialOp::Intersects => "INTERSECTS",
        SpatialOp::Overlaps => "OVERLAPS",
        SpatialOp::Touches => "TOUCHES",
        SpatialOp::Within => "WITHIN",
        SpatialOp::BBox => unreachable!("handled above"),
    };

    if op.is_distance_op() {
        let distance = distance_meters.ok_or_else(|| TranslateError::Cql {
            source: format!("{function} clause lost its distance").into(),
        })?;
        Ok(format!("{function}({property}, {wkt}, {distance}, meters)"))
    } else {
        Ok(format!("{function}({property}, {wkt})"))
    }
}

fn envelope_polygon(env: &Envelope) -> String {
    format!(
        "POLYGON (({minx} {miny}, {maxx} {miny}, {maxx} {maxy}, {minx} {maxy}, {minx} {miny}))",
        minx = env.min_x,
        miny = env.min_y,
        maxx = env.max_x,
        maxy = env.max_y
    )
}

fn comparison_symbol(op: ComparisonOp) -> Result<&'static str> {
    match op {
        ComparisonOp::EqualTo => Ok("="),
        ComparisonOp::NotEqualTo => Ok("<>"),
        ComparisonOp::LessThan => Ok("<"),
        ComparisonOp::GreaterThan => Ok(">"),
        ComparisonOp::LessThanOrEqualTo => Ok("<="),
        ComparisonOp::GreaterThanOrEqualTo => Ok(">="),
        other => Err(TranslateError::Cql {
            source: format!("operator {} has no CQL symbol", other.capability_name()).into(),
        }),
    }
}

/// Numeric literals go bare; everything else is quoted.
fn quote(literal: &str) -> String {
    if literal.parse::<f64>().is_ok() {
        literal.to_string()
    } else {
        quote_string(literal)
    }
}

fn quote_string(literal: &str) -> String {
    format!("'{}'", literal.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_rendering() {
        let filter = WireFilter::Comparison {
            op: ComparisonOp::EqualTo,
            property: "title".to_string(),
            literal: "sea charts".to_string(),
            match_case: true,
        };
        assert_eq!(render_cql(&filter).unwrap(), "title = 'sea charts'");
    }

    #[test]
    fn test_numeric_literal_unquoted() {
        let filter = WireFilter::Comparison {
            op: ComparisonOp::GreaterThan,
            property: "scale".to_string(),
            literal: "50000".to_string(),
            match_case: true,
        };
        assert_eq!(render_cql(&filter).unwrap(), "scale > 50000");
    }

    #[test]
    fn test_like_case_folding() {
        let sensitive = WireFilter::Like {
            property: "title".to_string(),
            pattern: "foo%".to_string(),
            match_case: true,
        };
        let insensitive = WireFilter::Like {
            pattern: "foo%".to_string(),
            property: "title".to_string(),
            match_case: false,
        };
        assert_eq!(render_cql(&sensitive).unwrap(), "title LIKE 'foo%'");
        assert_eq!(render_cql(&insensitive).unwrap(), "title ILIKE 'foo%'");
    }

    #[test]
    fn test_quote_escaping() {
        let filter = WireFilter::Comparison {
            op: ComparisonOp::EqualTo,
            property: "title".to_string(),
            literal: "sailor's atlas".to_string(),
            match_case: true,
        };
        assert_eq!(
            render_cql(&filter).unwrap(),
            "title = 'sailor''s atlas'"
        );
    }

    #[test]
    fn test_logical_rendering() {
        let filter = WireFilter::And(vec![
            WireFilter::IsNull {
                property: "modified".to_string(),
            },
            WireFilter::Not(Box::new(WireFilter::Comparison {
                op: ComparisonOp::EqualTo,
                property: "type".to_string(),
                literal: "dataset".to_string(),
                match_case: true,
            })),
        ]);
        assert_eq!(
            render_cql(&filter).unwrap(),
            "(modified IS NULL AND NOT (type = 'dataset'))"
        );
    }

    #[test]
    fn test_between_rendering() {
        let filter = WireFilter::Between {
            property: "modified".to_string(),
            lower: "2024-01-01T00:00:00Z".to_string(),
            upper: "2024-02-01T00:00:00Z".to_string(),
        };
        assert_eq!(
            render_cql(&filter).unwrap(),
            "modified BETWEEN '2024-01-01T00:00:00Z' AND '2024-02-01T00:00:00Z'"
        );
    }

    #[test]
    fn test_bbox_rendering() {
        let filter = WireFilter::Spatial {
            op: SpatialOp::BBox,
            property: "ows:BoundingBox".to_string(),
            operand: SpatialOperand::Envelope(Envelope {
                min_x: -10.0,
                min_y: -5.0,
                max_x: 10.0,
                max_y: 5.0,
            }),
            distance_meters: None,
        };
        assert_eq!(
            render_cql(&filter).unwrap(),
            "BBOX(ows:BoundingBox, -10, -5, 10, 5)"
        );
    }

    #[test]
    fn test_intersects_rendering_survives_roundtrip() {
        let filter = WireFilter::Spatial {
            op: SpatialOp::Intersects,
            property: "ows:BoundingBox".to_string(),
            operand: SpatialOperand::Geometry {
                wkt: "POLYGON ((0 0, 10 0, 10 20, 0 20, 0 0))".to_string(),
            },
            distance_meters: None,
        };
        assert_eq!(
            render_cql(&filter).unwrap(),
            "INTERSECTS(ows:BoundingBox, POLYGON ((0 0, 10 0, 10 20, 0 20, 0 0)))"
        );
    }

    #[test]
    fn test_dwithin_rendering() {
        let filter = WireFilter::Spatial {
            op: SpatialOp::DWithin,
            property: "location".to_string(),
            operand: SpatialOperand::Geometry {
                wkt: "POINT (2.35 48.86)".to_string(),
            },
            distance_meters: Some(5000.0),
        };
        assert_eq!(
            render_cql(&filter).unwrap(),
            "DWITHIN(location, POINT (2.35 48.86), 5000, meters)"
        );
    }

    #[test]
    fn test_feature_ids_rendering() {
        let filter = WireFilter::FeatureIds(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(render_cql(&filter).unwrap(), "IN ('a', 'b')");
    }

    #[test]
    fn test_failure_is_wrapped() {
        // An empty combinator cannot be serialized, so the round trip fails
        // at the first stage.
        let err = render_cql(&WireFilter::And(vec![])).unwrap_err();
        assert!(matches!(err, TranslateError::Cql { .. }));
        assert!(err.to_string().contains("unable to build CQL filter"));
    }
}
