//! Axis-order conversion and buffering over WKT geometry strings.
//!
//! Coordinates are held internally in LON/LAT order; servers configured as
//! LAT/LON get their operands swapped immediately before embedding. The
//! buffer used by the DWithin→Intersects fallback converts meters to degrees
//! of latitude via the mean Earth radius — an approximation that degrades
//! near the poles and for large distances, acceptable for fallback
//! translation but not a geodesic primitive.

use crate::error::{Result, TranslateError};
use csw_protocol::Envelope;
use geo::{BoundingRect, MapCoords};
use geo_types::{coord, Coord, Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};
use wkt::ToWkt;

/// Mean Earth radius in meters, for the meters→degrees approximation.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Vertex count for buffered point circles.
const CIRCLE_SEGMENTS: usize = 32;

/// Coordinate axis order a server expects in GML operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AxisOrder {
    /// x=longitude, y=latitude (the internal order).
    #[default]
    LonLat,
    /// x=latitude, y=longitude.
    LatLon,
}

/// Parse WKT to a geo-types geometry.
pub fn parse_wkt(text: &str) -> Result<Geometry<f64>> {
    use std::str::FromStr;
    wkt::Wkt::from_str(text)
        .map_err(|e| TranslateError::Geometry(format!("WKT parse error: {e:?}")))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| {
                    TranslateError::Geometry(format!("WKT conversion error: {e:?}"))
                })
        })
}

/// The WKT type header (e.g. `POLYGON`), for diagnostics.
pub fn wkt_type_header(wkt: &str) -> String {
    wkt.trim_start()
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// Swap x and y on every coordinate. Involutive: applying twice reproduces
/// the original coordinates.
pub fn swap_axes(wkt: &str) -> Result<String> {
    let geom = parse_wkt(wkt)?;
    let swapped = geom.map_coords(|c: Coord<f64>| coord! { x: c.y, y: c.x });
    Ok(swapped.wkt_string())
}

/// Convert a WKT operand from internal LON/LAT into the server's order.
pub fn normalize_axis_order(wkt: &str, order: AxisOrder) -> Result<String> {
    match order {
        AxisOrder::LonLat => Ok(wkt.to_string()),
        AxisOrder::LatLon => swap_axes(wkt),
    }
}

/// Meters to degrees of latitude via the mean Earth radius.
pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / MEAN_EARTH_RADIUS_M * (180.0 / std::f64::consts::PI)
}

/// Expand a geometry by a distance in meters, returning polygon WKT.
///
/// Points become a circle approximated by a 32-gon; everything else expands
/// its bounding box by the degree-converted distance.
pub fn buffer_wkt(wkt: &str, distance_meters: f64) -> Result<String> {
    let degrees = meters_to_degrees(distance_meters);
    let geom = parse_wkt(wkt)?;

    let polygon = match &geom {
        Geometry::Point(p) => {
            let mut coords = Vec::with_capacity(CIRCLE_SEGMENTS + 1);
            for i in 0..CIRCLE_SEGMENTS {
                let angle = 2.0 * std::f64::consts::PI * (i as f64) / (CIRCLE_SEGMENTS as f64);
                coords.push(coord! {
                    x: p.x() + degrees * angle.cos(),
                    y: p.y() + degrees * angle.sin(),
                });
            }
            let first = coords[0];
            coords.push(first);
            Polygon::new(LineString::new(coords), vec![])
        }
        other => {
            let rect = other.bounding_rect().ok_or_else(|| {
                TranslateError::Geometry(format!(
                    "cannot compute bounding box for {}",
                    wkt_type_header(wkt)
                ))
            })?;
            let (min, max) = (rect.min(), rect.max());
            let coords = vec![
                coord! { x: min.x - degrees, y: min.y - degrees },
                coord! { x: max.x + degrees, y: min.y - degrees },
                coord! { x: max.x + degrees, y: max.y + degrees },
                coord! { x: min.x - degrees, y: max.y + degrees },
                coord! { x: min.x - degrees, y: min.y - degrees },
            ];
            Polygon::new(LineString::new(coords), vec![])
        }
    };

    Ok(Geometry::Polygon(polygon).wkt_string())
}

/// Bounding envelope of a WKT geometry, in the WKT's own axis order.
pub fn envelope_of(wkt: &str) -> Result<Envelope> {
    let geom = parse_wkt(wkt)?;
    let rect = geom.bounding_rect().ok_or_else(|| {
        TranslateError::Geometry(format!(
            "cannot compute bounding box for {}",
            wkt_type_header(wkt)
        ))
    })?;
    Ok(Envelope {
        min_x: rect.min().x,
        min_y: rect.min().y,
        max_x: rect.max().x,
        max_y: rect.max().y,
    })
}
