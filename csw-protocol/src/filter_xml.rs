//! The wire filter grammar and its OGC Filter 1.1 XML encoding.
//!
//! [`WireFilter`] mirrors the abstraction-layer predicate tree in the terms
//! the remote catalogue understands. Trees are built bottom-up by the
//! translation engine and are immutable once constructed. Two codecs live
//! here:
//!
//! - [`filter_to_xml`] — serialize a tree to an `ogc:Filter` fragment
//! - [`parse_filter_xml`] — reparse such a fragment back into a tree
//!
//! The reparse path exists so CQL rendering can round-trip through the XML
//! grammar instead of trusting an in-memory tree that never touched a parser.

use crate::error::{ProtocolError, Result};
use crate::{GML_NS, LIKE_ESCAPE, LIKE_SINGLE_CHAR, LIKE_WILDCARD, OGC_NS};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Comparison operators as declared in a server's scalar capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComparisonOp {
    EqualTo,
    NotEqualTo,
    LessThan,
    GreaterThan,
    LessThanOrEqualTo,
    GreaterThanOrEqualTo,
    Like,
    Between,
    NullCheck,
}

impl ComparisonOp {
    /// Token used in `ogc:ComparisonOperator` capability declarations.
    pub fn capability_name(&self) -> &'static str {
        match self {
            ComparisonOp::EqualTo => "EqualTo",
            ComparisonOp::NotEqualTo => "NotEqualTo",
            ComparisonOp::LessThan => "LessThan",
            ComparisonOp::GreaterThan => "GreaterThan",
            ComparisonOp::LessThanOrEqualTo => "LessThanEqualTo",
            ComparisonOp::GreaterThanOrEqualTo => "GreaterThanEqualTo",
            ComparisonOp::Like => "Like",
            ComparisonOp::Between => "Between",
            ComparisonOp::NullCheck => "NullCheck",
        }
    }

    /// Parse a capability token. Servers vary in spelling for the ordered
    /// comparisons, so both common forms are accepted.
    pub fn from_capability_name(name: &str) -> Option<Self> {
        match name {
            "EqualTo" => Some(ComparisonOp::EqualTo),
            "NotEqualTo" => Some(ComparisonOp::NotEqualTo),
            "LessThan" => Some(ComparisonOp::LessThan),
            "GreaterThan" => Some(ComparisonOp::GreaterThan),
            "LessThanEqualTo" | "LessThanOrEqualTo" => Some(ComparisonOp::LessThanOrEqualTo),
            "GreaterThanEqualTo" | "GreaterThanOrEqualTo" => {
                Some(ComparisonOp::GreaterThanOrEqualTo)
            }
            "Like" => Some(ComparisonOp::Like),
            "Between" => Some(ComparisonOp::Between),
            "NullCheck" => Some(ComparisonOp::NullCheck),
            _ => None,
        }
    }

    /// Element name for binary comparisons; `None` for operators that have
    /// their own dedicated filter shapes (Like, Between, NullCheck).
    fn element_name(&self) -> Option<&'static str> {
        match self {
            ComparisonOp::EqualTo => Some("ogc:PropertyIsEqualTo"),
            ComparisonOp::NotEqualTo => Some("ogc:PropertyIsNotEqualTo"),
            ComparisonOp::LessThan => Some("ogc:PropertyIsLessThan"),
            ComparisonOp::GreaterThan => Some("ogc:PropertyIsGreaterThan"),
            ComparisonOp::LessThanOrEqualTo => Some("ogc:PropertyIsLessThanOrEqualTo"),
            ComparisonOp::GreaterThanOrEqualTo => Some("ogc:PropertyIsGreaterThanOrEqualTo"),
            _ => None,
        }
    }
}

/// Spatial operators as declared in a server's spatial capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpatialOp {
    BBox,
    Beyond,
    Contains,
    Crosses,
    Disjoint,
    DWithin,
    Intersects,
    Overlaps,
    Touches,
    Within,
}

impl SpatialOp {
    /// Token used in `ogc:SpatialOperator name="..."` declarations.
    pub fn capability_name(&self) -> &'static str {
        match self {
            SpatialOp::BBox => "BBOX",
            SpatialOp::Beyond => "Beyond",
            SpatialOp::Contains => "Contains",
            SpatialOp::Crosses => "Crosses",
            SpatialOp::Disjoint => "Disjoint",
            SpatialOp::DWithin => "DWithin",
            SpatialOp::Intersects => "Intersects",
            SpatialOp::Overlaps => "Overlaps",
            SpatialOp::Touches => "Touches",
            SpatialOp::Within => "Within",
        }
    }

    /// Parse a capability token.
    pub fn from_capability_name(name: &str) -> Option<Self> {
        match name {
            "BBOX" => Some(SpatialOp::BBox),
            "Beyond" => Some(SpatialOp::Beyond),
            "Contains" => Some(SpatialOp::Contains),
            "Crosses" => Some(SpatialOp::Crosses),
            "Disjoint" => Some(SpatialOp::Disjoint),
            "DWithin" => Some(SpatialOp::DWithin),
            "Intersects" => Some(SpatialOp::Intersects),
            "Overlaps" => Some(SpatialOp::Overlaps),
            "Touches" => Some(SpatialOp::Touches),
            "Within" => Some(SpatialOp::Within),
            _ => None,
        }
    }

    /// Whether this operator carries a distance operand.
    pub fn is_distance_op(&self) -> bool {
        matches!(self, SpatialOp::Beyond | SpatialOp::DWithin)
    }

    fn element_name(&self) -> &'static str {
        match self {
            SpatialOp::BBox => "ogc:BBOX",
            SpatialOp::Beyond => "ogc:Beyond",
            SpatialOp::Contains => "ogc:Contains",
            SpatialOp::Crosses => "ogc:Crosses",
            SpatialOp::Disjoint => "ogc:Disjoint",
            SpatialOp::DWithin => "ogc:DWithin",
            SpatialOp::Intersects => "ogc:Intersects",
            SpatialOp::Overlaps => "ogc:Overlaps",
            SpatialOp::Touches => "ogc:Touches",
            SpatialOp::Within => "ogc:Within",
        }
    }

    fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "BBOX" => Some(SpatialOp::BBox),
            "Beyond" => Some(SpatialOp::Beyond),
            "Contains" => Some(SpatialOp::Contains),
            "Crosses" => Some(SpatialOp::Crosses),
            "Disjoint" => Some(SpatialOp::Disjoint),
            "DWithin" => Some(SpatialOp::DWithin),
            "Intersects" => Some(SpatialOp::Intersects),
            "Overlaps" => Some(SpatialOp::Overlaps),
            "Touches" => Some(SpatialOp::Touches),
            "Within" => Some(SpatialOp::Within),
            _ => None,
        }
    }
}

/// Geometry operand kinds a server can declare for spatial operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeometryOperandKind {
    Envelope,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryOperandKind {
    /// Parse a declared operand such as `gml:Envelope` (prefix ignored).
    pub fn from_declared(name: &str) -> Option<Self> {
        let local = name.rsplit(':').next().unwrap_or(name);
        match local {
            "Envelope" | "Box" => Some(GeometryOperandKind::Envelope),
            "Point" => Some(GeometryOperandKind::Point),
            "LineString" => Some(GeometryOperandKind::LineString),
            "Polygon" => Some(GeometryOperandKind::Polygon),
            "MultiPoint" => Some(GeometryOperandKind::MultiPoint),
            "MultiLineString" | "MultiCurve" => Some(GeometryOperandKind::MultiLineString),
            "MultiPolygon" | "MultiSurface" => Some(GeometryOperandKind::MultiPolygon),
            _ => None,
        }
    }

    /// The operand kind a WKT string occupies, from its type header.
    pub fn for_wkt(wkt: &str) -> Result<Self> {
        let header = wkt
            .trim_start()
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();
        match header.as_str() {
            "POINT" => Ok(GeometryOperandKind::Point),
            "LINESTRING" => Ok(GeometryOperandKind::LineString),
            "POLYGON" => Ok(GeometryOperandKind::Polygon),
            "MULTIPOINT" => Ok(GeometryOperandKind::MultiPoint),
            "MULTILINESTRING" => Ok(GeometryOperandKind::MultiLineString),
            "MULTIPOLYGON" => Ok(GeometryOperandKind::MultiPolygon),
            other => Err(ProtocolError::UnencodableGeometry(format!(
                "unrecognized WKT geometry type '{other}'"
            ))),
        }
    }
}

/// Axis-aligned envelope operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Spatial operand: a full geometry or its envelope, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialOperand {
    /// Arbitrary-shape operand carried as WKT, encoded to GML on the wire.
    Geometry { wkt: String },
    /// Bounding-box operand.
    Envelope(Envelope),
}

/// A filter tree in the target protocol's grammar.
///
/// Construction is the translation engine's job; by the time a tree exists
/// every operator/operand combination in it has been checked against the
/// server's declared capabilities.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFilter {
    /// Binary comparison (`PropertyIsEqualTo` and friends).
    Comparison {
        op: ComparisonOp,
        property: String,
        literal: String,
        match_case: bool,
    },
    /// `PropertyIsLike` with `%` / `_` / `\` wildcards.
    Like {
        property: String,
        pattern: String,
        match_case: bool,
    },
    /// `PropertyIsBetween`.
    Between {
        property: String,
        lower: String,
        upper: String,
    },
    /// `PropertyIsNull`.
    IsNull { property: String },
    /// Spatial clause with exactly one operand shape.
    Spatial {
        op: SpatialOp,
        property: String,
        operand: SpatialOperand,
        /// Meters; present only for Beyond/DWithin.
        distance_meters: Option<f64>,
    },
    And(Vec<WireFilter>),
    Or(Vec<WireFilter>),
    Not(Box<WireFilter>),
    /// Identifier-list filter (`ogc:FeatureId` siblings, implicit OR).
    FeatureIds(Vec<String>),
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serialize a filter tree as an `ogc:Filter` XML fragment.
pub fn filter_to_xml(filter: &WireFilter) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    let mut root = BytesStart::new("ogc:Filter");
    root.push_attribute(("xmlns:ogc", OGC_NS));
    root.push_attribute(("xmlns:gml", GML_NS));
    writer.write_event(Event::Start(root))?;
    write_node(&mut writer, filter)?;
    writer.write_event(Event::End(BytesEnd::new("ogc:Filter")))?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| ProtocolError::Xml(format!("non-UTF-8 output: {e}")))
}

/// Serialize just the body of a filter (no `ogc:Filter` wrapper), for
/// embedding inside an already-open constraint element.
pub(crate) fn write_filter_body(writer: &mut Writer<Vec<u8>>, filter: &WireFilter) -> Result<()> {
    write_node(writer, filter)
}

fn write_node(w: &mut Writer<Vec<u8>>, filter: &WireFilter) -> Result<()> {
    match filter {
        WireFilter::Comparison {
            op,
            property,
            literal,
            match_case,
        } => {
            let name = op.element_name().ok_or_else(|| {
                ProtocolError::Xml(format!(
                    "operator {} is not a binary comparison",
                    op.capability_name()
                ))
            })?;
            let mut start = BytesStart::new(name);
            if !match_case {
                start.push_attribute(("matchCase", "false"));
            }
            w.write_event(Event::Start(start))?;
            write_simple(w, "ogc:PropertyName", property)?;
            write_simple(w, "ogc:Literal", literal)?;
            w.write_event(Event::End(BytesEnd::new(name)))?;
        }
        WireFilter::Like {
            property,
            pattern,
            match_case,
        } => {
            let mut start = BytesStart::new("ogc:PropertyIsLike");
            start.push_attribute(("wildCard", LIKE_WILDCARD.to_string().as_str()));
            start.push_attribute(("singleChar", LIKE_SINGLE_CHAR.to_string().as_str()));
            start.push_attribute(("escapeChar", LIKE_ESCAPE.to_string().as_str()));
            if !match_case {
                start.push_attribute(("matchCase", "false"));
            }
            w.write_event(Event::Start(start))?;
            write_simple(w, "ogc:PropertyName", property)?;
            write_simple(w, "ogc:Literal", pattern)?;
            w.write_event(Event::End(BytesEnd::new("ogc:PropertyIsLike")))?;
        }
        WireFilter::Between {
            property,
            lower,
            upper,
        } => {
            w.write_event(Event::Start(BytesStart::new("ogc:PropertyIsBetween")))?;
            write_simple(w, "ogc:PropertyName", property)?;
            w.write_event(Event::Start(BytesStart::new("ogc:LowerBoundary")))?;
            write_simple(w, "ogc:Literal", lower)?;
            w.write_event(Event::End(BytesEnd::new("ogc:LowerBoundary")))?;
            w.write_event(Event::Start(BytesStart::new("ogc:UpperBoundary")))?;
            write_simple(w, "ogc:Literal", upper)?;
            w.write_event(Event::End(BytesEnd::new("ogc:UpperBoundary")))?;
            w.write_event(Event::End(BytesEnd::new("ogc:PropertyIsBetween")))?;
        }
        WireFilter::IsNull { property } => {
            w.write_event(Event::Start(BytesStart::new("ogc:PropertyIsNull")))?;
            write_simple(w, "ogc:PropertyName", property)?;
            w.write_event(Event::End(BytesEnd::new("ogc:PropertyIsNull")))?;
        }
        WireFilter::Spatial {
            op,
            property,
            operand,
            distance_meters,
        } => {
            let name = op.element_name();
            w.write_event(Event::Start(BytesStart::new(name)))?;
            write_simple(w, "ogc:PropertyName", property)?;
            match operand {
                SpatialOperand::Geometry { wkt } => write_gml_geometry(w, wkt)?,
                SpatialOperand::Envelope(env) => write_gml_envelope(w, env)?,
            }
            if let Some(d) = distance_meters {
                let mut dist = BytesStart::new("ogc:Distance");
                dist.push_attribute(("units", "meters"));
                w.write_event(Event::Start(dist))?;
                w.write_event(Event::Text(BytesText::new(&format_number(*d))))?;
                w.write_event(Event::End(BytesEnd::new("ogc:Distance")))?;
            }
            w.write_event(Event::End(BytesEnd::new(name)))?;
        }
        WireFilter::And(children) | WireFilter::Or(children) => {
            let name = if matches!(filter, WireFilter::And(_)) {
                "ogc:And"
            } else {
                "ogc:Or"
            };
            match children.len() {
                0 => {
                    return Err(ProtocolError::Xml(
                        "logical combinator with no children".to_string(),
                    ))
                }
                // A one-child combinator is the child.
                1 => write_node(w, &children[0])?,
                _ => {
                    w.write_event(Event::Start(BytesStart::new(name)))?;
                    for child in children {
                        write_node(w, child)?;
                    }
                    w.write_event(Event::End(BytesEnd::new(name)))?;
                }
            }
        }
        WireFilter::Not(child) => {
            w.write_event(Event::Start(BytesStart::new("ogc:Not")))?;
            write_node(w, child)?;
            w.write_event(Event::End(BytesEnd::new("ogc:Not")))?;
        }
        WireFilter::FeatureIds(ids) => {
            for id in ids {
                let mut fid = BytesStart::new("ogc:FeatureId");
                fid.push_attribute(("fid", id.as_str()));
                w.write_event(Event::Empty(fid))?;
            }
        }
    }
    Ok(())
}

fn write_simple(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Render a float without a trailing `.0` for integral values.
fn format_number(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

// ---------------------------------------------------------------------------
// GML encoding
// ---------------------------------------------------------------------------

fn write_gml_envelope(w: &mut Writer<Vec<u8>>, env: &Envelope) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("gml:Envelope")))?;
    write_simple(
        w,
        "gml:lowerCorner",
        &format!("{} {}", format_number(env.min_x), format_number(env.min_y)),
    )?;
    write_simple(
        w,
        "gml:upperCorner",
        &format!("{} {}", format_number(env.max_x), format_number(env.max_y)),
    )?;
    w.write_event(Event::End(BytesEnd::new("gml:Envelope")))?;
    Ok(())
}

fn write_gml_geometry(w: &mut Writer<Vec<u8>>, wkt_text: &str) -> Result<()> {
    let geom = parse_wkt(wkt_text)?;
    write_geo(w, &geom)
}

fn write_geo(w: &mut Writer<Vec<u8>>, geom: &geo_types::Geometry<f64>) -> Result<()> {
    use geo_types::Geometry;
    match geom {
        Geometry::Point(p) => {
            w.write_event(Event::Start(BytesStart::new("gml:Point")))?;
            write_simple(
                w,
                "gml:pos",
                &format!("{} {}", format_number(p.x()), format_number(p.y())),
            )?;
            w.write_event(Event::End(BytesEnd::new("gml:Point")))?;
        }
        Geometry::LineString(ls) => {
            w.write_event(Event::Start(BytesStart::new("gml:LineString")))?;
            write_simple(w, "gml:posList", &pos_list(ls.coords()))?;
            w.write_event(Event::End(BytesEnd::new("gml:LineString")))?;
        }
        Geometry::Polygon(poly) => {
            w.write_event(Event::Start(BytesStart::new("gml:Polygon")))?;
            w.write_event(Event::Start(BytesStart::new("gml:exterior")))?;
            write_linear_ring(w, poly.exterior())?;
            w.write_event(Event::End(BytesEnd::new("gml:exterior")))?;
            for interior in poly.interiors() {
                w.write_event(Event::Start(BytesStart::new("gml:interior")))?;
                write_linear_ring(w, interior)?;
                w.write_event(Event::End(BytesEnd::new("gml:interior")))?;
            }
            w.write_event(Event::End(BytesEnd::new("gml:Polygon")))?;
        }
        Geometry::MultiPoint(mp) => {
            w.write_event(Event::Start(BytesStart::new("gml:MultiPoint")))?;
            for p in &mp.0 {
                w.write_event(Event::Start(BytesStart::new("gml:pointMember")))?;
                write_geo(w, &Geometry::Point(*p))?;
                w.write_event(Event::End(BytesEnd::new("gml:pointMember")))?;
            }
            w.write_event(Event::End(BytesEnd::new("gml:MultiPoint")))?;
        }
        Geometry::MultiLineString(mls) => {
            w.write_event(Event::Start(BytesStart::new("gml:MultiLineString")))?;
            for ls in &mls.0 {
                w.write_event(Event::Start(BytesStart::new("gml:lineStringMember")))?;
                write_geo(w, &Geometry::LineString(ls.clone()))?;
                w.write_event(Event::End(BytesEnd::new("gml:lineStringMember")))?;
            }
            w.write_event(Event::End(BytesEnd::new("gml:MultiLineString")))?;
        }
        Geometry::MultiPolygon(mp) => {
            w.write_event(Event::Start(BytesStart::new("gml:MultiPolygon")))?;
            for poly in &mp.0 {
                w.write_event(Event::Start(BytesStart::new("gml:polygonMember")))?;
                write_geo(w, &Geometry::Polygon(poly.clone()))?;
                w.write_event(Event::End(BytesEnd::new("gml:polygonMember")))?;
            }
            w.write_event(Event::End(BytesEnd::new("gml:MultiPolygon")))?;
        }
        other => {
            return Err(ProtocolError::UnencodableGeometry(format!(
                "geometry {:?} has no GML encoding",
                GeometryTypeName(other)
            )))
        }
    }
    Ok(())
}

fn write_linear_ring(w: &mut Writer<Vec<u8>>, ring: &geo_types::LineString<f64>) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("gml:LinearRing")))?;
    write_simple(w, "gml:posList", &pos_list(ring.coords()))?;
    w.write_event(Event::End(BytesEnd::new("gml:LinearRing")))?;
    Ok(())
}

fn pos_list<'a>(coords: impl Iterator<Item = &'a geo_types::Coord<f64>>) -> String {
    coords
        .map(|c| format!("{} {}", format_number(c.x), format_number(c.y)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse WKT to a geo-types geometry.
pub(crate) fn parse_wkt(wkt_text: &str) -> Result<geo_types::Geometry<f64>> {
    use std::str::FromStr;
    wkt::Wkt::from_str(wkt_text)
        .map_err(|e| ProtocolError::WktParse(format!("{e:?}")))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| ProtocolError::WktParse(format!("{e:?}")))
        })
}

struct GeometryTypeName<'a>(&'a geo_types::Geometry<f64>);

impl std::fmt::Debug for GeometryTypeName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use geo_types::Geometry;
        let name = match self.0 {
            Geometry::GeometryCollection(_) => "GeometryCollection",
            Geometry::Line(_) => "Line",
            Geometry::Rect(_) => "Rect",
            Geometry::Triangle(_) => "Triangle",
            _ => "Geometry",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Reparse
// ---------------------------------------------------------------------------

/// A minimal element tree used to reparse filter fragments.
#[derive(Debug, Default)]
pub(crate) struct XmlNode {
    pub(crate) local: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) children: Vec<XmlNode>,
    pub(crate) text: String,
}

impl XmlNode {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn child(&self, local: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.local == local)
    }

    pub(crate) fn child_text(&self, local: &str) -> Option<String> {
        self.child(local).map(|c| c.text.trim().to_string())
    }

    pub(crate) fn children_named<'a>(
        &'a self,
        local: &'a str,
    ) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.local == local)
    }
}

/// Build an element tree from an XML fragment with a single root element.
pub(crate) fn parse_tree(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut stack: Vec<XmlNode> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(node_from_start(e)),
            Ok(Event::Empty(ref e)) => {
                let node = node_from_start(e);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Ok(Event::End(_)) => {
                let node = match stack.pop() {
                    Some(n) => n,
                    None => return Err(ProtocolError::Xml("unbalanced end tag".to_string())),
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Ok(Event::Text(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| ProtocolError::Xml(e.to_string()))?;
                    top.text.push_str(&unescaped);
                }
            }
            Ok(Event::Eof) => {
                return Err(ProtocolError::Xml(
                    "unexpected end of document".to_string(),
                ))
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
    }
}

fn node_from_start(e: &BytesStart<'_>) -> XmlNode {
    let local = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
    let attrs = e
        .attributes()
        .flatten()
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.local_name().as_ref()).to_string(),
                String::from_utf8_lossy(&a.value).to_string(),
            )
        })
        .collect();
    XmlNode {
        local,
        attrs,
        children: Vec::new(),
        text: String::new(),
    }
}

/// Reparse an `ogc:Filter` XML fragment into a [`WireFilter`].
pub fn parse_filter_xml(xml: &str) -> Result<WireFilter> {
    let root = parse_tree(xml)?;
    if root.local != "Filter" {
        return Err(ProtocolError::malformed(
            "Filter",
            format!("expected ogc:Filter root, found {}", root.local),
        ));
    }
    if !root.children.is_empty() && root.children.iter().all(|c| c.local == "FeatureId") {
        let ids = root
            .children
            .iter()
            .filter_map(|c| c.attr("fid").map(str::to_string))
            .collect();
        return Ok(WireFilter::FeatureIds(ids));
    }
    let child = root
        .children
        .first()
        .ok_or_else(|| ProtocolError::malformed("Filter", "empty filter"))?;
    node_to_filter(child)
}

fn node_to_filter(node: &XmlNode) -> Result<WireFilter> {
    let binary = |op: ComparisonOp| -> Result<WireFilter> {
        Ok(WireFilter::Comparison {
            op,
            property: require_text(node, "PropertyName")?,
            literal: require_text(node, "Literal")?,
            match_case: node.attr("matchCase") != Some("false"),
        })
    };

    match node.local.as_str() {
        "And" | "Or" => {
            let children = node
                .children
                .iter()
                .map(node_to_filter)
                .collect::<Result<Vec<_>>>()?;
            if node.local == "And" {
                Ok(WireFilter::And(children))
            } else {
                Ok(WireFilter::Or(children))
            }
        }
        "Not" => {
            let child = node
                .children
                .first()
                .ok_or_else(|| ProtocolError::malformed("Filter", "empty ogc:Not"))?;
            Ok(WireFilter::Not(Box::new(node_to_filter(child)?)))
        }
        "FeatureId" => Ok(WireFilter::FeatureIds(
            node.attr("fid").map(str::to_string).into_iter().collect(),
        )),
        "PropertyIsEqualTo" => binary(ComparisonOp::EqualTo),
        "PropertyIsNotEqualTo" => binary(ComparisonOp::NotEqualTo),
        "PropertyIsLessThan" => binary(ComparisonOp::LessThan),
        "PropertyIsGreaterThan" => binary(ComparisonOp::GreaterThan),
        "PropertyIsLessThanOrEqualTo" => binary(ComparisonOp::LessThanOrEqualTo),
        "PropertyIsGreaterThanOrEqualTo" => binary(ComparisonOp::GreaterThanOrEqualTo),
        "PropertyIsLike" => Ok(WireFilter::Like {
            property: require_text(node, "PropertyName")?,
            pattern: require_text(node, "Literal")?,
            match_case: node.attr("matchCase") != Some("false"),
        }),
        "PropertyIsBetween" => {
            let lower = node
                .child("LowerBoundary")
                .and_then(|b| b.child_text("Literal"))
                .ok_or_else(|| ProtocolError::malformed("Filter", "missing LowerBoundary"))?;
            let upper = node
                .child("UpperBoundary")
                .and_then(|b| b.child_text("Literal"))
                .ok_or_else(|| ProtocolError::malformed("Filter", "missing UpperBoundary"))?;
            Ok(WireFilter::Between {
                property: require_text(node, "PropertyName")?,
                lower,
                upper,
            })
        }
        "PropertyIsNull" => Ok(WireFilter::IsNull {
            property: require_text(node, "PropertyName")?,
        }),
        other => match SpatialOp::from_local_name(other) {
            Some(op) => node_to_spatial(node, op),
            None => Err(ProtocolError::malformed(
                "Filter",
                format!("unrecognized filter element '{other}'"),
            )),
        },
    }
}

fn node_to_spatial(node: &XmlNode, op: SpatialOp) -> Result<WireFilter> {
    let property = require_text(node, "PropertyName")?;
    let distance_meters = node
        .child("Distance")
        .map(|d| {
            d.text.trim().parse::<f64>().map_err(|e| {
                ProtocolError::malformed("Filter", format!("invalid distance: {e}"))
            })
        })
        .transpose()?;

    let operand = if let Some(env) = node.child("Envelope") {
        let lower = parse_pos(&env.child_text("lowerCorner").unwrap_or_default())?;
        let upper = parse_pos(&env.child_text("upperCorner").unwrap_or_default())?;
        SpatialOperand::Envelope(Envelope {
            min_x: lower.0,
            min_y: lower.1,
            max_x: upper.0,
            max_y: upper.1,
        })
    } else {
        let geom_node = node
            .children
            .iter()
            .find(|c| c.local != "PropertyName" && c.local != "Distance")
            .ok_or_else(|| ProtocolError::malformed("Filter", "spatial clause has no operand"))?;
        SpatialOperand::Geometry {
            wkt: gml_to_wkt(geom_node)?,
        }
    };

    Ok(WireFilter::Spatial {
        op,
        property,
        operand,
        distance_meters,
    })
}

fn require_text(node: &XmlNode, child: &str) -> Result<String> {
    node.child(child)
        .map(|c| c.text.trim().to_string())
        .ok_or_else(|| ProtocolError::malformed("Filter", format!("missing ogc:{child}")))
}

fn parse_pos(text: &str) -> Result<(f64, f64)> {
    let mut parts = text.split_whitespace();
    let x = parts
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| ProtocolError::malformed("Filter", "invalid gml position"))?;
    let y = parts
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| ProtocolError::malformed("Filter", "invalid gml position"))?;
    Ok((x, y))
}

fn gml_to_wkt(node: &XmlNode) -> Result<String> {
    match node.local.as_str() {
        "Point" => {
            let pos = node
                .child_text("pos")
                .or_else(|| node.child_text("coordinates"))
                .ok_or_else(|| ProtocolError::malformed("Filter", "gml:Point without position"))?;
            let (x, y) = parse_pos(&pos)?;
            Ok(format!("POINT ({} {})", format_number(x), format_number(y)))
        }
        "LineString" => {
            let coords = pos_list_to_pairs(&node.child_text("posList").unwrap_or_default())?;
            Ok(format!("LINESTRING ({})", pairs_to_wkt(&coords)))
        }
        "Polygon" => {
            let mut rings = Vec::new();
            if let Some(ring) = ring_pos_list(node.child("exterior")) {
                rings.push(ring?);
            }
            for child in node.children.iter().filter(|c| c.local == "interior") {
                if let Some(ring) = ring_pos_list(Some(child)) {
                    rings.push(ring?);
                }
            }
            if rings.is_empty() {
                return Err(ProtocolError::malformed(
                    "Filter",
                    "gml:Polygon without exterior ring",
                ));
            }
            let body = rings
                .iter()
                .map(|r| format!("({})", pairs_to_wkt(r)))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!("POLYGON ({body})"))
        }
        "MultiPoint" => {
            let members = member_wkts(node, "pointMember")?;
            Ok(format!("MULTIPOINT ({})", strip_headers(&members, "POINT")))
        }
        "MultiLineString" => {
            let members = member_wkts(node, "lineStringMember")?;
            Ok(format!(
                "MULTILINESTRING ({})",
                strip_headers(&members, "LINESTRING")
            ))
        }
        "MultiPolygon" => {
            let members = member_wkts(node, "polygonMember")?;
            Ok(format!(
                "MULTIPOLYGON ({})",
                strip_headers(&members, "POLYGON")
            ))
        }
        other => Err(ProtocolError::malformed(
            "Filter",
            format!("unsupported GML geometry '{other}'"),
        )),
    }
}

fn ring_pos_list(container: Option<&XmlNode>) -> Option<Result<Vec<(f64, f64)>>> {
    let ring = container?.child("LinearRing")?;
    let text = ring.child_text("posList")?;
    Some(pos_list_to_pairs(&text))
}

fn member_wkts(node: &XmlNode, member: &str) -> Result<Vec<String>> {
    node.children
        .iter()
        .filter(|c| c.local == member)
        .map(|m| {
            m.children
                .first()
                .ok_or_else(|| ProtocolError::malformed("Filter", "empty geometry member"))
                .and_then(gml_to_wkt)
        })
        .collect()
}

fn strip_headers(members: &[String], header: &str) -> String {
    members
        .iter()
        .map(|m| m.trim_start_matches(header).trim().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn pos_list_to_pairs(text: &str) -> Result<Vec<(f64, f64)>> {
    let values: Vec<f64> = text
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| ProtocolError::malformed("Filter", format!("invalid posList: {e}")))?;
    if values.len() % 2 != 0 {
        return Err(ProtocolError::malformed(
            "Filter",
            "odd coordinate count in posList",
        ));
    }
    Ok(values.chunks(2).map(|c| (c[0], c[1])).collect())
}

fn pairs_to_wkt(pairs: &[(f64, f64)]) -> String {
    pairs
        .iter()
        .map(|(x, y)| format!("{} {}", format_number(*x), format_number(*y)))
        .collect::<Vec<_>>()
        .join(", ")
}
