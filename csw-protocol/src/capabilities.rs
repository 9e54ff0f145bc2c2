//! Capabilities-document parsing.
//!
//! The `GetCapabilities` response is the server's declaration of what it
//! supports. Everything here is recorded verbatim as declared — deciding what
//! the declarations *mean* (operator membership, language preference,
//! fallback legality) is the negotiation layer's job, not the wire layer's.
//!
//! An absent declaration is recorded as absent, never defaulted: a server
//! that declares no comparison operators gets an empty list, not "assume
//! all".

use crate::error::{ProtocolError, Result};
use crate::filter_xml::{parse_tree, XmlNode};

/// One declared spatial operator and the geometry operands it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSpatialOperator {
    /// Operator token as declared (e.g. `BBOX`, `Intersects`).
    pub name: String,
    /// Declared operands such as `gml:Envelope`; may be empty, in which case
    /// only the document's global operand list applies.
    pub operands: Vec<String>,
}

/// Parsed `csw:Capabilities` document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitiesDocument {
    pub version: String,
    /// Declared `ogc:ComparisonOperator` tokens.
    pub comparison_operators: Vec<String>,
    /// Declared spatial operators with their per-operator operands.
    pub spatial_operators: Vec<DeclaredSpatialOperator>,
    /// Operand list declared directly under `ogc:Spatial_Capabilities`,
    /// applying to every spatial operator.
    pub global_geometry_operands: Vec<String>,
    /// Whether `ogc:LogicalOperators` was declared.
    pub logical_operators: bool,
    /// `CONSTRAINTLANGUAGE` values advertised for GetRecords.
    pub constraint_languages: Vec<String>,
    /// `outputSchema` values advertised for GetRecords.
    pub output_schemas: Vec<String>,
    /// `ElementSetName` values advertised for GetRecords.
    pub element_set_names: Vec<String>,
    /// `typeNames` values advertised for GetRecords.
    pub type_names: Vec<String>,
    /// Whether a `Transaction` operation is advertised.
    pub transaction_supported: bool,
}

impl CapabilitiesDocument {
    /// Parse a `GetCapabilities` response body.
    pub fn parse(xml: &str) -> Result<Self> {
        let root = parse_tree(xml)?;
        if root.local != "Capabilities" {
            return Err(ProtocolError::malformed(
                "Capabilities",
                format!("expected csw:Capabilities root, found {}", root.local),
            ));
        }

        let mut doc = CapabilitiesDocument {
            version: root.attr("version").unwrap_or_default().to_string(),
            ..Default::default()
        };

        if let Some(filter_caps) = root.child("Filter_Capabilities") {
            parse_filter_capabilities(filter_caps, &mut doc);
        }
        if let Some(ops_meta) = root.child("OperationsMetadata") {
            parse_operations_metadata(ops_meta, &mut doc);
        }

        Ok(doc)
    }
}

fn parse_filter_capabilities(node: &XmlNode, doc: &mut CapabilitiesDocument) {
    if let Some(scalar) = node.child("Scalar_Capabilities") {
        doc.logical_operators = scalar.child("LogicalOperators").is_some();
        if let Some(comparison) = scalar.child("ComparisonOperators") {
            doc.comparison_operators = comparison
                .children_named("ComparisonOperator")
                .map(|c| c.text.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
    }

    if let Some(spatial) = node.child("Spatial_Capabilities") {
        if let Some(global) = spatial.child("GeometryOperands") {
            doc.global_geometry_operands = operand_list(global);
        }
        if let Some(operators) = spatial.child("SpatialOperators") {
            doc.spatial_operators = operators
                .children_named("SpatialOperator")
                .filter_map(|op| {
                    let name = op.attr("name")?.to_string();
                    let operands = op.child("GeometryOperands").map(operand_list).unwrap_or_default();
                    Some(DeclaredSpatialOperator { name, operands })
                })
                .collect();
        }
    }
}

fn operand_list(node: &XmlNode) -> Vec<String> {
    node.children_named("GeometryOperand")
        .map(|c| c.text.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_operations_metadata(node: &XmlNode, doc: &mut CapabilitiesDocument) {
    for operation in node.children_named("Operation") {
        match operation.attr("name") {
            Some("GetRecords") => parse_get_records_operation(operation, doc),
            Some("Transaction") => doc.transaction_supported = true,
            _ => {}
        }
    }
    // Some servers advertise CONSTRAINTLANGUAGE as a service-level constraint.
    if doc.constraint_languages.is_empty() {
        for constraint in node.children_named("Constraint") {
            if is_constraint_language(constraint.attr("name")) {
                doc.constraint_languages = value_list(constraint);
            }
        }
    }
}

fn parse_get_records_operation(node: &XmlNode, doc: &mut CapabilitiesDocument) {
    for parameter in node
        .children_named("Parameter")
        .chain(node.children_named("Constraint"))
    {
        let name = parameter.attr("name").unwrap_or_default();
        if name.eq_ignore_ascii_case("outputSchema") {
            doc.output_schemas = value_list(parameter);
        } else if name.eq_ignore_ascii_case("ElementSetName") {
            doc.element_set_names = value_list(parameter);
        } else if name.eq_ignore_ascii_case("typeNames") || name.eq_ignore_ascii_case("typeName") {
            doc.type_names = value_list(parameter);
        } else if is_constraint_language(Some(name)) {
            doc.constraint_languages = value_list(parameter);
        }
    }
}

// Accepts both "CONSTRAINTLANGUAGE" and "Constraint_Language" spellings.
fn is_constraint_language(name: Option<&str>) -> bool {
    matches!(name, Some(n) if n.replace('_', "").eq_ignore_ascii_case("CONSTRAINTLANGUAGE"))
}

fn value_list(node: &XmlNode) -> Vec<String> {
    node.children_named("Value")
        .map(|v| v.text.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
