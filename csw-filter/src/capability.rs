//! Queryable model of what a remote catalogue declared it supports.
//!
//! A [`CapabilityModel`] is derived wholesale from a parsed capabilities
//! document and is immutable afterwards; the source runtime swaps whole
//! snapshots behind an `Arc` so concurrent readers see either the previous
//! model or the new one, never a half-built state. All lookups are pure
//! functions over the snapshot.

use csw_protocol::{
    CapabilitiesDocument, ComparisonOp, ElementSet, GeometryOperandKind, SpatialOp,
    LANGUAGE_FILTER,
};
use std::collections::{BTreeMap, BTreeSet};

/// Constraint language selected by negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintLanguage {
    /// Structured `ogc:Filter` XML.
    Filter,
    /// CQL text.
    CqlText,
}

/// Immutable snapshot of a server's declared capabilities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityModel {
    comparison_ops: BTreeSet<ComparisonOp>,
    spatial_ops: BTreeMap<SpatialOp, BTreeSet<GeometryOperandKind>>,
    global_operands: BTreeSet<GeometryOperandKind>,
    logical_ops: bool,
    filter_declared: bool,
    cql_declared: bool,
    output_schemas: Vec<String>,
    element_sets: Vec<ElementSet>,
    transactions: bool,
}

impl CapabilityModel {
    /// Derive a model from a parsed capabilities document.
    ///
    /// Declarations the document lacks stay absent: a server that lists no
    /// comparison operators supports none, not all.
    pub fn from_document(doc: &CapabilitiesDocument) -> Self {
        let comparison_ops = doc
            .comparison_operators
            .iter()
            .filter_map(|name| ComparisonOp::from_capability_name(name))
            .collect();

        let spatial_ops = doc
            .spatial_operators
            .iter()
            .filter_map(|declared| {
                let op = SpatialOp::from_capability_name(&declared.name)?;
                let operands = declared
                    .operands
                    .iter()
                    .filter_map(|o| GeometryOperandKind::from_declared(o))
                    .collect();
                Some((op, operands))
            })
            .collect();

        let global_operands = doc
            .global_geometry_operands
            .iter()
            .filter_map(|o| GeometryOperandKind::from_declared(o))
            .collect();

        let filter_declared = doc
            .constraint_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(LANGUAGE_FILTER));
        let cql_declared = doc
            .constraint_languages
            .iter()
            .any(|l| l.to_ascii_uppercase().contains("CQL"));

        let element_sets = doc
            .element_set_names
            .iter()
            .filter_map(|n| ElementSet::from_name(n))
            .collect();

        CapabilityModel {
            comparison_ops,
            spatial_ops,
            global_operands,
            logical_ops: doc.logical_operators,
            filter_declared,
            cql_declared,
            output_schemas: doc.output_schemas.clone(),
            element_sets,
            transactions: doc.transaction_supported,
        }
    }

    pub fn supports_comparison(&self, op: ComparisonOp) -> bool {
        self.comparison_ops.contains(&op)
    }

    /// Whether the operator was declared at all, with any operand.
    pub fn declares_spatial(&self, op: SpatialOp) -> bool {
        self.spatial_ops.contains_key(&op)
    }

    /// Whether `op` may be sent with the given operand. The per-operator
    /// operand list and the document-global list both count.
    pub fn supports_spatial(&self, op: SpatialOp, operand: GeometryOperandKind) -> bool {
        match self.spatial_ops.get(&op) {
            Some(operands) => {
                operands.contains(&operand) || self.global_operands.contains(&operand)
            }
            None => false,
        }
    }

    pub fn logical_ops_supported(&self) -> bool {
        self.logical_ops
    }

    /// Select the constraint language for outgoing requests.
    ///
    /// CQL wins when forced, or when it is the only declared language;
    /// structured Filter wins everywhere else.
    pub fn negotiated_language(&self, force_cql: bool) -> ConstraintLanguage {
        if force_cql || (self.cql_declared && !self.filter_declared) {
            ConstraintLanguage::CqlText
        } else {
            ConstraintLanguage::Filter
        }
    }

    /// Whether a configured output schema may be requested.
    ///
    /// Servers that advertise no `outputSchema` parameter accept their
    /// default; only an advertised list that omits the schema is a refusal.
    pub fn supports_output_schema(&self, schema: &str) -> bool {
        self.output_schemas.is_empty() || self.output_schemas.iter().any(|s| s == schema)
    }

    pub fn output_schemas(&self) -> &[String] {
        &self.output_schemas
    }

    pub fn element_sets(&self) -> &[ElementSet] {
        &self.element_sets
    }

    pub fn transactions_supported(&self) -> bool {
        self.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csw_protocol::DeclaredSpatialOperator;

    fn doc_with(
        comparisons: &[&str],
        spatial: &[(&str, &[&str])],
        global: &[&str],
        languages: &[&str],
    ) -> CapabilitiesDocument {
        CapabilitiesDocument {
            version: "2.0.2".to_string(),
            comparison_operators: comparisons.iter().map(|s| s.to_string()).collect(),
            spatial_operators: spatial
                .iter()
                .map(|(name, operands)| DeclaredSpatialOperator {
                    name: name.to_string(),
                    operands: operands.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
            global_geometry_operands: global.iter().map(|s| s.to_string()).collect(),
            logical_operators: true,
            constraint_languages: languages.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_comparison_membership_is_exact() {
        let model = CapabilityModel::from_document(&doc_with(
            &["EqualTo", "Like"],
            &[],
            &[],
            &["Filter"],
        ));

        assert!(model.supports_comparison(ComparisonOp::EqualTo));
        assert!(model.supports_comparison(ComparisonOp::Like));
        assert!(!model.supports_comparison(ComparisonOp::Between));
        assert!(!model.supports_comparison(ComparisonOp::NullCheck));
    }

    #[test]
    fn test_absent_declaration_means_empty() {
        let model = CapabilityModel::from_document(&CapabilitiesDocument::default());
        assert!(!model.supports_comparison(ComparisonOp::EqualTo));
        assert!(!model.declares_spatial(SpatialOp::Intersects));
        assert!(!model.logical_ops_supported());
    }

    #[test]
    fn test_global_operands_apply_to_all_operators() {
        let model = CapabilityModel::from_document(&doc_with(
            &[],
            &[("BBOX", &[]), ("Intersects", &["gml:Polygon"])],
            &["gml:Envelope"],
            &[],
        ));

        assert!(model.supports_spatial(SpatialOp::BBox, GeometryOperandKind::Envelope));
        assert!(model.supports_spatial(SpatialOp::Intersects, GeometryOperandKind::Polygon));
        assert!(model.supports_spatial(SpatialOp::Intersects, GeometryOperandKind::Envelope));
        assert!(!model.supports_spatial(SpatialOp::Intersects, GeometryOperandKind::Point));
        assert!(!model.supports_spatial(SpatialOp::Within, GeometryOperandKind::Envelope));
    }

    #[test]
    fn test_language_negotiation() {
        let both = CapabilityModel::from_document(&doc_with(&[], &[], &[], &["Filter", "CQL_TEXT"]));
        let cql_only = CapabilityModel::from_document(&doc_with(&[], &[], &[], &["CQL_TEXT"]));
        let filter_only = CapabilityModel::from_document(&doc_with(&[], &[], &[], &["Filter"]));

        assert_eq!(both.negotiated_language(false), ConstraintLanguage::Filter);
        assert_eq!(
            cql_only.negotiated_language(false),
            ConstraintLanguage::CqlText
        );
        assert_eq!(
            filter_only.negotiated_language(false),
            ConstraintLanguage::Filter
        );
        assert_eq!(both.negotiated_language(true), ConstraintLanguage::CqlText);
    }

    #[test]
    fn test_output_schema_check() {
        let mut doc = CapabilitiesDocument::default();
        doc.output_schemas = vec!["http://www.opengis.net/cat/csw/2.0.2".to_string()];
        let model = CapabilityModel::from_document(&doc);

        assert!(model.supports_output_schema("http://www.opengis.net/cat/csw/2.0.2"));
        assert!(!model.supports_output_schema("http://www.isotc211.org/2005/gmd"));

        let unadvertised = CapabilityModel::from_document(&CapabilitiesDocument::default());
        assert!(unadvertised.supports_output_schema("http://anything"));
    }
}
