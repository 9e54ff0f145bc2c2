//! Response parsing for GetRecords, GetRecordById, and Transaction, plus
//! structured `ows:ExceptionReport` detection.

use crate::error::{ProtocolError, Result};
use crate::filter_xml::{parse_tree, XmlNode};
use std::collections::BTreeMap;

/// A record as returned by the server, before source-level mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    /// Multi-valued attributes keyed by unqualified element name.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl RawRecord {
    /// The record's `dc:identifier`, if present.
    pub fn identifier(&self) -> Option<&str> {
        self.attributes
            .get("identifier")
            .and_then(|v| v.first())
            .map(String::as_str)
    }
}

/// Parsed search response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// `numberOfRecordsMatched`, absent for GetRecordById responses.
    pub total_matched: Option<u64>,
    pub returned: u64,
    pub next_record: Option<u64>,
    pub records: Vec<RawRecord>,
}

/// Parse a `GetRecordsResponse` or `GetRecordByIdResponse` body.
pub fn parse_records_response(xml: &str) -> Result<SearchResults> {
    let root = parse_tree(xml)?;
    match root.local.as_str() {
        "GetRecordsResponse" => {
            let results = root.child("SearchResults").ok_or_else(|| {
                ProtocolError::malformed("GetRecordsResponse", "missing SearchResults")
            })?;
            let records = collect_records(results);
            Ok(SearchResults {
                total_matched: attr_u64(results, "numberOfRecordsMatched"),
                returned: attr_u64(results, "numberOfRecordsReturned")
                    .unwrap_or(records.len() as u64),
                next_record: attr_u64(results, "nextRecord").filter(|&n| n > 0),
                records,
            })
        }
        "GetRecordByIdResponse" => {
            let records = collect_records(&root);
            Ok(SearchResults {
                total_matched: None,
                returned: records.len() as u64,
                next_record: None,
                records,
            })
        }
        other => Err(ProtocolError::malformed(
            "GetRecordsResponse",
            format!("unexpected root element '{other}'"),
        )),
    }
}

fn collect_records(node: &XmlNode) -> Vec<RawRecord> {
    node.children
        .iter()
        .filter(|c| matches!(c.local.as_str(), "Record" | "SummaryRecord" | "BriefRecord"))
        .map(record_from_node)
        .collect()
}

fn record_from_node(node: &XmlNode) -> RawRecord {
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for child in &node.children {
        let value = if child.local == "BoundingBox" {
            let lower = child.child_text("LowerCorner").unwrap_or_default();
            let upper = child.child_text("UpperCorner").unwrap_or_default();
            format!("{lower} {upper}").trim().to_string()
        } else {
            child.text.trim().to_string()
        };
        if value.is_empty() {
            continue;
        }
        attributes.entry(child.local.clone()).or_default().push(value);
    }
    RawRecord { attributes }
}

fn attr_u64(node: &XmlNode, name: &str) -> Option<u64> {
    node.attr(name).and_then(|v| v.parse().ok())
}

/// Acknowledgement summary from a `TransactionResponse`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionSummary {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Identifiers of inserted records, in acknowledgement order.
    pub inserted_ids: Vec<String>,
}

/// Parse a `TransactionResponse` body.
pub fn parse_transaction_response(xml: &str) -> Result<TransactionSummary> {
    let root = parse_tree(xml)?;
    if root.local != "TransactionResponse" {
        return Err(ProtocolError::malformed(
            "TransactionResponse",
            format!("unexpected root element '{}'", root.local),
        ));
    }

    let mut summary = TransactionSummary::default();
    if let Some(totals) = root.child("TransactionSummary") {
        summary.inserted = totals
            .child_text("totalInserted")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        summary.updated = totals
            .child_text("totalUpdated")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        summary.deleted = totals
            .child_text("totalDeleted")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
    }

    for insert_result in root.children_named("InsertResult") {
        for record in insert_result.children.iter() {
            let raw = record_from_node(record);
            if let Some(id) = raw.identifier() {
                summary.inserted_ids.push(id.to_string());
            }
        }
    }

    Ok(summary)
}

/// A structured exception extracted from an `ows:ExceptionReport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwsException {
    pub code: String,
    pub locator: Option<String>,
    pub text: String,
}

impl std::fmt::Display for OwsException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(locator) = &self.locator {
            write!(f, " (locator: {locator})")?;
        }
        if !self.text.is_empty() {
            write!(f, ": {}", self.text)?;
        }
        Ok(())
    }
}

impl std::error::Error for OwsException {}

/// Detect an exception report. Returns `None` for anything that is not a
/// well-formed `ows:ExceptionReport` document.
pub fn parse_exception_report(xml: &str) -> Option<OwsException> {
    let root = parse_tree(xml).ok()?;
    if root.local != "ExceptionReport" {
        return None;
    }
    let exception = root.child("Exception")?;
    Some(OwsException {
        code: exception
            .attr("exceptionCode")
            .unwrap_or("UnknownError")
            .to_string(),
        locator: exception.attr("locator").map(str::to_string),
        text: exception
            .child_text("ExceptionText")
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDS_RESPONSE: &str = r#"
        <csw:GetRecordsResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
            xmlns:dc="http://purl.org/dc/elements/1.1/"
            xmlns:dct="http://purl.org/dc/terms/"
            xmlns:ows="http://www.opengis.net/ows">
          <csw:SearchStatus timestamp="2024-03-01T12:00:00Z"/>
          <csw:SearchResults numberOfRecordsMatched="37" numberOfRecordsReturned="2" nextRecord="3">
            <csw:Record>
              <dc:identifier>rec-1</dc:identifier>
              <dc:title>Harbor soundings</dc:title>
              <dc:subject>bathymetry</dc:subject>
              <dc:subject>hydrography</dc:subject>
              <dct:references>https://example.org/data/rec-1.zip</dct:references>
              <ows:BoundingBox crs="EPSG:4326">
                <ows:LowerCorner>-10 -5</ows:LowerCorner>
                <ows:UpperCorner>10 5</ows:UpperCorner>
              </ows:BoundingBox>
            </csw:Record>
            <csw:Record>
              <dc:identifier>rec-2</dc:identifier>
              <dc:title>Coastal charts</dc:title>
            </csw:Record>
          </csw:SearchResults>
        </csw:GetRecordsResponse>"#;

    #[test]
    fn test_parse_get_records_response() {
        let results = parse_records_response(RECORDS_RESPONSE).unwrap();

        assert_eq!(results.total_matched, Some(37));
        assert_eq!(results.returned, 2);
        assert_eq!(results.next_record, Some(3));
        assert_eq!(results.records.len(), 2);

        let first = &results.records[0];
        assert_eq!(first.identifier(), Some("rec-1"));
        assert_eq!(first.attributes["subject"].len(), 2);
        assert_eq!(
            first.attributes["references"][0],
            "https://example.org/data/rec-1.zip"
        );
        assert_eq!(first.attributes["BoundingBox"][0], "-10 -5 10 5");
    }

    #[test]
    fn test_parse_get_record_by_id_response() {
        let xml = r#"
            <csw:GetRecordByIdResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
                xmlns:dc="http://purl.org/dc/elements/1.1/">
              <csw:Record><dc:identifier>rec-9</dc:identifier></csw:Record>
            </csw:GetRecordByIdResponse>"#;

        let results = parse_records_response(xml).unwrap();
        assert_eq!(results.total_matched, None);
        assert_eq!(results.returned, 1);
        assert_eq!(results.records[0].identifier(), Some("rec-9"));
    }

    #[test]
    fn test_parse_transaction_response() {
        let xml = r#"
            <csw:TransactionResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
                xmlns:dc="http://purl.org/dc/elements/1.1/">
              <csw:TransactionSummary>
                <csw:totalInserted>2</csw:totalInserted>
                <csw:totalUpdated>0</csw:totalUpdated>
                <csw:totalDeleted>0</csw:totalDeleted>
              </csw:TransactionSummary>
              <csw:InsertResult>
                <csw:BriefRecord><dc:identifier>srv-1</dc:identifier></csw:BriefRecord>
              </csw:InsertResult>
              <csw:InsertResult>
                <csw:BriefRecord><dc:identifier>srv-2</dc:identifier></csw:BriefRecord>
              </csw:InsertResult>
            </csw:TransactionResponse>"#;

        let summary = parse_transaction_response(xml).unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.inserted_ids, vec!["srv-1", "srv-2"]);
    }

    #[test]
    fn test_parse_exception_report() {
        let xml = r#"
            <ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows">
              <ows:Exception exceptionCode="InvalidParameterValue" locator="outputSchema">
                <ows:ExceptionText>unknown schema</ows:ExceptionText>
              </ows:Exception>
            </ows:ExceptionReport>"#;

        let exception = parse_exception_report(xml).unwrap();
        assert_eq!(exception.code, "InvalidParameterValue");
        assert_eq!(exception.locator.as_deref(), Some("outputSchema"));
        assert!(exception.to_string().contains("unknown schema"));
    }

    #[test]
    fn test_exception_detection_ignores_other_documents() {
        assert!(parse_exception_report("<csw:GetRecordsResponse/>").is_none());
        assert!(parse_exception_report("not xml at all").is_none());
    }
}
