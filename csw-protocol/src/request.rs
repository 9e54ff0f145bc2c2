//! Request builders for the four CSW operations this source issues.
//!
//! Requests are assembled as plain structs with `with_*` builders, then
//! rendered to POST bodies with [`GetRecords::to_xml`] and friends. Paging
//! uses the protocol's 1-based `startPosition`.

use crate::error::Result;
use crate::filter_xml::{write_filter_body, WireFilter};
use crate::record::InputRecord;
use crate::{
    CSW_NS, CSW_RECORD_TYPE, CSW_VERSION, DCT_NS, DC_NS, FILTER_VERSION, GML_NS, OGC_NS, OWS_NS,
};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Response verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementSet {
    Brief,
    Summary,
    #[default]
    Full,
}

impl ElementSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementSet::Brief => "brief",
            ElementSet::Summary => "summary",
            ElementSet::Full => "full",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "brief" => Some(ElementSet::Brief),
            "summary" => Some(ElementSet::Summary),
            "full" => Some(ElementSet::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// One `ogc:SortProperty` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub property: String,
    pub order: SortOrder,
}

/// Constraint payload in whichever language negotiation selected.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Filter(WireFilter),
    CqlText(String),
}

/// A paged `csw:GetRecords` search request.
#[derive(Debug, Clone)]
pub struct GetRecords {
    /// 1-based index of the first record to return.
    pub start_position: u64,
    pub max_records: u64,
    pub type_names: String,
    pub output_schema: String,
    pub element_set: ElementSet,
    pub constraint: Option<Constraint>,
    pub sort: Vec<SortSpec>,
}

impl GetRecords {
    pub fn new(start_position: u64, max_records: u64) -> Self {
        Self {
            start_position: start_position.max(1),
            max_records,
            type_names: CSW_RECORD_TYPE.to_string(),
            output_schema: CSW_NS.to_string(),
            element_set: ElementSet::Full,
            constraint: None,
            sort: Vec::new(),
        }
    }

    pub fn with_output_schema(mut self, schema: impl Into<String>) -> Self {
        self.output_schema = schema.into();
        self
    }

    pub fn with_element_set(mut self, element_set: ElementSet) -> Self {
        self.element_set = element_set;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    /// Render the POST body.
    pub fn to_xml(&self) -> Result<String> {
        let mut w = Writer::new(Vec::new());
        let mut root = BytesStart::new("csw:GetRecords");
        push_namespaces(&mut root);
        root.push_attribute(("service", "CSW"));
        root.push_attribute(("version", CSW_VERSION));
        root.push_attribute(("resultType", "results"));
        root.push_attribute(("outputFormat", "application/xml"));
        root.push_attribute(("outputSchema", self.output_schema.as_str()));
        root.push_attribute(("startPosition", self.start_position.to_string().as_str()));
        root.push_attribute(("maxRecords", self.max_records.to_string().as_str()));
        w.write_event(Event::Start(root))?;

        let mut query = BytesStart::new("csw:Query");
        query.push_attribute(("typeNames", self.type_names.as_str()));
        w.write_event(Event::Start(query))?;

        write_text_element(&mut w, "csw:ElementSetName", self.element_set.as_str())?;

        if let Some(constraint) = &self.constraint {
            write_constraint(&mut w, constraint)?;
        }

        if !self.sort.is_empty() {
            w.write_event(Event::Start(BytesStart::new("ogc:SortBy")))?;
            for spec in &self.sort {
                w.write_event(Event::Start(BytesStart::new("ogc:SortProperty")))?;
                write_text_element(&mut w, "ogc:PropertyName", &spec.property)?;
                write_text_element(&mut w, "ogc:SortOrder", spec.order.as_str())?;
                w.write_event(Event::End(BytesEnd::new("ogc:SortProperty")))?;
            }
            w.write_event(Event::End(BytesEnd::new("ogc:SortBy")))?;
        }

        w.write_event(Event::End(BytesEnd::new("csw:Query")))?;
        w.write_event(Event::End(BytesEnd::new("csw:GetRecords")))?;
        into_string(w)
    }
}

/// A `csw:GetRecordById` canonical-record fetch.
#[derive(Debug, Clone)]
pub struct GetRecordById {
    pub ids: Vec<String>,
    pub output_schema: String,
    pub element_set: ElementSet,
}

impl GetRecordById {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            ids,
            output_schema: CSW_NS.to_string(),
            element_set: ElementSet::Full,
        }
    }

    pub fn with_output_schema(mut self, schema: impl Into<String>) -> Self {
        self.output_schema = schema.into();
        self
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut w = Writer::new(Vec::new());
        let mut root = BytesStart::new("csw:GetRecordById");
        push_namespaces(&mut root);
        root.push_attribute(("service", "CSW"));
        root.push_attribute(("version", CSW_VERSION));
        root.push_attribute(("outputSchema", self.output_schema.as_str()));
        w.write_event(Event::Start(root))?;
        for id in &self.ids {
            write_text_element(&mut w, "csw:Id", id)?;
        }
        write_text_element(&mut w, "csw:ElementSetName", self.element_set.as_str())?;
        w.write_event(Event::End(BytesEnd::new("csw:GetRecordById")))?;
        into_string(w)
    }
}

/// One action inside a `csw:Transaction`.
#[derive(Debug, Clone)]
pub enum TransactionOp {
    Insert {
        type_name: String,
        records: Vec<InputRecord>,
    },
    Update {
        record: InputRecord,
        constraint: WireFilter,
    },
    Delete {
        type_name: String,
        constraint: WireFilter,
    },
}

/// A `csw:Transaction` write request.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub ops: Vec<TransactionOp>,
}

impl Transaction {
    pub fn new(ops: Vec<TransactionOp>) -> Self {
        Self { ops }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut w = Writer::new(Vec::new());
        let mut root = BytesStart::new("csw:Transaction");
        push_namespaces(&mut root);
        root.push_attribute(("service", "CSW"));
        root.push_attribute(("version", CSW_VERSION));
        // Ask the server to echo inserted records so identifiers come back.
        root.push_attribute(("verboseResponse", "true"));
        w.write_event(Event::Start(root))?;

        for op in &self.ops {
            match op {
                TransactionOp::Insert { type_name, records } => {
                    let mut insert = BytesStart::new("csw:Insert");
                    insert.push_attribute(("typeName", type_name.as_str()));
                    w.write_event(Event::Start(insert))?;
                    for record in records {
                        record.write_xml(&mut w)?;
                    }
                    w.write_event(Event::End(BytesEnd::new("csw:Insert")))?;
                }
                TransactionOp::Update { record, constraint } => {
                    w.write_event(Event::Start(BytesStart::new("csw:Update")))?;
                    record.write_xml(&mut w)?;
                    write_filter_constraint(&mut w, constraint)?;
                    w.write_event(Event::End(BytesEnd::new("csw:Update")))?;
                }
                TransactionOp::Delete {
                    type_name,
                    constraint,
                } => {
                    let mut delete = BytesStart::new("csw:Delete");
                    delete.push_attribute(("typeName", type_name.as_str()));
                    w.write_event(Event::Start(delete))?;
                    write_filter_constraint(&mut w, constraint)?;
                    w.write_event(Event::End(BytesEnd::new("csw:Delete")))?;
                }
            }
        }

        w.write_event(Event::End(BytesEnd::new("csw:Transaction")))?;
        into_string(w)
    }
}

/// Render the POST body for a `csw:GetCapabilities` probe.
pub fn get_capabilities_xml() -> Result<String> {
    let mut w = Writer::new(Vec::new());
    let mut root = BytesStart::new("csw:GetCapabilities");
    root.push_attribute(("xmlns:csw", CSW_NS));
    root.push_attribute(("xmlns:ows", OWS_NS));
    root.push_attribute(("service", "CSW"));
    w.write_event(Event::Start(root))?;
    w.write_event(Event::Start(BytesStart::new("ows:AcceptVersions")))?;
    write_text_element(&mut w, "ows:Version", CSW_VERSION)?;
    w.write_event(Event::End(BytesEnd::new("ows:AcceptVersions")))?;
    w.write_event(Event::End(BytesEnd::new("csw:GetCapabilities")))?;
    into_string(w)
}

fn push_namespaces(root: &mut BytesStart<'_>) {
    root.push_attribute(("xmlns:csw", CSW_NS));
    root.push_attribute(("xmlns:ogc", OGC_NS));
    root.push_attribute(("xmlns:gml", GML_NS));
    root.push_attribute(("xmlns:ows", OWS_NS));
    root.push_attribute(("xmlns:dc", DC_NS));
    root.push_attribute(("xmlns:dct", DCT_NS));
}

fn write_constraint(w: &mut Writer<Vec<u8>>, constraint: &Constraint) -> Result<()> {
    let mut start = BytesStart::new("csw:Constraint");
    start.push_attribute(("version", FILTER_VERSION));
    w.write_event(Event::Start(start))?;
    match constraint {
        Constraint::Filter(filter) => {
            w.write_event(Event::Start(BytesStart::new("ogc:Filter")))?;
            write_filter_body(w, filter)?;
            w.write_event(Event::End(BytesEnd::new("ogc:Filter")))?;
        }
        Constraint::CqlText(cql) => {
            write_text_element(w, "csw:CqlText", cql)?;
        }
    }
    w.write_event(Event::End(BytesEnd::new("csw:Constraint")))?;
    Ok(())
}

fn write_filter_constraint(w: &mut Writer<Vec<u8>>, filter: &WireFilter) -> Result<()> {
    write_constraint(w, &Constraint::Filter(filter.clone()))
}

fn write_text_element(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn into_string(w: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(w.into_inner())
        .map_err(|e| crate::error::ProtocolError::Xml(format!("non-UTF-8 output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_xml::ComparisonOp;

    #[test]
    fn test_get_records_request() {
        let request = GetRecords::new(21, 10)
            .with_element_set(ElementSet::Summary)
            .with_constraint(Constraint::Filter(WireFilter::Comparison {
                op: ComparisonOp::EqualTo,
                property: "title".to_string(),
                literal: "charts".to_string(),
                match_case: true,
            }))
            .with_sort(vec![SortSpec {
                property: "modified".to_string(),
                order: SortOrder::Descending,
            }]);

        let xml = request.to_xml().unwrap();
        assert!(xml.contains("startPosition=\"21\""));
        assert!(xml.contains("maxRecords=\"10\""));
        assert!(xml.contains("<csw:ElementSetName>summary</csw:ElementSetName>"));
        assert!(xml.contains("PropertyIsEqualTo"));
        assert!(xml.contains("<ogc:SortOrder>DESC</ogc:SortOrder>"));
    }

    #[test]
    fn test_start_position_is_one_based() {
        let request = GetRecords::new(0, 10);
        assert_eq!(request.start_position, 1);
    }

    #[test]
    fn test_cql_constraint() {
        let request =
            GetRecords::new(1, 10).with_constraint(Constraint::CqlText("title = 'x'".to_string()));

        let xml = request.to_xml().unwrap();
        assert!(xml.contains("<csw:CqlText>"));
        assert!(xml.contains("title = "));
        assert!(!xml.contains("ogc:Filter"));
    }

    #[test]
    fn test_get_record_by_id() {
        let request = GetRecordById::new(vec!["a".to_string(), "b".to_string()]);
        let xml = request.to_xml().unwrap();
        assert!(xml.contains("<csw:Id>a</csw:Id>"));
        assert!(xml.contains("<csw:Id>b</csw:Id>"));
        assert!(xml.contains("<csw:ElementSetName>full</csw:ElementSetName>"));
    }

    #[test]
    fn test_transaction_request() {
        let tx = Transaction::new(vec![
            TransactionOp::Insert {
                type_name: "csw:Record".to_string(),
                records: vec![InputRecord::new("r1").with_attribute("title", "one")],
            },
            TransactionOp::Delete {
                type_name: "csw:Record".to_string(),
                constraint: WireFilter::Comparison {
                    op: ComparisonOp::EqualTo,
                    property: "identifier".to_string(),
                    literal: "gone".to_string(),
                    match_case: true,
                },
            },
        ]);

        let xml = tx.to_xml().unwrap();
        assert!(xml.contains("verboseResponse=\"true\""));
        assert!(xml.contains("<csw:Insert typeName=\"csw:Record\">"));
        assert!(xml.contains("<csw:Delete typeName=\"csw:Record\">"));
        assert!(xml.contains(">gone<"));
    }

    #[test]
    fn test_get_capabilities_body() {
        let xml = get_capabilities_xml().unwrap();
        assert!(xml.contains("GetCapabilities"));
        assert!(xml.contains("<ows:Version>2.0.2</ows:Version>"));
    }
}
