//! Outbound record payloads for Transaction inserts and updates.

use crate::error::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::BTreeMap;

/// A record handed to the write path by the caller.
///
/// Attributes are multi-valued and keyed by unqualified name; the wire
/// encoding maps them onto the Dublin Core elements `csw:Record` carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRecord {
    /// Caller-side identifier, used for per-item failure attribution. The
    /// server assigns the stored identifier on insert.
    pub id: Option<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl InputRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            attributes: BTreeMap::new(),
        }
    }

    /// Set a single-valued attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), vec![value.into()]);
        self
    }

    pub(crate) fn write_xml(&self, w: &mut Writer<Vec<u8>>) -> Result<()> {
        w.write_event(Event::Start(BytesStart::new("csw:Record")))?;
        if let Some(id) = &self.id {
            if !self.attributes.contains_key("identifier") {
                write_element(w, "dc:identifier", id)?;
            }
        }
        for (name, values) in &self.attributes {
            let qualified = qualified_element(name);
            for value in values {
                write_element(w, &qualified, value)?;
            }
        }
        w.write_event(Event::End(BytesEnd::new("csw:Record")))?;
        Ok(())
    }
}

fn write_element(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Map an unqualified attribute name onto its Dublin Core wire element.
fn qualified_element(name: &str) -> String {
    match name {
        "abstract" | "modified" | "created" | "issued" | "references" | "spatial"
        | "temporal" | "alternative" => format!("dct:{name}"),
        other => format!("dc:{other}"),
    }
}
