//! Query execution: request building, transmission, and record mapping.

use crate::config::SourceConfiguration;
use crate::error::{Result, SourceError};
use crate::record::{QueryResponse, ResultRecord};
use crate::transport::{CswTransport, TransportError};
use csw_filter::{
    render_cql, CapabilityModel, ConstraintLanguage, FilterTranslator, Predicate, ANY_DATE,
    ANY_TEXT,
};
use csw_protocol::{
    parse_exception_report, parse_records_response, Constraint, ElementSet, GetRecordById,
    GetRecords, SortOrder, SortSpec,
};

/// Synthetic sort key for relevance ranking; not expressible on the wire.
pub const SORT_RELEVANCE: &str = "relevance";

/// Synthetic sort key for distance ranking; not expressible on the wire.
pub const SORT_DISTANCE: &str = "distance";

/// Concrete property substituted for an any-text sort.
const DEFAULT_TEXT_SORT_PROPERTY: &str = "title";

/// Concrete property substituted for an any-date sort.
const DEFAULT_DATE_SORT_PROPERTY: &str = "modified";

/// One requested sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub property: String,
    pub descending: bool,
}

/// Per-call query options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// 1-based start index.
    pub start_position: u64,
    pub page_size: u64,
    pub sort: Vec<SortKey>,
    /// Overrides the configured output schema for this call.
    pub output_schema: Option<String>,
    pub element_set: ElementSet,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            start_position: 1,
            page_size: 20,
            sort: Vec::new(),
            output_schema: None,
            element_set: ElementSet::Full,
        }
    }
}

/// Caller-supplied post-processing transform applied to each mapped record.
pub type PostTransform = dyn Fn(ResultRecord) -> ResultRecord + Send + Sync;

/// A single query/requery execution against one configuration and one
/// capability snapshot. Sessions are built per call, so reconfiguration
/// never affects a call already in flight.
pub(crate) struct QuerySession<'a> {
    pub transport: &'a dyn CswTransport,
    pub config: &'a SourceConfiguration,
    pub model: &'a CapabilityModel,
    pub post_transform: Option<&'a PostTransform>,
}

impl QuerySession<'_> {
    /// Translate, send, and map one paged query.
    pub async fn query(
        &self,
        predicate: &Predicate,
        options: &QueryOptions,
    ) -> Result<QueryResponse> {
        let schema = options
            .output_schema
            .clone()
            .unwrap_or_else(|| self.config.output_schema.clone());
        if !self.model.supports_output_schema(&schema) {
            return Err(SourceError::unsupported_query(format!(
                "output schema {schema} is not advertised by the provider (advertised: {})",
                self.model.output_schemas().join(", ")
            )));
        }

        let translation_options = self.config.translation_options();
        let translator = FilterTranslator::new(self.model, &translation_options);
        let wire = translator.translate(predicate)?;

        let constraint = match self.model.negotiated_language(self.config.force_cql) {
            ConstraintLanguage::Filter => Constraint::Filter(wire),
            ConstraintLanguage::CqlText => Constraint::CqlText(render_cql(&wire)?),
        };

        let request = GetRecords::new(options.start_position, options.page_size)
            .with_output_schema(schema)
            .with_element_set(options.element_set)
            .with_constraint(constraint)
            .with_sort(self.map_sort_keys(&options.sort));

        let body = self.send_checked(&request.to_xml()?).await?;
        let results = parse_records_response(&body)?;

        Ok(QueryResponse {
            total_hits: results.total_matched,
            records: self.map_records(results.records),
        })
    }

    /// Fetch canonical records by identifier (the transaction requery path).
    pub async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ResultRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = GetRecordById::new(ids.to_vec())
            .with_output_schema(self.config.output_schema.clone());
        let body = self.send_checked(&request.to_xml()?).await?;
        let results = parse_records_response(&body)?;
        Ok(self.map_records(results.records))
    }

    /// Send a request body, surfacing transport failures and structured
    /// exception reports as unsupported-query errors.
    pub async fn send_checked(&self, request: &str) -> Result<String> {
        let body = match self.transport.send(request).await {
            Ok(body) => body,
            // Servers deliver exception reports on error statuses too.
            Err(TransportError::Http { status, body }) => {
                if let Some(exception) = parse_exception_report(&body) {
                    return Err(SourceError::unsupported_query_with(
                        "server reported an exception",
                        exception,
                    ));
                }
                return Err(TransportError::Http { status, body }.into());
            }
            Err(other) => return Err(other.into()),
        };

        if let Some(exception) = parse_exception_report(&body) {
            return Err(SourceError::unsupported_query_with(
                "server reported an exception",
                exception,
            ));
        }
        Ok(body)
    }

    fn map_records(&self, raw: Vec<csw_protocol::RawRecord>) -> Vec<ResultRecord> {
        raw.into_iter()
            .map(|r| {
                let record = ResultRecord::from_raw(r, &self.config.id);
                match self.post_transform {
                    Some(transform) => transform(record),
                    None => record,
                }
            })
            .collect()
    }

    /// Drop synthetic sort keys and rewrite the any-text/any-date tokens to
    /// concrete default properties.
    fn map_sort_keys(&self, sort: &[SortKey]) -> Vec<SortSpec> {
        sort.iter()
            .filter_map(|key| {
                let property = match key.property.as_str() {
                    SORT_RELEVANCE | SORT_DISTANCE => {
                        tracing::debug!(key = %key.property, "dropping synthetic sort key");
                        return None;
                    }
                    ANY_TEXT => DEFAULT_TEXT_SORT_PROPERTY.to_string(),
                    ANY_DATE => DEFAULT_DATE_SORT_PROPERTY.to_string(),
                    other => self
                        .config
                        .property_map
                        .get(other)
                        .cloned()
                        .unwrap_or_else(|| other.to_string()),
                };
                Some(SortSpec {
                    property,
                    order: if key.descending {
                        SortOrder::Descending
                    } else {
                        SortOrder::Ascending
                    },
                })
            })
            .collect()
    }
}
