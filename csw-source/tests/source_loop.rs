//! End-to-end tests for the source facade: capability negotiation, the
//! query loop, the write path, and availability/reconfiguration behavior,
//! all against a scripted mock transport.

use async_trait::async_trait;
use csw_filter::{Predicate, SpatialPredicateOp, ANY_GEO};
use csw_source::{
    ConfigPatch, CswSource, CswTransport, InputRecord, QueryOptions, SourceConfiguration,
    SourceError, TransportError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Transport that replays scripted responses and records request bodies.
#[derive(Debug, Default)]
struct MockTransport {
    responses: Mutex<VecDeque<Result<String, TransportError>>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push_ok(&self, body: &str) {
        self.responses.lock().push_back(Ok(body.to_string()));
    }

    fn push_err(&self, err: TransportError) {
        self.responses.lock().push_back(Err(err));
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CswTransport for MockTransport {
    async fn send(&self, body: &str) -> Result<String, TransportError> {
        self.requests.lock().push(body.to_string());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted response".to_string())))
    }
}

const CAPABILITIES: &str = r#"
<csw:Capabilities version="2.0.2"
    xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
    xmlns:ows="http://www.opengis.net/ows"
    xmlns:ogc="http://www.opengis.net/ogc">
  <ows:OperationsMetadata>
    <ows:Operation name="GetRecords">
      <ows:Parameter name="outputSchema">
        <ows:Value>http://www.opengis.net/cat/csw/2.0.2</ows:Value>
      </ows:Parameter>
      <ows:Parameter name="ElementSetName">
        <ows:Value>brief</ows:Value>
        <ows:Value>summary</ows:Value>
        <ows:Value>full</ows:Value>
      </ows:Parameter>
      <ows:Parameter name="CONSTRAINTLANGUAGE">
        <ows:Value>Filter</ows:Value>
        <ows:Value>CQL_TEXT</ows:Value>
      </ows:Parameter>
    </ows:Operation>
    <ows:Operation name="Transaction"/>
  </ows:OperationsMetadata>
  <ogc:Filter_Capabilities>
    <ogc:Spatial_Capabilities>
      <ogc:GeometryOperands>
        <ogc:GeometryOperand>gml:Envelope</ogc:GeometryOperand>
      </ogc:GeometryOperands>
      <ogc:SpatialOperators>
        <ogc:SpatialOperator name="BBOX"/>
        <ogc:SpatialOperator name="Intersects">
          <ogc:GeometryOperands>
            <ogc:GeometryOperand>gml:Polygon</ogc:GeometryOperand>
          </ogc:GeometryOperands>
        </ogc:SpatialOperator>
      </ogc:SpatialOperators>
    </ogc:Spatial_Capabilities>
    <ogc:Scalar_Capabilities>
      <ogc:LogicalOperators/>
      <ogc:ComparisonOperators>
        <ogc:ComparisonOperator>EqualTo</ogc:ComparisonOperator>
        <ogc:ComparisonOperator>Like</ogc:ComparisonOperator>
        <ogc:ComparisonOperator>Between</ogc:ComparisonOperator>
      </ogc:ComparisonOperators>
    </ogc:Scalar_Capabilities>
  </ogc:Filter_Capabilities>
</csw:Capabilities>"#;

/// Capabilities that advertise only CQL and no Transaction operation.
const CAPABILITIES_CQL_ONLY: &str = r#"
<csw:Capabilities version="2.0.2"
    xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
    xmlns:ows="http://www.opengis.net/ows"
    xmlns:ogc="http://www.opengis.net/ogc">
  <ows:OperationsMetadata>
    <ows:Operation name="GetRecords">
      <ows:Parameter name="CONSTRAINTLANGUAGE">
        <ows:Value>CQL_TEXT</ows:Value>
      </ows:Parameter>
    </ows:Operation>
  </ows:OperationsMetadata>
  <ogc:Filter_Capabilities>
    <ogc:Scalar_Capabilities>
      <ogc:LogicalOperators/>
      <ogc:ComparisonOperators>
        <ogc:ComparisonOperator>EqualTo</ogc:ComparisonOperator>
        <ogc:ComparisonOperator>Like</ogc:ComparisonOperator>
      </ogc:ComparisonOperators>
    </ogc:Scalar_Capabilities>
  </ogc:Filter_Capabilities>
</csw:Capabilities>"#;

const RECORDS_RESPONSE: &str = r#"
<csw:GetRecordsResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:dct="http://purl.org/dc/terms/">
  <csw:SearchResults numberOfRecordsMatched="12" numberOfRecordsReturned="2" nextRecord="3">
    <csw:Record>
      <dc:identifier>rec-1</dc:identifier>
      <dc:title>Harbor soundings</dc:title>
      <dct:references>https://example.org/rec-1.zip</dct:references>
    </csw:Record>
    <csw:Record>
      <dc:identifier>rec-2</dc:identifier>
      <dc:title>Coastal charts</dc:title>
    </csw:Record>
  </csw:SearchResults>
</csw:GetRecordsResponse>"#;

fn config() -> SourceConfiguration {
    SourceConfiguration {
        id: "remote-catalog".to_string(),
        endpoint: "https://catalog.example/csw".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn query_loop_translates_sends_and_maps() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);
    transport.push_ok(RECORDS_RESPONSE);

    let source = CswSource::with_transport(config(), transport.clone()).await;
    assert!(source.is_available());

    let predicate = Predicate::and(vec![
        Predicate::like("title", "charts%"),
        Predicate::spatial(
            SpatialPredicateOp::Intersects,
            ANY_GEO,
            "POLYGON((0 0,10 0,10 20,0 20,0 0))",
        ),
    ]);

    let response = source
        .query(&predicate, QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(response.total_hits, Some(12));
    assert_eq!(response.records.len(), 2);
    assert_eq!(response.records[0].id, "rec-1");
    assert_eq!(response.records[0].source_id, "remote-catalog");
    assert_eq!(
        response.records[0].resource_uri.as_deref(),
        Some("https://example.org/rec-1.zip")
    );

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].contains("GetCapabilities"));
    let query_body = &requests[1];
    assert!(query_body.contains("csw:GetRecords"));
    assert!(query_body.contains("startPosition=\"1\""));
    assert!(query_body.contains("ogc:And"));
    assert!(query_body.contains("PropertyIsLike"));
    assert!(query_body.contains("ogc:Intersects"));
    assert!(query_body.contains("gml:Polygon"));
}

#[tokio::test]
async fn cql_only_server_gets_cql_text() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES_CQL_ONLY);
    transport.push_ok(RECORDS_RESPONSE);

    let source = CswSource::with_transport(config(), transport.clone()).await;
    source
        .query(&Predicate::like("title", "charts%"), QueryOptions::default())
        .await
        .unwrap();

    let body = &transport.requests()[1];
    assert!(body.contains("csw:CqlText"));
    assert!(body.contains("title ILIKE"));
    assert!(!body.contains("ogc:Filter"));
}

#[tokio::test]
async fn failed_initial_probe_leaves_source_unavailable() {
    let transport = MockTransport::new();
    transport.push_err(TransportError::Network("refused".to_string()));

    let source = CswSource::with_transport(config(), transport.clone()).await;
    assert!(!source.is_available());
    assert!(source.last_successful_probe().is_none());
}

#[tokio::test]
async fn refresh_repolls_and_notifies_observers() {
    let transport = MockTransport::new();
    transport.push_err(TransportError::Network("refused".to_string()));

    let source = CswSource::with_transport(config(), transport.clone()).await;
    let mut availability = source.subscribe_availability();
    assert!(!source.is_available());

    transport.push_ok(CAPABILITIES);
    source.refresh(ConfigPatch::default()).await.unwrap();

    assert!(source.is_available());
    availability.changed().await.unwrap();
    assert!(*availability.borrow());
}

#[tokio::test]
async fn refresh_patch_switches_constraint_language() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);

    let source = CswSource::with_transport(config(), transport.clone()).await;

    transport.push_ok(CAPABILITIES);
    source
        .refresh(ConfigPatch {
            force_cql: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();

    transport.push_ok(RECORDS_RESPONSE);
    source
        .query(&Predicate::like("title", "x%"), QueryOptions::default())
        .await
        .unwrap();

    let requests = transport.requests();
    assert!(requests.last().unwrap().contains("csw:CqlText"));
}

#[tokio::test]
async fn unadvertised_output_schema_fails_fast() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);

    let source = CswSource::with_transport(config(), transport.clone()).await;

    let options = QueryOptions {
        output_schema: Some("http://www.isotc211.org/2005/gmd".to_string()),
        ..Default::default()
    };
    let err = source
        .query(&Predicate::like("title", "x%"), options)
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::UnsupportedQuery { .. }));
    assert!(err.to_string().contains("not advertised"));
    // Only the capabilities probe hit the wire.
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn exception_report_wraps_server_fault() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);
    transport.push_ok(
        r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows">
             <ows:Exception exceptionCode="NoApplicableCode">
               <ows:ExceptionText>backend offline</ows:ExceptionText>
             </ows:Exception>
           </ows:ExceptionReport>"#,
    );

    let source = CswSource::with_transport(config(), transport.clone()).await;
    let err = source
        .query(&Predicate::like("title", "x%"), QueryOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::UnsupportedQuery { .. }));
    let cause = std::error::Error::source(&err).expect("cause chained");
    assert!(cause.to_string().contains("backend offline"));
}

#[tokio::test]
async fn create_reports_per_item_failures_and_requeries() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);
    // Server acknowledges two of three inserts.
    transport.push_ok(
        r#"<csw:TransactionResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
            xmlns:dc="http://purl.org/dc/elements/1.1/">
          <csw:TransactionSummary>
            <csw:totalInserted>2</csw:totalInserted>
          </csw:TransactionSummary>
          <csw:InsertResult>
            <csw:BriefRecord><dc:identifier>srv-1</dc:identifier></csw:BriefRecord>
          </csw:InsertResult>
          <csw:InsertResult>
            <csw:BriefRecord><dc:identifier>srv-2</dc:identifier></csw:BriefRecord>
          </csw:InsertResult>
        </csw:TransactionResponse>"#,
    );
    transport.push_ok(
        r#"<csw:GetRecordByIdResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
            xmlns:dc="http://purl.org/dc/elements/1.1/">
          <csw:Record><dc:identifier>srv-1</dc:identifier></csw:Record>
          <csw:Record><dc:identifier>srv-2</dc:identifier></csw:Record>
        </csw:GetRecordByIdResponse>"#,
    );

    let source = CswSource::with_transport(config(), transport.clone()).await;
    let response = source
        .create(vec![
            InputRecord::new("local-1").with_attribute("title", "one"),
            InputRecord::new("local-2").with_attribute("title", "two"),
            InputRecord::new("local-3").with_attribute("title", "three"),
        ])
        .await
        .unwrap();

    assert_eq!(response.records.len(), 2);
    assert_eq!(response.records[0].id, "srv-1");
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].id, "local-3");

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[1].contains("csw:Insert"));
    assert!(requests[2].contains("<csw:Id>srv-1</csw:Id>"));
}

#[tokio::test]
async fn update_builds_one_action_per_record_and_requeries() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);
    transport.push_ok(
        r#"<csw:TransactionResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2">
          <csw:TransactionSummary>
            <csw:totalUpdated>2</csw:totalUpdated>
          </csw:TransactionSummary>
        </csw:TransactionResponse>"#,
    );
    transport.push_ok(
        r#"<csw:GetRecordByIdResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
            xmlns:dc="http://purl.org/dc/elements/1.1/">
          <csw:Record><dc:identifier>rec-1</dc:identifier><dc:title>one</dc:title></csw:Record>
          <csw:Record><dc:identifier>rec-2</dc:identifier><dc:title>two</dc:title></csw:Record>
        </csw:GetRecordByIdResponse>"#,
    );

    let source = CswSource::with_transport(config(), transport.clone()).await;
    let response = source
        .update(vec![
            InputRecord::new("rec-1").with_attribute("title", "one"),
            InputRecord::new("rec-2").with_attribute("title", "two"),
        ])
        .await
        .unwrap();

    assert_eq!(response.records.len(), 2);
    assert!(response.errors.is_empty());

    let body = &transport.requests()[1];
    assert_eq!(body.matches("<csw:Update>").count(), 2);
    // Each action is constrained on the configured identifier property.
    assert_eq!(body.matches("PropertyIsEqualTo").count(), 4); // open + close per action
    assert!(body.contains(">identifier<"));
}

#[tokio::test]
async fn update_count_mismatch_is_batch_failure() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);
    transport.push_ok(
        r#"<csw:TransactionResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2">
          <csw:TransactionSummary>
            <csw:totalUpdated>1</csw:totalUpdated>
          </csw:TransactionSummary>
        </csw:TransactionResponse>"#,
    );

    let source = CswSource::with_transport(config(), transport.clone()).await;
    let err = source
        .update(vec![
            InputRecord::new("rec-1").with_attribute("title", "one"),
            InputRecord::new("rec-2").with_attribute("title", "two"),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::Ingest(_)));
    assert!(err.to_string().contains("requested 2"));
}

#[tokio::test]
async fn delete_fails_fast_without_transaction_support() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES_CQL_ONLY);

    let source = CswSource::with_transport(config(), transport.clone()).await;
    let err = source
        .delete(vec!["rec-1".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::UnsupportedOperation(_)));
    // The refusal happened before any transaction hit the wire.
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn delete_sends_one_action_per_identifier() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);
    transport.push_ok(
        r#"<csw:TransactionResponse xmlns:csw="http://www.opengis.net/cat/csw/2.0.2">
          <csw:TransactionSummary>
            <csw:totalDeleted>2</csw:totalDeleted>
          </csw:TransactionSummary>
        </csw:TransactionResponse>"#,
    );

    let source = CswSource::with_transport(config(), transport.clone()).await;
    let response = source
        .delete(vec!["rec-1".to_string(), "rec-2".to_string()])
        .await
        .unwrap();

    assert!(response.errors.is_empty());
    let body = &transport.requests()[1];
    assert_eq!(body.matches("<csw:Delete").count(), 2);
    assert!(body.contains(">rec-1<"));
    assert!(body.contains(">rec-2<"));
}

#[tokio::test]
async fn post_transform_runs_on_mapped_records() {
    let transport = MockTransport::new();
    transport.push_ok(CAPABILITIES);
    transport.push_ok(RECORDS_RESPONSE);

    let source = CswSource::with_transport(config(), transport.clone()).await;
    source.set_post_transform(|mut record| {
        record
            .attributes
            .insert("tagged".to_string(), vec!["yes".to_string()]);
        record
    });

    let response = source
        .query(&Predicate::like("title", "x%"), QueryOptions::default())
        .await
        .unwrap();

    assert!(response
        .records
        .iter()
        .all(|r| r.attributes.contains_key("tagged")));
}
