//! The transactional write path: create, update, delete.
//!
//! Every write requires the provider to advertise the Transaction
//! operation; the check runs before any network call. Create requeries the
//! store for server-assigned identifiers and reports unacknowledged inputs
//! as per-item failures; update treats a count mismatch as a batch-level
//! failure.

use crate::error::{Result, SourceError};
use crate::record::{IngestItemError, IngestResponse};
use crate::session::QuerySession;
use csw_protocol::{
    parse_transaction_response, ComparisonOp, InputRecord, Transaction, TransactionOp, WireFilter,
};

/// Placeholder id used in failure reports for inputs without one.
const UNASSIGNED_ID: &str = "<unassigned>";

pub(crate) struct TransactionEngine<'a> {
    pub session: QuerySession<'a>,
}

impl TransactionEngine<'_> {
    /// Insert records, returning canonical stored records for every
    /// acknowledged identifier and a per-item error for the rest.
    pub async fn create(&self, records: Vec<InputRecord>) -> Result<IngestResponse> {
        self.ensure_transactions_supported("create")?;
        if records.is_empty() {
            return Ok(IngestResponse::default());
        }

        let tx = Transaction::new(vec![TransactionOp::Insert {
            type_name: self.session.config.insert_type_name.clone(),
            records: records.clone(),
        }]);
        let body = self.session.send_checked(&tx.to_xml()?).await?;
        let summary = parse_transaction_response(&body)?;

        // The acknowledgement carries no client correlation; identifiers
        // are matched to inputs positionally.
        let confirmed = &summary.inserted_ids;
        let errors: Vec<IngestItemError> = records
            .iter()
            .skip(confirmed.len())
            .map(|input| IngestItemError {
                id: input
                    .id
                    .clone()
                    .unwrap_or_else(|| UNASSIGNED_ID.to_string()),
                message: "failed to create: server did not acknowledge an identifier".to_string(),
            })
            .collect();

        tracing::debug!(
            requested = records.len(),
            confirmed = confirmed.len(),
            "create transaction acknowledged"
        );

        let stored = self.session.fetch_by_ids(confirmed).await?;
        Ok(IngestResponse {
            records: stored,
            errors,
        })
    }

    /// Update records in place, one action per record, matched on the
    /// configured identifier property.
    pub async fn update(&self, records: Vec<InputRecord>) -> Result<IngestResponse> {
        self.ensure_transactions_supported("update")?;
        if records.is_empty() {
            return Ok(IngestResponse::default());
        }

        let mut errors = Vec::new();
        let mut ops = Vec::new();
        let mut ids = Vec::new();
        for record in records {
            match record.id.clone() {
                Some(id) => {
                    ops.push(TransactionOp::Update {
                        constraint: self.id_constraint(&id),
                        record,
                    });
                    ids.push(id);
                }
                None => errors.push(IngestItemError {
                    id: UNASSIGNED_ID.to_string(),
                    message: "cannot update a record without an identifier".to_string(),
                }),
            }
        }
        if ops.is_empty() {
            return Ok(IngestResponse {
                records: Vec::new(),
                errors,
            });
        }

        let requested = ops.len() as u64;
        let body = self
            .session
            .send_checked(&Transaction::new(ops).to_xml()?)
            .await?;
        let summary = parse_transaction_response(&body)?;

        if summary.updated != requested {
            return Err(SourceError::Ingest(format!(
                "update count mismatch: requested {requested}, server reported {}",
                summary.updated
            )));
        }

        let stored = self.session.fetch_by_ids(&ids).await?;
        Ok(IngestResponse {
            records: stored,
            errors,
        })
    }

    /// Delete records by identifier, one action per id.
    pub async fn delete(&self, ids: Vec<String>) -> Result<IngestResponse> {
        self.ensure_transactions_supported("delete")?;
        if ids.is_empty() {
            return Ok(IngestResponse::default());
        }

        let ops = ids
            .iter()
            .map(|id| TransactionOp::Delete {
                type_name: self.session.config.insert_type_name.clone(),
                constraint: self.id_constraint(id),
            })
            .collect();

        let requested = ids.len() as u64;
        let body = self
            .session
            .send_checked(&Transaction::new(ops).to_xml()?)
            .await?;
        let summary = parse_transaction_response(&body)?;

        if summary.deleted != requested {
            return Err(SourceError::Ingest(format!(
                "delete count mismatch: requested {requested}, server reported {}",
                summary.deleted
            )));
        }
        Ok(IngestResponse::default())
    }

    /// Equality constraint on the configured primary-key attribute.
    fn id_constraint(&self, id: &str) -> WireFilter {
        WireFilter::Comparison {
            op: ComparisonOp::EqualTo,
            property: self.session.config.id_property.clone(),
            literal: id.to_string(),
            match_case: true,
        }
    }

    fn ensure_transactions_supported(&self, operation: &str) -> Result<()> {
        if self.session.model.transactions_supported() {
            Ok(())
        } else {
            Err(SourceError::UnsupportedOperation(format!(
                "{operation}: provider does not declare Transaction support"
            )))
        }
    }
}
