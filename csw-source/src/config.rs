//! Source configuration and the typed reconfiguration patch.
//!
//! Reconfiguration goes through [`ConfigPatch`]: every setting is an
//! `Option`, unset keys retain their prior value, and applying a patch
//! yields a fresh configuration so in-flight calls keep the one they
//! started with. The forced-spatial-operator override additionally treats a
//! blank string as "clear the override".

use crate::error::SourceError;
use csw_filter::{AxisOrder, SpatialPredicateOp, TranslationOptions};
use csw_protocol::{CSW_NS, CSW_RECORD_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for one federated CSW source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfiguration {
    /// Source identifier used for record attribution.
    pub id: String,
    /// Service endpoint URL.
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Path to a PEM bundle (certificate + key) for TLS client auth.
    pub client_identity_pem: Option<String>,
    /// Coordinate order the server expects in GML operands.
    pub axis_order: AxisOrder,
    /// Abstraction-layer property name → provider property name.
    pub property_map: BTreeMap<String, String>,
    /// When set, every spatial predicate is rewritten to this operator.
    pub forced_spatial_operator: Option<SpatialPredicateOp>,
    /// Availability poll interval, in minutes.
    pub poll_interval_minutes: u64,
    pub connect_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    /// Output schema requested unless a query overrides it.
    pub output_schema: String,
    /// Send CQL text even when the server declares structured Filter.
    pub force_cql: bool,
    /// Provider property holding record identifiers.
    pub id_property: String,
    /// Type name tagged onto inserted records.
    pub insert_type_name: String,
}

impl Default for SourceConfiguration {
    fn default() -> Self {
        Self {
            id: "csw".to_string(),
            endpoint: String::new(),
            username: None,
            password: None,
            client_identity_pem: None,
            axis_order: AxisOrder::LonLat,
            property_map: BTreeMap::new(),
            forced_spatial_operator: None,
            poll_interval_minutes: 5,
            connect_timeout_ms: 30_000,
            receive_timeout_ms: 30_000,
            output_schema: CSW_NS.to_string(),
            force_cql: false,
            id_property: "identifier".to_string(),
            insert_type_name: CSW_RECORD_TYPE.to_string(),
        }
    }
}

impl SourceConfiguration {
    /// Apply a partial update, returning the resulting configuration.
    pub fn apply(&self, patch: &ConfigPatch) -> Result<SourceConfiguration, SourceError> {
        let mut next = self.clone();
        if let Some(endpoint) = &patch.endpoint {
            next.endpoint = endpoint.clone();
        }
        if let Some(username) = &patch.username {
            next.username = Some(username.clone()).filter(|u| !u.is_empty());
        }
        if let Some(password) = &patch.password {
            next.password = Some(password.clone()).filter(|p| !p.is_empty());
        }
        if let Some(pem) = &patch.client_identity_pem {
            next.client_identity_pem = Some(pem.clone()).filter(|p| !p.is_empty());
        }
        if let Some(axis_order) = patch.axis_order {
            next.axis_order = axis_order;
        }
        if let Some(map) = &patch.property_map {
            next.property_map = map.clone();
        }
        if let Some(forced) = &patch.forced_spatial_operator {
            next.forced_spatial_operator = parse_forced_operator(forced)?;
        }
        if let Some(minutes) = patch.poll_interval_minutes {
            next.poll_interval_minutes = minutes;
        }
        if let Some(ms) = patch.connect_timeout_ms {
            next.connect_timeout_ms = ms;
        }
        if let Some(ms) = patch.receive_timeout_ms {
            next.receive_timeout_ms = ms;
        }
        if let Some(schema) = &patch.output_schema {
            next.output_schema = schema.clone();
        }
        if let Some(force_cql) = patch.force_cql {
            next.force_cql = force_cql;
        }
        if let Some(id_property) = &patch.id_property {
            next.id_property = id_property.clone();
        }
        if let Some(type_name) = &patch.insert_type_name {
            next.insert_type_name = type_name.clone();
        }
        Ok(next)
    }

    /// Translation knobs derived from this configuration.
    pub fn translation_options(&self) -> TranslationOptions {
        TranslationOptions {
            property_map: self.property_map.clone(),
            axis_order: self.axis_order,
            forced_spatial_operator: self.forced_spatial_operator,
            id_property: self.id_property.clone(),
            ..TranslationOptions::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes.max(1) * 60)
    }
}

/// Partial configuration update. Unset fields retain the prior value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigPatch {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_identity_pem: Option<String>,
    pub axis_order: Option<AxisOrder>,
    pub property_map: Option<BTreeMap<String, String>>,
    /// Operator token; a blank string clears the override.
    pub forced_spatial_operator: Option<String>,
    pub poll_interval_minutes: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
    pub output_schema: Option<String>,
    pub force_cql: Option<bool>,
    pub id_property: Option<String>,
    pub insert_type_name: Option<String>,
}

fn parse_forced_operator(token: &str) -> Result<Option<SpatialPredicateOp>, SourceError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    SpatialPredicateOp::from_name(trimmed)
        .map(Some)
        .ok_or_else(|| {
            SourceError::Config(format!("unknown spatial operator '{trimmed}' in patch"))
        })
}
