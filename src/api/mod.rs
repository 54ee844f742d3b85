// API module - defines the query capability consumed by discovery and comparison
//
// This module provides the trait every Zabbix query backend must implement,
// the wire-level record types, and the error taxonomy shared by all queries.
// The HTTP JSON-RPC implementation lives in `client`; tests substitute an
// in-memory mock.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::config::FilterSpec;

pub mod client;

#[cfg(test)]
pub mod mock;

/// Errors that can occur during a Zabbix API call
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {code}: {message} ({data})")]
    Protocol {
        code: i64,
        message: String,
        data: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Core trait for querying the monitoring backend.
///
/// Each call is a single round trip returning either a (possibly empty)
/// result list or an `ApiError`. An empty list is never an error; "no data"
/// and "query failed" are distinct outcomes, and callers decide whether a
/// failure aborts their stage or degrades it.
#[async_trait]
pub trait ZabbixApi: Send + Sync {
    /// Looks up templates matching the filter specification.
    async fn templates(&self, filter: &FilterSpec) -> Result<Vec<TemplateRecord>, ApiError>;

    /// Looks up hosts, scoped to `template_ids` when non-empty, and further
    /// narrowed by the filter specification.
    async fn hosts(
        &self,
        template_ids: &[String],
        filter: &FilterSpec,
    ) -> Result<Vec<HostRecord>, ApiError>;

    /// Looks up items, scoped to `host_ids` when non-empty. An empty scope
    /// queries every host the API user can see; callers gate that explicitly.
    async fn items(
        &self,
        host_ids: &[String],
        filter: &FilterSpec,
    ) -> Result<Vec<ItemRecord>, ApiError>;

    /// Fetches history samples for one item in `[from, till]` (epoch seconds).
    /// `value_type` selects the history table (0 float, 3 unsigned, ...).
    async fn history(
        &self,
        item_id: &str,
        value_type: i32,
        from: i64,
        till: i64,
    ) -> Result<Vec<HistorySample>, ApiError>;
}

/// One template as returned by template.get
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateRecord {
    #[serde(rename = "templateid")]
    pub template_id: String,

    /// Visible template name
    #[serde(default)]
    pub name: String,
}

/// One host as returned by host.get
#[derive(Debug, Clone, Deserialize)]
pub struct HostRecord {
    #[serde(rename = "hostid")]
    pub host_id: String,

    /// Technical host name (what the trapper knows the host as)
    #[serde(default)]
    pub host: String,

    /// Visible display name
    #[serde(default)]
    pub name: String,
}

/// One item as returned by item.get
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
    #[serde(rename = "itemid")]
    pub item_id: String,

    #[serde(rename = "hostid")]
    pub host_id: String,

    /// Item key, e.g. "system.cpu.load[percpu,avg1]"
    #[serde(rename = "key_")]
    pub key: String,

    /// History table selector: 0 float, 1 char, 2 log, 3 unsigned, 4 text
    #[serde(rename = "value_type", deserialize_with = "i32_from_string")]
    pub value_type: i32,

    #[serde(default)]
    pub name: String,
}

/// One history sample as returned by history.get
///
/// The value stays a decimal string on the wire; parsing to f64 happens at
/// the point of use, where a parse failure degrades to a missing sample.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistorySample {
    #[serde(rename = "itemid", default)]
    pub item_id: String,

    #[serde(default)]
    pub value: String,

    /// Sample timestamp, seconds since epoch
    #[serde(deserialize_with = "i64_from_string")]
    pub clock: i64,

    /// Sub-second offset in nanoseconds
    #[serde(default, deserialize_with = "i64_from_string")]
    pub ns: i64,
}

// Zabbix encodes numeric fields as JSON strings ("clock": "1700000000").
// These helpers decode both the string and the plain-number form.

fn i64_from_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        String(String),
        Int(i64),
    }

    match StringOrInt::deserialize(deserializer)? {
        StringOrInt::String(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrInt::Int(i) => Ok(i),
    }
}

fn i32_from_string<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    i64_from_string(deserializer).map(|v| v as i32)
}
