// JSON-RPC client - the HTTP implementation of the query capability
//
// Speaks the Zabbix API protocol:
// 1. POST application/json-rpc envelopes to api_jsonrpc.php
// 2. Authenticate once via apiinfo.version + user.login, keep the token
// 3. Issue template.get / host.get / item.get / history.get queries
//
// Request ids come from a monotonic counter owned by this client, so two
// clients never share id state.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;
use tracing::debug;

use super::{ApiError, HistorySample, HostRecord, ItemRecord, TemplateRecord, ZabbixApi};
use crate::config::FilterSpec;

const CONTENT_TYPE: &str = "application/json-rpc";
const JSONRPC_VERSION: &str = "2.0";

/// Zabbix API client over HTTP
///
/// Holds the endpoint URL, the reused HTTP connection pool, and the session
/// token obtained by `login`. All query methods require a prior successful
/// login; the server rejects unauthenticated data queries on its own.
pub struct ApiClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    server_version: Option<String>,
    request_id: AtomicI64,
}

/// JSON-RPC request envelope
#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a P,
    id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<&'a str>,
}

/// JSON-RPC response envelope
#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: String,
}

#[derive(Serialize)]
struct LoginParams<'a> {
    user: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct TemplateGetParams<'a> {
    output: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a HashMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a HashMap<String, Vec<String>>>,
    #[serde(rename = "searchWildcardsEnabled")]
    search_wildcards_enabled: bool,
}

#[derive(Serialize)]
struct HostGetParams<'a> {
    output: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    templateids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a HashMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a HashMap<String, Vec<String>>>,
    #[serde(rename = "searchWildcardsEnabled")]
    search_wildcards_enabled: bool,
    sortfield: &'static [&'static str],
}

#[derive(Serialize)]
struct ItemGetParams<'a> {
    output: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hostids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a HashMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a HashMap<String, Vec<String>>>,
    #[serde(rename = "searchWildcardsEnabled")]
    search_wildcards_enabled: bool,
    sortfield: &'static [&'static str],
}

#[derive(Serialize)]
struct HistoryGetParams<'a> {
    history: i32,
    itemids: &'a [&'a str],
    time_from: i64,
    time_till: i64,
    output: &'static str,
    sortfield: &'static str,
    sortorder: &'static str,
}

impl ApiClient {
    /// Creates a client for the given JSON-RPC endpoint.
    ///
    /// # Arguments
    /// * `url` - Full endpoint URL, e.g. "http://host/zabbix/api_jsonrpc.php"
    pub fn new(url: &str) -> Self {
        ApiClient {
            http: reqwest::Client::new(),
            url: url.to_string(),
            token: None,
            server_version: None,
            request_id: AtomicI64::new(1),
        }
    }

    /// Server version string reported by apiinfo.version, once logged in
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Authenticates against the server and stores the session token.
    ///
    /// Performs the two-step handshake: an unauthenticated apiinfo.version
    /// call (recording the server version), then user.login. A token shorter
    /// than five characters is treated as a refused login, matching the
    /// server's behavior of returning an empty result on bad credentials.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ApiError> {
        debug!("Reading server version from {}", self.url);
        let version: String = self.call("apiinfo.version", &serde_json::json!({})).await?;
        debug!("Server reports API version {}", version);
        self.server_version = Some(version);

        debug!("Authenticating as user '{}'", username);
        let token: String = self
            .call(
                "user.login",
                &LoginParams {
                    user: username,
                    password,
                },
            )
            .await?;

        if token.len() < 5 {
            return Err(ApiError::Auth(format!(
                "server returned an invalid session token for user '{username}'"
            )));
        }

        debug!("Received session token");
        self.token = Some(token);
        Ok(())
    }

    /// Issues one JSON-RPC call and decodes the result member.
    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T, ApiError>
    where
        P: Serialize + Sync,
        T: DeserializeOwned,
    {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let envelope = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id,
            auth: self.token.as_deref(),
        };

        let body = serde_json::to_vec(&envelope)?;
        debug!(
            "API call {} id={} ({} request bytes)",
            method,
            id,
            body.len()
        );

        let start = Instant::now();
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        debug!(
            "API call {} answered in {:.1}ms ({} response bytes)",
            method,
            start.elapsed().as_secs_f64() * 1000.0,
            text.len()
        );

        let decoded: RpcResponse<T> = serde_json::from_str(&text)?;
        if let Some(error) = decoded.error {
            return Err(ApiError::Protocol {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        decoded.result.ok_or_else(|| ApiError::Protocol {
            code: 0,
            message: "response carries neither result nor error".to_string(),
            data: String::new(),
        })
    }
}

/// Maps an empty criteria map to None so serde omits the field entirely.
/// The server treats `"filter": {}` differently from an absent filter.
fn non_empty(map: &HashMap<String, Vec<String>>) -> Option<&HashMap<String, Vec<String>>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn non_empty_ids(ids: &[String]) -> Option<&[String]> {
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

#[async_trait]
impl ZabbixApi for ApiClient {
    async fn templates(&self, filter: &FilterSpec) -> Result<Vec<TemplateRecord>, ApiError> {
        let params = TemplateGetParams {
            output: "extend",
            filter: non_empty(&filter.filter),
            search: non_empty(&filter.search),
            search_wildcards_enabled: !filter.search.is_empty(),
        };
        self.call("template.get", &params).await
    }

    async fn hosts(
        &self,
        template_ids: &[String],
        filter: &FilterSpec,
    ) -> Result<Vec<HostRecord>, ApiError> {
        let params = HostGetParams {
            output: "extend",
            templateids: non_empty_ids(template_ids),
            filter: non_empty(&filter.filter),
            search: non_empty(&filter.search),
            search_wildcards_enabled: !filter.search.is_empty(),
            sortfield: &["hostid"],
        };
        self.call("host.get", &params).await
    }

    async fn items(
        &self,
        host_ids: &[String],
        filter: &FilterSpec,
    ) -> Result<Vec<ItemRecord>, ApiError> {
        let params = ItemGetParams {
            output: "extend",
            hostids: non_empty_ids(host_ids),
            filter: non_empty(&filter.filter),
            search: non_empty(&filter.search),
            search_wildcards_enabled: !filter.search.is_empty(),
            sortfield: &["hostid"],
        };
        self.call("item.get", &params).await
    }

    async fn history(
        &self,
        item_id: &str,
        value_type: i32,
        from: i64,
        till: i64,
    ) -> Result<Vec<HistorySample>, ApiError> {
        let params = HistoryGetParams {
            history: value_type,
            itemids: &[item_id],
            time_from: from,
            time_till: till,
            output: "extend",
            sortfield: "clock",
            sortorder: "ASC",
        };
        self.call("history.get", &params).await
    }
}
