// In-memory query capability used by discovery, baseline and pipeline tests.
//
// Returns canned records, serves history samples by time range, and records
// every call so tests can assert on the issued query windows and scopes.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{ApiError, HistorySample, HostRecord, ItemRecord, TemplateRecord, ZabbixApi};
use crate::config::FilterSpec;

#[derive(Default)]
pub struct MockApi {
    pub templates: Vec<TemplateRecord>,

    /// Hosts served for template-linked queries (non-empty template id scope)
    pub hosts_by_template: Vec<HostRecord>,

    /// Hosts served for direct filtered queries (empty template id scope)
    pub hosts_by_filter: Vec<HostRecord>,

    pub items: Vec<ItemRecord>,

    /// Sample pool; history() serves the subset matching item id and range
    pub history: Vec<HistorySample>,

    pub fail_templates: bool,
    pub fail_history: bool,

    /// Recorded (item_id, from, till) of every history call
    pub history_calls: Mutex<Vec<(String, i64, i64)>>,

    /// Recorded host id scopes of every item call
    pub item_scopes: Mutex<Vec<Vec<String>>>,
}

fn query_failed() -> ApiError {
    ApiError::Protocol {
        code: -32500,
        message: "simulated failure".to_string(),
        data: String::new(),
    }
}

#[async_trait]
impl ZabbixApi for MockApi {
    async fn templates(&self, _filter: &FilterSpec) -> Result<Vec<TemplateRecord>, ApiError> {
        if self.fail_templates {
            return Err(query_failed());
        }
        Ok(self.templates.clone())
    }

    async fn hosts(
        &self,
        template_ids: &[String],
        _filter: &FilterSpec,
    ) -> Result<Vec<HostRecord>, ApiError> {
        if template_ids.is_empty() {
            Ok(self.hosts_by_filter.clone())
        } else {
            Ok(self.hosts_by_template.clone())
        }
    }

    async fn items(
        &self,
        host_ids: &[String],
        _filter: &FilterSpec,
    ) -> Result<Vec<ItemRecord>, ApiError> {
        self.item_scopes.lock().unwrap().push(host_ids.to_vec());
        Ok(self.items.clone())
    }

    async fn history(
        &self,
        item_id: &str,
        _value_type: i32,
        from: i64,
        till: i64,
    ) -> Result<Vec<HistorySample>, ApiError> {
        self.history_calls
            .lock()
            .unwrap()
            .push((item_id.to_string(), from, till));
        if self.fail_history {
            return Err(query_failed());
        }
        Ok(self
            .history
            .iter()
            .filter(|s| s.item_id == item_id && s.clock >= from && s.clock <= till)
            .cloned()
            .collect())
    }
}

pub fn template(id: &str, name: &str) -> TemplateRecord {
    TemplateRecord {
        template_id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn host(id: &str, name: &str) -> HostRecord {
    HostRecord {
        host_id: id.to_string(),
        host: name.to_string(),
        name: name.to_string(),
    }
}

pub fn item(id: &str, host_id: &str, key: &str) -> ItemRecord {
    ItemRecord {
        item_id: id.to_string(),
        host_id: host_id.to_string(),
        key: key.to_string(),
        value_type: 0,
        name: key.to_string(),
    }
}

pub fn sample(item_id: &str, value: &str, clock: i64) -> HistorySample {
    HistorySample {
        item_id: item_id.to_string(),
        value: value.to_string(),
        clock,
        ns: 0,
    }
}
