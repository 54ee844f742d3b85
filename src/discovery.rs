// Discovery module - resolves template/host/item identifier sets
//
// Implements the chained lookup pipeline:
// 1. Template filters resolve template ids
// 2. Hosts are found via template linkage and via direct host filters (union)
// 3. Items are found on the resolved hosts, per configured item filter
//
// Query failures degrade a stage to partial results; only an empty host set
// without the all-hosts opt-in aborts the run.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::{ItemRecord, ZabbixApi};
use crate::config::{Configuration, FilterSpec, ItemConfig};

/// Errors that abort discovery
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(
        "no hosts resolved by the configured filters; \
         set 'all_hosts: true' to scan items on every host"
    )]
    NoHostsResolved,
}

/// Mapping of entity id to display name, unique by id
///
/// Populated incrementally during discovery and read-only afterwards.
/// Re-adding an existing id overwrites the name but never duplicates the
/// entry, so multiple filter passes union cleanly.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: HashMap<String, String>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Adds or refreshes one entity. Idempotent by id.
    pub fn insert(&mut self, id: &str, name: &str) {
        self.entries.insert(id.to_string(), name.to_string());
    }

    /// Display name for an id, if the entity was discovered
    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    /// All known ids, in no particular order
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One configured item filter together with the items it resolved
#[derive(Debug)]
pub struct ItemGroup {
    pub config: ItemConfig,
    pub items: Vec<ItemRecord>,
}

/// Result of a discovery run: the three catalogs plus the per-filter item
/// groups the pipeline iterates over. Frozen once returned.
#[derive(Debug)]
pub struct Discovery {
    pub templates: Catalog,
    pub hosts: Catalog,
    pub items: Catalog,
    pub groups: Vec<ItemGroup>,
}

/// Runs the three-stage discovery pipeline
///
/// # Arguments
/// * `api` - Query capability
/// * `configuration` - Validated configuration with the filter lists
///
/// # Returns
/// * `Ok(Discovery)` - Resolved catalogs; possibly with zero items
/// * `Err(DiscoveryError)` - No hosts resolved and all-hosts not enabled
pub async fn discover(
    api: &dyn ZabbixApi,
    configuration: &Configuration,
) -> Result<Discovery, DiscoveryError> {
    let mut templates = Catalog::new();
    let mut hosts = Catalog::new();
    let mut items = Catalog::new();
    let mut groups = Vec::with_capacity(configuration.items.len());

    // Stage 1: templates
    for spec in &configuration.templates {
        match api.templates(spec).await {
            Ok(records) => {
                debug!("Template filter matched {} template(s)", records.len());
                for record in records {
                    templates.insert(&record.template_id, &record.name);
                }
            }
            Err(e) => {
                error!("Template query failed, continuing with partial catalog: {e}");
            }
        }
    }
    info!("Resolved {} template(s)", templates.len());

    // Stage 2: hosts, via template linkage and via direct filters. Both
    // paths feed the same catalog; membership is by host id.
    if !templates.is_empty() {
        let template_ids = templates.ids();
        match api.hosts(&template_ids, &FilterSpec::default()).await {
            Ok(records) => {
                debug!(
                    "Template linkage resolved {} host(s) from {} template(s)",
                    records.len(),
                    template_ids.len()
                );
                for record in records {
                    debug!(
                        "Discovered host {} '{}' (technical name '{}')",
                        record.host_id, record.name, record.host
                    );
                    hosts.insert(&record.host_id, &record.name);
                }
            }
            Err(e) => {
                error!("Template-linked host query failed, continuing: {e}");
            }
        }
    }

    for spec in &configuration.hosts {
        match api.hosts(&[], spec).await {
            Ok(records) => {
                debug!("Host filter matched {} host(s)", records.len());
                for record in records {
                    hosts.insert(&record.host_id, &record.name);
                }
            }
            Err(e) => {
                error!("Host query failed, continuing with partial catalog: {e}");
            }
        }
    }
    info!("Resolved {} host(s)", hosts.len());

    // Scanning every item on the server is expensive enough that it must be
    // an explicit operator choice, never a silent fallback.
    if hosts.is_empty() {
        if !configuration.all_hosts {
            return Err(DiscoveryError::NoHostsResolved);
        }
        warn!("No hosts resolved; scanning items on ALL hosts (all_hosts enabled)");
    }

    // Stage 3: items on the resolved hosts, one query per item filter
    let host_scope = hosts.ids();
    for item_config in &configuration.items {
        let resolved = match api.items(&host_scope, &item_config.filter).await {
            Ok(records) => records,
            Err(e) => {
                error!("Item query failed, skipping this item filter: {e}");
                Vec::new()
            }
        };

        if resolved.is_empty() {
            warn!("Item filter matched no items: {:?}", item_config.filter);
        }
        for record in &resolved {
            items.insert(&record.item_id, &record.name);
        }

        groups.push(ItemGroup {
            config: item_config.clone(),
            items: resolved,
        });
    }
    info!("Resolved {} item(s)", items.len());

    Ok(Discovery {
        templates,
        hosts,
        items,
        groups,
    })
}
