// Configuration module - handles YAML configuration loading and validation
//
// This module is responsible for:
// 1. Reading the configuration file from disk
// 2. Parsing the YAML into strongly-typed structures
// 3. Validating filter fields and algorithm parameters at load time
// 4. Providing typed access to API credentials and discovery filters

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML in configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unrecognized {kind} filter field: '{field}'")]
    UnknownFilterField { kind: &'static str, field: String },

    #[error("no item filters configured, nothing to process")]
    NoItemFilters,

    #[error("invalid algorithm parameters for item filter #{index}: {reason}")]
    InvalidAlgorithm { index: usize, reason: String },
}

// Filter fields the Zabbix API accepts per entity kind. Anything outside
// these sets is rejected at load time instead of being silently ignored by
// the server.
const TEMPLATE_FIELDS: &[&str] = &["host", "name", "templateid"];
const HOST_FIELDS: &[&str] = &["host", "name", "hostid"];
const ITEM_FIELDS: &[&str] = &["key_", "name", "itemid"];

/// Top-level configuration structure loaded from the YAML file
///
/// # Example Configuration
/// ```yaml
/// zabbix:
///   api:
///     url: "http://127.0.0.1/zabbix/api_jsonrpc.php"
///     username: "api-user"
///     password: "api-pw"
///
/// templates:
///   - filter: { host: ["Template OS Linux"] }
///
/// hosts:
///   - search: { host: ["web*"] }
///
/// items:
///   - search: { key_: ["system.cpu.load*"] }
///     postfix: ".wow"
///     algorithm:
///       week_over_week:
///         weeks: 3
///         window: 3600
///
/// all_hosts: false
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Zabbix server connection settings
    pub zabbix: ZabbixSettings,

    /// Template filters: hosts are discovered via the templates they link to
    #[serde(default)]
    pub templates: Vec<FilterSpec>,

    /// Host filters: hosts discovered directly, unioned with template linkage
    #[serde(default)]
    pub hosts: Vec<FilterSpec>,

    /// Item filters: each carries its own algorithm parameters and output postfix
    #[serde(default)]
    pub items: Vec<ItemConfig>,

    /// Opt-in to unscoped item discovery when no host resolved.
    /// Potentially expensive, so it is never implicit.
    #[serde(default)]
    pub all_hosts: bool,
}

/// Connection block for the Zabbix server
#[derive(Debug, Clone, Deserialize)]
pub struct ZabbixSettings {
    pub api: ApiSettings,
}

/// Zabbix API endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Full JSON-RPC endpoint, e.g. "http://host/zabbix/api_jsonrpc.php"
    pub url: String,
    pub username: String,
    pub password: String,
}

/// One discovery filter for an entity kind
///
/// `filter` matches fields exactly (equals-one-of), `search` matches with
/// wildcards (matches-one-of). Both map a field name to the list of
/// acceptable values. Results of multiple filter specs are unioned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub filter: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub search: HashMap<String, Vec<String>>,
}

/// One configured item filter with its processing parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ItemConfig {
    #[serde(flatten)]
    pub filter: FilterSpec,

    /// Appended to the item key in every output line, e.g. ".wow"
    #[serde(default)]
    pub postfix: String,

    #[serde(with = "serde_yaml::with::singleton_map")]
    pub algorithm: Algorithm,
}

/// Closed set of comparison algorithms
///
/// Kept as a tagged enum so the dispatch site can match exhaustively and
/// new algorithms cannot be half-wired.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Compare the latest sample against the mean of the closest samples at
    /// the same time-of-day over `weeks` prior weeks. `window` is the full
    /// search window width in seconds.
    WeekOverWeek { weeks: u32, window: i64 },
}

/// Reads and validates a configuration file
///
/// # Arguments
/// * `path` - Path to the YAML configuration file
///
/// # Returns
/// * `Ok(Configuration)` - Parsed and validated configuration
/// * `Err(ConfigError)` - File unreadable, YAML malformed, or validation failed
pub fn load<P: AsRef<Path>>(path: P) -> Result<Configuration, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from {}", path.display());

    let data = std::fs::read_to_string(path)?;
    let configuration: Configuration = serde_yaml::from_str(&data)?;

    validate(&configuration)?;

    info!(
        "Configuration loaded: {} template filter(s), {} host filter(s), {} item filter(s)",
        configuration.templates.len(),
        configuration.hosts.len(),
        configuration.items.len()
    );
    debug!("Parsed configuration: {:?}", configuration);

    Ok(configuration)
}

/// Validates filter fields and algorithm parameters
///
/// Runs before any network I/O so operator mistakes surface immediately.
fn validate(configuration: &Configuration) -> Result<(), ConfigError> {
    for spec in &configuration.templates {
        check_fields("template", spec, TEMPLATE_FIELDS)?;
    }
    for spec in &configuration.hosts {
        check_fields("host", spec, HOST_FIELDS)?;
    }
    for item in &configuration.items {
        check_fields("item", &item.filter, ITEM_FIELDS)?;
    }

    if configuration.items.is_empty() {
        return Err(ConfigError::NoItemFilters);
    }

    for (index, item) in configuration.items.iter().enumerate() {
        let Algorithm::WeekOverWeek { weeks, window } = &item.algorithm;
        if *weeks == 0 {
            return Err(ConfigError::InvalidAlgorithm {
                index,
                reason: "weeks must be at least 1".to_string(),
            });
        }
        if *window <= 0 {
            return Err(ConfigError::InvalidAlgorithm {
                index,
                reason: format!("window must be positive, got {window}"),
            });
        }
    }

    Ok(())
}

/// Checks that every filter/search field of a spec is recognized for the kind
fn check_fields(
    kind: &'static str,
    spec: &FilterSpec,
    allowed: &[&str],
) -> Result<(), ConfigError> {
    for field in spec.filter.keys().chain(spec.search.keys()) {
        if !allowed.contains(&field.as_str()) {
            return Err(ConfigError::UnknownFilterField {
                kind,
                field: field.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
zabbix:
  api:
    url: "http://127.0.0.1/zabbix/api_jsonrpc.php"
    username: "zabbixapi-user"
    password: "zabbixapi-pw"

templates:
  - filter: { host: ["Template OS Linux"] }
  - search: { name: ["Linux*"] }

hosts:
  - filter: { host: ["web1"] }

items:
  - search: { key_: ["system.cpu.load*"] }
    postfix: ".wow"
    algorithm:
      week_over_week:
        weeks: 3
        window: 3600

all_hosts: false
"#;

    #[test]
    fn test_parse_example() {
        let configuration: Configuration = serde_yaml::from_str(EXAMPLE).unwrap();
        validate(&configuration).unwrap();

        assert_eq!(
            configuration.zabbix.api.url,
            "http://127.0.0.1/zabbix/api_jsonrpc.php"
        );
        assert_eq!(configuration.zabbix.api.username, "zabbixapi-user");
        assert_eq!(configuration.zabbix.api.password, "zabbixapi-pw");

        assert_eq!(configuration.templates.len(), 2);
        assert_eq!(
            configuration.templates[0].filter["host"],
            vec!["Template OS Linux"]
        );
        assert!(configuration.templates[1].search.contains_key("name"));

        assert_eq!(configuration.hosts.len(), 1);
        assert!(!configuration.all_hosts);

        assert_eq!(configuration.items.len(), 1);
        let item = &configuration.items[0];
        assert_eq!(item.postfix, ".wow");
        let Algorithm::WeekOverWeek { weeks, window } = &item.algorithm;
        assert_eq!(*weeks, 3);
        assert_eq!(*window, 3600);
    }

    #[test]
    fn test_unknown_filter_field_rejected() {
        let yaml = r#"
zabbix:
  api: { url: "u", username: "u", password: "p" }
items:
  - filter: { bogus_field: ["x"] }
    algorithm:
      week_over_week: { weeks: 1, window: 60 }
"#;
        let configuration: Configuration = serde_yaml::from_str(yaml).unwrap();
        let err = validate(&configuration).unwrap_err();
        match err {
            ConfigError::UnknownFilterField { kind, field } => {
                assert_eq!(kind, "item");
                assert_eq!(field, "bogus_field");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_item_filters_rejected() {
        let yaml = r#"
zabbix:
  api: { url: "u", username: "u", password: "p" }
"#;
        let configuration: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            validate(&configuration),
            Err(ConfigError::NoItemFilters)
        ));
    }

    #[test]
    fn test_zero_weeks_rejected() {
        let yaml = r#"
zabbix:
  api: { url: "u", username: "u", password: "p" }
items:
  - search: { key_: ["a*"] }
    algorithm:
      week_over_week: { weeks: 0, window: 3600 }
"#;
        let configuration: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            validate(&configuration),
            Err(ConfigError::InvalidAlgorithm { index: 0, .. })
        ));
    }
}
