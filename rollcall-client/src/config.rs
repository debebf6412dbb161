//! Configuration loading for the ROLLCALL client.
//!
//! Only `api_base_url` is required; everything else falls back to the
//! workspace constants.

use crate::dispatcher::BulkMode;
use crate::resolver::ColumnResolver;
use crate::tabs::Tab;
use rollcall_core::constants::{
    DEFAULT_BASE_TABLE, DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_MUTATION_PATH, DEFAULT_READ_PATH,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SCHEMA_TTL_SECS, DEFAULT_TABLE_ORDER,
};
use rollcall_core::{Credential, TableCatalog};
use rollcall_storage::CacheConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub api_base_url: String,
    #[serde(default = "default_read_path")]
    pub read_path: String,
    #[serde(default = "default_mutation_path")]
    pub mutation_path: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Bearer token used by the binary. Library callers pass their own.
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub bulk_mode: BulkMode,
    #[serde(default = "default_base_table")]
    pub base_table: String,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    /// Entries replacing or extending the built-in table catalog.
    #[serde(default)]
    pub tables: TableCatalog,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SCHEMA_TTL_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolutionConfig {
    #[serde(default = "default_table_order")]
    pub table_order: Vec<String>,
    /// Column name to the tables searched first for it.
    #[serde(default)]
    pub pinned: BTreeMap<String, Vec<String>>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            table_order: default_table_order(),
            pinned: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_read_path() -> String {
    DEFAULT_READ_PATH.to_string()
}

fn default_mutation_path() -> String {
    DEFAULT_MUTATION_PATH.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_base_table() -> String {
    DEFAULT_BASE_TABLE.to_string()
}

fn default_ttl_secs() -> u64 {
    DEFAULT_SCHEMA_TTL_SECS
}

fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

fn default_table_order() -> Vec<String> {
    DEFAULT_TABLE_ORDER.iter().map(|t| t.to_string()).collect()
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or ROLLCALL_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

impl SyncConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args(std::env::args().skip(1)).or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    /// Read, parse and validate the file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        let paths = [
            ("read_path", &self.read_path),
            ("mutation_path", &self.mutation_path),
        ];
        for (field, path) in paths {
            if !path.starts_with('/') {
                return Err(invalid(field, "must start with '/'"));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs", "must be > 0"));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(invalid("cache.cleanup_interval_secs", "must be > 0"));
        }
        if self.credential.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(invalid("credential", "must not be empty when set"));
        }

        for (table, config) in self.tables.iter() {
            if config.id_field.trim().is_empty() {
                return Err(invalid(format!("tables.{}.id_field", table), "must not be empty"));
            }
            if config.state_key.trim().is_empty() {
                return Err(invalid(format!("tables.{}.state_key", table), "must not be empty"));
            }
            if config.columns.as_ref().is_some_and(Vec::is_empty) {
                return Err(invalid(
                    format!("tables.{}.columns", table),
                    "must list at least one column",
                ));
            }
        }

        let catalog = self.catalog();
        if !catalog.contains(&self.base_table) {
            return Err(invalid(
                "base_table",
                format!("'{}' is not a known table", self.base_table),
            ));
        }
        for table in &self.resolution.table_order {
            if !catalog.contains(table) {
                return Err(invalid(
                    "resolution.table_order",
                    format!("'{}' is not a known table", table),
                ));
            }
        }
        for (column, tables) in &self.resolution.pinned {
            let field = format!("resolution.pinned.{}", column);
            if tables.is_empty() {
                return Err(invalid(field, "must list at least one table"));
            }
            if let Some(unknown) = tables.iter().find(|t| !catalog.contains(t)) {
                return Err(invalid(field, format!("'{}' is not a known table", unknown)));
            }
        }
        Ok(())
    }

    /// Built-in catalog with the configured overrides applied.
    pub fn catalog(&self) -> TableCatalog {
        TableCatalog::builtin().merged(&self.tables)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_ttl(Duration::from_secs(self.cache.ttl_secs))
            .with_cleanup_interval(Duration::from_secs(self.cache.cleanup_interval_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn resolver(&self) -> ColumnResolver {
        let base = ColumnResolver::new(self.base_table.clone())
            .with_table_order(self.resolution.table_order.clone());
        self.resolution
            .pinned
            .iter()
            .fold(base, |resolver, (column, tables)| {
                resolver.with_pinned(column.clone(), tables.clone())
            })
    }

    pub fn credential(&self) -> Option<Credential> {
        self.credential.as_deref().map(Credential::bearer)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("ROLLCALL_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args(mut args: impl Iterator<Item = String>) -> Option<PathBuf> {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

/// Tabs named on the command line, ignoring `--config <path>`. None named
/// means every tab.
pub fn tabs_from_args(args: impl IntoIterator<Item = String>) -> Result<Vec<Tab>, ConfigError> {
    let mut tabs = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        let tab = arg.parse::<Tab>().map_err(|reason| invalid("tab", reason))?;
        if !tabs.contains(&tab) {
            tabs.push(tab);
        }
    }
    if tabs.is_empty() {
        tabs.extend_from_slice(Tab::all());
    }
    Ok(tabs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"api_base_url = "https://school.test""#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = SyncConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.read_path, DEFAULT_READ_PATH);
        assert_eq!(config.bulk_mode, BulkMode::Atomic);
        assert_eq!(config.base_table, "users");
        assert_eq!(config.cache_config().ttl, Duration::from_secs(DEFAULT_SCHEMA_TTL_SECS));
        assert!(config.credential().is_none());
        assert_eq!(config.resolver(), ColumnResolver::default());
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
            api_base_url = "http://localhost:3000"
            read_path = "/api/read"
            mutation_path = "/api/write"
            request_timeout_ms = 2000
            credential = "abc"
            bulk_mode = "sequential"
            base_table = "users"

            [cache]
            ttl_secs = 30
            cleanup_interval_secs = 5

            [resolution]
            table_order = ["users", "courses", "classes"]
            pinned = { name = ["courses"] }

            [tables.grades]
            id_field = "grade_id"
            state_key = "grades"
            columns = ["grade_id", "grade_name"]

            [log]
            filter = "rollcall=debug"
            json = true
        "#;
        let config = SyncConfig::from_toml(toml).unwrap();
        assert_eq!(config.bulk_mode, BulkMode::Sequential);
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        assert_eq!(config.credential().map(|c| c.header_value()), Some("Bearer abc".to_string()));
        assert!(config.log.json);
        let grades = config.catalog();
        assert_eq!(
            grades.get("grades").and_then(|c| c.columns.clone()),
            Some(vec!["grade_id".to_string(), "grade_name".to_string()])
        );
        assert_eq!(config.resolver().table_order(), ["users", "courses", "classes"]);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let toml = format!("{}\nretries = 3", MINIMAL);
        assert!(matches!(SyncConfig::from_toml(&toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            (r#"api_base_url = "school.test""#, "api_base_url"),
            ("api_base_url = \"https://a\"\nread_path = \"api\"", "read_path"),
            ("api_base_url = \"https://a\"\nrequest_timeout_ms = 0", "request_timeout_ms"),
            ("api_base_url = \"https://a\"\nbase_table = \"lockers\"", "base_table"),
            ("api_base_url = \"https://a\"\n[cache]\nttl_secs = 0", "cache.ttl_secs"),
            (
                "api_base_url = \"https://a\"\n[resolution]\npinned = { name = [] }",
                "resolution.pinned.name",
            ),
        ];
        for (toml, expected) in cases {
            match SyncConfig::from_toml(toml) {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_overridden_table_becomes_valid_target() {
        let toml = r#"
            api_base_url = "https://a"
            base_table = "staff"
            [tables.staff]
            id_field = "staff_id"
            state_key = "staff"
        "#;
        let config = SyncConfig::from_toml(toml).unwrap();
        assert_eq!(config.resolver().base_table(), "staff");
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        assert!(SyncConfig::from_path(&path).is_ok());
        assert!(matches!(
            SyncConfig::from_path(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_args() {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            config_path_from_args(args(&["--config", "a.toml", "classes"]).into_iter()),
            Some(PathBuf::from("a.toml"))
        );
        assert_eq!(
            tabs_from_args(args(&["--config", "a.toml", "classes", "Teachers", "classes"]))
                .unwrap(),
            vec![Tab::Classes, Tab::Teachers]
        );
        assert_eq!(tabs_from_args(args(&[])).unwrap(), Tab::all().to_vec());
        assert!(tabs_from_args(args(&["lockers"])).is_err());
    }
}
