//! Typed view over the on-disk layer configuration.
//!
//! Loaded from a YAML file on disk and enriched with environment variable
//! overrides for the native-system connection keys.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};

pub const TABLE_NAME: &str = "table_name";
pub const SINCE_COLUMN: &str = "since_column";
pub const FLUSH_THRESHOLD: &str = "flush_threshold";
pub const APPEND_MODE: &str = "append_mode";

pub const ORACLE_HOSTNAME: &str = "oracle_hostname";
pub const ORACLE_PORT: &str = "oracle_port";
pub const ORACLE_DB: &str = "oracle_db";
pub const ORACLE_USER: &str = "oracle_user";
pub const ORACLE_PASSWORD: &str = "oracle_password";

/// The five mandatory native-system keys, in the order they are validated.
pub const REQUIRED_NATIVE_KEYS: [&str; 5] = [
    ORACLE_HOSTNAME,
    ORACLE_PORT,
    ORACLE_DB,
    ORACLE_USER,
    ORACLE_PASSWORD,
];

pub type NativeSystemConfig = HashMap<String, String>;
pub type SourceConfig = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub native_system_config: NativeSystemConfig,
    #[serde(default)]
    pub dataset_definitions: Vec<DatasetDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetDefinition {
    pub dataset_name: String,
    #[serde(default)]
    pub source_config: SourceConfig,
    #[serde(default)]
    pub incoming_mapping_config: Option<IncomingMappingConfig>,
    #[serde(default)]
    pub outgoing_mapping_config: Option<OutgoingMappingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMappingConfig {
    #[serde(default)]
    pub base_uri: String,
    #[serde(default)]
    pub map_all: bool,
    #[serde(default)]
    pub property_mappings: Vec<OutgoingPropertyMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingPropertyMapping {
    /// Column name, upper-cased by the catalog on reconcile.
    pub property: String,
    #[serde(default)]
    pub is_identity: bool,
    #[serde(default)]
    pub is_reference: bool,
    #[serde(default)]
    pub is_deleted: bool,
    /// Optional `%s`-style URI pattern used to build `entity.id` / references.
    #[serde(default)]
    pub uri_value_pattern: Option<String>,
    /// Optional datatype hint, notably `"bool"`.
    #[serde(default)]
    pub datatype: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingMappingConfig {
    #[serde(default)]
    pub property_mappings: Vec<IncomingPropertyMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingPropertyMapping {
    /// Entity property URI to read (ignored for the identity mapping, which
    /// always reads `entity.id` instead).
    #[serde(default)]
    pub property: String,
    /// Destination column name.
    pub column: String,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub is_identity: bool,
}

impl Config {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> LayerResult<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
            LayerError::configuration(format!(
                "could not read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let mut config: Config = serde_yaml::from_str(&raw)
            .map_err(|e| LayerError::configuration(format!("invalid config yaml: {e}")))?;
        apply_env_overrides(&mut config.native_system_config);
        Ok(config)
    }

    pub fn validate_native_system_config(&self) -> LayerResult<()> {
        for key in REQUIRED_NATIVE_KEYS {
            if !self.native_system_config.contains_key(key) {
                return Err(LayerError::configuration(format!(
                    "missing required native system config key: {key}"
                )));
            }
        }
        Ok(())
    }
}

/// Overrides each of the five mandatory native-system keys from the
/// upper-cased environment variable of the same name, when present.
pub fn apply_env_overrides(native: &mut NativeSystemConfig) {
    for key in REQUIRED_NATIVE_KEYS {
        if let Ok(value) = env::var(key.to_uppercase()) {
            native.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
native_system_config:
  oracle_hostname: "db.example.com"
  oracle_port: "1521"
  oracle_db: "orclpdb"
  oracle_user: "scott"
  oracle_password: "tiger"
dataset_definitions:
  - dataset_name: "sample"
    source_config:
      table_name: "sample"
"#
    }

    #[test]
    fn parses_minimal_config() {
        let config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.dataset_definitions.len(), 1);
        assert_eq!(config.dataset_definitions[0].dataset_name, "sample");
        assert_eq!(
            config.native_system_config.get(ORACLE_HOSTNAME).unwrap(),
            "db.example.com"
        );
        config.validate_native_system_config().unwrap();
    }

    #[test]
    fn missing_native_key_fails_validation() {
        let mut config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        config.native_system_config.remove(ORACLE_PASSWORD);
        assert!(config.validate_native_system_config().is_err());
    }

    #[test]
    fn env_overrides_upper_cased_var() {
        let mut native = NativeSystemConfig::new();
        native.insert(ORACLE_DB.to_string(), "original".to_string());
        std::env::set_var("ORACLE_DB", "overridden");
        apply_env_overrides(&mut native);
        std::env::remove_var("ORACLE_DB");
        assert_eq!(native.get(ORACLE_DB).unwrap(), "overridden");
    }
}
