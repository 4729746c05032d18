//! Dataset catalog: the name→dataset registry the host resolves every
//! request against, reconciled in place on every configuration update.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, error};

use crate::config::Config;
use crate::connection;
use crate::dataset::{Dataset, SharedPool};
use crate::error::{LayerError, LayerResult};
use crate::mapper;

/// Snapshot of one dataset's identity, returned by `descriptions()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescription {
    pub name: String,
}

pub struct Catalog {
    pool: SharedPool,
    native_digest: RwLock<Option<String>>,
    datasets: RwLock<HashMap<String, Arc<Dataset>>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            pool: Arc::new(RwLock::new(None)),
            native_digest: RwLock::new(None),
            datasets: RwLock::new(HashMap::new()),
        }
    }

    /// O(1) lookup by name; `BadParameter`-class error for unknown datasets.
    pub fn dataset(&self, name: &str) -> LayerResult<Arc<Dataset>> {
        self.datasets
            .read()
            .expect("catalog lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| LayerError::DatasetNotFound(name.to_string()))
    }

    /// Snapshot of currently known dataset names.
    pub fn descriptions(&self) -> Vec<DatasetDescription> {
        self.datasets
            .read()
            .expect("catalog lock poisoned")
            .values()
            .map(|d| DatasetDescription { name: d.name() })
            .collect()
    }

    /// Reconciles the catalog to `config`, deterministically:
    /// 1. rebuild the shared pool if the native-system digest changed;
    /// 2. replace definitions for datasets that survive, in place;
    /// 3. drop datasets no longer present;
    /// 4. insert newly named datasets, wired to the shared pool;
    /// 5. upper-case every outgoing mapping's `property` field.
    ///
    /// Idempotent: calling this twice with the same `config` leaves the
    /// catalog in the same observable state as calling it once.
    pub fn update_configuration(&self, mut config: Config) -> LayerResult<()> {
        config.validate_native_system_config()?;
        self.reconcile_pool(&config)?;
        let dataset_count = config.dataset_definitions.len();
        self.reconcile_datasets(config.dataset_definitions);
        debug!(dataset_count, "configuration reconciled");
        Ok(())
    }

    /// The dataset-registry half of reconcile, independent of the pool
    /// rebuild so it can be exercised without a live database connection.
    fn reconcile_datasets(&self, mut definitions: Vec<crate::config::DatasetDefinition>) {
        for def in &mut definitions {
            if let Some(outgoing) = def.outgoing_mapping_config.as_mut() {
                mapper::uppercase_outgoing_properties(outgoing);
            }
        }

        let mut datasets = self.datasets.write().expect("catalog lock poisoned");
        let keep: HashSet<&str> = definitions.iter().map(|d| d.dataset_name.as_str()).collect();
        for (name, _) in datasets.iter() {
            if !keep.contains(name.as_str()) {
                debug!(dataset = %name, "dataset removed from catalog");
            }
        }
        datasets.retain(|name, _| keep.contains(name.as_str()));

        for def in definitions {
            match datasets.get(&def.dataset_name) {
                Some(existing) => {
                    existing.replace_definition(def);
                }
                None => {
                    let name = def.dataset_name.clone();
                    debug!(dataset = %name, "dataset added to catalog");
                    datasets.insert(name, Arc::new(Dataset::new(def, self.pool.clone())));
                }
            }
        }
    }

    /// Rebuilds the shared pool through the connection factory if the
    /// native-system config's digest differs from the one the current pool
    /// was built from; otherwise leaves the existing pool (and every
    /// dataset's reference to it) untouched.
    fn reconcile_pool(&self, config: &Config) -> LayerResult<()> {
        let new_digest = connection::digest(&config.native_system_config);
        let unchanged = self
            .native_digest
            .read()
            .expect("digest lock poisoned")
            .as_deref()
            == Some(new_digest.as_str());
        if unchanged {
            return Ok(());
        }

        debug!("native system config changed; rebuilding connection pool");
        let new_pool = connection::build_pool(&config.native_system_config)?;
        {
            let mut conn = new_pool.get().map_err(LayerError::from)?;
            if let Err(e) = conn.ping() {
                error!(error = %e, "ping failed while rebuilding connection pool");
                return Err(LayerError::from(e));
            }
        }
        *self.pool.write().expect("pool lock poisoned") = Some(new_pool);
        *self.native_digest.write().expect("digest lock poisoned") = Some(new_digest);
        debug!("connection pool rebuilt");
        Ok(())
    }

    /// Idempotent shutdown: releases the shared pool, if any.
    pub fn stop(&self) -> LayerResult<()> {
        if self.pool.write().expect("pool lock poisoned").take().is_some() {
            debug!("connection pool released on stop");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DatasetDefinition, OutgoingMappingConfig, OutgoingPropertyMapping, ORACLE_DB, ORACLE_HOSTNAME,
        ORACLE_PASSWORD, ORACLE_PORT, ORACLE_USER,
    };
    use serde_json::json;

    fn native_config() -> crate::config::NativeSystemConfig {
        let mut native = crate::config::NativeSystemConfig::new();
        native.insert(ORACLE_HOSTNAME.to_string(), "db.example.com".to_string());
        native.insert(ORACLE_PORT.to_string(), "1521".to_string());
        native.insert(ORACLE_DB.to_string(), "orclpdb".to_string());
        native.insert(ORACLE_USER.to_string(), "scott".to_string());
        native.insert(ORACLE_PASSWORD.to_string(), "tiger".to_string());
        native
    }

    fn def(name: &str) -> DatasetDefinition {
        let mut source_config = crate::config::SourceConfig::new();
        source_config.insert(crate::config::TABLE_NAME.to_string(), json!(name));
        DatasetDefinition {
            dataset_name: name.to_string(),
            source_config,
            incoming_mapping_config: None,
            outgoing_mapping_config: Some(OutgoingMappingConfig {
                base_uri: "http://test/".to_string(),
                map_all: false,
                property_mappings: vec![OutgoingPropertyMapping {
                    property: "name".to_string(),
                    ..Default::default()
                }],
            }),
        }
    }

    fn config_with(names: &[&str]) -> Config {
        Config {
            native_system_config: native_config(),
            dataset_definitions: names.iter().map(|n| def(n)).collect(),
        }
    }

    #[test]
    fn unknown_dataset_is_bad_parameter() {
        let catalog = Catalog::new();
        let err = catalog.dataset("missing").unwrap_err();
        assert_eq!(err.kind(), crate::error::LayerErrorKind::BadParameter);
    }

    #[test]
    fn missing_native_key_fails_validation_before_touching_the_pool() {
        let catalog = Catalog::new();
        let mut config = config_with(&["sample"]);
        config.native_system_config.remove(ORACLE_PASSWORD);
        assert!(catalog.update_configuration(config).is_err());
        // a failed update must not have registered the dataset
        assert!(catalog.dataset("sample").is_err());
    }

    #[test]
    fn uppercases_outgoing_property_names_on_reconcile() {
        let catalog = Catalog::new();
        catalog.reconcile_datasets(config_with(&["sample"]).dataset_definitions);
        let dataset = catalog.dataset("sample").unwrap();
        assert_eq!(dataset.outgoing_property_names(), vec!["NAME".to_string()]);
    }

    #[test]
    fn reconcile_is_idempotent_on_repeated_identical_config() {
        let catalog = Catalog::new();
        let config = config_with(&["sample"]);
        catalog.reconcile_datasets(config.dataset_definitions.clone());
        let first: HashSet<String> = catalog.descriptions().into_iter().map(|d| d.name).collect();
        catalog.reconcile_datasets(config.dataset_definitions);
        let second: HashSet<String> = catalog.descriptions().into_iter().map(|d| d.name).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn reconcile_drops_datasets_missing_from_new_config() {
        let catalog = Catalog::new();
        catalog.reconcile_datasets(vec![def("keep"), def("drop")]);
        catalog.reconcile_datasets(vec![def("keep")]);

        let names: HashSet<String> = catalog.descriptions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, HashSet::from(["keep".to_string()]));
    }

    #[test]
    fn reconcile_preserves_shared_pool_identity_across_replace() {
        let catalog = Catalog::new();
        catalog.reconcile_datasets(vec![def("sample")]);
        let dataset_before = catalog.dataset("sample").unwrap();
        catalog.reconcile_datasets(vec![def("sample")]);
        let dataset_after = catalog.dataset("sample").unwrap();
        assert!(Arc::ptr_eq(&dataset_before, &dataset_after));
        assert!(dataset_after.shares_pool(&catalog.pool));
    }

    #[test]
    fn stop_is_idempotent() {
        let catalog = Catalog::new();
        catalog.stop().unwrap();
        catalog.stop().unwrap();
    }
}
