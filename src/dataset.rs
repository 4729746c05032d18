//! A single named dataset: the live, mutable definition plus a handle onto
//! the catalog's shared connection pool. One `Dataset` is held behind an
//! `Arc` in the catalog's registry for the life of the dataset, reused in
//! place across reconfigurations.

use std::sync::{Arc, RwLock};

use r2d2::PooledConnection;

use crate::config::DatasetDefinition;
use crate::connection::OracleConnectionManager;
use crate::error::{LayerError, LayerResult};
use crate::mapper::Mapper;
use crate::read::ReadIterator;
use crate::write::WriteSession;

/// The connection pool slot shared by every dataset and the catalog that
/// owns them; rebuilt in place by `Catalog::update_configuration` when the
/// native-system config digest changes, never replaced by dataset reconcile.
pub type SharedPool = Arc<RwLock<Option<crate::connection::OraclePool>>>;

pub struct Dataset {
    def: RwLock<DatasetDefinition>,
    pool: SharedPool,
}

impl Dataset {
    pub fn new(def: DatasetDefinition, pool: SharedPool) -> Self {
        Dataset {
            def: RwLock::new(def),
            pool,
        }
    }

    pub fn name(&self) -> String {
        self.def.read().expect("dataset definition lock poisoned").dataset_name.clone()
    }

    /// The dataset's source config (`table_name`, `since_column`,
    /// `flush_threshold`, `append_mode`, ...) — the information a host
    /// framework actually wants when it describes a dataset.
    pub fn metadata(&self) -> serde_json::Value {
        let def = self.def.read().expect("dataset definition lock poisoned");
        serde_json::Value::Object(def.source_config.clone().into_iter().collect())
    }

    /// The outgoing mapping's configured property names, in definition
    /// order — used by the catalog's reconcile test to confirm upper-casing
    /// without reaching into private state.
    pub fn outgoing_property_names(&self) -> Vec<String> {
        self.def
            .read()
            .expect("dataset definition lock poisoned")
            .outgoing_mapping_config
            .as_ref()
            .map(|o| o.property_mappings.iter().map(|m| m.property.clone()).collect())
            .unwrap_or_default()
    }

    /// Replaces the stored definition in place, preserving this dataset's
    /// identity (and its `Arc`-shared pool handle) across a reconfiguration.
    pub(crate) fn replace_definition(&self, def: DatasetDefinition) {
        *self.def.write().expect("dataset definition lock poisoned") = def;
    }

    /// True if `self` and `other` point at the exact same pool cell — used
    /// by catalog tests to assert reconcile preserves shared state.
    pub fn shares_pool(&self, other: &SharedPool) -> bool {
        Arc::ptr_eq(&self.pool, other)
    }

    fn checkout(&self) -> LayerResult<PooledConnection<OracleConnectionManager>> {
        let guard = self.pool.read().expect("pool lock poisoned");
        let pool = guard
            .as_ref()
            .ok_or_else(|| LayerError::configuration("connection pool is not initialized"))?;
        pool.get().map_err(LayerError::from)
    }

    fn mapper(&self, def: &DatasetDefinition) -> Mapper {
        Mapper::new(def.incoming_mapping_config.clone(), def.outgoing_mapping_config.clone())
    }

    /// `latest_only=true` is rejected: this layer cannot tell change-tables
    /// from state-tables.
    pub fn changes(&self, since: &str, limit: i64, latest_only: bool) -> LayerResult<ReadIterator> {
        if latest_only {
            return Err(LayerError::NotSupported("latest-only reads"));
        }
        let def = self.def.read().expect("dataset definition lock poisoned").clone();
        let mapper = self.mapper(&def);
        let conn = self.checkout()?;
        ReadIterator::open(conn, &def, mapper, since, limit)
    }

    /// Semantically equal to `changes(from, limit, false)`.
    pub fn entities(&self, from: &str, limit: i64) -> LayerResult<ReadIterator> {
        self.changes(from, limit, false)
    }

    pub fn incremental(&self) -> LayerResult<WriteSession> {
        let def = self.def.read().expect("dataset definition lock poisoned").clone();
        let mapper = self.mapper(&def);
        let conn = self.checkout()?;
        WriteSession::open(conn, &def, mapper)
    }

    /// Full-sync writes are never supported.
    pub fn full_sync(&self) -> LayerResult<WriteSession> {
        Err(LayerError::NotSupported("full sync"))
    }
}
