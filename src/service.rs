//! The host-facing service contracts, modeled as Rust traits since no
//! external framework crate is linked here — a future HTTP front-end depends
//! on these instead of on `Catalog`/`Dataset` directly.

use std::sync::Arc;

use crate::catalog::{Catalog, DatasetDescription};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::entity::{Continuation, Entity, NamespaceContext};
use crate::error::LayerResult;
use crate::read::ReadIterator;
use crate::write::WriteSession;

/// What the host calls on the running layer as a whole.
pub trait LayerService {
    fn stop(&self) -> LayerResult<()>;
    fn dataset(&self, name: &str) -> LayerResult<Arc<Dataset>>;
    fn dataset_descriptions(&self) -> Vec<DatasetDescription>;
    fn update_configuration(&self, config: Config) -> LayerResult<()>;
}

impl LayerService for Catalog {
    fn stop(&self) -> LayerResult<()> {
        Catalog::stop(self)
    }

    fn dataset(&self, name: &str) -> LayerResult<Arc<Dataset>> {
        Catalog::dataset(self, name)
    }

    fn dataset_descriptions(&self) -> Vec<DatasetDescription> {
        Catalog::descriptions(self)
    }

    fn update_configuration(&self, config: Config) -> LayerResult<()> {
        Catalog::update_configuration(self, config)
    }
}

/// What the host calls on a single resolved dataset.
pub trait DatasetHandle {
    fn name(&self) -> String;
    fn metadata(&self) -> serde_json::Value;
    fn changes(&self, since: &str, limit: i64, latest_only: bool) -> LayerResult<ReadIterator>;
    fn entities(&self, from: &str, limit: i64) -> LayerResult<ReadIterator>;
    fn incremental(&self) -> LayerResult<WriteSession>;
    fn full_sync(&self) -> LayerResult<WriteSession>;
}

impl DatasetHandle for Dataset {
    fn name(&self) -> String {
        Dataset::name(self)
    }

    fn metadata(&self) -> serde_json::Value {
        Dataset::metadata(self)
    }

    fn changes(&self, since: &str, limit: i64, latest_only: bool) -> LayerResult<ReadIterator> {
        Dataset::changes(self, since, limit, latest_only)
    }

    fn entities(&self, from: &str, limit: i64) -> LayerResult<ReadIterator> {
        Dataset::entities(self, from, limit)
    }

    fn incremental(&self) -> LayerResult<WriteSession> {
        Dataset::incremental(self)
    }

    fn full_sync(&self) -> LayerResult<WriteSession> {
        Dataset::full_sync(self)
    }
}

/// What the host calls while consuming a read iterator.
pub trait ChangeIterator {
    fn context(&self) -> NamespaceContext;
    fn next(&mut self) -> LayerResult<Option<Entity>>;
    fn token(&self) -> LayerResult<Continuation>;
    fn close(self) -> LayerResult<()>;
}

impl ChangeIterator for ReadIterator {
    fn context(&self) -> NamespaceContext {
        ReadIterator::context(self)
    }

    fn next(&mut self) -> LayerResult<Option<Entity>> {
        ReadIterator::next(self)
    }

    fn token(&self) -> LayerResult<Continuation> {
        ReadIterator::token(self)
    }

    fn close(self) -> LayerResult<()> {
        ReadIterator::close(self)
    }
}

/// What the host calls while feeding a write session.
pub trait Writer {
    fn write(&mut self, entity: &Entity) -> LayerResult<()>;
    fn close(self) -> LayerResult<()>;
}

impl Writer for WriteSession {
    fn write(&mut self, entity: &Entity) -> LayerResult<()> {
        WriteSession::write(self, entity)
    }

    fn close(self) -> LayerResult<()> {
        WriteSession::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_implements_layer_service() {
        fn assert_impl<T: LayerService>() {}
        assert_impl::<Catalog>();
    }

    #[test]
    fn dataset_implements_dataset_handle() {
        fn assert_impl<T: DatasetHandle>() {}
        assert_impl::<Dataset>();
    }

    #[test]
    fn read_iterator_implements_change_iterator() {
        fn assert_impl<T: ChangeIterator>() {}
        assert_impl::<ReadIterator>();
    }

    #[test]
    fn write_session_implements_writer() {
        fn assert_impl<T: Writer>() {}
        assert_impl::<WriteSession>();
    }
}
