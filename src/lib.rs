//! Relational-to-entity data layer over Oracle: reads configured tables as
//! entity changesets and writes entities back as batched `INSERT`/`MERGE`
//! statements, reconciled against a YAML configuration the host can swap in
//! at runtime.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod dataset;
pub mod decode;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod query;
pub mod read;
pub mod service;
pub mod write;

pub use catalog::{Catalog, DatasetDescription};
pub use config::Config;
pub use dataset::Dataset;
pub use entity::{Continuation, Entity};
pub use error::{LayerError, LayerErrorKind, LayerResult};
pub use read::ReadIterator;
pub use service::{ChangeIterator, DatasetHandle, LayerService, Writer};
pub use write::WriteSession;

#[cfg(test)]
mod tests {
    #[test]
    fn tracing_subscriber_initializes_for_test_runs() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        tracing::debug!("tracing subscriber wired for unit tests");
    }
}
