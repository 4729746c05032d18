use std::fmt;

/// Coarse severity classes the host framework would map to HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerErrorKind {
    /// The caller asked for something that does not exist or is malformed.
    BadParameter,
    /// Anything that went wrong talking to the database or decoding its results.
    Internal,
    /// The operation is a legal request shape but this layer deliberately refuses it.
    NotSupported,
}

/// The single error type returned across the catalog/read/write surface.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("dataset {0} not found")]
    DatasetNotFound(String),

    #[error("{0}")]
    BadParameter(String),

    #[error("failed to connect to database: {0}")]
    Connection(#[from] oracle::Error),

    #[error("failed to check out a pooled connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("query failed: {0}")]
    Query(String),

    #[error("failed to scan row: {0}")]
    Scan(String),

    #[error("batch size mismatch: rows affected {observed}, expected {expected}")]
    BatchSizeMismatch { observed: i64, expected: usize },

    #[error("{cause}; additionally, rollback failed: {rollback}")]
    WriteFailed {
        cause: Box<LayerError>,
        rollback: Box<LayerError>,
    },

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl LayerError {
    pub fn kind(&self) -> LayerErrorKind {
        match self {
            LayerError::DatasetNotFound(_) | LayerError::BadParameter(_) => {
                LayerErrorKind::BadParameter
            }
            LayerError::NotSupported(_) => LayerErrorKind::NotSupported,
            _ => LayerErrorKind::Internal,
        }
    }

    pub fn query(msg: impl fmt::Display) -> Self {
        LayerError::Query(msg.to_string())
    }

    pub fn scan(msg: impl fmt::Display) -> Self {
        LayerError::Scan(msg.to_string())
    }

    pub fn configuration(msg: impl fmt::Display) -> Self {
        LayerError::Configuration(msg.to_string())
    }

    /// Wraps a write failure together with the outcome of the rollback attempt
    /// that followed it, so neither cause is lost.
    pub fn write_failed(cause: LayerError, rollback: Result<(), LayerError>) -> Self {
        match rollback {
            Ok(()) => cause,
            Err(rollback_err) => LayerError::WriteFailed {
                cause: Box::new(cause),
                rollback: Box::new(rollback_err),
            },
        }
    }
}

pub type LayerResult<T> = Result<T, LayerError>;
