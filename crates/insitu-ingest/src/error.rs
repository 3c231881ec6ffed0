use crate::object_store::ObjectStoreError;
use crate::writer::WriterError;
use insitu_common::CommonError;
use insitu_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Failures of a single ingestion attempt
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} is already ingested")]
    Conflict(String),

    #[error("{0} has no existing record to replace")]
    NotFoundForReplace(String),

    #[error("Transfer error: {0}")]
    Transfer(#[from] ObjectStoreError),

    #[error("Transform error: {0}")]
    Transform(#[from] WriterError),

    #[error("Metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] CommonError),
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io(CommonError::Io(err))
    }
}
