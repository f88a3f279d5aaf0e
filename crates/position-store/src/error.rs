use thiserror::Error;

#[derive(Error, Debug)]
pub enum PositionStoreError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize a stored record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("failed to persist a snapshot write: {0}")]
    Persist(#[from] tempfile::PersistError),
}
