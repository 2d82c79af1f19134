use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid key: keys must be non-empty")]
    EmptyKey,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("corrupt entry: {0}")]
    Corrupt(String),

    #[error("storage root unavailable: {0}")]
    StorageRoot(String),
}
