use thiserror::Error;

/// Failures raised by a [`FixationStore`](crate::FixationStore).
///
/// Everything except [`StoreError::StorageFault`] and [`StoreError::Codec`]
/// is a contract violation by the caller and leaves the store unchanged.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no entry for index {index:?} at height {height}")]
    NotFound { index: String, height: u64 },
    #[error("index {index:?} already has a version at height {height}")]
    DuplicateVersion { index: String, height: u64 },
    #[error("index {index:?} has version {latest}, cannot write at older height {height}")]
    StaleHeight {
        index: String,
        height: u64,
        latest: u64,
    },
    #[error("invalid index {0:?}: must be non-empty and free of NUL bytes")]
    InvalidIndex(String),
    #[error("reference count of {index:?}@{version} would drop below zero")]
    ReferenceUnderflow { index: String, version: u64 },
    #[error("reference count of {index:?}@{version} overflowed")]
    ReferenceOverflow { index: String, version: u64 },
    #[error("codec failure: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("storage fault: {0}")]
    StorageFault(String),
}

impl StoreError {
    /// Faults that must abort the enclosing state transition instead of
    /// being reported back as a rejected request.
    #[must_use]
    pub fn is_fatal(&self) -> bool { matches!(self, Self::StorageFault(_) | Self::Codec(_)) }
}
