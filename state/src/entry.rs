use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::hex::Hex;
use serde_with::serde_as;

use crate::refs::RefCount;
use crate::StoreError;

/// One physical version of an index.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: String,
    /// Height this version took effect at. Doubles as the version id.
    pub created_at: u64,
    /// Height from which lookups stop resolving this version.
    pub deleted_at: Option<u64>,
    pub refs: RefCount,
    #[serde_as(as = "Hex")]
    pub data: Vec<u8>,
}

impl Entry {
    pub(crate) fn new<T: Serialize>(index: &str, height: u64, value: &T) -> Result<Self, StoreError> {
        Ok(Self {
            index: index.to_string(),
            created_at: height,
            deleted_at: None,
            refs: RefCount::default(),
            data: serde_json::to_vec(value)?,
        })
    }

    /// Version id of this entry.
    #[must_use]
    pub fn version(&self) -> u64 { self.created_at }

    /// Whether a lookup at `height` may resolve to this version, assuming no
    /// newer version exists at or below `height`.
    #[must_use]
    pub fn is_visible_at(&self, height: u64) -> bool {
        self.created_at <= height && self.deleted_at.map_or(true, |deleted| deleted > height)
    }

    /// Decode the payload into the domain type it was written from.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(&self.data)?)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, StoreError> { Ok(serde_json::to_vec(self)?) }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
