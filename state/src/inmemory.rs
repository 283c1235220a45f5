use im::OrdMap;

use crate::storage::{ScanIter, Substrate};
use crate::StoreError;

/// In-memory byte-ordered substrate.
///
/// Note: cloning is O(1) regardless of size because `OrdMap` shares
/// structure between copies. The host can therefore snapshot the substrate
/// before a block and restore the snapshot if the block's state transition
/// has to be rolled back.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct InMemorySubstrate {
    data: OrdMap<Vec<u8>, Vec<u8>>,
}

impl InMemorySubstrate {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of physical keys held.
    #[must_use]
    pub fn len(&self) -> usize { self.data.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }
}

impl Substrate for InMemorySubstrate {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.data.insert(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn scan(&self, from: &[u8], to: &[u8]) -> Result<ScanIter<'_>, StoreError> {
        if from >= to {
            return Ok(Box::new(std::iter::empty()));
        }
        let range = from.to_vec()..to.to_vec();
        Ok(Box::new(
            self.data
                .range(range)
                .map(|(key, value)| (key.clone(), value.clone())),
        ))
    }
}
