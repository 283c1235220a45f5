//! Reference tracking for versions that long-lived holders depend on.
//!
//! A holder (for example a subscription pinning the state of a project)
//! acquires a reference on the version it resolved and releases it when it
//! no longer needs that version. Pruning only collects versions without
//! references.

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::fixation::FixationStore;
use crate::storage::Substrate;
use crate::StoreError;

/// Number of outstanding holders of one version.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefCount(u64);

impl RefCount {
    #[must_use]
    pub fn get(self) -> u64 { self.0 }

    #[must_use]
    pub fn is_free(self) -> bool { self.0 == 0 }

    pub(crate) fn acquire(&mut self, index: &str, version: u64) -> Result<(), StoreError> {
        self.0 = self.0.checked_add(1).ok_or_else(|| StoreError::ReferenceOverflow {
            index: index.to_string(),
            version,
        })?;
        Ok(())
    }

    pub(crate) fn release(&mut self, index: &str, version: u64) -> Result<(), StoreError> {
        self.0 = self.0.checked_sub(1).ok_or_else(|| StoreError::ReferenceUnderflow {
            index: index.to_string(),
            version,
        })?;
        Ok(())
    }
}

/// Outcome of one pruning pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Versions physically removed, as `(index, version)`.
    pub removed: Vec<(String, u64)>,
    /// Superseded versions kept only because they are still referenced.
    pub retained_pinned: usize,
}

/// Whether a version can be removed without changing any lookup at or above
/// `horizon`. `successor` is the next newer version of the same index.
pub(crate) fn is_collectable(entry: &Entry, successor: Option<&Entry>, horizon: u64) -> bool {
    if !entry.refs.is_free() {
        return false;
    }
    match successor {
        Some(next) => next.created_at <= horizon,
        None => entry.deleted_at.is_some_and(|deleted| deleted <= horizon),
    }
}

/// A reference on `index@version` that is released when the guard is
/// dropped.
///
/// Note: release on drop cannot report errors, so a failed release is only
/// logged. Use [`ReferenceGuard::release`] where the failure must reach the
/// caller.
#[must_use = "the reference is released as soon as the guard is dropped"]
pub struct ReferenceGuard<'a, S: Substrate> {
    store: &'a mut FixationStore<S>,
    index: String,
    version: u64,
    released: bool,
}

impl<'a, S: Substrate> ReferenceGuard<'a, S> {
    pub(crate) fn new(store: &'a mut FixationStore<S>, index: String, version: u64) -> Self {
        Self {
            store,
            index,
            version,
            released: false,
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 { self.version }

    /// Read-only access to the store while the reference is held.
    #[must_use]
    pub fn store(&self) -> &FixationStore<S> { self.store }

    /// Release the reference now and surface any failure.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        self.store.release_version(&self.index, self.version)
    }
}

impl<S: Substrate> Drop for ReferenceGuard<'_, S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.store.release_version(&self.index, self.version) {
            log::error!("failed to release {}@{}: {err}", self.index, self.version);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(created_at: u64, deleted_at: Option<u64>, refs: u64) -> Entry {
        let mut entry = Entry::new("x", created_at, &()).unwrap();
        entry.deleted_at = deleted_at;
        for _ in 0..refs {
            entry.refs.acquire("x", created_at).unwrap();
        }
        entry
    }

    #[test]
    fn counts_are_checked() {
        let mut count = RefCount::default();
        assert!(matches!(count.release("x", 1), Err(StoreError::ReferenceUnderflow { .. })));
        count.acquire("x", 1).unwrap();
        assert_eq!(count.get(), 1);
        let mut full = RefCount(u64::MAX);
        assert!(matches!(full.acquire("x", 1), Err(StoreError::ReferenceOverflow { .. })));
    }

    #[test]
    fn superseded_versions_are_collectable_once_below_horizon() {
        let old = entry(10, None, 0);
        let new = entry(20, None, 0);
        assert!(!is_collectable(&old, Some(&new), 19));
        assert!(is_collectable(&old, Some(&new), 20));
        assert!(!is_collectable(&new, None, 1000));
    }

    #[test]
    fn referenced_versions_are_never_collectable() {
        let old = entry(10, Some(11), 1);
        let new = entry(20, None, 0);
        assert!(!is_collectable(&old, Some(&new), 1000));
        assert!(!is_collectable(&old, None, 1000));
    }

    #[test]
    fn tombstoned_latest_is_collectable_after_horizon() {
        let dead = entry(10, Some(15), 0);
        assert!(!is_collectable(&dead, None, 14));
        assert!(is_collectable(&dead, None, 15));
    }
}
