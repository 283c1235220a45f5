use std::iter::Peekable;

use itertools::Itertools;
use log::{debug, trace};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entry::Entry;
use crate::keys::{decode_height, validate_index, KeyLayout};
use crate::refs::{is_collectable, PruneReport, ReferenceGuard};
use crate::storage::{prefix_successor, ScanIter, Substrate};
use crate::{StoreConfig, StoreError};

/// Outcome of a historical lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    #[must_use]
    pub fn is_found(&self) -> bool { matches!(self, Self::Found(_)) }

    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::NotFound => Lookup::NotFound,
        }
    }

    /// Turn a miss into the error produced by `err`.
    pub fn ok_or_else<E>(self, err: impl FnOnce() -> E) -> Result<T, E> {
        self.found().ok_or_else(err)
    }
}

/// Versioned store for one logical table, a.k.a. fixation store.
///
/// Every write is tagged with the block height it happens at. Reads name a
/// height and see the table exactly as it was at that height: later writes
/// add newer versions and never touch the versions older lookups resolve
/// to. Only the latest version of an index can be changed, and only at its
/// own height (see [`StoreConfig::collapse_at_current_height`]).
///
/// Old versions are removed by [`FixationStore::prune`] once nothing at or
/// above the retention horizon can resolve them and no holder references
/// them.
#[derive(Debug, Clone)]
pub struct FixationStore<S: Substrate> {
    prefix: String,
    layout: KeyLayout,
    config: StoreConfig,
    substrate: S,
}

impl<S: Substrate> FixationStore<S> {
    /// Lay out a store under `prefix` in `substrate`.
    pub fn new(prefix: &str, substrate: S, config: StoreConfig) -> Self {
        Self {
            prefix: prefix.to_string(),
            layout: KeyLayout::new(prefix),
            config,
            substrate,
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str { &self.prefix }

    #[must_use]
    pub fn config(&self) -> &StoreConfig { &self.config }

    #[must_use]
    pub fn substrate(&self) -> &S { &self.substrate }

    pub fn into_substrate(self) -> S { self.substrate }

    fn load(&self, index: &str, version: u64) -> Result<Option<Entry>, StoreError> {
        self.substrate
            .get(&self.layout.entry(index, version))?
            .map(|bytes| Entry::from_bytes(&bytes))
            .transpose()
    }

    fn save(&mut self, entry: &Entry) -> Result<(), StoreError> {
        let key = self.layout.entry(&entry.index, entry.created_at);
        self.substrate.set(key, entry.encode()?)
    }

    /// Height of the newest version ever written for `index`.
    pub fn latest_version(&self, index: &str) -> Result<Option<u64>, StoreError> {
        if validate_index(index).is_err() {
            return Ok(None);
        }
        self.substrate
            .get(&self.layout.latest(index))?
            .map(|bytes| decode_height(&bytes))
            .transpose()
    }

    fn latest_entry(&self, index: &str) -> Result<Option<Entry>, StoreError> {
        match self.latest_version(index)? {
            Some(version) => self.load(index, version),
            None => Ok(None),
        }
    }

    /// Find the raw version of `index` visible at `height`.
    pub fn find_raw(&self, index: &str, height: u64) -> Result<Lookup<Entry>, StoreError> {
        if validate_index(index).is_err() {
            return Ok(Lookup::NotFound);
        }
        let from = self.layout.index_prefix(index);
        let to = match height.checked_add(1) {
            Some(next) => self.layout.entry(index, next),
            None => prefix_successor(&from).unwrap_or_default(),
        };
        let Some((_, bytes)) = self.substrate.scan(&from, &to)?.next_back() else {
            trace!("{}: {index}@{height} never written", self.prefix);
            return Ok(Lookup::NotFound);
        };
        let entry = Entry::from_bytes(&bytes)?;
        if entry.is_visible_at(height) {
            trace!("{}: {index}@{height} -> version {}", self.prefix, entry.created_at);
            Ok(Lookup::Found(entry))
        } else {
            trace!("{}: {index}@{height} deleted at {:?}", self.prefix, entry.deleted_at);
            Ok(Lookup::NotFound)
        }
    }

    /// Find the value of `index` as of `height`.
    ///
    /// This is a pure read. It only fails on substrate or codec faults.
    pub fn find_entry<T: DeserializeOwned>(
        &self,
        index: &str,
        height: u64,
    ) -> Result<Lookup<T>, StoreError> {
        match self.find_raw(index, height)? {
            Lookup::Found(entry) => Ok(Lookup::Found(entry.decode()?)),
            Lookup::NotFound => Ok(Lookup::NotFound),
        }
    }

    /// Version id that a lookup of `index` at `height` resolves to.
    pub fn find_entry_version(&self, index: &str, height: u64) -> Result<Option<u64>, StoreError> {
        Ok(self.find_raw(index, height)?.map(|entry| entry.version()).found())
    }

    pub fn has_entry(&self, index: &str, height: u64) -> Result<bool, StoreError> {
        Ok(self.find_raw(index, height)?.is_found())
    }

    /// All physical versions of `index`, oldest first.
    pub fn get_entry_versions(&self, index: &str) -> Result<Vec<Entry>, StoreError> {
        if validate_index(index).is_err() {
            return Ok(Vec::new());
        }
        self.substrate
            .scan_prefix(&self.layout.index_prefix(index))?
            .map(|(_, bytes)| Entry::from_bytes(&bytes))
            .collect()
    }

    /// Check that [`FixationStore::append_entry`] would accept a version of
    /// `index` at `height`, without writing anything.
    pub fn check_append(&self, index: &str, height: u64) -> Result<(), StoreError> {
        validate_index(index)?;
        let Some(latest) = self.latest_version(index)? else {
            return Ok(());
        };
        if latest == height {
            return Err(StoreError::DuplicateVersion {
                index: index.to_string(),
                height,
            });
        }
        match self.load(index, latest)? {
            Some(entry) => check_not_stale(&entry, height),
            // Pruned tombstone; only the marker is left.
            None if latest > height => Err(StoreError::StaleHeight {
                index: index.to_string(),
                height,
                latest,
            }),
            None => Ok(()),
        }
    }

    /// Install a new version of `index` at `height`.
    ///
    /// `height` has to be strictly above every existing version of `index`
    /// and not below its tombstone, if it has one. Appending at the height
    /// of an existing version is rejected with
    /// [`StoreError::DuplicateVersion`]; use
    /// [`FixationStore::modify_entry`] to change a version in place.
    pub fn append_entry<T: Serialize>(
        &mut self,
        index: &str,
        height: u64,
        value: &T,
    ) -> Result<(), StoreError> {
        self.check_append(index, height)?;
        let entry = Entry::new(index, height, value)?;
        self.save(&entry)?;
        self.substrate
            .set(self.layout.latest(index), height.to_be_bytes().to_vec())?;
        debug!("{}: appended {index}@{height}", self.prefix);
        Ok(())
    }

    /// Change the current value of `index`.
    ///
    /// If the latest version was created at `height` and the store collapses
    /// writes at the current height, that version is rewritten in place;
    /// references and tombstone stay as they are. Otherwise a new version is
    /// appended.
    pub fn modify_entry<T: Serialize>(
        &mut self,
        index: &str,
        height: u64,
        value: &T,
    ) -> Result<(), StoreError> {
        validate_index(index)?;
        let not_found = || StoreError::NotFound {
            index: index.to_string(),
            height,
        };
        let mut latest = self.latest_entry(index)?.ok_or_else(not_found)?;
        check_not_stale(&latest, height)?;
        if !latest.is_visible_at(height) {
            return Err(not_found());
        }

        if latest.created_at == height && self.config.collapse_at_current_height {
            latest.data = serde_json::to_vec(value)?;
            self.save(&latest)?;
            debug!("{}: rewrote {index}@{height} in place", self.prefix);
            Ok(())
        } else {
            self.append_entry(index, height, value)
        }
    }

    /// Mark `index` deleted from `height` on.
    ///
    /// Nothing is removed: lookups below `height` keep resolving the
    /// historical versions.
    pub fn delete_entry(&mut self, index: &str, height: u64) -> Result<(), StoreError> {
        validate_index(index)?;
        let not_found = || StoreError::NotFound {
            index: index.to_string(),
            height,
        };
        let mut latest = self.latest_entry(index)?.ok_or_else(not_found)?;
        check_not_stale(&latest, height)?;
        if !latest.is_visible_at(height) {
            return Err(not_found());
        }
        latest.deleted_at = Some(height);
        self.save(&latest)?;
        debug!("{}: deleted {index} at {height}", self.prefix);
        Ok(())
    }

    /// Lazily list the indices that have a version visible at `height`, in
    /// lexicographic order. Calling it again restarts the enumeration.
    pub fn get_all_entry_indices(&self, height: u64) -> Result<EntryIndices<'_>, StoreError> {
        Ok(EntryIndices {
            layout: &self.layout,
            scan: self.substrate.scan_prefix(self.layout.entries_prefix())?.peekable(),
            height,
        })
    }

    /// Take a reference on the version of `index` visible at `height` and
    /// return its version id.
    ///
    /// Release it with [`FixationStore::remove_reference`] at the same
    /// height.
    pub fn add_reference(&mut self, index: &str, height: u64) -> Result<u64, StoreError> {
        let mut entry = self.find_raw(index, height)?.ok_or_else(|| StoreError::NotFound {
            index: index.to_string(),
            height,
        })?;
        entry.refs.acquire(index, entry.created_at)?;
        self.save(&entry)?;
        trace!("{}: {index}@{} refs {}", self.prefix, entry.created_at, entry.refs.get());
        Ok(entry.created_at)
    }

    /// Drop a reference taken with [`FixationStore::add_reference`] at the
    /// same `height`.
    pub fn remove_reference(&mut self, index: &str, height: u64) -> Result<u64, StoreError> {
        let entry = self.find_raw(index, height)?.ok_or_else(|| StoreError::NotFound {
            index: index.to_string(),
            height,
        })?;
        self.release_version(index, entry.created_at)?;
        Ok(entry.created_at)
    }

    pub(crate) fn release_version(&mut self, index: &str, version: u64) -> Result<(), StoreError> {
        let mut entry = self.load(index, version)?.ok_or_else(|| StoreError::NotFound {
            index: index.to_string(),
            height: version,
        })?;
        entry.refs.release(index, version)?;
        self.save(&entry)?;
        trace!("{}: {index}@{version} refs {}", self.prefix, entry.refs.get());
        Ok(())
    }

    /// Reference the version of `index` visible at `height` until the
    /// returned guard is dropped or released.
    pub fn reference(&mut self, index: &str, height: u64) -> Result<ReferenceGuard<'_, S>, StoreError> {
        let version = self.add_reference(index, height)?;
        Ok(ReferenceGuard::new(self, index.to_string(), version))
    }

    /// Run `f` against the version of `index` visible at `height` while
    /// holding a reference on it. The reference is released on every exit
    /// path of `f`.
    pub fn with_reference<R, E>(
        &mut self,
        index: &str,
        height: u64,
        f: impl FnOnce(&Entry, &Self) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>, {
        let version = self.add_reference(index, height)?;
        let outcome = match self.load(index, version) {
            Ok(Some(entry)) => f(&entry, self),
            Ok(None) => Err(StoreError::NotFound {
                index: index.to_string(),
                height,
            }
            .into()),
            Err(err) => Err(err.into()),
        };
        let released = self.release_version(index, version);
        let value = outcome?;
        released?;
        Ok(value)
    }

    /// Physically remove versions that no lookup at or above
    /// `current_height - retention_window` can resolve and that nobody
    /// references.
    ///
    /// Skipping a pass is always safe. Running it twice is a no-op.
    pub fn prune(
        &mut self,
        current_height: u64,
        retention_window: u64,
    ) -> Result<PruneReport, StoreError> {
        let horizon = current_height.saturating_sub(retention_window);
        let entries = self
            .substrate
            .scan_prefix(self.layout.entries_prefix())?
            .map(|(_, bytes)| Entry::from_bytes(&bytes))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = PruneReport::default();
        let mut doomed = Vec::new();
        let groups = entries.iter().group_by(|entry| entry.index.clone());
        for (_, group) in &groups {
            let versions = group.collect_vec();
            // A tombstone only hides the index while no older version is
            // left behind it.
            let mut older_removed = true;
            for (position, entry) in versions.iter().enumerate() {
                let successor = versions.get(position + 1).copied();
                let collectable = is_collectable(entry, successor, horizon)
                    && (successor.is_some() || older_removed);
                if collectable {
                    doomed.push((entry.index.clone(), entry.created_at));
                    continue;
                }
                older_removed = false;
                if !entry.refs.is_free() && successor.is_some_and(|next| next.created_at <= horizon) {
                    report.retained_pinned += 1;
                }
            }
        }

        for (index, version) in &doomed {
            self.substrate.remove(&self.layout.entry(index, *version))?;
        }
        if !doomed.is_empty() {
            debug!(
                "{}: pruned below {horizon}: {}",
                self.prefix,
                doomed.iter().map(|(index, version)| format!("{index}@{version}")).join(", ")
            );
        }
        report.removed = doomed;
        Ok(report)
    }
}

/// Writes may not land below the latest version of an index, nor below the
/// height it was deleted at: both would change answers already given.
fn check_not_stale(latest: &Entry, height: u64) -> Result<(), StoreError> {
    let last_write = latest
        .deleted_at
        .map_or(latest.created_at, |deleted| deleted.max(latest.created_at));
    if height < last_write {
        return Err(StoreError::StaleHeight {
            index: latest.index.clone(),
            height,
            latest: last_write,
        });
    }
    Ok(())
}

/// Iterator returned by [`FixationStore::get_all_entry_indices`].
pub struct EntryIndices<'a> {
    layout: &'a KeyLayout,
    scan: Peekable<ScanIter<'a>>,
    height: u64,
}

impl EntryIndices<'_> {
    /// Consume the versions of the next index and report whether it is
    /// visible at the requested height.
    fn next_group(&mut self) -> Option<Result<(String, bool), StoreError>> {
        let (key, bytes) = self.scan.next()?;
        let (index, version) = match self.layout.parse_entry(&key) {
            Ok(parsed) => parsed,
            Err(err) => return Some(Err(err)),
        };
        let mut candidate = (version <= self.height).then_some(bytes);

        while let Some((key, _)) = self.scan.peek() {
            let (next_index, next_version) = match self.layout.parse_entry(key) {
                Ok(parsed) => parsed,
                Err(err) => return Some(Err(err)),
            };
            if next_index != index {
                break;
            }
            if let Some((_, bytes)) = self.scan.next() {
                if next_version <= self.height {
                    candidate = Some(bytes);
                }
            }
        }

        let visible = match candidate {
            Some(bytes) => match Entry::from_bytes(&bytes) {
                Ok(entry) => entry.is_visible_at(self.height),
                Err(err) => return Some(Err(err)),
            },
            None => false,
        };
        Some(Ok((index, visible)))
    }
}

impl Iterator for EntryIndices<'_> {
    type Item = Result<String, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_group()? {
                Ok((index, true)) => return Some(Ok(index)),
                Ok((_, false)) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
