//! Physical key layout of a versioned store.
//!
//! ```text
//! <prefix>/e/<index> 0x00 <be64 version>  -> serialized Entry
//! <prefix>/l/<index>                      -> be64 latest version height
//! ```
//!
//! Big-endian heights keep the versions of one index sorted by height, and
//! the NUL separator keeps every index's versions contiguous and sorted
//! lexicographically by index.

use crate::StoreError;

const SEPARATOR: u8 = 0;

#[derive(Debug, Clone)]
pub(crate) struct KeyLayout {
    entries: Vec<u8>,
    latest: Vec<u8>,
}

impl KeyLayout {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            entries: format!("{prefix}/e/").into_bytes(),
            latest: format!("{prefix}/l/").into_bytes(),
        }
    }

    /// Prefix shared by all entries of the store.
    pub(crate) fn entries_prefix(&self) -> &[u8] { &self.entries }

    /// Prefix shared by all versions of `index`.
    pub(crate) fn index_prefix(&self, index: &str) -> Vec<u8> {
        let mut key = self.entries.clone();
        key.extend_from_slice(index.as_bytes());
        key.push(SEPARATOR);
        key
    }

    pub(crate) fn entry(&self, index: &str, version: u64) -> Vec<u8> {
        let mut key = self.index_prefix(index);
        key.extend_from_slice(&version.to_be_bytes());
        key
    }

    pub(crate) fn latest(&self, index: &str) -> Vec<u8> {
        let mut key = self.latest.clone();
        key.extend_from_slice(index.as_bytes());
        key
    }

    /// Split an entry key back into its index and version height.
    pub(crate) fn parse_entry(&self, key: &[u8]) -> Result<(String, u64), StoreError> {
        let malformed = || StoreError::StorageFault(format!("malformed entry key 0x{}", hex::encode(key)));
        let rest = key.strip_prefix(self.entries.as_slice()).ok_or_else(malformed)?;
        let split = rest.len().checked_sub(9).ok_or_else(malformed)?;
        let (index, tail) = rest.split_at(split);
        let (separator, version) = tail.split_first().ok_or_else(malformed)?;
        if *separator != SEPARATOR {
            return Err(malformed());
        }
        let version = u64::from_be_bytes(version.try_into().map_err(|_| malformed())?);
        let index = String::from_utf8(index.to_vec()).map_err(|_| malformed())?;
        Ok((index, version))
    }
}

/// Indices become part of physical keys, so they may not contain the
/// separator byte.
pub fn validate_index(index: &str) -> Result<(), StoreError> {
    if index.is_empty() || index.as_bytes().contains(&SEPARATOR) {
        return Err(StoreError::InvalidIndex(index.to_string()));
    }
    Ok(())
}

pub(crate) fn decode_height(bytes: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| {
        StoreError::StorageFault(format!("malformed height marker 0x{}", hex::encode(bytes)))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entry_keys_round_trip() {
        let layout = KeyLayout::new("projects");
        let key = layout.entry("alice", 42);
        assert!(key.starts_with(layout.entries_prefix()));
        assert_eq!(layout.parse_entry(&key).unwrap(), ("alice".to_string(), 42));
    }

    #[test]
    fn versions_sort_by_height_and_indices_stay_contiguous() {
        let layout = KeyLayout::new("p");
        let mut keys = vec![
            layout.entry("ab", 1),
            layout.entry("a", 256),
            layout.entry("a", 2),
            layout.entry("a\u{1}", 0),
        ];
        keys.sort();
        assert_eq!(keys, vec![
            layout.entry("a", 2),
            layout.entry("a", 256),
            layout.entry("a\u{1}", 0),
            layout.entry("ab", 1),
        ]);
    }

    #[test]
    fn rejects_separator_in_index() {
        assert!(validate_index("ok").is_ok());
        assert!(matches!(validate_index(""), Err(StoreError::InvalidIndex(_))));
        assert!(matches!(validate_index("a\0b"), Err(StoreError::InvalidIndex(_))));
    }

    #[test]
    fn rejects_foreign_keys() {
        let layout = KeyLayout::new("p");
        assert!(layout.parse_entry(b"q/e/a\x00\x00\x00\x00\x00\x00\x00\x00\x01").is_err());
        assert!(layout.parse_entry(b"p/e/").is_err());
    }
}
