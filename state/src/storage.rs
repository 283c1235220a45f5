use crate::StoreError;

/// Iterator over `(key, value)` pairs of a [`Substrate`] scan, ascending by
/// key. Reverse it to walk from the largest key down.
pub type ScanIter<'a> = Box<dyn DoubleEndedIterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

/// Durable key-value substrate a versioned store is laid out on.
///
/// Keys are compared as raw bytes, so callers can rely on byte-ordered range
/// scans for "largest key <= target" lookups. Every method may fail with
/// [`StoreError::StorageFault`]; such a failure is never recoverable by the
/// store and has to abort the enclosing state transition.
pub trait Substrate {
    /// Get the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Scan all keys in the half-open range [`from`, `to`).
    fn scan(&self, from: &[u8], to: &[u8]) -> Result<ScanIter<'_>, StoreError>;

    /// Scan all keys starting with `prefix`.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<ScanIter<'_>, StoreError> {
        match prefix_successor(prefix) {
            Some(end) => self.scan(prefix, &end),
            None => {
                let prefix = prefix.to_vec();
                let iter = self.scan(&prefix, &[0xff; 64])?;
                Ok(Box::new(iter.filter(move |(key, _)| key.starts_with(&prefix))))
            }
        }
    }
}

/// Smallest byte string greater than every string starting with `prefix`,
/// or `None` if `prefix` is all `0xff`.
#[must_use]
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn successor_skips_saturated_bytes() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_successor(&[0xff, 0xff]), None);
    }
}
