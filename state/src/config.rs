use serde::{Deserialize, Serialize};

/// Store level policies. Every store built from the same config behaves the
/// same way, so consumers never decide collapse-vs-append on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Whether a modification at the height of the latest version rewrites
    /// that version in place. When disabled every modification appends,
    /// which turns a second write at the same height into
    /// [`StoreError::DuplicateVersion`](crate::StoreError::DuplicateVersion).
    pub collapse_at_current_height: bool,

    /// Number of blocks below the current height for which lookups must keep
    /// resolving after a prune.
    pub retention_window: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collapse_at_current_height: true,
            retention_window: 100,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: StoreConfig = toml::from_str("retention_window = 7").unwrap();
        assert_eq!(config, StoreConfig {
            collapse_at_current_height: true,
            retention_window: 7,
        });
    }
}
