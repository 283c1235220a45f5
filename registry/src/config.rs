use fixation_state::StoreConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Namespace of the project store.
    pub projects_prefix: String,
    /// Namespace of the developer-key store.
    pub developer_keys_prefix: String,
    pub store: StoreConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            projects_prefix: "projects".to_string(),
            developer_keys_prefix: "developer_keys".to_string(),
            store: StoreConfig::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nested_store_config() {
        let config: RegistryConfig = toml::from_str(
            r#"
            projects_prefix = "p"

            [store]
            retention_window = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.projects_prefix, "p");
        assert_eq!(config.developer_keys_prefix, "developer_keys");
        assert_eq!(config.store.retention_window, 5);
        assert!(config.store.collapse_at_current_height);
    }
}
