//! Block scripts: a registry configuration, the chain specs the registry
//! validates against, and the blocks to apply, in TOML.
//!
//! ```toml
//! [config.store]
//! retention_window = 10
//!
//! [[specs]]
//! index = "ETH1"
//! enabled = true
//! apis = [{ name = "eth_call" }]
//!
//! [[blocks]]
//! height = 10
//! txs = [
//!     { type = "create_project", project = { index = "P1", admin_keys = ["A"] } },
//!     { type = "add_keys", project_id = "P1", admin_key = "A", keys = [{ key = "D1" }] },
//! ]
//! ```

use std::str::FromStr;

use anyhow::{ensure, Context, Result};
use fixation_registry::{InMemorySpecs, Policy, PolicyKind, Project, ProjectKey, RegistryConfig, Spec};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tx {
    CreateProject {
        project: Project,
    },
    AddKeys {
        project_id: String,
        admin_key: String,
        keys: Vec<ProjectKey>,
    },
    AddCu {
        project_id: String,
        cu: u64,
    },
    SetPolicy {
        project_id: String,
        admin_key: String,
        kind: PolicyKind,
        policy: Policy,
    },
    DeleteProject {
        project_id: String,
    },
    Pin {
        project_id: String,
    },
    /// Release a pin taken at `pinned_at`.
    Unpin {
        project_id: String,
        pinned_at: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Block {
    pub height: u64,
    #[serde(default)]
    pub txs: Vec<Tx>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Script {
    pub config: RegistryConfig,
    pub specs: Vec<Spec>,
    pub blocks: Vec<Block>,
}

impl Script {
    /// Height of the last block, or zero for an empty script.
    #[must_use]
    pub fn last_height(&self) -> u64 { self.blocks.last().map_or(0, |block| block.height) }

    #[must_use]
    pub fn spec_registry(&self) -> InMemorySpecs { self.specs.iter().cloned().collect() }

    fn validate(&self) -> Result<()> {
        for pair in self.blocks.windows(2) {
            ensure!(
                pair[0].height < pair[1].height,
                "block heights must increase: {} is followed by {}",
                pair[0].height,
                pair[1].height
            );
        }
        Ok(())
    }
}

impl FromStr for Script {
    type Err = anyhow::Error;

    fn from_str(source: &str) -> Result<Self> {
        let script: Script = toml::from_str(source).context("failed to parse block script")?;
        script.validate()?;
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn single_tx(source: &str) -> Result<Tx> {
        let script: Script = format!("[[blocks]]\nheight = 1\ntxs = [{source}]").parse()?;
        Ok(script.blocks[0].txs[0].clone())
    }

    #[test_case(r#"{ type = "pin", project_id = "P1" }"#, Tx::Pin { project_id: "P1".into() }; "pin")]
    #[test_case(
        r#"{ type = "unpin", project_id = "P1", pinned_at = 4 }"#,
        Tx::Unpin { project_id: "P1".into(), pinned_at: 4 };
        "unpin"
    )]
    #[test_case(
        r#"{ type = "delete_project", project_id = "P1" }"#,
        Tx::DeleteProject { project_id: "P1".into() };
        "delete project"
    )]
    fn tx_tags(source: &str, expected: Tx) {
        assert_eq!(single_tx(source).unwrap(), expected);
    }

    #[test_case(r#"{ type = "rename_project", project_id = "P1" }"#; "unknown type")]
    #[test_case(r#"{ type = "add_cu", project_id = "P1" }"#; "missing field")]
    #[test_case(r#"{ project_id = "P1" }"#; "untagged")]
    fn malformed_tx(source: &str) {
        assert!(single_tx(source).is_err());
    }

    #[test]
    fn parses_tagged_transactions() {
        let script: Script = r#"
            [config.store]
            retention_window = 3

            [[specs]]
            index = "ETH1"
            enabled = true
            apis = [{ name = "eth_call" }]

            [[blocks]]
            height = 10
            txs = [
                { type = "create_project", project = { index = "P1", admin_keys = ["A"] } },
                { type = "add_cu", project_id = "P1", cu = 5 },
            ]

            [[blocks]]
            height = 12
            txs = [
                { type = "set_policy", project_id = "P1", admin_key = "A", kind = "admin", policy = { chain_policies = [{ chain_id = "ETH1", apis = ["eth_call"] }] } },
                { type = "unpin", project_id = "P1", pinned_at = 10 },
            ]
        "#
        .parse()
        .unwrap();

        assert_eq!(script.config.store.retention_window, 3);
        assert_eq!(script.last_height(), 12);
        assert_eq!(script.blocks[0].txs[1], Tx::AddCu {
            project_id: "P1".to_string(),
            cu: 5,
        });
        let Tx::CreateProject { project } = &script.blocks[0].txs[0] else {
            panic!("expected create_project");
        };
        assert_eq!(project.admin_keys, vec!["A"]);
        assert!(matches!(&script.blocks[1].txs[0], Tx::SetPolicy {
            kind: PolicyKind::Admin,
            ..
        }));
    }

    #[test]
    fn rejects_unordered_blocks() {
        let err = "[[blocks]]\nheight = 5\n[[blocks]]\nheight = 5\n"
            .parse::<Script>()
            .unwrap_err();
        assert!(err.to_string().contains("must increase"));
    }

    #[test]
    fn empty_script_is_valid() {
        let script: Script = "".parse().unwrap();
        assert_eq!(script.last_height(), 0);
        assert!(script.blocks.is_empty());
    }
}
