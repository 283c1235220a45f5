use anyhow::{bail, Result};
use fixation_registry::{Context, ErrorSink, InMemorySpecs, Keeper, RegistryError};
use fixation_state::InMemorySubstrate;
use log::{debug, info, warn};

use crate::script::{Script, Tx};

pub type ReplayKeeper = Keeper<InMemorySubstrate, InMemorySpecs>;

/// Totals over a replayed script.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub blocks: usize,
    pub applied: usize,
    pub failed: usize,
    pub pruned: usize,
}

fn apply(keeper: &mut ReplayKeeper, ctx: &Context<'_>, tx: &Tx) -> Result<(), RegistryError> {
    match tx {
        Tx::CreateProject { project } => keeper.create_project(ctx, project.clone()),
        Tx::AddKeys {
            project_id,
            admin_key,
            keys,
        } => keeper.add_keys_to_project(ctx, project_id, admin_key, keys),
        Tx::AddCu { project_id, cu } => {
            let mut project = keeper.get_project_for_block(ctx, project_id, ctx.height())?;
            keeper.add_compute_units_to_project(ctx, Some(&mut project), *cu)
        }
        Tx::SetPolicy {
            project_id,
            admin_key,
            kind,
            policy,
        } => keeper.set_policy(ctx, project_id, admin_key, *kind, policy.clone()),
        Tx::DeleteProject { project_id } => keeper.delete_project(ctx, project_id),
        Tx::Pin { project_id } => keeper.pin_project(ctx, project_id).map(|version| {
            debug!("pinned {project_id} version {version}");
        }),
        Tx::Unpin {
            project_id,
            pinned_at,
        } => keeper.unpin_project(&ctx.at(*pinned_at), project_id).map(|version| {
            debug!("unpinned {project_id} version {version}");
        }),
    }
}

/// Apply every block of `script` to `keeper`.
///
/// Each transaction runs against a snapshot of the stores: a rejected
/// transaction is rolled back and skipped, while a storage fault stops the
/// replay. Stores are pruned after every block.
pub fn replay_into(
    keeper: &mut ReplayKeeper,
    script: &Script,
    sink: &dyn ErrorSink,
) -> Result<ReplayReport> {
    let mut report = ReplayReport::default();
    for block in &script.blocks {
        let ctx = Context::new(block.height, sink);
        for (position, tx) in block.txs.iter().enumerate() {
            let snapshot = keeper.snapshot();
            match apply(keeper, &ctx, tx) {
                Ok(()) => report.applied += 1,
                Err(err) if err.is_fatal() => {
                    bail!("block {} tx {position}: {err}", block.height)
                }
                Err(err) => {
                    warn!("block {} tx {position} rejected: {err}", block.height);
                    keeper.restore(snapshot);
                    report.failed += 1;
                }
            }
        }
        let pruned = keeper.end_block(block.height)?;
        report.pruned += pruned.projects.removed.len() + pruned.developer_keys.removed.len();
        report.blocks += 1;
    }
    info!(
        "replayed {} blocks: {} applied, {} rejected, {} versions pruned",
        report.blocks, report.applied, report.failed, report.pruned
    );
    Ok(report)
}

/// Build a fresh keeper from the script's configuration and specs, then
/// replay the script into it.
pub fn replay(script: &Script, sink: &dyn ErrorSink) -> Result<(ReplayKeeper, ReplayReport)> {
    let mut keeper = Keeper::in_memory(script.spec_registry(), script.config.clone());
    let report = replay_into(&mut keeper, script, sink)?;
    Ok((keeper, report))
}

#[cfg(test)]
mod tests {
    use fixation_registry::{MemorySink, Project};
    use fixation_state::Lookup;

    use super::*;

    const SCRIPT: &str = r#"
        [config.store]
        retention_window = 2

        [[specs]]
        index = "ETH1"
        enabled = true
        apis = [{ name = "eth_call" }]

        [[blocks]]
        height = 10
        txs = [
            { type = "create_project", project = { index = "P1", enabled = true, admin_keys = ["A"] } },
            { type = "add_keys", project_id = "P1", admin_key = "A", keys = [{ key = "D1", vrfpk = "V1" }] },
        ]

        [[blocks]]
        height = 12
        txs = [
            { type = "add_keys", project_id = "P1", admin_key = "X", keys = [{ key = "D2" }] },
            { type = "add_cu", project_id = "P1", cu = 7 },
            { type = "set_policy", project_id = "P1", admin_key = "A", kind = "admin", policy = { chain_policies = [{ chain_id = "NOPE" }] } },
        ]
    "#;

    #[test]
    fn rejected_transactions_are_skipped() {
        let _ = env_logger::try_init();
        let script: Script = SCRIPT.parse().unwrap();
        let sink = MemorySink::new();
        let (keeper, report) = replay(&script, &sink).unwrap();

        assert_eq!(report, ReplayReport {
            blocks: 2,
            applied: 3,
            failed: 2,
            pruned: 0,
        });
        assert_eq!(sink.events(), vec![
            "add_project_keys_not_admin",
            "validate_chain_policies_spec_not_found",
        ]);

        let ctx = Context::new(12, &sink);
        let project = keeper.get_project_for_block(&ctx, "P1", 12).unwrap();
        assert_eq!(project.used_cu, 7);
        assert!(project.admin_policy.chain_policies.is_empty());
        assert!(!project.has_developer_key("D2"));
        let (owner, vrfpk) = keeper.get_project_for_developer(&ctx, "D1", 12).unwrap();
        assert_eq!(owner.index, "P1");
        assert_eq!(vrfpk, "V1");
    }

    #[test]
    fn history_is_readable_after_replay() {
        let script: Script = SCRIPT.parse().unwrap();
        let (keeper, _) = replay(&script, &MemorySink::new()).unwrap();

        let at_ten: Project = keeper.projects().find_entry("P1", 10).unwrap().found().unwrap();
        assert_eq!(at_ten.used_cu, 0);
        assert_eq!(keeper.projects().find_entry::<Project>("P1", 9).unwrap(), Lookup::NotFound);
        assert_eq!(keeper.project_ids(12).unwrap(), vec!["P1"]);
    }

    #[test]
    fn deleted_project_stays_deleted_within_its_block() {
        let script: Script = r#"
            [[blocks]]
            height = 3
            txs = [
                { type = "create_project", project = { index = "P1", admin_keys = ["A"], developer_keys = [{ key = "D1" }] } },
                { type = "delete_project", project_id = "P1" },
                { type = "add_cu", project_id = "P1", cu = 2 },
                { type = "create_project", project = { index = "P1", admin_keys = ["A"], developer_keys = [{ key = "D1" }] } },
            ]

            [[blocks]]
            height = 4
            txs = [
                { type = "create_project", project = { index = "P1", admin_keys = ["A"], developer_keys = [{ key = "D1" }] } },
            ]
        "#
        .parse()
        .unwrap();
        let sink = MemorySink::new();
        let (keeper, report) = replay(&script, &sink).unwrap();

        assert_eq!((report.applied, report.failed), (3, 2));
        assert_eq!(sink.events(), vec![
            "get_project_for_block_not_found",
            "create_project_version_conflict",
        ]);
        assert!(keeper.project_ids(3).unwrap().is_empty());
        let ctx = Context::new(4, &sink);
        let (project, _) = keeper.get_project_for_developer(&ctx, "D1", 4).unwrap();
        assert_eq!((project.index.as_str(), project.used_cu), ("P1", 0));
    }

    #[test]
    fn pinned_versions_survive_pruning() {
        let script: Script = r#"
            [config.store]
            retention_window = 1

            [[blocks]]
            height = 1
            txs = [
                { type = "create_project", project = { index = "P1", admin_keys = ["A"] } },
                { type = "pin", project_id = "P1" },
            ]

            [[blocks]]
            height = 2
            txs = [{ type = "add_cu", project_id = "P1", cu = 1 }]

            [[blocks]]
            height = 5
            txs = [{ type = "add_cu", project_id = "P1", cu = 1 }]

            [[blocks]]
            height = 7
        "#
        .parse()
        .unwrap();
        let (mut keeper, report) = replay(&script, &MemorySink::new()).unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.pruned, 1);
        let versions = |keeper: &ReplayKeeper| {
            keeper
                .projects()
                .get_entry_versions("P1")
                .unwrap()
                .into_iter()
                .map(|entry| entry.version())
                .collect::<Vec<_>>()
        };
        assert_eq!(versions(&keeper), vec![1, 5]);

        let unpin: Script = r#"
            [[blocks]]
            height = 8
            txs = [{ type = "unpin", project_id = "P1", pinned_at = 1 }]
        "#
        .parse()
        .unwrap();
        let report = replay_into(&mut keeper, &unpin, &MemorySink::new()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.pruned, 1);
        assert_eq!(versions(&keeper), vec![5]);
    }
}
