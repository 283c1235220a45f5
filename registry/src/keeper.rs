use std::collections::BTreeSet;

use fixation_state::{
    validate_index, FixationStore, InMemorySubstrate, Lookup, PruneReport, StoreError, Substrate,
};
use itertools::Itertools;
use log::{debug, info};

use crate::config::RegistryConfig;
use crate::context::Context;
use crate::policy::validate_chain_policies;
use crate::spec::SpecRegistry;
use crate::types::{DeveloperData, Policy, PolicyKind, Project, ProjectKey};
use crate::RegistryError;

/// What `end_block` pruned from each store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockPruneReport {
    pub projects: PruneReport,
    pub developer_keys: PruneReport,
}

/// Point-in-time copy of both stores, taken before a block so that the
/// block can be rolled back.
#[derive(Debug, Clone)]
pub struct KeeperSnapshot<S: Substrate> {
    projects: FixationStore<S>,
    developer_keys: FixationStore<S>,
}

/// Project registry.
///
/// Owns one versioned store for projects and one for developer keys. Every
/// read resolves through the stores at the requested height; nothing is
/// cached between requests.
pub struct Keeper<S: Substrate, R: SpecRegistry> {
    projects: FixationStore<S>,
    developer_keys: FixationStore<S>,
    specs: R,
    config: RegistryConfig,
}

impl<R: SpecRegistry> Keeper<InMemorySubstrate, R> {
    /// Keeper whose stores live in memory.
    pub fn in_memory(specs: R, config: RegistryConfig) -> Self {
        Self::new(InMemorySubstrate::new(), InMemorySubstrate::new(), specs, config)
    }
}

impl<S: Substrate, R: SpecRegistry> Keeper<S, R> {
    pub fn new(projects: S, developer_keys: S, specs: R, config: RegistryConfig) -> Self {
        Self {
            projects: FixationStore::new(&config.projects_prefix, projects, config.store),
            developer_keys: FixationStore::new(
                &config.developer_keys_prefix,
                developer_keys,
                config.store,
            ),
            specs,
            config,
        }
    }

    #[must_use]
    pub fn projects(&self) -> &FixationStore<S> { &self.projects }

    #[must_use]
    pub fn developer_keys(&self) -> &FixationStore<S> { &self.developer_keys }

    #[must_use]
    pub fn specs(&self) -> &R { &self.specs }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig { &self.config }

    /// The project `project_id` as of `height`.
    pub fn get_project_for_block(
        &self,
        ctx: &Context<'_>,
        project_id: &str,
        height: u64,
    ) -> Result<Project, RegistryError> {
        match self.projects.find_entry(project_id, height) {
            Ok(Lookup::Found(project)) => Ok(project),
            Ok(Lookup::NotFound) => Err(ctx.fail("get_project_for_block_not_found", RegistryError::NotFound {
                what: "project",
                id: project_id.to_string(),
                height,
            })),
            Err(err) => Err(ctx.fail("get_project_for_block_store_fault", err)),
        }
    }

    /// The developer-key record of `developer_key` as of `height`.
    pub fn get_project_developer_data(
        &self,
        ctx: &Context<'_>,
        developer_key: &str,
        height: u64,
    ) -> Result<DeveloperData, RegistryError> {
        match self.developer_keys.find_entry(developer_key, height) {
            Ok(Lookup::Found(data)) => Ok(data),
            Ok(Lookup::NotFound) => Err(ctx.fail(
                "get_project_developer_data_invalid_key",
                RegistryError::NotFound {
                    what: "developer key",
                    id: developer_key.to_string(),
                    height,
                },
            )),
            Err(err) => Err(ctx.fail("get_project_developer_data_store_fault", err)),
        }
    }

    /// The project `developer_key` belongs to as of `height`, together with
    /// the key's VRF public key.
    pub fn get_project_for_developer(
        &self,
        ctx: &Context<'_>,
        developer_key: &str,
        height: u64,
    ) -> Result<(Project, String), RegistryError> {
        let data = self.get_project_developer_data(ctx, developer_key, height)?;
        match self.projects.find_entry(&data.project_id, height) {
            Ok(Lookup::Found(project)) => Ok((project, data.vrfpk)),
            Ok(Lookup::NotFound) => Err(ctx.fail(
                "get_project_for_developer_project_not_found",
                RegistryError::NotFound {
                    what: "project",
                    id: data.project_id,
                    height,
                },
            )),
            Err(err) => Err(ctx.fail("get_project_for_developer_store_fault", err)),
        }
    }

    /// Bind `developer_key` to `project_id` from `height` on.
    ///
    /// A key belongs to at most one project at any height.
    pub fn register_developer_key(
        &mut self,
        ctx: &Context<'_>,
        developer_key: &str,
        project_id: &str,
        height: u64,
        vrfpk: &str,
    ) -> Result<(), RegistryError> {
        self.check_unregistered(ctx, developer_key, height)?;
        let data = DeveloperData {
            project_id: project_id.to_string(),
            vrfpk: vrfpk.to_string(),
        };
        self.developer_keys
            .append_entry(developer_key, height, &data)
            .map_err(|err| ctx.fail("register_developer_key_store_fault", err))?;
        debug!("developer key {developer_key} registered to {project_id} at {height}");
        Ok(())
    }

    fn check_unregistered(
        &self,
        ctx: &Context<'_>,
        developer_key: &str,
        height: u64,
    ) -> Result<(), RegistryError> {
        validate_index(developer_key).map_err(|err| ctx.fail("register_developer_key_invalid_key", err))?;
        match self.developer_keys.find_entry::<DeveloperData>(developer_key, height) {
            Ok(Lookup::NotFound) => {}
            Ok(Lookup::Found(existing)) => {
                return Err(ctx.fail(
                    "register_developer_key_exists",
                    RegistryError::UniquenessViolation {
                        key: developer_key.to_string(),
                        project: existing.project_id,
                    },
                ))
            }
            Err(err) => return Err(ctx.fail("register_developer_key_store_fault", err)),
        }
        // A key released earlier in this block cannot be bound again until
        // the next one.
        self.developer_keys
            .check_append(developer_key, height)
            .map_err(|err| ctx.fail("register_developer_key_version_conflict", err))
    }

    /// Validate a batch of new developer keys for `project_id` without
    /// writing anything: every key must be free in the store and appear
    /// only once in the batch.
    fn check_new_keys(
        &self,
        ctx: &Context<'_>,
        project_id: &str,
        keys: &[ProjectKey],
    ) -> Result<(), RegistryError> {
        let mut seen = BTreeSet::new();
        for key in keys {
            if !seen.insert(key.key.as_str()) {
                return Err(ctx.fail(
                    "register_developer_key_exists",
                    RegistryError::UniquenessViolation {
                        key: key.key.clone(),
                        project: project_id.to_string(),
                    },
                ));
            }
            self.check_unregistered(ctx, &key.key, ctx.height())?;
        }
        Ok(())
    }

    /// Write back a live project at the context height. `project` is only
    /// updated, with its bumped snapshot counter, once the write went through.
    fn write_project(&mut self, ctx: &Context<'_>, project: &mut Project) -> Result<(), RegistryError> {
        let height = ctx.height();
        let latest = self
            .projects
            .latest_version(&project.index)
            .map_err(|err| ctx.fail("write_project_store_fault", err))?;
        let mut next = project.clone();
        if !(self.projects.config().collapse_at_current_height && latest == Some(height)) {
            next.snapshot = next.snapshot.saturating_add(1);
        }
        match self.projects.modify_entry(&project.index, height, &next) {
            Ok(()) => {
                *project = next;
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                Err(ctx.fail("write_project_not_found", RegistryError::NotFound {
                    what: "project",
                    id: project.index.clone(),
                    height,
                }))
            }
            Err(err) => Err(ctx.fail("write_project_failed", err)),
        }
    }

    /// Register a new project at the context height, together with the
    /// developer keys it already lists.
    ///
    /// Nothing is written unless every write is known to succeed. A project
    /// deleted at the context height can only be created again from the next
    /// height on.
    pub fn create_project(&mut self, ctx: &Context<'_>, mut project: Project) -> Result<(), RegistryError> {
        validate_index(&project.index).map_err(|err| ctx.fail("create_project_invalid_index", err))?;
        match self.projects.has_entry(&project.index, ctx.height()) {
            Ok(false) => {}
            Ok(true) => {
                return Err(ctx.fail(
                    "create_project_already_exists",
                    RegistryError::AlreadyExists(project.index.clone()),
                ))
            }
            Err(err) => return Err(ctx.fail("create_project_store_fault", err)),
        }
        self.projects
            .check_append(&project.index, ctx.height())
            .map_err(|err| ctx.fail("create_project_version_conflict", err))?;
        validate_chain_policies(ctx, &self.specs, &project.admin_policy)?;
        validate_chain_policies(ctx, &self.specs, &project.subscription_policy)?;
        self.check_new_keys(ctx, &project.index, &project.developer_keys)?;

        for key in &project.developer_keys {
            self.register_developer_key(ctx, &key.key, &project.index, ctx.height(), &key.vrfpk)?;
        }
        project.snapshot = 0;
        self.projects
            .append_entry(&project.index, ctx.height(), &project)
            .map_err(|err| ctx.fail("create_project_store_fault", err))?;
        info!("project {} created at {}", project.index, ctx.height());
        Ok(())
    }

    /// Add developer keys to a project on behalf of one of its admin keys.
    ///
    /// The batch is all or nothing: every key is checked before any of them
    /// is registered, so a rejected key leaves both stores untouched.
    pub fn add_keys_to_project(
        &mut self,
        ctx: &Context<'_>,
        project_id: &str,
        admin_key: &str,
        project_keys: &[ProjectKey],
    ) -> Result<(), RegistryError> {
        let height = ctx.height();
        let mut project = match self.projects.find_entry::<Project>(project_id, height) {
            Ok(Lookup::Found(project)) => project,
            Ok(Lookup::NotFound) => {
                return Err(ctx.fail("add_project_keys_project_not_found", RegistryError::NotFound {
                    what: "project",
                    id: project_id.to_string(),
                    height,
                }))
            }
            Err(err) => return Err(ctx.fail("add_project_keys_store_fault", err)),
        };

        if !project.is_admin_key(admin_key) {
            return Err(ctx.fail("add_project_keys_not_admin", RegistryError::Authorization {
                project: project_id.to_string(),
                key: admin_key.to_string(),
            }));
        }

        self.check_new_keys(ctx, project_id, project_keys)?;
        for key in project_keys {
            self.register_developer_key(ctx, &key.key, &project.index, height, &key.vrfpk)?;
            project.append_key(key.clone());
        }
        self.write_project(ctx, &mut project)?;
        debug!(
            "project {project_id} at {height}: added keys {}",
            project_keys.iter().map(|key| &key.key).join(", ")
        );
        Ok(())
    }

    /// Account `cu` compute units to `project` and write it back at the
    /// context height.
    pub fn add_compute_units_to_project(
        &mut self,
        ctx: &Context<'_>,
        project: Option<&mut Project>,
        cu: u64,
    ) -> Result<(), RegistryError> {
        let Some(project) = project else {
            return Err(ctx.fail(
                "add_compute_units_to_project_project_nil",
                RegistryError::NilReference("project"),
            ));
        };
        let used = project.used_cu.checked_add(cu).ok_or_else(|| {
            ctx.fail(
                "add_compute_units_to_project_overflow",
                RegistryError::ComputeUnitOverflow {
                    project: project.index.clone(),
                    used: project.used_cu,
                    added: cu,
                },
            )
        })?;
        let mut updated = project.clone();
        updated.used_cu = used;
        self.write_project(ctx, &mut updated)?;
        *project = updated;
        Ok(())
    }

    /// The admin or subscription policy of the project `developer_key`
    /// belongs to, as of `height`.
    pub fn get_project_developers_policy(
        &self,
        ctx: &Context<'_>,
        developer_key: &str,
        height: u64,
        kind: PolicyKind,
    ) -> Result<Policy, RegistryError> {
        let (project, _) = self.get_project_for_developer(ctx, developer_key, height)?;
        Ok(project.policy(kind).clone())
    }

    pub fn validate_chain_policies(&self, ctx: &Context<'_>, policy: &Policy) -> Result<(), RegistryError> {
        validate_chain_policies(ctx, &self.specs, policy)
    }

    /// Replace one of a project's policies on behalf of an admin key.
    pub fn set_policy(
        &mut self,
        ctx: &Context<'_>,
        project_id: &str,
        admin_key: &str,
        kind: PolicyKind,
        policy: Policy,
    ) -> Result<(), RegistryError> {
        let mut project = self.get_project_for_block(ctx, project_id, ctx.height())?;
        if !project.is_admin_key(admin_key) {
            return Err(ctx.fail("set_policy_not_admin", RegistryError::Authorization {
                project: project_id.to_string(),
                key: admin_key.to_string(),
            }));
        }
        validate_chain_policies(ctx, &self.specs, &policy)?;
        *project.policy_mut(kind) = policy;
        self.write_project(ctx, &mut project)
    }

    /// Remove a project and release its developer keys from the context
    /// height on. History below that height stays readable.
    pub fn delete_project(&mut self, ctx: &Context<'_>, project_id: &str) -> Result<(), RegistryError> {
        let height = ctx.height();
        let project = self.get_project_for_block(ctx, project_id, height)?;
        for key in &project.developer_keys {
            let owned = match self.developer_keys.find_entry::<DeveloperData>(&key.key, height) {
                Ok(lookup) => lookup.found().is_some_and(|data| data.project_id == project.index),
                Err(err) => return Err(ctx.fail("delete_project_store_fault", err)),
            };
            if owned {
                self.developer_keys
                    .delete_entry(&key.key, height)
                    .map_err(|err| ctx.fail("delete_project_store_fault", err))?;
            }
        }
        self.projects
            .delete_entry(project_id, height)
            .map_err(|err| ctx.fail("delete_project_store_fault", err))?;
        info!("project {project_id} deleted at {height}");
        Ok(())
    }

    /// Pin the current version of a project for a long-lived holder. Returns
    /// the pinned version; unpin with the same context height.
    pub fn pin_project(&mut self, ctx: &Context<'_>, project_id: &str) -> Result<u64, RegistryError> {
        self.projects
            .add_reference(project_id, ctx.height())
            .map_err(|err| ctx.fail("pin_project_failed", err))
    }

    pub fn unpin_project(&mut self, ctx: &Context<'_>, project_id: &str) -> Result<u64, RegistryError> {
        self.projects
            .remove_reference(project_id, ctx.height())
            .map_err(|err| ctx.fail("unpin_project_failed", err))
    }

    /// Ids of the projects live at `height`, sorted.
    pub fn project_ids(&self, height: u64) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .projects
            .get_all_entry_indices(height)?
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Block lifecycle hook: prune both stores behind the retention window.
    pub fn end_block(&mut self, height: u64) -> Result<BlockPruneReport, RegistryError> {
        let window = self.config.store.retention_window;
        Ok(BlockPruneReport {
            projects: self.projects.prune(height, window)?,
            developer_keys: self.developer_keys.prune(height, window)?,
        })
    }
}

impl<S: Substrate + Clone, R: SpecRegistry> Keeper<S, R> {
    #[must_use]
    pub fn snapshot(&self) -> KeeperSnapshot<S> {
        KeeperSnapshot {
            projects: self.projects.clone(),
            developer_keys: self.developer_keys.clone(),
        }
    }

    /// Roll both stores back to `snapshot`.
    pub fn restore(&mut self, snapshot: KeeperSnapshot<S>) {
        self.projects = snapshot.projects;
        self.developer_keys = snapshot.developer_keys;
    }
}
