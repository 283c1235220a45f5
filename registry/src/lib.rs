#![deny(clippy::pedantic)]
#![deny(clippy::cargo)]
// Some of our dependencies transitively depend on different versions of the
// same crates.
#![allow(clippy::multiple_crate_versions)]
//! Project and developer-key registry.
//!
//! Projects and the developer keys bound to them are kept in two
//! [`FixationStore`](fixation_state::FixationStore)s, so every record can be
//! resolved as of any retained block height. Every request carries an
//! explicit [`Context`] with the height of the block being processed.

pub mod config;
pub mod context;
pub mod error;
pub mod keeper;
pub mod policy;
pub mod spec;
pub mod types;

pub use config::RegistryConfig;
pub use context::{Context, ErrorSink, Failure, LogSink, MemorySink};
pub use error::RegistryError;
pub use keeper::{BlockPruneReport, Keeper, KeeperSnapshot};
pub use policy::validate_chain_policies;
pub use spec::{ApiEntry, InMemorySpecs, Spec, SpecRegistry};
pub use types::{ChainPolicy, DeveloperData, Policy, PolicyKind, Project, ProjectKey};
