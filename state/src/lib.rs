#![deny(clippy::pedantic)]
#![deny(clippy::cargo)]
// Some of our dependencies transitively depend on different versions of the
// same crates.
#![allow(clippy::multiple_crate_versions)]
//! Height-indexed versioned entry store.
//!
//! A [`FixationStore`] keeps every version of every record it is given,
//! keyed by the block height the version took effect at, so that any
//! record can be read as of any retained height. Records are laid out on a
//! byte-ordered [`Substrate`]; [`InMemorySubstrate`] is the in-process
//! implementation.

pub mod config;
pub mod entry;
pub mod error;
pub mod fixation;
pub mod inmemory;
mod keys;
pub mod refs;
pub mod storage;

pub use config::StoreConfig;
pub use entry::Entry;
pub use error::StoreError;
pub use fixation::{EntryIndices, FixationStore, Lookup};
pub use inmemory::InMemorySubstrate;
pub use keys::validate_index;
pub use refs::{PruneReport, RefCount, ReferenceGuard};
pub use storage::Substrate;

