#![deny(clippy::pedantic)]
#![deny(clippy::cargo)]
// `clio` and `env_logger` pull in different versions of some of the same
// crates.
#![allow(clippy::multiple_crate_versions)]
//! Replays scripted blocks against an in-memory project registry.
pub mod replay;
pub mod script;
