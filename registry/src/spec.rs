use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEntry {
    pub name: String,
}

/// Chain specification as published by the spec registry.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub index: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub apis: Vec<ApiEntry>,
}

impl Spec {
    /// Whether the spec declares an API named exactly `name`.
    #[must_use]
    pub fn has_api(&self, name: &str) -> bool { self.apis.iter().any(|api| api.name == name) }
}

/// Read-only view of the chain specification registry.
pub trait SpecRegistry {
    fn get_spec(&self, chain_id: &str) -> Option<Spec>;
}

impl<R: SpecRegistry + ?Sized> SpecRegistry for &R {
    fn get_spec(&self, chain_id: &str) -> Option<Spec> { (**self).get_spec(chain_id) }
}

/// Spec registry held in memory, keyed by chain id.
#[derive(Debug, Default, Clone)]
pub struct InMemorySpecs {
    specs: BTreeMap<String, Spec>,
}

impl InMemorySpecs {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Add or replace a spec under its own index.
    pub fn insert(&mut self, spec: Spec) { self.specs.insert(spec.index.clone(), spec); }
}

impl FromIterator<Spec> for InMemorySpecs {
    fn from_iter<I: IntoIterator<Item = Spec>>(iter: I) -> Self {
        let mut specs = Self::new();
        iter.into_iter().for_each(|spec| specs.insert(spec));
        specs
    }
}

impl SpecRegistry for InMemorySpecs {
    fn get_spec(&self, chain_id: &str) -> Option<Spec> { self.specs.get(chain_id).cloned() }
}
