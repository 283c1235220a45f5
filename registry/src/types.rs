use serde::{Deserialize, Serialize};

/// A developer key of a project, with the VRF public key used to verify
/// the developer's pairing requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectKey {
    pub key: String,
    #[serde(default)]
    pub vrfpk: String,
}

impl ProjectKey {
    pub fn new(key: impl Into<String>, vrfpk: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            vrfpk: vrfpk.into(),
        }
    }
}

/// Developer-key record: which project a key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperData {
    pub project_id: String,
    pub vrfpk: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPolicy {
    pub chain_id: String,
    #[serde(default)]
    pub apis: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub chain_policies: Vec<ChainPolicy>,
    pub geolocation_profile: u64,
    pub total_cu_limit: u64,
    pub epoch_cu_limit: u64,
    pub max_providers_to_pair: u64,
}

/// Which of a project's policies to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Admin,
    Subscription,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub index: String,
    /// Owner of the subscription the project belongs to.
    pub subscription: String,
    pub description: String,
    pub enabled: bool,
    pub admin_keys: Vec<String>,
    pub developer_keys: Vec<ProjectKey>,
    pub used_cu: u64,
    pub admin_policy: Policy,
    pub subscription_policy: Policy,
    /// Versions written after the first one. Rewrites within one block
    /// do not count.
    pub snapshot: u64,
}

impl Project {
    pub fn new(index: impl Into<String>, admin_key: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            enabled: true,
            admin_keys: vec![admin_key.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_admin_key(&self, key: &str) -> bool { self.admin_keys.iter().any(|admin| admin == key) }

    #[must_use]
    pub fn has_developer_key(&self, key: &str) -> bool {
        self.developer_keys.iter().any(|dev| dev.key == key)
    }

    pub fn append_key(&mut self, key: ProjectKey) { self.developer_keys.push(key); }

    #[must_use]
    pub fn policy(&self, kind: PolicyKind) -> &Policy {
        match kind {
            PolicyKind::Admin => &self.admin_policy,
            PolicyKind::Subscription => &self.subscription_policy,
        }
    }

    pub fn policy_mut(&mut self, kind: PolicyKind) -> &mut Policy {
        match kind {
            PolicyKind::Admin => &mut self.admin_policy,
            PolicyKind::Subscription => &mut self.subscription_policy,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn admin_check_is_exact() {
        let mut project = Project::new("P1", "A");
        project.admin_keys.push("B".to_string());
        assert!(project.is_admin_key("A"));
        assert!(project.is_admin_key("B"));
        assert!(!project.is_admin_key("a"));
    }

    #[test]
    fn policies_are_selected_by_kind() {
        let mut project = Project::new("P1", "A");
        project.policy_mut(PolicyKind::Admin).total_cu_limit = 10;
        assert_eq!(project.policy(PolicyKind::Admin).total_cu_limit, 10);
        assert_eq!(project.policy(PolicyKind::Subscription).total_cu_limit, 0);
    }
}
