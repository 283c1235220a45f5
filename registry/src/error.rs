use std::collections::BTreeMap;

use fixation_state::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{what} {id:?} not found at height {height}")]
    NotFound {
        what: &'static str,
        id: String,
        height: u64,
    },
    #[error("project {0:?} already exists")]
    AlreadyExists(String),
    #[error("developer key {key:?} is already registered to project {project:?}")]
    UniquenessViolation { key: String, project: String },
    #[error("key {key:?} is not an admin key of project {project:?}")]
    Authorization { project: String, key: String },
    #[error("policy's spec {0:?} not found")]
    SpecNotFound(String),
    #[error("policy's spec {0:?} not enabled")]
    SpecDisabled(String),
    #[error("policy's spec {spec:?} has no API {api:?}")]
    ApiNotFound { spec: String, api: String },
    #[error("{0} is nil")]
    NilReference(&'static str),
    #[error("compute units of project {project:?} overflow: {used} + {added}")]
    ComputeUnitOverflow {
        project: String,
        used: u64,
        added: u64,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// Faults that must abort the enclosing block.
    #[must_use]
    pub fn is_fatal(&self) -> bool { matches!(self, Self::Store(err) if err.is_fatal()) }

    /// Structured context of the failure, for the error sink.
    #[must_use]
    pub fn details(&self) -> BTreeMap<String, String> {
        let pairs: Vec<(&str, String)> = match self {
            Self::NotFound { what, id, height } => vec![
                ("kind", (*what).to_string()),
                ("id", id.clone()),
                ("blockHeight", height.to_string()),
            ],
            Self::AlreadyExists(project) => vec![("project", project.clone())],
            Self::UniquenessViolation { key, project } => {
                vec![("developer", key.clone()), ("project", project.clone())]
            }
            Self::Authorization { project, key } => {
                vec![("project", project.clone()), ("key", key.clone())]
            }
            Self::SpecNotFound(spec) | Self::SpecDisabled(spec) => vec![("specIndex", spec.clone())],
            Self::ApiNotFound { spec, api } => vec![("specIndex", spec.clone()), ("API", api.clone())],
            Self::NilReference(what) => vec![("reference", (*what).to_string())],
            Self::ComputeUnitOverflow {
                project,
                used,
                added,
            } => vec![
                ("project", project.clone()),
                ("usedCu", used.to_string()),
                ("cu", added.to_string()),
            ],
            Self::Store(err) => vec![("store", err.to_string())],
        };
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}
