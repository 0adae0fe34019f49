//! Typed remote representations and request payloads.

use serde::{Deserialize, Serialize};

/// Reference to another remote object by id (tags, credentials, users...).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
}

impl Relation {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

pub fn relations<I, S>(ids: I) -> Vec<Relation>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Relation::new).collect()
}

pub fn relation_ids(rels: &[Relation]) -> Vec<String> {
    rels.iter().map(|r| r.id.clone()).collect()
}

/// Audit metadata attached by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedBy {
    pub username: String,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub cost_estimation_enabled: bool,
    pub account: Relation,
    #[serde(default)]
    pub created_by: Option<CreatedBy>,
    #[serde(default)]
    pub cloud_credentials: Vec<Relation>,
    #[serde(default)]
    pub policy_groups: Vec<Relation>,
    #[serde(default)]
    pub default_provider_configurations: Vec<Relation>,
    #[serde(default)]
    pub tags: Vec<Relation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentCreateOptions {
    pub name: String,
    pub account: Relation,
    pub cost_estimation_enabled: Option<bool>,
    pub cloud_credentials: Vec<Relation>,
    pub policy_groups: Vec<Relation>,
    pub default_provider_configurations: Option<Vec<Relation>>,
    pub tags: Option<Vec<Relation>>,
}

/// Full replacement of the environment's scalar and plain-list fields.
/// Tags are not part of the payload; they go through the tag relationship calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentUpdateOptions {
    pub name: Option<String>,
    pub cost_estimation_enabled: Option<bool>,
    pub cloud_credentials: Vec<Relation>,
    pub policy_groups: Vec<Relation>,
    pub default_provider_configurations: Vec<Relation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceAccountStatus {
    #[default]
    Active,
    Inactive,
}

impl ServiceAccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(Self::Active),
            "Inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ServiceAccountStatus,
    pub account: Relation,
    #[serde(default)]
    pub created_by: Option<CreatedBy>,
}

/// Filter for the service account list. `None` fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountListOptions {
    pub email: Option<String>,
    pub account: Option<String>,
    pub include: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountCreateOptions {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ServiceAccountStatus>,
    pub account: Relation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountUpdateOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ServiceAccountStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub users: Vec<Relation>,
}

/// Replaces the team's whole member list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamUpdateOptions {
    pub users: Vec<Relation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Remote,
    Local,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "remote" => Some(Self::Remote),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    /// Mapping of the legacy boolean `operations` flag.
    pub fn from_operations(operations: bool) -> Self {
        if operations {
            Self::Remote
        } else {
            Self::Local
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsRepo {
    pub identifier: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub trigger_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub environment: Relation,
    #[serde(default)]
    pub auto_apply: bool,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub queue_all_runs: bool,
    #[serde(default)]
    pub terraform_version: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub vcs_provider: Option<Relation>,
    #[serde(default)]
    pub vcs_repo: Option<VcsRepo>,
    #[serde(default)]
    pub created_by: Option<CreatedBy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceCreateOptions {
    /// Pre-assigned id; the control plane generates one when absent.
    pub id: Option<String>,
    pub name: String,
    pub environment: Relation,
    pub auto_apply: Option<bool>,
    pub execution_mode: Option<ExecutionMode>,
    pub queue_all_runs: Option<bool>,
    pub terraform_version: Option<String>,
    pub working_directory: Option<String>,
    pub vcs_provider: Option<Relation>,
    pub vcs_repo: Option<VcsRepo>,
}

/// Scalar `None`s keep the remote value; `vcs_provider`/`vcs_repo` are
/// replaced as given, so `None` detaches the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceUpdateOptions {
    pub name: Option<String>,
    pub auto_apply: Option<bool>,
    pub execution_mode: Option<ExecutionMode>,
    pub queue_all_runs: Option<bool>,
    pub terraform_version: Option<String>,
    pub working_directory: Option<String>,
    pub vcs_provider: Option<Relation>,
    pub vcs_repo: Option<VcsRepo>,
}

/// One page of a filtered list call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}
