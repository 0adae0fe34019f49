//! Scalr client contract consumed by the provider.
//!
//! Transport, authentication and retry policy live behind [`ScalrApi`]; the
//! provider only sees typed objects and [`ClientError::NotFound`] as the
//! absence signal. [`MemoryClient`] is an in-process control plane used by
//! tests and the offline CLI.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod models;

pub use memory::{Fixture, MemoryClient, Op};
pub use models::*;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientError {
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound { kind: kind.to_string(), id: id.to_string() }
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Api { status: 422, message: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Remote API surface, grouped by object kind. Every call is one request;
/// relationship endpoints (`*_tags`) take only the delta.
#[async_trait::async_trait]
pub trait ScalrApi: Send + Sync {
    async fn read_environment(&self, id: &str) -> ClientResult<Environment>;
    async fn create_environment(&self, opts: EnvironmentCreateOptions) -> ClientResult<Environment>;
    async fn update_environment(&self, id: &str, opts: EnvironmentUpdateOptions) -> ClientResult<Environment>;
    async fn delete_environment(&self, id: &str) -> ClientResult<()>;
    async fn add_environment_tags(&self, environment_id: &str, tags: Vec<Relation>) -> ClientResult<()>;
    async fn delete_environment_tags(&self, environment_id: &str, tags: Vec<Relation>) -> ClientResult<()>;

    async fn read_service_account(&self, id: &str) -> ClientResult<ServiceAccount>;
    async fn list_service_accounts(&self, opts: ServiceAccountListOptions) -> ClientResult<ListPage<ServiceAccount>>;
    async fn create_service_account(&self, opts: ServiceAccountCreateOptions) -> ClientResult<ServiceAccount>;
    async fn update_service_account(&self, id: &str, opts: ServiceAccountUpdateOptions) -> ClientResult<ServiceAccount>;
    async fn delete_service_account(&self, id: &str) -> ClientResult<()>;

    async fn read_team(&self, id: &str) -> ClientResult<Team>;
    async fn update_team(&self, id: &str, opts: TeamUpdateOptions) -> ClientResult<Team>;

    async fn read_workspace(&self, id: &str) -> ClientResult<Workspace>;
    async fn create_workspace(&self, opts: WorkspaceCreateOptions) -> ClientResult<Workspace>;
    async fn update_workspace(&self, id: &str, opts: WorkspaceUpdateOptions) -> ClientResult<Workspace>;
    async fn delete_workspace(&self, id: &str) -> ClientResult<()>;
}
