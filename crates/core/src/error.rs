//! Error kinds shared by reconcilers, the migration chain and the provider façade.

use thiserror::Error;

/// Boxed source error carried by [`ProviderError::Remote`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Remote entity absent. Reconcilers turn this into an absence transition;
    /// it only reaches users from explicit lookups (imports, data sources).
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("your query for {kind} returned {matches} results; please try a more specific search criteria")]
    AmbiguousQuery { kind: &'static str, matches: usize },

    #[error("invalid {kind} ID format: {id} (expected {expected})")]
    MalformedIdentifier { kind: &'static str, id: String, expected: String },

    #[error("error {op} {target}: {source}")]
    Remote {
        op: String,
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("validation: {0}")]
    Validation(String),

    #[error("state migration: {0}")]
    Migration(String),

    #[error("unknown resource type: {0}")]
    UnknownType(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    /// Wrap a remote failure with the attempted operation and its target.
    pub fn remote(op: impl Into<String>, target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Remote { op: op.into(), target: target.into(), source: source.into() }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Stable short label, used for metrics and CLI exit summaries.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AmbiguousQuery { .. } => "ambiguous_query",
            Self::MalformedIdentifier { .. } => "malformed_identifier",
            Self::Remote { .. } => "remote",
            Self::Validation(_) => "validation",
            Self::Migration(_) => "migration",
            Self::UnknownType(_) => "unknown_type",
        }
    }
}
