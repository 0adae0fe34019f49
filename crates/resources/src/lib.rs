//! Scalr resource reconcilers.
//!
//! Each resource type implements [`Resource`]: it translates declared
//! attributes into remote payloads, maps remote representations back into
//! attributes and owns the migration chain for its persisted state. The client
//! handle is passed into every call; reconcilers hold no mutable state.

#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use scalr_client::{ClientError, ClientResult, CreatedBy, Relation, ScalrApi};
use scalr_core::{Attrs, AttrsExt, MigrationChain, ProviderError, ProviderResult, StateDoc, ID_KEY};
use scalr_schema::ResourceSchema;

pub mod environment;
pub mod membership;
pub mod service_account;
pub mod workspace;

pub use environment::EnvironmentResource;
pub use membership::{MembershipLookup, MembershipResource};
pub use service_account::{ServiceAccountDataSource, ServiceAccountResource};
pub use workspace::WorkspaceResource;

/// Migration chain whose live steps read through the client handle.
pub type Migrations = MigrationChain<dyn ScalrApi>;

/// What a reconciler reports back for an existing remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub attrs: Attrs,
}

impl Instance {
    pub fn new(id: impl Into<String>, attrs: Attrs) -> Self {
        Self { id: id.into(), attrs }
    }

    /// Persistable document; the id is stored under `id`.
    pub fn into_state(self, version: u32) -> StateDoc {
        let Instance { id, mut attrs } = self;
        attrs.insert(ID_KEY.to_string(), Json::String(id));
        StateDoc::new(version, attrs)
    }
}

#[async_trait]
pub trait Resource: Send + Sync {
    fn type_name(&self) -> &'static str {
        self.schema().type_name
    }

    fn schema(&self) -> &'static ResourceSchema;

    fn migrations(&self) -> &Migrations;

    /// Create the remote object, then read it back. `None` when the object is
    /// already gone by the time of the read.
    async fn create(&self, api: &dyn ScalrApi, desired: &Attrs) -> ProviderResult<Option<Instance>>;

    /// `None` means the remote object no longer exists.
    async fn read(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Option<Instance>>;

    /// In-place update. `observed` is the prior persisted attributes.
    async fn update(
        &self,
        _api: &dyn ScalrApi,
        _id: &str,
        _desired: &Attrs,
        _observed: &Attrs,
    ) -> ProviderResult<Option<Instance>> {
        Err(ProviderError::Validation(format!("{} does not support in-place update", self.type_name())))
    }

    /// Absence is success.
    async fn delete(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<()>;

    /// Adopt an existing remote object by id.
    async fn import(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Instance> {
        self.read(api, id).await?.ok_or_else(|| ProviderError::not_found(self.type_name(), id))
    }
}

/// Read-only lookups keyed by query attributes.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str {
        self.schema().type_name
    }

    fn schema(&self) -> &'static ResourceSchema;

    async fn read(&self, api: &dyn ScalrApi, query: &Attrs) -> ProviderResult<Instance>;
}

/// Every resource type this provider serves.
pub fn resources() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(EnvironmentResource::new()),
        Arc::new(ServiceAccountResource::new()),
        Arc::new(MembershipResource::new()),
        Arc::new(WorkspaceResource::new()),
    ]
}

pub fn data_sources() -> Vec<Arc<dyn DataSource>> {
    vec![Arc::new(ServiceAccountDataSource)]
}

/// Map the not-found signal to `None`, keep every other failure.
pub(crate) fn found<T>(res: ClientResult<T>) -> ClientResult<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn remote(op: &'static str, target: String) -> impl FnOnce(ClientError) -> ProviderError {
    move |e| ProviderError::remote(op, target, e)
}

/// `created_by` as stored in state: a single-item block list, empty when unknown.
pub(crate) fn created_by_block(created_by: Option<&CreatedBy>) -> Json {
    match created_by {
        Some(c) => json!([{ "username": c.username, "email": c.email, "full_name": c.full_name }]),
        None => json!([]),
    }
}

pub(crate) fn id_array(rels: &[Relation]) -> Json {
    scalr_core::state::string_array(rels.iter().map(|r| r.id.clone()))
}

/// Relations from a list/set attribute. Ids must be non-empty strings.
pub(crate) fn relation_list(attrs: &Attrs, key: &str) -> ProviderResult<Option<Vec<Relation>>> {
    let Some(value) = attrs.present(key) else { return Ok(None) };
    let items = value
        .as_array()
        .ok_or_else(|| ProviderError::Validation(format!("{}: expected a list of ids", key)))?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_str() {
            Some(id) if !id.is_empty() => out.push(Relation::new(id)),
            _ => {
                return Err(ProviderError::Validation(format!(
                    "got error during parsing {}: {}-th value is empty or not a string",
                    key, i
                )))
            }
        }
    }
    Ok(Some(out))
}

/// `account_id` after provider defaults were applied.
pub(crate) fn account_of(attrs: &Attrs) -> ProviderResult<Relation> {
    attrs
        .str_attr("account_id")
        .filter(|s| !s.is_empty())
        .map(Relation::new)
        .ok_or_else(|| {
            ProviderError::Validation(format!(
                "account_id is required: set it explicitly or via {}",
                scalr_schema::ACCOUNT_ID_ENV
            ))
        })
}
