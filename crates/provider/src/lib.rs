//! Scalr provider façade.
//!
//! [`Provider`] dispatches host requests over the resource-type table: it
//! applies provider defaults, validates configuration, upgrades persisted state
//! through the type's migration chain and hands the result to the reconciler.
//! [`Host`] adds a state store on top, playing the role of the host runtime.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scalr_client::ScalrApi;
use scalr_core::{Attrs, ProviderError, ProviderResult, StateDoc};
use scalr_resources::{DataSource, Instance, Resource};
use scalr_schema::{ResourceSchema, ACCOUNT_ID_ENV};

mod host;

pub use host::{ApplyAction, ApplyOutcome, Host};

/// Provider-level settings, read from the environment with defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub hostname: String,
    /// Default for every `account_id` attribute.
    pub account_id: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { hostname: "scalr.io".into(), account_id: None }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let hostname = std::env::var("SCALR_HOSTNAME").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| "scalr.io".into());
        let account_id = std::env::var(ACCOUNT_ID_ENV).ok().filter(|s| !s.is_empty());
        Self { hostname, account_id }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Resolve a schema default by name; the account id comes from this
    /// config, anything else from the process environment.
    pub fn lookup(&self, name: &str) -> Option<String> {
        if name == ACCOUNT_ID_ENV {
            return self.account_id.clone();
        }
        std::env::var(name).ok()
    }
}

pub struct Provider {
    config: ProviderConfig,
    api: Arc<dyn ScalrApi>,
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

async fn instrumented<T, F>(op: &'static str, type_name: &'static str, fut: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    let t0 = Instant::now();
    info!(op, type_name, "provider: start");
    let res = fut.await;
    let took_ms = t0.elapsed().as_secs_f64() * 1000.0;
    counter!("provider_ops_total", 1u64, "op" => op, "type" => type_name);
    histogram!("provider_op_ms", took_ms, "op" => op, "type" => type_name);
    match &res {
        Ok(_) => info!(op, type_name, took_ms, "provider: ok"),
        Err(e) => {
            counter!("provider_op_errors_total", 1u64, "op" => op, "type" => type_name, "kind" => e.kind_label());
            warn!(op, type_name, error = %e, "provider: failed");
        }
    }
    res
}

impl Provider {
    /// Provider serving every built-in resource type and data source.
    pub fn new(config: ProviderConfig, api: Arc<dyn ScalrApi>) -> Self {
        Self::with_types(config, api, scalr_resources::resources(), scalr_resources::data_sources())
    }

    pub fn with_types(
        config: ProviderConfig,
        api: Arc<dyn ScalrApi>,
        resources: Vec<Arc<dyn Resource>>,
        data_sources: Vec<Arc<dyn DataSource>>,
    ) -> Self {
        let resources = resources.into_iter().map(|r| (r.type_name(), r)).collect();
        let data_sources = data_sources.into_iter().map(|d| (d.type_name(), d)).collect();
        Self { config, api, resources, data_sources }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<dyn ScalrApi> {
        &self.api
    }

    pub fn resource_types(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    pub fn data_source_types(&self) -> Vec<&'static str> {
        self.data_sources.keys().copied().collect()
    }

    pub fn resource(&self, type_name: &str) -> ProviderResult<&Arc<dyn Resource>> {
        self.resources.get(type_name).ok_or_else(|| ProviderError::UnknownType(type_name.to_string()))
    }

    pub fn data_source(&self, type_name: &str) -> ProviderResult<&Arc<dyn DataSource>> {
        self.data_sources.get(type_name).ok_or_else(|| ProviderError::UnknownType(type_name.to_string()))
    }

    pub fn schema(&self, type_name: &str) -> ProviderResult<&'static ResourceSchema> {
        Ok(self.resource(type_name)?.schema())
    }

    /// Defaults then validation. Returns the completed configuration and any
    /// deprecation warnings.
    pub fn prepare(&self, schema: &ResourceSchema, config: &Attrs) -> ProviderResult<(Attrs, Vec<String>)> {
        let mut config = config.clone();
        schema.apply_defaults(&mut config, &|name: &str| self.config.lookup(name));
        let warnings = schema.validate(&config).map_err(|e| ProviderError::Validation(e.to_string()))?;
        for w in &warnings {
            warn!(type_name = schema.type_name, warning = %w, "deprecated attribute");
        }
        Ok((config, warnings))
    }

    fn state_of(resource: &dyn Resource, inst: Instance) -> StateDoc {
        inst.into_state(resource.schema().version)
    }

    /// Bring a persisted document to the type's current schema version.
    pub async fn upgrade_state(&self, type_name: &str, doc: StateDoc) -> ProviderResult<StateDoc> {
        let r = self.resource(type_name)?;
        if doc.version == r.migrations().current_version() {
            return Ok(doc);
        }
        instrumented("upgrade", r.type_name(), r.migrations().upgrade(doc, self.api.as_ref())).await
    }

    pub async fn create(&self, type_name: &str, config: &Attrs) -> ProviderResult<Option<StateDoc>> {
        let r = self.resource(type_name)?;
        let (config, _) = self.prepare(r.schema(), config)?;
        let inst = instrumented("create", r.type_name(), r.create(self.api.as_ref(), &config)).await?;
        Ok(inst.map(|i| Self::state_of(&**r, i)))
    }

    /// Refresh from the remote. `None` means the object is gone and its state
    /// should be dropped.
    pub async fn read(&self, type_name: &str, prior: StateDoc) -> ProviderResult<Option<StateDoc>> {
        let r = self.resource(type_name)?;
        let prior = self.upgrade_state(type_name, prior).await?;
        let Some(id) = prior.id() else { return Ok(None) };
        let inst = instrumented("read", r.type_name(), r.read(self.api.as_ref(), id)).await?;
        Ok(inst.map(|i| Self::state_of(&**r, i)))
    }

    /// Force-new attributes that `config` would change relative to `prior`.
    pub fn requires_replace(&self, type_name: &str, prior: &StateDoc, config: &Attrs) -> ProviderResult<Vec<&'static str>> {
        let r = self.resource(type_name)?;
        let (config, _) = self.prepare(r.schema(), config)?;
        Ok(r.schema().requires_replace(&prior.attrs, &config))
    }

    pub async fn update(&self, type_name: &str, prior: StateDoc, config: &Attrs) -> ProviderResult<Option<StateDoc>> {
        let r = self.resource(type_name)?;
        let (config, _) = self.prepare(r.schema(), config)?;
        let prior = self.upgrade_state(type_name, prior).await?;
        let id = prior
            .id()
            .ok_or_else(|| ProviderError::Validation(format!("{} state has no id", type_name)))?;
        let replace = r.schema().requires_replace(&prior.attrs, &config);
        if !replace.is_empty() {
            return Err(ProviderError::Validation(format!(
                "changing {} requires replacing the {} instance",
                replace.join(", "),
                type_name
            )));
        }
        let inst = instrumented("update", r.type_name(), r.update(self.api.as_ref(), id, &config, &prior.attrs)).await?;
        Ok(inst.map(|i| Self::state_of(&**r, i)))
    }

    pub async fn delete(&self, type_name: &str, prior: StateDoc) -> ProviderResult<()> {
        let r = self.resource(type_name)?;
        let prior = self.upgrade_state(type_name, prior).await?;
        let Some(id) = prior.id() else { return Ok(()) };
        instrumented("delete", r.type_name(), r.delete(self.api.as_ref(), id)).await
    }

    pub async fn import(&self, type_name: &str, id: &str) -> ProviderResult<StateDoc> {
        let r = self.resource(type_name)?;
        let inst = instrumented("import", r.type_name(), r.import(self.api.as_ref(), id)).await?;
        Ok(Self::state_of(&**r, inst))
    }

    pub async fn read_data_source(&self, type_name: &str, query: &Attrs) -> ProviderResult<Attrs> {
        let d = self.data_source(type_name)?;
        let (query, _) = self.prepare(d.schema(), query)?;
        let inst = instrumented("lookup", d.type_name(), d.read(self.api.as_ref(), &query)).await?;
        Ok(inst.into_state(0).attrs)
    }
}
