//! Host-runtime harness: provider operations over a persistent state store.
//!
//! Stored documents are upgraded through the migration chain before any
//! reconciler sees them, and whatever an operation reports is written back at
//! the current schema version. An absent remote object drops its state.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use scalr_core::{Attrs, AttrsExt, StateDoc};
use scalr_persist::StateStore;
use scalr_schema::{FieldType, ResourceSchema};

use crate::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyAction {
    Created,
    Updated,
    Replaced,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyOutcome {
    pub action: ApplyAction,
    pub state: StateDoc,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct Host<S: StateStore> {
    provider: Provider,
    store: S,
}

/// Whether every configured attribute already matches the refreshed value.
/// Set-typed fields compare as sets.
fn matches_config(schema: &ResourceSchema, state: &Attrs, config: &Attrs) -> bool {
    config.iter().all(|(k, v)| match schema.field(k).map(|f| f.ty) {
        Some(FieldType::Set) => state.present(k).is_some() && state.string_set(k) == config.string_set(k),
        _ => state.get(k) == Some(v),
    })
}

impl<S: StateStore> Host<S> {
    pub fn new(provider: Provider, store: S) -> Self {
        Self { provider, store }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn load(&self, type_name: &str, name: &str) -> Result<Option<StateDoc>> {
        Ok(self.store.get(type_name, name)?.map(|row| row.doc))
    }

    fn save(&self, type_name: &str, name: &str, doc: Option<&StateDoc>) -> Result<()> {
        match doc {
            Some(doc) => self.store.put(type_name, name, doc),
            None => {
                if self.store.remove(type_name, name)? {
                    info!(type_name, name, "remote object gone; state removed");
                }
                Ok(())
            }
        }
    }

    /// Upgrade the stored document in place without touching the remote
    /// object (beyond lookups a migration step needs).
    pub async fn upgrade(&self, type_name: &str, name: &str) -> Result<Option<StateDoc>> {
        let Some(doc) = self.load(type_name, name)? else { return Ok(None) };
        let from = doc.version;
        let doc = self.provider.upgrade_state(type_name, doc).await?;
        if doc.version != from {
            debug!(type_name, name, from, to = doc.version, "state upgraded");
            self.store.put(type_name, name, &doc)?;
        }
        Ok(Some(doc))
    }

    /// Refresh stored state from the remote.
    pub async fn refresh(&self, type_name: &str, name: &str) -> Result<Option<StateDoc>> {
        let Some(prior) = self.load(type_name, name)? else { return Ok(None) };
        let doc = self.provider.read(type_name, prior).await?;
        self.save(type_name, name, doc.as_ref())?;
        Ok(doc)
    }

    /// Converge `(type_name, name)` on `config`: create when there is no live
    /// object, replace on force-new changes, update when a configured value
    /// differs from state.
    ///
    /// The refreshed object is the observed side of relationship diffs, so a
    /// member attached out of band before this call and absent from `config`
    /// is removed. Members attached after the refresh are not touched.
    pub async fn apply(&self, type_name: &str, name: &str, config: &Attrs) -> Result<ApplyOutcome> {
        let schema = self.provider.schema(type_name)?;
        let (prepared, warnings) = self.provider.prepare(schema, config)?;

        let live = match self.load(type_name, name)? {
            Some(prior) => self.provider.read(type_name, prior).await?,
            None => None,
        };

        let (action, state) = match live {
            None => (ApplyAction::Created, self.create(type_name, name, config).await?),
            Some(prior) if !self.provider.requires_replace(type_name, &prior, config)?.is_empty() => {
                self.provider.delete(type_name, prior).await?;
                (ApplyAction::Replaced, self.create(type_name, name, config).await?)
            }
            Some(prior) if matches_config(schema, &prior.attrs, &prepared) => (ApplyAction::Unchanged, prior),
            Some(prior) => match self.provider.update(type_name, prior, config).await? {
                Some(doc) => (ApplyAction::Updated, doc),
                None => bail!("{} {} disappeared during update", type_name, name),
            },
        };
        self.store.put(type_name, name, &state)?;
        info!(type_name, name, action = ?action, id = state.id().unwrap_or_default(), "applied");
        Ok(ApplyOutcome { action, state, warnings })
    }

    async fn create(&self, type_name: &str, name: &str, config: &Attrs) -> Result<StateDoc> {
        match self.provider.create(type_name, config).await? {
            Some(doc) => Ok(doc),
            None => bail!("{} {} disappeared right after creation", type_name, name),
        }
    }

    /// Delete the remote object and drop the state. Returns whether state existed.
    pub async fn destroy(&self, type_name: &str, name: &str) -> Result<bool> {
        let Some(prior) = self.load(type_name, name)? else { return Ok(false) };
        self.provider.delete(type_name, prior).await?;
        self.store.remove(type_name, name)?;
        Ok(true)
    }

    /// Adopt an existing remote object under `name`.
    pub async fn import(&self, type_name: &str, name: &str, id: &str) -> Result<StateDoc> {
        if self.load(type_name, name)?.is_some() {
            bail!("{}.{} is already managed", type_name, name);
        }
        let doc = self
            .provider
            .import(type_name, id)
            .await
            .with_context(|| format!("importing {} as {}.{}", id, type_name, name))?;
        self.store.put(type_name, name, &doc)?;
        Ok(doc)
    }
}
