//! Versioned state migration chain.
//!
//! The step at position N rewrites a document from version N to N+1, so a
//! chain cannot have gaps. Upgrading always walks every step between the
//! stored version and the target, even when a later step overwrites what an
//! earlier one produced.

use async_trait::async_trait;
use metrics::counter;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::state::{Attrs, StateDoc};

/// One version-to-version transform. `ctx` is the client handle for steps
/// that need a live lookup; pure steps ignore it.
#[async_trait]
pub trait StateUpgrader<C: ?Sized + Sync>: Send + Sync {
    fn describe(&self) -> &'static str;
    async fn upgrade(&self, attrs: Attrs, ctx: &C) -> ProviderResult<Attrs>;
}

/// A step that only restructures the mapping.
pub struct PureStep {
    describe: &'static str,
    apply: fn(Attrs) -> Attrs,
}

impl PureStep {
    pub const fn new(describe: &'static str, apply: fn(Attrs) -> Attrs) -> Self {
        Self { describe, apply }
    }
}

#[async_trait]
impl<C: ?Sized + Sync> StateUpgrader<C> for PureStep {
    fn describe(&self) -> &'static str {
        self.describe
    }

    async fn upgrade(&self, attrs: Attrs, _ctx: &C) -> ProviderResult<Attrs> {
        Ok((self.apply)(attrs))
    }
}

pub struct MigrationChain<C: ?Sized + Sync> {
    kind: &'static str,
    steps: Vec<Box<dyn StateUpgrader<C>>>,
}

impl<C: ?Sized + Sync> MigrationChain<C> {
    /// Empty chain: documents are already at version 0, the current version.
    pub fn new(kind: &'static str) -> Self {
        Self { kind, steps: Vec::new() }
    }

    /// Append the step upgrading from `current_version()` to the next version.
    pub fn step(mut self, step: impl StateUpgrader<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Shorthand for appending a [`PureStep`].
    pub fn pure(self, describe: &'static str, apply: fn(Attrs) -> Attrs) -> Self {
        self.step(PureStep::new(describe, apply))
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn current_version(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn describe_steps(&self) -> Vec<(u32, &'static str)> {
        self.steps.iter().enumerate().map(|(i, s)| (i as u32, s.describe())).collect()
    }

    pub async fn upgrade(&self, doc: StateDoc, ctx: &C) -> ProviderResult<StateDoc> {
        self.upgrade_to(doc, self.current_version(), ctx).await
    }

    /// Run the steps from `doc.version` up to `target` (inclusive of every
    /// intermediate version).
    pub async fn upgrade_to(&self, doc: StateDoc, target: u32, ctx: &C) -> ProviderResult<StateDoc> {
        let current = self.current_version();
        if doc.version > current {
            return Err(ProviderError::Migration(format!(
                "{} state is at version {}, newer than the supported version {}",
                self.kind, doc.version, current
            )));
        }
        if target > current {
            return Err(ProviderError::Migration(format!(
                "{} has no schema version {} (current is {})",
                self.kind, target, current
            )));
        }
        if doc.version > target {
            return Err(ProviderError::Migration(format!(
                "cannot downgrade {} state from version {} to {}",
                self.kind, doc.version, target
            )));
        }

        let StateDoc { version: from, mut attrs } = doc;
        for version in from..target {
            let step = &self.steps[version as usize];
            debug!(kind = self.kind, from = version, to = version + 1, step = step.describe(), "upgrading state");
            attrs = step.upgrade(attrs, ctx).await?;
            counter!("state_migrations_total", 1u64, "kind" => self.kind);
        }
        Ok(StateDoc { version: target, attrs })
    }
}
