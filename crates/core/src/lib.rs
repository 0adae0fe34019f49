//! Scalr provider core: composite identifiers, relationship diffs and the
//! versioned state migration chain.

#![forbid(unsafe_code)]

pub mod error;
pub mod identity;
pub mod migrate;
pub mod relation;
pub mod state;

pub use error::{BoxError, ProviderError, ProviderResult};
pub use identity::CompositeId;
pub use migrate::{MigrationChain, PureStep, StateUpgrader};
pub use relation::RelationDiff;
pub use state::{Attrs, AttrsExt, StateDoc, ID_KEY};
