//! `scalr_iam_user_membership`: a user's membership in a team.
//!
//! The membership has no remote id; it is the edge `<user_id>/<team_id>` in
//! the team's member list, and every write replaces that whole list.

use async_trait::async_trait;
use metrics::counter;
use serde_json::json;
use tracing::{debug, info};

use scalr_client::{Relation, ScalrApi, Team, TeamUpdateOptions};
use scalr_core::{Attrs, AttrsExt, CompositeId, ProviderError, ProviderResult};
use scalr_schema::{Field, FieldType, ResourceSchema};

use crate::{found, remote, Instance, Migrations, Resource};

pub const TYPE_NAME: &str = "scalr_iam_user_membership";
const KIND: &str = "iam user membership";

pub const ID: CompositeId = CompositeId::new(KIND, "user_id", "team_id");

const FIELDS: &[Field] = &[
    Field::required("user_id", FieldType::String).force_new(),
    Field::required("team_id", FieldType::String).force_new(),
];

pub const SCHEMA: ResourceSchema = ResourceSchema::new(TYPE_NAME, 0, FIELDS);

/// Outcome of resolving a membership id against the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipLookup {
    /// The team lists the user.
    Member(Team),
    /// The team exists but does not list the user.
    NotMember(Team),
    TeamMissing,
}

impl MembershipLookup {
    pub fn is_member(&self) -> bool {
        matches!(self, Self::Member(_))
    }
}

/// Unpack `id`, read the team and look for the user in its members.
pub async fn lookup(api: &dyn ScalrApi, id: &str) -> ProviderResult<MembershipLookup> {
    let (user_id, team_id) = ID.unpack(id)?;
    let team = found(api.read_team(team_id).await).map_err(remote("retrieving", format!("{} {}", KIND, id)))?;
    Ok(match team {
        None => MembershipLookup::TeamMissing,
        Some(team) if team.users.iter().any(|u| u.id == user_id) => MembershipLookup::Member(team),
        Some(team) => MembershipLookup::NotMember(team),
    })
}

fn attrs_of(user_id: &str, team_id: &str) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert("user_id".into(), json!(user_id));
    attrs.insert("team_id".into(), json!(team_id));
    attrs
}

pub struct MembershipResource {
    migrations: Migrations,
}

impl MembershipResource {
    pub fn new() -> Self {
        Self { migrations: Migrations::new(TYPE_NAME) }
    }
}

impl Default for MembershipResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for MembershipResource {
    fn schema(&self) -> &'static ResourceSchema {
        &SCHEMA
    }

    fn migrations(&self) -> &Migrations {
        &self.migrations
    }

    async fn create(&self, api: &dyn ScalrApi, desired: &Attrs) -> ProviderResult<Option<Instance>> {
        let user_id = desired.str_attr("user_id").unwrap_or_default();
        let team_id = desired.str_attr("team_id").unwrap_or_default();
        let id = ID.pack(user_id, team_id);

        let team = api.read_team(team_id).await.map_err(|e| {
            if e.is_not_found() {
                ProviderError::not_found("team", team_id)
            } else {
                ProviderError::remote("creating", format!("{} {}", KIND, id), e)
            }
        })?;

        if team.users.iter().any(|u| u.id == user_id) {
            info!(id = %id, "user already a team member; adopting");
        } else {
            let mut users = team.users;
            users.push(Relation::new(user_id));
            debug!(id = %id, members = users.len(), "writing team members");
            api.update_team(team_id, TeamUpdateOptions { users })
                .await
                .map_err(remote("creating", format!("{} {}", KIND, id)))?;
            counter!("relation_changes_total", 1u64, "relation" => "team_users", "phase" => "add");
            info!(id = %id, "membership created");
        }

        self.read(api, &id).await
    }

    async fn read(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Option<Instance>> {
        match lookup(api, id).await? {
            MembershipLookup::Member(team) => {
                let (user_id, _) = ID.unpack(id)?;
                Ok(Some(Instance::new(id, attrs_of(user_id, &team.id))))
            }
            other => {
                debug!(id, lookup = ?other, "membership not found");
                Ok(None)
            }
        }
    }

    async fn delete(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<()> {
        let team = match lookup(api, id).await.map_err(|e| match e {
            ProviderError::Remote { source, .. } => ProviderError::Remote {
                op: "deleting".into(),
                target: format!("{} {}", KIND, id),
                source,
            },
            other => other,
        })? {
            MembershipLookup::Member(team) => team,
            other => {
                debug!(id, lookup = ?other, "membership already gone");
                return Ok(());
            }
        };
        let (user_id, _) = ID.unpack(id)?;
        let users: Vec<Relation> = team.users.into_iter().filter(|u| u.id != user_id).collect();
        debug!(id, members = users.len(), "writing team members");
        found(api.update_team(&team.id, TeamUpdateOptions { users }).await)
            .map_err(remote("deleting", format!("{} {}", KIND, id)))?;
        counter!("relation_changes_total", 1u64, "relation" => "team_users", "phase" => "remove");
        Ok(())
    }

    async fn import(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Instance> {
        self.read(api, id).await?.ok_or_else(|| ProviderError::not_found(KIND, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_id_names_the_resource() {
        let err = ID.unpack("no-separator-here").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid iam user membership ID format: no-separator-here (expected <user_id>/<team_id>)"
        );
    }

    #[test]
    fn update_is_not_supported() {
        assert!(SCHEMA.fields.iter().all(|f| f.force_new));
    }
}
