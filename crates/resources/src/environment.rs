//! `scalr_environment`.
//!
//! Scalar and plain-list fields go out as a full replacement payload. `tag_ids`
//! is a relationship: updates send only the delta between desired and observed
//! tags through the tag endpoints, add phase first. Tags in neither set, such
//! as ones another writer attached after `observed` was read, are left alone.

use async_trait::async_trait;
use metrics::counter;
use serde_json::json;
use tracing::{debug, info};

use scalr_client::{
    relations, Environment, EnvironmentCreateOptions, EnvironmentUpdateOptions, Relation, ScalrApi,
};
use scalr_core::relation::diff;
use scalr_core::{Attrs, AttrsExt, ProviderError, ProviderResult};
use scalr_schema::{Field, FieldDefault, FieldType, ResourceSchema, ACCOUNT_ID_ENV, CREATED_BY};

use crate::{account_of, created_by_block, found, id_array, relation_list, remote, Instance, Migrations, Resource};

pub const TYPE_NAME: &str = "scalr_environment";
const KIND: &str = "environment";

const FIELDS: &[Field] = &[
    Field::required("name", FieldType::String),
    Field::optional_computed("cost_estimation_enabled", FieldType::Bool),
    Field::computed("status", FieldType::String),
    Field::computed("created_by", FieldType::Block(CREATED_BY)),
    Field::optional_computed("account_id", FieldType::String)
        .force_new()
        .default(FieldDefault::Env(ACCOUNT_ID_ENV)),
    Field::optional_computed("cloud_credentials", FieldType::List).deprecated(
        "The attribute `cloud_credentials` is deprecated. Use `default_provider_configurations` instead",
    ),
    Field::optional_computed("policy_groups", FieldType::List),
    Field::optional_computed("default_provider_configurations", FieldType::Set),
    Field::optional("tag_ids", FieldType::Set),
];

pub const SCHEMA: ResourceSchema = ResourceSchema::new(TYPE_NAME, 0, FIELDS);

pub struct EnvironmentResource {
    migrations: Migrations,
}

impl EnvironmentResource {
    pub fn new() -> Self {
        Self { migrations: Migrations::new(TYPE_NAME) }
    }
}

impl Default for EnvironmentResource {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote representation to state attributes.
pub fn flatten(env: &Environment) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert("name".into(), json!(env.name));
    attrs.insert("account_id".into(), json!(env.account.id));
    attrs.insert("cost_estimation_enabled".into(), json!(env.cost_estimation_enabled));
    attrs.insert("status".into(), json!(env.status));
    attrs.insert("created_by".into(), created_by_block(env.created_by.as_ref()));
    attrs.insert("cloud_credentials".into(), id_array(&env.cloud_credentials));
    attrs.insert("policy_groups".into(), id_array(&env.policy_groups));
    attrs.insert("default_provider_configurations".into(), id_array(&env.default_provider_configurations));
    attrs.insert("tag_ids".into(), id_array(&env.tags));
    attrs
}

fn tag_set(attrs: &Attrs) -> std::collections::BTreeSet<String> {
    attrs.string_set("tag_ids")
}

#[async_trait]
impl Resource for EnvironmentResource {
    fn schema(&self) -> &'static ResourceSchema {
        &SCHEMA
    }

    fn migrations(&self) -> &Migrations {
        &self.migrations
    }

    async fn create(&self, api: &dyn ScalrApi, desired: &Attrs) -> ProviderResult<Option<Instance>> {
        let name = desired.str_attr("name").unwrap_or_default().to_string();
        let account = account_of(desired)?;
        let tags = desired.present("tag_ids").map(|_| relations(tag_set(desired)));
        let opts = EnvironmentCreateOptions {
            name: name.clone(),
            cost_estimation_enabled: desired.bool_attr("cost_estimation_enabled"),
            cloud_credentials: relation_list(desired, "cloud_credentials")?.unwrap_or_default(),
            policy_groups: relation_list(desired, "policy_groups")?.unwrap_or_default(),
            default_provider_configurations: relation_list(desired, "default_provider_configurations")?,
            tags,
            account: account.clone(),
        };

        debug!(name = %name, account = %account.id, "creating environment");
        let env = api
            .create_environment(opts)
            .await
            .map_err(remote("creating", format!("environment {} for account {}", name, account.id)))?;
        info!(id = %env.id, name = %name, "environment created");
        self.read(api, &env.id).await
    }

    async fn read(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Option<Instance>> {
        debug!(id, "reading environment");
        let env = found(api.read_environment(id).await).map_err(remote("reading", format!("environment {}", id)))?;
        Ok(env.map(|env| Instance::new(env.id.clone(), flatten(&env))))
    }

    async fn update(
        &self,
        api: &dyn ScalrApi,
        id: &str,
        desired: &Attrs,
        observed: &Attrs,
    ) -> ProviderResult<Option<Instance>> {
        // Optional+computed lists keep the prior value when omitted.
        let keep = |key: &str| -> ProviderResult<Vec<Relation>> {
            match relation_list(desired, key)? {
                Some(list) => Ok(list),
                None => Ok(relation_list(observed, key)?.unwrap_or_default()),
            }
        };
        let opts = EnvironmentUpdateOptions {
            name: desired.str_attr("name").map(str::to_string),
            cost_estimation_enabled: desired
                .bool_attr("cost_estimation_enabled")
                .or_else(|| observed.bool_attr("cost_estimation_enabled")),
            cloud_credentials: keep("cloud_credentials")?,
            policy_groups: keep("policy_groups")?,
            default_provider_configurations: relation_list(desired, "default_provider_configurations")?
                .unwrap_or_default(),
        };

        debug!(id, "updating environment");
        api.update_environment(id, opts).await.map_err(remote("updating", format!("environment {}", id)))?;

        let delta = diff(&tag_set(desired), &tag_set(observed));
        if !delta.to_add.is_empty() {
            let n = delta.to_add.len();
            if let Err(e) = api.add_environment_tags(id, relations(delta.to_add)).await {
                let skipped = delta.to_remove.len();
                let op = if skipped > 0 {
                    format!("adding tags ({} removal(s) not attempted) to", skipped)
                } else {
                    "adding tags to".to_string()
                };
                return Err(ProviderError::remote(op, format!("environment {}", id), e));
            }
            counter!("relation_changes_total", n as u64, "relation" => "environment_tags", "phase" => "add");
        }
        if !delta.to_remove.is_empty() {
            let n = delta.to_remove.len();
            api.delete_environment_tags(id, relations(delta.to_remove))
                .await
                .map_err(remote("deleting tags from", format!("environment {}", id)))?;
            counter!("relation_changes_total", n as u64, "relation" => "environment_tags", "phase" => "remove");
        }

        self.read(api, id).await
    }

    async fn delete(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<()> {
        debug!(id, "deleting environment");
        found(api.delete_environment(id).await).map_err(remote("deleting", format!("environment {}", id)))?;
        Ok(())
    }

    async fn import(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Instance> {
        self.read(api, id).await?.ok_or_else(|| ProviderError::not_found(KIND, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalr_client::CreatedBy;

    #[test]
    fn flatten_maps_relations_and_audit_block() {
        let env = Environment {
            id: "env-1".into(),
            name: "prod".into(),
            status: "Active".into(),
            account: Relation::new("acc-1"),
            created_by: Some(CreatedBy { username: "u".into(), email: "u@x".into(), full_name: "U".into() }),
            policy_groups: relations(["pg-1"]),
            tags: relations(["tag-2", "tag-1"]),
            ..Environment::default()
        };
        let attrs = flatten(&env);
        assert_eq!(attrs["account_id"], json!("acc-1"));
        assert_eq!(attrs["policy_groups"], json!(["pg-1"]));
        assert_eq!(attrs["cloud_credentials"], json!([]));
        assert_eq!(attrs.block("created_by").and_then(|b| b.str_attr("email")), Some("u@x"));
        assert_eq!(tag_set(&attrs).into_iter().collect::<Vec<_>>(), vec!["tag-1", "tag-2"]);
    }

    #[test]
    fn schema_accepts_minimal_config() {
        let cfg: Attrs = json!({ "name": "prod", "account_id": "acc-1" }).as_object().cloned().unwrap_or_default();
        assert!(SCHEMA.validate(&cfg).unwrap().is_empty());
        let cfg: Attrs = json!({ "name": "prod", "cloud_credentials": ["cc-1"] }).as_object().cloned().unwrap_or_default();
        assert_eq!(SCHEMA.validate(&cfg).unwrap().len(), 1);
    }
}
