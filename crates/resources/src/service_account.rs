//! `scalr_service_account` resource and data source.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use scalr_client::{
    ScalrApi, ServiceAccount, ServiceAccountCreateOptions, ServiceAccountListOptions, ServiceAccountStatus,
    ServiceAccountUpdateOptions,
};
use scalr_core::{Attrs, AttrsExt, ProviderError, ProviderResult};
use scalr_schema::{Field, FieldDefault, FieldType, ResourceSchema, ACCOUNT_ID_ENV, CREATED_BY};

use crate::{account_of, created_by_block, found, remote, DataSource, Instance, Migrations, Resource};

pub const TYPE_NAME: &str = "scalr_service_account";
const KIND: &str = "service account";
const STATUSES: &[&str] = &["Active", "Inactive"];

const FIELDS: &[Field] = &[
    Field::required("name", FieldType::String),
    Field::optional("description", FieldType::String),
    Field::optional_computed("status", FieldType::String).one_of(STATUSES),
    Field::computed("email", FieldType::String),
    Field::optional_computed("account_id", FieldType::String)
        .force_new()
        .default(FieldDefault::Env(ACCOUNT_ID_ENV)),
    Field::computed("created_by", FieldType::Block(CREATED_BY)),
];

pub const SCHEMA: ResourceSchema = ResourceSchema::new(TYPE_NAME, 0, FIELDS);

const LOOKUP_FIELDS: &[Field] = &[
    Field::optional_computed("id", FieldType::String).at_least_one_of(&["email"]),
    Field::optional_computed("email", FieldType::String).conflicts_with(&["id"]),
    Field::computed("name", FieldType::String),
    Field::computed("description", FieldType::String),
    Field::computed("status", FieldType::String),
    Field::optional_computed("account_id", FieldType::String).default(FieldDefault::Env(ACCOUNT_ID_ENV)),
    Field::computed("created_by", FieldType::Block(CREATED_BY)),
];

pub const LOOKUP_SCHEMA: ResourceSchema = ResourceSchema::new(TYPE_NAME, 0, LOOKUP_FIELDS);

pub fn flatten(sa: &ServiceAccount) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert("name".into(), json!(sa.name));
    attrs.insert("email".into(), json!(sa.email));
    attrs.insert("description".into(), json!(sa.description));
    attrs.insert("status".into(), json!(sa.status.as_str()));
    attrs.insert("account_id".into(), json!(sa.account.id));
    attrs.insert("created_by".into(), created_by_block(sa.created_by.as_ref()));
    attrs
}

fn status_of(attrs: &Attrs) -> ProviderResult<Option<ServiceAccountStatus>> {
    match attrs.str_attr("status") {
        None => Ok(None),
        Some(s) => ServiceAccountStatus::parse(s)
            .map(Some)
            .ok_or_else(|| ProviderError::Validation(format!("status: expected one of [{}], got {:?}", STATUSES.join(", "), s))),
    }
}

pub struct ServiceAccountResource {
    migrations: Migrations,
}

impl ServiceAccountResource {
    pub fn new() -> Self {
        Self { migrations: Migrations::new(TYPE_NAME) }
    }
}

impl Default for ServiceAccountResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for ServiceAccountResource {
    fn schema(&self) -> &'static ResourceSchema {
        &SCHEMA
    }

    fn migrations(&self) -> &Migrations {
        &self.migrations
    }

    async fn create(&self, api: &dyn ScalrApi, desired: &Attrs) -> ProviderResult<Option<Instance>> {
        let name = desired.str_attr("name").unwrap_or_default().to_string();
        let account = account_of(desired)?;
        let opts = ServiceAccountCreateOptions {
            name: name.clone(),
            description: desired.str_attr("description").map(str::to_string),
            status: status_of(desired)?,
            account: account.clone(),
        };
        debug!(name = %name, account = %account.id, "creating service account");
        let sa = api
            .create_service_account(opts)
            .await
            .map_err(remote("creating", format!("service account {} for account {}", name, account.id)))?;
        info!(id = %sa.id, email = %sa.email, "service account created");
        self.read(api, &sa.id).await
    }

    async fn read(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Option<Instance>> {
        debug!(id, "reading service account");
        let sa = found(api.read_service_account(id).await)
            .map_err(remote("reading", format!("service account {}", id)))?;
        Ok(sa.map(|sa| Instance::new(sa.id.clone(), flatten(&sa))))
    }

    async fn update(
        &self,
        api: &dyn ScalrApi,
        id: &str,
        desired: &Attrs,
        _observed: &Attrs,
    ) -> ProviderResult<Option<Instance>> {
        let opts = ServiceAccountUpdateOptions {
            name: desired.str_attr("name").map(str::to_string),
            // Optional without a remote default: omission clears it.
            description: Some(desired.str_attr("description").unwrap_or_default().to_string()),
            status: status_of(desired)?,
        };
        debug!(id, "updating service account");
        api.update_service_account(id, opts)
            .await
            .map_err(remote("updating", format!("service account {}", id)))?;
        self.read(api, id).await
    }

    async fn delete(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<()> {
        debug!(id, "deleting service account");
        found(api.delete_service_account(id).await).map_err(remote("deleting", format!("service account {}", id)))?;
        Ok(())
    }

    async fn import(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Instance> {
        self.read(api, id).await?.ok_or_else(|| ProviderError::not_found(KIND, id))
    }
}

/// Lookup by `id`, or by `email` within `account_id` through the filtered list.
pub struct ServiceAccountDataSource;

#[async_trait]
impl DataSource for ServiceAccountDataSource {
    fn schema(&self) -> &'static ResourceSchema {
        &LOOKUP_SCHEMA
    }

    async fn read(&self, api: &dyn ScalrApi, query: &Attrs) -> ProviderResult<Instance> {
        let sa = match query.str_attr("id").filter(|s| !s.is_empty()) {
            Some(id) => {
                debug!(id, "reading service account");
                api.read_service_account(id).await.map_err(|e| {
                    if e.is_not_found() {
                        ProviderError::not_found(KIND, id)
                    } else {
                        ProviderError::remote("retrieving", KIND, e)
                    }
                })?
            }
            None => {
                let email = query.str_attr("email").unwrap_or_default().to_string();
                let account = query.str_attr("account_id").unwrap_or_default().to_string();
                let opts = ServiceAccountListOptions {
                    email: Some(email.clone()),
                    account: Some(account.clone()),
                    include: Some("created-by".into()),
                };
                debug!(account = %account, email = %email, "looking up service account");
                let page = api.list_service_accounts(opts).await.map_err(remote("retrieving", KIND.to_string()))?;
                match page.total_count {
                    0 => return Err(ProviderError::not_found(KIND, format!("{}/{}", account, email))),
                    1 => page
                        .items
                        .into_iter()
                        .next()
                        .ok_or_else(|| ProviderError::not_found(KIND, format!("{}/{}", account, email)))?,
                    n => return Err(ProviderError::AmbiguousQuery { kind: KIND, matches: n }),
                }
            }
        };
        let mut attrs = flatten(&sa);
        attrs.insert("id".into(), json!(sa.id));
        Ok(Instance::new(sa.id, attrs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_must_be_known() {
        let attrs: Attrs = json!({ "status": "Paused" }).as_object().cloned().unwrap();
        assert!(status_of(&attrs).is_err());
        let attrs: Attrs = json!({ "status": "Inactive" }).as_object().cloned().unwrap();
        assert_eq!(status_of(&attrs).unwrap(), Some(ServiceAccountStatus::Inactive));
    }

    #[test]
    fn lookup_requires_id_or_email() {
        assert!(LOOKUP_SCHEMA.validate(&Attrs::new()).is_err());
        let both: Attrs = json!({ "id": "sa-1", "email": "a@b" }).as_object().cloned().unwrap();
        assert!(LOOKUP_SCHEMA.validate(&both).is_err());
    }
}
