//! `scalr_workspace`.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use scalr_client::{
    ExecutionMode, Relation, ScalrApi, VcsRepo, Workspace, WorkspaceCreateOptions, WorkspaceUpdateOptions,
};
use scalr_core::{Attrs, AttrsExt, ProviderError, ProviderResult};
use scalr_schema::{Field, FieldDefault, FieldType, ResourceSchema, CREATED_BY};

use crate::{created_by_block, found, remote, Instance, Migrations, Resource};

pub mod migrate;

pub const TYPE_NAME: &str = "scalr_workspace";
const KIND: &str = "workspace";

const VCS_REPO: &[Field] = &[
    Field::required("identifier", FieldType::String),
    Field::optional("branch", FieldType::String),
    Field::optional("path", FieldType::String),
    Field::optional("trigger_prefixes", FieldType::List),
];

const FIELDS: &[Field] = &[
    Field::required("name", FieldType::String),
    Field::required("environment_id", FieldType::String).force_new(),
    Field::optional("auto_apply", FieldType::Bool).default(FieldDefault::Bool(false)),
    Field::optional_computed("execution_mode", FieldType::String).one_of(&["remote", "local"]),
    Field::optional_computed("operations", FieldType::Bool)
        .deprecated("The attribute `operations` is deprecated. Use `execution_mode` instead"),
    Field::optional_computed("queue_all_runs", FieldType::Bool),
    Field::optional_computed("terraform_version", FieldType::String),
    Field::optional("working_directory", FieldType::String),
    Field::optional("vcs_provider_id", FieldType::String),
    Field::optional("vcs_repo", FieldType::Block(VCS_REPO)).max_items(1),
    Field::computed("created_by", FieldType::Block(CREATED_BY)),
];

pub const SCHEMA: ResourceSchema = ResourceSchema::new(TYPE_NAME, 5, FIELDS);

pub struct WorkspaceResource {
    migrations: Migrations,
}

impl WorkspaceResource {
    pub fn new() -> Self {
        Self { migrations: migrate::chain() }
    }
}

impl Default for WorkspaceResource {
    fn default() -> Self {
        Self::new()
    }
}

pub fn flatten(ws: &Workspace) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert("name".into(), json!(ws.name));
    attrs.insert("environment_id".into(), json!(ws.environment.id));
    attrs.insert("auto_apply".into(), json!(ws.auto_apply));
    attrs.insert("execution_mode".into(), json!(ws.execution_mode.as_str()));
    attrs.insert("operations".into(), json!(ws.execution_mode == ExecutionMode::Remote));
    attrs.insert("queue_all_runs".into(), json!(ws.queue_all_runs));
    attrs.insert("terraform_version".into(), json!(ws.terraform_version));
    attrs.insert("working_directory".into(), json!(ws.working_directory));
    if let Some(provider) = &ws.vcs_provider {
        attrs.insert("vcs_provider_id".into(), json!(provider.id));
    }
    let repo = match &ws.vcs_repo {
        Some(r) => json!([{
            "identifier": r.identifier,
            "branch": r.branch,
            "path": r.path,
            "trigger_prefixes": r.trigger_prefixes,
        }]),
        None => json!([]),
    };
    attrs.insert("vcs_repo".into(), repo);
    attrs.insert("created_by".into(), created_by_block(ws.created_by.as_ref()));
    attrs
}

/// `execution_mode` wins; the deprecated `operations` flag maps onto it.
fn execution_mode_of(attrs: &Attrs) -> ProviderResult<Option<ExecutionMode>> {
    if let Some(mode) = attrs.str_attr("execution_mode") {
        return ExecutionMode::parse(mode)
            .map(Some)
            .ok_or_else(|| ProviderError::Validation(format!("execution_mode: unknown mode {:?}", mode)));
    }
    Ok(attrs.bool_attr("operations").map(ExecutionMode::from_operations))
}

fn vcs_of(attrs: &Attrs) -> ProviderResult<(Option<Relation>, Option<VcsRepo>)> {
    let provider = attrs.str_attr("vcs_provider_id").filter(|s| !s.is_empty()).map(Relation::new);
    let repo = attrs.block("vcs_repo").map(|b| VcsRepo {
        identifier: b.str_attr("identifier").unwrap_or_default().to_string(),
        branch: b.str_attr("branch").unwrap_or_default().to_string(),
        path: b.str_attr("path").unwrap_or_default().to_string(),
        trigger_prefixes: b.string_list("trigger_prefixes"),
    });
    match (&provider, &repo) {
        (None, Some(_)) => Err(ProviderError::Validation("vcs_repo requires vcs_provider_id".into())),
        (Some(_), None) => Err(ProviderError::Validation("vcs_provider_id requires a vcs_repo block".into())),
        _ => Ok((provider, repo)),
    }
}

#[async_trait]
impl Resource for WorkspaceResource {
    fn schema(&self) -> &'static ResourceSchema {
        &SCHEMA
    }

    fn migrations(&self) -> &Migrations {
        &self.migrations
    }

    async fn create(&self, api: &dyn ScalrApi, desired: &Attrs) -> ProviderResult<Option<Instance>> {
        let name = desired.str_attr("name").unwrap_or_default().to_string();
        let environment = desired.str_attr("environment_id").unwrap_or_default().to_string();
        let (vcs_provider, vcs_repo) = vcs_of(desired)?;
        let opts = WorkspaceCreateOptions {
            id: None,
            name: name.clone(),
            environment: Relation::new(environment.clone()),
            auto_apply: desired.bool_attr("auto_apply"),
            execution_mode: execution_mode_of(desired)?,
            queue_all_runs: desired.bool_attr("queue_all_runs"),
            terraform_version: desired.str_attr("terraform_version").map(str::to_string),
            working_directory: desired.str_attr("working_directory").map(str::to_string),
            vcs_provider,
            vcs_repo,
        };
        debug!(name = %name, environment = %environment, "creating workspace");
        let ws = api
            .create_workspace(opts)
            .await
            .map_err(remote("creating", format!("workspace {} in environment {}", name, environment)))?;
        info!(id = %ws.id, name = %name, "workspace created");
        self.read(api, &ws.id).await
    }

    async fn read(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Option<Instance>> {
        debug!(id, "reading workspace");
        let ws = found(api.read_workspace(id).await).map_err(remote("reading", format!("workspace {}", id)))?;
        Ok(ws.map(|ws| Instance::new(ws.id.clone(), flatten(&ws))))
    }

    async fn update(
        &self,
        api: &dyn ScalrApi,
        id: &str,
        desired: &Attrs,
        _observed: &Attrs,
    ) -> ProviderResult<Option<Instance>> {
        let (vcs_provider, vcs_repo) = vcs_of(desired)?;
        let opts = WorkspaceUpdateOptions {
            name: desired.str_attr("name").map(str::to_string),
            auto_apply: Some(desired.bool_attr("auto_apply").unwrap_or(false)),
            execution_mode: execution_mode_of(desired)?,
            queue_all_runs: desired.bool_attr("queue_all_runs"),
            terraform_version: desired.str_attr("terraform_version").map(str::to_string),
            working_directory: Some(desired.str_attr("working_directory").unwrap_or_default().to_string()),
            vcs_provider,
            vcs_repo,
        };
        debug!(id, "updating workspace");
        api.update_workspace(id, opts).await.map_err(remote("updating", format!("workspace {}", id)))?;
        self.read(api, id).await
    }

    async fn delete(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<()> {
        debug!(id, "deleting workspace");
        found(api.delete_workspace(id).await).map_err(remote("deleting", format!("workspace {}", id)))?;
        Ok(())
    }

    async fn import(&self, api: &dyn ScalrApi, id: &str) -> ProviderResult<Instance> {
        self.read(api, id).await?.ok_or_else(|| ProviderError::not_found(KIND, id))
    }
}
