//! Workspace state upgrades, one function per version.

use async_trait::async_trait;
use serde_json::{json, Value as Json};
use tracing::{debug, warn};

use scalr_client::{ExecutionMode, ScalrApi};
use scalr_core::{Attrs, AttrsExt, ProviderError, ProviderResult, StateUpgrader, ID_KEY};

use super::TYPE_NAME;
use crate::Migrations;

pub fn chain() -> Migrations {
    Migrations::new(TYPE_NAME)
        .pure("use external_id as the resource id", v0_external_id)
        .pure("move vcs_repo.oauth_token_id to vcs_provider_id", v1_vcs_provider_id)
        .pure("drop deprecated queue_all_runs", v2_drop_queue_all_runs)
        .pure("derive execution_mode from operations", v3_execution_mode)
        .step(QueueAllRunsFromRemote)
}

/// v0 keyed workspaces by `<org>/<name>`; the remote id lived in `external_id`.
pub fn v0_external_id(mut attrs: Attrs) -> Attrs {
    if let Some(external) = attrs.remove("external_id") {
        if !external.is_null() {
            attrs.insert(ID_KEY.into(), external);
        }
    }
    attrs
}

pub fn v1_vcs_provider_id(mut attrs: Attrs) -> Attrs {
    let token = match attrs.get_mut("vcs_repo").and_then(Json::as_array_mut) {
        Some(blocks) if blocks.len() == 1 => blocks[0].as_object_mut().and_then(|b| b.remove("oauth_token_id")),
        _ => None,
    };
    if let Some(token) = token {
        attrs.insert("vcs_provider_id".into(), token);
    }
    attrs
}

pub fn v2_drop_queue_all_runs(mut attrs: Attrs) -> Attrs {
    attrs.remove("queue_all_runs");
    attrs
}

/// `operations` is kept alongside the new field.
pub fn v3_execution_mode(mut attrs: Attrs) -> Attrs {
    if let Some(operations) = attrs.bool_attr("operations") {
        let mode = ExecutionMode::from_operations(operations);
        attrs.insert("execution_mode".into(), json!(mode.as_str()));
    }
    attrs
}

/// v5 reintroduced `queue_all_runs`; its value only exists remotely.
pub struct QueueAllRunsFromRemote;

#[async_trait]
impl StateUpgrader<dyn ScalrApi> for QueueAllRunsFromRemote {
    fn describe(&self) -> &'static str {
        "read queue_all_runs from the remote workspace"
    }

    async fn upgrade(&self, mut attrs: Attrs, api: &(dyn ScalrApi + 'static)) -> ProviderResult<Attrs> {
        let Some(id) = attrs.str_attr(ID_KEY).filter(|s| !s.is_empty()).map(str::to_string) else {
            warn!("workspace state has no id; leaving queue_all_runs unset");
            return Ok(attrs);
        };
        debug!(id = %id, "reading workspace for state upgrade");
        match api.read_workspace(&id).await {
            Ok(ws) => {
                attrs.insert("queue_all_runs".into(), json!(ws.queue_all_runs));
                Ok(attrs)
            }
            Err(e) if e.is_not_found() => {
                warn!(id = %id, "workspace not found during state upgrade; next read will drop it");
                Ok(attrs)
            }
            Err(e) => Err(ProviderError::remote("reading", format!("workspace {}", id), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(v: Json) -> Attrs {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn v0_moves_external_id() {
        let out = v0_external_id(attrs(json!({ "id": "my-org/test", "external_id": "ws-123" })));
        assert_eq!(Json::Object(out), json!({ "id": "ws-123" }));
    }

    #[test]
    fn v1_lifts_token_out_of_vcs_repo() {
        let out = v1_vcs_provider_id(attrs(json!({
            "id": "my-org/test",
            "vcs_repo": [{ "oauth_token_id": "test_provider_id", "identifier": "test_identifier" }]
        })));
        assert_eq!(
            Json::Object(out),
            json!({
                "id": "my-org/test",
                "vcs_repo": [{ "identifier": "test_identifier" }],
                "vcs_provider_id": "test_provider_id"
            })
        );
    }

    #[test]
    fn v1_without_vcs_is_unchanged() {
        let before = attrs(json!({ "id": "ws-123" }));
        assert_eq!(v1_vcs_provider_id(before.clone()), before);
    }

    #[test]
    fn v2_drops_queue_all_runs() {
        let out = v2_drop_queue_all_runs(attrs(json!({ "id": "ws-1", "queue_all_runs": false })));
        assert_eq!(Json::Object(out), json!({ "id": "ws-1" }));
    }

    #[test]
    fn v3_maps_operations_to_execution_mode() {
        let out = v3_execution_mode(attrs(json!({ "operations": false })));
        assert_eq!(Json::Object(out), json!({ "operations": false, "execution_mode": "local" }));
        let out = v3_execution_mode(attrs(json!({ "operations": true })));
        assert_eq!(out["execution_mode"], json!("remote"));
        let before = attrs(json!({ "id": "ws-1" }));
        assert_eq!(v3_execution_mode(before.clone()), before);
    }
}
