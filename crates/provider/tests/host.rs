#![forbid(unsafe_code)]

use std::sync::Arc;

use serde_json::{json, Value as Json};

use scalr_client::{relations, Environment, MemoryClient, Op, Relation, ScalrApi, Team, User, WorkspaceCreateOptions};
use scalr_core::{Attrs, ProviderError, StateDoc};
use scalr_persist::{SqliteStateStore, StateStore};
use scalr_provider::{ApplyAction, Host, Provider, ProviderConfig};

fn attrs(v: Json) -> Attrs {
    v.as_object().cloned().unwrap()
}

fn setup() -> (Arc<MemoryClient>, Host<SqliteStateStore>) {
    let client = Arc::new(MemoryClient::new());
    let api: Arc<dyn ScalrApi> = client.clone();
    let provider = Provider::new(ProviderConfig::default().with_account("acc-1"), api);
    let store = SqliteStateStore::open_in_memory().unwrap();
    (client, Host::new(provider, store))
}

async fn seed_workspace(client: &MemoryClient, id: &str) {
    client
        .insert_environment(Environment {
            id: "env-1".into(),
            name: "prod".into(),
            account: Relation::new("acc-1"),
            ..Environment::default()
        })
        .unwrap();
    client
        .create_workspace(WorkspaceCreateOptions {
            id: Some(id.into()),
            name: "app".into(),
            environment: Relation::new("env-1"),
            queue_all_runs: Some(false),
            ..WorkspaceCreateOptions::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn stored_v0_workspace_is_upgraded_before_read() {
    let (client, host) = setup();
    seed_workspace(&client, "ws-123").await;
    host.store()
        .put("scalr_workspace", "app", &StateDoc::from_json(0, json!({ "id": "my-org/app", "external_id": "ws-123" })))
        .unwrap();

    let doc = host.refresh("scalr_workspace", "app").await.unwrap().unwrap();
    assert_eq!(doc.version, 5);
    assert_eq!(doc.id(), Some("ws-123"));
    assert_eq!(doc.attrs["queue_all_runs"], json!(false));

    let stored = host.store().get("scalr_workspace", "app").unwrap().unwrap();
    assert_eq!(stored.doc, doc);
}

#[tokio::test]
async fn upgrade_persists_without_refresh() {
    let (client, host) = setup();
    seed_workspace(&client, "ws-123").await;
    host.store()
        .put("scalr_workspace", "app", &StateDoc::from_json(3, json!({ "id": "ws-123", "operations": true })))
        .unwrap();
    let doc = host.upgrade("scalr_workspace", "app").await.unwrap().unwrap();
    assert_eq!(doc.version, 5);
    assert_eq!(doc.attrs["execution_mode"], json!("remote"));
    assert_eq!(host.store().get("scalr_workspace", "app").unwrap().unwrap().doc.version, 5);
}

#[tokio::test]
async fn vanished_remote_object_drops_state() {
    let (client, host) = setup();
    let out = host.apply("scalr_environment", "prod", &attrs(json!({ "name": "prod" }))).await.unwrap();
    assert_eq!(out.action, ApplyAction::Created);
    let id = out.state.id().unwrap().to_string();

    client.remove_environment(&id).unwrap();
    assert_eq!(host.refresh("scalr_environment", "prod").await.unwrap(), None);
    assert!(host.store().get("scalr_environment", "prod").unwrap().is_none());
}

#[tokio::test]
async fn apply_converges_in_steps() {
    let (client, host) = setup();
    let cfg = attrs(json!({ "name": "prod", "tag_ids": ["t1"] }));
    let created = host.apply("scalr_environment", "prod", &cfg).await.unwrap();
    assert_eq!(created.action, ApplyAction::Created);
    assert_eq!(created.state.attrs["account_id"], json!("acc-1"));

    let again = host.apply("scalr_environment", "prod", &cfg).await.unwrap();
    assert_eq!(again.action, ApplyAction::Unchanged);

    let renamed = host.apply("scalr_environment", "prod", &attrs(json!({ "name": "production", "tag_ids": ["t1"] }))).await.unwrap();
    assert_eq!(renamed.action, ApplyAction::Updated);
    assert_eq!(renamed.state.id(), created.state.id());

    let moved = host
        .apply("scalr_environment", "prod", &attrs(json!({ "name": "production", "account_id": "acc-2" })))
        .await
        .unwrap();
    assert_eq!(moved.action, ApplyAction::Replaced);
    assert_ne!(moved.state.id(), created.state.id());
    assert!(client.environment(created.state.id().unwrap()).is_none());
}

#[tokio::test]
async fn deprecated_attributes_are_reported() {
    let (_client, host) = setup();
    let out = host
        .apply("scalr_environment", "prod", &attrs(json!({ "name": "prod", "cloud_credentials": ["cc-1"] })))
        .await
        .unwrap();
    assert_eq!(out.warnings.len(), 1);
}

#[tokio::test]
async fn import_then_destroy_membership() {
    let (client, host) = setup();
    for id in ["u1", "u2"] {
        client.insert_user(User { id: id.into(), ..User::default() }).unwrap();
    }
    client.insert_team(Team { id: "t1".into(), name: "ops".into(), users: relations(["u1", "u2"]) }).unwrap();

    let doc = host.import("scalr_iam_user_membership", "ops_u1", "u1/t1").await.unwrap();
    assert_eq!(doc.attrs["team_id"], json!("t1"));
    assert!(host.import("scalr_iam_user_membership", "ops_u1", "u1/t1").await.is_err());

    assert!(host.destroy("scalr_iam_user_membership", "ops_u1").await.unwrap());
    assert_eq!(client.team("t1").unwrap().users, relations(["u2"]));
    assert!(!host.destroy("scalr_iam_user_membership", "ops_u1").await.unwrap());
}

#[tokio::test]
async fn membership_changes_force_replacement() {
    let (client, host) = setup();
    for id in ["u1", "u2"] {
        client.insert_user(User { id: id.into(), ..User::default() }).unwrap();
    }
    client.insert_team(Team { id: "t1".into(), name: "ops".into(), users: vec![] }).unwrap();

    let first = host.apply("scalr_iam_user_membership", "m", &attrs(json!({ "user_id": "u1", "team_id": "t1" }))).await.unwrap();
    assert_eq!(first.state.id(), Some("u1/t1"));

    let err = host
        .provider()
        .update("scalr_iam_user_membership", first.state.clone(), &attrs(json!({ "user_id": "u2", "team_id": "t1" })))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)));

    let second = host.apply("scalr_iam_user_membership", "m", &attrs(json!({ "user_id": "u2", "team_id": "t1" }))).await.unwrap();
    assert_eq!(second.action, ApplyAction::Replaced);
    assert_eq!(client.team("t1").unwrap().users, relations(["u2"]));
}

#[tokio::test]
async fn data_source_uses_provider_account_default() {
    let (client, host) = setup();
    host.apply("scalr_service_account", "ci", &attrs(json!({ "name": "ci" }))).await.unwrap();
    client.clear_calls();

    let found = host
        .provider()
        .read_data_source("scalr_service_account", &attrs(json!({ "email": "ci@acc-1.scalr.io" })))
        .await
        .unwrap();
    assert_eq!(found["name"], json!("ci"));
    assert_eq!(client.calls(), vec![Op::ListServiceAccounts]);
}

#[tokio::test]
async fn unknown_types_are_rejected() {
    let (_client, host) = setup();
    let err = host.apply("scalr_nope", "x", &Attrs::new()).await.unwrap_err();
    assert!(err.to_string().contains("unknown resource type"));
}

#[tokio::test]
async fn set_fields_compare_without_order() {
    let (client, host) = setup();
    let cfg = attrs(json!({ "name": "prod", "tag_ids": ["t2", "t1"] }));
    host.apply("scalr_environment", "prod", &cfg).await.unwrap();
    client.clear_calls();

    let again = host.apply("scalr_environment", "prod", &cfg).await.unwrap();
    assert_eq!(again.action, ApplyAction::Unchanged);
    assert_eq!(client.calls(), vec![Op::ReadEnvironment]);
}

#[tokio::test]
async fn tags_present_at_refresh_are_reconciled_as_a_delta() {
    let (client, host) = setup();
    let cfg = attrs(json!({ "name": "prod", "tag_ids": ["t1"] }));
    let created = host.apply("scalr_environment", "prod", &cfg).await.unwrap();
    let id = created.state.id().unwrap().to_string();
    client.add_environment_tags(&id, vec![Relation::new("t-oob")]).await.unwrap();
    client.clear_calls();

    let out = host.apply("scalr_environment", "prod", &cfg).await.unwrap();
    assert_eq!(out.action, ApplyAction::Updated);
    assert_eq!(client.call_count(Op::AddEnvironmentTags), 0);
    assert_eq!(client.call_count(Op::DeleteEnvironmentTags), 1);
    assert_eq!(client.environment(&id).unwrap().tags, relations(["t1"]));
    assert_eq!(out.state.attrs["tag_ids"], json!(["t1"]));
}

#[tokio::test]
async fn vanished_team_drops_membership_state() {
    let (client, host) = setup();
    client.insert_user(User { id: "u1".into(), ..User::default() }).unwrap();
    client.insert_team(Team { id: "t1".into(), name: "ops".into(), users: vec![] }).unwrap();
    host.apply("scalr_iam_user_membership", "m", &attrs(json!({ "user_id": "u1", "team_id": "t1" }))).await.unwrap();

    assert!(client.remove_team("t1").unwrap().is_some());
    assert_eq!(host.refresh("scalr_iam_user_membership", "m").await.unwrap(), None);
    assert!(host.store().get("scalr_iam_user_membership", "m").unwrap().is_none());
}
