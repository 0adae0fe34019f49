#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde_json::{json, Value as Json};

use scalr_client::{relation_ids, relations, ClientError, MemoryClient, Op, Relation, ScalrApi};
use scalr_core::{Attrs, ProviderError};
use scalr_resources::{EnvironmentResource, Instance, Resource};

fn attrs(v: Json) -> Attrs {
    v.as_object().cloned().unwrap()
}

fn tags(c: &MemoryClient, id: &str) -> BTreeSet<String> {
    relation_ids(&c.environment(id).unwrap().tags).into_iter().collect()
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

async fn created(c: &MemoryClient, cfg: Json) -> Instance {
    EnvironmentResource::new().create(c, &attrs(cfg)).await.unwrap().unwrap()
}

#[tokio::test]
async fn create_reads_back_remote_defaults() {
    let c = MemoryClient::new();
    let inst = created(&c, json!({ "name": "prod", "account_id": "acc-1", "tag_ids": ["tag-1", "tag-2"] })).await;
    assert!(inst.id.starts_with("env-"));
    assert_eq!(inst.attrs["status"], json!("Active"));
    assert_eq!(inst.attrs["cost_estimation_enabled"], json!(false));
    assert_eq!(inst.attrs["created_by"][0]["username"], json!("provider"));
    assert_eq!(tags(&c, &inst.id), set(&["tag-1", "tag-2"]));
    assert_eq!(c.calls(), vec![Op::CreateEnvironment, Op::ReadEnvironment]);
}

#[tokio::test]
async fn create_without_account_fails_locally() {
    let c = MemoryClient::new();
    let err = EnvironmentResource::new().create(&c, &attrs(json!({ "name": "prod" }))).await.unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)));
    assert!(c.calls().is_empty());
}

#[tokio::test]
async fn remote_rejection_is_wrapped_with_context() {
    let c = MemoryClient::new();
    c.fail_next(Op::CreateEnvironment, ClientError::Api { status: 500, message: "boom".into() }).unwrap();
    let err = EnvironmentResource::new()
        .create(&c, &attrs(json!({ "name": "prod", "account_id": "acc-1" })))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "error creating environment prod for account acc-1: api error 500: boom");
}

#[tokio::test]
async fn update_sends_only_the_tag_delta() {
    let c = MemoryClient::new();
    let r = EnvironmentResource::new();
    let inst = created(&c, json!({ "name": "prod", "account_id": "acc-1", "tag_ids": ["t1", "t2"] })).await;
    // Attached by another writer after `observed` was read; not desired.
    c.add_environment_tags(&inst.id, vec![Relation::new("t-oob")]).await.unwrap();
    c.clear_calls();

    let desired = attrs(json!({ "name": "prod", "account_id": "acc-1", "tag_ids": ["t2", "t3"] }));
    let out = r.update(&c, &inst.id, &desired, &inst.attrs).await.unwrap().unwrap();

    assert_eq!(tags(&c, &inst.id), set(&["t2", "t3", "t-oob"]));
    assert_eq!(
        c.calls(),
        vec![Op::UpdateEnvironment, Op::AddEnvironmentTags, Op::DeleteEnvironmentTags, Op::ReadEnvironment]
    );
    assert_eq!(out.attrs["tag_ids"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn unchanged_tags_make_no_relationship_calls() {
    let c = MemoryClient::new();
    let r = EnvironmentResource::new();
    let inst = created(&c, json!({ "name": "prod", "account_id": "acc-1", "tag_ids": ["t1"] })).await;
    c.clear_calls();
    let desired = attrs(json!({ "name": "renamed", "account_id": "acc-1", "tag_ids": ["t1"] }));
    let out = r.update(&c, &inst.id, &desired, &inst.attrs).await.unwrap().unwrap();
    assert_eq!(out.attrs["name"], json!("renamed"));
    assert_eq!(c.call_count(Op::AddEnvironmentTags) + c.call_count(Op::DeleteEnvironmentTags), 0);
}

#[tokio::test]
async fn failed_add_phase_skips_removal() {
    let c = MemoryClient::new();
    let r = EnvironmentResource::new();
    let inst = created(&c, json!({ "name": "prod", "account_id": "acc-1", "tag_ids": ["t1", "t2"] })).await;
    c.fail_next(Op::AddEnvironmentTags, ClientError::unprocessable("tag t3 not found")).unwrap();

    let desired = attrs(json!({ "name": "prod", "account_id": "acc-1", "tag_ids": ["t3"] }));
    let err = r.update(&c, &inst.id, &desired, &inst.attrs).await.unwrap_err();

    assert!(err.to_string().contains("2 removal(s) not attempted"), "{}", err);
    assert_eq!(c.call_count(Op::DeleteEnvironmentTags), 0);
    assert_eq!(tags(&c, &inst.id), set(&["t1", "t2"]));
}

#[tokio::test]
async fn plain_lists_are_replaced_wholesale() {
    let c = MemoryClient::new();
    let r = EnvironmentResource::new();
    let inst = created(
        &c,
        json!({
            "name": "prod",
            "account_id": "acc-1",
            "policy_groups": ["pg-1"],
            "default_provider_configurations": ["pcfg-1"]
        }),
    )
    .await;
    let mut env = c.environment(&inst.id).unwrap();
    env.policy_groups.push(Relation::new("pg-oob"));
    c.insert_environment(env).unwrap();

    let desired = attrs(json!({ "name": "prod", "account_id": "acc-1", "policy_groups": ["pg-2"] }));
    r.update(&c, &inst.id, &desired, &inst.attrs).await.unwrap();

    let env = c.environment(&inst.id).unwrap();
    assert_eq!(env.policy_groups, relations(["pg-2"]));
    // Unset default configurations go out as an empty list.
    assert!(env.default_provider_configurations.is_empty());
}

#[tokio::test]
async fn omitted_computed_lists_keep_prior_values() {
    let c = MemoryClient::new();
    let r = EnvironmentResource::new();
    let inst = created(&c, json!({ "name": "prod", "account_id": "acc-1", "cloud_credentials": ["cc-1"] })).await;
    let desired = attrs(json!({ "name": "prod", "account_id": "acc-1" }));
    r.update(&c, &inst.id, &desired, &inst.attrs).await.unwrap();
    assert_eq!(c.environment(&inst.id).unwrap().cloud_credentials, relations(["cc-1"]));
}

#[tokio::test]
async fn absence_is_not_an_error() {
    let c = MemoryClient::new();
    let r = EnvironmentResource::new();
    assert_eq!(r.read(&c, "env-gone").await.unwrap(), None);
    r.delete(&c, "env-gone").await.unwrap();
    let err = r.import(&c, "env-gone").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn out_of_band_deletion_reads_as_absent() {
    let c = MemoryClient::new();
    let r = EnvironmentResource::new();
    let inst = created(&c, json!({ "name": "prod", "account_id": "acc-1" })).await;
    c.remove_environment(&inst.id).unwrap();
    assert_eq!(r.read(&c, &inst.id).await.unwrap(), None);
}
