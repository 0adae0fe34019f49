#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde_json::json;

use scalr_client::{relations, MemoryClient, Op, Team, User};
use scalr_core::{Attrs, ProviderError};
use scalr_resources::membership::{lookup, ID};
use scalr_resources::{MembershipLookup, MembershipResource, Resource};

fn client() -> MemoryClient {
    let c = MemoryClient::new();
    for id in ["u1", "u2", "u3"] {
        c.insert_user(User { id: id.into(), ..User::default() }).unwrap();
    }
    c.insert_team(Team { id: "t1".into(), name: "ops".into(), users: relations(["u1", "u2"]) }).unwrap();
    c
}

fn members(c: &MemoryClient, team: &str) -> BTreeSet<String> {
    c.team(team).unwrap().users.into_iter().map(|u| u.id).collect()
}

fn desired(user: &str, team: &str) -> Attrs {
    json!({ "user_id": user, "team_id": team }).as_object().cloned().unwrap()
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn create_then_delete_round_trips_the_member_set() {
    let c = client();
    let r = MembershipResource::new();

    let inst = r.create(&c, &desired("u3", "t1")).await.unwrap().unwrap();
    assert_eq!(inst.id, "u3/t1");
    assert_eq!(inst.attrs["user_id"], json!("u3"));
    assert_eq!(members(&c, "t1"), set(&["u1", "u2", "u3"]));

    r.delete(&c, &inst.id).await.unwrap();
    assert_eq!(members(&c, "t1"), set(&["u1", "u2"]));
}

#[tokio::test]
async fn missing_member_and_missing_team_are_distinct() {
    let c = client();
    assert!(matches!(lookup(&c, "u3/t1").await.unwrap(), MembershipLookup::NotMember(_)));
    assert_eq!(lookup(&c, "u3/t-gone").await.unwrap(), MembershipLookup::TeamMissing);
    assert!(lookup(&c, "u1/t1").await.unwrap().is_member());

    let r = MembershipResource::new();
    assert_eq!(r.read(&c, "u3/t1").await.unwrap(), None);
    assert_eq!(r.read(&c, "u3/t-gone").await.unwrap(), None);
}

#[tokio::test]
async fn create_on_missing_team_is_user_facing() {
    let c = client();
    let err = MembershipResource::new().create(&c, &desired("u1", "t-gone")).await.unwrap_err();
    assert_eq!(err.to_string(), "team t-gone not found");
    assert_eq!(c.call_count(Op::UpdateTeam), 0);
}

#[tokio::test]
async fn delete_of_absent_edge_is_success() {
    let c = client();
    let r = MembershipResource::new();
    r.delete(&c, "u3/t1").await.unwrap();
    r.delete(&c, "u1/t-gone").await.unwrap();
    assert_eq!(c.call_count(Op::UpdateTeam), 0);
    assert_eq!(members(&c, "t1"), set(&["u1", "u2"]));
}

#[tokio::test]
async fn malformed_ids_are_rejected_before_any_call() {
    let c = client();
    let err = MembershipResource::new().read(&c, "no-separator-here").await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedIdentifier { .. }));
    assert!(c.calls().is_empty());
    assert_eq!(ID.expected(), "<user_id>/<team_id>");
}

#[tokio::test]
async fn import_requires_an_existing_edge() {
    let c = client();
    let r = MembershipResource::new();
    let inst = r.import(&c, "u2/t1").await.unwrap();
    assert_eq!(inst.attrs["team_id"], json!("t1"));
    let err = r.import(&c, "u3/t1").await.unwrap_err();
    assert_eq!(err.to_string(), "iam user membership u3/t1 not found");
}

#[tokio::test]
async fn in_place_update_is_refused() {
    let c = client();
    let err = MembershipResource::new()
        .update(&c, "u1/t1", &desired("u1", "t1"), &desired("u1", "t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)));
}

#[tokio::test]
async fn create_on_existing_edge_leaves_member_list_alone() {
    let c = client();
    let r = MembershipResource::new();
    c.clear_calls();

    let inst = r.create(&c, &desired("u1", "t1")).await.unwrap().unwrap();
    assert_eq!(inst.id, "u1/t1");
    assert_eq!(c.call_count(Op::UpdateTeam), 0);
    assert_eq!(c.team("t1").unwrap().users, relations(["u1", "u2"]));
}
