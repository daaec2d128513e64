mod common;

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use common::test_server::TestServer;

/// Index refreshes run on a spawned task after the data commit; searches in
/// tests wait briefly for the projection to land.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}

async fn create_user(
    client: &reqwest::Client,
    base_url: &str,
    admin_token: &str,
    username: &str,
) -> (String, String) {
    let resp: Value = client
        .post(format!("{base_url}/api/v1/admin/users"))
        .bearer_auth(admin_token)
        .json(&json!({"username": username}))
        .send()
        .await
        .expect("create user")
        .json()
        .await
        .expect("parse user response");
    let user_id = resp["data"]["id"].as_str().expect("user id").to_string();

    let resp: Value = client
        .post(format!("{base_url}/api/v1/admin/users/{user_id}/tokens"))
        .bearer_auth(admin_token)
        .json(&json!({}))
        .send()
        .await
        .expect("create user token")
        .json()
        .await
        .expect("parse token response");
    let token = resp["data"]["token"].as_str().expect("token").to_string();

    (user_id, token)
}

async fn create_group(
    client: &reqwest::Client,
    base_url: &str,
    admin_token: &str,
    name: &str,
) -> String {
    let resp: Value = client
        .post(format!("{base_url}/api/v1/admin/groups"))
        .bearer_auth(admin_token)
        .json(&json!({"name": name}))
        .send()
        .await
        .expect("create group")
        .json()
        .await
        .expect("parse group response");
    resp["data"]["id"].as_str().expect("group id").to_string()
}

async fn create_community(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    body: Value,
) -> Value {
    let resp = client
        .post(format!("{base_url}/api/v1/communities"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .expect("create community");
    assert_eq!(resp.status(), StatusCode::CREATED, "community creation failed");
    let resp: Value = resp.json().await.expect("parse community response");
    resp["data"].clone()
}

#[tokio::test]
async fn test_community_status_lifecycle() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "status-owner").await;

    // Explicit verified status round-trips and is safelisted
    let verified = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "verified-lab", "title": "Verified Lab", "status": "verified"}),
    )
    .await;
    assert_eq!(verified["status"], "verified");

    let id = verified["id"].as_str().unwrap();
    let resp: Value = client
        .get(format!("{}/api/v1/communities/{id}", server.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("get community")
        .json()
        .await
        .expect("parse");
    assert_eq!(resp["data"]["status"], "verified");

    // Missing status defaults to new
    let plain = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "plain-lab", "title": "Plain Lab"}),
    )
    .await;
    assert_eq!(plain["status"], "new");

    // A fourth status value is rejected with a per-field message
    let resp = client
        .post(format!("{}/api/v1/communities", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"slug": "bad-status", "title": "Bad", "status": "pending"}))
        .send()
        .await
        .expect("create community");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("parse");
    assert_eq!(body["field_errors"][0]["field"], "status");
}

#[tokio::test]
async fn test_community_lookup_by_slug_and_soft_delete() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "slug-owner").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "deep-sky", "title": "Deep Sky Survey"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    let resp: Value = client
        .get(format!("{}/api/v1/communities/deep-sky", server.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("get by slug")
        .json()
        .await
        .expect("parse");
    assert_eq!(resp["data"]["id"], *id);

    let resp = client
        .delete(format!("{}/api/v1/communities/{id}", server.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("delete community");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{}/api/v1/communities/{id}", server.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("get deleted community");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stale_revision_update_conflicts() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "rev-owner").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "optics", "title": "Optics"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    let resp = client
        .patch(format!("{}/api/v1/communities/{id}", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"revision": 1, "title": "Optics & Photonics"}))
        .send()
        .await
        .expect("first update");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("parse");
    assert_eq!(body["data"]["revision"], 2);

    // Replaying the first revision must fail; the caller retries
    let resp = client
        .patch(format!("{}/api/v1/communities/{id}", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"revision": 1, "title": "Stale"}))
        .send()
        .await
        .expect("stale update");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_parent_reference_lifecycle() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "parent-owner").await;

    let parent = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "umbrella", "title": "Umbrella", "allow_children": true}),
    )
    .await;
    let parent_id = parent["id"].as_str().unwrap();

    let child = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "leaf", "title": "Leaf", "parent_id": parent_id}),
    )
    .await;
    let child_id = child["id"].as_str().unwrap();
    assert_eq!(child["parent_id"], *parent_id);

    // Malformed parent id is a validation failure
    let resp = client
        .patch(format!("{}/api/v1/communities/{child_id}", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"revision": 1, "parent_id": "not-a-uuid"}))
        .send()
        .await
        .expect("bad parent update");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Unknown parent id does not exist
    let resp = client
        .patch(format!("{}/api/v1/communities/{child_id}", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"revision": 1, "parent_id": "b7c5d357-7a7d-4b66-bd30-2f18a6d9dbde"}))
        .send()
        .await
        .expect("unknown parent update");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Null clears the stored parent block entirely
    let resp = client
        .patch(format!("{}/api/v1/communities/{child_id}", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"revision": 1, "parent_id": null}))
        .send()
        .await
        .expect("clear parent");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("parse");
    assert!(body["data"].get("parent_id").is_none() || body["data"]["parent_id"].is_null());

    // A parent that does not allow children is rejected
    let no_children = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "closed", "title": "Closed"}),
    )
    .await;
    let resp = client
        .patch(format!("{}/api/v1/communities/{child_id}", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"revision": 2, "parent_id": no_children["id"]}))
        .send()
        .await
        .expect("closed parent update");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_respects_visibility() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "search-owner").await;

    create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "open-science", "title": "Open Science"}),
    )
    .await;
    create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "private-circle", "title": "Private Circle", "visibility": "restricted"}),
    )
    .await;
    settle().await;

    // Anonymous callers only see public communities
    let resp: Value = client
        .get(format!("{}/api/v1/communities", server.base_url))
        .send()
        .await
        .expect("anonymous search")
        .json()
        .await
        .expect("parse");
    let slugs: Vec<&str> = resp["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["slug"].as_str().unwrap())
        .collect();
    assert!(slugs.contains(&"open-science"));
    assert!(!slugs.contains(&"private-circle"));

    // The owner sees their restricted community as well
    let resp: Value = client
        .get(format!("{}/api/v1/communities", server.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("owner search")
        .json()
        .await
        .expect("parse");
    let slugs: Vec<&str> = resp["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["slug"].as_str().unwrap())
        .collect();
    assert!(slugs.contains(&"private-circle"));

    // Text query narrows results
    let resp: Value = client
        .get(format!("{}/api/v1/communities?q=open", server.base_url))
        .send()
        .await
        .expect("query search")
        .json()
        .await
        .expect("parse");
    let slugs: Vec<&str> = resp["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["open-science"]);
}

#[tokio::test]
async fn test_search_embeds_denormalized_parent() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "embed-owner").await;

    let parent = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "org", "title": "Org", "allow_children": true}),
    )
    .await;
    let parent_id = parent["id"].as_str().unwrap();
    create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "sub", "title": "Sub", "parent_id": parent_id}),
    )
    .await;
    settle().await;

    let resp: Value = client
        .get(format!("{}/api/v1/communities?q=sub", server.base_url))
        .send()
        .await
        .expect("search child")
        .json()
        .await
        .expect("parse");
    let child = &resp["data"][0];
    assert_eq!(child["parent"]["slug"], "org");
    assert_eq!(
        child["parent_version"].as_str().unwrap(),
        format!("{parent_id}::1")
    );

    // Updating the parent re-projects the child with a fresh tag
    let resp = client
        .patch(format!("{}/api/v1/communities/{parent_id}", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"revision": 1, "title": "Org Renamed"}))
        .send()
        .await
        .expect("update parent");
    assert_eq!(resp.status(), StatusCode::OK);
    settle().await;

    let resp: Value = client
        .get(format!("{}/api/v1/communities?q=sub", server.base_url))
        .send()
        .await
        .expect("search child again")
        .json()
        .await
        .expect("parse");
    let child = &resp["data"][0];
    assert_eq!(child["parent"]["title"], "Org Renamed");
    assert_eq!(
        child["parent_version"].as_str().unwrap(),
        format!("{parent_id}::2")
    );
}

#[tokio::test]
async fn test_member_subject_validation() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "subj-owner").await;
    let (user_id, _) =
        create_user(&client, &server.base_url, &server.admin_token, "subj-user").await;
    let group_id = create_group(&client, &server.base_url, &server.admin_token, "subj-grp").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "subjects", "title": "Subjects"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();
    let members_url = format!("{}/api/v1/communities/{id}/members", server.base_url);

    // Both subjects supplied
    let resp = client
        .post(&members_url)
        .bearer_auth(&owner_token)
        .json(&json!({"user_id": user_id, "group_id": group_id, "role": "reader"}))
        .send()
        .await
        .expect("both subjects");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("parse");
    assert!(body["field_errors"].as_array().is_some_and(|v| !v.is_empty()));

    // Neither subject supplied
    let resp = client
        .post(&members_url)
        .bearer_auth(&owner_token)
        .json(&json!({"role": "reader"}))
        .send()
        .await
        .expect("no subjects");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Unknown role is a validation failure
    let resp = client
        .post(&members_url)
        .bearer_auth(&owner_token)
        .json(&json!({"user_id": user_id, "role": "admin"}))
        .send()
        .await
        .expect("bad role");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_group_membership_conflicts() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "dup-owner").await;
    let group_id = create_group(&client, &server.base_url, &server.admin_token, "dup-grp").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "dup-grp-home", "title": "Group Home"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();
    let members_url = format!("{}/api/v1/communities/{id}/members", server.base_url);

    let resp = client
        .post(&members_url)
        .bearer_auth(&owner_token)
        .json(&json!({"group_id": group_id, "role": "curator"}))
        .send()
        .await
        .expect("add group");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.expect("parse");
    // Notification preference defaults on for group subjects
    assert_eq!(body["data"]["group_notifications"], true);

    let resp = client
        .post(&members_url)
        .bearer_auth(&owner_token)
        .json(&json!({"group_id": group_id, "role": "reader"}))
        .send()
        .await
        .expect("add group again");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_groups_disabled_rejects_group_subjects() {
    let server = TestServer::start_with_args(&["--disable-groups"]).await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "nogrp-owner").await;
    let group_id = create_group(&client, &server.base_url, &server.admin_token, "nogrp").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "no-groups", "title": "No Groups"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    // Even the owner is refused while groups are disabled
    let resp = client
        .post(format!("{}/api/v1/communities/{id}/members", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"group_id": group_id, "role": "reader"}))
        .send()
        .await
        .expect("add group");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_member_listing_is_redacted() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "red-owner").await;
    let (_outsider_id, outsider_token) =
        create_user(&client, &server.base_url, &server.admin_token, "red-outsider").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "redacted", "title": "Redacted"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    // Owner listing carries full rows
    let resp: Value = client
        .get(format!("{}/api/v1/communities/{id}/members", server.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("owner members")
        .json()
        .await
        .expect("parse");
    let owner_member = &resp["data"][0];
    assert_eq!(owner_member["role"], "owner");
    assert!(owner_member.get("visible").is_some());
    assert!(owner_member.get("revision").is_some());
    assert!(owner_member.get("created_at").is_some());
    assert!(owner_member["permissions"]["can_update"].as_bool().unwrap());
    let member_id = owner_member["id"].as_str().unwrap().to_string();

    // Owner opts into the public listing
    let resp = client
        .patch(format!(
            "{}/api/v1/communities/{id}/members/{member_id}",
            server.base_url
        ))
        .bearer_auth(&owner_token)
        .json(&json!({"revision": 1, "visible": true}))
        .send()
        .await
        .expect("set visible");
    assert_eq!(resp.status(), StatusCode::OK);

    // Non-member caller gets the redacted projection
    let resp: Value = client
        .get(format!(
            "{}/api/v1/communities/{id}/members/public",
            server.base_url
        ))
        .bearer_auth(&outsider_token)
        .send()
        .await
        .expect("public members")
        .json()
        .await
        .expect("parse");
    let entry = &resp["data"][0];
    assert_eq!(entry["user_id"], owner_id);
    for redacted in ["role", "visible", "created_at", "updated_at", "revision", "permissions"] {
        assert!(
            entry.get(redacted).is_none(),
            "field '{redacted}' must be absent from the public view"
        );
    }
}

#[tokio::test]
async fn test_member_listing_requires_membership() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "lst-owner").await;
    let (_outsider_id, outsider_token) =
        create_user(&client, &server.base_url, &server.admin_token, "lst-outsider").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "listing", "title": "Listing"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    let resp = client
        .get(format!("{}/api/v1/communities/{id}/members", server.base_url))
        .bearer_auth(&outsider_token)
        .send()
        .await
        .expect("outsider members");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invitation_accept_flow() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "inv-owner").await;
    let (invitee_id, invitee_token) =
        create_user(&client, &server.base_url, &server.admin_token, "inv-guest").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "invites", "title": "Invites"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    let resp = client
        .post(format!(
            "{}/api/v1/communities/{id}/invitations",
            server.base_url
        ))
        .bearer_auth(&owner_token)
        .json(&json!({"user_id": invitee_id, "role": "curator"}))
        .send()
        .await
        .expect("create invitation");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.expect("parse");
    let member_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["active"], false);
    assert!(body["data"]["request_id"].is_string());

    // The pending invitation shows up for managers
    let resp: Value = client
        .get(format!(
            "{}/api/v1/communities/{id}/invitations",
            server.base_url
        ))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("list invitations")
        .json()
        .await
        .expect("parse");
    assert_eq!(resp["data"].as_array().unwrap().len(), 1);

    // The owner cannot accept on the invitee's behalf
    let action_url = format!(
        "{}/api/v1/communities/{id}/invitations/{member_id}/actions/accept",
        server.base_url
    );
    let resp = client
        .post(&action_url)
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("owner accept");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The invitee accepts and becomes active
    let resp = client
        .post(&action_url)
        .bearer_auth(&invitee_token)
        .send()
        .await
        .expect("invitee accept");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("parse");
    assert_eq!(body["data"]["active"], true);
    assert_eq!(body["data"]["role"], "curator");

    // Concluding twice is a conflict
    let resp = client
        .post(&action_url)
        .bearer_auth(&invitee_token)
        .send()
        .await
        .expect("accept again");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invitation_decline_and_reinvite() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "dec-owner").await;
    let (invitee_id, invitee_token) =
        create_user(&client, &server.base_url, &server.admin_token, "dec-guest").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "declines", "title": "Declines"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();
    let invitations_url = format!("{}/api/v1/communities/{id}/invitations", server.base_url);

    let resp: Value = client
        .post(&invitations_url)
        .bearer_auth(&owner_token)
        .json(&json!({"user_id": invitee_id, "role": "reader"}))
        .send()
        .await
        .expect("create invitation")
        .json()
        .await
        .expect("parse");
    let member_id = resp["data"]["id"].as_str().unwrap();

    let resp = client
        .post(format!(
            "{invitations_url}/{member_id}/actions/decline"
        ))
        .bearer_auth(&invitee_token)
        .send()
        .await
        .expect("decline");
    assert_eq!(resp.status(), StatusCode::OK);

    // The member row is gone; the subject can be invited again
    let resp = client
        .post(&invitations_url)
        .bearer_auth(&owner_token)
        .json(&json!({"user_id": invitee_id, "role": "reader"}))
        .send()
        .await
        .expect("reinvite");
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_membership_request_flow() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "req-owner").await;
    let (_joiner_id, joiner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "req-joiner").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "joinable", "title": "Joinable"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    let resp = client
        .post(format!(
            "{}/api/v1/communities/{id}/membership_requests",
            server.base_url
        ))
        .bearer_auth(&joiner_token)
        .send()
        .await
        .expect("membership request");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.expect("parse");
    let member_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["role"], "reader");
    assert_eq!(body["data"]["active"], false);

    // Requesting twice conflicts
    let resp = client
        .post(format!(
            "{}/api/v1/communities/{id}/membership_requests",
            server.base_url
        ))
        .bearer_auth(&joiner_token)
        .send()
        .await
        .expect("second request");
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // The joiner cannot approve their own request
    let action_url = format!(
        "{}/api/v1/communities/{id}/invitations/{member_id}/actions/accept",
        server.base_url
    );
    let resp = client
        .post(&action_url)
        .bearer_auth(&joiner_token)
        .send()
        .await
        .expect("self accept");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // A manager approves it
    let resp = client
        .post(&action_url)
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("owner accept");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("parse");
    assert_eq!(body["data"]["active"], true);
}

#[tokio::test]
async fn test_last_owner_cannot_be_removed() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "solo-owner").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "solo", "title": "Solo"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    let resp: Value = client
        .get(format!("{}/api/v1/communities/{id}/members", server.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("list members")
        .json()
        .await
        .expect("parse");
    let member_id = resp["data"][0]["id"].as_str().unwrap();

    let resp = client
        .delete(format!(
            "{}/api/v1/communities/{id}/members/{member_id}",
            server.base_url
        ))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("remove last owner");
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_featured_communities() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let (_owner_id, owner_token) =
        create_user(&client, &server.base_url, &server.admin_token, "feat-owner").await;

    let community = create_community(
        &client,
        &server.base_url,
        &owner_token,
        json!({"slug": "showcase", "title": "Showcase"}),
    )
    .await;
    let id = community["id"].as_str().unwrap();

    // Featuring is admin-only
    let resp = client
        .post(format!("{}/api/v1/admin/featured", server.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({"community_id": id}))
        .send()
        .await
        .expect("feature as owner");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .post(format!("{}/api/v1/admin/featured", server.base_url))
        .bearer_auth(&server.admin_token)
        .json(&json!({"community_id": id}))
        .send()
        .await
        .expect("feature as admin");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp: Value = client
        .get(format!("{}/api/v1/communities/featured", server.base_url))
        .send()
        .await
        .expect("list featured")
        .json()
        .await
        .expect("parse");
    let slugs: Vec<&str> = resp["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["showcase"]);
}
