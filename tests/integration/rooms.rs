use crate::common::{create_direct_room, create_group_room, csrf_header, register_and_login, test_client};
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use serde_json::Value;

fn register(client: &Client, username: &str) -> String {
    let res = client
        .post("/api/register")
        .header(ContentType::JSON)
        .body(serde_json::json!({"username": username, "password": "hunter2pass"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    body["id"].as_str().unwrap().to_string()
}

/// Logs `username` in on the shared client, returning its csrf token. Reuses
/// the single cookie jar, so this also logs any previously active user out.
fn login(client: &Client, username: &str) -> String {
    let res = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(serde_json::json!({"username": username, "password": "hunter2pass"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    body["csrf_token"].as_str().unwrap().to_string()
}

#[test]
fn creating_a_direct_room_twice_returns_the_same_room() {
    let client = test_client();
    let (_alice_id, alice_csrf) = register_and_login(&client, "alicedirect");
    let carol_id = register(&client, "caroldirect");
    login(&client, "alicedirect");

    let first = create_direct_room(&client, &alice_csrf, &carol_id);
    let second = create_direct_room(&client, &alice_csrf, &carol_id);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["type"], "direct");
}

#[test]
fn direct_room_with_yourself_is_rejected() {
    let client = test_client();
    let (alice_id, csrf) = register_and_login(&client, "selfdirect");

    let res = client
        .post("/api/rooms")
        .header(ContentType::JSON)
        .header(csrf_header(&csrf))
        .body(serde_json::json!({"members": [alice_id]}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn group_room_creation_requires_at_least_one_other_member() {
    let client = test_client();
    let (_uid, csrf) = register_and_login(&client, "emptygroup");

    let res = client
        .post("/api/rooms")
        .header(ContentType::JSON)
        .header(csrf_header(&csrf))
        .body(serde_json::json!({"name": "empty", "members": []}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn non_member_cannot_view_room_info() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "groupowner");
    let mate_id = register(&client, "groupmate");
    register(&client, "outsider");
    login(&client, "groupowner");

    let room = create_group_room(&client, &owner_csrf, "real-group", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    login(&client, "outsider");
    let res = client.get(format!("/api/rooms/{room_id}/info")).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn self_kick_is_rejected_even_for_the_only_admin() {
    let client = test_client();
    let (owner_id, owner_csrf) = register_and_login(&client, "ownerkick");
    let member_two_id = register(&client, "membertwo");
    login(&client, "ownerkick");

    let room = create_group_room(&client, &owner_csrf, "admin-invariant", &[&member_two_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/admins"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"user_id": member_two_id, "is_admin": true}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client
        .delete(format!("/api/rooms/{room_id}/members/{owner_id}"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

/// Kicking an admin is allowed — `kick` reuses `leave`'s admin-invariant
/// promotion, so the room still has an admin afterward even though the
/// kicked member was one.
#[test]
fn kicking_an_admin_is_allowed_and_preserves_the_admin_invariant() {
    let client = test_client();
    let (owner_id, owner_csrf) = register_and_login(&client, "kickadminowner");
    let member_two_id = register(&client, "kickadminmember");
    login(&client, "kickadminowner");

    let room = create_group_room(&client, &owner_csrf, "kick-admin-room", &[&member_two_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/admins"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"user_id": member_two_id, "is_admin": true}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    // owner (an admin) kicks member_two, who is also an admin.
    let res = client
        .delete(format!("/api/rooms/{room_id}/members/{member_two_id}"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/api/rooms/{room_id}/admins")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    let admin_ids: Vec<String> = body.as_array().unwrap().iter().map(|u| u["id"].as_str().unwrap().to_string()).collect();
    assert!(admin_ids.contains(&owner_id), "the room must retain at least one admin after kicking an admin");
}

/// The sole admin leaving must never leave a room without one: the
/// promotion picks the earliest-joined remaining member, and since group
/// creation adds every member in the same instant, this asserts the
/// invariant itself (some remaining member becomes admin) rather than
/// which specific member wins the tie.
#[test]
fn last_admin_leaving_promotes_a_remaining_member() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "kickowner");
    let member_a_id = register(&client, "membera");
    let member_b_id = register(&client, "memberb");
    login(&client, "kickowner");

    let room = create_group_room(&client, &owner_csrf, "kick-invariant", &[&member_a_id, &member_b_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/leave"))
        .header(csrf_header(&owner_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    login(&client, "membera");
    let a_is_admin: bool = {
        let res = client.get(format!("/api/rooms/{room_id}/admin-check")).dispatch();
        let body: Value = res.into_json().unwrap();
        body["is_admin"].as_bool().unwrap()
    };

    login(&client, "memberb");
    let b_is_admin: bool = {
        let res = client.get(format!("/api/rooms/{room_id}/admin-check")).dispatch();
        let body: Value = res.into_json().unwrap();
        body["is_admin"].as_bool().unwrap()
    };

    assert!(a_is_admin || b_is_admin, "the room must retain an admin after the only admin leaves");
    assert!(!(a_is_admin && b_is_admin), "promotion should pick exactly one remaining member");
}

#[test]
fn leaving_a_room_twice_is_idempotent() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "leaveowner");
    let leaver_id = register(&client, "leaver");
    login(&client, "leaveowner");

    let room = create_group_room(&client, &owner_csrf, "leave-room", &[&leaver_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let leaver_csrf = login(&client, "leaver");

    let res = client
        .post(format!("/api/rooms/{room_id}/leave"))
        .header(csrf_header(&leaver_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["left"], true);
    assert_eq!(body["already_left"], false);

    let res = client
        .post(format!("/api/rooms/{room_id}/leave"))
        .header(csrf_header(&leaver_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["left"], false);
    assert_eq!(body["already_left"], true);
}

#[test]
fn rename_room_requires_admin() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "renameowner");
    let plain_id = register(&client, "plainmember");
    login(&client, "renameowner");

    let room = create_group_room(&client, &owner_csrf, "rename-room", &[&plain_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let plain_csrf = login(&client, "plainmember");
    let res = client
        .put(format!("/api/rooms/{room_id}/name"))
        .header(ContentType::JSON)
        .header(csrf_header(&plain_csrf))
        .body(serde_json::json!({"name": "hijacked"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn admin_audit_log_records_kick_and_set_admin() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "audittest");
    let member_id = register(&client, "auditmember");
    login(&client, "audittest");

    let room = create_group_room(&client, &owner_csrf, "audit-room", &[&member_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .delete(format!("/api/rooms/{room_id}/members/{member_id}"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/api/rooms/{room_id}/admin-audit-logs")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let entries: Vec<Value> = res.into_json().unwrap();
    assert!(entries.iter().any(|e| e["action"] == "kick_member"));
}
