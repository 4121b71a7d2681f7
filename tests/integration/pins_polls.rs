use crate::common::{create_group_room, csrf_header, register_and_login, send_text_message, test_client};
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
fn pin_a_message_then_list_and_delete_it() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "pinowner");
    let mate_id = register(&client, "pinmate");
    login(&client, "pinowner");
    let room = create_group_room(&client, &owner_csrf, "pin-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let sent = send_text_message(&client, &owner_csrf, &room_id, "pin this");
    let message_id = sent["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/rooms/{room_id}/pins"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"message_id": message_id}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let pin: Value = res.into_json().unwrap();
    let pin_id = pin["id"].as_i64().unwrap();

    let res = client.get(format!("/api/rooms/{room_id}/pins")).dispatch();
    let pins: Vec<Value> = res.into_json().unwrap();
    assert_eq!(pins.len(), 1);

    let res = client
        .delete(format!("/api/rooms/{room_id}/pins/{pin_id}"))
        .header(csrf_header(&owner_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    let res = client.get(format!("/api/rooms/{room_id}/pins")).dispatch();
    let pins: Vec<Value> = res.into_json().unwrap();
    assert!(pins.is_empty());
}

#[test]
fn pin_requires_either_message_id_or_content() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "pinvalid");
    let mate_id = register(&client, "pinvalidmate");
    login(&client, "pinvalid");
    let room = create_group_room(&client, &owner_csrf, "pin-valid-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/pins"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn poll_requires_two_options_and_tracks_votes() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "pollowner");
    let mate_id = register(&client, "pollmate");
    login(&client, "pollowner");
    let room = create_group_room(&client, &owner_csrf, "poll-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/polls"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"question": "lunch?", "options": ["pizza"], "multiple_choice": false, "anonymous": false}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);

    let res = client
        .post(format!("/api/rooms/{room_id}/polls"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"question": "lunch?", "options": ["pizza", "sushi"], "multiple_choice": false, "anonymous": false}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let poll: Value = res.into_json().unwrap();
    let poll_id = poll["id"].as_i64().unwrap();
    let pizza_option_id = poll["options"][0]["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/polls/{poll_id}/vote"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"option_ids": [pizza_option_id]}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let updated: Value = res.into_json().unwrap();
    assert_eq!(updated["options"][0]["vote_count"], 1);
    assert_eq!(updated["total_voters"], 1);

    let res = client
        .post(format!("/api/polls/{poll_id}/close"))
        .header(csrf_header(&owner_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let closed: Value = res.into_json().unwrap();
    assert_eq!(closed["closed"], true);
}

#[test]
fn pin_and_mute_room_toggles_flip_back_and_forth() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "toggleowner");
    let mate_id = register(&client, "togglemate");
    login(&client, "toggleowner");
    let room = create_group_room(&client, &owner_csrf, "toggle-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client.post(format!("/api/rooms/{room_id}/pin-room")).header(csrf_header(&owner_csrf)).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["pinned"], true);

    let res = client.post(format!("/api/rooms/{room_id}/pin-room")).header(csrf_header(&owner_csrf)).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["pinned"], false);

    let res = client.post(format!("/api/rooms/{room_id}/mute")).header(csrf_header(&owner_csrf)).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["muted"], true);
}
