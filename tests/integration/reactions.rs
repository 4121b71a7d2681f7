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
fn reactions_from_two_users_are_summarized_per_emoji() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "reacta");
    let mate_id = register(&client, "reactb");
    login(&client, "reacta");
    let room = create_group_room(&client, &owner_csrf, "react-summary-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let sent = send_text_message(&client, &owner_csrf, &room_id, "react please");
    let message_id = sent["id"].as_i64().unwrap();

    client
        .post(format!("/api/messages/{message_id}/reactions"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"emoji": "🎉"}).to_string())
        .dispatch();

    let mate_csrf = login(&client, "reactb");
    client
        .post(format!("/api/messages/{message_id}/reactions"))
        .header(ContentType::JSON)
        .header(csrf_header(&mate_csrf))
        .body(serde_json::json!({"emoji": "🎉"}).to_string())
        .dispatch();

    let res = client.get(format!("/api/messages/{message_id}/reactions")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let reactions: Vec<Value> = res.into_json().unwrap();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0]["emoji"], "🎉");
    assert_eq!(reactions[0]["count"], 2);
    let user_ids = reactions[0]["user_ids"].as_array().unwrap();
    assert_eq!(user_ids.len(), 2);
}

#[test]
fn remove_reaction_endpoint_also_toggles() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "reactc");
    let mate_id = register(&client, "reactd");
    login(&client, "reactc");
    let room = create_group_room(&client, &owner_csrf, "react-remove-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let sent = send_text_message(&client, &owner_csrf, &room_id, "toggle me");
    let message_id = sent["id"].as_i64().unwrap();

    client
        .post(format!("/api/messages/{message_id}/reactions"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"emoji": "🔥"}).to_string())
        .dispatch();

    // DELETE with the same emoji in the body is the same toggle, so it
    // removes the reaction just added rather than requiring it be absent.
    let res = client
        .delete(format!("/api/messages/{message_id}/reactions"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"emoji": "🔥"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let reactions: Vec<Value> = res.into_json().unwrap();
    assert!(reactions.is_empty());
}

#[test]
fn non_member_cannot_react() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "reacte");
    let mate_id = register(&client, "reactf");
    register(&client, "reactoutsider");
    login(&client, "reacte");
    let room = create_group_room(&client, &owner_csrf, "react-gate-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let sent = send_text_message(&client, &owner_csrf, &room_id, "gate me");
    let message_id = sent["id"].as_i64().unwrap();

    let outsider_csrf = login(&client, "reactoutsider");
    let res = client
        .post(format!("/api/messages/{message_id}/reactions"))
        .header(ContentType::JSON)
        .header(csrf_header(&outsider_csrf))
        .body(serde_json::json!({"emoji": "👎"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}
