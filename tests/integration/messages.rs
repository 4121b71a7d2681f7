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
fn sending_and_listing_messages_round_trips() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "msgowner");
    let mate_id = register(&client, "msgmate");
    login(&client, "msgowner");

    let room = create_group_room(&client, &owner_csrf, "msg-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let sent = send_text_message(&client, &owner_csrf, &room_id, "hello there");
    assert_eq!(sent["content"], "hello there");
    assert_eq!(sent["message_type"], "text");
    assert!(sent["unread_count"].is_number());

    let res = client.get(format!("/api/rooms/{room_id}/messages")).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hello there");
}

#[test]
fn empty_text_message_is_rejected() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "emptymsg");
    let mate_id = register(&client, "emptymate");
    login(&client, "emptymsg");
    let room = create_group_room(&client, &owner_csrf, "empty-msg-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"message_type": "text", "content": "   "}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn file_message_without_upload_token_is_rejected() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "filemsg");
    let mate_id = register(&client, "filemate");
    login(&client, "filemsg");
    let room = create_group_room(&client, &owner_csrf, "file-msg-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"message_type": "file"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn forged_upload_token_is_rejected() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "forgedtoken");
    let mate_id = register(&client, "forgedmate");
    login(&client, "forgedtoken");
    let room = create_group_room(&client, &owner_csrf, "forged-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"message_type": "file", "upload_token": "not-a-real-token"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn only_sender_may_edit_their_message() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "editowner");
    let mate_id = register(&client, "editmate");
    login(&client, "editowner");
    let room = create_group_room(&client, &owner_csrf, "edit-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let sent = send_text_message(&client, &owner_csrf, &room_id, "original");
    let message_id = sent["id"].as_i64().unwrap();

    let mate_csrf = login(&client, "editmate");
    let res = client
        .put(format!("/api/messages/{message_id}"))
        .header(ContentType::JSON)
        .header(csrf_header(&mate_csrf))
        .body(serde_json::json!({"content": "hijacked"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);

    login(&client, "editowner");
    let res = client
        .put(format!("/api/messages/{message_id}"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"content": "corrected"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["content"], "corrected");
    assert!(body["edited_at"].is_string());
}

#[test]
fn deleting_a_message_tombstones_rather_than_removes_it() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "deleteowner");
    let mate_id = register(&client, "deletemate");
    login(&client, "deleteowner");
    let room = create_group_room(&client, &owner_csrf, "delete-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let sent = send_text_message(&client, &owner_csrf, &room_id, "will be deleted");
    let message_id = sent["id"].as_i64().unwrap();

    let res = client
        .delete(format!("/api/messages/{message_id}"))
        .header(csrf_header(&owner_csrf))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    // A reply to the deleted message should still resolve: the row is a
    // tombstone, not a removed message.
    let res = client.get(format!("/api/rooms/{room_id}/messages")).dispatch();
    let body: Value = res.into_json().unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"].as_i64().unwrap(), message_id);
}

#[test]
fn non_member_cannot_send_to_a_room() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "nonmemberowner");
    let mate_id = register(&client, "nonmembermate");
    register(&client, "outsider2");
    login(&client, "nonmemberowner");

    let room = create_group_room(&client, &owner_csrf, "nonmember-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let outsider_csrf = login(&client, "outsider2");
    let res = client
        .post(format!("/api/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&outsider_csrf))
        .body(serde_json::json!({"message_type": "text", "content": "sneaking in"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

/// A non-member must not be able to tell "message doesn't exist" apart
/// from "message exists but I'm not a member" by comparing status codes
/// — both fold into the same 403, membership checked before existence
/// is ever revealed.
#[test]
fn editing_a_nonexistent_message_reports_forbidden_not_not_found() {
    let client = test_client();
    let (_uid, csrf) = register_and_login(&client, "nonexistentedit");

    let res = client
        .put("/api/messages/999999999")
        .header(ContentType::JSON)
        .header(csrf_header(&csrf))
        .body(serde_json::json!({"content": "does not matter"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn non_member_gets_forbidden_not_not_found_when_editing_a_real_message_in_a_room_they_are_not_in() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "editleakowner");
    let mate_id = register(&client, "editleakmate");
    register(&client, "editleakoutsider");
    login(&client, "editleakowner");

    let room = create_group_room(&client, &owner_csrf, "edit-leak-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();
    let message = send_text_message(&client, &owner_csrf, &room_id, "visible only to members");
    let message_id = message["id"].as_i64().unwrap();

    let outsider_csrf = login(&client, "editleakoutsider");
    let res = client
        .put(format!("/api/messages/{message_id}"))
        .header(ContentType::JSON)
        .header(csrf_header(&outsider_csrf))
        .body(serde_json::json!({"content": "tampered"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden, "a non-member must see the same 403 as for a message that doesn't exist at all");
}

#[test]
fn reply_to_links_to_the_original_message() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "replyowner");
    let mate_id = register(&client, "replymate");
    login(&client, "replyowner");
    let room = create_group_room(&client, &owner_csrf, "reply-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let original = send_text_message(&client, &owner_csrf, &room_id, "first");
    let original_id = original["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"message_type": "text", "content": "a reply", "reply_to": original_id}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let reply: Value = res.into_json().unwrap();
    assert_eq!(reply["reply_to"].as_i64().unwrap(), original_id);
}

#[test]
fn message_pagination_limit_is_clamped() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "pageowner");
    let mate_id = register(&client, "pagemate");
    login(&client, "pageowner");
    let room = create_group_room(&client, &owner_csrf, "page-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    for i in 0..5 {
        send_text_message(&client, &owner_csrf, &room_id, &format!("msg {i}"));
    }

    let res = client.get(format!("/api/rooms/{room_id}/messages?limit=2")).dispatch();
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
}

#[test]
fn reaction_toggle_is_idempotent_across_two_calls() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "reactowner");
    let mate_id = register(&client, "reactmate");
    login(&client, "reactowner");
    let room = create_group_room(&client, &owner_csrf, "react-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    let sent = send_text_message(&client, &owner_csrf, &room_id, "react to me");
    let message_id = sent["id"].as_i64().unwrap();

    let res = client
        .post(format!("/api/messages/{message_id}/reactions"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"emoji": "👍"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let reactions: Vec<Value> = res.into_json().unwrap();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0]["count"], 1);

    let res = client
        .post(format!("/api/messages/{message_id}/reactions"))
        .header(ContentType::JSON)
        .header(csrf_header(&owner_csrf))
        .body(serde_json::json!({"emoji": "👍"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let reactions: Vec<Value> = res.into_json().unwrap();
    assert!(reactions.is_empty(), "a second add_reaction call toggles the same emoji back off");
}
