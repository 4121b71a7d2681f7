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
fn basic_search_finds_messages_by_content() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "searchowner");
    let mate_id = register(&client, "searchmate");
    login(&client, "searchowner");
    let room = create_group_room(&client, &owner_csrf, "search-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    send_text_message(&client, &owner_csrf, &room_id, "the quarterly roadmap review is tomorrow");
    send_text_message(&client, &owner_csrf, &room_id, "lunch is at noon");

    let res = client.get("/api/search?q=roadmap").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0]["content"].as_str().unwrap().contains("roadmap"));
}

#[test]
fn search_is_scoped_to_membership() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "searchsecret");
    let mate_id = register(&client, "searchsecretmate");
    register(&client, "searchoutsider");
    login(&client, "searchsecret");
    let room = create_group_room(&client, &owner_csrf, "secret-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    send_text_message(&client, &owner_csrf, &room_id, "classified banana recipe");

    login(&client, "searchoutsider");
    let res = client.get(format!("/api/search?q=banana&room_id={room_id}")).dispatch();
    assert_eq!(res.status(), Status::Forbidden);
}

#[test]
fn search_without_room_id_excludes_rooms_outsider_is_not_in() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "searchleak");
    let mate_id = register(&client, "searchleakmate");
    register(&client, "searchleakoutsider");
    login(&client, "searchleak");
    let room = create_group_room(&client, &owner_csrf, "leak-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    send_text_message(&client, &owner_csrf, &room_id, "classified walnut recipe");

    login(&client, "searchleakoutsider");
    let res = client.get("/api/search?q=walnut").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["results"].as_array().unwrap().len(), 0, "search with no room_id must not surface messages from rooms the caller isn't a member of");
}

#[test]
fn empty_query_is_rejected() {
    let client = test_client();
    register_and_login(&client, "searchempty");
    let res = client.get("/api/search?q=").dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn advanced_search_matches_basic_search_results() {
    let client = test_client();
    let (_owner, owner_csrf) = register_and_login(&client, "advsearch");
    let mate_id = register(&client, "advsearchmate");
    login(&client, "advsearch");
    let room = create_group_room(&client, &owner_csrf, "adv-search-room", &[&mate_id]);
    let room_id = room["id"].as_str().unwrap().to_string();

    send_text_message(&client, &owner_csrf, &room_id, "the deployment pipeline is green");

    let res = client
        .post("/api/search/advanced")
        .header(ContentType::JSON)
        .body(serde_json::json!({"q": "pipeline"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: Value = res.into_json().unwrap();
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
}
