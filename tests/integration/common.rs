use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::Value;

/// Wrapper around Client that auto-deletes the temp DB (and its WAL/SHM
/// siblings) on drop, so repeated test runs don't accumulate files under
/// /tmp. Client is dropped first to release the SQLite connection.
pub struct TestClient {
    client: Option<Client>,
    db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

fn unique_db_path() -> String {
    format!("/tmp/intranet_chat_test_{}.db", uuid::Uuid::new_v4().simple())
}

pub fn test_client() -> TestClient {
    let db_path = unique_db_path();
    let rocket = intranet_chat::rocket_with_db(&db_path);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

pub fn test_client_with_rate_limits(config: intranet_chat::rate_limit::RateLimitConfig) -> TestClient {
    let db_path = unique_db_path();
    let rocket = intranet_chat::rocket_with_db_and_config(&db_path, config);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient { client: Some(client), db_path }
}

pub fn csrf_header(csrf: &str) -> Header<'static> {
    Header::new("X-CSRF-Token", csrf.to_string())
}

/// Registers a brand new user and logs them in. Returns (user_id, csrf_token).
/// The client's cookie jar now carries the session + CSRF cookies for this user.
pub fn register_and_login(client: &Client, username: &str) -> (String, String) {
    let res = client
        .post("/api/register")
        .header(ContentType::JSON)
        .body(serde_json::json!({"username": username, "password": "hunter2pass"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "register failed for {username}");
    let user: Value = res.into_json().unwrap();
    let user_id = user["id"].as_str().unwrap().to_string();

    let res = client
        .post("/api/login")
        .header(ContentType::JSON)
        .body(serde_json::json!({"username": username, "password": "hunter2pass"}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok, "login failed for {username}");
    let body: Value = res.into_json().unwrap();
    let csrf = body["csrf_token"].as_str().unwrap().to_string();
    (user_id, csrf)
}

pub fn create_direct_room(client: &Client, csrf: &str, other_user_id: &str) -> Value {
    let res = client
        .post("/api/rooms")
        .header(ContentType::JSON)
        .header(csrf_header(csrf))
        .body(serde_json::json!({"members": [other_user_id]}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    res.into_json().unwrap()
}

pub fn create_group_room(client: &Client, csrf: &str, name: &str, members: &[&str]) -> Value {
    let res = client
        .post("/api/rooms")
        .header(ContentType::JSON)
        .header(csrf_header(csrf))
        .body(serde_json::json!({"name": name, "members": members}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    res.into_json().unwrap()
}

pub fn send_text_message(client: &Client, csrf: &str, room_id: &str, content: &str) -> Value {
    let res = client
        .post(format!("/api/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(csrf))
        .body(serde_json::json!({"message_type": "text", "content": content}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    res.into_json().unwrap()
}
