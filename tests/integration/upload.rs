//! S3 from the spec: the upload handshake. A multipart file upload mints a
//! single-use token; `send_message` consumes it and the resulting message
//! carries the server-authoritative file metadata, never the client's.

use crate::common::{csrf_header, register_and_login, test_client};
use rocket::http::{ContentType, Status};

const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn multipart_body(room_id: &str, filename: &str, bytes: &[u8]) -> (ContentType, Vec<u8>) {
    let boundary = "----intranetchattestboundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"room_id\"\r\n\r\n");
    body.extend_from_slice(room_id.as_bytes());
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (ContentType::with_params("multipart", "form-data", ("boundary", boundary)), body)
}

#[test]
fn upload_handshake_mints_token_consumed_by_send_message() {
    let client = test_client();
    let (alice_id, alice_csrf) = register_and_login(&client, "alice_upload");
    let (bob_id, _bob_csrf) = register_and_login(&client, "bob_upload");

    let room = crate::common::create_direct_room(&client, &alice_csrf, &bob_id);
    let room_id = room["id"].as_str().unwrap();

    let mut file_bytes = PNG_HEADER.to_vec();
    file_bytes.extend_from_slice(b"rest-of-the-png-does-not-matter");
    let (ct, body) = multipart_body(room_id, "photo.png", &file_bytes);

    let res = client
        .post("/api/upload")
        .header(ct)
        .header(csrf_header(&alice_csrf))
        .body(body)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let upload: serde_json::Value = res.into_json().unwrap();
    assert_eq!(upload["scan_status"], "clean");
    let token = upload["upload_token"].as_str().unwrap().to_string();

    let res = client
        .post(format!("/api/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&alice_csrf))
        .body(serde_json::json!({"message_type": "image", "upload_token": token}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let message: serde_json::Value = res.into_json().unwrap();
    assert_eq!(message["content"], "photo.png");
    assert_eq!(message["message_type"], "image");
    assert_eq!(message["sender_id"], alice_id);
    assert_eq!(message["encrypted"], false);

    // Replaying the same token is rejected: single-use.
    let res = client
        .post(format!("/api/rooms/{room_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&alice_csrf))
        .body(serde_json::json!({"message_type": "image", "upload_token": token}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn upload_token_rejected_for_a_different_room() {
    let client = test_client();
    let (_alice_id, alice_csrf) = register_and_login(&client, "alice_upload2");
    let (bob_id, bob_csrf) = register_and_login(&client, "bob_upload2");
    let (carol_id, _carol_csrf) = register_and_login(&client, "carol_upload2");

    let room_a = crate::common::create_direct_room(&client, &alice_csrf, &bob_id);
    let room_b = crate::common::create_direct_room(&client, &bob_csrf, &carol_id);
    let room_a_id = room_a["id"].as_str().unwrap();
    let room_b_id = room_b["id"].as_str().unwrap();

    let (ct, body) = multipart_body(room_a_id, "doc.txt", b"plain text content");
    let res = client.post("/api/upload").header(ct).header(csrf_header(&alice_csrf)).body(body).dispatch();
    assert_eq!(res.status(), Status::Ok);
    let upload: serde_json::Value = res.into_json().unwrap();
    let token = upload["upload_token"].as_str().unwrap().to_string();

    // Token was minted for room_a bound to alice; bob presenting it in room_b
    // (where he is a member) still fails on the user/room binding check.
    let res = client
        .post(format!("/api/rooms/{room_b_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&bob_csrf))
        .body(serde_json::json!({"message_type": "file", "upload_token": token}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);

    // The token is still intact (the mismatched attempt never consumed it)
    // and correctly bound to room_a/alice/file.
    let res = client
        .post(format!("/api/rooms/{room_a_id}/messages"))
        .header(ContentType::JSON)
        .header(csrf_header(&alice_csrf))
        .body(serde_json::json!({"message_type": "file", "upload_token": token}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn upload_rejects_content_mismatched_extension() {
    let client = test_client();
    let (_alice_id, alice_csrf) = register_and_login(&client, "alice_upload3");
    let (bob_id, _bob_csrf) = register_and_login(&client, "bob_upload3");
    let room = crate::common::create_direct_room(&client, &alice_csrf, &bob_id);
    let room_id = room["id"].as_str().unwrap();

    // Claims to be a PNG but doesn't carry the PNG magic bytes.
    let (ct, body) = multipart_body(room_id, "fake.png", b"not actually a png");
    let res = client.post("/api/upload").header(ct).header(csrf_header(&alice_csrf)).body(body).dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}
