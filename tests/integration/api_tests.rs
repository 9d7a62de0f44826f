//! HTTP tests against a running server

use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";

async fn create_member(client: &Client) -> i64 {
    let tag = Uuid::new_v4().simple().to_string();
    let response = client
        .post(format!("{}/users", BASE_URL))
        .json(&json!({
            "external_id": format!("H{}", &tag[..12]),
            "email": format!("{}@campus.test", &tag[..16]),
            "password": "correct horse battery",
            "full_name": "Http Member"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No id in response")
}

async fn create_book(client: &Client, copies: i32) -> i64 {
    let tag = Uuid::new_v4().simple().to_string();
    let response = client
        .post(format!("{}/books", BASE_URL))
        .json(&json!({
            "isbn": format!("979{}", &tag[..10]),
            "title": "Http Title",
            "author": "Http Author",
            "total_copies": copies
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No id in response")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return_flow() {
    let client = Client::new();
    let user_id = create_member(&client).await;
    let book_id = create_book(&client, 1).await;

    let response = client
        .post(format!("{}/borrowings", BASE_URL))
        .json(&json!({ "user_id": user_id, "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    let borrowing: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(borrowing["status"], "borrowed");

    let response = client
        .post(format!("{}/borrowings", BASE_URL))
        .json(&json!({ "user_id": user_id, "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);
    let error: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(error["error"], "BookUnavailable");

    let response = client
        .post(format!("{}/borrowings/{}/return", BASE_URL, borrowing["id"]))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let outcome: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(outcome["borrowing"]["status"], "returned");
    assert!(outcome["reservation_fulfilled"].is_null());

    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to send request");
    let book: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(book["available_copies"], 1);
}

#[tokio::test]
#[ignore]
async fn test_reservation_conflict() {
    let client = Client::new();
    let user_id = create_member(&client).await;
    let book_id = create_book(&client, 1).await;

    let reserve = || {
        client
            .post(format!("{}/reservations", BASE_URL))
            .json(&json!({ "user_id": user_id, "book_id": book_id }))
            .send()
    };

    let first = reserve().await.expect("Failed to send request");
    assert_eq!(first.status(), 201);

    let second = reserve().await.expect("Failed to send request");
    assert_eq!(second.status(), 409);
    let error: Value = second.json().await.expect("Failed to parse response");
    assert_eq!(error["error"], "AlreadyReserved");
}

#[tokio::test]
#[ignore]
async fn test_unknown_borrowing_is_not_found() {
    let client = Client::new();

    let response = client
        .post(format!("{}/borrowings/{}/renew", BASE_URL, i32::MAX))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[ignore]
async fn test_openapi_document() {
    let client = Client::new();

    let response = client
        .get("http://localhost:8080/api-docs/openapi.json")
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let doc: Value = response.json().await.expect("Failed to parse response");
    assert!(doc["paths"]["/borrowings/{id}/return"].is_object());
}
