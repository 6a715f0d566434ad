//! HTTP transport integration tests.
//!
//! Starts an axum server over the gateway and exercises it with reqwest.

use civitas_gateway::http::{self, HttpRoutes};
use civitas_gateway::users::{user_service, UserStore};
use civitas_gateway::ServiceHandle;
use serde_json::json;

use crate::support::Harness;

/// Bind to port 0 and return the actual address.
async fn start_server(h: &Harness) -> String {
    let app = http::router(h.gateway.clone(), HttpRoutes::from_registry(&h.registry));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn users(h: &Harness) -> ServiceHandle {
    user_service(UserStore::new()).attach(&h.bus, &h.registry).unwrap()
}

#[tokio::test]
async fn health_check() {
    let h = Harness::new(&["User"]);
    let base = start_server(&h).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["families"], json!(["User"]));
}

#[tokio::test]
async fn user_crud_over_http() {
    let h = Harness::new(&["User"]);
    let _service = users(&h);
    let base = start_server(&h).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/users")).send().await.unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .post(format!("{base}/users"))
        .json(&json!({ "msisdn": "306912345678", "addresses": [{ "city": "Athens" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let resp = client
        .put(format!("{base}/users/{id}"))
        .json(&json!({ "name": "Ada" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(updated["name"], "Ada");

    let resp = client.get(format!("{base}/users/{id}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.delete(format!("{base}/users/{id}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn validation_failure_maps_to_400() {
    let h = Harness::new(&["User"]);
    let _service = users(&h);
    let base = start_server(&h).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/users"))
        .json(&json!({ "msisdn": "1", "addresses": [] }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["errors"][0]["code"], "AT_LEAST_ONE_ADDRESS_MUST_BE_SET");
}

#[tokio::test]
async fn unknown_resource_is_404() {
    let h = Harness::new(&["User"]);
    let base = start_server(&h).await;

    let resp = reqwest::get(format!("{base}/orders")).await.unwrap();
    assert_eq!(resp.status(), 404);
}
