//! The reference `User` family end to end: gateway → engine → user service.

use civitas_gateway::users::{codes, user_service, UserStore};
use civitas_gateway::{Action, CompletionPayload, ServiceHandle};
use serde_json::{json, Value};

use crate::support::Harness;

fn setup() -> (Harness, UserStore, ServiceHandle) {
    let h = Harness::new(&["User"]);
    let store = UserStore::new();
    let service = user_service(store.clone()).attach(&h.bus, &h.registry).unwrap();
    (h, store, service)
}

async fn call(h: &Harness, action: Action, payload: Value) -> CompletionPayload {
    h.gateway
        .request("User", action, payload)
        .await
        .unwrap()
        .completion_payload()
}

fn new_user(msisdn: &str) -> Value {
    json!({ "msisdn": msisdn, "addresses": [{ "city": "Athens" }] })
}

#[tokio::test]
async fn create_then_get() {
    let (h, store, _service) = setup();

    let created = call(&h, Action::Create, new_user("306912345678")).await;
    assert_eq!(created.status_code, 201);
    let id = created.body["id"].as_str().unwrap().to_string();
    assert_eq!(created.body["msisdn"], "306912345678");

    let fetched = call(&h, Action::GetSingle, json!({ "id": id })).await;
    assert_eq!(fetched.status_code, 200);
    assert_eq!(fetched.body["id"], id.as_str());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn duplicate_number_is_rejected() {
    let (h, _store, service) = setup();
    call(&h, Action::Create, new_user("306912345678")).await;

    let rejected = call(&h, Action::Create, new_user("306912345678")).await;

    assert_eq!(rejected.status_code, 400);
    assert_eq!(rejected.body["message"], "Some validation errors occurred.");
    assert_eq!(rejected.body["errors"][0]["code"], codes::NUMBER_ALREADY_EXISTS);
    assert_eq!(rejected.body["errors"][0]["path"], json!(["msisdn"]));
    assert_eq!(service.stats().messages_failed, 1);
}

#[tokio::test]
async fn missing_address_is_rejected() {
    let (h, _store, _service) = setup();

    let rejected = call(&h, Action::Create, json!({ "msisdn": "1", "addresses": [] })).await;

    assert_eq!(rejected.status_code, 400);
    assert_eq!(
        rejected.body["errors"][0]["code"],
        codes::AT_LEAST_ONE_ADDRESS_MUST_BE_SET
    );
}

#[tokio::test]
async fn update_unknown_user_is_not_found() {
    let (h, _store, _service) = setup();

    let rejected = call(&h, Action::Update, json!({ "id": "nope", "name": "Ada" })).await;

    assert_eq!(rejected.status_code, 400);
    assert_eq!(rejected.body["errors"][0]["code"], codes::USER_NOT_FOUND);
    assert_eq!(rejected.body["errors"][0]["path"], json!(["id"]));
}

#[tokio::test]
async fn update_and_delete() {
    let (h, store, _service) = setup();
    let created = call(&h, Action::Create, new_user("111")).await;
    let id = created.body["id"].as_str().unwrap().to_string();

    let updated = call(&h, Action::Update, json!({ "id": id, "name": "Ada" })).await;
    assert_eq!(updated.status_code, 200);
    assert_eq!(updated.body["name"], "Ada");
    assert_eq!(updated.body["msisdn"], "111");

    let deleted = call(&h, Action::Delete, json!({ "id": id })).await;
    assert_eq!(deleted.status_code, 200);
    assert!(store.get(&id).is_none());
}

#[tokio::test]
async fn get_all_is_empty_then_lists() {
    let (h, _store, _service) = setup();

    let empty = call(&h, Action::GetAll, json!({})).await;
    assert_eq!(empty, CompletionPayload::no_content());

    call(&h, Action::Create, new_user("111")).await;
    call(&h, Action::Create, new_user("222")).await;

    let listed = call(&h, Action::GetAll, json!({})).await;
    assert_eq!(listed.status_code, 200);
    assert_eq!(listed.body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_payload_is_a_decode_failure() {
    let (h, _store, _service) = setup();

    let rejected = call(&h, Action::Create, json!({ "addresses": "not-a-list" })).await;

    assert_eq!(rejected.status_code, 400);
    assert!(rejected.body["message"]
        .as_str()
        .unwrap()
        .starts_with("decode failed"));
}

#[tokio::test]
async fn stopping_the_service_unsubscribes_handlers() {
    let (h, _store, service) = setup();
    assert_eq!(h.bus.listener_count("UserCreateEvent"), 1);

    service.stop();

    for action in Action::ALL {
        let channel = h.registry.descriptor("User").unwrap().dispatch_channel(action);
        assert_eq!(h.bus.listener_count(channel), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_with_one_number_admit_one() {
    let (h, store, _service) = setup();

    let attempts = (0..8).map(|_| call(&h, Action::Create, new_user("306900000000")));
    let results = futures::future::join_all(attempts).await;

    let created = results.iter().filter(|c| c.status_code == 201).count();
    let rejected: Vec<_> = results.iter().filter(|c| c.status_code == 400).collect();
    assert_eq!(created, 1);
    assert_eq!(rejected.len(), 7);
    for completion in rejected {
        assert_eq!(completion.body["errors"][0]["code"], codes::NUMBER_ALREADY_EXISTS);
    }
    assert_eq!(store.len(), 1);
}
