//! Round trips through the attached correlation engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use civitas_gateway::{
    Action, BusError, ChannelRegistry, CompletionPayload, CrudService, EngineError, EventBus,
    Gateway, Message, MessageType, SubscribeOptions,
};
use serde_json::json;

use crate::support::Harness;

#[tokio::test]
async fn create_round_trip_keeps_correlation_id() {
    let h = Harness::new(&["User"]);
    let bus = h.bus.clone();
    let _handler = h
        .bus
        .subscribe("UserCreateEvent", move |request| {
            let reply = Message::reply(
                request,
                "UserCreateCompletedEvent",
                CompletionPayload::created(json!({ "id": "u1" })).into_value(),
            );
            bus.publish("UserCreateCompletedEvent", &reply).unwrap();
        })
        .unwrap();
    let baseline = h.listeners("User");

    let mut completed = h
        .bus
        .subscribe_queued("UserCompletedEvent", SubscribeOptions::new().correlated("abc"))
        .unwrap();
    let request = Message::with_correlation_id(
        "UserEvent",
        MessageType::Crud,
        Action::Create,
        json!({ "msisdn": "306912345678" }),
        "abc",
    );
    h.bus.publish("UserEvent", &request).unwrap();

    let completion = completed.recv().await.unwrap();
    assert_eq!(completion.channel(), "UserCompletedEvent");
    assert_eq!(completion.correlation_id(), "abc");
    assert_eq!(completion.action(), Action::Create);
    assert_eq!(
        completion.completion_payload(),
        CompletionPayload::created(json!({ "id": "u1" }))
    );

    drop(completed);
    assert_eq!(h.listeners("User"), baseline);
}

#[tokio::test]
async fn synchronous_handler_completion_is_not_lost() {
    let h = Harness::new(&["User"]);
    let _service = CrudService::new("User")
        .on(Action::GetSingle, |ctx| {
            Ok(CompletionPayload::ok(json!({ "id": ctx.required_str("id")? })))
        })
        .attach(&h.bus, &h.registry)
        .unwrap();

    let completion = h
        .gateway
        .request("User", Action::GetSingle, json!({ "id": "u7" }))
        .await
        .unwrap();

    let payload = completion.completion_payload();
    assert_eq!(payload.status_code, 200);
    assert_eq!(payload.body["id"], "u7");
}

#[tokio::test]
async fn listeners_are_removed_after_each_request() {
    let h = Harness::new(&["User"]);
    let _service = CrudService::new("User")
        .on(Action::Delete, |_| Ok(CompletionPayload::ok(json!({}))))
        .attach(&h.bus, &h.registry)
        .unwrap();
    let baseline = h.listeners("User");

    for _ in 0..3 {
        h.gateway
            .request("User", Action::Delete, json!({ "id": "u1" }))
            .await
            .unwrap();
        assert_eq!(h.listeners("User"), baseline);
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_for_one_family_are_isolated() {
    let h = Harness::new(&["User"]);
    let _service = CrudService::new("User")
        .on_async(Action::GetSingle, |ctx| async move {
            let id = ctx.required_str("id")?.to_string();
            // The first request answers last.
            let delay = if id == "slow" { 200 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(CompletionPayload::ok(json!({ "id": id })))
        })
        .attach(&h.bus, &h.registry)
        .unwrap();

    let (slow, fast) = tokio::join!(
        h.gateway.request("User", Action::GetSingle, json!({ "id": "slow" })),
        h.gateway.request("User", Action::GetSingle, json!({ "id": "fast" })),
    );

    let slow = slow.unwrap();
    let fast = fast.unwrap();
    assert_ne!(slow.correlation_id(), fast.correlation_id());
    assert_eq!(slow.completion_payload().body["id"], "slow");
    assert_eq!(fast.completion_payload().body["id"], "fast");
}

#[tokio::test(start_paused = true)]
async fn silent_service_times_out_with_504() {
    let h = Harness::with_timeouts(&["User"], Duration::from_secs(1), Duration::from_secs(2));
    let baseline = h.listeners("User");

    let completion = h
        .gateway
        .request("User", Action::Update, json!({ "id": "u1" }))
        .await
        .unwrap();

    let payload = completion.completion_payload();
    assert_eq!(payload.status_code, 504);
    assert_eq!(payload.body["correlationId"], completion.correlation_id());

    tokio::task::yield_now().await;
    assert_eq!(h.listeners("User"), baseline);
}

#[tokio::test(start_paused = true)]
async fn gateway_times_out_without_engine() {
    let bus = EventBus::new();
    let registry = Arc::new(ChannelRegistry::conventional(["User"]).unwrap());
    let gateway = Gateway::new(bus.clone(), registry).with_request_timeout(Duration::from_secs(1));

    let err = gateway
        .request("User", Action::Create, json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::DispatchTimeout { action: Action::Create, .. }));
    assert_eq!(err.status_code(), 504);
    assert_eq!(bus.listener_count("UserCompletedEvent"), 0);
}

#[tokio::test]
async fn unknown_family_is_rejected_before_publishing() {
    let h = Harness::new(&["User"]);

    let err = h
        .gateway
        .request("Order", Action::Create, json!({}))
        .await
        .unwrap_err();

    assert_eq!(err, EngineError::UnknownChannelFamily("Order".into()));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn closed_bus_fails_requests() {
    let h = Harness::new(&["User"]);
    h.bus.close();

    let err = h
        .gateway
        .request("User", Action::GetAll, json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Bus(BusError::Closed { .. })));
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn notifications_are_not_dispatched() {
    let h = Harness::new(&["User"]);
    let dispatched = Arc::new(AtomicUsize::new(0));
    let counter = dispatched.clone();
    let _handler = h
        .bus
        .subscribe("UserCreateEvent", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let notice = Message::new("UserEvent", MessageType::Notification, Action::Create, json!({}));
    h.bus.publish("UserEvent", &notice).unwrap();

    assert_eq!(dispatched.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn engine_bridge_returns_external_completion() {
    let h = Harness::new(&["User"]);
    let _service = CrudService::new("User")
        .on(Action::GetAll, |_| Ok(CompletionPayload::no_content()))
        .attach(&h.bus, &h.registry)
        .unwrap();

    let request = Message::crud("UserEvent", Action::GetAll, json!({}));
    let completion = h.engine.bridge(request.clone()).await.unwrap();

    assert_eq!(completion.channel(), "UserCompletedEvent");
    assert_eq!(completion.correlation_id(), request.correlation_id());
    assert_eq!(completion.completion_payload(), CompletionPayload::no_content());
}

#[tokio::test]
async fn arrival_channel_decides_the_family() {
    let h = Harness::new(&["User", "Chat"]);
    let _users = CrudService::new("User")
        .on(Action::Create, |_| Ok(CompletionPayload::created(json!({ "who": "user" }))))
        .attach(&h.bus, &h.registry)
        .unwrap();
    let _chats = CrudService::new("Chat")
        .on(Action::Create, |_| Ok(CompletionPayload::created(json!({ "who": "chat" }))))
        .attach(&h.bus, &h.registry)
        .unwrap();

    let mut chat_completed = h
        .bus
        .subscribe_queued("ChatCompletedEvent", SubscribeOptions::new().correlated("c1"))
        .unwrap();
    let mut user_completed = h
        .bus
        .subscribe_queued("UserCompletedEvent", SubscribeOptions::new().correlated("c1"))
        .unwrap();

    // Envelope names the User family, but the message is published on Chat's channel.
    let request =
        Message::with_correlation_id("UserEvent", MessageType::Crud, Action::Create, json!({}), "c1");
    h.bus.publish("ChatEvent", &request).unwrap();

    let completion = chat_completed.recv().await.unwrap();
    assert_eq!(completion.channel(), "ChatCompletedEvent");
    assert_eq!(completion.completion_payload().body["who"], "chat");

    tokio::task::yield_now().await;
    assert!(user_completed.try_recv().is_none());
}

#[tokio::test]
async fn completion_on_another_actions_channel_keeps_dispatched_action() {
    let h = Harness::new(&["User"]);
    let bus = h.bus.clone();
    let _handler = h
        .bus
        .subscribe("UserUpdateEvent", move |request| {
            let reply = Message::reply(
                request,
                "UserDeleteCompletedEvent",
                CompletionPayload::ok(json!({ "id": "u1" })).into_value(),
            );
            bus.publish("UserDeleteCompletedEvent", &reply).unwrap();
        })
        .unwrap();
    let baseline = h.listeners("User");

    let completion = h
        .gateway
        .request("User", Action::Update, json!({ "id": "u1" }))
        .await
        .unwrap();

    assert_eq!(completion.action(), Action::Update);
    assert_eq!(completion.completion_payload().status_code, 200);
    assert_eq!(h.listeners("User"), baseline);
}
