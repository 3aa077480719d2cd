use actix_web::{body::MessageBody as _, http::StatusCode, test, test::TestRequest, web, App};
use chat_order_engine::{
    bot_types::MessageBody,
    state::{ConversationState, InMemoryStateStore},
    test_utils::{default_catalog, FakeBackend},
    traits::StateStore,
    BotSettings,
    EventDispatcher,
};
use cog_common::Secret;

use crate::{
    endpoint_tests::mocks::MockSender,
    helpers::calculate_signature,
    middleware::SignatureMiddlewareFactory,
    routes::{health, ChatWebhookRoute},
};

const SECRET: &str = "test-channel-secret";

fn order_event_payload() -> String {
    serde_json::json!({
        "destination": "bot-1",
        "events": [{
            "type": "message",
            "replyToken": "rt-1",
            "source": { "type": "user", "userId": "U1" },
            "message": { "id": "m1", "type": "text", "text": "Green Hug qty: 2" },
            "timestamp": 1718000000000u64
        }]
    })
    .to_string()
}

async fn post_webhook(
    signature: Option<&str>,
    body: String,
    backend: FakeBackend,
    state: InMemoryStateStore,
    sender: MockSender,
) -> Result<(StatusCode, String), String> {
    let dispatcher = EventDispatcher::new(backend, state);
    let app = App::new()
        .app_data(web::Data::new(dispatcher))
        .app_data(web::Data::new(sender))
        .app_data(web::Data::new(BotSettings::default()))
        .service(health)
        .service(
            web::scope("/chat")
                .wrap(SignatureMiddlewareFactory::new("X-Line-Signature", Secret::new(SECRET.into()), true))
                .service(ChatWebhookRoute::<FakeBackend, InMemoryStateStore, MockSender>::new()),
        );
    let service = test::init_service(app).await;
    let mut req = TestRequest::post().uri("/chat/webhook").insert_header(("Content-Type", "application/json"));
    if let Some(sig) = signature {
        req = req.insert_header(("X-Line-Signature", sig));
    }
    let req = req.set_payload(body).to_request();
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}

#[actix_web::test]
async fn missing_signature_is_rejected() {
    let _ = env_logger::try_init().ok();
    let err = post_webhook(None, order_event_payload(), FakeBackend::new(), InMemoryStateStore::new(), MockSender::new())
        .await
        .expect_err("Expected error");
    assert_eq!(err, "Invalid request.");
}

#[actix_web::test]
async fn invalid_signature_is_rejected() {
    let _ = env_logger::try_init().ok();
    let body = order_event_payload();
    let sig = calculate_signature("some-other-secret", body.as_bytes());
    let backend = FakeBackend::new().with_catalog(default_catalog());
    let err = post_webhook(Some(&sig), body, backend.clone(), InMemoryStateStore::new(), MockSender::new())
        .await
        .expect_err("Expected error");
    assert_eq!(err, "Invalid request.");
    // Nothing was processed
    assert!(backend.profile("U1").is_none());
}

#[actix_web::test]
async fn tampered_body_is_rejected() {
    let _ = env_logger::try_init().ok();
    let sig = calculate_signature(SECRET, order_event_payload().as_bytes());
    let tampered = order_event_payload().replace("qty: 2", "qty: 200");
    let err = post_webhook(Some(&sig), tampered, FakeBackend::new(), InMemoryStateStore::new(), MockSender::new())
        .await
        .expect_err("Expected error");
    assert_eq!(err, "Invalid request.");
}

#[actix_web::test]
async fn valid_delivery_dispatches_and_replies() {
    let _ = env_logger::try_init().ok();
    let body = order_event_payload();
    let sig = calculate_signature(SECRET, body.as_bytes());
    let backend = FakeBackend::new().with_catalog(default_catalog());
    let state = InMemoryStateStore::new();
    let mut sender = MockSender::new();
    // An unlinked user placing an order gets asked for a phone number on the reply channel
    sender
        .expect_reply()
        .times(1)
        .withf(|token, messages| {
            token.to_string() == "rt-1"
                && messages.iter().any(|m| matches!(m, MessageBody::Text { text } if text.contains("phone")))
        })
        .returning(|_, _| true);
    let (status, response) =
        post_webhook(Some(&sig), body, backend.clone(), state.clone(), sender).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert!(response.contains("\"success\":true"));
    assert!(backend.profile("U1").is_some());
    assert!(matches!(state.get("U1").await, Some(ConversationState::AwaitingPhone { pending: Some(_), .. })));
}

#[actix_web::test]
async fn empty_event_batch_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let body = r#"{"destination":"bot-1","events":[]}"#.to_string();
    let sig = calculate_signature(SECRET, body.as_bytes());
    let (status, _) = post_webhook(Some(&sig), body, FakeBackend::new(), InMemoryStateStore::new(), MockSender::new())
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn unknown_event_kinds_are_skipped() {
    let _ = env_logger::try_init().ok();
    let body = serde_json::json!({
        "events": [{ "type": "postback", "source": { "type": "user", "userId": "U1" } }]
    })
    .to_string();
    let sig = calculate_signature(SECRET, body.as_bytes());
    let backend = FakeBackend::new();
    let (status, _) = post_webhook(Some(&sig), body, backend.clone(), InMemoryStateStore::new(), MockSender::new())
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert!(backend.profile("U1").is_none());
}

#[actix_web::test]
async fn unsigned_requests_pass_when_checks_are_disabled() {
    let _ = env_logger::try_init().ok();
    let backend = FakeBackend::new().with_catalog(default_catalog());
    let dispatcher = EventDispatcher::new(backend, InMemoryStateStore::new());
    let mut sender = MockSender::new();
    sender.expect_reply().returning(|_, _| true);
    let app = App::new()
        .app_data(web::Data::new(dispatcher))
        .app_data(web::Data::new(sender))
        .app_data(web::Data::new(BotSettings::default()))
        .service(
            web::scope("/chat")
                .wrap(SignatureMiddlewareFactory::new("X-Line-Signature", Secret::new(SECRET.into()), false))
                .service(ChatWebhookRoute::<FakeBackend, InMemoryStateStore, MockSender>::new()),
        );
    let service = test::init_service(app).await;
    let req = TestRequest::post()
        .uri("/chat/webhook")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(order_event_payload())
        .to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let app = App::new().service(health);
    let service = test::init_service(app).await;
    let req = TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
}
