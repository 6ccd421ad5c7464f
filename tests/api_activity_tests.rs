//! 活动日志 API 集成测试（内存存储）

use activity_log::{
    activity::{identity, REDACTION_MARKER},
    models::activity::{ActivityEvent, RecordActivityRequest, RequestContext},
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

mod common;
use common::{admin_token, create_test_app, get_with_token, post_json, user_token};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn record(app: &common::TestApp, action: &str, subject_id: &str) {
    app.state
        .activity_service
        .record(
            &RequestContext::system(),
            &RecordActivityRequest::new(action, "order", subject_id),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_activity_requires_token() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(Request::builder().uri("/api/v1/activity").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_activity_rejects_non_admin() {
    let app = create_test_app();
    let token = user_token(&app.state);

    let response = app
        .router
        .oneshot(get_with_token("/api/v1/activity", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_activity_rejects_query_token_outside_stream() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/activity?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_record_then_query_redacts_and_normalizes() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/v1/activity",
            &token,
            json!({
                "action": "credit.adjusted",
                "subjectType": "customer",
                "subjectId": "customer-42",
                "severity": 30,
                "meta": {
                    "reason": "goodwill",
                    "password": "hunter2",
                    "payment": { "cardNumber": "4111111111111111", "last4": "1111" }
                },
                "diff": { "before": { "credit": 10 }, "after": { "credit": 25 } }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let receipt = body_json(response).await;
    assert_eq!(receipt["ok"], true);
    assert_eq!(receipt["hashSelf"].as_str().unwrap().len(), 64);

    let response = app
        .router
        .oneshot(get_with_token("/api/v1/activity?subject_type=customer", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["count"], 1);

    let event: ActivityEvent = serde_json::from_value(json["events"][0].clone()).unwrap();
    assert_eq!(event.action, "credit.adjusted");
    assert_eq!(event.severity, 30);
    assert_eq!(event.hash_self, receipt["hashSelf"]);
    assert_eq!(event.hash_prev, None);
    assert_eq!(event.subject_id.as_deref(), Some(identity::normalize("customer-42").as_str()));
    assert_eq!(event.actor_id.as_deref(), Some("3f2b8c1e-9d4a-4e6f-8b7c-1a2d3e4f5a6b"));
    assert_eq!(event.actor_role.as_deref(), Some("admin"));
    assert!(event.request_id.is_some());

    assert_eq!(event.meta["reason"], "goodwill");
    assert_eq!(event.meta["password"], REDACTION_MARKER);
    assert_eq!(event.meta["payment"]["cardNumber"], REDACTION_MARKER);
    assert_eq!(event.meta["payment"]["last4"], "1111");
    assert_eq!(event.diff["after"]["credit"], 25);
}

#[tokio::test]
async fn test_record_validation_error() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/activity",
            &token,
            json!({ "action": "", "subjectType": "order", "subjectId": "o-1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_query_newest_first_with_filters() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    for i in 0..5 {
        let action = if i % 2 == 0 { "order.placed" } else { "order.cancelled" };
        record(&app, action, &format!("o-{}", i)).await;
    }

    let response = app
        .router
        .clone()
        .oneshot(get_with_token("/api/v1/activity", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    let events: Vec<ActivityEvent> = serde_json::from_value(json["events"].clone()).unwrap();

    assert_eq!(events.len(), 5);
    for pair in events.windows(2) {
        assert!(pair[0].cursor() > pair[1].cursor());
    }

    let response = app
        .router
        .oneshot(get_with_token("/api/v1/activity?action=order.placed&limit=2", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    let events: Vec<ActivityEvent> = serde_json::from_value(json["events"].clone()).unwrap();

    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.action == "order.placed"));
    assert_eq!(events[0].subject_id.as_deref(), Some(identity::normalize("o-4").as_str()));
}

#[tokio::test]
async fn test_query_filters_accept_raw_identifiers() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let cashier = RequestContext {
        actor_id: Some("employee-17".to_string()),
        actor_role: Some("employee".to_string()),
        ..Default::default()
    };
    app.state
        .activity_service
        .record(&cashier, &RecordActivityRequest::new("order.placed", "order", "order-7"))
        .await
        .unwrap();
    record(&app, "order.placed", "order-8").await;

    for uri in [
        "/api/v1/activity?subject_id=order-7",
        "/api/v1/activity?actor_id=employee-17",
        "/api/v1/activity?subject_type=order&subject_id=order-7&actor_id=employee-17",
    ] {
        let response = app
            .router
            .clone()
            .oneshot(get_with_token(uri, &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let events: Vec<ActivityEvent> = serde_json::from_value(json["events"].clone()).unwrap();
        assert_eq!(events.len(), 1, "{}", uri);
        assert_eq!(events[0].subject_id, Some(identity::normalize("order-7")));
        assert_eq!(events[0].actor_id, Some(identity::normalize("employee-17")));
    }

    // 规范 UUID 形式同样命中
    let normalized = identity::normalize("order-7");
    let response = app
        .router
        .oneshot(get_with_token(&format!("/api/v1/activity?subject_id={}", normalized), &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["count"], 1);
}

#[tokio::test]
async fn test_malformed_query_parameters_return_error_body() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    for uri in [
        "/api/v1/activity?limit=abc",
        "/api/v1/activity?from=yesterday",
        "/api/v1/activity/verify?limit=-x",
    ] {
        let response = app
            .router
            .clone()
            .oneshot(get_with_token(uri, &token))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], 400);
        assert!(json["error"]["message"].is_string());
    }
}

#[tokio::test]
async fn test_malformed_body_returns_error_body() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/activity",
            &token,
            json!({ "action": "order.placed", "subjectType": "order", "subjectId": "o-1", "severity": "high" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], 400);
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_query_rejects_inverted_range() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .oneshot(get_with_token(
            "/api/v1/activity?from=2024-02-01T00:00:00Z&to=2024-01-01T00:00:00Z",
            &token,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_endpoint() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .clone()
        .oneshot(get_with_token("/api/v1/activity/verify", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json, json!({ "ok": true, "checked": 0 }));

    for i in 0..4 {
        record(&app, "order.placed", &format!("o-{}", i)).await;
    }

    let response = app
        .router
        .clone()
        .oneshot(get_with_token("/api/v1/activity/verify", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json, json!({ "ok": true, "checked": 4 }));

    let response = app
        .router
        .oneshot(get_with_token("/api/v1/activity/verify?limit=2", &token))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json, json!({ "ok": true, "checked": 2 }));
}

#[tokio::test]
async fn test_stream_rejects_missing_and_bad_token() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/activity/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/activity/stream?token=not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = user_token(&app.state);
    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/activity/stream?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// 从 SSE 响应体中读取下一条事件帧（跳过心跳）
async fn next_event(body: &mut Body) -> ActivityEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("timed out waiting for stream frame")
            .expect("stream ended")
            .expect("stream error");

        let Ok(data) = frame.into_data() else { continue };
        let text = String::from_utf8(data.to_vec()).unwrap();
        if text.starts_with(':') {
            continue;
        }

        assert!(text.starts_with("id: "));
        let payload = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .expect("frame without data line");
        return serde_json::from_str(payload).unwrap();
    }
}

#[tokio::test]
async fn test_stream_delivers_post_connect_events_only() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    record(&app, "order.placed", "before-connect").await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/activity/stream?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let mut body = response.into_body();

    for i in 0..3 {
        record(&app, "order.placed", &format!("after-{}", i)).await;
    }

    for i in 0..3 {
        let event = next_event(&mut body).await;
        assert_eq!(
            event.subject_id.as_deref(),
            Some(identity::normalize(&format!("after-{}", i)).as_str())
        );
    }
}

#[tokio::test]
async fn test_stream_applies_filters() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .clone()
        .oneshot(get_with_token(
            "/api/v1/activity/stream?action=order.cancelled",
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    record(&app, "order.placed", "o-1").await;
    record(&app, "order.cancelled", "o-2").await;

    let event = next_event(&mut body).await;
    assert_eq!(event.action, "order.cancelled");
    assert_eq!(event.subject_id.as_deref(), Some(identity::normalize("o-2").as_str()));
}

#[tokio::test]
async fn test_stream_filters_accept_raw_identifiers() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .clone()
        .oneshot(get_with_token("/api/v1/activity/stream?subject_id=order-7", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    record(&app, "order.placed", "order-6").await;
    record(&app, "order.placed", "order-7").await;

    let event = next_event(&mut body).await;
    assert_eq!(event.subject_id, Some(identity::normalize("order-7")));
}

#[tokio::test]
async fn test_stream_ends_on_shutdown() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .clone()
        .oneshot(get_with_token("/api/v1/activity/stream", &token))
        .await
        .unwrap();
    let mut body = response.into_body();

    app.shutdown.send(true).unwrap();

    let next = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("stream did not close after shutdown");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = create_test_app();
    let token = admin_token(&app.state);

    let response = app
        .router
        .clone()
        .oneshot(post_json("/api/v1/auth/logout", &token, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(get_with_token("/api/v1/activity", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // 吊销同样适用于查询参数令牌
    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/activity/stream?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // 登出事件在后台记录
    let mut recorded = false;
    for _ in 0..50 {
        if !app.store.is_empty().await {
            recorded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(recorded);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = app
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"][0]["name"], "activity_store");
}

#[tokio::test]
async fn test_response_carries_request_id() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-trace-id", "trace-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-trace-id"], "trace-abc");
    assert!(response.headers().contains_key("x-request-id"));
}
