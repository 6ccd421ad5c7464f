//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    extract::Request,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultOnResponse, TraceLayer},
};

use crate::{
    auth::{jwt_auth_middleware, require_admin_middleware, stream_auth_middleware},
    handlers,
    middleware::{ip_whitelist_middleware, request_tracking_middleware, AppState},
};

/// 请求体上限（活动记录只包含少量 JSON）
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 活动日志（管理员，令牌来自请求头）
    // 注意 layer 顺序：后添加的先执行，认证先于权限检查
    let activity_routes = Router::new()
        .route(
            "/api/v1/activity",
            get(handlers::activity::list_activity).post(handlers::activity::create_activity),
        )
        .route("/api/v1/activity/verify", get(handlers::activity::verify_activity))
        .layer(from_fn_with_state(state.clone(), require_admin_middleware))
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    // 实时流（管理员，令牌可来自查询参数）
    let stream_routes = Router::new()
        .route("/api/v1/activity/stream", get(handlers::activity::stream_activity))
        .layer(from_fn_with_state(state.clone(), require_admin_middleware))
        .layer(from_fn_with_state(state.clone(), stream_auth_middleware));

    // 任意已认证用户
    let session_routes = Router::new()
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(activity_routes)
        .merge(stream_routes)
        .merge(session_routes)
        .layer(from_fn_with_state(state.clone(), ip_whitelist_middleware))
        .layer(axum::middleware::from_fn(request_tracking_middleware))
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(
            TraceLayer::new_for_http()
                // 只记录路径：实时流的查询参数中带有令牌
                .make_span_with(|req: &Request| {
                    tracing::debug_span!("http", method = %req.method(), path = %req.uri().path())
                })
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
