//! 认证相关的 HTTP 处理器

use crate::{
    auth::{middleware::AuthContext, revocation},
    error::AppError,
    middleware::AppState,
    models::activity::{severity, RecordActivityRequest, RequestContext},
};
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

/// 登出：吊销当前访问令牌直至其过期
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    ctx: RequestContext,
) -> Result<impl IntoResponse, AppError> {
    revocation::revoke(
        state.sessions.as_ref(),
        &auth_context.token_id,
        auth_context.expires_at,
    )
    .await?;

    tracing::info!(
        user_id = %auth_context.user_id,
        username = %auth_context.username,
        "User logged out"
    );

    // 活动日志（尽力而为）
    state.activity_service.record_in_background(
        ctx,
        RecordActivityRequest::new("auth.logout", "session", &auth_context.user_id)
            .with_severity(severity::INFO)
            .with_meta(json!({ "jti": auth_context.token_id })),
    );

    Ok(Json(json!({ "ok": true })))
}
