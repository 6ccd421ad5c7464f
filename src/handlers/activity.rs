//! 活动日志的 HTTP 处理器

use crate::{
    error::AppError,
    middleware::AppState,
    models::activity::*,
    realtime::{ChangeStream, StreamSettings},
};
use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl ActivityQuery {
    fn filters(self) -> ActivityFilters {
        ActivityFilters {
            subject_type: self.subject_type,
            subject_id: self.subject_id,
            action: self.action,
            actor_id: self.actor_id,
            from: self.from,
            to: self.to,
        }
    }
}

/// 实时流参数；`token` 已由认证中间件消费
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub limit: Option<i64>,
}

/// 查询活动日志（最新在前）
pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let limit = query.limit;
    let events = state.activity_service.query(&query.filters(), limit).await?;

    Ok(Json(json!({
        "events": events,
        "count": events.len(),
    })))
}

/// 手动记录一条活动
pub async fn create_activity(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    req: Result<Json<RecordActivityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = req?;
    let receipt = state.activity_service.record(&ctx, &req).await?;

    Ok(Json(json!({
        "ok": true,
        "id": receipt.id,
        "hashSelf": receipt.hash_self,
    })))
}

/// 校验哈希链
pub async fn verify_activity(
    State(state): State<Arc<AppState>>,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> Result<Json<VerifyReport>, AppError> {
    let Query(query) = query?;
    let report = state.activity_service.verify(query.limit).await?;
    Ok(Json(report))
}

/// 实时活动流 (SSE)
pub async fn stream_activity(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let filters = ActivityFilters {
        subject_type: query.subject_type,
        subject_id: query.subject_id,
        action: query.action,
        actor_id: query.actor_id,
        from: None,
        to: None,
    };

    let stream = ChangeStream::new(
        state.activity_service.store().clone(),
        filters,
        StreamSettings::from(state.activity_service.config()),
        state.shutdown.clone(),
    )
    .open()
    .await?;

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(format!("Failed to build stream response: {}", e)))
}
