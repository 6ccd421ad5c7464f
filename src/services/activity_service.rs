//! 活动日志服务
//! 事件记录（哈希链追加）、过滤查询与链完整性校验

use std::sync::Arc;

use serde_json::{json, Value};
use validator::Validate;

use crate::{
    activity::{chain, identity, normalize_numbers, redact, ChainWalker, Divergence},
    config::ActivityConfig,
    error::AppError,
    models::activity::*,
    repository::ActivityStore,
};

pub struct ActivityService {
    store: Arc<dyn ActivityStore>,
    config: ActivityConfig,
}

impl ActivityService {
    pub fn new(store: Arc<dyn ActivityStore>, config: ActivityConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn ActivityStore> {
        &self.store
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    /// 组装待写入记录：归一化标识符、脱敏、计算自身哈希
    pub fn prepare(
        ctx: &RequestContext,
        input: &RecordActivityRequest,
    ) -> Result<NewActivity, AppError> {
        input.validate()?;

        let payload = ActivityPayload {
            request_id: ctx.request_id.clone(),
            actor_id: identity::normalize_opt(ctx.actor_id.as_deref()),
            actor_role: ctx.actor_role.clone(),
            action: input.action.clone(),
            subject_type: input.subject_type.clone(),
            subject_id: Some(identity::normalize(&input.subject_id)),
            target_type: input.target_type.clone(),
            target_id: identity::normalize_opt(input.target_id.as_deref()),
            severity: input.severity.unwrap_or(DEFAULT_SEVERITY),
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
            meta: sanitize_json(input.meta.as_ref()),
            diff: sanitize_json(input.diff.as_ref()),
        };

        let hash_self = chain::hash_payload(&payload)?;
        Ok(NewActivity { payload, hash_self })
    }

    /// 记录一条事件并返回其自身哈希，错误向调用方传播
    pub async fn record(
        &self,
        ctx: &RequestContext,
        input: &RecordActivityRequest,
    ) -> Result<RecordReceipt, AppError> {
        let record = Self::prepare(ctx, input)?;
        let event = self.store.append(&record).await?;

        metrics::counter!("activity_events_recorded_total").increment(1);
        tracing::debug!(
            id = event.id,
            action = %event.action,
            subject_type = %event.subject_type,
            hash_self = %event.hash_self,
            "Activity recorded"
        );

        Ok(RecordReceipt {
            id: event.id,
            hash_self: event.hash_self,
        })
    }

    /// 作为业务操作副作用的记录：失败只记日志，不影响业务操作
    pub async fn record_best_effort(
        &self,
        ctx: &RequestContext,
        input: &RecordActivityRequest,
    ) -> Option<RecordReceipt> {
        match self.record(ctx, input).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                metrics::counter!("activity_record_failures_total").increment(1);
                tracing::error!(
                    error = %e,
                    action = %input.action,
                    subject_type = %input.subject_type,
                    request_id = ?ctx.request_id,
                    "Failed to record activity"
                );
                None
            }
        }
    }

    /// 后台记录，不阻塞调用方
    pub fn record_in_background(self: &Arc<Self>, ctx: RequestContext, input: RecordActivityRequest) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.record_best_effort(&ctx, &input).await;
        });
    }

    /// 查询活动日志（按 at、id 倒序）
    pub async fn query(
        &self,
        filters: &ActivityFilters,
        limit: Option<i64>,
    ) -> Result<Vec<ActivityEvent>, AppError> {
        if let (Some(from), Some(to)) = (filters.from, filters.to) {
            if from > to {
                return Err(AppError::Validation("`from` must not be after `to`".to_string()));
            }
        }

        let limit = self.clamp_query_limit(limit);
        self.store.query(&filters.clone().normalized(), limit).await
    }

    pub fn clamp_query_limit(&self, limit: Option<i64>) -> i64 {
        limit
            .unwrap_or(self.config.query_default_limit)
            .clamp(1, self.config.query_max_limit)
    }

    /// 从链首开始校验至多 `limit` 条记录，遇到第一处分叉即停止
    pub async fn verify(&self, limit: Option<i64>) -> Result<VerifyReport, AppError> {
        let limit = limit
            .unwrap_or(self.config.verify_default_limit)
            .clamp(1, self.config.verify_max_limit);
        let everything = ActivityFilters::default();

        let mut walker = ChainWalker::new();
        let mut cursor = None;
        let mut remaining = limit;

        while remaining > 0 {
            let page_size = remaining.min(self.config.verify_page_size);
            let page = self.store.after(cursor, &everything, page_size).await?;
            if page.is_empty() {
                break;
            }

            for event in &page {
                if let Some(divergence) = walker.check(event)? {
                    log_divergence(event, &divergence);
                    metrics::counter!("activity_verify_runs_total", "result" => "broken")
                        .increment(1);
                    return Ok(VerifyReport {
                        ok: false,
                        checked: walker.checked(),
                        broken_at: Some(event.id),
                    });
                }
            }

            remaining -= page.len() as i64;
            cursor = page.last().map(ActivityEvent::cursor);
            if (page.len() as i64) < page_size {
                break;
            }

            // 大表校验时让出执行权
            tokio::task::yield_now().await;
        }

        metrics::counter!("activity_verify_runs_total", "result" => "ok").increment(1);
        tracing::info!(checked = walker.checked(), "Activity chain verified");

        Ok(VerifyReport {
            ok: true,
            checked: walker.checked(),
            broken_at: None,
        })
    }
}

/// 脱敏并规整数字，写入与哈希使用同一份结果
fn sanitize_json(value: Option<&Value>) -> Value {
    match value {
        Some(value) => normalize_numbers(redact(value)),
        None => json!({}),
    }
}

fn log_divergence(event: &ActivityEvent, divergence: &Divergence) {
    match divergence {
        Divergence::SelfHash { expected, stored } => tracing::warn!(
            id = event.id,
            expected = %expected,
            stored = %stored,
            "Activity chain divergence: payload hash mismatch"
        ),
        Divergence::Linkage { expected, stored } => tracing::warn!(
            id = event.id,
            expected = ?expected,
            stored = ?stored,
            "Activity chain divergence: broken linkage"
        ),
    }
}
