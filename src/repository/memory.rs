//! 进程内活动存储（测试与无数据库的本地运行）

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    db::HealthStatus,
    error::AppError,
    models::activity::{ActivityEvent, ActivityFilters, Cursor, NewActivity},
    repository::activity_repo::ActivityStore,
};

#[derive(Default)]
struct Inner {
    rows: Vec<ActivityEvent>,
    next_id: i64,
}

/// 行按 `(at, id)` 顺序保存：id 逐一递增，`at` 不回退（即使系统时钟回拨）
#[derive(Default)]
pub struct MemoryActivityStore {
    inner: Mutex<Inner>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 绕过只追加接口直接改写已存储的行
    #[cfg(test)]
    pub(crate) async fn tamper<F: FnOnce(&mut ActivityEvent)>(&self, id: i64, f: F) {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) {
            f(row);
        }
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn append(&self, record: &NewActivity) -> Result<ActivityEvent, AppError> {
        // 读取链尾与写入在同一把锁内完成
        let mut inner = self.inner.lock().await;

        let last = inner.rows.last();
        let hash_prev = last.map(|r| r.hash_self.clone());
        let now = Utc::now();
        let at = match last {
            Some(r) if r.at > now => r.at,
            _ => now,
        };

        inner.next_id += 1;
        let p = record.payload.clone();
        let event = ActivityEvent {
            id: inner.next_id,
            at,
            request_id: p.request_id,
            actor_id: p.actor_id,
            actor_role: p.actor_role,
            action: p.action,
            subject_type: p.subject_type,
            subject_id: p.subject_id,
            target_type: p.target_type,
            target_id: p.target_id,
            severity: p.severity,
            ip: p.ip,
            user_agent: p.user_agent,
            meta: p.meta,
            diff: p.diff,
            hash_prev,
            hash_self: record.hash_self.clone(),
        };

        inner.rows.push(event.clone());
        Ok(event)
    }

    async fn query(
        &self,
        filters: &ActivityFilters,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .iter()
            .rev()
            .filter(|r| filters.matches(r))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn after(
        &self,
        cursor: Option<Cursor>,
        filters: &ActivityFilters,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .iter()
            .filter(|r| cursor.map_or(true, |c| r.cursor() > c))
            .filter(|r| filters.matches(r))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn latest_cursor(&self) -> Result<Option<Cursor>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.rows.last().map(ActivityEvent::cursor))
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}
