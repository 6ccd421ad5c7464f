//! Activity repository (活动日志数据访问)

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    db::{self, HealthStatus},
    error::AppError,
    models::activity::{ActivityEvent, ActivityFilters, Cursor, NewActivity},
};

/// 事务级 advisory lock 的键，串行化所有追加写
const APPEND_LOCK_KEY: i64 = 0x0061_6374_6976_6974;

/// Durable, ordered, append-only storage for activity records.
///
/// Implementations never update or delete rows. `append` must read the last
/// `hash_self` and insert the new row as one atomic step with respect to all
/// other appenders.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Link `record` to the current tail and insert it. The store assigns
    /// `id` and `at`.
    async fn append(&self, record: &NewActivity) -> Result<ActivityEvent, AppError>;

    /// Filtered records, newest first.
    async fn query(&self, filters: &ActivityFilters, limit: i64)
        -> Result<Vec<ActivityEvent>, AppError>;

    /// Filtered records strictly after `cursor` (from the beginning when
    /// `None`), oldest first.
    async fn after(
        &self,
        cursor: Option<Cursor>,
        filters: &ActivityFilters,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>, AppError>;

    /// Position of the newest record, if any.
    async fn latest_cursor(&self) -> Result<Option<Cursor>, AppError>;

    async fn health_check(&self) -> HealthStatus;
}

pub struct PgActivityStore {
    db: PgPool,
}

impl PgActivityStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &ActivityFilters) {
    if let Some(subject_type) = &filters.subject_type {
        qb.push(" AND subject_type = ").push_bind(subject_type.clone());
    }
    if let Some(subject_id) = &filters.subject_id {
        qb.push(" AND subject_id = ").push_bind(subject_id.clone());
    }
    if let Some(action) = &filters.action {
        qb.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(actor_id) = &filters.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor_id.clone());
    }
    if let Some(from) = filters.from {
        qb.push(" AND at >= ").push_bind(from);
    }
    if let Some(to) = filters.to {
        qb.push(" AND at <= ").push_bind(to);
    }
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn append(&self, record: &NewActivity) -> Result<ActivityEvent, AppError> {
        let mut tx = self.db.begin().await?;

        // 锁在事务提交/回滚时自动释放
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let hash_prev: Option<String> = sqlx::query_scalar(
            "SELECT hash_self FROM activity_events ORDER BY at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let p = &record.payload;
        // at 由 clock_timestamp() 在持锁后赋值，保证 (at, id) 顺序与链顺序一致
        let event = sqlx::query_as::<_, ActivityEvent>(
            r#"
            INSERT INTO activity_events (
                request_id, actor_id, actor_role, action, subject_type, subject_id,
                target_type, target_id, severity, ip, user_agent, meta, diff,
                hash_prev, hash_self
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(&p.request_id)
        .bind(&p.actor_id)
        .bind(&p.actor_role)
        .bind(&p.action)
        .bind(&p.subject_type)
        .bind(&p.subject_id)
        .bind(&p.target_type)
        .bind(&p.target_id)
        .bind(p.severity)
        .bind(&p.ip)
        .bind(&p.user_agent)
        .bind(&p.meta)
        .bind(&p.diff)
        .bind(&hash_prev)
        .bind(&record.hash_self)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(event)
    }

    async fn query(
        &self,
        filters: &ActivityFilters,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM activity_events WHERE 1=1");
        push_filters(&mut qb, filters);
        qb.push(" ORDER BY at DESC, id DESC LIMIT ").push_bind(limit);

        let events = qb.build_query_as::<ActivityEvent>().fetch_all(&self.db).await?;
        Ok(events)
    }

    async fn after(
        &self,
        cursor: Option<Cursor>,
        filters: &ActivityFilters,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM activity_events WHERE 1=1");
        if let Some(cursor) = cursor {
            qb.push(" AND (at, id) > (")
                .push_bind(cursor.at)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }
        push_filters(&mut qb, filters);
        qb.push(" ORDER BY at ASC, id ASC LIMIT ").push_bind(limit);

        let events = qb.build_query_as::<ActivityEvent>().fetch_all(&self.db).await?;
        Ok(events)
    }

    async fn latest_cursor(&self) -> Result<Option<Cursor>, AppError> {
        let row: Option<(chrono::DateTime<chrono::Utc>, i64)> = sqlx::query_as(
            "SELECT at, id FROM activity_events ORDER BY at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(at, id)| Cursor { at, id }))
    }

    async fn health_check(&self) -> HealthStatus {
        db::record_pool_metrics(&self.db);
        db::health_check(&self.db).await
    }
}
