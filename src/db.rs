//! PostgreSQL 连接池、嵌入式迁移与存储健康检查

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// 连接上报给 PostgreSQL 的应用名（pg_stat_activity 中可见）
const APPLICATION_NAME: &str = "activity-log";

/// 创建数据库连接池
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let options = PgConnectOptions::from_str(config.url.expose_secret())
        .map_err(|e| DbError::ConnectionFailed(format!("invalid database url: {}", e)))?
        .application_name(APPLICATION_NAME);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect_with(options)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to activity database");
            DbError::ConnectionFailed(e.to_string())
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Activity database pool ready"
    );

    Ok(pool)
}

/// 执行嵌入的迁移（activity_events、session_entries）
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    let migrator = sqlx::migrate!("./migrations");

    migrator.run(pool).await.map_err(|e| {
        tracing::error!(error = %e, "Migration failed");
        DbError::MigrationFailed(e.to_string())
    })?;

    tracing::info!(known = migrator.iter().count(), "Migrations applied");
    Ok(())
}

/// 存储健康检查：活动表必须可读
pub async fn health_check(pool: &PgPool) -> HealthStatus {
    let started = Instant::now();

    match sqlx::query("SELECT 1 FROM activity_events LIMIT 1")
        .fetch_optional(pool)
        .await
    {
        Ok(_) => {
            tracing::debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Activity store reachable"
            );
            HealthStatus::Healthy
        }
        Err(e) => {
            tracing::warn!(error = %e, "Activity store health check failed");
            HealthStatus::Unhealthy("activity store unavailable".to_string())
        }
    }
}

/// 连接池使用情况
pub fn record_pool_metrics(pool: &PgPool) {
    metrics::gauge!("activity_db_pool_connections").set(pool.size() as f64);
    metrics::gauge!("activity_db_pool_idle").set(pool.num_idle() as f64);
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// 附带可公开的原因，不含连接串等细节
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}
