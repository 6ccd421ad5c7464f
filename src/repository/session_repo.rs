//! Session repository (会话/令牌状态存储)
//!
//! 带 TTL 的键值存储，替代进程内的全局令牌状态，多实例部署时共享

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::AppError;

/// Narrow key-value interface for ephemeral auth state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), AppError>;

    /// Live value for `key`; expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, AppError>;
}

pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO session_entries (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(Utc::now() + ttl)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let value: Option<Value> = sqlx::query_scalar(
            "SELECT value FROM session_entries WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        Ok(value)
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM session_entries WHERE expires_at <= now()")
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Single-process session store backed by a concurrent map.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, (Value, DateTime<Utc>)>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), AppError> {
        self.entries.insert(key.to_string(), (value, Utc::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let now = Utc::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone()))
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.1 > now);
        Ok((before - self.entries.len()) as u64)
    }
}
