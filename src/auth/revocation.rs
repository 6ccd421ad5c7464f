//! 访问令牌吊销（基于会话存储）

use chrono::{Duration, Utc};
use serde_json::json;

use crate::{error::AppError, repository::SessionStore};

fn revocation_key(jti: &str) -> String {
    format!("revoked:{}", jti)
}

/// 吊销令牌直至其自身过期，过期后令牌本就会被拒绝
pub async fn revoke(store: &dyn SessionStore, jti: &str, expires_at: i64) -> Result<(), AppError> {
    let remaining = expires_at - Utc::now().timestamp();
    if remaining <= 0 {
        return Ok(());
    }

    store
        .put(
            &revocation_key(jti),
            json!({ "revoked_at": Utc::now().to_rfc3339() }),
            Duration::seconds(remaining),
        )
        .await
}

pub async fn is_revoked(store: &dyn SessionStore, jti: &str) -> Result<bool, AppError> {
    Ok(store.get(&revocation_key(jti)).await?.is_some())
}
