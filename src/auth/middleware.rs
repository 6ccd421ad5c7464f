//! JWT 认证中间件
//! 请求头令牌、实时流查询参数令牌与管理员权限检查

use crate::{auth::revocation, error::AppError, middleware::AppState};
use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

/// 认证上下文（附加到请求扩展）
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
    /// 令牌 ID（jti），用于吊销
    pub token_id: String,
    /// 令牌过期时间（unix 秒）
    pub expires_at: i64,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// 主角色：优先取管理员角色，其次取第一个角色
    pub fn primary_role(&self, admin_role: &str) -> Option<String> {
        if self.has_role(admin_role) {
            return Some(admin_role.to_string());
        }
        self.roles.first().cloned()
    }
}

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 从 Authorization 头提取令牌
pub fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(AppError::Unauthorized)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// 从查询参数 `token` 提取令牌（SSE 客户端无法设置自定义请求头）
pub fn extract_query_token(uri: &Uri) -> Result<String, AppError> {
    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|s| !s.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// 校验令牌并构建认证上下文；两种令牌来源共用同一套校验
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthContext, AppError> {
    let claims = state.jwt_service.validate_access_token(token)?;

    if revocation::is_revoked(state.sessions.as_ref(), &claims.jti).await? {
        tracing::debug!(jti = %claims.jti, "Rejected revoked token");
        return Err(AppError::Unauthorized);
    }

    Ok(AuthContext {
        user_id: claims.sub,
        username: claims.username,
        roles: claims.roles,
        token_id: claims.jti,
        expires_at: claims.exp,
    })
}

/// JWT 认证中间件 - 令牌来自 Authorization 头
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())?;
    let auth_context = authenticate(&state, &token).await?;

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

/// 实时流认证中间件 - 优先使用 Authorization 头，否则使用 `token` 查询参数
pub async fn stream_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = match extract_token(req.headers()) {
        Ok(token) => token,
        Err(_) => extract_query_token(req.uri())?,
    };
    let auth_context = authenticate(&state, &token).await?;

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

/// 管理员权限检查，需在认证中间件之后执行
pub async fn require_admin_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_context = req
        .extensions()
        .get::<AuthContext>()
        .ok_or(AppError::Unauthorized)?;

    if !auth_context.has_role(&state.config.security.admin_role) {
        tracing::warn!(
            user_id = %auth_context.user_id,
            roles = ?auth_context.roles,
            "Admin role required"
        );
        return Err(AppError::Forbidden);
    }

    Ok(next.run(req).await)
}
