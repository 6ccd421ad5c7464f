//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:3000"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// JWT 密钥（使用 Secret 包装，防止日志泄露）
    pub jwt_secret: Secret<String>,
    /// 访问令牌过期时间（秒），仅用于签发测试/运维令牌
    pub access_token_exp_secs: u64,
    /// 具备管理员权限的角色名
    pub admin_role: String,
    /// 是否信任 X-Forwarded-For 头
    pub trust_proxy: bool,
    /// IP 白名单（可选）
    pub allowed_ips: Option<Vec<String>>,
}

/// 活动日志的查询、校验与实时流参数
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    /// 查询默认返回条数
    pub query_default_limit: i64,
    /// 查询最大返回条数（无论调用方请求多少）
    pub query_max_limit: i64,
    /// 链校验默认检查条数
    pub verify_default_limit: i64,
    /// 链校验最大检查条数
    pub verify_max_limit: i64,
    /// 链校验每页读取条数
    pub verify_page_size: i64,
    /// 实时流轮询间隔（毫秒）
    pub stream_poll_interval_ms: u64,
    /// 实时流心跳间隔（秒）
    pub stream_heartbeat_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            query_default_limit: 100,
            query_max_limit: 500,
            verify_default_limit: 10_000,
            verify_max_limit: 1_000_000,
            verify_page_size: 1_000,
            stream_poll_interval_ms: 2_000,
            stream_heartbeat_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 过期会话条目清理间隔（秒）
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub activity: ActivityConfig,
    pub sessions: SessionConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:3000")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("security.jwt_secret", "change-this-secret-in-production-min-32-chars!")?
            .set_default("security.access_token_exp_secs", 900)?
            .set_default("security.admin_role", "admin")?
            .set_default("security.trust_proxy", true)?
            .set_default("activity.query_default_limit", 100)?
            .set_default("activity.query_max_limit", 500)?
            .set_default("activity.verify_default_limit", 10_000)?
            .set_default("activity.verify_max_limit", 1_000_000)?
            .set_default("activity.verify_page_size", 1_000)?
            .set_default("activity.stream_poll_interval_ms", 2_000)?
            .set_default("activity.stream_heartbeat_secs", 10)?
            .set_default("sessions.purge_interval_secs", 300)?;

        // 从环境变量加载配置（前缀为 ACTIVITY_）
        settings = settings.add_source(
            Environment::with_prefix("ACTIVITY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("security.allowed_ips"),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证端口范围
        if let Some(port_str) = self.server.addr.split(':').next_back() {
            if let Ok(port) = port_str.parse::<u16>() {
                if port != 0 && port < 1024 {
                    return Err(ConfigError::Message("Server port should be >= 1024".to_string()));
                }
            }
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 验证 JWT 密钥长度（至少 32 字符）
        if self.security.jwt_secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.security.admin_role.trim().is_empty() {
            return Err(ConfigError::Message("admin_role must not be empty".to_string()));
        }

        // 验证活动日志限额
        let activity = &self.activity;
        if activity.query_max_limit < 1
            || activity.query_default_limit < 1
            || activity.query_default_limit > activity.query_max_limit
        {
            return Err(ConfigError::Message(
                "query_default_limit must be between 1 and query_max_limit".to_string(),
            ));
        }

        if activity.verify_max_limit < 1
            || activity.verify_default_limit < 1
            || activity.verify_default_limit > activity.verify_max_limit
        {
            return Err(ConfigError::Message(
                "verify_default_limit must be between 1 and verify_max_limit".to_string(),
            ));
        }

        if activity.verify_page_size < 1 {
            return Err(ConfigError::Message("verify_page_size must be >= 1".to_string()));
        }

        if activity.stream_poll_interval_ms == 0 || activity.stream_heartbeat_secs == 0 {
            return Err(ConfigError::Message(
                "stream intervals must be greater than zero".to_string(),
            ));
        }

        if self.sessions.purge_interval_secs == 0 {
            return Err(ConfigError::Message(
                "purge_interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
