//! 防篡改活动日志服务
//! 哈希链记录、过滤查询、实时推送与链完整性校验

pub mod activity;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
