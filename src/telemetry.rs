//! 日志与追踪系统
//! 初始化结构化日志和指标收集

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 初始化日志与追踪系统
pub fn init_telemetry(config: &LoggingConfig) {
    // RUST_LOG 优先，其次使用配置中的级别
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let log_layer = match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
            .boxed(),
        "pretty" => tracing_subscriber::fmt::layer().pretty().with_target(false).boxed(),
        _ => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(log_layer)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        "Telemetry initialized"
    );
}

/// 预先登记活动日志相关指标的描述
pub fn init_metrics() {
    metrics::describe_counter!(
        "activity_events_recorded_total",
        "Activity events appended to the hash chain"
    );
    metrics::describe_counter!(
        "activity_record_failures_total",
        "Activity events that could not be recorded"
    );
    metrics::describe_counter!(
        "activity_verify_runs_total",
        "Chain verification runs, labelled by result"
    );
    metrics::describe_counter!(
        "activity_stream_frames_total",
        "Event frames delivered to live-tail subscribers"
    );
    metrics::describe_counter!("http_requests_total", "HTTP requests served");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request latency"
    );

    tracing::debug!("Metrics initialized");
}
