//! 活动日志服务主入口

use activity_log::{
    auth::JwtService,
    config::AppConfig,
    db,
    handlers::health,
    middleware::AppState,
    repository::{PgActivityStore, PgSessionStore, SessionStore},
    routes,
    services::ActivityService,
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("activity-log {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 按优先级加载：.env.local > .env.development > .env
    if let Ok(path) = std::env::var("ACTIVITY_ENV") {
        dotenv::from_filename(format!(".env.{}", path)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::from_filename(".env.development").ok();
        dotenv::dotenv().ok();
    }

    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志与指标
    telemetry::init_telemetry(&config.logging);
    telemetry::init_metrics();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Activity log service starting...");

    // 3. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    tracing::info!("Database initialized");

    // 4. 构建应用状态
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let activity_service = Arc::new(ActivityService::new(
        Arc::new(PgActivityStore::new(db_pool.clone())),
        config.activity.clone(),
    ));
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(db_pool.clone()));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        activity_service,
        jwt_service: Arc::new(JwtService::from_config(&config)?),
        sessions: sessions.clone(),
        shutdown: shutdown_rx.clone(),
    });

    // 5. 后台清理过期会话条目
    tokio::spawn(purge_sessions(
        sessions,
        db_pool.clone(),
        Duration::from_secs(config.sessions.purge_interval_secs),
        shutdown_rx,
    ));

    // 6. 构建路由
    let app = routes::create_router(app_state);

    // 7. 启动服务器
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 8. 优雅关闭：通知实时流退出后等待连接排空
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(
            shutdown_tx,
            config.server.graceful_shutdown_timeout_secs,
        ))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 定期清理过期的会话条目，并记录连接池指标
async fn purge_sessions(
    sessions: Arc<dyn SessionStore>,
    pool: sqlx::PgPool,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sessions.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Expired session entries purged"),
                    Err(e) => tracing::warn!(error = %e, "Session purge failed"),
                }
                db::record_pool_metrics(&pool);
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// 优雅关闭信号处理
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>, timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    // 通知所有实时流退出
    let _ = shutdown_tx.send(true);

    // 超时后强制退出
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

/// 打印帮助信息
fn print_help() {
    println!("activity-log {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: activity-log [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 ACTIVITY_ 前缀的环境变量完成");
    println!("  可用选项请参考 .env.example");
}
