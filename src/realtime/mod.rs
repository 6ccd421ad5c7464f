//! Real-time activity tail
//! 单订阅者轮询循环，以 SSE 帧推送连接建立后新追加的记录

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::{
    config::ActivityConfig,
    error::AppError,
    models::activity::{ActivityEvent, ActivityFilters, Cursor},
    repository::ActivityStore,
};

/// SSE 注释帧，用于保持代理连接
pub const HEARTBEAT_FRAME: &str = ": keep-alive\n\n";

/// 单条记录的 SSE 帧
pub fn event_frame(event: &ActivityEvent) -> Result<String, AppError> {
    let data = serde_json::to_string(event)?;
    Ok(format!("id: {}\nevent: activity\ndata: {}\n\n", event.id, data))
}

/// Stream timing, taken from [`ActivityConfig`].
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub batch_limit: i64,
}

impl From<&ActivityConfig> for StreamSettings {
    fn from(config: &ActivityConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.stream_poll_interval_ms),
            heartbeat_interval: Duration::from_secs(config.stream_heartbeat_secs),
            batch_limit: config.query_max_limit,
        }
    }
}

/// Live tail of one subscriber.
///
/// The cursor is taken from the store when the stream opens, so only records
/// appended afterwards are delivered. Polling and heartbeats run in a single
/// task that exits when the subscriber goes away or the server shuts down.
pub struct ChangeStream {
    store: Arc<dyn ActivityStore>,
    filters: ActivityFilters,
    settings: StreamSettings,
    shutdown: watch::Receiver<bool>,
}

impl ChangeStream {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        filters: ActivityFilters,
        settings: StreamSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            filters: filters.normalized(),
            settings,
            shutdown,
        }
    }

    /// 打开流：读取当前链尾位置并启动轮询任务
    pub async fn open(
        self,
    ) -> Result<impl futures::Stream<Item = Result<String, std::convert::Infallible>>, AppError>
    {
        let cursor = self.store.latest_cursor().await?;
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(self.run(cursor, tx));

        Ok(tokio_stream::wrappers::ReceiverStream::new(rx))
    }

    async fn run(
        self,
        mut cursor: Option<Cursor>,
        tx: mpsc::Sender<Result<String, std::convert::Infallible>>,
    ) {
        let ChangeStream {
            store,
            filters,
            settings,
            mut shutdown,
        } = self;

        let mut poll = tokio::time::interval(settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let start = tokio::time::Instant::now() + settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(start, settings.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(cursor = ?cursor, "Activity stream opened");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = tx.closed() => break,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if tx.send(Ok(HEARTBEAT_FRAME.to_string())).await.is_err() {
                        break;
                    }
                }
                _ = poll.tick() => {
                    match deliver(store.as_ref(), &filters, settings.batch_limit, &mut cursor, &tx).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        // 尽力而为：记录错误，下个周期重试
                        Err(e) => tracing::warn!(error = %e, "Activity stream poll failed"),
                    }
                }
            }
        }

        tracing::debug!("Activity stream closed");
    }
}

/// 推送游标之后的新记录；订阅方断开时返回 false
async fn deliver(
    store: &dyn ActivityStore,
    filters: &ActivityFilters,
    batch_limit: i64,
    cursor: &mut Option<Cursor>,
    tx: &mpsc::Sender<Result<String, std::convert::Infallible>>,
) -> Result<bool, AppError> {
    let batch = store.after(*cursor, filters, batch_limit).await?;

    for event in &batch {
        let frame = event_frame(event)?;
        if tx.send(Ok(frame)).await.is_err() {
            return Ok(false);
        }
        metrics::counter!("activity_stream_frames_total").increment(1);
        *cursor = Some(event.cursor());
    }

    Ok(true)
}
