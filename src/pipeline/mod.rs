/// 采集 / 渲染 / 发送流水线
/// Capture → {frame store → render, uplink → transport}; transport → ingestion → detection store
///
/// 线程模型 (std::thread::scope):
/// - Capture: 固定周期采集, 发布到帧缓冲并上传
/// - Render:  服务传输层, 合成最新帧与检测框
/// - Sender:  仅 queued 模式, 清空发送队列
pub mod capture;
pub mod render;
pub mod uplink;

pub use capture::capture_once;
pub use render::render_once;
pub use uplink::{send_frame, FrameQueue, PushOutcome, SendOutcome};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, info, trace, warn};

use crate::config::{PipelineConfig, SendMode};
use crate::detection::{hexdump, DetectionStore, IngestOutcome, Ingestor};
use crate::device::{Display, Sensor};
use crate::frame::FrameStore;
use crate::lifecycle::TaskControl;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::transport::{MessageHandler, MessageKind, Transport};

/// 顶层上下文: 所有跨任务共享状态都在这里, 按引用传给各任务
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub frames: FrameStore,
    pub detections: Arc<DetectionStore>,
    pub stats: Arc<PipelineStats>,
    pub queue: Option<FrameQueue>,
    pub capture: TaskControl,
    pub render: TaskControl,
    pub sender: TaskControl,
    stop: AtomicBool,
    /// 链路状态, 由传输层的连接事件维护; 采集线程只读这个标志, 不碰传输层锁
    link: Arc<AtomicBool>,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig) -> Self {
        let frames = FrameStore::new(config.frame_discipline, config.geometry());
        let queue = match config.send_mode {
            SendMode::Inline => None,
            SendMode::Queued => Some(FrameQueue::new(config.queue_depth)),
        };
        Self {
            frames,
            detections: Arc::new(DetectionStore::new(config.detection_capacity)),
            stats: Arc::new(PipelineStats::new()),
            queue,
            capture: TaskControl::new("capture"),
            render: TaskControl::new("render"),
            sender: TaskControl::new("sender"),
            stop: AtomicBool::new(false),
            link: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// 请求所有任务在下一个循环边界退出
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        for task in self.tasks() {
            task.request_stop();
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// 最近一次连接事件是否为 Connected
    pub fn link_up(&self) -> bool {
        self.link.load(Ordering::Acquire)
    }

    fn tasks(&self) -> [&TaskControl; 3] {
        [&self.capture, &self.render, &self.sender]
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 入站消息回调: 文本消息进入检测接入, 其余只记录日志
pub fn ingestion_handler(ctx: &PipelineContext) -> MessageHandler {
    let mut ingestor = Ingestor::new(&ctx.config);
    let detections = ctx.detections.clone();
    let stats = ctx.stats.clone();
    let link = ctx.link.clone();

    Box::new(move |kind, payload| match kind {
        MessageKind::Text => match ingestor.ingest(payload, &detections) {
            Ok(IngestOutcome::Updated(n)) => {
                PipelineStats::bump(&stats.messages_ingested);
                debug!("overlays updated: {n} detections");
            }
            Ok(IngestOutcome::Cleared(reason)) => {
                PipelineStats::bump(&stats.messages_ingested);
                PipelineStats::bump(&stats.overlays_cleared);
                debug!("overlays cleared ({reason:?})");
            }
            Err(e) => {
                PipelineStats::bump(&stats.messages_rejected);
                warn!("detection message rejected: {e}");
                debug!("payload ({} bytes):{}", payload.len(), hexdump(payload));
            }
        },
        MessageKind::Connected => {
            link.store(true, Ordering::Release);
            info!("detection server link up");
        }
        MessageKind::Disconnected => {
            link.store(false, Ordering::Release);
            info!("detection server link down, streaming paused");
        }
        MessageKind::Binary => trace!("ignoring {} byte binary message", payload.len()),
    })
}

/// 运行流水线直到 request_stop(); 返回最终统计
pub fn run<S, D, T>(ctx: &PipelineContext, sensor: S, display: D, mut transport: T) -> StatsSnapshot
where
    S: Sensor,
    D: Display,
    T: Transport,
{
    // 新的传输层在第一次 Connected 事件之前视为断开
    ctx.link.store(false, Ordering::Release);
    transport.set_handler(ingestion_handler(ctx));
    let transport = Mutex::new(transport);

    let mut tasks = vec![&ctx.capture, &ctx.render];
    if ctx.queue.is_some() {
        tasks.push(&ctx.sender);
    }
    if let Some(failed) = tasks.iter().position(|task| !task.start()) {
        // 回滚本次已启动的任务, 其余任务的状态不动
        for task in &tasks[..failed] {
            task.mark_stopped();
        }
        warn!("pipeline is already running");
        return ctx.stats.snapshot();
    }
    // 启动前已经收到停止请求
    if ctx.stop_requested() {
        ctx.request_stop();
    }
    if !ctx.frames.is_enabled() {
        warn!("local preview disabled, streaming only");
    }

    thread::scope(|s| {
        let transport = &transport;
        s.spawn(move || capture::capture_task(ctx, sensor, transport));
        s.spawn(move || render::render_task(ctx, display, transport));
        if let Some(queue) = &ctx.queue {
            s.spawn(move || uplink::sender_task(ctx, queue, transport));
        }
    });

    info!("✅ all tasks joined");
    ctx.stats.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TaskState;

    #[test]
    fn test_context_follows_config() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        assert!(ctx.queue.is_none());
        assert!(ctx.frames.is_enabled());
        assert_eq!(ctx.detections.capacity(), 10);

        let config = PipelineConfig {
            send_mode: SendMode::Queued,
            queue_depth: 3,
            ..PipelineConfig::default()
        };
        let ctx = PipelineContext::new(config);
        assert_eq!(ctx.queue.as_ref().map(FrameQueue::depth), Some(3));
    }

    #[test]
    fn test_handler_routes_text_to_store() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        let mut handler = ingestion_handler(&ctx);

        handler(MessageKind::Connected, &[]);
        handler(MessageKind::Text, br#"{"faces":[{"x":0.5,"y":0.5,"w":0.1,"h":0.1}]}"#);
        assert_eq!(ctx.detections.len(), 1);

        handler(MessageKind::Binary, &[1, 2, 3]);
        handler(MessageKind::Text, b"not json");
        assert_eq!(ctx.detections.len(), 1);

        handler(MessageKind::Text, br#"{"status":"idle"}"#);
        assert!(ctx.detections.is_empty());

        let stats = ctx.stats.snapshot();
        assert_eq!(stats.messages_ingested, 2);
        assert_eq!(stats.messages_rejected, 1);
        assert_eq!(stats.overlays_cleared, 1);
    }

    #[test]
    fn test_stop_requests_reach_running_tasks() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        assert!(ctx.capture.start());
        ctx.request_stop();
        assert!(ctx.stop_requested());
        assert_eq!(ctx.capture.state(), TaskState::StopRequested);
        // 未启动的任务保持 Stopped
        assert_eq!(ctx.render.state(), TaskState::Stopped);
    }

    #[test]
    fn test_connection_events_drive_link_flag() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        let mut handler = ingestion_handler(&ctx);
        assert!(!ctx.link_up());

        handler(MessageKind::Connected, &[]);
        assert!(ctx.link_up());
        handler(MessageKind::Text, b"not json");
        assert!(ctx.link_up());
        handler(MessageKind::Disconnected, &[]);
        assert!(!ctx.link_up());
    }

    #[test]
    fn test_refused_start_rolls_back_started_tasks() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        // 渲染任务仍在运行
        assert!(ctx.render.start());

        let (transport, _peer) = crate::transport::loopback(4);
        let sensor = crate::device::TestPatternSensor::new(ctx.config.geometry());
        let display = crate::device::FramebufferDisplay::new(240, 240);
        run(&ctx, sensor, display, transport);

        assert_eq!(ctx.capture.state(), TaskState::Stopped);
        assert_eq!(ctx.render.state(), TaskState::Running);
        assert_eq!(ctx.stats.snapshot().frames_captured, 0);

        // 回滚后可以正常再启动
        assert!(ctx.capture.start());
    }
}
