//! 网络发送路径
//!
//! - inline: 采集线程直接调用 send_frame()
//! - queued: 采集线程复制进 FrameQueue, 发送线程取出后发送. 队列满时丢弃最旧的一帧.
//!
//! 两种模式下, 断开时都直接丢弃帧 (过期画面不值得缓存).

use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, trace};

use super::{lock, PipelineContext};
use crate::stats::{FpsCounter, PipelineStats};
use crate::transport::Transport;

/// 发送线程等待新帧的最长时间 (期间检查停止标志)
const SENDER_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// 未连接, 没有调用 send_binary
    Discarded,
    Failed,
}

/// 断开时不调用 send_binary, 也不报错
pub fn send_frame<T: Transport + ?Sized>(transport: &mut T, frame: &[u8], stats: &PipelineStats) -> SendOutcome {
    if !transport.is_connected() {
        PipelineStats::bump(&stats.sends_discarded);
        trace!("not connected, frame discarded");
        return SendOutcome::Discarded;
    }
    match transport.send_binary(frame) {
        Ok(()) => {
            PipelineStats::bump(&stats.frames_sent);
            SendOutcome::Sent
        }
        Err(e) => {
            PipelineStats::bump(&stats.send_failures);
            debug!("frame send failed: {e}");
            SendOutcome::Failed
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// 队列已满, 最旧的一帧被丢弃
    DroppedOldest,
}

/// 有界发送队列. 已发送的缓冲通过回收通道复用, 稳态下入队不分配内存.
pub struct FrameQueue {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    recycle_tx: Sender<Vec<u8>>,
    recycle_rx: Receiver<Vec<u8>>,
    depth: usize,
}

impl FrameQueue {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        let (tx, rx) = bounded(depth);
        // 队列中 + 发送中 + 回收中
        let (recycle_tx, recycle_rx) = bounded(depth + 2);
        Self {
            tx,
            rx,
            recycle_tx,
            recycle_rx,
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// 复制一帧入队, 永不阻塞
    pub fn push(&self, frame: &[u8]) -> PushOutcome {
        let mut buf = self.recycle_rx.try_recv().unwrap_or_default();
        buf.clear();
        buf.extend_from_slice(frame);

        let mut outcome = PushOutcome::Queued;
        loop {
            match self.tx.try_send(buf) {
                Ok(()) => return outcome,
                Err(TrySendError::Full(back)) => {
                    buf = back;
                    if let Ok(oldest) = self.rx.try_recv() {
                        self.recycle(oldest);
                        outcome = PushOutcome::DroppedOldest;
                    }
                }
                // 自身持有接收端, 不会断开
                Err(TrySendError::Disconnected(_)) => return outcome,
            }
        }
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// 归还缓冲; 回收通道满时直接释放
    pub fn recycle(&self, buf: Vec<u8>) {
        let _ = self.recycle_tx.try_send(buf);
    }
}

/// 发送线程: 只在 queued 模式下运行
pub fn sender_task<T: Transport>(ctx: &PipelineContext, queue: &FrameQueue, transport: &Mutex<T>) {
    info!("✅ sender task started (queue depth {})", queue.depth());
    let mut fps = FpsCounter::new();

    while ctx.sender.should_run() {
        let Some(frame) = queue.pop_timeout(SENDER_POLL) else {
            continue;
        };
        let outcome = send_frame(&mut *lock(transport), &frame, &ctx.stats);
        queue.recycle(frame);
        if outcome == SendOutcome::Sent {
            if let Some(rate) = fps.tick() {
                info!("📡 uplink: {rate:.1} fps");
            }
        }
    }

    ctx.sender.mark_stopped();
    info!("✅ sender task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::MessageHandler;

    /// 记录调用次数的假传输层
    #[derive(Default)]
    struct CountingTransport {
        connected: bool,
        fail: bool,
        sends: usize,
    }

    impl Transport for CountingTransport {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send_binary(&mut self, _payload: &[u8]) -> Result<(), TransportError> {
            self.sends += 1;
            if self.fail {
                return Err(TransportError::NotConnected);
            }
            Ok(())
        }

        fn service(&mut self) {}

        fn set_handler(&mut self, _handler: MessageHandler) {}
    }

    #[test]
    fn test_disconnected_send_is_noop() {
        let stats = PipelineStats::new();
        let mut transport = CountingTransport::default();
        for _ in 0..5 {
            assert_eq!(send_frame(&mut transport, &[0; 16], &stats), SendOutcome::Discarded);
        }
        assert_eq!(transport.sends, 0);
        assert_eq!(stats.snapshot().sends_discarded, 5);
    }

    #[test]
    fn test_connected_send_and_failure() {
        let stats = PipelineStats::new();
        let mut transport = CountingTransport {
            connected: true,
            ..Default::default()
        };
        assert_eq!(send_frame(&mut transport, &[0; 16], &stats), SendOutcome::Sent);
        transport.fail = true;
        assert_eq!(send_frame(&mut transport, &[0; 16], &stats), SendOutcome::Failed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sent, 1);
        assert_eq!(snapshot.send_failures, 1);
        assert_eq!(transport.sends, 2);
    }

    #[test]
    fn test_queue_drops_oldest() {
        let queue = FrameQueue::new(2);
        assert_eq!(queue.push(&[1]), PushOutcome::Queued);
        assert_eq!(queue.push(&[2]), PushOutcome::Queued);
        assert_eq!(queue.push(&[3]), PushOutcome::DroppedOldest);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(vec![2]));
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(vec![3]));
        assert!(queue.pop_timeout(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn test_queue_reuses_buffers() {
        let queue = FrameQueue::new(1);
        queue.push(&[0u8; 1024]);
        let frame = queue.pop_timeout(Duration::ZERO).unwrap();
        let ptr = frame.as_ptr();
        queue.recycle(frame);

        queue.push(&[7u8; 512]);
        let frame = queue.pop_timeout(Duration::ZERO).unwrap();
        assert_eq!(frame.as_ptr(), ptr);
        assert_eq!(frame, vec![7u8; 512]);
    }
}
