//! 运行统计
//! Frame-rate counters and shared pipeline counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// 每秒帧率统计 (每个任务各自持有)
pub struct FpsCounter {
    count: u64,
    last: Instant,
    current_fps: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }

    /// 记录一帧; 满一秒时返回本秒的帧率
    pub fn tick(&mut self) -> Option<f64> {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.count as f64 / elapsed;
            self.last = Instant::now();
            self.count = 0;
            return Some(self.current_fps);
        }
        None
    }

    pub fn fps(&self) -> f64 {
        self.current_fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// 跨任务共享计数器
#[derive(Default)]
pub struct PipelineStats {
    pub frames_captured: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub frames_published: AtomicU64,
    pub frames_busy: AtomicU64,
    pub frames_rendered: AtomicU64,
    pub frames_sent: AtomicU64,
    pub sends_discarded: AtomicU64,
    pub sends_busy: AtomicU64,
    pub send_failures: AtomicU64,
    pub queue_dropped: AtomicU64,
    pub messages_ingested: AtomicU64,
    pub messages_rejected: AtomicU64,
    pub overlays_cleared: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_captured: load(&self.frames_captured),
            frames_skipped: load(&self.frames_skipped),
            frames_published: load(&self.frames_published),
            frames_busy: load(&self.frames_busy),
            frames_rendered: load(&self.frames_rendered),
            frames_sent: load(&self.frames_sent),
            sends_discarded: load(&self.sends_discarded),
            sends_busy: load(&self.sends_busy),
            send_failures: load(&self.send_failures),
            queue_dropped: load(&self.queue_dropped),
            messages_ingested: load(&self.messages_ingested),
            messages_rejected: load(&self.messages_rejected),
            overlays_cleared: load(&self.overlays_cleared),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_skipped: u64,
    pub frames_published: u64,
    pub frames_busy: u64,
    pub frames_rendered: u64,
    pub frames_sent: u64,
    pub sends_discarded: u64,
    /// 传输层正忙 (inline 模式), 本帧未上传
    pub sends_busy: u64,
    pub send_failures: u64,
    pub queue_dropped: u64,
    pub messages_ingested: u64,
    pub messages_rejected: u64,
    pub overlays_cleared: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_counter_waits_a_second() {
        let mut fps = FpsCounter::new();
        assert!(fps.tick().is_none());
        assert_eq!(fps.fps(), 0.0);
    }

    #[test]
    fn test_snapshot_reads_counters() {
        let stats = PipelineStats::new();
        PipelineStats::bump(&stats.frames_captured);
        PipelineStats::bump(&stats.frames_captured);
        PipelineStats::bump(&stats.sends_discarded);
        let snap = stats.snapshot();
        assert_eq!(snap.frames_captured, 2);
        assert_eq!(snap.sends_discarded, 1);
        assert_eq!(snap.frames_sent, 0);
    }
}
