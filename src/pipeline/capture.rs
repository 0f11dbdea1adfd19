//! 采集任务
//! Fixed-period capture: acquire → publish to the frame store → uplink → release

use std::sync::{Mutex, TryLockError};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, trace};

use super::uplink::{send_frame, PushOutcome};
use super::PipelineContext;
use crate::device::Sensor;
use crate::frame::PublishOutcome;
use crate::stats::{FpsCounter, PipelineStats};
use crate::transport::Transport;

/// 单个采集周期. 传感器没有就绪帧时返回 false.
pub fn capture_once<S, T>(ctx: &PipelineContext, sensor: &mut S, transport: &Mutex<T>) -> bool
where
    S: Sensor + ?Sized,
    T: Transport,
{
    let Some(frame) = sensor.acquire() else {
        PipelineStats::bump(&ctx.stats.frames_skipped);
        trace!("no frame ready");
        return false;
    };
    PipelineStats::bump(&ctx.stats.frames_captured);
    let pixels = sensor.data(&frame);

    match ctx.frames.publish(pixels) {
        PublishOutcome::Published { len, truncated } => {
            PipelineStats::bump(&ctx.stats.frames_published);
            if truncated {
                debug!("frame clipped to {len} bytes");
            }
        }
        PublishOutcome::Busy => {
            PipelineStats::bump(&ctx.stats.frames_busy);
            trace!("renderer holds the write slot, preview skipped");
        }
        PublishOutcome::Disabled | PublishOutcome::Empty => {}
    }

    // 采集线程从不等待传输层锁: 链路断开或锁被占用时本帧只做本地预览
    if !ctx.link_up() {
        PipelineStats::bump(&ctx.stats.sends_discarded);
    } else if let Some(queue) = &ctx.queue {
        if queue.push(pixels) == PushOutcome::DroppedOldest {
            PipelineStats::bump(&ctx.stats.queue_dropped);
        }
    } else {
        match transport.try_lock() {
            Ok(mut transport) => {
                send_frame(&mut *transport, pixels, &ctx.stats);
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                send_frame(&mut *poisoned.into_inner(), pixels, &ctx.stats);
            }
            Err(TryLockError::WouldBlock) => {
                PipelineStats::bump(&ctx.stats.sends_busy);
                trace!("transport busy, frame not sent");
            }
        }
    }

    // 帧存储和上传都已完成复制, 归还给传感器
    sensor.release(frame);
    true
}

pub fn capture_task<S: Sensor, T: Transport>(ctx: &PipelineContext, mut sensor: S, transport: &Mutex<T>) {
    let period = ctx.config.capture_period();
    info!("✅ capture task started ({} ms period)", period.as_millis());
    let mut fps = FpsCounter::new();

    while ctx.capture.should_run() {
        let started = Instant::now();
        if capture_once(ctx, &mut sensor, transport) {
            if let Some(rate) = fps.tick() {
                info!("📷 capture: {rate:.1} fps");
            }
        }
        // 睡眠到本周期结束, 超时则直接进入下一周期
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    ctx.capture.mark_stopped();
    info!("✅ capture task stopped");
}
