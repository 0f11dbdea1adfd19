use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camrelay::device::{Color565, Display, TestPatternSensor, COLOR_RED};
use camrelay::lifecycle::TaskState;
use camrelay::pipeline::{self, PipelineContext};
use camrelay::transport::loopback;
use camrelay::{PipelineConfig, SendMode};

#[derive(Default)]
struct DisplayLog {
    images: usize,
    rects: Vec<(i32, i32, u32, u32)>,
    labels: Vec<String>,
}

/// 渲染线程持有一份, 测试线程持有另一份
#[derive(Clone, Default)]
struct SharedDisplay {
    log: Arc<Mutex<DisplayLog>>,
}

impl Display for SharedDisplay {
    fn draw_image(&mut self, _x: i32, _y: i32, _w: u32, _h: u32, _pixels: &[u8]) {
        self.log.lock().unwrap().images += 1;
    }

    fn draw_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Color565) {
        assert_eq!(color, COLOR_RED);
        self.log.lock().unwrap().rects.push((x, y, w, h));
    }

    fn draw_text(&mut self, _x: i32, _y: i32, text: &str, _color: Color565, _size: u8) {
        self.log.lock().unwrap().labels.push(text.to_string());
    }
}

fn config(send_mode: SendMode) -> PipelineConfig {
    PipelineConfig {
        display_width: 32,
        display_height: 32,
        capture_period_ms: 5,
        render_idle_ms: 1,
        send_mode,
        ..PipelineConfig::default()
    }
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn assert_all_stopped(ctx: &PipelineContext) {
    assert_eq!(ctx.capture.state(), TaskState::Stopped);
    assert_eq!(ctx.render.state(), TaskState::Stopped);
    assert_eq!(ctx.sender.state(), TaskState::Stopped);
}

#[test]
fn streams_frames_and_draws_overlays_when_connected() {
    let ctx = PipelineContext::new(config(SendMode::Inline));
    let sensor = TestPatternSensor::new(ctx.config.geometry());
    let display = SharedDisplay::default();
    let (transport, peer) = loopback(64);
    peer.set_connected(true);

    let summary = thread::scope(|s| {
        let ctx = &ctx;
        let handle = {
            let display = display.clone();
            s.spawn(move || pipeline::run(ctx, sensor, display, transport))
        };

        let frame = peer.recv_timeout(Duration::from_secs(5)).expect("no frame streamed");
        assert_eq!(frame.len(), 32 * 32 * 2);

        peer.send_text(r#"{"faces":[{"x":0.25,"y":0.5,"w":0.25,"h":0.25,"label":"face"}]}"#);
        let drawn = wait_until(|| {
            let log = display.log.lock().unwrap();
            log.rects.contains(&(8, 16, 8, 8)) && log.labels.iter().any(|l| l == "face")
        });
        ctx.request_stop();
        let summary = handle.join().unwrap();
        assert!(drawn, "overlay never rendered");
        summary
    });

    assert!(summary.frames_sent > 0);
    assert!(summary.frames_rendered > 0);
    assert_eq!(summary.messages_ingested, 1);
    assert_all_stopped(&ctx);
}

#[test]
fn disconnected_transport_keeps_local_preview() {
    let ctx = PipelineContext::new(config(SendMode::Inline));
    let sensor = TestPatternSensor::new(ctx.config.geometry());
    let display = SharedDisplay::default();
    let (transport, peer) = loopback(64);

    let summary = thread::scope(|s| {
        let ctx = &ctx;
        let handle = {
            let display = display.clone();
            s.spawn(move || pipeline::run(ctx, sensor, display, transport))
        };
        let rendered = wait_until(|| {
            ctx.stats.snapshot().frames_captured >= 5 && display.log.lock().unwrap().images > 0
        });
        ctx.request_stop();
        let summary = handle.join().unwrap();
        assert!(rendered, "local preview stalled");
        summary
    });

    assert!(peer.drain().is_empty());
    assert_eq!(summary.frames_sent, 0);
    assert_eq!(summary.send_failures, 0);
    assert!(summary.sends_discarded >= 5);
    assert_all_stopped(&ctx);
}

#[test]
fn queued_mode_streams_through_sender_task() {
    let ctx = PipelineContext::new(config(SendMode::Queued));
    let sensor = TestPatternSensor::new(ctx.config.geometry());
    let (transport, peer) = loopback(64);
    peer.set_connected(true);

    thread::scope(|s| {
        let ctx = &ctx;
        let handle = s.spawn(move || pipeline::run(ctx, sensor, SharedDisplay::default(), transport));
        let received = peer.recv_timeout(Duration::from_secs(5));
        ctx.request_stop();
        handle.join().unwrap();
        assert!(received.is_some(), "sender task never delivered a frame");
    });

    assert!(ctx.stats.snapshot().frames_sent > 0);
    assert_all_stopped(&ctx);
}

#[test]
fn stop_before_run_returns_promptly() {
    let ctx = PipelineContext::new(config(SendMode::Queued));
    ctx.request_stop();

    let (transport, _peer) = loopback(4);
    let sensor = TestPatternSensor::new(ctx.config.geometry());
    let started = Instant::now();
    pipeline::run(&ctx, sensor, SharedDisplay::default(), transport);

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_all_stopped(&ctx);
}
