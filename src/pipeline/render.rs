//! 渲染任务: 服务传输层, 有新帧时合成画面与检测框

use std::sync::Mutex;
use std::thread;

use tracing::{info, trace};

use super::{lock, PipelineContext};
use crate::detection::{Detection, DetectionStore};
use crate::device::{Display, COLOR_RED};
use crate::frame::{FrameGeometry, FrameStore};
use crate::stats::{FpsCounter, PipelineStats};
use crate::transport::Transport;

const OVERLAY_TEXT_SIZE: u8 = 1;

/// 合成一帧. 没有新帧时不做任何显示写入, 返回 false (保留上一帧画面).
pub fn render_once<D: Display + ?Sized>(
    frames: &FrameStore,
    detections: &DetectionStore,
    display: &mut D,
    geometry: FrameGeometry,
    overlays: &mut Vec<Detection>,
) -> bool {
    let drawn = frames.with_ready(|pixels| {
        display.draw_image(0, 0, geometry.width, geometry.height, pixels);
    });
    if drawn.is_none() {
        return false;
    }

    detections.snapshot(overlays);
    let (w, h) = (geometry.width as i32, geometry.height as i32);
    for det in overlays.iter() {
        let Some(det) = det.clamp_to(w, h) else {
            trace!("overlay {det:?} is off screen");
            continue;
        };
        display.draw_rect(det.x, det.y, det.w as u32, det.h as u32, COLOR_RED);
        let (lx, ly) = det.label_anchor();
        display.draw_text(lx, ly, det.label.as_str(), COLOR_RED, OVERLAY_TEXT_SIZE);
    }
    display.present();
    true
}

pub fn render_task<D: Display, T: Transport>(ctx: &PipelineContext, mut display: D, transport: &Mutex<T>) {
    info!("✅ render task started");
    let geometry = ctx.config.geometry();
    let idle = ctx.config.render_idle();
    let mut overlays = Vec::with_capacity(ctx.detections.capacity());
    let mut fps = FpsCounter::new();

    while ctx.render.should_run() {
        // 心跳 / 重连 / 入站消息
        lock(transport).service();

        if render_once(&ctx.frames, &ctx.detections, &mut display, geometry, &mut overlays) {
            PipelineStats::bump(&ctx.stats.frames_rendered);
            if let Some(rate) = fps.tick() {
                info!("🖥️ render: {rate:.1} fps");
            }
        }
        thread::sleep(idle);
    }

    ctx.render.mark_stopped();
    info!("✅ render task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameDiscipline;
    use crate::device::Color565;

    #[derive(Debug, PartialEq)]
    enum Call {
        Image(u32, u32, usize),
        Rect(i32, i32, u32, u32, Color565),
        Text(i32, i32, String),
        Present,
    }

    #[derive(Default)]
    struct RecordingDisplay {
        calls: Vec<Call>,
    }

    impl Display for RecordingDisplay {
        fn draw_image(&mut self, _x: i32, _y: i32, w: u32, h: u32, pixels: &[u8]) {
            self.calls.push(Call::Image(w, h, pixels.len()));
        }

        fn draw_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Color565) {
            self.calls.push(Call::Rect(x, y, w, h, color));
        }

        fn draw_text(&mut self, x: i32, y: i32, text: &str, _color: Color565, _size: u8) {
            self.calls.push(Call::Text(x, y, text.to_string()));
        }

        fn present(&mut self) {
            self.calls.push(Call::Present);
        }
    }

    const GEOMETRY: FrameGeometry = FrameGeometry::new(240, 240, 2);

    #[test]
    fn test_no_frame_no_writes() {
        let frames = FrameStore::new(FrameDiscipline::Direct, GEOMETRY);
        let detections = DetectionStore::new(10);
        detections.replace(&[Detection::new(1, 1, 5, 5, "face")]);
        let mut display = RecordingDisplay::default();

        assert!(!render_once(&frames, &detections, &mut display, GEOMETRY, &mut Vec::new()));
        assert!(display.calls.is_empty());
    }

    #[test]
    fn test_frame_then_overlays() {
        let frames = FrameStore::new(FrameDiscipline::Direct, GEOMETRY);
        frames.publish(&vec![0u8; GEOMETRY.frame_len()]);
        let detections = DetectionStore::new(10);
        detections.replace(&[
            Detection::new(20, 30, 10, 10, "face"),
            Detection::new(4, 5, 10, 10, "top"),
        ]);
        let mut display = RecordingDisplay::default();

        assert!(render_once(&frames, &detections, &mut display, GEOMETRY, &mut Vec::new()));
        assert_eq!(
            display.calls,
            vec![
                Call::Image(240, 240, GEOMETRY.frame_len()),
                Call::Rect(20, 30, 10, 10, COLOR_RED),
                Call::Text(20, 20, String::from("face")),
                Call::Rect(4, 5, 10, 10, COLOR_RED),
                Call::Text(4, 5, String::from("top")),
                Call::Present,
            ]
        );

        // 同一帧不会重复绘制
        display.calls.clear();
        assert!(!render_once(&frames, &detections, &mut display, GEOMETRY, &mut Vec::new()));
        assert!(display.calls.is_empty());
    }

    #[test]
    fn test_overlays_are_reclamped() {
        let frames = FrameStore::new(FrameDiscipline::Handoff, GEOMETRY);
        frames.publish(&vec![0u8; GEOMETRY.frame_len()]);
        let detections = DetectionStore::new(10);
        detections.replace(&[
            Detection::new(230, 235, 50, 50, "edge"),
            Detection::new(300, 10, 5, 5, "gone"),
        ]);
        let mut display = RecordingDisplay::default();

        render_once(&frames, &detections, &mut display, GEOMETRY, &mut Vec::new());
        assert!(display.calls.contains(&Call::Rect(230, 235, 10, 5, COLOR_RED)));
        assert!(!display
            .calls
            .iter()
            .any(|c| matches!(c, Call::Text(_, _, t) if t == "gone")));
    }
}
