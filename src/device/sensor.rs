//! 测试图案传感器 - 无真实摄像头时的帧源
//!
//! 单帧缓冲 (fb_count = 1, grab latest): 上一帧未归还时 acquire() 返回 None.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use super::{rgb888_to_rgb565, FrameHandle, Sensor};
use crate::frame::FrameGeometry;

/// 彩条颜色 (RGB888)
const BARS: [(u8, u8, u8); 8] = [
    (255, 255, 255),
    (255, 255, 0),
    (0, 255, 255),
    (0, 255, 0),
    (255, 0, 255),
    (255, 0, 0),
    (0, 0, 255),
    (0, 0, 0),
];

pub struct TestPatternSensor {
    geometry: FrameGeometry,
    buffer: Vec<u8>,
    outstanding: bool,
    sequence: u64,
    miss_rate: f64,
    rng: StdRng,
}

impl TestPatternSensor {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            buffer: vec![0; geometry.frame_len()],
            outstanding: false,
            sequence: 0,
            miss_rate: 0.0,
            rng: StdRng::from_entropy(),
        }
    }

    /// 模拟 "没有就绪帧" 的概率
    pub fn with_miss_rate(mut self, miss_rate: f64, seed: u64) -> Self {
        self.miss_rate = miss_rate.clamp(0.0, 1.0);
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn frames_produced(&self) -> u64 {
        self.sequence
    }

    /// 每帧彩条水平滚动一个像素
    fn render_pattern(&mut self) {
        let FrameGeometry {
            width,
            height,
            bytes_per_pixel,
        } = self.geometry;
        let bpp = bytes_per_pixel as usize;
        let bar_width = (width as usize / BARS.len()).max(1);
        let shift = self.sequence as usize;

        for y in 0..height as usize {
            for x in 0..width as usize {
                let (r, g, b) = BARS[((x + shift) / bar_width) % BARS.len()];
                let pixel = rgb888_to_rgb565(r, g, b).to_be_bytes();
                let idx = (y * width as usize + x) * bpp;
                for (k, byte) in self.buffer[idx..idx + bpp].iter_mut().enumerate() {
                    *byte = pixel.get(k).copied().unwrap_or(0);
                }
            }
        }
    }
}

impl Sensor for TestPatternSensor {
    fn acquire(&mut self) -> Option<FrameHandle> {
        if self.outstanding {
            trace!("sensor buffer still outstanding");
            return None;
        }
        if self.miss_rate > 0.0 && self.rng.gen_bool(self.miss_rate) {
            return None;
        }

        self.sequence += 1;
        self.render_pattern();
        self.outstanding = true;
        Some(FrameHandle::new(0, self.buffer.len(), self.sequence))
    }

    fn data(&self, frame: &FrameHandle) -> &[u8] {
        &self.buffer[..frame.len().min(self.buffer.len())]
    }

    fn release(&mut self, _frame: FrameHandle) {
        self.outstanding = false;
    }
}
