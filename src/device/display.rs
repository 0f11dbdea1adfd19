//! 软件帧缓冲显示屏
//! Software framebuffer standing in for the TFT panel. Keeps an RGB canvas,
//! draws overlays with imageproc and can dump PNG snapshots of what it shows.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use super::{rgb565_to_rgb888, Color565, Display};

/// TFT字体 size=1 对应的像素高度
const BASE_TEXT_PX: f32 = 8.0;

pub struct FramebufferDisplay {
    canvas: RgbImage,
    font: Option<FontVec>,
    snapshot_dir: Option<PathBuf>,
    snapshot_every: u64,
    presented: u64,
    warned_no_font: bool,
}

impl FramebufferDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbImage::new(width, height),
            font: None,
            snapshot_dir: None,
            snapshot_every: 0,
            presented: 0,
            warned_no_font: false,
        }
    }

    /// 加载标签字体; 不加载时只画框不画字
    pub fn with_font(mut self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("invalid font {}", path.display()))?;
        info!("✅ label font loaded: {}", path.display());
        self.font = Some(font);
        Ok(self)
    }

    /// 每 `every` 帧写一张PNG快照
    pub fn with_snapshots(mut self, dir: PathBuf, every: u64) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
        self.snapshot_dir = Some(dir);
        self.snapshot_every = every;
        Ok(self)
    }

    pub fn canvas(&self) -> &RgbImage {
        &self.canvas
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn save_snapshot(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("frame_{}.png", gen_time_string("")));
        self.canvas
            .save(&path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        Ok(path)
    }

    /// 裁剪到画布内的矩形
    fn clip(&self, x: i32, y: i32, w: u32, h: u32) -> Option<Rect> {
        let (cw, ch) = (self.canvas.width() as i64, self.canvas.height() as i64);
        let x0 = (x as i64).max(0);
        let y0 = (y as i64).max(0);
        let x1 = (x as i64 + w as i64).min(cw);
        let y1 = (y as i64 + h as i64).min(ch);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
    }
}

impl Display for FramebufferDisplay {
    /// 像素为 RGB565, 高字节在前
    fn draw_image(&mut self, x: i32, y: i32, w: u32, h: u32, pixels: &[u8]) {
        let (cw, ch) = self.canvas.dimensions();
        for row in 0..h {
            let py = y + row as i32;
            if py < 0 || py as u32 >= ch {
                continue;
            }
            for col in 0..w {
                let px = x + col as i32;
                if px < 0 || px as u32 >= cw {
                    continue;
                }
                let idx = ((row * w + col) * 2) as usize;
                let Some(bytes) = pixels.get(idx..idx + 2) else {
                    return;
                };
                let color = u16::from_be_bytes([bytes[0], bytes[1]]);
                self.canvas
                    .put_pixel(px as u32, py as u32, Rgb(rgb565_to_rgb888(color)));
            }
        }
    }

    fn draw_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Color565) {
        if let Some(rect) = self.clip(x, y, w, h) {
            draw_hollow_rect_mut(&mut self.canvas, rect, Rgb(rgb565_to_rgb888(color)));
        }
    }

    fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Color565, size: u8) {
        let Some(font) = &self.font else {
            if !self.warned_no_font {
                debug!("no label font configured, skipping text overlays");
                self.warned_no_font = true;
            }
            return;
        };
        let scale = PxScale::from(BASE_TEXT_PX * size.max(1) as f32);
        draw_text_mut(
            &mut self.canvas,
            Rgb(rgb565_to_rgb888(color)),
            x,
            y,
            scale,
            font,
            text,
        );
    }

    fn present(&mut self) {
        self.presented += 1;
        let Some(dir) = &self.snapshot_dir else {
            return;
        };
        if self.snapshot_every == 0 || self.presented % self.snapshot_every != 0 {
            return;
        }
        match self.save_snapshot(dir) {
            Ok(path) => debug!("📸 snapshot written: {}", path.display()),
            Err(e) => warn!("snapshot failed: {e:#}"),
        }
    }
}

/// 快照文件名用的时间串
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%3f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
