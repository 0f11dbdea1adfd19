/// 外设接口 (传感器 / 显示屏)
/// Device collaborators: the image sensor and the display
///
/// - Sensor:  acquire() 借出一帧, release() 归还; 归还后不能再读取
/// - Display: 画图像 / 画矩形 / 画文字
pub mod display;
pub mod sensor;

pub use display::FramebufferDisplay;
pub use sensor::TestPatternSensor;

/// RGB565 颜色
pub type Color565 = u16;

pub const COLOR_RED: Color565 = 0xF800;
pub const COLOR_BLACK: Color565 = 0x0000;
pub const COLOR_WHITE: Color565 = 0xFFFF;

/// 传感器借出的一帧. 不可复制; release() 消耗它, 因此归还后无法再读.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameHandle {
    slot: usize,
    len: usize,
    sequence: u64,
}

impl FrameHandle {
    pub fn new(slot: usize, len: usize, sequence: u64) -> Self {
        Self {
            slot,
            len,
            sequence,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

pub trait Sensor: Send {
    /// 没有就绪帧时返回 None (不是错误)
    fn acquire(&mut self) -> Option<FrameHandle>;

    /// 借出帧的像素数据
    fn data(&self, frame: &FrameHandle) -> &[u8];

    fn release(&mut self, frame: FrameHandle);
}

pub trait Display: Send {
    fn draw_image(&mut self, x: i32, y: i32, w: u32, h: u32, pixels: &[u8]);

    fn draw_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Color565);

    fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Color565, size: u8);

    /// 一帧合成结束 (可选)
    fn present(&mut self) {}
}

/// RGB565 (高字节在前) → RGB888
#[inline]
pub fn rgb565_to_rgb888(color: Color565) -> [u8; 3] {
    let r = ((color >> 11) & 0x1F) as u8;
    let g = ((color >> 5) & 0x3F) as u8;
    let b = (color & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

#[inline]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> Color565 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}
