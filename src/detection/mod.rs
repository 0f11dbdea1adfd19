/// 检测叠加模块
/// Detection overlays: normalized boxes received from the remote viewer
///
/// 数据流: 传输层文本消息 → Ingestor (解析/分类/归一化) → DetectionStore → 渲染线程
pub mod ingest;
pub mod normalize;
pub mod shape;
pub mod store;

pub use ingest::{hexdump, IngestOutcome, Ingestor};
pub use normalize::{RawBox, Scale};
pub use shape::{classify, ClearReason, MessageShape};
pub use store::DetectionStore;

use std::fmt;

/// 标签最大字节数 (定长缓冲, 避免堆分配)
pub const LABEL_CAPACITY: usize = 32;

/// 既无 "label" 也无 "class" 时使用
pub const DEFAULT_LABEL: &str = "obj";

/// 定长标签, 超长时在字符边界截断
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Label {
    bytes: [u8; LABEL_CAPACITY],
    len: u8,
}

impl Label {
    pub fn new(text: &str) -> Self {
        let mut end = text.len().min(LABEL_CAPACITY);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; LABEL_CAPACITY];
        bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self {
            bytes,
            len: end as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Label {
    fn default() -> Self {
        Label::new(DEFAULT_LABEL)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 显示坐标系中的检测框
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub label: Label,
}

impl Detection {
    pub fn new(x: i32, y: i32, w: i32, h: i32, label: &str) -> Self {
        Self {
            x,
            y,
            w,
            h,
            label: Label::new(label),
        }
    }

    /// 渲染前的防御性裁剪. 完全在屏幕外 (或退化为空) 时返回 None.
    pub fn clamp_to(&self, width: i32, height: i32) -> Option<Detection> {
        let x = self.x.max(0);
        let y = self.y.max(0);
        if x >= width || y >= height {
            return None;
        }
        let w = self.w.min(width - x);
        let h = self.h.min(height - y);
        if w <= 0 || h <= 0 {
            return None;
        }
        Some(Detection {
            x,
            y,
            w,
            h,
            label: self.label,
        })
    }

    /// 标签位置: 框上方10像素, 贴近顶部时放在框内
    pub fn label_anchor(&self) -> (i32, i32) {
        let y = if self.y > 10 { self.y - 10 } else { self.y };
        (self.x, y)
    }
}
