//! 坐标归一化: 源坐标系未声明, 按观测到的数值大小推断
//! Two-pass coordinate normalization into display space
//!
//! 第一遍: 判断整组是否为 [0,1] 归一化坐标; 否则按最大右/下边缘估计源分辨率
//! 第二遍: 缩放 → 四舍五入 → 裁剪到显示区域 → 读取标签

use serde_json::{Map, Value};

use super::{Detection, Label, DEFAULT_LABEL};

/// 所有数值 ≤ 此值时视为归一化坐标
pub const NORMALIZED_LIMIT: f32 = 1.2;
/// 最大边缘下限, 避免退化的缩放系数
pub const MIN_SOURCE_EDGE: f32 = 16.0;
pub const MIN_SCALE: f32 = 0.05;
pub const MAX_SCALE: f32 = 20.0;

/// 统一为 "左上角 + 宽高" 的原始框
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl RawBox {
    fn is_normalized(&self) -> bool {
        self.x <= NORMALIZED_LIMIT
            && self.y <= NORMALIZED_LIMIT
            && self.w <= NORMALIZED_LIMIT
            && self.h <= NORMALIZED_LIMIT
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scale {
    /// [0,1] 坐标, 乘以显示尺寸
    Normalized { sx: f32, sy: f32 },
    /// 像素坐标, 按估计的源分辨率缩放
    Pixel { sx: f32, sy: f32 },
}

impl Scale {
    pub fn factors(&self) -> (f32, f32) {
        match *self {
            Scale::Normalized { sx, sy } | Scale::Pixel { sx, sy } => (sx, sy),
        }
    }
}

/// 已存在的键按数值读取, 非数值按 0 处理
fn number(obj: &Map<String, Value>, key: &str) -> f32 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(0.0) as f32
}

/// 读取一个元素的坐标. 两种约定都缺键时返回 None (跳过该元素).
///
/// - A: x, y, w|width, h|height
/// - B: xmin, ymin, xmax, ymax
pub fn read_box(element: &Value) -> Option<RawBox> {
    let obj = element.as_object()?;
    let has = |key: &str| obj.contains_key(key);

    if has("x") && has("y") && (has("w") || has("width")) && (has("h") || has("height")) {
        let w_key = if has("w") { "w" } else { "width" };
        let h_key = if has("h") { "h" } else { "height" };
        return Some(RawBox {
            x: number(obj, "x"),
            y: number(obj, "y"),
            w: number(obj, w_key),
            h: number(obj, h_key),
        });
    }

    if has("xmin") && has("ymin") && has("xmax") && has("ymax") {
        let xmin = number(obj, "xmin");
        let ymin = number(obj, "ymin");
        let xmax = obj
            .get("xmax")
            .and_then(Value::as_f64)
            .map_or(xmin, |v| v as f32);
        let ymax = obj
            .get("ymax")
            .and_then(Value::as_f64)
            .map_or(ymin, |v| v as f32);
        return Some(RawBox {
            x: xmin,
            y: ymin,
            w: xmax - xmin,
            h: ymax - ymin,
        });
    }

    None
}

/// 标签: "label" → "class" → 默认值
pub fn read_label(element: &Value) -> Label {
    let field = element.get("label").or_else(|| element.get("class"));
    match field {
        Some(Value::String(s)) => Label::new(s),
        Some(Value::Number(n)) => Label::new(&n.to_string()),
        _ => Label::new(DEFAULT_LABEL),
    }
}

/// 第一遍: 根据整组数值决定缩放方式
pub fn decide_scale<'a>(boxes: impl IntoIterator<Item = &'a RawBox>, width: u32, height: u32) -> Scale {
    let (w, h) = (width as f32, height as f32);
    let mut normalized = true;
    let mut max_right = 0.0f32;
    let mut max_bottom = 0.0f32;

    for b in boxes {
        normalized &= b.is_normalized();
        max_right = max_right.max(b.x + b.w);
        max_bottom = max_bottom.max(b.y + b.h);
    }

    if normalized {
        return Scale::Normalized { sx: w, sy: h };
    }

    let max_right = max_right.max(MIN_SOURCE_EDGE);
    let max_bottom = max_bottom.max(MIN_SOURCE_EDGE);
    Scale::Pixel {
        sx: (w / max_right).clamp(MIN_SCALE, MAX_SCALE),
        sy: (h / max_bottom).clamp(MIN_SCALE, MAX_SCALE),
    }
}

/// 第二遍: 缩放并裁剪, 保证框完全落在显示区域内
pub fn to_display(raw: &RawBox, scale: Scale, width: u32, height: u32, label: Label) -> Detection {
    let (sx, sy) = scale.factors();
    let (dw, dh) = (width as i32, height as i32);

    // `as` 对越界与NaN做饱和转换
    let x = (raw.x * sx).round() as i32;
    let y = (raw.y * sy).round() as i32;
    let w = (raw.w * sx).round() as i32;
    let h = (raw.h * sy).round() as i32;

    let x = x.clamp(0, dw - 1);
    let y = y.clamp(0, dh - 1);
    let w = w.clamp(1, dw - x);
    let h = h.clamp(1, dh - y);

    Detection { x, y, w, h, label }
}
