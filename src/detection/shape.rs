//! 消息形状分类
//! Decides once what a parsed detection message contains

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearReason {
    /// 对象中既无列表也无坐标
    NoDetections,
    /// 标量或其它无法识别的形状
    Unrecognized,
}

#[derive(Debug, PartialEq)]
pub enum MessageShape<'a> {
    /// {"faces": [...]}
    Faces(&'a [Value]),
    /// {"detections": [...]}
    Detections(&'a [Value]),
    /// 根对象本身就是一个检测框
    Single(&'a Value),
    /// 顶层数组
    List(&'a [Value]),
    Clear(ClearReason),
}

impl<'a> MessageShape<'a> {
    /// 候选元素 (Clear 为空)
    pub fn elements(&self) -> &'a [Value] {
        match *self {
            MessageShape::Faces(items)
            | MessageShape::Detections(items)
            | MessageShape::List(items) => items,
            MessageShape::Single(root) => std::slice::from_ref(root),
            MessageShape::Clear(_) => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageShape::Faces(_) => "faces",
            MessageShape::Detections(_) => "detections",
            MessageShape::Single(_) => "single",
            MessageShape::List(_) => "list",
            MessageShape::Clear(ClearReason::NoDetections) => "empty-object",
            MessageShape::Clear(ClearReason::Unrecognized) => "unrecognized",
        }
    }
}

/// 按优先级: faces / detections 列表 → 单个检测 → 空对象 → 顶层数组 → 其它
pub fn classify(root: &Value) -> MessageShape<'_> {
    match root {
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("faces") {
                return MessageShape::Faces(items);
            }
            if let Some(Value::Array(items)) = map.get("detections") {
                return MessageShape::Detections(items);
            }
            if map.contains_key("x") || map.contains_key("xmin") {
                return MessageShape::Single(root);
            }
            MessageShape::Clear(ClearReason::NoDetections)
        }
        Value::Array(items) => MessageShape::List(items),
        _ => MessageShape::Clear(ClearReason::Unrecognized),
    }
}
