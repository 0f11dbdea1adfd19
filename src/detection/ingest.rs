//! 检测消息接入
//! Parses a text message, classifies it, normalizes the boxes and publishes
//! the result to the `DetectionStore`. Runs synchronously inside whatever task
//! services the transport; never touches display or sensor state.

use std::fmt::Write as _;

use serde_json::Value;
use tracing::{debug, trace};

use super::normalize::{decide_scale, read_box, read_label, to_display, RawBox};
use super::shape::{classify, ClearReason, MessageShape};
use super::{Detection, DetectionStore};
use crate::config::PipelineConfig;
use crate::error::IngestError;

/// hexdump 最多输出的字节数
const HEXDUMP_LIMIT: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 写入了 n 个检测框 (n 可能为 0: 所有元素都被跳过)
    Updated(usize),
    Cleared(ClearReason),
}

pub struct Ingestor {
    width: u32,
    height: u32,
    capacity: usize,
    json_capacity: usize,
    // 复用的工作缓冲, 避免每条消息分配
    candidates: Vec<(usize, RawBox)>,
    output: Vec<Detection>,
}

impl Ingestor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_limits(
            config.display_width,
            config.display_height,
            config.detection_capacity,
            config.json_capacity,
        )
    }

    pub fn with_limits(width: u32, height: u32, capacity: usize, json_capacity: usize) -> Self {
        Self {
            width,
            height,
            capacity,
            json_capacity,
            candidates: Vec::new(),
            output: Vec::with_capacity(capacity),
        }
    }

    /// 超过JSON缓冲容量的消息直接拒绝
    pub fn parse(&self, payload: &[u8]) -> Result<Value, IngestError> {
        if payload.len() > self.json_capacity {
            return Err(IngestError::TooLarge {
                len: payload.len(),
                capacity: self.json_capacity,
            });
        }
        Ok(serde_json::from_slice(payload)?)
    }

    /// 分类 + 两遍归一化. 结果留在 `detections()` 中.
    pub fn normalize(&mut self, root: &Value) -> IngestOutcome {
        self.output.clear();
        self.candidates.clear();

        let shape = classify(root);
        if let MessageShape::Clear(reason) = shape {
            return IngestOutcome::Cleared(reason);
        }

        let elements = shape.elements();
        if self.candidates.try_reserve(elements.len()).is_err() {
            // 内存不足: 按空列表处理, 叠加层被清空
            debug!("no memory for {} candidates", elements.len());
            return IngestOutcome::Updated(0);
        }

        // 第一遍: 收集有效坐标
        self.candidates.extend(
            elements
                .iter()
                .enumerate()
                .filter_map(|(i, element)| read_box(element).map(|b| (i, b))),
        );
        let scale = decide_scale(
            self.candidates.iter().map(|(_, b)| b),
            self.width,
            self.height,
        );
        trace!(
            "{} message: {} elements, {} valid, scale {:?}",
            shape.name(),
            elements.len(),
            self.candidates.len(),
            scale
        );

        // 第二遍: 保留前 capacity 个有效元素
        for (i, raw) in self.candidates.iter().take(self.capacity) {
            let label = read_label(&elements[*i]);
            let det = to_display(raw, scale, self.width, self.height, label);
            debug!(
                "det[{}]: x={} y={} w={} h={} label={}",
                self.output.len(),
                det.x,
                det.y,
                det.w,
                det.h,
                det.label
            );
            self.output.push(det);
        }

        IngestOutcome::Updated(self.output.len())
    }

    pub fn detections(&self) -> &[Detection] {
        &self.output
    }

    /// 解析 → 归一化 → 写入存储. 解析失败时存储保持不变.
    pub fn ingest(&mut self, payload: &[u8], store: &DetectionStore) -> Result<IngestOutcome, IngestError> {
        let root = self.parse(payload)?;
        let outcome = self.normalize(&root);
        match outcome {
            IngestOutcome::Cleared(_) => store.clear(),
            IngestOutcome::Updated(_) => {
                store.replace(&self.output);
            }
        }
        Ok(outcome)
    }
}

/// 诊断用十六进制转储 (最多128字节, 每行16字节)
pub fn hexdump(payload: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in payload.chunks(16).take(HEXDUMP_LIMIT / 16).enumerate() {
        let _ = write!(out, "\n  {:04}: ", row * 16);
        for byte in chunk {
            let _ = write!(out, "{byte:02X} ");
        }
    }
    if payload.len() > HEXDUMP_LIMIT {
        let _ = write!(out, "\n  ... ({} more bytes)", payload.len() - HEXDUMP_LIMIT);
    }
    out
}
