// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行配置参数
pub mod detection; // 检测框接入与存储
pub mod device; // 传感器与显示屏
pub mod error; // 错误类型
pub mod frame; // 帧缓冲 (双缓冲 / 移交)
pub mod lifecycle; // 任务生命周期
pub mod pipeline; // 采集 / 渲染 / 发送任务
pub mod stats; // 帧率与计数统计
pub mod transport; // 网络传输层

pub use crate::config::{Args, FrameDiscipline, PipelineConfig, SendMode, TransportConfig};
pub use crate::detection::{Detection, DetectionStore, Ingestor, Label};
pub use crate::frame::{FrameGeometry, FrameStore, PublishOutcome};
pub use crate::pipeline::PipelineContext;
pub use crate::transport::{MessageKind, Transport};
