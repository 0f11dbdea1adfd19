//! 运行配置 - 命令行参数 + JSON配置文件
//! Runtime configuration: CLI arguments layered over a JSON config file

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::frame::FrameGeometry;

/// 单帧上限: 上行消息的长度字段是 u32
pub const MAX_FRAME_BYTES: usize = u32::MAX as usize;

/// 帧缓冲策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FrameDiscipline {
    /// 双缓冲 (常驻内存,无逐帧分配)
    Direct,
    /// 所有权移交,绘制一次后释放
    Handoff,
}

/// 网络发送策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// 采集线程同步发送
    Inline,
    /// 有界队列 + 独立发送线程
    Queued,
}

/// 命令行参数 (覆盖配置文件中的值)
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Camera relay: local preview + remote stream + detection overlays", long_about = None)]
pub struct Args {
    /// JSON配置文件路径 (不存在时写入默认配置)
    #[arg(short, long, default_value = "camrelay.json")]
    pub config: PathBuf,

    /// 检测服务器地址
    #[arg(long)]
    pub host: Option<String>,

    /// 检测服务器端口
    #[arg(short, long)]
    pub port: Option<u16>,

    /// 采集周期 (毫秒)
    #[arg(long)]
    pub period_ms: Option<u64>,

    /// 帧缓冲策略
    #[arg(long, value_enum)]
    pub discipline: Option<FrameDiscipline>,

    /// 发送策略
    #[arg(long, value_enum)]
    pub send_mode: Option<SendMode>,

    /// 发送队列深度 (仅 queued 模式)
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// 标签字体 (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 预览快照输出目录
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// 每N帧写一次快照
    #[arg(long, default_value_t = 150)]
    pub snapshot_every: u64,

    /// 模拟传感器丢帧概率 (0.0-1.0)
    #[arg(long, default_value_t = 0.0)]
    pub miss_rate: f64,

    /// 运行时长 (秒), 不设置则直到Ctrl+C
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// 传输层参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub reconnect_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub heartbeat_failures: u32,
    pub connect_timeout_ms: u64,
    pub max_message_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 8765,
            reconnect_interval_ms: 4_000,
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 3_000,
            heartbeat_failures: 2,
            connect_timeout_ms: 250,
            max_message_bytes: 64 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// 流水线参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    // === 显示 ===
    pub display_width: u32,
    pub display_height: u32,
    pub bytes_per_pixel: u32, // RGB565 = 2

    // === 采集 ===
    pub capture_period_ms: u64, // ~15 FPS
    pub frame_discipline: FrameDiscipline,

    // === 检测 ===
    pub detection_capacity: usize,
    pub json_capacity: usize,

    // === 发送 ===
    pub send_mode: SendMode,
    pub queue_depth: usize,

    // === 渲染 ===
    pub render_idle_ms: u64,

    pub transport: TransportConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            display_width: 240,
            display_height: 240,
            bytes_per_pixel: 2,
            capture_period_ms: 66,
            frame_discipline: FrameDiscipline::Direct,
            detection_capacity: 10,
            json_capacity: 2048,
            send_mode: SendMode::Inline,
            queue_depth: 2,
            render_idle_ms: 5,
            transport: TransportConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置
    pub fn load(path: &std::path::Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("config file {} is malformed ({e}), using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                info!("config file {} not found, writing defaults", path.display());
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &std::path::Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("failed to save config to {}: {e}", path.display());
                } else {
                    info!("💾 config saved to {}", path.display());
                }
            }
            Err(e) => warn!("failed to serialize config: {e}"),
        }
    }

    /// 命令行参数覆盖
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.transport.host = host.clone();
        }
        if let Some(port) = args.port {
            self.transport.port = port;
        }
        if let Some(period) = args.period_ms {
            self.capture_period_ms = period;
        }
        if let Some(discipline) = args.discipline {
            self.frame_discipline = discipline;
        }
        if let Some(mode) = args.send_mode {
            self.send_mode = mode;
        }
        if let Some(depth) = args.queue_depth {
            self.queue_depth = depth;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display_width == 0 || self.display_height == 0 {
            return Err(ConfigError::InvalidDisplay {
                width: self.display_width,
                height: self.display_height,
            });
        }
        if !(1..=4).contains(&self.bytes_per_pixel) {
            return Err(ConfigError::InvalidPixelSize(self.bytes_per_pixel));
        }
        // 一帧必须能放进单条消息 (u32 长度字段)
        let fits = self.geometry().checked_frame_len().is_some_and(|len| len <= MAX_FRAME_BYTES);
        if !fits {
            return Err(ConfigError::FrameTooLarge {
                width: self.display_width,
                height: self.display_height,
                bytes_per_pixel: self.bytes_per_pixel,
                max: MAX_FRAME_BYTES,
            });
        }
        if self.capture_period_ms == 0 {
            return Err(ConfigError::Zero("capture_period_ms"));
        }
        if self.detection_capacity == 0 {
            return Err(ConfigError::Zero("detection_capacity"));
        }
        if self.json_capacity == 0 {
            return Err(ConfigError::Zero("json_capacity"));
        }
        if self.send_mode == SendMode::Queued && self.queue_depth == 0 {
            return Err(ConfigError::Zero("queue_depth"));
        }
        Ok(())
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.display_width, self.display_height, self.bytes_per_pixel)
    }

    pub fn capture_period(&self) -> Duration {
        Duration::from_millis(self.capture_period_ms)
    }

    pub fn render_idle(&self) -> Duration {
        Duration::from_millis(self.render_idle_ms)
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!(
            "display {}x{} @ {} B/px | capture every {} ms | discipline {:?} | send {:?} (depth {})",
            self.display_width,
            self.display_height,
            self.bytes_per_pixel,
            self.capture_period_ms,
            self.frame_discipline,
            self.send_mode,
            self.queue_depth,
        );
        info!(
            "detections: capacity {} | json buffer {} B | server {}:{}",
            self.detection_capacity, self.json_capacity, self.transport.host, self.transport.port
        );
    }
}
