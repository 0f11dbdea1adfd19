//! 错误类型
//! Error types shared across the pipeline

use thiserror::Error;

/// 配置校验错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("display dimensions must be non-zero (got {width}x{height})")]
    InvalidDisplay { width: u32, height: u32 },
    #[error("frame of {width}x{height} @ {bytes_per_pixel} B/px exceeds {max} bytes")]
    FrameTooLarge {
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        max: usize,
    },
    #[error("bytes per pixel must be 1..=4 (got {0})")]
    InvalidPixelSize(u32),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// 检测消息解析错误 (不会清空叠加层)
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("message of {len} bytes exceeds json capacity of {capacity} bytes")]
    TooLarge { len: usize, capacity: usize },
    #[error("json error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("payload of {0} bytes does not fit in a single message")]
    PayloadTooLarge(usize),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to reserve {bytes} bytes for frame slot {slot}")]
    Alloc { slot: usize, bytes: usize },
}
