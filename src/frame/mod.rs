/// 帧缓冲模块
/// Frame buffering between the capture task and the render task
///
/// 两种策略:
/// 1. Direct:  双缓冲, 常驻内存, 发布时复制 + 交换索引
/// 2. Handoff: 每帧分配, 所有权移交给渲染线程, 绘制一次后释放
pub mod handoff;
pub mod pool;

pub use handoff::HandoffSlot;
pub use pool::{FrameBufferPool, FrameRef, ReadySlot};

use tracing::warn;

use crate::config::FrameDiscipline;

/// 帧尺寸 (整个会话内固定)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

impl FrameGeometry {
    pub const fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// 一帧的字节数; 溢出 usize 时返回 None
    pub const fn checked_frame_len(&self) -> Option<usize> {
        match (self.width as usize).checked_mul(self.height as usize) {
            Some(pixels) => pixels.checked_mul(self.bytes_per_pixel as usize),
            None => None,
        }
    }

    /// 溢出时饱和到 usize::MAX, 之后的分配必然失败 (预览降级为 Disabled)
    #[inline]
    pub const fn frame_len(&self) -> usize {
        match self.checked_frame_len() {
            Some(len) => len,
            None => usize::MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { len: usize, truncated: bool },
    /// 消费者正在读取目标槽, 本帧不进本地预览
    Busy,
    /// 帧内存不可用, 本地预览已关闭
    Disabled,
    Empty,
}

/// 按配置选择的帧缓冲
pub enum FrameStore {
    Direct(FrameBufferPool),
    Handoff(HandoffSlot),
    Disabled,
}

impl FrameStore {
    /// 分配失败时降级为 Disabled (无本地预览, 其余功能照常)
    pub fn new(discipline: FrameDiscipline, geometry: FrameGeometry) -> Self {
        let capacity = geometry.frame_len();
        match discipline {
            FrameDiscipline::Direct => match FrameBufferPool::new(capacity) {
                Ok(pool) => FrameStore::Direct(pool),
                Err(err) => {
                    warn!("frame pool unavailable, local preview disabled: {err}");
                    FrameStore::Disabled
                }
            },
            FrameDiscipline::Handoff => FrameStore::Handoff(HandoffSlot::new(capacity)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, FrameStore::Disabled)
    }

    /// 采集线程调用. direct 策略复制进池; handoff 策略先在锁外分配副本再移交.
    pub fn publish(&self, src: &[u8]) -> PublishOutcome {
        match self {
            FrameStore::Direct(pool) => pool.publish(src),
            FrameStore::Handoff(slot) => {
                if src.is_empty() {
                    return PublishOutcome::Empty;
                }
                let len = src.len().min(slot.capacity());
                let mut owned = Vec::new();
                if owned.try_reserve_exact(len).is_err() {
                    warn!("no memory for a {len} byte handoff frame, skipping preview");
                    return PublishOutcome::Disabled;
                }
                owned.extend_from_slice(&src[..len]);
                match slot.publish(owned) {
                    PublishOutcome::Published { len, .. } => PublishOutcome::Published {
                        len,
                        truncated: src.len() > len,
                    },
                    other => other,
                }
            }
            FrameStore::Disabled => PublishOutcome::Disabled,
        }
    }

    /// 渲染线程调用. 有新帧时以只读切片调用 `f`, 否则返回 None.
    pub fn with_ready<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        match self {
            FrameStore::Direct(pool) => {
                let ready = pool.take_ready()?;
                let frame = pool.read(ready);
                Some(f(&frame))
            }
            FrameStore::Handoff(slot) => {
                let frame = slot.take()?;
                let out = f(&frame);
                // 绘制一次后释放
                drop(frame);
                Some(out)
            }
            FrameStore::Disabled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEOMETRY: FrameGeometry = FrameGeometry::new(4, 2, 2);

    #[test]
    fn test_geometry_len() {
        assert_eq!(GEOMETRY.frame_len(), 16);
        assert_eq!(FrameGeometry::new(240, 240, 2).frame_len(), 115_200);
    }

    #[test]
    fn test_geometry_len_does_not_wrap() {
        // 65536 * 65536 * 1 在 u32 下回绕为 0
        let wide = FrameGeometry::new(65_536, 65_536, 1);
        assert_eq!(wide.checked_frame_len(), Some(1 << 32));
        assert_eq!(wide.frame_len(), 1 << 32);

        let huge = FrameGeometry::new(u32::MAX, u32::MAX, 4);
        assert_eq!(huge.checked_frame_len(), None);
        assert_eq!(huge.frame_len(), usize::MAX);
    }

    #[test]
    fn test_both_disciplines_deliver_latest_frame() {
        for discipline in [FrameDiscipline::Direct, FrameDiscipline::Handoff] {
            let store = FrameStore::new(discipline, GEOMETRY);
            assert!(store.is_enabled());
            assert!(store.with_ready(|_| ()).is_none());

            store.publish(&[1; 16]);
            store.publish(&[2; 16]);
            let got = store.with_ready(|frame| frame.to_vec());
            assert_eq!(got, Some(vec![2; 16]), "{discipline:?}");
            assert!(store.with_ready(|_| ()).is_none(), "{discipline:?}");
        }
    }

    #[test]
    fn test_handoff_reports_truncation() {
        let store = FrameStore::new(FrameDiscipline::Handoff, GEOMETRY);
        assert_eq!(
            store.publish(&[3; 20]),
            PublishOutcome::Published {
                len: 16,
                truncated: true
            }
        );
    }

    #[test]
    fn test_disabled_store_never_yields() {
        let store = FrameStore::Disabled;
        assert!(!store.is_enabled());
        assert_eq!(store.publish(&[1; 4]), PublishOutcome::Disabled);
        assert!(store.with_ready(|_| ()).is_none());
    }
}
