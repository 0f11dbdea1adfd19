//! 双缓冲帧池 (direct 策略)
//! Double-buffered frame pool: two slots allocated once, swapped on publish
//!
//! 单生产者 (采集线程) / 单消费者 (渲染线程).
//! 生产者只写 "write" 槽, 消费者只读 "read" 槽; 索引交换在 `state` 锁内完成.
//! 每个槽有自己的锁, 因此即使消费者拿着过期的索引, 读到的也是一帧完整的数据.

use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use super::PublishOutcome;
use crate::error::PoolError;

struct FrameSlot {
    data: Box<[u8]>,
    len: usize,
    sequence: u64,
}

struct PoolState {
    write: usize,
    read: usize,
    ready: bool,
    sequence: u64,
}

/// take_ready() 的结果: 可读槽位
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadySlot {
    pub index: usize,
    pub sequence: u64,
}

/// 读槽借用 (持有期间生产者不会写入该槽)
pub struct FrameRef<'a> {
    guard: MutexGuard<'a, FrameSlot>,
}

impl FrameRef<'_> {
    pub fn sequence(&self) -> u64 {
        self.guard.sequence
    }
}

impl Deref for FrameRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard.data[..self.guard.len]
    }
}

pub struct FrameBufferPool {
    slots: [Mutex<FrameSlot>; 2],
    state: Mutex<PoolState>,
    capacity: usize,
}

impl FrameBufferPool {
    /// 启动时一次性分配两个槽, 之后不再分配
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        let slot = |index: usize| -> Result<Mutex<FrameSlot>, PoolError> {
            let mut data = Vec::new();
            data.try_reserve_exact(capacity).map_err(|_| PoolError::Alloc {
                slot: index,
                bytes: capacity,
            })?;
            data.resize(capacity, 0);
            Ok(Mutex::new(FrameSlot {
                data: data.into_boxed_slice(),
                len: 0,
                sequence: 0,
            }))
        };

        Ok(Self {
            slots: [slot(0)?, slot(1)?],
            state: Mutex::new(PoolState {
                write: 0,
                read: 1,
                ready: false,
                sequence: 0,
            }),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 复制到写槽 → 置位 ready → 交换读写索引.
    /// 超过容量的部分被静默截断. 消费者仍在合成写槽时放弃本帧而不是等待.
    pub fn publish(&self, src: &[u8]) -> PublishOutcome {
        if src.is_empty() {
            return PublishOutcome::Empty;
        }

        let write = self.state().write;
        let mut slot = match self.slots[write].try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return PublishOutcome::Busy,
        };

        let len = src.len().min(self.capacity);
        slot.data[..len].copy_from_slice(&src[..len]);
        slot.len = len;

        let mut state = self.state();
        state.sequence += 1;
        slot.sequence = state.sequence;
        state.ready = true;
        state.read = write;
        state.write = 1 - write;

        PublishOutcome::Published {
            len,
            truncated: src.len() > len,
        }
    }

    /// 原子地读取并清除 ready 标志
    pub fn take_ready(&self) -> Option<ReadySlot> {
        let mut state = self.state();
        if !state.ready {
            return None;
        }
        state.ready = false;
        Some(ReadySlot {
            index: state.read,
            sequence: state.sequence,
        })
    }

    pub fn read(&self, ready: ReadySlot) -> FrameRef<'_> {
        FrameRef {
            guard: self.slots[ready.index]
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}
