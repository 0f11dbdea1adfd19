//! 检测结果存储 (整体替换, 不做增量合并)
//! Latest overlay set, copied in and out under a short lock

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::Detection;

pub struct DetectionStore {
    current: Mutex<Vec<Detection>>,
    capacity: usize,
}

impl DetectionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            current: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Detection>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 用新集合整体覆盖; 空集合即清空叠加层. 超出容量的部分丢弃.
    pub fn replace(&self, set: &[Detection]) -> usize {
        let n = set.len().min(self.capacity);
        let mut current = self.lock();
        current.clear();
        current.extend_from_slice(&set[..n]);
        n
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// 复制到调用方缓冲区, 返回数量
    pub fn snapshot(&self, out: &mut Vec<Detection>) -> usize {
        out.clear();
        let current = self.lock();
        out.extend_from_slice(&current);
        current.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(n: usize) -> Vec<Detection> {
        (0..n)
            .map(|i| Detection::new(i as i32, i as i32, 5, 5, "obj"))
            .collect()
    }

    #[test]
    fn test_replace_then_clear() {
        let store = DetectionStore::new(10);
        assert_eq!(store.replace(&boxes(7)), 7);
        assert_eq!(store.len(), 7);

        store.replace(&[]);
        let mut out = Vec::new();
        assert_eq!(store.snapshot(&mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_clear_after_any_size() {
        let store = DetectionStore::new(10);
        for n in [0, 1, 10, 25] {
            store.replace(&boxes(n));
            store.clear();
            assert!(store.is_empty());
        }
    }

    #[test]
    fn test_capacity_keeps_first() {
        let store = DetectionStore::new(10);
        assert_eq!(store.replace(&boxes(50)), 10);
        let mut out = Vec::new();
        store.snapshot(&mut out);
        assert_eq!(out, boxes(10));
    }

    #[test]
    fn test_replace_is_wholesale() {
        let store = DetectionStore::new(10);
        store.replace(&boxes(5));
        store.replace(&[Detection::new(100, 100, 10, 10, "face")]);
        let mut out = vec![Detection::default(); 3];
        assert_eq!(store.snapshot(&mut out), 1);
        assert_eq!(out[0].label.as_str(), "face");
        assert_eq!(out.len(), 1);
    }
}
