//! 任务生命周期: Stopped → Running → StopRequested → Stopped
//! Task lifecycle observed by each loop at its cycle boundary

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Stopped = 0,
    Running = 1,
    StopRequested = 2,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TaskState::Running,
            2 => TaskState::StopRequested,
            _ => TaskState::Stopped,
        }
    }
}

/// 单个任务的运行开关
pub struct TaskControl {
    name: &'static str,
    state: AtomicU8,
}

impl TaskControl {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: AtomicU8::new(TaskState::Stopped as u8),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Stopped → Running. 已经在运行 (或正在停止) 时返回 false.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Stopped as u8,
                TaskState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Running → StopRequested
    pub fn request_stop(&self) {
        let _ = self.state.compare_exchange(
            TaskState::Running as u8,
            TaskState::StopRequested as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// 循环顶部检查
    #[inline]
    pub fn should_run(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// 循环退出后调用
    pub fn mark_stopped(&self) {
        self.state.store(TaskState::Stopped as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let ctl = TaskControl::new("capture");
        assert_eq!(ctl.state(), TaskState::Stopped);
        assert!(!ctl.should_run());

        assert!(ctl.start());
        assert!(!ctl.start());
        assert!(ctl.should_run());

        ctl.request_stop();
        assert_eq!(ctl.state(), TaskState::StopRequested);
        assert!(!ctl.should_run());
        // 停止中不能重新启动
        assert!(!ctl.start());

        ctl.mark_stopped();
        assert_eq!(ctl.state(), TaskState::Stopped);
        assert!(ctl.start());
    }

    #[test]
    fn test_stop_before_start_is_ignored() {
        let ctl = TaskControl::new("render");
        ctl.request_stop();
        assert_eq!(ctl.state(), TaskState::Stopped);
    }
}
