//! 流水线共享状态
//!
//! 各字段的读写归属:
//! - `running`:        控制线程写, 推理线程读 (取消信号)
//! - `recording`:      控制线程写; 推理线程读, 录制器在编码器全部失败时清零
//! - `recorded_frames`: 录制器在互斥锁内写, 任意线程读
//! - `source_kind`:    控制线程写, 任意线程读
//!
//! 不要求多字段原子一致: 推理线程短暂看到 `recording=true` 而会话尚未打开是允许的。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// 当前视频源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[default]
    None,
    Camera,
    File,
}

impl SourceKind {
    fn to_u8(self) -> u8 {
        match self {
            SourceKind::None => 0,
            SourceKind::Camera => 1,
            SourceKind::File => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => SourceKind::Camera,
            2 => SourceKind::File,
            _ => SourceKind::None,
        }
    }
}

/// 进程内唯一的流水线状态, 通过 `Arc` 在线程间共享
#[derive(Debug)]
pub struct PipelineState {
    running: AtomicBool,
    recording: AtomicBool,
    recorded_frames: AtomicU64,
    source_kind: AtomicU8,
}

/// 某一时刻的状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSnapshot {
    pub source_kind: SourceKind,
    pub is_running: bool,
    pub is_recording: bool,
    pub recorded_frame_count: u64,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            recording: AtomicBool::new(false),
            recorded_frames: AtomicU64::new(0),
            source_kind: AtomicU8::new(SourceKind::None.to_u8()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub(crate) fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    pub fn recorded_frame_count(&self) -> u64 {
        self.recorded_frames.load(Ordering::Acquire)
    }

    pub(crate) fn set_recorded_frame_count(&self, count: u64) {
        self.recorded_frames.store(count, Ordering::Release);
    }

    pub fn source_kind(&self) -> SourceKind {
        SourceKind::from_u8(self.source_kind.load(Ordering::Acquire))
    }

    pub(crate) fn set_source_kind(&self, kind: SourceKind) {
        self.source_kind.store(kind.to_u8(), Ordering::Release);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            source_kind: self.source_kind(),
            is_running: self.is_running(),
            is_recording: self.is_recording(),
            recorded_frame_count: self.recorded_frame_count(),
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_running_with_no_source() {
        let state = PipelineState::new();
        let snap = state.snapshot();
        assert!(snap.is_running);
        assert!(!snap.is_recording);
        assert_eq!(snap.source_kind, SourceKind::None);
        assert_eq!(snap.recorded_frame_count, 0);
    }

    #[test]
    fn running_flag_is_visible_to_another_thread() {
        let state = Arc::new(PipelineState::new());
        let reader = state.clone();
        let handle = thread::spawn(move || {
            while reader.is_running() {
                thread::yield_now();
            }
            reader.source_kind()
        });
        state.set_source_kind(SourceKind::File);
        state.set_running(false);
        assert_eq!(handle.join().unwrap(), SourceKind::File);
    }
}
