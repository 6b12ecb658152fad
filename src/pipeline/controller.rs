//! 流水线控制器 (PipelineController)
//!
//! 运行在控制线程 (渲染主循环) 上: 持有唯一的视频源, 驱动采集节拍,
//! 是 `running` / `recording` / `source_kind` 的唯一写入者。

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::config::CaptureConfig;
use crate::error::PipelineError;
use crate::input::{FrameSource, ReadOutcome, SourceDescriptor, SourceOpener};
use crate::pipeline::handoff::HandoffChannel;
use crate::pipeline::state::{PipelineState, SourceKind};
use crate::presentation::Presenter;
use crate::recording::RecordingSink;

/// 由声明帧率计算采集间隔 (`1000 / fps` 毫秒, 取整); 未声明或非正数时用 `fallback`
pub fn frame_interval(declared_fps: Option<f64>, fallback: Duration) -> Duration {
    match declared_fps {
        Some(fps) if fps.is_finite() && fps > 0.0 => {
            Duration::from_millis(((1000.0 / fps) as u64).max(1))
        }
        _ => fallback,
    }
}

/// 采集节拍: 固定间隔的定时器, 由主循环轮询
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    interval: Duration,
    next_due: Instant,
}

impl Cadence {
    /// 第一拍立即到期
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 到期则推进到下一拍并返回 true; 落后太多时不补拍
    pub fn due(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due += self.interval;
        if self.next_due <= now {
            self.next_due = now + self.interval;
        }
        true
    }
}

/// 一次采集的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// 没有打开的视频源或节拍未到
    Idle,
    /// 读到一帧; `queued` 表示是否放进了交接槽
    Frame { queued: bool },
    NoFrame,
    /// 文件读完, 流水线已停止
    Ended,
}

pub struct PipelineController {
    state: Arc<PipelineState>,
    opener: Box<dyn SourceOpener>,
    source: Option<Box<dyn FrameSource>>,
    handoff: HandoffChannel,
    recorder: Arc<RecordingSink>,
    presenter: Arc<dyn Presenter>,
    cadence: Option<Cadence>,
    capture: CaptureConfig,
}

impl PipelineController {
    pub fn new(
        state: Arc<PipelineState>,
        opener: Box<dyn SourceOpener>,
        handoff: HandoffChannel,
        recorder: Arc<RecordingSink>,
        presenter: Arc<dyn Presenter>,
        capture: &CaptureConfig,
    ) -> Self {
        Self {
            state,
            opener,
            source: None,
            handoff,
            recorder,
            presenter,
            cadence: None,
            capture: capture.clone(),
        }
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    pub fn is_source_open(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.is_open())
    }

    /// 当前采集间隔 (没有视频源时为 None)
    pub fn cadence_interval(&self) -> Option<Duration> {
        self.cadence.map(|c| c.interval())
    }

    pub fn start_camera(&mut self) -> Result<(), PipelineError> {
        self.start_camera_at(Instant::now())
    }

    pub fn start_camera_at(&mut self, now: Instant) -> Result<(), PipelineError> {
        // 任何视频源 (包括正在播放的文件) 打开时都不切换
        if self.is_source_open() {
            self.presenter.log("摄像头已打开");
            return Ok(());
        }
        self.stop();

        let descriptor = SourceDescriptor::Camera(self.capture.camera_index);
        let source = match self.opener.open(&descriptor) {
            Ok(source) => source,
            Err(e) => {
                debug!("{}", e);
                self.presenter.alert("错误", "摄像头打开失败");
                self.presenter.log("❌ 摄像头打开失败");
                return Err(e);
            }
        };

        self.install(source, SourceKind::Camera, self.capture.camera_interval(), now);
        self.presenter.log("📹 摄像头打开成功");
        Ok(())
    }

    pub fn start_file(&mut self, path: &Path) -> Result<(), PipelineError> {
        self.start_file_at(path, Instant::now())
    }

    pub fn start_file_at(&mut self, path: &Path, now: Instant) -> Result<(), PipelineError> {
        self.stop();

        let descriptor = SourceDescriptor::File(path.to_path_buf());
        let source = match self.opener.open(&descriptor) {
            Ok(source) => source,
            Err(e) => {
                debug!("{}", e);
                self.presenter.alert("错误", "视频文件打开失败");
                self.presenter.log("❌ 视频文件打开失败");
                return Err(e);
            }
        };

        let interval = frame_interval(
            source.declared_frame_rate(),
            self.capture.fallback_interval(),
        );
        self.install(source, SourceKind::File, interval, now);
        self.presenter
            .log(&format!("📁 已加载视频文件: {}", descriptor.display_name()));
        Ok(())
    }

    fn install(
        &mut self,
        source: Box<dyn FrameSource>,
        kind: SourceKind,
        interval: Duration,
        now: Instant,
    ) {
        debug!("采集间隔 {:?} ({:?})", interval, kind);
        self.source = Some(source);
        self.state.set_source_kind(kind);
        self.cadence = Some(Cadence::new(interval, now));
    }

    /// 主循环每帧调用; 节拍到期时采集一帧
    pub fn tick(&mut self, now: Instant) -> Acquired {
        let due = match self.cadence.as_mut() {
            Some(cadence) => cadence.due(now),
            None => false,
        };
        if due {
            self.acquire()
        } else {
            Acquired::Idle
        }
    }

    /// 立即采集一帧: 原始帧同步送显示端, 再尝试放进交接槽
    pub fn acquire(&mut self) -> Acquired {
        let Some(source) = self.source.as_mut() else {
            return Acquired::Idle;
        };
        match source.read() {
            ReadOutcome::Frame(frame) => {
                self.presenter.show_raw(&frame);
                let queued = self.handoff.try_put(frame);
                Acquired::Frame { queued }
            }
            ReadOutcome::NoFrame => Acquired::NoFrame,
            ReadOutcome::EndOfStream => {
                if source.kind() == SourceKind::File {
                    self.presenter.log("🏁 视频播放结束");
                    self.stop();
                    Acquired::Ended
                } else {
                    Acquired::NoFrame
                }
            }
        }
    }

    /// 停止采集、释放视频源、结束录制; 可重复调用
    pub fn stop(&mut self) {
        self.cadence = None;

        let had_source = match self.source.take() {
            Some(mut source) => {
                source.close();
                self.presenter.log("视频源已关闭");
                true
            }
            None => false,
        };
        self.state.set_source_kind(SourceKind::None);

        if self.state.is_recording() {
            self.state.set_recording(false);
            let frames = self.recorder.stop();
            self.presenter
                .log(&format!("⏹️ 视频录制已停止，共录制 {} 帧", frames));
        }

        if had_source {
            self.presenter.clear();
        }
    }

    /// 切换录制; 返回切换后的录制状态
    pub fn toggle_recording(&mut self) -> bool {
        if !self.is_source_open() {
            self.presenter.log("⚠️ 视频源未打开，无法录制");
            return false;
        }

        if !self.state.is_recording() {
            self.recorder.request_start(true);
            self.state.set_recorded_frame_count(0);
            self.state.set_recording(true);
            self.presenter.log("准备开始录制视频...");
            true
        } else {
            self.state.set_recording(false);
            let frames = self.recorder.stop();
            self.presenter
                .log(&format!("⏹️ 视频录制已停止，共录制 {} 帧", frames));
            false
        }
    }

    /// 程序退出: 先发取消信号, 再停止
    pub fn shutdown(&mut self) {
        self.state.set_running(false);
        self.stop();
    }
}
