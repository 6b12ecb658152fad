//! 推理线程 (InferenceWorker)
//!
//! 循环: 取帧 → 推理 → 标注 → 日志 → (录制) → 送显示端 → 短暂让出。
//! 唯一的阻塞点是 `try_take` 的超时, 也是唯一的退出检查点。

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::detection::{Detection, Frame, Inference};
use crate::error::PipelineError;
use crate::models::DetectionModel;
use crate::pipeline::handoff::HandoffChannel;
use crate::pipeline::state::PipelineState;
use crate::presentation::Presenter;
use crate::recording::RecordingSink;

/// 没有检测到目标时的日志标记
pub const NO_TARGET: &str = "未检测到目标";

/// 推理的抽象: 便于替换模型
pub trait InferenceModel: Send {
    fn infer(&mut self, frame: &Frame) -> Result<Inference, PipelineError>;
}

impl InferenceModel for DetectionModel {
    fn infer(&mut self, frame: &Frame) -> Result<Inference, PipelineError> {
        DetectionModel::infer(self, frame)
    }
}

/// 瞬时帧率: 与上一次成功推理之间的间隔
#[derive(Debug, Clone)]
pub struct FpsMeter {
    last: Instant,
}

impl FpsMeter {
    pub fn new(start: Instant) -> Self {
        Self { last: start }
    }

    pub fn tick(&mut self, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        if dt > 0.0 {
            1.0 / dt
        } else {
            0.0
        }
    }
}

/// `FPS: 12.34 - person: 0.91 | car: 0.50`
pub fn summary_line(fps: f64, detections: &[Detection]) -> String {
    if detections.is_empty() {
        return format!("FPS: {:.2} - {}", fps, NO_TARGET);
    }
    let items: Vec<String> = detections
        .iter()
        .map(|d| format!("{}: {:.2}", d.label, d.confidence))
        .collect();
    format!("FPS: {:.2} - {}", fps, items.join(" | "))
}

/// 单次循环的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 超时没有取到帧
    Idle,
    Processed,
    /// 推理失败, 帧被跳过
    Failed,
}

/// 推理线程统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
    pub recorded: u64,
}

/// 推理线程
pub struct InferenceWorker<M: InferenceModel> {
    handoff: HandoffChannel,
    state: Arc<PipelineState>,
    model: M,
    recorder: Arc<RecordingSink>,
    presenter: Arc<dyn Presenter>,
    fps: FpsMeter,
    take_timeout: Duration,
    yield_for: Duration,
    stats: WorkerStats,
}

impl<M: InferenceModel + 'static> InferenceWorker<M> {
    pub fn new(
        handoff: HandoffChannel,
        state: Arc<PipelineState>,
        model: M,
        recorder: Arc<RecordingSink>,
        presenter: Arc<dyn Presenter>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            handoff,
            state,
            model,
            recorder,
            presenter,
            fps: FpsMeter::new(Instant::now()),
            take_timeout: config.take_timeout(),
            yield_for: config.worker_yield(),
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// 处理至多一帧
    pub fn step(&mut self) -> StepOutcome {
        let Some(frame) = self.handoff.try_take(self.take_timeout) else {
            return StepOutcome::Idle;
        };

        // 模型内部 panic 也按单帧失败处理, 不让线程退出
        let model = &mut self.model;
        let result = panic::catch_unwind(AssertUnwindSafe(|| model.infer(&frame)))
            .unwrap_or_else(|payload| Err(PipelineError::inference(panic_message(payload.as_ref()))));

        let inference = match result {
            Ok(inference) => inference,
            Err(e) => {
                self.stats.failed += 1;
                self.presenter.log(&format!("❌ {}", e));
                return StepOutcome::Failed;
            }
        };

        let fps = self.fps.tick(Instant::now());
        self.presenter.log(&summary_line(fps, &inference.detections));

        if self.state.is_recording() && self.recorder.write_frame(&inference.annotated) {
            self.stats.recorded += 1;
        }

        self.presenter.show_annotated(inference.annotated);
        self.stats.processed += 1;
        StepOutcome::Processed
    }

    /// 运行直到 `is_running` 变为 false
    pub fn run(mut self) -> WorkerStats {
        debug!("推理线程启动");
        while self.state.is_running() {
            if self.step() != StepOutcome::Idle && !self.yield_for.is_zero() {
                thread::sleep(self.yield_for);
            }
        }
        info!(
            "推理线程退出: 处理 {} 帧, 失败 {} 帧, 录制 {} 帧",
            self.stats.processed, self.stats.failed, self.stats.recorded
        );
        self.stats
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<WorkerStats>> {
        thread::Builder::new()
            .name("inference".to_string())
            .spawn(move || self.run())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("模型异常: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("模型异常: {}", s)
    } else {
        warn!("模型异常, 无法解析 panic 信息");
        "模型异常".to_string()
    }
}
