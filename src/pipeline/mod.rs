/// 视频处理流水线 (Video Processing Pipeline)
///
/// 两个执行上下文:
/// - 控制线程: 渲染主循环, 处理按钮事件并驱动采集节拍 (PipelineController)
/// - 推理线程: 进程生命周期内常驻 (InferenceWorker)
///
/// 两者之间只有一个单槽交接通道 (HandoffChannel) 和共享状态 (PipelineState);
/// 录制器的设备与计数由互斥锁保护。
pub mod controller;
pub mod handoff;
pub mod state;
pub mod worker;

pub use controller::{frame_interval, Acquired, Cadence, PipelineController};
pub use handoff::{HandoffChannel, HandoffPolicy};
pub use state::{PipelineSnapshot, PipelineState, SourceKind};
pub use worker::{summary_line, FpsMeter, InferenceModel, InferenceWorker, StepOutcome, WorkerStats};

use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::input::SourceOpener;
use crate::presentation::Presenter;
use crate::recording::{EncoderChain, EncoderFactory, RecordingSink};

/// 组装好的流水线: 控制器 + 常驻推理线程
pub struct Pipeline {
    controller: PipelineController,
    state: Arc<PipelineState>,
    handoff: HandoffChannel,
    recorder: Arc<RecordingSink>,
    worker: Option<JoinHandle<WorkerStats>>,
}

impl Pipeline {
    /// 创建共享状态、交接通道和录制器, 并启动推理线程
    pub fn start<M: InferenceModel + 'static>(
        config: &AppConfig,
        model: M,
        opener: Box<dyn SourceOpener>,
        encoders: Arc<dyn EncoderFactory>,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Self, PipelineError> {
        let state = Arc::new(PipelineState::new());
        let handoff = HandoffChannel::new(config.pipeline.handoff_policy);
        let chain = EncoderChain::new(encoders, config.recording.codecs.clone());
        let recorder = Arc::new(RecordingSink::new(
            chain,
            &config.recording,
            state.clone(),
            presenter.clone(),
        ));

        let worker = InferenceWorker::new(
            handoff.clone(),
            state.clone(),
            model,
            recorder.clone(),
            presenter.clone(),
            &config.pipeline,
        )
        .spawn()?;

        let controller = PipelineController::new(
            state.clone(),
            opener,
            handoff.clone(),
            recorder.clone(),
            presenter,
            &config.capture,
        );

        info!("✅ 流水线已启动 (交接策略: {:?})", handoff.policy());
        Ok(Self {
            controller,
            state,
            handoff,
            recorder,
            worker: Some(worker),
        })
    }

    pub fn controller(&mut self) -> &mut PipelineController {
        &mut self.controller
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    pub fn handoff(&self) -> &HandoffChannel {
        &self.handoff
    }

    pub fn recorder(&self) -> &Arc<RecordingSink> {
        &self.recorder
    }

    /// 发取消信号、停止采集, 等推理线程在一个超时周期内退出
    pub fn shutdown(&mut self) -> Option<WorkerStats> {
        self.controller.shutdown();
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("⚠️ 推理线程异常退出");
                None
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}
