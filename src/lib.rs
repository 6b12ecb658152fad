// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 检测框与标签绘制
pub mod batch; // 视频文件批量检测
pub mod config; // 应用配置与命令行参数
pub mod detection; // 帧与检测结果
pub mod error; // 流水线错误类型
pub mod input; // 视频输入系统
pub mod models; // 模型接口与具体实现
pub mod pipeline; // 采集 → 推理 → 录制 流水线
pub mod presentation; // 显示端接口
pub mod recording; // 视频录制
pub mod renderer; // macroquad 实时检测窗口

pub use crate::annotate::Annotator;
pub use crate::batch::{detect_file, BatchReport};
pub use crate::config::{AppConfig, DetectArgs, LiveArgs};
pub use crate::detection::{Bbox, Detection, Frame, Inference};
pub use crate::error::PipelineError;
pub use crate::input::{FrameSource, ReadOutcome, SourceDescriptor, SourceOpener};
pub use crate::models::{DetectionModel, Detector};
pub use crate::pipeline::{
    HandoffChannel, HandoffPolicy, InferenceModel, InferenceWorker, Pipeline,
    PipelineController, PipelineState, SourceKind,
};
pub use crate::presentation::{ChannelPresenter, ConsolePresenter, Presenter, UiEvent};
pub use crate::recording::{EncoderChain, EncoderFactory, RecordingSink};
