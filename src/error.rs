//! 流水线错误类型

use thiserror::Error;

/// 流水线各组件边界上的错误。
///
/// 所有错误都在发生处被处理并转成一行用户日志,没有一个是进程级致命错误。
#[derive(Error, Debug)]
pub enum PipelineError {
    /// 摄像头或视频文件无法打开
    #[error("视频源不可用 ({source_name}): {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// 视频文件已读完
    #[error("视频流已结束")]
    StreamEnded,

    /// 所有候选编码器都无法打开
    #[error("无法初始化视频录制器, 尝试的编码器都失败: {}", tried.join(", "))]
    EncoderUnavailable { tried: Vec<String> },

    /// 单帧推理失败
    #[error("推理失败: {0}")]
    InferenceFailure(String),

    /// 编码器写入/收尾失败
    #[error("编码器错误: {0}")]
    Encoder(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::InferenceFailure(msg.into())
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
