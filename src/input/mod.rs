/// 视频输入系统 (Video Input System)
///
/// - FrameSource:  按需读取帧的视频源 (摄像头或文件)
/// - SourceOpener: 按描述打开视频源
/// - FfmpegSource: 基于 ffmpeg 子进程的实现 (V4L2/AVFoundation/DirectShow/文件)
/// - probe:        ffprobe 读取文件元数据
pub mod ffmpeg;
pub mod probe;

pub use ffmpeg::{FfmpegSource, FfmpegSourceOpener};
pub use probe::{parse_frame_rate, StreamInfo};

use crate::detection::Frame;
use crate::error::PipelineError;
use crate::pipeline::state::SourceKind;
use std::path::PathBuf;

/// 未声明帧率时使用的默认值
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// 视频源描述: 摄像头索引或文件路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Camera(usize),
    File(PathBuf),
}

impl SourceDescriptor {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Camera(_) => SourceKind::Camera,
            SourceDescriptor::File(_) => SourceKind::File,
        }
    }

    /// 日志里显示的名字 (文件只显示文件名)
    pub fn display_name(&self) -> String {
        match self {
            SourceDescriptor::Camera(index) => format!("摄像头 #{}", index),
            SourceDescriptor::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

/// 一次读取的结果
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Frame(Frame),
    /// 本次节拍没有帧 (摄像头瞬时读取失败或解码尚未跟上)
    NoFrame,
    /// 文件已读完; 一旦返回, 之后每次都返回
    EndOfStream,
}

impl ReadOutcome {
    /// 文件结束转成 `StreamEnded`, 没有帧为 `Ok(None)`
    pub fn into_result(self) -> Result<Option<Frame>, PipelineError> {
        match self {
            ReadOutcome::Frame(frame) => Ok(Some(frame)),
            ReadOutcome::NoFrame => Ok(None),
            ReadOutcome::EndOfStream => Err(PipelineError::StreamEnded),
        }
    }
}

/// 视频源
pub trait FrameSource: Send {
    /// 读取下一帧, 应当很快返回
    fn read(&mut self) -> ReadOutcome;

    /// 源自身声明的帧率 (未声明或非正数时为 None)
    fn declared_frame_rate(&self) -> Option<f64>;

    /// 帧率: 声明值, 缺省为 30
    fn native_frame_rate(&self) -> f64 {
        match self.declared_frame_rate() {
            Some(fps) if fps > 0.0 && fps.is_finite() => fps,
            _ => DEFAULT_FRAME_RATE,
        }
    }

    /// 输出帧尺寸
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// 声明的总帧数 (未知为 None)
    fn frame_count(&self) -> Option<u64> {
        None
    }

    fn kind(&self) -> SourceKind;

    fn is_open(&self) -> bool;

    /// 释放底层设备, 可重复调用
    fn close(&mut self);
}

/// 视频源打开器
pub trait SourceOpener: Send {
    /// 打开失败返回 `SourceUnavailable`
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, PipelineError>;
}
