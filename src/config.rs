//! 应用配置 - 通过JSON文件调整参数

use clap::Parser;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::pipeline::handoff::HandoffPolicy;

/// 实时检测窗口参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "YOLO 实时检测系统", long_about = None)]
pub struct LiveArgs {
    /// JSON配置文件 (不存在时写出默认配置)
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// ONNX模型路径, 覆盖配置文件
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 摄像头索引, 覆盖配置文件
    #[arg(long)]
    pub camera: Option<usize>,

    /// 使用CUDA推理 (需要 cuda 特性)
    #[arg(long)]
    pub cuda: bool,
}

/// 批量检测参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "YOLO 视频文件批量检测", long_about = None)]
pub struct DetectArgs {
    /// 输入视频文件
    pub input: PathBuf,

    /// JSON配置文件
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// ONNX模型路径, 覆盖配置文件
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 输出目录, 覆盖配置文件
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

impl LiveArgs {
    /// 命令行参数覆盖配置文件
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.model.path = model.clone();
        }
        if let Some(camera) = self.camera {
            config.capture.camera_index = camera;
        }
        if self.cuda {
            config.model.cuda = true;
        }
    }
}

impl DetectArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.model.path = model.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.batch.output_dir = dir.clone();
        }
    }
}

/// 应用配置 (所有字段都有默认值, JSON里缺省的字段按默认值补齐)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub recording: RecordingConfig,
    pub batch: BatchConfig,
}

/// 检测模型参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub input_size: u32, // 推理输入尺寸 (正方形)
    pub conf: f32,       // 置信度阈值
    pub iou: f32,        // NMS IOU阈值
    pub cuda: bool,
    pub font_path: PathBuf, // 标注文字字体
}

/// 采集参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: usize,
    pub camera_name: String, // Windows dshow 设备名, 为空时用索引
    pub display_width: u32,
    pub display_height: u32,
    pub camera_interval_ms: u64,
    pub fallback_interval_ms: u64,
    pub open_timeout_ms: u64,
    pub ffmpeg: String,
    pub ffprobe: String,
}

/// 推理线程参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub take_timeout_ms: u64,
    pub worker_yield_ms: u64,
    pub handoff_policy: HandoffPolicy,
}

/// 录制参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub fps: f64,
    pub codecs: Vec<String>, // 按顺序尝试, 第一个成功的胜出
}

/// 批量检测参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub progress_every: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/yolo11n.onnx"),
            input_size: 640,
            conf: 0.25,
            iou: 0.45,
            cuda: false,
            font_path: PathBuf::from("assets/font/msyh.ttc"),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            camera_name: String::new(),
            display_width: 520,
            display_height: 400,
            camera_interval_ms: 30,
            fallback_interval_ms: 30,
            open_timeout_ms: 5000,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            take_timeout_ms: 100,
            worker_yield_ms: 10,
            handoff_policy: HandoffPolicy::DropNewest,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            file_prefix: "recording".to_string(),
            fps: 20.0,
            codecs: vec![
                "mpeg4".to_string(),
                "libx264".to_string(),
                "libopenh264".to_string(),
            ],
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("detected_videos"),
            file_prefix: "detected".to_string(),
            progress_every: 30,
        }
    }
}

impl CaptureConfig {
    pub fn display_size(&self) -> (u32, u32) {
        (self.display_width, self.display_height)
    }

    pub fn camera_interval(&self) -> Duration {
        Duration::from_millis(self.camera_interval_ms)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

impl PipelineConfig {
    pub fn take_timeout(&self) -> Duration {
        Duration::from_millis(self.take_timeout_ms)
    }

    pub fn worker_yield(&self) -> Duration {
        Duration::from_millis(self.worker_yield_ms)
    }
}

impl AppConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出一份默认配置; 解析失败时告警并使用默认值。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }
}
