//! ffmpeg 子进程视频源
//!
//! ffmpeg 把摄像头或文件解码成 rgb24 原始帧写到 stdout, 读线程按帧切分后
//! 放进有界队列; `read()` 只做非阻塞的 `try_recv`, 不会拖慢采集节拍。

use super::probe::{probe_file, StreamInfo};
use super::{FrameSource, ReadOutcome, SourceDescriptor, SourceOpener};
use crate::config::CaptureConfig;
use crate::detection::Frame;
use crate::error::PipelineError;
use crate::pipeline::state::SourceKind;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use image::RgbImage;
use log::{debug, info, warn};
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 不缩放时摄像头的输出尺寸
const DEFAULT_CAMERA_SIZE: (u32, u32) = (640, 480);
/// 文件解码最多领先的帧数
const FILE_QUEUE: usize = 4;
/// 摄像头只保留最新的少量帧
const CAMERA_QUEUE: usize = 2;

/// ffmpeg 视频源打开器
#[derive(Clone, Debug)]
pub struct FfmpegSourceOpener {
    ffmpeg: String,
    ffprobe: String,
    camera_name: String,
    scale: Option<(u32, u32)>,
    open_timeout: Duration,
}

impl FfmpegSourceOpener {
    /// 实时显示用: 每帧缩放到显示尺寸
    pub fn new(capture: &CaptureConfig) -> Self {
        Self {
            ffmpeg: capture.ffmpeg.clone(),
            ffprobe: capture.ffprobe.clone(),
            camera_name: capture.camera_name.clone(),
            scale: Some(capture.display_size()),
            open_timeout: capture.open_timeout(),
        }
    }

    /// 批量检测用: 保持原始分辨率
    pub fn native_size(capture: &CaptureConfig) -> Self {
        Self {
            scale: None,
            ..Self::new(capture)
        }
    }

    fn camera_command(&self, index: usize, size: (u32, u32)) -> Command {
        let (format, url) = camera_input(index, &self.camera_name);
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg(format)
            .arg("-i")
            .arg(url)
            .arg("-an")
            .arg("-vf")
            .arg(format!("scale={}:{}", size.0, size.1))
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd
    }

    fn file_command(&self, descriptor: &SourceDescriptor, info: &StreamInfo) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");
        if let SourceDescriptor::File(path) = descriptor {
            cmd.arg("-i").arg(path);
        }
        cmd.arg("-an");
        if let Some((w, h)) = self.scale {
            if (w, h) != (info.width, info.height) {
                cmd.arg("-vf").arg(format!("scale={}:{}", w, h));
            }
        }
        cmd.arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd
    }
}

impl SourceOpener for FfmpegSourceOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, PipelineError> {
        let name = descriptor.display_name();
        let source = match descriptor {
            SourceDescriptor::Camera(index) => {
                #[cfg(target_os = "linux")]
                {
                    let device = format!("/dev/video{}", index);
                    if !std::path::Path::new(&device).exists() {
                        return Err(PipelineError::source_unavailable(name, "设备不存在"));
                    }
                }
                let size = self.scale.unwrap_or(DEFAULT_CAMERA_SIZE);
                let params = SourceParams {
                    name,
                    kind: SourceKind::Camera,
                    size,
                    frame_rate: None,
                    frame_count: None,
                };
                FfmpegSource::spawn(self.camera_command(*index, size), params, self.open_timeout)?
            }
            SourceDescriptor::File(path) => {
                let info = probe_file(&self.ffprobe, path)?;
                let size = self.scale.unwrap_or((info.width, info.height));
                let params = SourceParams {
                    name,
                    kind: SourceKind::File,
                    size,
                    frame_rate: info.frame_rate,
                    frame_count: info.frame_count,
                };
                FfmpegSource::spawn(
                    self.file_command(descriptor, &info),
                    params,
                    self.open_timeout,
                )?
            }
        };
        Ok(Box::new(source))
    }
}

/// 按平台选择摄像头输入格式与地址
fn camera_input(index: usize, name: &str) -> (&'static str, String) {
    #[cfg(target_os = "windows")]
    {
        let device = if name.is_empty() {
            format!("video={}", index)
        } else {
            format!("video={}", name)
        };
        ("dshow", device) // DirectShow
    }
    #[cfg(target_os = "macos")]
    {
        let _ = name;
        ("avfoundation", format!("{}", index)) // AVFoundation
    }
    #[cfg(target_os = "linux")]
    {
        let _ = name;
        ("v4l2", format!("/dev/video{}", index)) // Video4Linux2
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let _ = name;
        ("video4linux2", format!("{}", index))
    }
}

struct SourceParams {
    name: String,
    kind: SourceKind,
    size: (u32, u32),
    frame_rate: Option<f64>,
    frame_count: Option<u64>,
}

/// ffmpeg 子进程视频源
pub struct FfmpegSource {
    params: SourceParams,
    child: Option<Child>,
    rx: Option<Receiver<Frame>>,
    reader: Option<JoinHandle<()>>,
    pending: Option<Frame>,
    ended: bool,
    disconnected_warned: bool,
}

impl FfmpegSource {
    fn spawn(
        mut cmd: Command,
        params: SourceParams,
        open_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        debug!("启动ffmpeg: {:?}", cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            PipelineError::source_unavailable(&params.name, format!("无法启动ffmpeg: {}", e))
        })?;

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::source_unavailable(
                    &params.name,
                    "无法获取ffmpeg输出",
                ));
            }
        };

        let last_error = Arc::new(Mutex::new(None::<String>));
        if let Some(stderr) = child.stderr.take() {
            let last_error = last_error.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    warn!("ffmpeg: {}", line);
                    *last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(line);
                }
            });
        }

        let blocking = params.kind == SourceKind::File;
        let capacity = if blocking { FILE_QUEUE } else { CAMERA_QUEUE };
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let size = params.size;
        let reader = thread::Builder::new()
            .name(format!("decode-{}", params.name))
            .spawn(move || read_loop(stdout, size, blocking, tx))
            .map_err(|e| PipelineError::source_unavailable(&params.name, e.to_string()))?;

        let mut source = Self {
            params,
            child: Some(child),
            rx: Some(rx),
            reader: Some(reader),
            pending: None,
            ended: false,
            disconnected_warned: false,
        };

        // 等到第一帧才算打开成功
        let first = match source.rx.as_ref() {
            Some(rx) => rx.recv_timeout(open_timeout),
            None => Err(RecvTimeoutError::Disconnected),
        };
        match first {
            Ok(frame) => {
                source.pending = Some(frame);
                info!(
                    "✅ 视频源已打开: {} ({}x{})",
                    source.params.name, size.0, size.1
                );
                Ok(source)
            }
            Err(e) => {
                source.close();
                let reason = last_error
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take()
                    .unwrap_or_else(|| match e {
                        RecvTimeoutError::Timeout => "等待第一帧超时".to_string(),
                        RecvTimeoutError::Disconnected => "无法读取第一帧".to_string(),
                    });
                Err(PipelineError::source_unavailable(&source.params.name, reason))
            }
        }
    }
}

/// 读线程: 按帧大小切分 stdout
fn read_loop(mut stdout: impl Read, size: (u32, u32), blocking: bool, tx: Sender<Frame>) {
    let frame_bytes = size.0 as usize * size.1 as usize * 3;
    let mut index = 0u64;
    loop {
        let mut buffer = vec![0u8; frame_bytes];
        if let Err(e) = stdout.read_exact(&mut buffer) {
            debug!("解码输出结束: {}", e);
            break;
        }
        let image = match RgbImage::from_raw(size.0, size.1, buffer) {
            Some(img) => img,
            None => break,
        };
        let frame = Frame::with_index(image, index);
        index += 1;

        if blocking {
            if tx.send(frame).is_err() {
                break;
            }
        } else if let Err(crossbeam_channel::TrySendError::Disconnected(_)) = tx.try_send(frame) {
            break;
        }
    }
}

impl FrameSource for FfmpegSource {
    fn read(&mut self) -> ReadOutcome {
        if let Some(frame) = self.pending.take() {
            return ReadOutcome::Frame(frame);
        }
        if self.ended {
            return ReadOutcome::EndOfStream;
        }
        let Some(rx) = self.rx.as_ref() else {
            return match self.params.kind {
                SourceKind::File => ReadOutcome::EndOfStream,
                _ => ReadOutcome::NoFrame,
            };
        };
        match rx.try_recv() {
            Ok(frame) => ReadOutcome::Frame(frame),
            Err(TryRecvError::Empty) => ReadOutcome::NoFrame,
            Err(TryRecvError::Disconnected) => match self.params.kind {
                SourceKind::File => {
                    self.ended = true;
                    ReadOutcome::EndOfStream
                }
                _ => {
                    if !self.disconnected_warned {
                        warn!("⚠️ 摄像头没有输出新帧: {}", self.params.name);
                        self.disconnected_warned = true;
                    }
                    ReadOutcome::NoFrame
                }
            },
        }
    }

    fn declared_frame_rate(&self) -> Option<f64> {
        self.params.frame_rate
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.params.size)
    }

    fn frame_count(&self) -> Option<u64> {
        self.params.frame_count
    }

    fn kind(&self) -> SourceKind {
        self.params.kind
    }

    fn is_open(&self) -> bool {
        self.child.is_some()
    }

    fn close(&mut self) {
        // 先断开队列, 阻塞在 send 上的读线程随之退出
        self.rx = None;
        self.pending = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("ffmpeg 已退出: {}", self.params.name);
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_loop_splits_raw_frames() {
        let (w, h) = (4u32, 2u32);
        let mut raw = Vec::new();
        for tag in 0..3u8 {
            raw.extend(std::iter::repeat(tag).take((w * h * 3) as usize));
        }
        raw.extend([9u8; 5]); // 不完整的尾巴被丢弃
        let (tx, rx) = crossbeam_channel::unbounded();
        read_loop(Cursor::new(raw), (w, h), true, tx);
        let frames: Vec<Frame> = rx.try_iter().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].index(), 2);
        assert_eq!(frames[1].image().get_pixel(3, 1).0, [1, 1, 1]);
    }

    #[test]
    fn missing_executable_is_source_unavailable() {
        let capture = CaptureConfig {
            ffmpeg: "ffmpeg-does-not-exist-here".to_string(),
            ..CaptureConfig::default()
        };
        let params = SourceParams {
            name: "test".to_string(),
            kind: SourceKind::File,
            size: (2, 2),
            frame_rate: None,
            frame_count: None,
        };
        let err = FfmpegSource::spawn(
            Command::new(&capture.ffmpeg),
            params,
            Duration::from_millis(100),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }
}
