//! ffmpeg 子进程编码器: rgb24 原始帧写入 stdin, 输出 MP4

use super::{Encoder, EncoderFactory};
use crate::detection::Frame;
use crate::error::{PipelineError, Result};
use image::imageops::{self, FilterType};
use log::{debug, warn};
use regex::Regex;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::OnceLock;

/// 解析 `ffmpeg -encoders` 输出中的视频编码器名
pub fn parse_video_encoders(listing: &str) -> HashSet<String> {
    let Ok(re) = Regex::new(r"^\s*V[A-Z.]{5}\s+(\S+)") else {
        return HashSet::new();
    };
    listing
        .lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| name != "=") // 表头分隔行
        .collect()
}

/// 通过 ffmpeg 命令行创建编码器
pub struct FfmpegEncoderFactory {
    ffmpeg: String,
    encoders: OnceLock<Option<HashSet<String>>>,
}

impl FfmpegEncoderFactory {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            encoders: OnceLock::new(),
        }
    }

    /// 本机 ffmpeg 支持的视频编码器 (查询失败为 None, 此时直接尝试启动)
    fn available(&self) -> Option<&HashSet<String>> {
        self.encoders
            .get_or_init(|| {
                let output = Command::new(&self.ffmpeg)
                    .arg("-hide_banner")
                    .arg("-encoders")
                    .stdin(Stdio::null())
                    .stderr(Stdio::null())
                    .output()
                    .ok()?;
                let list = parse_video_encoders(&String::from_utf8_lossy(&output.stdout));
                debug!("ffmpeg 可用视频编码器 {} 个", list.len());
                Some(list)
            })
            .as_ref()
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn open(
        &self,
        codec: &str,
        path: &Path,
        size: (u32, u32),
        fps: f64,
    ) -> Result<Box<dyn Encoder>> {
        if let Some(list) = self.available() {
            if !list.contains(codec) {
                return Err(PipelineError::encoder(format!("ffmpeg 不支持编码器 {}", codec)));
            }
        }

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{}x{}", size.0, size.1))
            .arg("-r")
            .arg(format!("{:.3}", fps))
            .arg("-i")
            .arg("-")
            .arg("-an")
            .arg("-c:v")
            .arg(codec)
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        debug!("启动编码器: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::encoder(format!("无法启动ffmpeg: {}", e)))?;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(PipelineError::encoder(format!("ffmpeg 立即退出: {}", status)));
        }
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PipelineError::encoder("无法获取ffmpeg输入"));
        };

        Ok(Box::new(FfmpegEncoder {
            child: Some(child),
            stdin: Some(stdin),
            size,
            path: path.to_path_buf(),
        }))
    }
}

/// 单个 ffmpeg 编码进程
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    size: (u32, u32),
    path: PathBuf,
}

impl Encoder for FfmpegEncoder {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(PipelineError::encoder("编码器已关闭"));
        };
        if frame.size() == self.size {
            stdin.write_all(frame.as_raw())?;
        } else {
            let resized = imageops::resize(frame.image(), self.size.0, self.size.1, FilterType::Triangle);
            stdin.write_all(resized.as_raw())?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.close()
    }
}

impl FfmpegEncoder {
    fn close(&mut self) -> Result<()> {
        // 关闭 stdin 让 ffmpeg 写完文件尾
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(PipelineError::encoder(format!(
                    "ffmpeg 退出异常 ({}): {}",
                    self.path.display(),
                    status
                )));
            }
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.close() {
                warn!("⚠️ {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V.S... mpeg4                MPEG-4 part 2
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn parses_video_encoders_only() {
        let list = parse_video_encoders(LISTING);
        assert!(list.contains("libx264"));
        assert!(list.contains("mpeg4"));
        assert!(!list.contains("aac"));
        assert!(!list.contains("libopenh264"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn missing_ffmpeg_fails_to_open() {
        let factory = FfmpegEncoderFactory::new("ffmpeg-does-not-exist-here");
        let dir = tempfile::tempdir().unwrap();
        let result = factory.open("mpeg4", &dir.path().join("x.mp4"), (4, 4), 20.0);
        assert!(matches!(result, Err(PipelineError::Encoder(_))));
    }
}
