//! ffprobe 元数据读取

use crate::error::PipelineError;
use serde::Deserialize;
use std::path::Path;
use std::process::{Command, Stdio};

/// 视频流元数据
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// 声明帧率, 无法解析或为 0 时为 None
    pub frame_rate: Option<f64>,
    pub frame_count: Option<u64>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// 解析 ffprobe 的帧率字符串 ("30000/1001", "25", "0/0")
pub fn parse_frame_rate(text: &str) -> Option<f64> {
    let text = text.trim();
    let fps = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => text.parse().ok()?,
    };
    if fps.is_finite() && fps > 0.0 {
        Some(fps)
    } else {
        None
    }
}

/// 解析 `ffprobe -of json` 的输出, 取第一条视频流
pub fn parse_probe_json(json: &str) -> Result<StreamInfo, String> {
    let output: ProbeOutput =
        serde_json::from_str(json).map_err(|e| format!("ffprobe输出解析失败: {}", e))?;
    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "没有视频流".to_string())?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("视频流缺少分辨率".to_string()),
    };
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|n| *n > 0);
    Ok(StreamInfo {
        width,
        height,
        frame_rate,
        frame_count,
    })
}

/// 调用 ffprobe 读取文件的第一条视频流
pub fn probe_file(ffprobe: &str, path: &Path) -> Result<StreamInfo, PipelineError> {
    let name = path.display().to_string();
    if !path.is_file() {
        return Err(PipelineError::source_unavailable(name, "文件不存在"));
    }

    let output = Command::new(ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height,avg_frame_rate,r_frame_rate,nb_frames")
        .arg("-of")
        .arg("json")
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| PipelineError::source_unavailable(&name, format!("无法启动ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::source_unavailable(name, stderr.trim().to_string()));
    }

    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
        .map_err(|reason| PipelineError::source_unavailable(name, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_strings() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn probe_json_with_declared_rate() {
        let json = r#"{"streams":[{"width":1280,"height":720,"avg_frame_rate":"25/1","r_frame_rate":"25/1","nb_frames":"250"}]}"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.frame_rate, Some(25.0));
        assert_eq!(info.frame_count, Some(250));
    }

    #[test]
    fn probe_json_without_rate_or_count() {
        let json = r#"{"streams":[{"width":640,"height":480,"avg_frame_rate":"0/0","r_frame_rate":"0/0"}]}"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.frame_rate, None);
        assert_eq!(info.frame_count, None);
    }

    #[test]
    fn probe_json_without_video_stream() {
        assert!(parse_probe_json(r#"{"streams":[]}"#).is_err());
        assert!(parse_probe_json(r#"{}"#).is_err());
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = probe_file("ffprobe", Path::new("/definitely/not/here.mp4")).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }
}
