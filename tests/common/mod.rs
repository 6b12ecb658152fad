//! 集成测试共用的假视频源、假编码器、假模型与收集型显示端
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use yolo_live::detection::{Bbox, Detection, Frame, Inference};
use yolo_live::error::{PipelineError, Result};
use yolo_live::input::{FrameSource, ReadOutcome, SourceDescriptor, SourceOpener};
use yolo_live::pipeline::{InferenceModel, SourceKind};
use yolo_live::presentation::Presenter;
use yolo_live::recording::{Encoder, EncoderFactory};

pub const FRAME_SIZE: (u32, u32) = (8, 6);

// ========== 视频源 ==========

/// 文件: 给定帧数后结束; 摄像头: 每次都有帧
pub struct FakeSource {
    kind: SourceKind,
    remaining: u64,
    total: u64,
    fps: Option<f64>,
    next_index: u64,
    open: bool,
    closes: Arc<AtomicUsize>,
}

impl FrameSource for FakeSource {
    fn read(&mut self) -> ReadOutcome {
        if !self.open {
            return ReadOutcome::EndOfStream;
        }
        if self.kind == SourceKind::File {
            if self.remaining == 0 {
                return ReadOutcome::EndOfStream;
            }
            self.remaining -= 1;
        }
        let tag = (self.next_index % 251) as u8;
        let image = image::RgbImage::from_pixel(FRAME_SIZE.0, FRAME_SIZE.1, image::Rgb([tag, 0, 0]));
        let frame = Frame::with_index(image, self.next_index);
        self.next_index += 1;
        ReadOutcome::Frame(frame)
    }

    fn declared_frame_rate(&self) -> Option<f64> {
        self.fps.filter(|fps| *fps > 0.0)
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(FRAME_SIZE)
    }

    fn frame_count(&self) -> Option<u64> {
        (self.kind == SourceKind::File).then_some(self.total)
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Clone)]
pub struct FakeOpener {
    pub frames: u64,
    pub fps: Option<f64>,
    pub fail: bool,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl FakeOpener {
    pub fn file(frames: u64, fps: Option<f64>) -> Self {
        Self {
            frames,
            fps,
            fail: false,
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn camera() -> Self {
        Self::file(0, Some(30.0))
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::file(0, None)
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl SourceOpener for FakeOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>> {
        if self.fail {
            return Err(PipelineError::source_unavailable(
                descriptor.display_name(),
                "device busy",
            ));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            kind: descriptor.kind(),
            remaining: self.frames,
            total: self.frames,
            fps: self.fps,
            next_index: 0,
            open: true,
            closes: self.closes.clone(),
        }))
    }
}

// ========== 编码器 ==========

pub struct FakeEncoder {
    fail_writes: bool,
    written: Arc<AtomicU64>,
    finished: Arc<AtomicUsize>,
}

impl Encoder for FakeEncoder {
    fn write(&mut self, _frame: &Frame) -> Result<()> {
        if self.fail_writes {
            return Err(PipelineError::encoder("broken pipe"));
        }
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 只有 `working` 里的编码器能打开
pub struct FakeEncoderFactory {
    working: Vec<String>,
    pub attempts: Mutex<Vec<String>>,
    /// 成功打开时的 (尺寸, 帧率)
    pub opened: Mutex<Vec<((u32, u32), f64)>>,
    fail_writes: bool,
    pub written: Arc<AtomicU64>,
    pub finished: Arc<AtomicUsize>,
}

impl FakeEncoderFactory {
    fn build(working: &[&str]) -> Self {
        Self {
            working: working.iter().map(|s| s.to_string()).collect(),
            attempts: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            fail_writes: false,
            written: Arc::new(AtomicU64::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn new(working: &[&str]) -> Arc<Self> {
        Arc::new(Self::build(working))
    }

    /// 能打开, 但每次写入都失败 (编码进程启动后退出)
    pub fn failing_writes(working: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_writes: true,
            ..Self::build(working)
        })
    }

    pub fn opened(&self) -> Vec<((u32, u32), f64)> {
        self.opened.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn open(
        &self,
        codec: &str,
        _path: &Path,
        size: (u32, u32),
        fps: f64,
    ) -> Result<Box<dyn Encoder>> {
        self.attempts.lock().unwrap().push(codec.to_string());
        if self.working.iter().any(|c| c == codec) {
            self.opened.lock().unwrap().push((size, fps));
            Ok(Box::new(FakeEncoder {
                fail_writes: self.fail_writes,
                written: self.written.clone(),
                finished: self.finished.clone(),
            }))
        } else {
            Err(PipelineError::encoder(format!("{} not available", codec)))
        }
    }
}

pub fn codecs() -> Vec<String> {
    vec!["mpeg4".into(), "libx264".into(), "libopenh264".into()]
}

// ========== 模型 ==========

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Detect,
    Fail,
    Panic,
}

/// 按脚本依次返回; 脚本用完后一直正常检测
pub struct ScriptedModel {
    script: VecDeque<Behaviour>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new(script: &[Behaviour]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn detecting() -> Self {
        Self::new(&[])
    }
}

impl InferenceModel for ScriptedModel {
    fn infer(&mut self, frame: &Frame) -> Result<Inference> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front().unwrap_or(Behaviour::Detect) {
            Behaviour::Detect => Ok(Inference {
                annotated: frame.derive(frame.image().clone()),
                detections: vec![Detection::new(
                    "person",
                    0,
                    0.9,
                    Bbox::new(1.0, 1.0, 4.0, 3.0),
                )],
            }),
            Behaviour::Fail => Err(PipelineError::inference("tensor shape mismatch")),
            Behaviour::Panic => panic!("index out of bounds"),
        }
    }
}

// ========== 显示端 ==========

#[derive(Default)]
pub struct CollectingPresenter {
    lines: Mutex<Vec<String>>,
    alerts: Mutex<Vec<(String, String)>>,
    pub raw: AtomicUsize,
    pub annotated: AtomicUsize,
    pub clears: AtomicUsize,
}

impl CollectingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl Presenter for CollectingPresenter {
    fn show_raw(&self, _frame: &Frame) {
        self.raw.fetch_add(1, Ordering::SeqCst);
    }

    fn show_annotated(&self, _frame: Frame) {
        self.annotated.fetch_add(1, Ordering::SeqCst);
    }

    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn alert(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}
