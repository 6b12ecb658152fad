/// 录制系统 (Recording Sink)
///
/// 状态机: Closed → Opening → Open → Closed
/// - `request_start`: 只登记意图 (Closed → Opening), 不创建设备
/// - 第一次写帧时才按帧尺寸打开编码器, 按候选列表依次尝试
/// - 写帧与启停共用同一把锁, 停止过程中不会穿插写入
pub mod ffmpeg;

pub use ffmpeg::FfmpegEncoderFactory;

use crate::config::RecordingConfig;
use crate::detection::Frame;
use crate::error::{PipelineError, Result};
use crate::pipeline::state::PipelineState;
use crate::presentation::Presenter;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// 录制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Closed,
    Opening,
    Open,
}

/// 已打开的视频编码器
pub trait Encoder: Send {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// 刷新并释放设备
    fn finish(self: Box<Self>) -> Result<()>;
}

/// 按编码器标识创建编码器
pub trait EncoderFactory: Send + Sync {
    fn open(&self, codec: &str, path: &Path, size: (u32, u32), fps: f64)
        -> Result<Box<dyn Encoder>>;
}

/// 编码器候选链: 按固定顺序尝试, 第一个成功的胜出
#[derive(Clone)]
pub struct EncoderChain {
    factory: Arc<dyn EncoderFactory>,
    codecs: Vec<String>,
}

impl EncoderChain {
    pub fn new(factory: Arc<dyn EncoderFactory>, codecs: Vec<String>) -> Self {
        Self { factory, codecs }
    }

    pub fn codecs(&self) -> &[String] {
        &self.codecs
    }

    pub fn open_with_fallback(
        &self,
        path: &Path,
        size: (u32, u32),
        fps: f64,
    ) -> Result<RecordingSession> {
        let mut tried = Vec::with_capacity(self.codecs.len());
        for codec in &self.codecs {
            match self.factory.open(codec, path, size, fps) {
                Ok(encoder) => {
                    info!("🎞️ 编码器 {} 已打开: {}", codec, path.display());
                    return Ok(RecordingSession {
                        output_path: path.to_path_buf(),
                        encoder_id: codec.clone(),
                        frame_count: 0,
                        encoder,
                    });
                }
                Err(e) => {
                    warn!("⚠️ 编码器 {} 打开失败: {}", codec, e);
                    tried.push(codec.clone());
                }
            }
        }
        Err(PipelineError::EncoderUnavailable { tried })
    }
}

/// 一次录制会话
pub struct RecordingSession {
    output_path: PathBuf,
    encoder_id: String,
    frame_count: u64,
    encoder: Box<dyn Encoder>,
}

impl RecordingSession {
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn encoder_id(&self) -> &str {
        &self.encoder_id
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        self.encoder.write(frame)?;
        self.frame_count += 1;
        Ok(())
    }

    /// 收尾, 返回本次会话写入的帧数
    pub fn finish(self) -> u64 {
        let count = self.frame_count;
        if let Err(e) = self.encoder.finish() {
            warn!("⚠️ 关闭编码器失败 ({}): {}", self.output_path.display(), e);
        }
        count
    }
}

/// 生成带时间戳的输出路径 `dir/prefix_YYYYMMDD_HHMMSS.mp4`, 目录按需创建
pub fn timestamped_output(dir: &Path, prefix: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    Ok(dir.join(format!("{}_{}.mp4", prefix, ts)))
}

struct SinkInner {
    state: RecorderState,
    session: Option<RecordingSession>,
}

/// 录制器: 控制线程启停, 推理线程写帧
pub struct RecordingSink {
    inner: Mutex<SinkInner>,
    chain: EncoderChain,
    output_dir: PathBuf,
    file_prefix: String,
    fps: f64,
    state: Arc<PipelineState>,
    presenter: Arc<dyn Presenter>,
    sessions_opened: AtomicU64,
}

impl RecordingSink {
    pub fn new(
        chain: EncoderChain,
        config: &RecordingConfig,
        state: Arc<PipelineState>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                state: RecorderState::Closed,
                session: None,
            }),
            chain,
            output_dir: config.output_dir.clone(),
            file_prefix: config.file_prefix.clone(),
            fps: config.fps,
            state,
            presenter,
            sessions_opened: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> RecorderState {
        self.lock().state
    }

    /// 累计成功打开的会话数
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    /// 登记录制意图; 已有会话或没有视频源时返回 false
    pub fn request_start(&self, source_active: bool) -> bool {
        if !source_active {
            return false;
        }
        let mut inner = self.lock();
        if inner.state != RecorderState::Closed {
            return false;
        }
        inner.state = RecorderState::Opening;
        debug!("录制器: Closed → Opening");
        true
    }

    /// 写入一帧 (推理线程); 返回是否真的写入
    ///
    /// Opening 状态下先按帧尺寸打开编码器。候选全部失败或写入失败时回到 Closed,
    /// 清除录制标志, 只输出一行失败日志。
    pub fn write_frame(&self, frame: &Frame) -> bool {
        let mut inner = self.lock();

        if inner.state == RecorderState::Opening {
            let opened = timestamped_output(&self.output_dir, &self.file_prefix)
                .map_err(PipelineError::from)
                .and_then(|path| self.chain.open_with_fallback(&path, frame.size(), self.fps));
            match opened {
                Ok(session) => {
                    self.presenter.log(&format!(
                        "⏺️ 使用 {} 编码器开始录制: {}",
                        session.encoder_id(),
                        session.output_path().display()
                    ));
                    inner.session = Some(session);
                    inner.state = RecorderState::Open;
                    self.sessions_opened.fetch_add(1, Ordering::Relaxed);
                    self.state.set_recorded_frame_count(0);
                    debug!("录制器: Opening → Open");
                }
                Err(e) => {
                    inner.state = RecorderState::Closed;
                    self.state.set_recording(false);
                    self.presenter.log(&format!("❌ {}", e));
                    return false;
                }
            }
        }

        if inner.state != RecorderState::Open {
            return false;
        }
        let Some(session) = inner.session.as_mut() else {
            return false;
        };
        match session.write(frame) {
            Ok(()) => {
                self.state.set_recorded_frame_count(session.frame_count());
                true
            }
            // 编码进程已经退出: 结束会话, 复位录制标志
            Err(e) => {
                warn!("⚠️ 录制写入失败: {}", e);
                if let Some(session) = inner.session.take() {
                    self.state.set_recorded_frame_count(session.finish());
                }
                inner.state = RecorderState::Closed;
                self.state.set_recording(false);
                self.presenter.log(&format!("❌ 录制中断: {}", e));
                false
            }
        }
    }

    /// 刷新并关闭会话, 返回本次录制的帧数 (没有会话时为 0)
    pub fn stop(&self) -> u64 {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = RecorderState::Closed;
        let count = match inner.session.take() {
            Some(session) => session.finish(),
            None => 0,
        };
        if previous != RecorderState::Closed {
            debug!("录制器: {:?} → Closed ({} 帧)", previous, count);
        }
        self.state.set_recorded_frame_count(count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::ConsolePresenter;
    use std::sync::Mutex as StdMutex;

    /// 只记录帧数的编码器
    struct CountingEncoder {
        written: Arc<StdMutex<Vec<(u32, u32)>>>,
    }

    impl Encoder for CountingEncoder {
        fn write(&mut self, frame: &Frame) -> Result<()> {
            self.written.lock().unwrap().push(frame.size());
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    struct Factory {
        working: Vec<&'static str>,
        attempts: StdMutex<Vec<String>>,
        written: Arc<StdMutex<Vec<(u32, u32)>>>,
    }

    impl EncoderFactory for Factory {
        fn open(
            &self,
            codec: &str,
            _path: &Path,
            _size: (u32, u32),
            _fps: f64,
        ) -> Result<Box<dyn Encoder>> {
            self.attempts.lock().unwrap().push(codec.to_string());
            if self.working.contains(&codec) {
                Ok(Box::new(CountingEncoder {
                    written: self.written.clone(),
                }))
            } else {
                Err(PipelineError::encoder(format!("{} missing", codec)))
            }
        }
    }

    fn factory(working: Vec<&'static str>) -> Arc<Factory> {
        Arc::new(Factory {
            working,
            attempts: StdMutex::new(Vec::new()),
            written: Arc::new(StdMutex::new(Vec::new())),
        })
    }

    fn codecs() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn chain_takes_first_working_encoder() {
        let f = factory(vec!["c"]);
        let chain = EncoderChain::new(f.clone(), codecs());
        let session = chain
            .open_with_fallback(Path::new("out.mp4"), (8, 8), 20.0)
            .unwrap();
        assert_eq!(session.encoder_id(), "c");
        assert_eq!(*f.attempts.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn chain_reports_every_tried_encoder() {
        let chain = EncoderChain::new(factory(vec![]), codecs());
        match chain.open_with_fallback(Path::new("out.mp4"), (8, 8), 20.0) {
            Err(PipelineError::EncoderUnavailable { tried }) => assert_eq!(tried, codecs()),
            _ => panic!("expected EncoderUnavailable"),
        }
    }

    #[test]
    fn sink_opens_lazily_with_frame_size() {
        let dir = tempfile::tempdir().unwrap();
        let f = factory(vec!["a"]);
        let config = RecordingConfig {
            output_dir: dir.path().join("rec"),
            ..RecordingConfig::default()
        };
        let state = Arc::new(PipelineState::new());
        let sink = RecordingSink::new(
            EncoderChain::new(f.clone(), codecs()),
            &config,
            state.clone(),
            Arc::new(ConsolePresenter),
        );

        assert!(!sink.request_start(false));
        assert!(sink.request_start(true));
        assert!(!sink.request_start(true));
        assert_eq!(sink.state(), RecorderState::Opening);
        assert!(f.attempts.lock().unwrap().is_empty());

        assert!(sink.write_frame(&Frame::filled(6, 4, [0, 0, 0])));
        assert!(sink.write_frame(&Frame::filled(6, 4, [0, 0, 0])));
        assert_eq!(sink.state(), RecorderState::Open);
        assert_eq!(state.recorded_frame_count(), 2);
        assert!(dir.path().join("rec").is_dir());

        assert_eq!(sink.stop(), 2);
        assert_eq!(sink.state(), RecorderState::Closed);
        assert_eq!(*f.written.lock().unwrap(), vec![(6, 4), (6, 4)]);
        assert!(!sink.write_frame(&Frame::filled(6, 4, [0, 0, 0])));
    }

    #[test]
    fn stop_without_session_reports_zero() {
        let sink = RecordingSink::new(
            EncoderChain::new(factory(vec!["a"]), codecs()),
            &RecordingConfig::default(),
            Arc::new(PipelineState::new()),
            Arc::new(ConsolePresenter),
        );
        assert_eq!(sink.stop(), 0);
        assert!(sink.request_start(true));
        assert_eq!(sink.stop(), 0);
        assert_eq!(sink.sessions_opened(), 0);
    }

    #[test]
    fn output_name_carries_prefix_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = timestamped_output(&dir.path().join("nested"), "recording").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let re = regex::Regex::new(r"^recording_\d{8}_\d{6}\.mp4$").unwrap();
        assert!(re.is_match(&name), "{}", name);
        assert!(dir.path().join("nested").is_dir());
    }
}
