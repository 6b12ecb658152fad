//! 批量检测: 逐帧检测整个视频文件并写出标注后的视频
//!
//! 单线程同步执行, 不经过交接通道。每帧之后调用一次 `yield_now`,
//! 宿主可以在里面处理界面事件。

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::config::BatchConfig;
use crate::error::PipelineError;
use crate::input::{FrameSource, SourceDescriptor, SourceOpener};
use crate::pipeline::InferenceModel;
use crate::presentation::Presenter;
use crate::recording::{timestamped_output, EncoderChain, RecordingSession};

/// 批量检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub output_path: PathBuf,
    pub encoder_id: String,
    pub processed: u64,
    /// 声明的总帧数, 未知为 0
    pub total: u64,
    pub failed: u64,
}

/// 解码尚未跟上时的等待
const DECODE_WAIT: Duration = Duration::from_millis(2);

/// 检测 `input` 并输出到 `config.output_dir/<prefix>_<ts>.mp4`
///
/// 编码器在读第一帧之前按输入的尺寸和原生帧率打开, 打不开则直接中止。
/// 无论成功与否, 视频源和编码器都会被释放。
pub fn detect_file<M: InferenceModel + ?Sized>(
    input: &Path,
    model: &mut M,
    opener: &dyn SourceOpener,
    encoders: &EncoderChain,
    config: &BatchConfig,
    presenter: &dyn Presenter,
    mut yield_now: impl FnMut(),
) -> Result<BatchReport, PipelineError> {
    let descriptor = SourceDescriptor::File(input.to_path_buf());
    let mut source = match opener.open(&descriptor) {
        Ok(source) => source,
        Err(e) => {
            debug!("{}", e);
            presenter.log("❌ 无法打开视频文件");
            return Err(e);
        }
    };

    let output_path = match timestamped_output(&config.output_dir, &config.file_prefix) {
        Ok(path) => path,
        Err(e) => {
            source.close();
            presenter.log(&format!("❌ 无法创建输出目录: {}", e));
            return Err(e.into());
        }
    };

    // 编码器按输入的尺寸与原生帧率在处理前打开
    let Some(size) = source.dimensions() else {
        source.close();
        let e = PipelineError::source_unavailable(descriptor.display_name(), "无法读取视频尺寸");
        presenter.log(&format!("❌ 视频检测中止: {}", e));
        return Err(e);
    };
    let fps = source.native_frame_rate();
    let mut session = match encoders.open_with_fallback(&output_path, size, fps) {
        Ok(session) => session,
        Err(e) => {
            source.close();
            presenter.log(&format!("❌ 视频检测中止: {}", e));
            return Err(e);
        }
    };
    debug!(
        "批量检测输出 {}x{} @ {:.2} fps ({})",
        size.0,
        size.1,
        fps,
        session.encoder_id()
    );

    let mut report = BatchReport {
        output_path,
        encoder_id: session.encoder_id().to_string(),
        processed: 0,
        total: source.frame_count().unwrap_or(0),
        failed: 0,
    };
    presenter.log(&format!("🚀 开始处理视频：{}", descriptor.display_name()));
    presenter.log(&format!("输出路径：{}", report.output_path.display()));

    let result = process_frames(
        source.as_mut(),
        model,
        &mut session,
        config,
        presenter,
        &mut report,
        &mut yield_now,
    );

    source.close();
    session.finish();

    match result {
        Ok(()) => {
            presenter.log("✅ 视频检测完成并保存");
            Ok(report)
        }
        Err(e) => {
            presenter.log(&format!("❌ 视频检测中止: {}", e));
            Err(e)
        }
    }
}

fn process_frames<M: InferenceModel + ?Sized>(
    source: &mut dyn FrameSource,
    model: &mut M,
    session: &mut RecordingSession,
    config: &BatchConfig,
    presenter: &dyn Presenter,
    report: &mut BatchReport,
    yield_now: &mut impl FnMut(),
) -> Result<(), PipelineError> {
    loop {
        let frame = match source.read().into_result() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                yield_now();
                thread::sleep(DECODE_WAIT);
                continue;
            }
            Err(PipelineError::StreamEnded) => return Ok(()),
            Err(e) => return Err(e),
        };

        let output = match model.infer(&frame) {
            Ok(inference) => inference.annotated,
            Err(e) => {
                warn!("第 {} 帧推理失败: {}", report.processed + 1, e);
                presenter.log(&format!("❌ {}", e));
                report.failed += 1;
                frame
            }
        };

        session.write(&output)?;
        report.processed += 1;

        if config.progress_every > 0 && report.processed % config.progress_every == 0 {
            presenter.log(&format!("已处理 {}/{} 帧", report.processed, report.total));
        }
        yield_now();
    }
}
