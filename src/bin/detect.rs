/// 视频文件批量检测 (命令行)
///
/// 逐帧检测输入视频, 输出 detected_videos/detected_<时间戳>.mp4
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use yolo_live::batch;
use yolo_live::config::{AppConfig, DetectArgs};
use yolo_live::input::FfmpegSourceOpener;
use yolo_live::models::DetectionModel;
use yolo_live::presentation::ConsolePresenter;
use yolo_live::recording::{EncoderChain, FfmpegEncoderFactory};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = DetectArgs::parse();
    let mut config = AppConfig::load(&args.config);
    args.apply(&mut config);

    let mut model = DetectionModel::load(&config.model)?;
    let opener = FfmpegSourceOpener::native_size(&config.capture);
    let chain = EncoderChain::new(
        Arc::new(FfmpegEncoderFactory::new(config.capture.ffmpeg.clone())),
        config.recording.codecs.clone(),
    );

    let report = batch::detect_file(
        &args.input,
        &mut model,
        &opener,
        &chain,
        &config.batch,
        &ConsolePresenter,
        || {},
    )
    .with_context(|| format!("视频检测失败: {}", args.input.display()))?;

    println!(
        "📊 共处理 {} 帧 (推理失败 {} 帧), 编码器: {}",
        report.processed,
        report.failed,
        report.encoder_id
    );
    println!("💾 输出文件: {}", report.output_path.display());
    Ok(())
}
