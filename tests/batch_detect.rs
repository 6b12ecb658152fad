mod common;

use std::path::Path;
use std::sync::Arc;

use common::{codecs, Behaviour, CollectingPresenter, FakeEncoderFactory, FakeOpener, ScriptedModel};
use yolo_live::batch::detect_file;
use yolo_live::config::BatchConfig;
use yolo_live::error::PipelineError;
use yolo_live::recording::EncoderChain;

fn batch_config(dir: &Path) -> BatchConfig {
    BatchConfig {
        output_dir: dir.join("detected_videos"),
        progress_every: 3,
        ..BatchConfig::default()
    }
}

#[test]
fn every_frame_is_annotated_and_written() {
    let dir = tempfile::tempdir().unwrap();
    let opener = FakeOpener::file(7, Some(25.0));
    let encoders = FakeEncoderFactory::new(&["libx264"]);
    let chain = EncoderChain::new(encoders.clone(), codecs());
    let presenter = CollectingPresenter::new();
    let mut model = ScriptedModel::detecting();
    let mut yields = 0;

    let report = detect_file(
        Path::new("input/traffic.mp4"),
        &mut model,
        &opener,
        &chain,
        &batch_config(dir.path()),
        presenter.as_ref(),
        || yields += 1,
    )
    .unwrap();

    assert_eq!(report.processed, 7);
    assert_eq!(report.total, 7);
    assert_eq!(report.failed, 0);
    assert_eq!(report.encoder_id, "libx264");
    assert!(report.output_path.starts_with(dir.path().join("detected_videos")));
    let name = report.output_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("detected_") && name.ends_with(".mp4"));

    assert_eq!(encoders.opened(), vec![(common::FRAME_SIZE, 25.0)]);
    assert_eq!(encoders.written(), 7);
    assert_eq!(encoders.finished(), 1);
    assert_eq!(opener.closes(), 1);
    assert!(yields >= 7);

    assert_eq!(presenter.count("🚀 开始处理视频：traffic.mp4"), 1);
    assert_eq!(presenter.count("输出路径："), 1);
    assert_eq!(presenter.count("已处理 3/7 帧"), 1);
    assert_eq!(presenter.count("已处理 6/7 帧"), 1);
    assert_eq!(presenter.count("已处理 "), 2);
    assert_eq!(presenter.count("✅ 视频检测完成并保存"), 1);
}

#[test]
fn failed_frames_are_written_unannotated() {
    let dir = tempfile::tempdir().unwrap();
    let opener = FakeOpener::file(4, None);
    let encoders = FakeEncoderFactory::new(&["mpeg4"]);
    let chain = EncoderChain::new(encoders.clone(), codecs());
    let presenter = CollectingPresenter::new();
    let mut model = ScriptedModel::new(&[Behaviour::Detect, Behaviour::Fail]);

    let report = detect_file(
        Path::new("clip.mp4"),
        &mut model,
        &opener,
        &chain,
        &batch_config(dir.path()),
        presenter.as_ref(),
        || {},
    )
    .unwrap();

    assert_eq!(report.processed, 4);
    assert_eq!(report.failed, 1);
    // 未声明帧率按 30 输出
    assert_eq!(encoders.opened(), vec![(common::FRAME_SIZE, 30.0)]);
    assert_eq!(encoders.written(), 4);
    assert_eq!(presenter.count("❌ 推理失败"), 1);
}

#[test]
fn unopenable_input_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let encoders = FakeEncoderFactory::new(&["mpeg4"]);
    let chain = EncoderChain::new(encoders.clone(), codecs());
    let presenter = CollectingPresenter::new();
    let mut model = ScriptedModel::detecting();

    let err = detect_file(
        Path::new("missing.mp4"),
        &mut model,
        &FakeOpener::failing(),
        &chain,
        &batch_config(dir.path()),
        presenter.as_ref(),
        || {},
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    assert_eq!(presenter.count("❌ 无法打开视频文件"), 1);
    assert!(encoders.attempts().is_empty());
}

#[test]
fn source_is_released_when_no_encoder_opens() {
    let dir = tempfile::tempdir().unwrap();
    let opener = FakeOpener::file(5, Some(30.0));
    let encoders = FakeEncoderFactory::new(&[]);
    let chain = EncoderChain::new(encoders.clone(), codecs());
    let presenter = CollectingPresenter::new();
    let mut model = ScriptedModel::detecting();

    let err = detect_file(
        Path::new("clip.mp4"),
        &mut model,
        &opener,
        &chain,
        &batch_config(dir.path()),
        presenter.as_ref(),
        || {},
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::EncoderUnavailable { ref tried } if tried.len() == 3));
    assert_eq!(opener.closes(), 1);
    assert_eq!(presenter.count("❌ 视频检测中止"), 1);
    assert_eq!(presenter.count("✅"), 0);
    assert_eq!(presenter.count("🚀 开始处理视频"), 0);
    assert_eq!(model.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(encoders.finished(), 0);
}

#[test]
fn empty_input_still_writes_an_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let opener = FakeOpener::file(0, Some(30.0));
    let encoders = FakeEncoderFactory::new(&["mpeg4"]);
    let chain = EncoderChain::new(encoders.clone(), codecs());
    let presenter = Arc::new(CollectingPresenter::default());
    let mut model = ScriptedModel::detecting();

    let report = detect_file(
        Path::new("empty.mp4"),
        &mut model,
        &opener,
        &chain,
        &batch_config(dir.path()),
        presenter.as_ref(),
        || {},
    )
    .unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(report.encoder_id, "mpeg4");
    assert_eq!(encoders.attempts(), vec!["mpeg4".to_string()]);
    assert_eq!(encoders.written(), 0);
    assert_eq!(encoders.finished(), 1);
    assert_eq!(opener.closes(), 1);
    assert_eq!(presenter.count("输出路径："), 1);
    assert_eq!(presenter.count("✅ 视频检测完成并保存"), 1);
}
