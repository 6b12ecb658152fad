mod control_panel;

pub use control_panel::{ControlPanel, PanelAction, PanelStatus};

use crate::batch;
use crate::config::AppConfig;
use crate::detection::Frame;
use crate::input::FfmpegSourceOpener;
use crate::models::DetectionModel;
use crate::pipeline::Pipeline;
use crate::presentation::{ChannelPresenter, Presenter, UiEvent, UiReceiver};
use crate::recording::{EncoderChain, FfmpegEncoderFactory};
use macroquad::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// 画面通道容量: 渲染端每帧只画最新的一张
const FRAME_QUEUE: usize = 4;
/// 视频区域与窗口边缘的间距
const MARGIN: f32 = 10.0;

/// 实时检测窗口: 左侧原始画面, 右侧标注画面, 下方控制面板与日志
pub struct Renderer {
    config: AppConfig,
    pipeline: Pipeline,
    presenter: Arc<ChannelPresenter>,
    ui_rx: UiReceiver,
    encoders: Arc<FfmpegEncoderFactory>,

    raw_texture: Option<Texture2D>,
    annotated_texture: Option<Texture2D>,
    batch_job: Option<JoinHandle<()>>,

    // 中文字体
    chinese_font: Option<Font>,

    render_count: u64,
    render_last: Instant,
    show_control_panel: bool,

    control_panel: ControlPanel,
}

impl Renderer {
    pub fn new(config: AppConfig, model: DetectionModel) -> anyhow::Result<Self> {
        println!("🎨 渲染器启动");
        let (presenter, ui_rx) = ChannelPresenter::new(FRAME_QUEUE);
        let presenter = Arc::new(presenter);
        let encoders = Arc::new(FfmpegEncoderFactory::new(config.capture.ffmpeg.clone()));

        let pipeline = Pipeline::start(
            &config,
            model,
            Box::new(FfmpegSourceOpener::new(&config.capture)),
            encoders.clone(),
            presenter.clone(),
        )?;

        let chinese_font = match std::fs::read(&config.model.font_path) {
            Ok(bytes) => match load_ttf_font_from_bytes(&bytes) {
                Ok(font) => {
                    println!("✅ 中文字体加载成功");
                    Some(font)
                }
                Err(e) => {
                    println!("⚠️ 中文字体加载失败: {:?}", e);
                    None
                }
            },
            Err(_) => {
                println!(
                    "⚠️ 未找到中文字体文件: {}",
                    config.model.font_path.display()
                );
                None
            }
        };

        Ok(Self {
            config,
            pipeline,
            presenter,
            ui_rx,
            encoders,
            raw_texture: None,
            annotated_texture: None,
            batch_job: None,
            chinese_font,
            render_count: 0,
            render_last: Instant::now(),
            show_control_panel: true,
            control_panel: ControlPanel::new(String::new()),
        })
    }

    /// 取出流水线消息, 驱动采集节拍
    pub fn update(&mut self) {
        let mut latest_raw = None;
        let mut latest_annotated = None;

        for event in self.ui_rx.drain() {
            match event {
                UiEvent::Raw(frame) => latest_raw = Some(frame),
                UiEvent::Annotated(frame) => latest_annotated = Some(frame),
                UiEvent::Log(line) => self.control_panel.push_log(line),
                UiEvent::Alert { title, message } => self.control_panel.set_alert(title, message),
                UiEvent::Clear => {
                    latest_raw = None;
                    latest_annotated = None;
                    self.raw_texture = None;
                    self.annotated_texture = None;
                }
            }
        }

        if let Some(frame) = latest_raw {
            upload(&mut self.raw_texture, &frame);
        }
        if let Some(frame) = latest_annotated {
            upload(&mut self.annotated_texture, &frame);
        }

        self.pipeline.controller().tick(Instant::now());

        if self.batch_job.as_ref().is_some_and(|job| job.is_finished()) {
            if let Some(job) = self.batch_job.take() {
                let _ = job.join();
            }
        }
    }

    fn status(&self) -> PanelStatus {
        let snapshot = self.pipeline.state().snapshot();
        PanelStatus {
            source_kind: snapshot.source_kind,
            is_recording: snapshot.is_recording,
            recorded_frames: snapshot.recorded_frame_count,
            batch_running: self.batch_job.is_some(),
            dropped_frames: self.pipeline.handoff().dropped(),
        }
    }

    pub fn draw(&mut self) {
        clear_background(Color::from_rgba(20, 20, 30, 255));

        let (w, h) = self.config.capture.display_size();
        let pane_w = ((screen_width() - MARGIN * 3.0) / 2.0).max(1.0);
        let pane_h = pane_w * h as f32 / w.max(1) as f32;

        let panes = [
            (MARGIN, &self.raw_texture, "原始画面"),
            (MARGIN * 2.0 + pane_w, &self.annotated_texture, "检测画面"),
        ];
        for (x, texture, title) in panes {
            draw_rectangle_lines(
                x - 2.0,
                MARGIN - 2.0,
                pane_w + 4.0,
                pane_h + 4.0,
                2.0,
                Color::from_rgba(215, 226, 249, 255),
            );
            match texture {
                Some(texture) => draw_texture_ex(
                    texture,
                    x,
                    MARGIN,
                    WHITE,
                    DrawTextureParams {
                        dest_size: Some(vec2(pane_w, pane_h)),
                        ..Default::default()
                    },
                ),
                None => {
                    let text_params = TextParams {
                        font: self.chinese_font.as_ref(),
                        font_size: 24,
                        color: GRAY,
                        ..Default::default()
                    };
                    let dims = measure_text(title, self.chinese_font.as_ref(), 24, 1.0);
                    draw_text_ex(
                        title,
                        x + (pane_w - dims.width) / 2.0,
                        MARGIN + pane_h / 2.0,
                        text_params,
                    );
                }
            }
        }

        // FPS统计
        self.render_count += 1;
        let now = Instant::now();
        if now.duration_since(self.render_last).as_secs() >= 1 {
            self.control_panel.render_fps =
                self.render_count as f64 / now.duration_since(self.render_last).as_secs_f64();
            self.render_count = 0;
            self.render_last = now;
        }
    }

    pub fn draw_egui(&mut self) {
        let status = self.status();
        let mut actions = Vec::new();
        egui_macroquad::ui(|egui_ctx| {
            actions = self
                .control_panel
                .show(egui_ctx, &status, &mut self.show_control_panel);
        });
        egui_macroquad::draw();

        for action in actions {
            self.handle_action(action);
        }
    }

    pub fn handle_input(&mut self) {
        if is_key_pressed(KeyCode::Tab) {
            self.show_control_panel = !self.show_control_panel;
        }
    }

    fn handle_action(&mut self, action: PanelAction) {
        // 失败已经由控制器写进日志和弹窗
        match action {
            PanelAction::OpenCamera => {
                let _ = self.pipeline.controller().start_camera();
            }
            PanelAction::OpenFile(path) => {
                let _ = self.pipeline.controller().start_file(&path);
            }
            PanelAction::Stop => self.pipeline.controller().stop(),
            PanelAction::ToggleRecording => {
                self.pipeline.controller().toggle_recording();
            }
            PanelAction::DetectFile(path) => self.start_batch(path),
        }
    }

    /// 批量检测放到辅助线程, 同一时间只跑一个
    fn start_batch(&mut self, input: PathBuf) {
        if self.batch_job.is_some() {
            self.presenter.log("⚠️ 已有视频正在检测");
            return;
        }

        let model_config = self.config.model.clone();
        let batch_config = self.config.batch.clone();
        let opener = FfmpegSourceOpener::native_size(&self.config.capture);
        let chain = EncoderChain::new(self.encoders.clone(), self.config.recording.codecs.clone());
        let presenter = self.presenter.clone();

        let job = std::thread::Builder::new()
            .name("batch-detect".to_string())
            .spawn(move || {
                let mut model = match DetectionModel::load(&model_config) {
                    Ok(model) => model,
                    Err(e) => {
                        presenter.log(&format!("❌ {:#}", e));
                        return;
                    }
                };
                let _ = batch::detect_file(
                    &input,
                    &mut model,
                    &opener,
                    &chain,
                    &batch_config,
                    presenter.as_ref(),
                    || {},
                );
            });

        match job {
            Ok(job) => self.batch_job = Some(job),
            Err(e) => self.presenter.log(&format!("❌ 无法启动检测线程: {}", e)),
        }
    }

    /// 窗口关闭: 停止流水线, 等推理线程退出
    pub fn shutdown(&mut self) {
        if let Some(stats) = self.pipeline.shutdown() {
            println!(
                "👋 推理线程已退出 (处理 {} 帧, 失败 {} 帧)",
                stats.processed, stats.failed
            );
        }
        if let Some(job) = self.batch_job.take() {
            println!("⏳ 等待批量检测完成...");
            let _ = job.join();
        }
    }
}

/// 上传帧到纹理: 尺寸不变时只更新像素
fn upload(slot: &mut Option<Texture2D>, frame: &Frame) {
    let rgba = frame.to_rgba_bytes();
    let (width, height) = (frame.width() as u16, frame.height() as u16);
    let needs_rebuild = match slot {
        Some(tex) => tex.width() != width as f32 || tex.height() != height as f32,
        None => true,
    };

    if needs_rebuild {
        let texture = Texture2D::from_rgba8(width, height, &rgba);
        texture.set_filter(FilterMode::Linear);
        *slot = Some(texture);
    } else if let Some(tex) = slot {
        let img = Image {
            bytes: rgba,
            width,
            height,
        };
        tex.update(&img);
    }
}
