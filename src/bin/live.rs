/// YOLO 实时检测系统
///
/// 线程架构:
/// 1. 主线程:   渲染显示 + 控制面板 + 采集节拍 (macroquad 事件循环)
/// 2. 推理线程: 目标检测、标注与录制 (常驻工作线程)
/// 3. 批量检测: 按需启动的辅助线程
use clap::Parser;
use macroquad::prelude::*;
use yolo_live::config::{AppConfig, LiveArgs};
use yolo_live::models::DetectionModel;
use yolo_live::renderer::Renderer;

fn window_conf() -> Conf {
    Conf {
        window_title: "YOLO 实时检测系统".to_owned(),
        window_width: 1200,
        window_height: 800,
        high_dpi: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = LiveArgs::parse();
    let mut config = AppConfig::load(&args.config);
    args.apply(&mut config);

    println!("🚀 实时检测系统启动");
    println!("📦 检测模型: {}", config.model.path.display());

    let model = match DetectionModel::load(&config.model) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    let mut renderer = match Renderer::new(config, model) {
        Ok(renderer) => renderer,
        Err(e) => {
            eprintln!("❌ 渲染器启动失败: {:#}", e);
            std::process::exit(1);
        }
    };

    // 关闭窗口时先停止流水线
    prevent_quit();
    loop {
        renderer.handle_input();
        renderer.update();
        renderer.draw();
        renderer.draw_egui();

        if is_quit_requested() {
            renderer.shutdown();
            break;
        }
        next_frame().await;
    }
}
