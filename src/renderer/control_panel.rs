use crate::pipeline::SourceKind;
use egui_macroquad::egui;
use std::collections::VecDeque;
use std::path::PathBuf;

/// 日志面板最多保留的行数
const MAX_LOG_LINES: usize = 500;

/// 面板上的操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelAction {
    OpenCamera,
    OpenFile(PathBuf),
    DetectFile(PathBuf),
    Stop,
    ToggleRecording,
}

/// 面板显示用的流水线状态
#[derive(Debug, Clone, Copy, Default)]
pub struct PanelStatus {
    pub source_kind: SourceKind,
    pub is_recording: bool,
    pub recorded_frames: u64,
    pub batch_running: bool,
    pub dropped_frames: u64,
}

/// 控制面板状态
pub struct ControlPanel {
    pub file_path: String,
    pub render_fps: f64,
    logs: VecDeque<String>,
    alert: Option<(String, String)>,
}

impl ControlPanel {
    pub fn new(file_path: String) -> Self {
        Self {
            file_path,
            render_fps: 0.0,
            logs: VecDeque::with_capacity(MAX_LOG_LINES),
            alert: None,
        }
    }

    pub fn push_log(&mut self, line: String) {
        if self.logs.len() >= MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    pub fn logs(&self) -> impl Iterator<Item = &str> {
        self.logs.iter().map(String::as_str)
    }

    /// 弹出错误提示, 关闭之前面板不响应其它操作
    pub fn set_alert(&mut self, title: String, message: String) {
        self.alert = Some((title, message));
    }

    pub fn has_alert(&self) -> bool {
        self.alert.is_some()
    }

    fn selected_path(&self) -> Option<PathBuf> {
        let path = self.file_path.trim();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }

    /// 录制按钮文字随录制状态切换 (包括编码器失败后的自动复位)
    pub fn record_label(is_recording: bool) -> &'static str {
        if is_recording {
            "⏹️ 停止录制"
        } else {
            "⏺️ 开始录制"
        }
    }

    pub fn show(
        &mut self,
        ctx: &egui::Context,
        status: &PanelStatus,
        open: &mut bool,
    ) -> Vec<PanelAction> {
        let mut actions = Vec::new();

        if let Some((title, message)) = self.alert.clone() {
            egui::Window::new(title)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                .show(ctx, |ui| {
                    ui.label(message);
                    if ui.button("确定").clicked() {
                        self.alert = None;
                    }
                });
        }

        if !*open {
            return actions;
        }
        let enabled = self.alert.is_none();

        egui::Window::new("🎯 控制面板")
            .default_pos(egui::pos2(10.0, 420.0))
            .default_size(egui::vec2(1040.0, 300.0))
            .resizable(true)
            .show(ctx, |ui| {
                ui.add_enabled_ui(enabled, |ui| {
                    ui.horizontal(|ui| {
                        if ui.button("📹 打开摄像头").clicked() {
                            actions.push(PanelAction::OpenCamera);
                        }
                        ui.label("视频文件:");
                        ui.text_edit_singleline(&mut self.file_path);
                    });

                    ui.horizontal(|ui| {
                        let path = self.selected_path();
                        if ui
                            .add_enabled(path.is_some(), egui::Button::new("📁 打开视频文件"))
                            .clicked()
                        {
                            if let Some(path) = path.clone() {
                                actions.push(PanelAction::OpenFile(path));
                            }
                        }
                        if ui
                            .add_enabled(
                                path.is_some() && !status.batch_running,
                                egui::Button::new("🎬 检测视频文件"),
                            )
                            .clicked()
                        {
                            if let Some(path) = path {
                                actions.push(PanelAction::DetectFile(path));
                            }
                        }
                        if ui.button("🛑 停止").clicked() {
                            actions.push(PanelAction::Stop);
                        }
                        if ui.button(Self::record_label(status.is_recording)).clicked() {
                            actions.push(PanelAction::ToggleRecording);
                        }
                    });
                });

                ui.separator();
                ui.horizontal(|ui| {
                    let source = match status.source_kind {
                        SourceKind::None => "无",
                        SourceKind::Camera => "摄像头",
                        SourceKind::File => "视频文件",
                    };
                    ui.label(format!("视频源: {}", source));
                    if status.is_recording {
                        ui.colored_label(
                            egui::Color32::from_rgb(255, 80, 80),
                            format!("● 录制中 {} 帧", status.recorded_frames),
                        );
                    }
                    if status.batch_running {
                        ui.label("🎬 批量检测进行中");
                    }
                    ui.label(format!("丢帧: {}", status.dropped_frames));
                    ui.label(format!("渲染: {:.1} FPS", self.render_fps));
                });

                ui.separator();
                egui::ScrollArea::vertical()
                    .max_height(180.0)
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for line in &self.logs {
                            ui.label(line);
                        }
                    });
            });

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_pane_is_bounded() {
        let mut panel = ControlPanel::new(String::new());
        for i in 0..(MAX_LOG_LINES + 10) {
            panel.push_log(format!("line {}", i));
        }
        assert_eq!(panel.logs().count(), MAX_LOG_LINES);
        assert_eq!(panel.logs().next(), Some("line 10"));
    }

    #[test]
    fn record_label_flips_with_state() {
        assert_eq!(ControlPanel::record_label(false), "⏺️ 开始录制");
        assert_eq!(ControlPanel::record_label(true), "⏹️ 停止录制");
    }

    #[test]
    fn blank_path_is_not_selectable() {
        let panel = ControlPanel::new("   ".to_string());
        assert!(panel.selected_path().is_none());
        let panel = ControlPanel::new(" demo.mp4 ".to_string());
        assert_eq!(panel.selected_path(), Some(PathBuf::from("demo.mp4")));
    }
}
