//! 检测结果标注: 在帧的副本上画框和 `label 0.91` 文字

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::{info, warn};
use std::path::Path;

use crate::detection::{Detection, Frame};

/// 高亮颜色表, 按类别循环取色
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

const THICKNESS: i32 = 2;
const FONT_SIZE: f32 = 16.0;

/// 标注器。没有字体时只画框。
#[derive(Clone, Default)]
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// 从字体文件加载, 失败时退化为只画框
    pub fn from_font_file(path: &Path) -> Self {
        let font = match std::fs::read(path) {
            Ok(bytes) => match FontArc::try_from_vec(bytes) {
                Ok(font) => {
                    info!("✅ 标注字体已加载: {}", path.display());
                    Some(font)
                }
                Err(e) => {
                    warn!("⚠️ 字体解析失败 {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("⚠️ 无法读取字体 {}: {}, 标注只画框", path.display(), e);
                None
            }
        };
        Self::new(font)
    }

    pub fn color(class_id: usize) -> Rgb<u8> {
        let (r, g, b) = BRIGHT_COLORS[class_id % BRIGHT_COLORS.len()];
        Rgb([r, g, b])
    }

    /// 返回新帧, 输入帧不变
    pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let mut canvas: RgbImage = frame.image().clone();
        let (img_w, img_h) = canvas.dimensions();

        for det in detections {
            let color = Self::color(det.class_id);
            let x = det.bbox.xmin().round() as i32;
            let y = det.bbox.ymin().round() as i32;
            let w = det.bbox.width().round().max(1.0) as u32;
            let h = det.bbox.height().round().max(1.0) as u32;

            for offset in 0..THICKNESS {
                let (ow, oh) = (offset as u32 * 2, offset as u32 * 2);
                if w <= ow || h <= oh {
                    break;
                }
                let rect = Rect::at(x + offset, y + offset).of_size(w - ow, h - oh);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            if let Some(font) = &self.font {
                let caption = format!("{} {:.2}", det.label, det.confidence);
                let scale = PxScale::from(FONT_SIZE);
                let (tw, th) = text_size(scale, font, &caption);
                // 文字放在框上方, 贴顶时放到框内
                let ty = if y - th as i32 - 2 >= 0 {
                    y - th as i32 - 2
                } else {
                    y
                };
                let tx = x.clamp(0, img_w.saturating_sub(1) as i32);
                let ty = ty.clamp(0, img_h.saturating_sub(1) as i32);
                if tw > 0 && th > 0 {
                    draw_filled_rect_mut(&mut canvas, Rect::at(tx, ty).of_size(tw + 4, th + 2), color);
                }
                draw_text_mut(&mut canvas, Rgb([0, 0, 0]), tx + 2, ty, scale, font, &caption);
            }
        }

        frame.derive(canvas)
    }
}
