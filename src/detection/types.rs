/// 流水线数据结构定义
/// Data structures shared by acquisition, inference and recording
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

// ========== 帧 ==========

/// 一帧已解码的RGB图像 (3通道, 8位)
///
/// 像素数据放在 `Arc` 里: 帧在各阶段之间传递时只复制指针,
/// 交出之后不再原地修改, 任何变换(缩放/标注)都生成新的 `Frame`。
#[derive(Clone, Debug)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: Instant,
    index: u64,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self::with_index(image, 0)
    }

    pub fn with_index(image: RgbImage, index: u64) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: Instant::now(),
            index,
        }
    }

    /// 生成一帧纯色图像 (测试与占位画面使用)
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    /// 基于当前帧派生新帧, 保留采集时间与序号
    pub fn derive(&self, image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: self.captured_at,
            index: self.index,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// 紧密排列的 RGB24 像素
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// 两帧是否共享同一块像素缓冲
    pub fn same_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    /// 转成 RGBA8, 渲染器上传纹理用
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.image
            .pixels()
            .flat_map(|p| [p.0[0], p.0[1], p.0[2], 255])
            .collect()
    }
}

// ========== 检测结果 ==========

/// 检测框 (左上角 + 宽高, 原图坐标)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bbox {
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
        }
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.area() + another.area() - self.intersection_area(another);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(another) / union
    }
}

/// 单个检测目标: 类别名 + 置信度 (0..=1) + 检测框
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: Bbox,
}

impl Detection {
    pub fn new(label: impl Into<String>, class_id: usize, confidence: f32, bbox: Bbox) -> Self {
        Self {
            label: label.into(),
            class_id,
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
        }
    }
}

/// 一帧的推理结果: 标注后的新帧 + 检测序列 (顺序由检测器决定, 仅影响显示顺序)
#[derive(Debug, Clone)]
pub struct Inference {
    pub annotated: Frame,
    pub detections: Vec<Detection>,
}
