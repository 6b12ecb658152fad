// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8/YOLO11 检测模型 (ONNX Runtime)
// 包含: 模型加载、预处理、推理、后处理

use anyhow::{bail, Result};
use image::{imageops, imageops::FilterType, RgbImage};
use log::info;
use ndarray::{s, ArrayView, Axis, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use super::{non_max_suppression, Detector};
use crate::config::ModelConfig;
use crate::detection::{Bbox, Detection};

/// COCO 80 类
pub const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// YOLOv8 检测器 (输出 [1, 4 + nc, anchors])
pub struct YoloV8Detector {
    session: Session,
    input_size: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
}

impl YoloV8Detector {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        if !config.path.is_file() {
            bail!("模型文件不存在: {}", config.path.display());
        }
        let session = build_session(config)?;
        info!(
            "✅ 模型已加载: {} (输入 {}x{})",
            config.path.display(),
            config.input_size,
            config.input_size
        );

        Ok(Self {
            session,
            input_size: config.input_size,
            conf: config.conf,
            iou: config.iou,
            names: COCO_NAMES.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// letterbox: 等比缩放贴到左上角, 其余填充 144/255
    fn preprocess(&self, image: &RgbImage) -> (Vec<f32>, f32) {
        let size = self.input_size as usize;
        let (w0, h0) = image.dimensions();
        let (ratio, w_new, h_new) = scale_wh(
            w0 as f32,
            h0 as f32,
            self.input_size as f32,
            self.input_size as f32,
        );
        let resized = imageops::resize(
            image,
            (w_new as u32).max(1),
            (h_new as u32).max(1),
            FilterType::Triangle,
        );

        let plane = size * size;
        let mut data = vec![144.0 / 255.0; 3 * plane];
        for (x, y, rgb) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            if x >= size || y >= size {
                continue;
            }
            let [r, g, b] = rgb.0;
            data[y * size + x] = r as f32 / 255.0;
            data[plane + y * size + x] = g as f32 / 255.0;
            data[2 * plane + y * size + x] = b as f32 / 255.0;
        }
        (data, ratio)
    }
}

fn build_session(config: &ModelConfig) -> Result<Session> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?;

    #[cfg(feature = "tensorrt")]
    let builder = if config.cuda {
        use ort::execution_providers::TensorRTExecutionProvider;
        info!("尝试使用 TensorRT 加速...");
        builder.with_execution_providers([TensorRTExecutionProvider::default().build()])?
    } else {
        builder
    };

    #[cfg(feature = "cuda")]
    let builder = if config.cuda {
        use ort::execution_providers::CUDAExecutionProvider;
        info!("尝试使用 CUDA 加速...");
        builder.with_execution_providers([CUDAExecutionProvider::default().build()])?
    } else {
        builder
    };

    #[cfg(not(any(feature = "cuda", feature = "tensorrt")))]
    if config.cuda {
        log::warn!("⚠️ 未启用 cuda 特性, 使用 CPU 推理");
    }

    let mut builder = builder;
    Ok(builder.commit_from_file(&config.path)?)
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 解码 YOLOv8 输出 `[1, 4 + nc, anchors]`, 坐标换算回原图并做 NMS
pub fn decode_predictions(
    preds: ArrayView<f32, IxDyn>,
    ratio: f32,
    original: (u32, u32),
    conf: f32,
    iou: f32,
    names: &[String],
) -> Result<Vec<Detection>> {
    const CXYWH_OFFSET: usize = 4;
    if preds.ndim() != 3 || preds.shape()[1] <= CXYWH_OFFSET {
        bail!("无法识别的输出形状: {:?}", preds.shape());
    }
    let (width_original, height_original) = (original.0 as f32, original.1 as f32);
    let nc = preds.shape()[1] - CXYWH_OFFSET;

    let anchor = preds.index_axis(Axis(0), 0);
    let mut data = Vec::new();
    for pred in anchor.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

        let Some((id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        if confidence < conf {
            continue;
        }

        let cx = bbox[0] / ratio;
        let cy = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        let x = (cx - w / 2.).max(0.0).min(width_original);
        let y = (cy - h / 2.).max(0.0).min(height_original);
        let label = names
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", id));
        data.push(Detection::new(
            label,
            id,
            confidence,
            Bbox::new(x, y, w.min(width_original - x), h.min(height_original - y)),
        ));
    }

    non_max_suppression(&mut data, iou);
    Ok(data)
}

impl Detector for YoloV8Detector {
    fn name(&self) -> &str {
        "yolov8"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (data, ratio) = self.preprocess(image);
        let size = self.input_size as usize;
        let input_tensor = Tensor::from_array((vec![1, 3, size, size], data))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (shape, preds) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let preds = ArrayView::from_shape(IxDyn(&dims), preds)?;
        decode_predictions(
            preds,
            ratio,
            image.dimensions(),
            self.conf,
            self.iou,
            &self.names,
        )
    }
}
