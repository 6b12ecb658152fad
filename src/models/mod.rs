/// 检测模型 (Model collaborator)
///
/// - Detector:       图像 → 检测结果, 具体实现见 `yolov8.rs`
/// - DetectionModel: 检测器 + 标注器, 对外只暴露 `infer(frame)`
///
/// ## 使用示例
/// ```no_run
/// use yolo_live::config::ModelConfig;
/// use yolo_live::detection::Frame;
/// use yolo_live::models::DetectionModel;
///
/// let mut model = DetectionModel::load(&ModelConfig::default())?;
/// let result = model.infer(&Frame::filled(640, 480, [0, 0, 0]))?;
/// println!("{} 个目标", result.detections.len());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub mod yolov8;

pub use yolov8::{YoloV8Detector, COCO_NAMES};

use anyhow::Context;
use image::RgbImage;
use std::cmp::Ordering;

use crate::annotate::Annotator;
use crate::config::ModelConfig;
use crate::detection::{Detection, Frame, Inference};
use crate::error::PipelineError;

/// 目标检测器
pub trait Detector: Send {
    fn name(&self) -> &str;

    /// 返回原图坐标系下的检测框, 按置信度从高到低
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>>;
}

/// 检测 + 标注
pub struct DetectionModel {
    detector: Box<dyn Detector>,
    annotator: Annotator,
}

impl DetectionModel {
    pub fn new(detector: Box<dyn Detector>, annotator: Annotator) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    /// 按配置加载 ONNX 模型与标注字体
    pub fn load(config: &ModelConfig) -> anyhow::Result<Self> {
        let detector = YoloV8Detector::new(config)
            .with_context(|| format!("加载模型失败: {}", config.path.display()))?;
        let annotator = Annotator::from_font_file(&config.font_path);
        Ok(Self::new(Box::new(detector), annotator))
    }

    pub fn name(&self) -> &str {
        self.detector.name()
    }

    /// 推理一帧: 输入帧不变, 标注结果是新帧
    pub fn infer(&mut self, frame: &Frame) -> Result<Inference, PipelineError> {
        let detections = self
            .detector
            .detect(frame.image())
            .map_err(|e| PipelineError::inference(format!("{:#}", e)))?;
        let annotated = self.annotator.annotate(frame, &detections);
        Ok(Inference {
            annotated,
            detections,
        })
    }
}

/// 非极大值抑制: 按置信度降序保留, 与已保留框 IOU 超过阈值的丢弃
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| {
        b2.confidence
            .partial_cmp(&b1.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].bbox.iou(&xs[index].bbox);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Bbox;

    struct Fixed(Vec<Detection>);

    impl Detector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Detector for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
            anyhow::bail!("tensor shape mismatch")
        }
    }

    fn det(label: &str, conf: f32, x: f32) -> Detection {
        Detection::new(label, 0, conf, Bbox::new(x, 0.0, 10.0, 10.0))
    }

    #[test]
    fn nms_keeps_best_of_overlapping_boxes() {
        let mut xs = vec![det("a", 0.5, 0.0), det("b", 0.9, 1.0), det("c", 0.7, 50.0)];
        non_max_suppression(&mut xs, 0.45);
        let labels: Vec<_> = xs.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "c"]);
    }

    #[test]
    fn infer_leaves_input_untouched() {
        let mut model = DetectionModel::new(
            Box::new(Fixed(vec![det("person", 0.9, 2.0)])),
            Annotator::default(),
        );
        let frame = Frame::filled(32, 32, [0, 0, 0]);
        let result = model.infer(&frame).unwrap();
        assert_eq!(result.detections.len(), 1);
        assert!(!result.annotated.same_buffer(&frame));
        assert_eq!(frame.image().get_pixel(2, 0).0, [0, 0, 0]);
        assert_ne!(result.annotated.image().get_pixel(2, 0).0, [0, 0, 0]);
    }

    #[test]
    fn detector_error_becomes_inference_failure() {
        let mut model = DetectionModel::new(Box::new(Broken), Annotator::default());
        let err = model.infer(&Frame::filled(8, 8, [0, 0, 0])).unwrap_err();
        assert!(matches!(err, PipelineError::InferenceFailure(msg) if msg.contains("mismatch")));
    }
}
