/// 检测数据模型 (Detection data model)
///
/// - Frame:     采集得到的一帧图像
/// - Detection: 一个带类别与置信度的目标
/// - Inference: 标注帧 + 检测序列
pub mod types;

pub use types::{Bbox, Detection, Frame, Inference};
