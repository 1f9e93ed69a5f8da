// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 行人检测 (Person detection)
///
/// - PersonDetector: 检测能力接口 (图像进, 带分数的 person 框出)
/// - PersonFilter:   计数前的置信度 / 尺寸过滤
/// - YoloPersonDetector: YOLOv8 ONNX 实现
pub mod yolov8;

pub use yolov8::{DetectorOptions, YoloPersonDetector};

use crate::counting::Detection;
use image::RgbImage;

/// 行人检测接口
pub trait PersonDetector: Send {
    /// 检测画面中的行人, 坐标为输入画面像素
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>>;
}

/// 计数前过滤: 置信度 ≥ 阈值, 宽高均 > 最小尺寸
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PersonFilter {
    pub min_confidence: f32,
    pub min_size: i32,
}

impl Default for PersonFilter {
    fn default() -> Self {
        Self {
            min_confidence: 0.35,
            min_size: 30,
        }
    }
}

impl PersonFilter {
    pub fn accepts(&self, det: &Detection) -> bool {
        det.confidence >= self.min_confidence
            && det.width() > self.min_size
            && det.height() > self.min_size
    }

    /// 保留通过过滤的检测, 顺序不变
    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.accepts(d)).collect()
    }
}
