// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLOv8 ONNX 行人检测器
//! YOLOv8 person detector on ONNX Runtime

use super::PersonDetector;
use crate::counting::Detection;
use crate::non_max_suppression;
use anyhow::{bail, Context, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::Array4;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// COCO person 类别
const PERSON_CLASS: usize = 0;
/// 每个候选框前 4 个属性为 cx, cy, w, h
const BOX_ATTRS: usize = 4;
/// letterbox 填充值
const PAD_VALUE: f32 = 144.0 / 255.0;

/// 检测器参数
#[derive(Clone, Debug)]
pub struct DetectorOptions {
    /// 模型输入边长
    pub input_size: u32,
    /// 置信度下限 (计数阈值另行过滤)
    pub conf_threshold: f32,
    /// NMS IOU阈值
    pub iou_threshold: f32,
    pub intra_threads: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            intra_threads: 4,
        }
    }
}

pub struct YoloPersonDetector {
    session: Session,
    options: DetectorOptions,
    resizer: fr::Resizer,
}

impl YoloPersonDetector {
    /// 从显式模型路径加载
    pub fn new(model_path: impl AsRef<Path>, options: DetectorOptions) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            bail!("模型文件不存在: {}", model_path.display());
        }
        info!("🧠 加载模型: {}", model_path.display());

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(options.intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("无法加载模型 {}", model_path.display()))?;

        info!(
            "✅ 模型就绪 (输入 {}x{})",
            options.input_size, options.input_size
        );

        Ok(Self {
            session,
            options,
            resizer: fr::Resizer::new(),
        })
    }

    /// letterbox 预处理: 等比缩放到左上角, 其余填充; 返回 NCHW 张量与缩放比例
    fn preprocess(&mut self, image: &RgbImage) -> Result<(Array4<f32>, f32)> {
        let size = self.options.input_size;
        let (w0, h0) = image.dimensions();
        let (ratio, w_new, h_new) = scale_wh(w0, h0, size);

        let src = fr::images::Image::from_vec_u8(w0, h0, image.as_raw().clone(), fr::PixelType::U8x3)
            .context("源图像尺寸不符")?;
        let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest),
            )
            .context("缩放失败")?;

        let side = size as usize;
        let mut input = Array4::from_elem((1, 3, side, side), PAD_VALUE);
        let row_len = w_new as usize * 3;
        for (y, row) in dst.buffer().chunks_exact(row_len).enumerate() {
            for (x, px) in row.chunks_exact(3).enumerate() {
                input[[0, 0, y, x]] = px[0] as f32 / 255.0;
                input[[0, 1, y, x]] = px[1] as f32 / 255.0;
                input[[0, 2, y, x]] = px[2] as f32 / 255.0;
            }
        }
        Ok((input, ratio))
    }
}

impl PersonDetector for YoloPersonDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let t_pre = Instant::now();
        let (input, ratio) = self.preprocess(image)?;
        let side = self.options.input_size as usize;
        let (data, _) = input.into_raw_vec_and_offset();
        let tensor = Tensor::from_array(([1usize, 3, side, side], data.into_boxed_slice()))?;
        let pre_ms = t_pre.elapsed().as_secs_f64() * 1000.0;

        let t_run = Instant::now();
        let outputs = self.session.run(ort::inputs![tensor])?;
        let (shape, preds) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let run_ms = t_run.elapsed().as_secs_f64() * 1000.0;

        // [1, 4 + 类别数, 候选数]
        if dims.len() != 3 || dims[1] <= BOX_ATTRS {
            bail!("模型输出形状不支持: {:?}", dims);
        }

        let mut detections = decode_predictions(
            preds,
            dims[1],
            dims[2],
            ratio,
            self.options.conf_threshold,
            image.dimensions(),
        );
        non_max_suppression(&mut detections, self.options.iou_threshold);

        debug!(
            "🔍 检测 {} 人 | 预处理 {:.1}ms | 推理 {:.1}ms",
            detections.len(),
            pre_ms,
            run_ms
        );
        Ok(detections)
    }
}

/// 等比缩放: 返回 (比例, 新宽, 新高)
pub fn scale_wh(w0: u32, h0: u32, size: u32) -> (f32, u32, u32) {
    let ratio = (size as f32 / w0 as f32).min(size as f32 / h0 as f32);
    let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
    let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, size);
    (ratio, w_new, h_new)
}

/// 解码 `[1, attrs, anchors]` 输出, 只保留 person 且为该候选最高分类别的框
///
/// 坐标除以缩放比例还原到原图, 并裁剪到画面范围
pub fn decode_predictions(
    preds: &[f32],
    attrs: usize,
    anchors: usize,
    ratio: f32,
    conf_threshold: f32,
    (width, height): (u32, u32),
) -> Vec<Detection> {
    let at = |attr: usize, anchor: usize| preds.get(attr * anchors + anchor).copied().unwrap_or(0.0);
    let max_x = width as f32;
    let max_y = height as f32;

    let mut detections = Vec::new();
    for i in 0..anchors {
        let (class_id, confidence) = (BOX_ATTRS..attrs)
            .map(|a| (a - BOX_ATTRS, at(a, i)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if class_id != PERSON_CLASS || confidence < conf_threshold {
            continue;
        }

        let cx = at(0, i) / ratio;
        let cy = at(1, i) / ratio;
        let w = at(2, i) / ratio;
        let h = at(3, i) / ratio;

        let x1 = (cx - w / 2.0).clamp(0.0, max_x);
        let y1 = (cy - h / 2.0).clamp(0.0, max_y);
        let x2 = (cx + w / 2.0).clamp(0.0, max_x);
        let y2 = (cy + h / 2.0).clamp(0.0, max_y);

        detections.push(Detection::new(
            x1 as i32,
            y1 as i32,
            x2 as i32,
            y2 as i32,
            confidence,
        ));
    }
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_keeps_aspect_ratio() {
        let (ratio, w, h) = scale_wh(480, 360, 640);
        assert!((ratio - 640.0 / 480.0).abs() < 1e-6);
        assert_eq!((w, h), (640, 480));
    }

    /// 3 个候选, 2 个类别 (person, chair)
    fn sample_output() -> Vec<f32> {
        let cx = [100.0, 200.0, 300.0];
        let cy = [100.0, 200.0, 300.0];
        let w = [40.0, 40.0, 40.0];
        let h = [80.0, 80.0, 80.0];
        let person = [0.9, 0.2, 0.1];
        let chair = [0.1, 0.1, 0.8];
        [cx, cy, w, h, person, chair].concat()
    }

    #[test]
    fn keeps_only_confident_people() {
        let preds = sample_output();
        let dets = decode_predictions(&preds, 6, 3, 1.0, 0.25, (640, 640));
        assert_eq!(dets, vec![Detection::new(80, 60, 120, 140, 0.9)]);
    }

    #[test]
    fn boxes_are_rescaled_and_clamped() {
        let preds = sample_output();
        let dets = decode_predictions(&preds, 6, 3, 2.0, 0.25, (45, 1000));
        // cx=50, cy=50, w=20, h=40 → x2 超出宽度 45 被裁剪
        assert_eq!(dets, vec![Detection::new(40, 30, 45, 70, 0.9)]);
    }
}
