// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 画面标注: 计数线 / 行人框 / 脚部位置 / 状态文字

use crate::counting::{Detection, LineConfig, Phase, Point};
use ab_glyph::{FontArc, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut,
};
use imageproc::rect::Rect;
use tracing::{info, warn};

const LINE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const FOOT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_BG: Rgb<u8> = Rgb([0, 0, 0]);
const FOOT_RADIUS: i32 = 5;
const TEXT_SCALE: f32 = 20.0;

/// 标注器 (字体可选, 无字体时不画文字)
#[derive(Clone, Default)]
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// 从字体文件加载, 失败时退化为无文字
    pub fn load(font_path: Option<&str>) -> Self {
        let Some(path) = font_path else {
            return Self::default();
        };
        let font = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontArc::try_from_vec(bytes).map_err(|e| e.to_string()));
        match font {
            Ok(font) => {
                info!("🔤 已加载字体 {}", path);
                Self::new(Some(font))
            }
            Err(e) => {
                warn!("⚠️ 字体加载失败 ({}): {}, 不绘制文字", path, e);
                Self::default()
            }
        }
    }

    /// 计数线: 蓝色, 2 像素宽
    pub fn draw_line(&self, image: &mut RgbImage, start: Point, end: Point) {
        let (x1, y1) = (start.x as f32, start.y as f32);
        let (x2, y2) = (end.x as f32, end.y as f32);
        draw_line_segment_mut(image, (x1, y1), (x2, y2), LINE_COLOR);

        // 第二条沿短轴偏移 1 像素
        let (dx, dy) = if (x2 - x1).abs() >= (y2 - y1).abs() {
            (0.0, 1.0)
        } else {
            (1.0, 0.0)
        };
        draw_line_segment_mut(image, (x1 + dx, y1 + dy), (x2 + dx, y2 + dy), LINE_COLOR);
    }

    /// 行人框 (绿) + 脚部 (红点)
    pub fn draw_people(&self, image: &mut RgbImage, people: &[Detection]) {
        for det in people {
            let rect = Rect::at(det.x1, det.y1)
                .of_size(det.width().max(1) as u32, det.height().max(1) as u32);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);

            let foot = det.foot();
            draw_filled_circle_mut(image, (foot.x, foot.y), FOOT_RADIUS, FOOT_COLOR);
        }
    }

    /// 左上角状态文字
    pub fn draw_status(&self, image: &mut RgbImage, phase: Phase, line: &LineConfig, count: u32) {
        let Some(font) = &self.font else {
            return;
        };
        let text = status_text(phase, line, count);
        let width = (text.chars().count() as u32 * 11).min(image.width()).max(1);
        draw_filled_rect_mut(image, Rect::at(4, 4).of_size(width, 26), TEXT_BG);
        draw_text_mut(image, TEXT_COLOR, 8, 7, PxScale::from(TEXT_SCALE), font, &text);
    }
}

/// 状态文字: Setup 提示调整计数线, Counting 显示人数
pub fn status_text(phase: Phase, line: &LineConfig, count: u32) -> String {
    match phase {
        Phase::Setup => format!(
            "SETUP  position {}  angle {}",
            line.position(),
            line.angle()
        ),
        Phase::Counting => format!("OCCUPANCY {}", count),
        Phase::Stopped => "STOPPED".to_string(),
    }
}

/// JPEG 编码
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_line_is_two_pixels_thick() {
        let mut image = RgbImage::new(40, 40);
        Annotator::default().draw_line(&mut image, Point::new(-10, 20), Point::new(50, 20));
        assert_eq!(*image.get_pixel(5, 20), LINE_COLOR);
        assert_eq!(*image.get_pixel(5, 21), LINE_COLOR);
        assert_eq!(*image.get_pixel(5, 23), Rgb([0, 0, 0]));
    }

    #[test]
    fn people_get_box_and_foot_dot() {
        let mut image = RgbImage::new(100, 100);
        let det = Detection::new(10, 10, 50, 80, 0.9);
        Annotator::default().draw_people(&mut image, &[det]);
        assert_eq!(*image.get_pixel(10, 40), BOX_COLOR);
        assert_eq!(*image.get_pixel(30, 78), FOOT_COLOR);
        assert_eq!(*image.get_pixel(30, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn status_text_follows_phase() {
        let line = LineConfig::new(40, 90);
        assert_eq!(status_text(Phase::Setup, &line, 0), "SETUP  position 40  angle 90");
        assert_eq!(status_text(Phase::Counting, &line, 3), "OCCUPANCY 3");
    }

    #[test]
    fn encoded_frame_is_jpeg() {
        let jpeg = encode_jpeg(&RgbImage::new(16, 16), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
