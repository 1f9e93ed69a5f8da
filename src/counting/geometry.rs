// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数线几何
//! Counting line geometry

use super::types::{LineConfig, Point};

/// 线段长度相对画面对角线的倍数 (保证任意角度都贯穿画面)
pub const LINE_LENGTH_FACTOR: f64 = 1.5;

/// 计算计数线的两个端点
///
/// # 参数
/// - `width` / `height`: 画面尺寸 (像素)
/// - `line`: 位置 (0-100, 50 为画面中心) 与角度 (0-359 度)
///
/// 位置偏移沿线的法向分解: 角度越接近水平, 偏移越多落在 Y 轴上
pub fn line_points(width: u32, height: u32, line: &LineConfig) -> (Point, Point) {
    let w = width as f64;
    let h = height as f64;

    let (sin, cos) = (line.angle() as f64).to_radians().sin_cos();
    let vertical_factor = sin.abs();
    let horizontal_factor = cos.abs();

    // -1..1
    let base_offset = (line.position() as f64 - 50.0) / 50.0;
    let offset_x = base_offset * w * vertical_factor;
    let offset_y = base_offset * h * horizontal_factor;

    let center_x = w / 2.0;
    let center_y = h / 2.0;
    let half_length = LINE_LENGTH_FACTOR * (w * w + h * h).sqrt() / 2.0;

    let start = Point::new(
        (center_x + half_length * cos + offset_x) as i32,
        (center_y + half_length * sin + offset_y) as i32,
    );
    let end = Point::new(
        (center_x - half_length * cos + offset_x) as i32,
        (center_y - half_length * sin + offset_y) as i32,
    );
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_horizontal_line() {
        let (start, end) = line_points(400, 400, &LineConfig::new(50, 0));
        assert_eq!(start.y, 200);
        assert_eq!(end.y, 200);
        assert!(start.x > 400 && end.x < 0);
    }

    #[test]
    fn segment_is_longer_than_diagonal_at_any_angle() {
        let (w, h) = (480u32, 360u32);
        let diagonal = ((w * w + h * h) as f32).sqrt();
        for angle in [0, 33, 90, 135, 180, 271, 359] {
            let (start, end) = line_points(w, h, &LineConfig::new(50, angle));
            assert!(start.distance(&end) >= diagonal, "angle {angle}");
        }
    }

    #[test]
    fn position_shifts_horizontal_line_vertically() {
        let (start, end) = line_points(400, 400, &LineConfig::new(75, 0));
        assert_eq!(start.y, 400);
        assert_eq!(end.y, 400);

        let (start, _) = line_points(400, 400, &LineConfig::new(25, 0));
        assert_eq!(start.y, 0);
    }

    #[test]
    fn position_shifts_vertical_line_horizontally() {
        let (start, end) = line_points(400, 300, &LineConfig::new(0, 90));
        // 90 度: 偏移全部落在 X 轴, -1 * 400
        assert!((start.x - (-200)).abs() <= 1);
        assert!((end.x - (-200)).abs() <= 1);
    }
}
