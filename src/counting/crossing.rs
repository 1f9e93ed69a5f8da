// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 越线判定
//! Line crossing detection

use super::types::{Direction, Point};

/// 点相对直线的位置 (叉积)
///
/// `> 0` 与 `< 0` 分别对应直线两侧, `0` 表示点在线上
pub fn side_of_line(point: Point, start: Point, end: Point) -> i64 {
    let (x, y) = (point.x as i64, point.y as i64);
    let (x1, y1) = (start.x as i64, start.y as i64);
    let (x2, y2) = (end.x as i64, end.y as i64);
    (x2 - x1) * (y - y1) - (y2 - y1) * (x - x1)
}

/// 判断目标是否在两帧之间越过计数线
///
/// 叉积乘积严格小于 0 才算越线, 落在线上不计数.
/// 方向规则随角度在 180 度处翻转:
/// - `0 <= angle < 180`: 上一帧在正侧为 `In`
/// - `angle >= 180`:     上一帧在负侧为 `In`
pub fn check_line_crossing(
    current: Point,
    previous: Option<Point>,
    start: Point,
    end: Point,
    angle: u16,
) -> Option<Direction> {
    let previous = previous?;

    let prev_side = side_of_line(previous, start, end);
    let curr_side = side_of_line(current, start, end);

    if prev_side.signum() * curr_side.signum() >= 0 {
        return None;
    }

    let entered = if angle < 180 {
        prev_side > 0
    } else {
        prev_side < 0
    };
    Some(if entered { Direction::In } else { Direction::Out })
}
