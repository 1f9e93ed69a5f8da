// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 计数系统数据结构定义
/// Data structures for the occupancy counter

// ========== 公共常量 ==========

/// 计数线位置范围 (百分比)
pub const POSITION_MAX: i64 = 100;

/// 计数线角度范围 (度)
pub const ANGLE_MAX: i64 = 359;

// ========== 数据结构 ==========

/// 像素坐标点
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// 欧氏距离
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// 计数线配置: 只能通过命令通道修改
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineConfig {
    position: u8,
    angle: u16,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            position: 50,
            angle: 0,
        }
    }
}

impl LineConfig {
    pub fn new(position: i64, angle: i64) -> Self {
        let mut line = Self::default();
        line.set_position(position);
        line.set_angle(angle);
        line
    }

    /// 位置偏移, 0-100
    pub fn position(&self) -> u8 {
        self.position
    }

    /// 旋转角度, 0-359
    pub fn angle(&self) -> u16 {
        self.angle
    }

    pub fn set_position(&mut self, value: i64) {
        self.position = value.clamp(0, POSITION_MAX) as u8;
    }

    pub fn set_angle(&mut self, value: i64) {
        self.angle = value.clamp(0, ANGLE_MAX) as u16;
    }
}

/// 检测框 (外部模型输出, 仅 person 类)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub confidence: f32,
}

impl Detection {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// 脚部位置: 底边中点
    pub fn foot(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2, self.y2)
    }

    pub fn area(&self) -> f32 {
        (self.width().max(0) as f32) * (self.height().max(0) as f32)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        let inter = ((r - l).max(0) as f32) * ((b - t).max(0) as f32);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

/// 跟踪目标: 仅保留上一帧的脚部位置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Track {
    pub id: u32,
    pub foot: Point,
}

/// 越线方向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// 工作线程阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// 调整计数线, 不做检测
    Setup,
    /// 检测 + 跟踪 + 计数
    Counting,
    /// 终止
    Stopped,
}

impl Phase {
    pub fn as_u8(self) -> u8 {
        match self {
            Phase::Setup => 0,
            Phase::Counting => 1,
            Phase::Stopped => 2,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Setup,
            1 => Phase::Counting,
            _ => Phase::Stopped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Counting => "counting",
            Phase::Stopped => "stopped",
        }
    }
}

/// 配置更新消息 (控制面 → 工作线程)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    SetPosition(i64),
    SetAngle(i64),
}

impl Command {
    pub fn apply(&self, line: &mut LineConfig) {
        match *self {
            Command::SetPosition(value) => line.set_position(value),
            Command::SetAngle(value) => line.set_angle(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_config_clamps_out_of_range_values() {
        let line = LineConfig::new(150, -20);
        assert_eq!(line.position(), 100);
        assert_eq!(line.angle(), 0);

        let line = LineConfig::new(-1, 720);
        assert_eq!(line.position(), 0);
        assert_eq!(line.angle(), 359);
    }

    #[test]
    fn foot_is_bottom_edge_midpoint() {
        let det = Detection::new(10, 20, 51, 120, 0.9);
        assert_eq!(det.foot(), Point::new(30, 120));
    }

    #[test]
    fn commands_apply_through_setters() {
        let mut line = LineConfig::default();
        Command::SetAngle(400).apply(&mut line);
        Command::SetPosition(12).apply(&mut line);
        assert_eq!(line, LineConfig::new(12, 359));
    }
}
