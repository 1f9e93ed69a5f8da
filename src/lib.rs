// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 配置文件 + 命令行参数
pub mod controller; // 启停编排
pub mod counting; // 计数线几何 / 越线判定 / 跟踪
pub mod detection; // 行人检测
pub mod engine; // 计数工作线程
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod pipeline; // 帧缓冲 / 命令通道
pub mod server; // HTTP 控制面 + MJPEG 推流

pub use crate::config::{Args, CounterConfig};
pub use crate::controller::{CounterController, EngineFactory, StartOutcome, StopOutcome};
pub use crate::counting::{Detection, Direction, LineConfig, Phase, Point};
pub use crate::error::{CounterError, Result};

/// 按置信度降序的贪心 NMS
pub fn non_max_suppression(xs: &mut Vec<counting::Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
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
