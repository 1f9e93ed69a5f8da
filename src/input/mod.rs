// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入系统 (Video Input System)
///
/// 独立解码线程, 负责视频源解码与预处理
/// - FfmpegCapture: 本地摄像头 (DirectShow/AVFoundation/V4L2) / RTSP / 视频文件
/// - CaptureFilter: YUV420P → RGB 帧过滤
pub mod camera;
pub mod decode_filter;

pub use camera::{get_camera_devices, CaptureOptions, FfmpegCapture};
pub use decode_filter::CaptureFilter;

use image::RgbImage;

/// 帧来源 (工作线程独占)
pub trait FrameSource: Send {
    /// 读取最新一帧
    ///
    /// `Ok(None)` 表示本次超时未取到画面, `Err` 表示视频源已不可用
    fn read(&mut self) -> anyhow::Result<Option<RgbImage>>;

    /// 释放设备, 之后 `read` 不再返回画面
    fn release(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 视频源类型
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    /// 本地摄像头序号
    Camera(usize),
    /// 设备路径 / RTSP地址 / 视频文件
    Stream(String),
}

impl InputSource {
    /// 纯数字视为摄像头序号, 其余按地址处理
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        match trimmed.parse::<usize>() {
            Ok(index) => InputSource::Camera(index),
            Err(_) => InputSource::Stream(trimmed.to_string()),
        }
    }

    pub fn is_rtsp(&self) -> bool {
        matches!(self, InputSource::Stream(url) if url.starts_with("rtsp://"))
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::Camera(index) => write!(f, "摄像头 #{index}"),
            InputSource::Stream(url) => write!(f, "{url}"),
        }
    }
}
