// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! FFmpeg 采集模块 - 摄像头 / RTSP / 视频文件
//!
//! 本地摄像头支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux).
//! 解码在独立线程中运行, 画面经 `CaptureFilter` 转成 RGB 后送入容量为 2 的通道.

use super::decode_filter::CaptureFilter;
use super::{FrameSource, InputSource};
use crate::pipeline::ReleaseHandle;
use anyhow::{anyhow, bail, Context};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use std::time::Duration;
use tracing::{error, info, warn};

/// 等待解码线程报告打开结果的最长时间
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_OPEN_RETRIES: u32 = 3;

/// 采集参数
#[derive(Clone, Debug)]
pub struct CaptureOptions {
    pub width: u32,
    pub height: u32,
    /// 水平镜像
    pub mirror: bool,
    /// 单次取帧超时
    pub timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            width: 480,
            height: 360,
            mirror: true,
            timeout: Duration::from_secs(2),
        }
    }
}

impl CaptureOptions {
    /// FFmpeg 滤镜链: [镜像] → 缩放 → YUV420P
    pub fn filter_desc(&self) -> String {
        let flip = if self.mirror { "hflip," } else { "" };
        format!("{}scale={}:{},format=yuv420p", flip, self.width, self.height)
    }
}

/// FFmpeg 采集器
pub struct FfmpegCapture {
    rx: Receiver<RgbImage>,
    release: ReleaseHandle,
    timeout: Duration,
    source: InputSource,
}

impl FfmpegCapture {
    /// 打开视频源并启动解码线程
    ///
    /// 释放标记置位后解码线程在下一帧退出
    pub fn open(
        source: InputSource,
        options: CaptureOptions,
        release: ReleaseHandle,
    ) -> anyhow::Result<Self> {
        let url = format_input_url(&source)?;
        let format = input_format(&source, &url);
        info!("🔗 视频源: {} ({})", url, format.unwrap_or("auto"));

        let (tx, rx) = bounded(2);
        let (ready_tx, ready_rx) = bounded(1);
        let filter = CaptureFilter::new(tx, release.clone());
        let filter_desc = options.filter_desc();
        let rtsp = source.is_rtsp();

        std::thread::Builder::new()
            .name("ffmpeg-capture".to_string())
            .spawn(move || run_decoder(&url, format, rtsp, &filter_desc, filter, ready_tx))
            .context("无法启动解码线程")?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => bail!("打开视频源失败: {}", e),
            Err(_) => {
                release.release();
                bail!("打开视频源超时 ({}s)", OPEN_TIMEOUT.as_secs());
            }
        }

        Ok(Self {
            rx,
            release,
            timeout: options.timeout,
            source,
        })
    }
}

impl FrameSource for FfmpegCapture {
    fn read(&mut self) -> anyhow::Result<Option<RgbImage>> {
        if self.release.is_released() {
            bail!("采集设备已释放");
        }
        match self.rx.recv_timeout(self.timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("视频源已断开: {}", self.source)),
        }
    }

    fn release(&mut self) -> anyhow::Result<()> {
        if self.release.release() {
            // 丢弃已解码未取走的帧
            while self.rx.try_recv().is_ok() {}
        }
        Ok(())
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.release.release();
    }
}

/// 解码线程主体: 构建 → 启动 → 上报结果 → 等待结束
fn run_decoder(
    url: &str,
    format: Option<&'static str>,
    rtsp: bool,
    filter_desc: &str,
    filter: CaptureFilter,
    ready: Sender<Result<(), String>>,
) {
    let mut retry_count = 0;

    let ctx = loop {
        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("capture", Box::new(filter.clone()));
        let out = create_null_output().add_frame_pipeline(pipe);

        let mut input = Input::new(url);
        if let Some(format) = format {
            input = input.set_format(format);
        }
        if rtsp {
            input = input.set_input_opts([("rtsp_transport", "tcp")].into());
        }

        match FfmpegContext::builder()
            .input(input)
            .filter_desc(filter_desc)
            .output(out)
            .build()
        {
            Ok(ctx) => break ctx,
            Err(e) => {
                retry_count += 1;
                if retry_count >= MAX_OPEN_RETRIES {
                    error!("❌ 视频源构建失败 (重试{}次): {}", MAX_OPEN_RETRIES, e);
                    let _ = ready.send(Err(format!("构建失败: {}", e)));
                    return;
                }
                warn!(
                    "⚠️ 视频源忙或无法打开, 1秒后重试... ({}/{})",
                    retry_count, MAX_OPEN_RETRIES
                );
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    };

    let sch = match ctx.start() {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(format!("启动失败: {}", e)));
            return;
        }
    };

    info!("✅ 视频源连接成功, 开始解码!");
    let _ = ready.send(Ok(()));

    let _ = sch.wait();
    info!("📹 解码循环结束");
}

/// 根据平台格式化输入地址
fn format_input_url(source: &InputSource) -> anyhow::Result<String> {
    match source {
        InputSource::Stream(url) => Ok(url.clone()),
        InputSource::Camera(index) => camera_url(*index),
    }
}

#[cfg(target_os = "windows")]
fn camera_url(index: usize) -> anyhow::Result<String> {
    let devices = get_camera_devices();
    let (_, name) = devices
        .into_iter()
        .find(|(i, _)| *i == index)
        .ok_or_else(|| anyhow!("摄像头 #{} 不存在", index))?;
    Ok(format!("video={}", name))
}

#[cfg(target_os = "linux")]
fn camera_url(index: usize) -> anyhow::Result<String> {
    Ok(format!("/dev/video{}", index))
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn camera_url(index: usize) -> anyhow::Result<String> {
    Ok(format!("{}", index))
}

/// 输入格式: 摄像头走平台采集框架, 其余交给 FFmpeg 探测
fn input_format(source: &InputSource, url: &str) -> Option<&'static str> {
    let local_device = matches!(source, InputSource::Camera(_)) || url.starts_with("/dev/video");
    if !local_device {
        return None;
    }

    #[cfg(target_os = "windows")]
    let format = "dshow";

    #[cfg(target_os = "macos")]
    let format = "avfoundation";

    #[cfg(target_os = "linux")]
    let format = "v4l2";

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    let format = "video4linux2";

    Some(format)
}

/// 获取可用的摄像头设备列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
