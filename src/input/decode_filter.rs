// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg解码过滤器: YUV420P帧 → RGB图像, 送入采集通道
/// FFmpeg frame filter feeding decoded RGB frames to the capture channel
use crate::pipeline::ReleaseHandle;
use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CaptureFilter {
    tx: Sender<RgbImage>,
    release: ReleaseHandle,
    count: usize,
    last: Instant,
    total_frames: usize,
    dropped_frames: usize, // 损坏帧 + 通道满丢弃
}

impl CaptureFilter {
    pub fn new(tx: Sender<RgbImage>, release: ReleaseHandle) -> Self {
        Self {
            tx,
            release,
            count: 0,
            last: Instant::now(),
            total_frames: 0,
            dropped_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }
}

impl FrameFilter for CaptureFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 采集设备已释放: 返回错误让 FFmpeg 流水线退出
        if self.release.is_released() {
            info!("🛑 采集已释放, 停止解码");
            return Err("Capture released".to_string());
        }

        self.total_frames += 1;

        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.drop_frame("空帧/损坏帧");
                return Ok(None);
            }

            let raw = &*frame.as_ptr();
            let w = raw.width as usize;
            let h = raw.height as usize;
            if w == 0 || h == 0 || w > 4096 || h > 4096 {
                self.drop_frame("非法分辨率");
                return Ok(None);
            }

            let y_plane = raw.data[0];
            let u_plane = raw.data[1];
            let v_plane = raw.data[2];
            let y_stride = raw.linesize[0] as usize;
            let uv_stride = raw.linesize[1] as usize;

            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                self.drop_frame("YUV指针为空");
                return Ok(None);
            }
            if y_stride < w || uv_stride < w / 2 {
                self.drop_frame("步长异常");
                return Ok(None);
            }

            let mut rgb = vec![0u8; w * h * 3];
            yuv420p_to_rgb(y_plane, u_plane, v_plane, y_stride, uv_stride, &mut rgb, w, h);

            let Some(image) = RgbImage::from_raw(w as u32, h as u32, rgb) else {
                self.drop_frame("缓冲尺寸不符");
                return Ok(None);
            };

            match self.tx.try_send(image) {
                Ok(()) => self.count += 1,
                // 工作线程来不及取: 丢掉这一帧, 下次取到的是更新的画面
                Err(TrySendError::Full(_)) => self.dropped_frames += 1,
                Err(TrySendError::Disconnected(_)) => {
                    return Err("Capture channel closed".to_string());
                }
            }
        }

        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            debug!(
                "📺 解码统计: {:.1}fps | 总帧{} | 丢弃{}",
                self.count as f64 / elapsed,
                self.total_frames,
                self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!("✅ 解码线程退出");
    }
}

/// YUV420P → RGB (BT.601, 定点系数 ×128)
#[allow(clippy::too_many_arguments)]
#[inline]
unsafe fn yuv420p_to_rgb(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    y_stride: usize,
    uv_stride: usize,
    buffer: &mut [u8],
    width: usize,
    height: usize,
) {
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = *y_plane.add(y_row + x) as i32;
            let u_val = *u_plane.add(uv_row + (x >> 1)) as i32 - 128;
            let v_val = *v_plane.add(uv_row + (x >> 1)) as i32 - 128;

            buffer[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_gives_grey_pixels() {
        let (w, h) = (4usize, 2usize);
        let y = [16u8, 80, 160, 235, 16, 80, 160, 235];
        let u = [128u8; 2];
        let v = [128u8; 2];
        let mut rgb = vec![0u8; w * h * 3];
        unsafe {
            yuv420p_to_rgb(y.as_ptr(), u.as_ptr(), v.as_ptr(), w, w / 2, &mut rgb, w, h);
        }
        for (i, px) in rgb.chunks(3).enumerate() {
            assert_eq!(px, [y[i]; 3]);
        }
    }

    #[test]
    fn red_chroma_raises_red_channel() {
        let y = [100u8; 4];
        let u = [128u8; 1];
        let v = [200u8; 1];
        let mut rgb = vec![0u8; 12];
        unsafe {
            yuv420p_to_rgb(y.as_ptr(), u.as_ptr(), v.as_ptr(), 2, 1, &mut rgb, 2, 2);
        }
        assert!(rgb[0] > 100);
        assert!(rgb[1] < 100);
        assert_eq!(rgb[2], 100);
    }
}
