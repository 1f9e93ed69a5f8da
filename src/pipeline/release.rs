// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 资源释放标记
///
/// 工作线程与清理流程共享同一标记: 任意一方先释放, 另一方看到后不再使用该资源.
/// 解码过滤器在标记置位后返回错误, FFmpeg 流水线随之退出.
#[derive(Clone, Debug, Default)]
pub struct ReleaseHandle {
    released: Arc<AtomicBool>,
}

impl ReleaseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 置位; 仅第一次调用返回 `true`
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
