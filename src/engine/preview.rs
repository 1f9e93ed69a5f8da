// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 预览输出 (非 headless 模式下每帧调用)

use crate::pipeline::ReleaseHandle;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// 预览策略: 每帧拿到编码后的 JPEG
pub trait PreviewSink: Send {
    fn show(&mut self, jpeg: &[u8]) -> anyhow::Result<()>;

    /// 释放预览资源
    fn close(&mut self) -> anyhow::Result<()>;
}

/// 快照预览: 最新一帧写入固定文件 (先写临时文件再改名, 读者不会看到半帧)
pub struct SnapshotPreview {
    path: PathBuf,
    tmp: PathBuf,
    release: ReleaseHandle,
}

impl SnapshotPreview {
    pub fn new(path: impl AsRef<Path>, release: ReleaseHandle) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp: PathBuf::from(tmp),
            release,
        }
    }
}

impl PreviewSink for SnapshotPreview {
    fn show(&mut self, jpeg: &[u8]) -> anyhow::Result<()> {
        if self.release.is_released() {
            return Ok(());
        }
        fs::write(&self.tmp, jpeg).with_context(|| format!("写入 {}", self.tmp.display()))?;
        fs::rename(&self.tmp, &self.path)
            .with_context(|| format!("替换 {}", self.path.display()))?;
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.release.release();
        if self.tmp.exists() {
            fs::remove_file(&self.tmp)?;
        }
        Ok(())
    }
}
