// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 资源清理 (正常退出与强制停止共用)

use super::status::EngineStatus;
use crate::pipeline::{CommandChannel, FrameBuffer, ReleaseHandle};
use crossbeam_channel::Sender;
use std::sync::Arc;
use tracing::{debug, info};

/// 一轮运行的共享资源
///
/// 清空两个队列, 置位采集与预览的释放标记. 多次调用结果相同.
#[derive(Clone)]
pub struct ResourceReleaser {
    frames: FrameBuffer,
    commands: CommandChannel,
    capture: ReleaseHandle,
    preview: ReleaseHandle,
}

impl ResourceReleaser {
    pub fn new(
        frames: FrameBuffer,
        commands: CommandChannel,
        capture: ReleaseHandle,
        preview: ReleaseHandle,
    ) -> Self {
        Self {
            frames,
            commands,
            capture,
            preview,
        }
    }

    pub fn capture_handle(&self) -> ReleaseHandle {
        self.capture.clone()
    }

    pub fn preview_handle(&self) -> ReleaseHandle {
        self.preview.clone()
    }

    /// 释放全部资源
    pub fn release_all(&self) {
        let frames = self.frames.clear();
        let commands = self.commands.clear();
        debug!("🧹 清空队列: {} 帧, {} 条命令", frames, commands);

        if self.capture.release() {
            info!("📷 采集设备已释放");
        }
        if self.preview.release() {
            info!("🖼️ 预览已释放");
        }
    }

    pub fn is_released(&self) -> bool {
        self.capture.is_released() && self.preview.is_released()
    }
}

/// 工作线程退出守卫
///
/// 线程以任何方式结束 (包括 panic) 都会执行: 当前代数才清理队列,
/// 释放标记总是置位, 最后通知控制面已退出.
pub struct ExitGuard {
    releaser: ResourceReleaser,
    status: Arc<EngineStatus>,
    generation: u64,
    done: Sender<()>,
}

impl ExitGuard {
    pub fn new(
        releaser: ResourceReleaser,
        status: Arc<EngineStatus>,
        generation: u64,
        done: Sender<()>,
    ) -> Self {
        Self {
            releaser,
            status,
            generation,
            done,
        }
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.status.is_current(self.generation) {
            self.releaser.release_all();
            self.status.finish_run(self.generation);
        } else {
            // 已被放弃: 队列属于新一轮, 只收回本轮的释放标记
            self.releaser.capture.release();
            self.releaser.preview.release();
            debug!("🧹 旧工作线程 (Gen: {}) 退出", self.generation);
        }
        let _ = self.done.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::Command;

    fn releaser() -> (ResourceReleaser, FrameBuffer, CommandChannel) {
        let frames = FrameBuffer::new(4);
        let commands = CommandChannel::new();
        let releaser = ResourceReleaser::new(
            frames.clone(),
            commands.clone(),
            ReleaseHandle::new(),
            ReleaseHandle::new(),
        );
        (releaser, frames, commands)
    }

    #[test]
    fn release_all_is_idempotent() {
        let (releaser, frames, commands) = releaser();
        frames.publish(vec![1]);
        commands.send(Command::SetAngle(10));

        releaser.release_all();
        assert!(frames.is_empty());
        assert!(commands.is_empty());
        assert!(releaser.is_released());

        releaser.release_all();
        assert!(releaser.is_released());
    }

    #[test]
    fn stale_guard_leaves_new_queues_alone() {
        let (releaser, frames, _) = releaser();
        let status = Arc::new(EngineStatus::new());
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        let old = status.begin_run();
        let guard = ExitGuard::new(releaser.clone(), status.clone(), old, done_tx);
        status.abandon(old);
        status.begin_run();
        frames.publish(vec![7]);

        drop(guard);
        assert!(done_rx.try_recv().is_ok());
        assert_eq!(frames.len(), 1);
        assert!(status.is_running());
        assert!(releaser.is_released());
    }
}
