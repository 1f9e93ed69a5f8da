// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 编码帧缓冲 (工作线程 → 推流消费者)
//! Bounded JPEG frame buffer with drop-oldest overflow

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 默认容量 (帧)
pub const DEFAULT_CAPACITY: usize = 10;

/// 有界帧队列: 写满时丢弃最旧的帧, 发布永不阻塞
///
/// 发送端与接收端都保存在结构体里, 可随意克隆给多个消费者
#[derive(Clone)]
pub struct FrameBuffer {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    dropped: Arc<AtomicU64>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 发布一帧 (非阻塞)
    pub fn publish(&self, frame: Vec<u8>) {
        let mut pending = frame;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    // 队列满: 丢弃最旧帧后重试
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    pending = back;
                }
                // 两端都在本结构体中, 不会断开
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// 取一帧, 最多等待 `timeout`; 超时返回 `None`
    pub fn consume(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// 清空队列, 返回丢弃的帧数
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// 因溢出被丢弃的帧总数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
