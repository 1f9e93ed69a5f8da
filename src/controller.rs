// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 启停编排: 启动 / 停止工作线程, 控制面读写入口
//! Lifecycle controller for the counting worker

use crate::config::CounterConfig;
use crate::counting::{Command, Phase};
use crate::detection::{DetectorOptions, PersonDetector, YoloPersonDetector};
use crate::engine::{
    CountingEngine, EngineParts, EngineSettings, EngineStatus, ExitGuard, PreviewSink,
    ResourceReleaser, RunToken, SnapshotPreview,
};
use crate::error::{CounterError, Result};
use crate::input::{CaptureOptions, FfmpegCapture, FrameSource};
use crate::pipeline::{CommandChannel, FrameBuffer, ReleaseHandle};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// MJPEG 推流的 Content-Type
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// 工作线程所需外部能力的构造器 (在工作线程内调用)
pub trait EngineFactory: Send + Sync {
    /// 打开视频源; 释放标记置位后视频源应停止产出画面
    fn open_source(&self, release: ReleaseHandle) -> anyhow::Result<Box<dyn FrameSource>>;

    fn load_detector(&self) -> anyhow::Result<Box<dyn PersonDetector>>;

    /// 预览策略, headless 返回 `None`
    fn open_preview(&self, release: ReleaseHandle)
        -> anyhow::Result<Option<Box<dyn PreviewSink>>>;
}

/// FFmpeg 采集 + YOLOv8 检测 + 快照预览
pub struct FfmpegYoloFactory {
    config: CounterConfig,
}

impl FfmpegYoloFactory {
    pub fn new(config: CounterConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for FfmpegYoloFactory {
    fn open_source(&self, release: ReleaseHandle) -> anyhow::Result<Box<dyn FrameSource>> {
        let options = CaptureOptions {
            width: self.config.capture_width,
            height: self.config.capture_height,
            mirror: self.config.mirror,
            timeout: self.config.capture_timeout(),
        };
        let capture = FfmpegCapture::open(self.config.input_source(), options, release)?;
        Ok(Box::new(capture))
    }

    fn load_detector(&self) -> anyhow::Result<Box<dyn PersonDetector>> {
        let options = DetectorOptions {
            input_size: self.config.inference_size,
            conf_threshold: self.config.model_conf,
            iou_threshold: self.config.nms_iou,
            intra_threads: self.config.intra_threads,
        };
        let detector = YoloPersonDetector::new(&self.config.model_path, options)?;
        Ok(Box::new(detector))
    }

    fn open_preview(
        &self,
        release: ReleaseHandle,
    ) -> anyhow::Result<Option<Box<dyn PreviewSink>>> {
        if self.config.headless {
            return Ok(None);
        }
        Ok(Some(Box::new(SnapshotPreview::new(
            &self.config.snapshot_path,
            release,
        ))))
    }
}

/// `start()` 结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// `stop()` 结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
    /// 另一个停止请求正在进行
    InProgress,
    Failed(String),
}

impl StopOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            StopOutcome::Stopped => "stopped",
            StopOutcome::AlreadyStopped => "already_stopped",
            StopOutcome::InProgress => "stop_in_progress",
            StopOutcome::Failed(_) => "error",
        }
    }
}

struct WorkerHandle {
    handle: JoinHandle<()>,
    token: RunToken,
    done: Receiver<()>,
    releaser: ResourceReleaser,
}

/// 计数控制器: 唯一持有运行状态的实例, 通过 `Arc` 共享给 HTTP 层
pub struct CounterController {
    factory: Arc<dyn EngineFactory>,
    settings: EngineSettings,
    stop_timeout: Duration,
    consume_timeout: Duration,
    frames: FrameBuffer,
    commands: CommandChannel,
    status: Arc<EngineStatus>,
    worker: Mutex<Option<WorkerHandle>>,
    /// start / stop 串行
    lifecycle: Mutex<()>,
    /// 仅在停止过程中持有
    stop_lock: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CounterController {
    pub fn new(config: &CounterConfig, factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_settings(
            EngineSettings::from_config(config),
            config.frame_buffer_capacity,
            config.stop_timeout(),
            config.consume_timeout(),
            factory,
        )
    }

    pub fn with_settings(
        settings: EngineSettings,
        buffer_capacity: usize,
        stop_timeout: Duration,
        consume_timeout: Duration,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        Self {
            factory,
            settings,
            stop_timeout,
            consume_timeout,
            frames: FrameBuffer::new(buffer_capacity),
            commands: CommandChannel::new(),
            status: Arc::new(EngineStatus::new()),
            worker: Mutex::new(None),
            lifecycle: Mutex::new(()),
            stop_lock: Mutex::new(()),
        }
    }

    /// 启动工作线程 (Setup 阶段); 已在运行时不做任何事
    pub fn start(&self) -> Result<StartOutcome> {
        // 与 stop 串行: 停止过程中不会插入新一轮
        let _serial = lock(&self.lifecycle);
        let mut worker = lock(&self.worker);

        if let Some(current) = worker.as_ref() {
            if self.status.is_running() && !current.handle.is_finished() {
                debug!("⏭️ 工作线程已在运行");
                return Ok(StartOutcome::AlreadyRunning);
            }
        }
        // 上一轮已自行结束
        if let Some(previous) = worker.take() {
            if previous.handle.is_finished() {
                let _ = previous.handle.join();
            }
        }

        self.frames.clear();
        self.commands.clear();

        let generation = self.status.begin_run();
        let token = RunToken::new(generation);
        let releaser = ResourceReleaser::new(
            self.frames.clone(),
            self.commands.clone(),
            ReleaseHandle::new(),
            ReleaseHandle::new(),
        );
        let (done_tx, done_rx) = bounded(1);

        let spawned = {
            let factory = self.factory.clone();
            let settings = self.settings.clone();
            let frames = self.frames.clone();
            let commands = self.commands.clone();
            let status = self.status.clone();
            let token = token.clone();
            let releaser = releaser.clone();

            std::thread::Builder::new()
                .name(format!("counting-{}", generation))
                .spawn(move || {
                    let _guard =
                        ExitGuard::new(releaser.clone(), status.clone(), generation, done_tx);
                    let parts = match build_parts(factory.as_ref(), &releaser) {
                        Ok(parts) => parts,
                        Err(e) => {
                            error!("❌ {}", e);
                            return;
                        }
                    };
                    CountingEngine::new(parts, settings, frames, commands, status, token).run();
                })
        };

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.status.abandon(generation);
                return Err(CounterError::Spawn(e));
            }
        };

        *worker = Some(WorkerHandle {
            handle,
            token,
            done: done_rx,
            releaser,
        });
        info!("🚀 计数已启动 (Gen: {})", generation);
        Ok(StartOutcome::Started)
    }

    /// 停止工作线程
    ///
    /// 同一时间只允许一个停止请求, 其余立即返回 `InProgress`.
    /// 工作线程已自行退出时返回 `AlreadyStopped`.
    /// 超过停止超时仍未退出则强制释放资源并视为完成.
    pub fn stop(&self) -> StopOutcome {
        let _stopping = match self.stop_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                info!("⏳ 停止请求进行中");
                return StopOutcome::InProgress;
            }
        };
        let _serial = lock(&self.lifecycle);

        let Some(worker) = lock(&self.worker).take() else {
            debug!("⏭️ 工作线程未运行");
            return StopOutcome::AlreadyStopped;
        };

        let generation = worker.token.generation();
        if worker.handle.is_finished() || !self.status.is_running() {
            // 采集 / 检测失败等原因已自行结束, 清理已由工作线程完成
            if worker.handle.join().is_err() {
                warn!("⚠️ 工作线程曾异常退出 (Gen: {})", generation);
            }
            info!("⏭️ 工作线程已退出 (Gen: {})", generation);
            return StopOutcome::AlreadyStopped;
        }

        info!("🛑 正在停止 (Gen: {})", generation);
        worker.token.cancel();

        match worker.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match worker.handle.join() {
                Ok(()) => {
                    info!("✅ 已停止 (Gen: {})", generation);
                    StopOutcome::Stopped
                }
                Err(_) => {
                    error!("❌ 工作线程异常退出 (Gen: {}), 强制清理", generation);
                    self.status.abandon(generation);
                    worker.releaser.release_all();
                    StopOutcome::Failed("工作线程异常退出".to_string())
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "⏱️ 停止超时 ({}ms), 强制释放资源 (Gen: {})",
                    self.stop_timeout.as_millis(),
                    generation
                );
                self.status.abandon(generation);
                worker.releaser.release_all();
                StopOutcome::Stopped
            }
        }
    }

    /// 更新计数线 (未运行时丢弃)
    pub fn set_line(&self, position: i64, angle: i64) -> bool {
        if !self.status.is_running() {
            debug!("⏭️ 未运行, 忽略计数线更新");
            return false;
        }
        self.commands.send(Command::SetPosition(position));
        self.commands.send(Command::SetAngle(angle));
        true
    }

    /// Setup → Counting
    pub fn begin_counting(&self) -> bool {
        let switched = self.status.begin_counting();
        if switched {
            info!("🔢 开始计数");
        } else {
            debug!("⏭️ 当前阶段 {} 不能开始计数", self.status.phase().name());
        }
        switched
    }

    pub fn get_count(&self) -> u32 {
        self.status.count()
    }

    pub fn phase(&self) -> Phase {
        self.status.phase()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// 推流读取端
    pub fn stream(&self) -> FrameStream {
        FrameStream {
            frames: self.frames.clone(),
            status: self.status.clone(),
            timeout: self.consume_timeout,
        }
    }
}

/// 在工作线程内构造外部能力
fn build_parts(factory: &dyn EngineFactory, releaser: &ResourceReleaser) -> Result<EngineParts> {
    let source = factory
        .open_source(releaser.capture_handle())
        .map_err(CounterError::capture)?;
    let detector = factory.load_detector().map_err(CounterError::model)?;
    let preview = factory
        .open_preview(releaser.preview_handle())
        .map_err(CounterError::preview)?;
    Ok(EngineParts {
        source,
        detector,
        preview,
    })
}

/// 推流消费者: 逐帧取 JPEG, 工作线程停止后结束
#[derive(Clone)]
pub struct FrameStream {
    frames: FrameBuffer,
    status: Arc<EngineStatus>,
    timeout: Duration,
}

impl FrameStream {
    /// 阻塞等待下一帧; 工作线程不在运行时返回 `None`
    pub fn next_frame(&self) -> Option<Vec<u8>> {
        loop {
            if !self.status.is_running() {
                return None;
            }
            if let Some(frame) = self.frames.consume(self.timeout) {
                return Some(frame);
            }
        }
    }
}

/// 一帧 multipart 分块
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(jpeg.len() + 64);
    chunk.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}
