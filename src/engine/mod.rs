// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 计数工作线程 (Counting worker)
///
/// - CountingEngine: 主循环, 独占采集设备 / 跟踪集合 / 计数线 / 人数
/// - EngineStatus:   控制面可读的原子状态 (代数 / 阶段 / 人数 / 运行标记)
/// - Annotator:      画面标注 + JPEG 编码
/// - PreviewSink:    预览策略 (headless 时为空)
/// - ResourceReleaser / ExitGuard: 正常退出与强制停止共用的清理
pub mod annotate;
pub mod cleanup;
pub mod preview;
pub mod status;
pub mod worker;

pub use annotate::{encode_jpeg, Annotator};
pub use cleanup::{ExitGuard, ResourceReleaser};
pub use preview::{PreviewSink, SnapshotPreview};
pub use status::EngineStatus;
pub use worker::{CountingEngine, EngineParts, EngineSettings, RunToken, StepOutcome};
