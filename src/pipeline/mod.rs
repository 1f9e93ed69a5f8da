// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 工作线程与控制面之间的共享队列 (Worker/consumer plumbing)
///
/// - FrameBuffer:    编码帧有界队列, 满时丢弃最旧帧
/// - CommandChannel: 计数线配置命令, 每轮迭代开始时全部取出
/// - ReleaseHandle:  采集设备 / 预览窗口的一次性释放标记
pub mod command;
pub mod frame_buffer;
pub mod release;

pub use command::CommandChannel;
pub use frame_buffer::FrameBuffer;
pub use release::ReleaseHandle;
