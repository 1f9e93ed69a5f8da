// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数器配置 - 通过JSON文件调整参数, 命令行覆盖

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::input::InputSource;

/// 计数器参数配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CounterConfig {
    // === 采集 ===
    pub source: String,           // 摄像头序号 / 设备路径 / RTSP / 视频文件
    pub capture_width: u32,       // 采集宽度
    pub capture_height: u32,      // 采集高度
    pub mirror: bool,             // 水平镜像
    pub capture_timeout_ms: u64,  // 单次取帧超时
    pub max_capture_failures: u32, // 连续取帧失败上限

    // === 检测 ===
    pub model_path: String,
    pub inference_size: u32,   // 模型输入边长
    pub model_conf: f32,       // 模型置信度下限
    pub nms_iou: f32,          // NMS IOU阈值
    pub intra_threads: usize,  // ONNX Runtime 线程数
    pub person_conf: f32,      // 计数用置信度阈值
    pub person_min_size: i32,  // 计数用最小框宽高 (像素)

    // === 跟踪 ===
    pub match_distance: f32, // 最近邻匹配距离 (像素)

    // === 工作线程 ===
    pub frame_buffer_capacity: usize,
    pub frame_interval_ms: u64,
    pub stop_timeout_ms: u64,
    pub consume_timeout_ms: u64,
    pub jpeg_quality: u8,

    // === 预览 ===
    pub headless: bool,
    pub snapshot_path: String,
    pub font_path: Option<String>,

    // === HTTP ===
    pub bind: String,
    pub port: u16,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            capture_width: 480,
            capture_height: 360,
            mirror: true,
            capture_timeout_ms: 2000,
            max_capture_failures: 50,

            model_path: "models/yolov8n.onnx".to_string(),
            inference_size: 640,
            model_conf: 0.25,
            nms_iou: 0.45,
            intra_threads: 4,
            person_conf: 0.35,
            person_min_size: 30,

            match_distance: 100.0,

            frame_buffer_capacity: 10,
            frame_interval_ms: 30,
            stop_timeout_ms: 3000,
            consume_timeout_ms: 500,
            jpeg_quality: 80,

            headless: true,
            snapshot_path: "preview.jpg".to_string(),
            font_path: None,

            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl CounterConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写入默认配置; 解析失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在, 创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    pub fn input_source(&self) -> InputSource {
        InputSource::parse(&self.source)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn consume_timeout(&self) -> Duration {
        Duration::from_millis(self.consume_timeout_ms)
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️ 当前计数器配置:");
        info!("  视频源: {}", self.source);
        info!(
            "  采集尺寸: {}x{} (镜像: {})",
            self.capture_width, self.capture_height, self.mirror
        );
        info!("  模型: {} ({}px)", self.model_path, self.inference_size);
        info!(
            "  计数阈值: 置信度 {:.2}, 最小尺寸 {}px, 匹配距离 {:.0}px",
            self.person_conf, self.person_min_size, self.match_distance
        );
        info!("  预览: {}", if self.headless { "关闭" } else { self.snapshot_path.as_str() });
        info!("  HTTP: {}:{}", self.bind, self.port);
    }
}

/// 命令行参数 (覆盖配置文件)
#[derive(Parser, Clone, Debug, Default)]
#[command(author, version, about = "YOLOv8 室内人数统计服务")]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "people_counter.json")]
    pub config: String,

    /// 视频源: 摄像头序号 / 设备路径 / RTSP地址 / 视频文件
    #[arg(short, long)]
    pub source: Option<String>,

    /// ONNX 模型路径
    #[arg(short, long)]
    pub model: Option<String>,

    /// HTTP 端口
    #[arg(short, long)]
    pub port: Option<u16>,

    /// 不写预览快照
    #[arg(long, conflicts_with = "preview")]
    pub headless: bool,

    /// 写预览快照
    #[arg(long)]
    pub preview: bool,

    /// 启动后立即开始采集
    #[arg(long)]
    pub autostart: bool,
}

impl Args {
    /// 用命令行值覆盖配置
    pub fn apply(&self, config: &mut CounterConfig) {
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.headless {
            config.headless = true;
        }
        if self.preview {
            config.headless = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");

        let config = CounterConfig::load(&path);
        assert_eq!(config, CounterConfig::default());
        assert!(path.exists());
        assert_eq!(CounterConfig::load(&path), CounterConfig::default());
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(CounterConfig::load(&path), CounterConfig::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        fs::write(&path, r#"{ "source": "rtsp://cam/1", "port": 9000 }"#).unwrap();

        let config = CounterConfig::load(&path);
        assert_eq!(config.source, "rtsp://cam/1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.frame_buffer_capacity, 10);
        assert_eq!(config.stop_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn command_line_overrides_file_values() {
        let args = Args::parse_from(["people-counter", "--source", "2", "--port", "8080", "--preview"]);
        let mut config = CounterConfig::default();
        args.apply(&mut config);
        assert_eq!(config.source, "2");
        assert_eq!(config.port, 8080);
        assert!(!config.headless);
        assert_eq!(config.model_path, CounterConfig::default().model_path);
    }
}
