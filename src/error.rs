// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数工作线程错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("采集失败: {0}")]
    Capture(String),

    #[error("连续 {0} 次未取到画面")]
    CaptureExhausted(u32),

    #[error("检测失败: {0}")]
    Detection(String),

    #[error("JPEG 编码失败: {0}")]
    Encode(#[from] image::ImageError),

    #[error("预览失败: {0}")]
    Preview(String),

    #[error("模型加载失败: {0}")]
    Model(String),

    #[error("工作线程启动失败: {0}")]
    Spawn(#[from] std::io::Error),
}

impl CounterError {
    pub fn capture(e: anyhow::Error) -> Self {
        Self::Capture(format!("{e:#}"))
    }

    pub fn detection(e: anyhow::Error) -> Self {
        Self::Detection(format!("{e:#}"))
    }

    pub fn preview(e: anyhow::Error) -> Self {
        Self::Preview(format!("{e:#}"))
    }

    pub fn model(e: anyhow::Error) -> Self {
        Self::Model(format!("{e:#}"))
    }
}

pub type Result<T> = std::result::Result<T, CounterError>;
