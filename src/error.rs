//! 错误类型
//!
//! 启动失败 → [`EngineError`]; 其余错误记录日志或转为命令响应

use std::path::PathBuf;

/// 引擎启动 / 运行错误
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 所有相机模式均启动失败
    #[error("camera unavailable: no stream mode succeeded ({attempts} attempted, last error: {last})")]
    NoCameraMode { attempts: usize, last: String },

    /// 检测模型加载失败
    #[error("failed to load detector: {0}")]
    DetectorLoad(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 帧源错误
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unsupported stream profile {width}x{height}@{fps}")]
    UnsupportedProfile { width: u32, height: u32, fps: u32 },

    #[error("source not started")]
    NotStarted,

    #[error("replay directory {0} has no frames")]
    EmptyReplay(PathBuf),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 颜色设置文件读写错误
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file {path} unreadable: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {path} malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("settings file {path} not writable: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 颜色标定错误
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalibrationError {
    #[error("color '{0}' not found")]
    UnknownColor(String),

    #[error("click point ({x}, {y}) outside {width}x{height} frame")]
    OutOfFrame { x: u32, y: u32, width: u32, height: u32 },
}

/// 设备寻址: ball id / subnet → address
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddressError {
    #[error("invalid subnet prefix '{0}', expected three octets like 10.54.136")]
    InvalidSubnet(String),

    #[error("ball id '{0}' is not a valid host octet (1-255 or 'all')")]
    InvalidIdentity(String),
}

/// 输出模块生命周期错误
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("module setup failed: {0}")]
    Setup(String),

    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
