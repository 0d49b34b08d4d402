pub mod bus; // 命令总线
pub mod cli; // 命令行参数
pub mod command; // 命令与响应
pub mod config; // 引擎参数配置
pub mod detection; // 颜色分割 / 神经网络检测
pub mod engine; // 帧循环 + 命令循环
pub mod error;
pub mod input; // 帧输入系统
pub mod modules; // 输出模块
pub mod net; // UDP 控制包 / 帧发布 / 控制通道
pub mod record; // 帧记录
pub mod summary; // 运行摘要
pub mod utils;

pub use crate::bus::CommandBus;
pub use crate::command::{Command, CommandResponse, Rgb, RoutedCommand};
pub use crate::config::{EngineConfig, TrackingConfig};
pub use crate::engine::{Engine, StopHandle};
pub use crate::error::{EngineError, ModuleError};
pub use crate::record::{EngineStatus, FrameRecord};

/// 生成时间字符串 (calibration snapshot names)
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
