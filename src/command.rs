//! 命令与响应 (commands exchanged with the controller and between modules)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 模块参数 (key → value)
pub type ModuleArgs = BTreeMap<String, serde_json::Value>;

/// 读取字符串形式的参数; numbers and booleans are rendered as text
pub fn arg_str(args: &ModuleArgs, key: &str) -> Option<String> {
    match args.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// RGB 颜色
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// 命令
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    LoadModule {
        module_name: String,
        #[serde(default)]
        module_args: ModuleArgs,
    },
    UnloadModule,
    ConfigureModule {
        #[serde(default)]
        module_name: String,
        #[serde(default)]
        module_args: ModuleArgs,
    },
    #[serde(rename = "SEND_COLOR_COMMAND")]
    SendColor { ball_id: String, color: Rgb },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::LoadModule { .. } => "LOAD_MODULE",
            Command::UnloadModule => "UNLOAD_MODULE",
            Command::ConfigureModule { .. } => "CONFIGURE_MODULE",
            Command::SendColor { .. } => "SEND_COLOR_COMMAND",
        }
    }
}

/// 响应 (exactly one per external request)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 内部命令 + 目标模块
#[derive(Clone, Debug, PartialEq)]
pub struct RoutedCommand {
    pub command: Command,
    /// `None` lets the bus pick the default route for the command kind
    pub target: Option<String>,
}

impl RoutedCommand {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            target: None,
        }
    }

    pub fn to(command: Command, target: impl Into<String>) -> Self {
        Self {
            command,
            target: Some(target.into()),
        }
    }
}
