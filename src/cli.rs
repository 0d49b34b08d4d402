//! 命令行参数与日志初始化

use clap::{CommandFactory, Parser, ValueEnum};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::input::StreamProfile;
use crate::summary::SummaryFormat;

/// 运行模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// 颜色 (或神经网络) 跟踪 + 模块调度
    Tracking,
    /// 单帧颜色标定
    Calibrate,
    /// 仅推流, no detections
    Stream,
}

/// 帧源
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    Synthetic,
    Replay,
}

/// 杂耍球跟踪引擎参数
#[derive(Parser, Debug)]
#[command(author, version, about = "杂耍球 3D 跟踪与调度引擎", long_about = None)]
pub struct Args {
    /// 运行模式
    #[arg(long, value_enum, default_value_t = Mode::Tracking)]
    pub mode: Mode,

    /// 引擎配置文件 (JSON), created with defaults when missing
    #[arg(short, long, default_value = "engine_config.json")]
    pub config: String,

    /// 颜色设置文件
    #[arg(long)]
    pub settings: Option<String>,

    /// 帧源
    #[arg(long, value_enum, default_value_t = SourceKind::Synthetic)]
    pub source: SourceKind,

    /// 回放目录 (color_*.png / depth_*.png / intrinsics.json)
    #[arg(long)]
    pub replay_dir: Option<String>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub fps: Option<u32>,

    /// 颜色分割降采样系数 (0 < s <= 1)
    #[arg(long)]
    pub downscale: Option<f32>,

    /// 使用神经网络检测 + 身份跟踪 (requires --model)
    #[arg(long)]
    pub hand_tracking: bool,

    /// 帧发布地址
    #[arg(long)]
    pub publish: Option<String>,

    /// 命令通道地址
    #[arg(long)]
    pub command: Option<String>,

    /// ONNX 模型路径
    #[arg(long)]
    pub model: Option<String>,

    /// 运行摘要格式
    #[arg(long, value_enum)]
    pub summary: Option<SummaryFormat>,

    /// 标定颜色名
    #[arg(long, default_value = "green")]
    pub color: String,

    /// 标定点击坐标 X,Y
    #[arg(long, value_parser = parse_click)]
    pub click: Option<(u32, u32)>,

    /// 运行秒数, runs until interrupted when absent
    #[arg(long)]
    pub run_for: Option<f64>,

    /// 日志级别, RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// 命令行覆盖配置文件
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(path) = &self.settings {
            config.settings_path = path.clone();
        }
        if let Some(addr) = &self.publish {
            config.publish_addr = addr.clone();
        }
        if let Some(addr) = &self.command {
            config.command_addr = addr.clone();
        }
        if let Some(model) = &self.model {
            config.model_path = Some(model.clone());
        }
        if let Some(summary) = self.summary {
            config.summary = summary;
        }
        if let Some(scale) = self.downscale {
            if scale > 0.0 && scale <= 1.0 {
                config.downscale = scale;
            } else {
                tracing::warn!(scale, "downscale out of range, ignored");
            }
        }
        config.stream = StreamProfile::new(
            self.width.unwrap_or(config.stream.width),
            self.height.unwrap_or(config.stream.height),
            self.fps.unwrap_or(config.stream.fps),
        );
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.run_for
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

fn parse_click(s: &str) -> Result<(u32, u32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{s}'"))?;
    let x = x.trim().parse().map_err(|_| format!("invalid x '{x}'"))?;
    let y = y.trim().parse().map_err(|_| format!("invalid y '{y}'"))?;
    Ok((x, y))
}

/// 移除未知的 `--flag` (and a value that follows it)
pub fn sanitize_args<I>(argv: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let command = Args::command();
    let known: Vec<String> = command
        .get_arguments()
        .filter_map(|a| a.get_long().map(str::to_string))
        .chain(["help".to_string(), "version".to_string()])
        .collect();

    let mut out = Vec::new();
    let mut iter = argv.into_iter().peekable();
    if let Some(program) = iter.next() {
        out.push(program);
    }
    while let Some(arg) = iter.next() {
        let Some(long) = arg.strip_prefix("--") else {
            out.push(arg);
            continue;
        };
        let (name, inline_value) = match long.split_once('=') {
            Some((name, _)) => (name, true),
            None => (long, false),
        };
        if name.is_empty() || known.iter().any(|k| k == name) {
            out.push(arg);
            continue;
        }
        // 日志尚未初始化
        eprintln!("warning: ignoring unknown flag {arg}");
        if !inline_value && iter.peek().is_some_and(|next| !next.starts_with('-')) {
            iter.next();
        }
    }
    out
}

/// 初始化日志 (RUST_LOG overrides `level`)
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
