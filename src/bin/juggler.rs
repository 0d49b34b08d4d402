/// 杂耍球跟踪引擎 (Juggler Engine)
///
/// 运行模式:
/// - tracking:  颜色分割 (或神经网络) 跟踪 → 发布 → 模块调度
/// - calibrate: 单帧点击标定, 保存颜色设置
/// - stream:    仅推流
///
/// 直接运行: cargo run --bin juggler -- --mode tracking --summary simple
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;

use juggler_engine::cli::{self, Args, Mode, SourceKind};
use juggler_engine::detection::{ColorTracker, TrackerStrategy};
use juggler_engine::input::{start_first_supported, FrameSource, ReplaySource, SyntheticSource};
use juggler_engine::net::{TcpControlServer, UdpFramePublisher};
use juggler_engine::{gen_time_string, Engine, EngineConfig};

fn main() -> Result<()> {
    let args = Args::parse_from(cli::sanitize_args(std::env::args()));
    cli::init_logging(&args.log_level);

    let mut config = EngineConfig::load(&args.config);
    args.apply(&mut config);

    let source = build_source(&args)?;
    match args.mode {
        Mode::Calibrate => calibrate(&args, &config, source),
        Mode::Tracking | Mode::Stream => run(&args, config, source),
    }
}

fn build_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    Ok(match args.source {
        SourceKind::Synthetic => Box::new(SyntheticSource::default_scene()),
        SourceKind::Replay => {
            let dir = args
                .replay_dir
                .as_deref()
                .context("--source replay requires --replay-dir")?;
            Box::new(ReplaySource::new(dir))
        }
    })
}

fn build_strategy(args: &Args, config: &EngineConfig) -> Result<TrackerStrategy> {
    if args.mode == Mode::Stream {
        return Ok(TrackerStrategy::Passthrough);
    }
    if args.hand_tracking || config.model_path.is_some() {
        let Some(model) = config.model_path.as_deref() else {
            bail!("--hand-tracking requires --model");
        };
        return neural_strategy(model, config);
    }

    let mut tracker = ColorTracker::new(config.tracking.clone());
    tracker.load_settings(Path::new(&config.settings_path));
    Ok(TrackerStrategy::Color(tracker))
}

#[cfg(feature = "onnx")]
fn neural_strategy(model: &str, config: &EngineConfig) -> Result<TrackerStrategy> {
    use juggler_engine::detection::{ByteTracker, NeuralTracker, OnnxDetector};

    let detector = OnnxDetector::load(model, config.tracking.model_input_size)?;
    Ok(TrackerStrategy::Neural(NeuralTracker::new(
        Box::new(detector),
        Box::new(ByteTracker::default()),
        &config.tracking,
    )))
}

#[cfg(not(feature = "onnx"))]
fn neural_strategy(model: &str, _config: &EngineConfig) -> Result<TrackerStrategy> {
    bail!("cannot load {model}: built without the `onnx` feature")
}

fn run(args: &Args, config: EngineConfig, source: Box<dyn FrameSource>) -> Result<()> {
    let strategy = build_strategy(args, &config)?;
    let publisher = UdpFramePublisher::bind(&config.publish_addr)
        .with_context(|| format!("failed to open publisher {}", config.publish_addr))?;
    let control = TcpControlServer::bind(&config.command_addr)
        .with_context(|| format!("failed to bind command channel {}", config.command_addr))?;

    let mut engine = Engine::new(config, source, strategy, Box::new(publisher), Box::new(control));
    engine.run(args.run_for())?;
    Ok(())
}

fn calibrate(args: &Args, config: &EngineConfig, mut source: Box<dyn FrameSource>) -> Result<()> {
    let (profile, _) = start_first_supported(&mut source, config.stream)?;

    let mut frames = None;
    for _ in 0..50 {
        if let Some(f) = source.wait_for_frames(Duration::from_millis(200))? {
            frames = Some(f);
            break;
        }
    }
    source.stop();
    let frames = frames.context("no frame received for calibration")?;

    let click = args
        .click
        .unwrap_or((profile.width / 2, profile.height / 2));
    let settings = Path::new(&config.settings_path);

    let mut tracker = ColorTracker::new(config.tracking.clone());
    tracker.load_settings(settings);
    let calibrated = tracker.calibrate_frame(&args.color, &frames.color, click)?;
    tracker.save_settings(settings)?;

    let snapshot = format!("calibration_{}.png", gen_time_string("-"));
    match frames.color.save(&snapshot) {
        Ok(()) => tracing::info!(path = %snapshot, "calibration frame saved"),
        Err(e) => tracing::warn!(error = %e, "calibration frame not saved"),
    }

    println!(
        "{} calibrated at ({}, {}): min {:?} max {:?}{}",
        calibrated.name,
        click.0,
        click.1,
        calibrated.primary.min,
        calibrated.primary.max,
        calibrated
            .secondary
            .map(|s| format!(" / min {:?} max {:?}", s.min, s.max))
            .unwrap_or_default()
    );
    Ok(())
}
