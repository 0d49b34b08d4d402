/// 引擎 (Engine)
///
/// 双线程:
/// - 帧循环 (调用者线程): 取帧 → 检测 → FrameRecord → 模块 update → 发布 → 摘要
/// - 命令循环 (scoped 线程): 控制通道请求 + 内部命令队列
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::bus::CommandBus;
use crate::command::CommandResponse;
use crate::config::EngineConfig;
use crate::detection::TrackerStrategy;
use crate::error::EngineError;
use crate::input::{start_first_supported, FrameSource};
use crate::net::{ControlChannel, FramePublisher};
use crate::summary::SummaryWriter;

pub use crate::record::{EngineStatus, FrameRecord};

/// 停止句柄, observed within one frame wait
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ========== 统计 ==========

/// 每秒窗口统计
struct FrameStats {
    count: u32,
    detect_total: Duration,
    dropped: u64,
    last: Instant,
    current_fps: f64,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            count: 0,
            detect_total: Duration::ZERO,
            dropped: 0,
            last: Instant::now(),
            current_fps: 0.0,
        }
    }

    fn tick(&mut self, detect: Duration, published: bool) {
        self.count += 1;
        self.detect_total += detect;
        if !published {
            self.dropped += 1;
        }

        let elapsed = self.last.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.current_fps = self.count as f64 / elapsed.as_secs_f64();
            let detect_ms = self.detect_total.as_secs_f64() * 1000.0 / self.count as f64;
            tracing::debug!(
                fps = format_args!("{:.1}", self.current_fps),
                detect_ms = format_args!("{:.2}", detect_ms),
                dropped = self.dropped,
                "frame loop"
            );
            self.count = 0;
            self.detect_total = Duration::ZERO;
            self.last = Instant::now();
        }
    }
}

// ========== 引擎 ==========

pub struct Engine {
    config: EngineConfig,
    source: Box<dyn FrameSource>,
    strategy: TrackerStrategy,
    bus: Arc<CommandBus>,
    publisher: Box<dyn FramePublisher>,
    control: Box<dyn ControlChannel>,
    summary: SummaryWriter,
    running: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        source: Box<dyn FrameSource>,
        strategy: TrackerStrategy,
        publisher: Box<dyn FramePublisher>,
        control: Box<dyn ControlChannel>,
    ) -> Self {
        let bus = Arc::new(CommandBus::from_config(&config));
        let summary = SummaryWriter::stdout(config.summary);
        Self {
            config,
            source,
            strategy,
            bus,
            publisher,
            control,
            summary,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_summary(mut self, summary: SummaryWriter) -> Self {
        self.summary = summary;
        self
    }

    pub fn bus(&self) -> Arc<CommandBus> {
        self.bus.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 运行至停止 (or for `run_for`); fails only when no stream profile starts
    pub fn run(&mut self, run_for: Option<Duration>) -> Result<(), EngineError> {
        let Engine {
            config,
            source,
            strategy,
            bus,
            publisher,
            control,
            summary,
            running,
        } = self;

        let (profile, intrinsics) = start_first_supported(source, config.stream)?;
        running.store(true, Ordering::SeqCst);
        bus.start_residents();
        tracing::info!(
            source = source.name(),
            %profile,
            mode = %strategy.mode(),
            summary = ?summary.format(),
            "engine running"
        );

        let frame_timeout = config.frame_timeout();
        let poll_interval = config.command_poll_interval();
        let downscale = config.downscale;
        let bus: &CommandBus = bus;
        let running: &AtomicBool = running;
        let control: &mut dyn ControlChannel = control.as_mut();

        let result = thread::scope(|scope| -> Result<(), EngineError> {
            let command_loop = thread::Builder::new()
                .name("command-loop".into())
                .spawn_scoped(scope, move || {
                    run_command_loop(bus, control, running, poll_interval)
                });
            if let Err(e) = command_loop {
                running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }

            let started = Instant::now();
            let mut stats = FrameStats::new();
            let mut camera_connected = true;

            while running.load(Ordering::SeqCst) {
                if run_for.is_some_and(|limit| started.elapsed() >= limit) {
                    tracing::info!("run time elapsed");
                    break;
                }

                // 1. 取帧
                let frames = match source.wait_for_frames(frame_timeout) {
                    Ok(Some(frames)) => {
                        if !camera_connected {
                            tracing::info!("frames resumed");
                        }
                        camera_connected = true;
                        frames
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        if camera_connected {
                            tracing::warn!(error = %e, "frame source failed");
                        }
                        camera_connected = false;
                        thread::sleep(frame_timeout);
                        continue;
                    }
                };

                // 2. 检测
                let t0 = Instant::now();
                let detections = strategy.detect(&frames, &intrinsics, downscale);
                let detect_time = t0.elapsed();

                // 3. 帧记录
                let record = FrameRecord {
                    timestamp_us: frames.timestamp_us,
                    frame_number: frames.frame_number,
                    width: frames.color.width(),
                    height: frames.color.height(),
                    intrinsics: intrinsics.clone(),
                    detections,
                    status: EngineStatus {
                        camera_connected,
                        running: true,
                        fps: stats.current_fps,
                        tracking_mode: strategy.mode(),
                        active_module: bus.active_name(),
                    },
                };

                // 4. 模块 update (skipped while the command loop holds the slot)
                bus.update_active(&record);

                // 5. 发布
                let published = publisher.publish(&record);

                // 6. 摘要
                summary.write(&record);

                stats.tick(detect_time, published);
            }

            running.store(false, Ordering::SeqCst);
            Ok(())
        });

        bus.shutdown();
        source.stop();
        tracing::info!("engine stopped");
        result
    }
}

/// 命令循环: one poll of each queue per iteration, sleeps when idle
fn run_command_loop(
    bus: &CommandBus,
    control: &mut dyn ControlChannel,
    running: &AtomicBool,
    idle: Duration,
) {
    tracing::debug!("command loop started");
    while running.load(Ordering::SeqCst) {
        let mut worked = false;

        if let Some(request) = control.try_recv() {
            worked = true;
            let response = match request {
                Ok(command) => bus.handle_external(command),
                Err(e) => {
                    tracing::warn!(error = %e, "malformed request");
                    CommandResponse::fail(format!("Malformed request: {e}"))
                }
            };
            control.respond(&response);
        }

        if let Some(routed) = bus.try_pop() {
            worked = true;
            bus.handle_internal(routed);
        }

        if !worked {
            thread::sleep(idle);
        }
    }

    let pending = bus.pending();
    if pending > 0 {
        tracing::debug!(pending, "internal commands discarded at shutdown");
    }
    tracing::debug!("command loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ColorTracker;
    use crate::input::{StreamProfile, SyntheticSource};
    use crate::net::{channel_publisher, control_pair};

    fn config() -> EngineConfig {
        EngineConfig {
            resident_modules: Vec::new(),
            stream: StreamProfile::new(320, 240, 30),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn stop_handle_ends_run() {
        let (publisher, frames) = channel_publisher(64);
        let (control, _client) = control_pair();
        let mut engine = Engine::new(
            config(),
            Box::new(SyntheticSource::default_scene()),
            TrackerStrategy::Passthrough,
            Box::new(publisher),
            Box::new(control),
        );
        let stop = engine.stop_handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            stop.stop();
        });
        engine.run(Some(Duration::from_secs(10))).unwrap();
        stopper.join().unwrap();

        assert!(!engine.is_running());
        let first = frames.try_recv().unwrap();
        assert!(first.detections.is_empty());
        assert_eq!(first.status.tracking_mode, crate::detection::TrackingMode::Passthrough);
    }

    #[test]
    fn no_profile_is_fatal() {
        let (publisher, _frames) = channel_publisher(1);
        let (control, _client) = control_pair();
        let mut engine = Engine::new(
            config(),
            Box::new(SyntheticSource::default_scene().with_supported_profiles(vec![])),
            TrackerStrategy::Color(ColorTracker::new(Default::default())),
            Box::new(publisher),
            Box::new(control),
        );
        assert!(matches!(
            engine.run(Some(Duration::from_millis(50))),
            Err(EngineError::NoCameraMode { .. })
        ));
        assert!(!engine.is_running());
    }

    #[test]
    fn run_can_be_repeated() {
        let (publisher, frames) = channel_publisher(256);
        let (control, _client) = control_pair();
        let mut engine = Engine::new(
            config(),
            Box::new(SyntheticSource::default_scene()),
            TrackerStrategy::Passthrough,
            Box::new(publisher),
            Box::new(control),
        );
        engine.run(Some(Duration::from_millis(150))).unwrap();
        let after_first = frames.len();
        engine.run(Some(Duration::from_millis(150))).unwrap();
        assert!(after_first > 0);
        assert!(frames.len() > after_first);
    }
}
