use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use juggler_engine::command::{Command, ModuleArgs, Rgb, RoutedCommand};
use juggler_engine::detection::TrackingMode;
use juggler_engine::error::ModuleError;
use juggler_engine::input::CameraIntrinsics;
use juggler_engine::modules::{ModuleRegistry, OutputModule};
use juggler_engine::{CommandBus, EngineStatus, FrameRecord};

/// 每帧发出一个颜色命令, ball_id = 帧号
struct Emitter;

impl OutputModule for Emitter {
    fn name(&self) -> &str {
        "emitter"
    }
    fn setup(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
    fn update(&mut self, record: &FrameRecord, enqueue: &mut dyn FnMut(RoutedCommand)) {
        enqueue(RoutedCommand::to(
            Command::SendColor {
                ball_id: record.frame_number.to_string(),
                color: Rgb::new(0, 0, 0),
            },
            "recorder",
        ));
    }
    fn cleanup(&mut self) {}
    fn process_command(&mut self, _command: &Command) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// 记录收到的 ball_id
struct Recorder(Arc<Mutex<Vec<u64>>>);

impl OutputModule for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }
    fn setup(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
    fn update(&mut self, _record: &FrameRecord, _enqueue: &mut dyn FnMut(RoutedCommand)) {}
    fn cleanup(&mut self) {}
    fn process_command(&mut self, command: &Command) -> Result<(), ModuleError> {
        if let Command::SendColor { ball_id, .. } = command {
            self.0.lock().unwrap().push(ball_id.parse().unwrap());
        }
        Ok(())
    }
}

fn bus(received: &Arc<Mutex<Vec<u64>>>) -> Arc<CommandBus> {
    let mut registry = ModuleRegistry::new();
    registry.register("emitter", || Box::new(Emitter));
    let received = received.clone();
    registry.register("recorder", move || Box::new(Recorder(received.clone())));
    Arc::new(CommandBus::new(registry, "recorder", vec!["recorder".into()]))
}

fn record(frame_number: u64) -> FrameRecord {
    FrameRecord {
        timestamp_us: frame_number as i64,
        frame_number,
        width: 64,
        height: 48,
        intrinsics: CameraIntrinsics::pinhole(64, 48, 60.0, 60.0),
        detections: Vec::new(),
        status: EngineStatus {
            camera_connected: true,
            running: true,
            fps: 0.0,
            tracking_mode: TrackingMode::Passthrough,
            active_module: Some("emitter".into()),
        },
    }
}

/// 命令循环的最小版本
fn spawn_command_loop(bus: Arc<CommandBus>, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::SeqCst) || bus.pending() > 0 {
            match bus.try_pop() {
                Some(routed) => bus.handle_internal(routed),
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
    })
}

#[test]
fn every_enqueued_command_is_dispatched_once_in_order() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let bus = bus(&received);
    bus.start_residents();
    assert!(bus
        .handle_external(Command::LoadModule {
            module_name: "emitter".into(),
            module_args: ModuleArgs::new(),
        })
        .success);

    let running = Arc::new(AtomicBool::new(true));
    let command_loop = spawn_command_loop(bus.clone(), running.clone());

    let mut delivered_updates = Vec::new();
    for frame in 0..2_000u64 {
        if bus.update_active(&record(frame)) {
            delivered_updates.push(frame);
        }
    }
    running.store(false, Ordering::SeqCst);
    command_loop.join().unwrap();

    assert!(!delivered_updates.is_empty());
    assert_eq!(*received.lock().unwrap(), delivered_updates);
}

#[test]
fn enqueue_from_many_threads_keeps_per_sender_order() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let bus = bus(&received);
    bus.start_residents();

    let running = Arc::new(AtomicBool::new(true));
    let command_loop = spawn_command_loop(bus.clone(), running.clone());

    let senders: Vec<_> = (0..4u64)
        .map(|t| {
            let tx = bus.enqueuer();
            thread::spawn(move || {
                for i in 0..250u64 {
                    tx.send(RoutedCommand::new(Command::SendColor {
                        ball_id: (t * 1_000 + i).to_string(),
                        color: Rgb::new(1, 1, 1),
                    }))
                    .unwrap();
                }
            })
        })
        .collect();
    for s in senders {
        s.join().unwrap();
    }
    running.store(false, Ordering::SeqCst);
    command_loop.join().unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1_000);
    for t in 0..4u64 {
        let ours: Vec<u64> = received.iter().copied().filter(|v| v / 1_000 == t).collect();
        let expected: Vec<u64> = (0..250).map(|i| t * 1_000 + i).collect();
        assert_eq!(ours, expected);
    }
}
