use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, UdpSocket};
use std::thread;
use std::time::Duration;

use juggler_engine::command::{Command, ModuleArgs};
use juggler_engine::config::{EngineConfig, RelayConfig, TrackingConfig};
use juggler_engine::detection::{ColorTracker, TrackerStrategy, TrackingMode};
use juggler_engine::input::{StreamProfile, SyntheticBall, SyntheticSource};
use juggler_engine::net::{channel_publisher, control_pair, TcpControlServer};
use juggler_engine::summary::{SummaryFormat, SummaryWriter};
use juggler_engine::{CommandResponse, Engine};

const WAIT: Duration = Duration::from_secs(5);

fn config(relay_port: u16) -> EngineConfig {
    EngineConfig {
        stream: StreamProfile::new(640, 480, 30),
        relay: RelayConfig {
            subnet: "127.0.0".into(),
            port: relay_port,
            brightness: None,
            brightness_delay_ms: 0,
        },
        resident_modules: vec!["relay".into()],
        ..EngineConfig::default()
    }
}

fn green_ball_scene() -> SyntheticSource {
    SyntheticSource::new(vec![SyntheticBall::new([0, 200, 0], (0.5, 0.5), 20.0, 1.0)])
}

fn quiet(engine: Engine) -> Engine {
    engine.with_summary(SummaryWriter::new(SummaryFormat::Off, Box::new(io::sink())))
}

#[test]
fn green_ball_is_published_and_drives_the_relay() {
    let relay_rx = UdpSocket::bind("127.0.0.1:0").unwrap();
    relay_rx.set_read_timeout(Some(WAIT)).unwrap();
    let relay_port = relay_rx.local_addr().unwrap().port();

    let (publisher, frames) = channel_publisher(512);
    let (control, client) = control_pair();
    let mut engine = quiet(Engine::new(
        config(relay_port),
        Box::new(green_ball_scene()),
        TrackerStrategy::Color(ColorTracker::new(TrackingConfig::default())),
        Box::new(publisher),
        Box::new(control),
    ));
    let stop = engine.stop_handle();

    let driver = thread::spawn(move || {
        let mut args = ModuleArgs::new();
        args.insert("target_ball_id".into(), "1".into());
        let loaded = client.request(
            Command::LoadModule {
                module_name: "PositionToRgbModule".into(),
                module_args: args,
            },
            WAIT,
        );

        let mut packet = [0u8; 32];
        let received = relay_rx.recv(&mut packet).map(|n| packet[..n].to_vec());

        let unloaded = client.request(Command::UnloadModule, WAIT);
        let unloaded_again = client.request(Command::UnloadModule, WAIT);
        stop.stop();
        (loaded, received, unloaded, unloaded_again)
    });

    engine.run(Some(Duration::from_secs(20))).unwrap();
    let (loaded, received, unloaded, unloaded_again) = driver.join().unwrap();

    assert!(loaded.unwrap().success);
    assert!(unloaded.unwrap().success);
    assert_eq!(
        unloaded_again.unwrap(),
        CommandResponse::fail("No active module")
    );

    // 绿色球在画面中心, 1 米处 → x, y ≈ 0 → (128, 128, 255)
    let packet = received.unwrap();
    assert_eq!(packet.len(), 12);
    assert_eq!(&packet[..8], &[66, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(packet[8], 0x0A);
    assert!((120..=136).contains(&packet[9]), "r = {}", packet[9]);
    assert!((120..=136).contains(&packet[10]), "g = {}", packet[10]);
    assert_eq!(packet[11], 255);

    let records: Vec<_> = frames.try_iter().collect();
    assert!(!records.is_empty());
    let record = records
        .iter()
        .find(|r| !r.detections.is_empty())
        .expect("no frame with detections");
    assert_eq!(record.detections.len(), 1);
    let ball = &record.detections[0];
    assert_eq!(ball.label, "green");
    assert!((ball.position.z - 1.0).abs() < 0.02, "z = {}", ball.position.z);
    assert!((ball.center.x - 320.0).abs() < 2.0);
    assert!((ball.center.y - 240.0).abs() < 2.0);
    assert_eq!(record.status.tracking_mode, TrackingMode::Color);
    assert!(record.status.camera_connected);

    // 帧号单调递增
    assert!(records
        .windows(2)
        .all(|w| w[0].frame_number < w[1].frame_number));
    assert!(records
        .iter()
        .any(|r| r.status.active_module.as_deref() == Some("position_to_color")));
}

#[test]
fn default_relay_timing_keeps_the_internal_queue_short() {
    let relay_rx = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut config = config(0);
    config.relay = RelayConfig {
        subnet: "127.0.0".into(),
        port: relay_rx.local_addr().unwrap().port(),
        ..RelayConfig::default()
    };
    assert!(config.relay.brightness.is_some());
    assert!(config.relay.brightness_delay_ms > 0);

    let (publisher, _frames) = channel_publisher(8);
    let (control, client) = control_pair();
    let mut engine = quiet(Engine::new(
        config,
        Box::new(green_ball_scene()),
        TrackerStrategy::Color(ColorTracker::new(TrackingConfig::default())),
        Box::new(publisher),
        Box::new(control),
    ));
    let stop = engine.stop_handle();
    let bus = engine.bus();

    let driver = thread::spawn(move || {
        let mut args = ModuleArgs::new();
        args.insert("target_ball_id".into(), "1".into());
        let loaded = client.request(
            Command::LoadModule {
                module_name: "position_to_color".into(),
                module_args: args,
            },
            WAIT,
        );

        // 3 秒内每 100ms 采样一次积压
        let mut samples = Vec::new();
        for _ in 0..30 {
            thread::sleep(Duration::from_millis(100));
            samples.push(bus.pending());
        }
        stop.stop();
        (loaded, samples)
    });

    engine.run(Some(Duration::from_secs(20))).unwrap();
    let (loaded, samples) = driver.join().unwrap();

    assert!(loaded.unwrap().success);
    let peak = samples.iter().copied().max().unwrap_or(0);
    assert!(peak <= 10, "pending samples = {samples:?}");
    assert!(samples[20..].iter().all(|&n| n <= 5), "pending samples = {samples:?}");
}

#[test]
fn tcp_controller_gets_one_response_per_request() {
    let server = TcpControlServer::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();

    let (publisher, _frames) = channel_publisher(8);
    let mut config = config(9);
    config.resident_modules.clear();
    let mut engine = quiet(Engine::new(
        config,
        Box::new(green_ball_scene()),
        TrackerStrategy::Passthrough,
        Box::new(publisher),
        Box::new(server),
    ));
    let stop = engine.stop_handle();

    let driver = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(WAIT)).unwrap();
        stream
            .write_all(
                concat!(
                    "{\"type\":\"UNLOAD_MODULE\"}\n",
                    "{\"type\":\"LOAD_MODULE\",\"module_name\":\"nonexistent\"}\n",
                    "{\"type\":\"CONFIGURE_MODULE\",\"module_args\":{\"label\":\"pink\"}}\n",
                    "{\"type\":\"LOAD_MODULE\",\"module_name\":\"position_to_color\"}\n",
                    "{\"type\":\"CONFIGURE_MODULE\",\"module_name\":\"relay\"}\n",
                    "{oops\n",
                )
                .as_bytes(),
            )
            .unwrap();

        let mut reader = BufReader::new(stream);
        let mut responses = Vec::new();
        for _ in 0..6 {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            responses.push(serde_json::from_str::<CommandResponse>(&line).unwrap());
        }
        stop.stop();
        responses
    });

    engine.run(Some(Duration::from_secs(20))).unwrap();
    let responses = driver.join().unwrap();

    let success: Vec<bool> = responses.iter().map(|r| r.success).collect();
    assert_eq!(success, vec![false, false, false, true, false, false]);
    assert_eq!(responses[0].message, "No active module");
    assert_eq!(responses[2].message, "No active module");
}
