//! 运行摘要 (compact per-frame lines for operators)

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{self, Write};

use crate::record::FrameRecord;

/// 摘要格式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SummaryFormat {
    #[default]
    Off,
    /// `#<n> <fps> fps | <label> (x, y, z) ...`
    Simple,
    /// `<timestamp_us>,<label>,<x>,<y>,<z>` per detection
    Legacy,
}

/// 按帧渲染摘要行
pub fn render(format: SummaryFormat, record: &FrameRecord) -> Vec<String> {
    match format {
        SummaryFormat::Off => Vec::new(),
        SummaryFormat::Simple => {
            let mut line = format!("#{} {:.1} fps |", record.frame_number, record.status.fps);
            if record.detections.is_empty() {
                line.push_str(" -");
            }
            for d in &record.detections {
                let p = d.position;
                let _ = write!(line, " {} ({:.3}, {:.3}, {:.3})", d.label, p.x, p.y, p.z);
            }
            vec![line]
        }
        SummaryFormat::Legacy => record
            .detections
            .iter()
            .map(|d| {
                let p = d.position;
                format!(
                    "{},{},{:.4},{:.4},{:.4}",
                    record.timestamp_us, d.label, p.x, p.y, p.z
                )
            })
            .collect(),
    }
}

/// 摘要输出端
pub struct SummaryWriter {
    format: SummaryFormat,
    out: Box<dyn Write + Send>,
}

impl SummaryWriter {
    pub fn new(format: SummaryFormat, out: Box<dyn Write + Send>) -> Self {
        Self { format, out }
    }

    pub fn stdout(format: SummaryFormat) -> Self {
        Self::new(format, Box::new(io::stdout()))
    }

    pub fn format(&self) -> SummaryFormat {
        self.format
    }

    pub fn write(&mut self, record: &FrameRecord) {
        for line in render(self.format, record) {
            if let Err(e) = writeln!(self.out, "{line}") {
                tracing::warn!(error = %e, "summary output failed, disabling");
                self.format = SummaryFormat::Off;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, Pixel, Position3, TrackingMode};
    use crate::input::CameraIntrinsics;
    use crate::record::EngineStatus;

    fn record(detections: Vec<(&str, [f32; 3])>) -> FrameRecord {
        FrameRecord {
            timestamp_us: 1_700_000,
            frame_number: 42,
            width: 640,
            height: 480,
            intrinsics: CameraIntrinsics::pinhole(640, 480, 600.0, 600.0),
            detections: detections
                .into_iter()
                .map(|(label, p)| Detection {
                    id: format!("{label}_0"),
                    label: label.into(),
                    center: Pixel::default(),
                    position: Position3::from(p),
                    confidence: 1.0,
                    is_held: false,
                    timestamp_us: 1_700_000,
                })
                .collect(),
            status: EngineStatus {
                camera_connected: true,
                running: true,
                fps: 29.96,
                tracking_mode: TrackingMode::Color,
                active_module: None,
            },
        }
    }

    #[test]
    fn simple_line() {
        let r = record(vec![("green", [0.1, -0.25, 1.0]), ("pink", [0.0, 0.0, 1.5])]);
        assert_eq!(
            render(SummaryFormat::Simple, &r),
            vec!["#42 30.0 fps | green (0.100, -0.250, 1.000) pink (0.000, 0.000, 1.500)"]
        );
        assert_eq!(render(SummaryFormat::Simple, &record(vec![])), vec!["#42 30.0 fps | -"]);
    }

    #[test]
    fn legacy_lines_per_detection() {
        let r = record(vec![("green", [0.1, -0.25, 1.0]), ("pink", [0.0, 0.0, 1.5])]);
        assert_eq!(
            render(SummaryFormat::Legacy, &r),
            vec![
                "1700000,green,0.1000,-0.2500,1.0000",
                "1700000,pink,0.0000,0.0000,1.5000"
            ]
        );
        assert!(render(SummaryFormat::Off, &r).is_empty());
    }

    #[test]
    fn format_parses_from_config() {
        let f: SummaryFormat = serde_json::from_str("\"legacy\"").unwrap();
        assert_eq!(f, SummaryFormat::Legacy);
    }
}
