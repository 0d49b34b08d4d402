//! 跟踪策略 (chosen once at engine construction)

use super::neural::NeuralTracker;
use super::segmentation::ColorTracker;
use super::types::Detection;
use crate::input::{AlignedFrames, CameraIntrinsics};

/// 跟踪模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    Color,
    Neural,
    Passthrough,
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TrackingMode::Color => "color",
            TrackingMode::Neural => "neural",
            TrackingMode::Passthrough => "passthrough",
        })
    }
}

/// 跟踪策略
pub enum TrackerStrategy {
    Color(ColorTracker),
    Neural(NeuralTracker),
    /// 仅推流, no detections
    Passthrough,
}

impl TrackerStrategy {
    pub fn mode(&self) -> TrackingMode {
        match self {
            TrackerStrategy::Color(_) => TrackingMode::Color,
            TrackerStrategy::Neural(_) => TrackingMode::Neural,
            TrackerStrategy::Passthrough => TrackingMode::Passthrough,
        }
    }

    /// 单帧检测; never fails, zero detections is a valid outcome
    pub fn detect(
        &mut self,
        frames: &AlignedFrames,
        intrinsics: &CameraIntrinsics,
        downscale: f32,
    ) -> Vec<Detection> {
        match self {
            TrackerStrategy::Color(tracker) => tracker.detect(frames, intrinsics, downscale),
            TrackerStrategy::Neural(tracker) => tracker.detect(frames, intrinsics),
            TrackerStrategy::Passthrough => Vec::new(),
        }
    }
}
