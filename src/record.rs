//! 帧记录 (one published frame)

use serde::{Deserialize, Serialize};

use crate::detection::{Detection, TrackingMode};
use crate::input::CameraIntrinsics;

/// 引擎状态块
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub camera_connected: bool,
    pub running: bool,
    pub fps: f64,
    pub tracking_mode: TrackingMode,
    pub active_module: Option<String>,
}

/// 帧记录, immutable once assembled
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp_us: i64,
    pub frame_number: u64,
    pub width: u32,
    pub height: u32,
    pub intrinsics: CameraIntrinsics,
    pub detections: Vec<Detection>,
    pub status: EngineStatus,
}

impl FrameRecord {
    /// 按标签查找第一个目标
    pub fn first_labelled(&self, label: &str) -> Option<&Detection> {
        self.detections.iter().find(|d| d.label == label)
    }
}
