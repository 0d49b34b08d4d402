/// 帧输入系统 (Frame Input System)
///
/// 为引擎提供对齐的彩色+深度帧与相机内参
/// - FrameSource:     帧源接口 (start / wait_for_frames / stop)
/// - SyntheticSource: 合成场景 (彩色圆盘 + 固定深度)
/// - ReplaySource:    目录回放 (color_*.png / depth_*.png / intrinsics.json)
pub mod replay;
pub mod synthetic;
pub mod types;

pub use replay::ReplaySource;
pub use synthetic::{SyntheticBall, SyntheticSource};
pub use types::{AlignedFrames, CameraIntrinsics, DepthFrame, DistortionModel};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EngineError, SourceError};

/// 流配置 (resolution + frame rate)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamProfile {
    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

impl Default for StreamProfile {
    fn default() -> Self {
        Self::new(640, 480, 30)
    }
}

impl std::fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

/// 回退配置, tried in order after the preferred profile
pub const FALLBACK_PROFILES: [StreamProfile; 3] = [
    StreamProfile::new(640, 480, 30),
    StreamProfile::new(640, 480, 15),
    StreamProfile::new(424, 240, 30),
];

/// 帧源接口
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// 以指定配置启动, 返回彩色流内参
    fn start(&mut self, profile: &StreamProfile) -> Result<CameraIntrinsics, SourceError>;

    /// 等待下一组对齐帧; `Ok(None)` 表示超时
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Option<AlignedFrames>, SourceError>;

    fn stop(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(&mut self, profile: &StreamProfile) -> Result<CameraIntrinsics, SourceError> {
        (**self).start(profile)
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Option<AlignedFrames>, SourceError> {
        (**self).wait_for_frames(timeout)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// 依次尝试首选配置与回退配置, 返回第一个成功启动的
pub fn start_first_supported<S: FrameSource + ?Sized>(
    source: &mut S,
    preferred: StreamProfile,
) -> Result<(StreamProfile, CameraIntrinsics), EngineError> {
    let mut candidates = vec![preferred];
    candidates.extend(FALLBACK_PROFILES.iter().copied().filter(|p| *p != preferred));

    let mut last = String::from("no profile tried");
    for profile in &candidates {
        match source.start(profile) {
            Ok(intrinsics) => {
                tracing::info!(source = source.name(), %profile, "stream started");
                return Ok((*profile, intrinsics));
            }
            Err(e) => {
                tracing::warn!(source = source.name(), %profile, error = %e, "stream profile rejected");
                last = e.to_string();
            }
        }
    }

    Err(EngineError::NoCameraMode {
        attempts: candidates.len(),
        last,
    })
}
