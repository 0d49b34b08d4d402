//! 目录回放帧源
//! Replays recorded `color_*.png` / `depth_*.png` pairs in a loop

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::types::{AlignedFrames, CameraIntrinsics, DepthFrame};
use super::{FrameSource, StreamProfile};
use crate::error::SourceError;

/// intrinsics.json 内容
#[derive(Deserialize)]
struct ReplayCalibration {
    #[serde(flatten)]
    intrinsics: CameraIntrinsics,
    #[serde(default = "default_depth_scale")]
    depth_scale: f32,
}

fn default_depth_scale() -> f32 {
    0.001
}

/// 回放帧源
pub struct ReplaySource {
    dir: PathBuf,
    pairs: Vec<(PathBuf, PathBuf)>,
    depth_scale: f32,
    cursor: usize,
    frame_number: u64,
    interval: Option<Duration>,
    last_frame_at: Option<Instant>,
}

impl ReplaySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pairs: Vec::new(),
            depth_scale: default_depth_scale(),
            cursor: 0,
            frame_number: 0,
            interval: None,
            last_frame_at: None,
        }
    }

    /// 列出成对的帧文件, sorted by the shared suffix
    fn scan(dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>, SourceError> {
        let mut suffixes: Vec<String> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_prefix("color_")
                    .filter(|rest| rest.ends_with(".png"))
                    .map(str::to_owned)
            })
            .filter(|suffix| dir.join(format!("depth_{suffix}")).exists())
            .collect();
        suffixes.sort();

        Ok(suffixes
            .into_iter()
            .map(|s| (dir.join(format!("color_{s}")), dir.join(format!("depth_{s}"))))
            .collect())
    }

    fn load_pair(&self, index: usize) -> Result<AlignedFrames, SourceError> {
        let (color_path, depth_path) = &self.pairs[index];
        let color = image::open(color_path)?.into_rgb8();
        let depth_img = image::open(depth_path)?.into_luma16();

        let depth = DepthFrame {
            width: depth_img.width(),
            height: depth_img.height(),
            data: depth_img.into_raw(),
            depth_scale: self.depth_scale,
        };

        Ok(AlignedFrames {
            color,
            depth,
            frame_number: self.frame_number,
            timestamp_us: chrono::Utc::now().timestamp_micros(),
        })
    }
}

impl FrameSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn start(&mut self, profile: &StreamProfile) -> Result<CameraIntrinsics, SourceError> {
        let json = fs::read_to_string(self.dir.join("intrinsics.json"))?;
        let calibration: ReplayCalibration = serde_json::from_str(&json)?;
        let intrinsics = calibration.intrinsics;

        if intrinsics.width != profile.width || intrinsics.height != profile.height {
            return Err(SourceError::UnsupportedProfile {
                width: profile.width,
                height: profile.height,
                fps: profile.fps,
            });
        }

        let pairs = Self::scan(&self.dir)?;
        if pairs.is_empty() {
            return Err(SourceError::EmptyReplay(self.dir.clone()));
        }
        tracing::debug!(dir = %self.dir.display(), frames = pairs.len(), "replay loaded");

        self.pairs = pairs;
        self.depth_scale = calibration.depth_scale;
        self.cursor = 0;
        self.frame_number = 0;
        self.interval = Some(profile.frame_interval());
        self.last_frame_at = None;
        Ok(intrinsics)
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Option<AlignedFrames>, SourceError> {
        let interval = self.interval.ok_or(SourceError::NotStarted)?;

        if let Some(last) = self.last_frame_at {
            let due = last + interval;
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > timeout {
                    std::thread::sleep(timeout);
                    return Ok(None);
                }
                std::thread::sleep(wait);
            }
        }

        let frames = self.load_pair(self.cursor)?;
        self.cursor = (self.cursor + 1) % self.pairs.len();
        self.frame_number += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Some(frames))
    }

    fn stop(&mut self) {
        self.interval = None;
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb, RgbImage};

    fn write_recording(dir: &Path, frames: usize) {
        let intrinsics = CameraIntrinsics::pinhole(8, 6, 7.0, 7.0);
        fs::write(
            dir.join("intrinsics.json"),
            serde_json::to_string(&intrinsics).unwrap(),
        )
        .unwrap();

        for i in 0..frames {
            RgbImage::from_pixel(8, 6, Rgb([i as u8, 0, 0]))
                .save(dir.join(format!("color_{i:04}.png")))
                .unwrap();
            ImageBuffer::<Luma<u16>, Vec<u16>>::from_pixel(8, 6, Luma([1000 + i as u16]))
                .save(dir.join(format!("depth_{i:04}.png")))
                .unwrap();
        }
    }

    #[test]
    fn replays_pairs_in_order_and_loops() {
        let dir = tempfile::tempdir().unwrap();
        write_recording(dir.path(), 2);

        let mut source = ReplaySource::new(dir.path());
        source.start(&StreamProfile::new(8, 6, 1000)).unwrap();

        let timeout = Duration::from_millis(100);
        let a = source.wait_for_frames(timeout).unwrap().unwrap();
        let b = source.wait_for_frames(timeout).unwrap().unwrap();
        let c = source.wait_for_frames(timeout).unwrap().unwrap();
        assert_eq!(a.color.get_pixel(0, 0).0[0], 0);
        assert_eq!(b.color.get_pixel(0, 0).0[0], 1);
        assert_eq!(c.color.get_pixel(0, 0).0[0], 0);
        assert!((b.depth.distance(3, 3) - 1.001).abs() < 1e-4);
    }

    #[test]
    fn rejects_mismatched_profile() {
        let dir = tempfile::tempdir().unwrap();
        write_recording(dir.path(), 1);

        let mut source = ReplaySource::new(dir.path());
        assert!(matches!(
            source.start(&StreamProfile::new(640, 480, 30)),
            Err(SourceError::UnsupportedProfile { .. })
        ));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_recording(dir.path(), 0);

        let mut source = ReplaySource::new(dir.path());
        assert!(matches!(
            source.start(&StreamProfile::new(8, 6, 30)),
            Err(SourceError::EmptyReplay(_))
        ));
    }
}
