//! 合成帧源 - 在中性背景上绘制固定深度的彩色圆盘
//! Synthetic color+depth source for demos and tests

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

use super::types::{AlignedFrames, CameraIntrinsics, DepthFrame};
use super::{FrameSource, StreamProfile};
use crate::error::SourceError;

const BACKGROUND: [u8; 3] = [128, 128, 128];
const DEPTH_SCALE: f32 = 0.001;

/// 合成球 (a filled disc at a fixed distance)
#[derive(Clone, Debug)]
pub struct SyntheticBall {
    pub rgb: [u8; 3],
    /// 圆心, relative to the frame size (0..1)
    pub center: (f32, f32),
    pub radius_px: f32,
    pub depth_m: f32,
    /// 绕圆心轨道半径 (px) 与角速度 (rad/frame)
    pub orbit: Option<(f32, f32)>,
}

impl SyntheticBall {
    pub fn new(rgb: [u8; 3], center: (f32, f32), radius_px: f32, depth_m: f32) -> Self {
        Self {
            rgb,
            center,
            radius_px,
            depth_m,
            orbit: None,
        }
    }

    pub fn orbiting(mut self, radius_px: f32, rad_per_frame: f32) -> Self {
        self.orbit = Some((radius_px, rad_per_frame));
        self
    }

    fn center_at(&self, width: u32, height: u32, frame_number: u64) -> (f32, f32) {
        let cx = self.center.0 * width as f32;
        let cy = self.center.1 * height as f32;
        match self.orbit {
            Some((r, w)) => {
                let a = w * frame_number as f32;
                (cx + r * a.cos(), cy + r * a.sin())
            }
            None => (cx, cy),
        }
    }
}

/// 合成帧源
pub struct SyntheticSource {
    balls: Vec<SyntheticBall>,
    supported: Option<Vec<StreamProfile>>,
    paced: bool,
    noise: u8,
    rng: StdRng,
    profile: Option<StreamProfile>,
    frame_number: u64,
    next_frame_at: Instant,
}

impl SyntheticSource {
    pub fn new(balls: Vec<SyntheticBall>) -> Self {
        Self {
            balls,
            supported: None,
            paced: true,
            noise: 0,
            rng: StdRng::seed_from_u64(0x6a75_6767),
            profile: None,
            frame_number: 0,
            next_frame_at: Instant::now(),
        }
    }

    /// 四色默认场景, one ball per factory color
    pub fn default_scene() -> Self {
        Self::new(vec![
            SyntheticBall::new([230, 40, 170], (0.2, 0.3), 18.0, 1.2),
            SyntheticBall::new([255, 100, 0], (0.8, 0.3), 18.0, 1.4),
            SyntheticBall::new([0, 200, 0], (0.5, 0.5), 20.0, 1.0).orbiting(60.0, 0.05),
            SyntheticBall::new([230, 230, 0], (0.5, 0.8), 18.0, 1.6),
        ])
    }

    /// 限制可启动的配置 (模拟相机不支持的模式)
    pub fn with_supported_profiles(mut self, profiles: Vec<StreamProfile>) -> Self {
        self.supported = Some(profiles);
        self
    }

    /// 关闭按帧率节流, frames are produced as fast as requested
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// 背景噪声幅度
    pub fn with_noise(mut self, amplitude: u8) -> Self {
        self.noise = amplitude;
        self
    }

    fn render(&mut self, profile: StreamProfile) -> AlignedFrames {
        let (w, h) = (profile.width, profile.height);
        let mut color = RgbImage::from_pixel(w, h, Rgb(BACKGROUND));
        let mut depth = DepthFrame::new(w, h, DEPTH_SCALE);

        if self.noise > 0 {
            let n = self.noise as i16;
            for px in color.pixels_mut() {
                let d = self.rng.gen_range(-n..=n);
                for c in px.0.iter_mut() {
                    *c = (*c as i16 + d).clamp(0, 255) as u8;
                }
            }
        }

        for ball in &self.balls {
            let (cx, cy) = ball.center_at(w, h, self.frame_number);
            let r = ball.radius_px;
            let x0 = (cx - r).floor().max(0.0) as u32;
            let y0 = (cy - r).floor().max(0.0) as u32;
            let x1 = ((cx + r).ceil() as u32).min(w.saturating_sub(1));
            let y1 = ((cy + r).ceil() as u32).min(h.saturating_sub(1));
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let dx = x as f32 + 0.5 - cx;
                    let dy = y as f32 + 0.5 - cy;
                    if dx * dx + dy * dy <= r * r {
                        color.put_pixel(x, y, Rgb(ball.rgb));
                        depth.set_distance(x, y, ball.depth_m);
                    }
                }
            }
        }

        let frames = AlignedFrames {
            color,
            depth,
            frame_number: self.frame_number,
            timestamp_us: chrono::Utc::now().timestamp_micros(),
        };
        self.frame_number += 1;
        frames
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn start(&mut self, profile: &StreamProfile) -> Result<CameraIntrinsics, SourceError> {
        if let Some(supported) = &self.supported {
            if !supported.contains(profile) {
                return Err(SourceError::UnsupportedProfile {
                    width: profile.width,
                    height: profile.height,
                    fps: profile.fps,
                });
            }
        }
        self.profile = Some(*profile);
        self.frame_number = 0;
        self.next_frame_at = Instant::now();

        let f = 0.96 * profile.width as f32;
        Ok(CameraIntrinsics::pinhole(profile.width, profile.height, f, f))
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Option<AlignedFrames>, SourceError> {
        let profile = self.profile.ok_or(SourceError::NotStarted)?;

        if self.paced {
            let now = Instant::now();
            if self.next_frame_at > now {
                let wait = self.next_frame_at - now;
                if wait > timeout {
                    std::thread::sleep(timeout);
                    return Ok(None);
                }
                std::thread::sleep(wait);
            }
            self.next_frame_at = Instant::now().max(self.next_frame_at) + profile.frame_interval();
        }

        Ok(Some(self.render(profile)))
    }

    fn stop(&mut self) {
        self.profile = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_disc_with_depth_and_invalid_background() {
        let mut source =
            SyntheticSource::new(vec![SyntheticBall::new([0, 200, 0], (0.5, 0.5), 10.0, 1.0)])
                .unpaced();
        source.start(&StreamProfile::new(64, 48, 30)).unwrap();

        let frames = source.wait_for_frames(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(frames.color.get_pixel(32, 24).0, [0, 200, 0]);
        assert!((frames.depth.distance(32, 24) - 1.0).abs() < 1e-3);
        assert_eq!(frames.depth.distance(0, 0), 0.0);
        assert_eq!(frames.color.get_pixel(0, 0).0, BACKGROUND);
    }

    #[test]
    fn frame_numbers_increase() {
        let mut source = SyntheticSource::default_scene().unpaced();
        source.start(&StreamProfile::new(64, 48, 30)).unwrap();
        let a = source.wait_for_frames(Duration::ZERO).unwrap().unwrap();
        let b = source.wait_for_frames(Duration::ZERO).unwrap().unwrap();
        assert_eq!(b.frame_number, a.frame_number + 1);
    }

    #[test]
    fn waiting_before_start_is_an_error() {
        let mut source = SyntheticSource::default_scene();
        assert!(matches!(
            source.wait_for_frames(Duration::ZERO),
            Err(SourceError::NotStarted)
        ));
    }
}
