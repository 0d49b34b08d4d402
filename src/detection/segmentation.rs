//! 颜色分割跟踪器 (Color Segmentation Tracker)
//!
//! 每帧流程:
//! 1. RGB → HSV (一次, 所有颜色共享)
//! 2. 可选降采样
//! 3. 阈值分割 + 形态学开/闭运算
//! 4. 外轮廓 → 质心 → 邻近合并
//! 5. 深度采样 → 反投影 → Detection

use fast_image_resize as fr;
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use std::path::Path;

use super::color::{self, default_profiles, ColorProfile, HsvRange};
use super::depth::sample_and_deproject;
use super::types::{Detection, Pixel};
use crate::config::TrackingConfig;
use crate::error::{CalibrationError, SettingsError};
use crate::input::{AlignedFrames, CameraIntrinsics};
use crate::utils::resize_rgb;

// ========== 颜色空间 ==========

/// RGB → HSV, OpenCV 8-bit convention (H 0-179, S/V 0-255)
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let r = rgb[0] as f32;
    let g = rgb[1] as f32;
    let b = rgb[2] as f32;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let s = if max > 0.0 { diff * 255.0 / max } else { 0.0 };
    let h = if diff == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    let h = (h / 2.0).round() as u16 % 180;
    [h as u8, s.round() as u8, max as u8]
}

/// 整帧 HSV 转换 (HSV stored in a 3-channel buffer)
pub fn hsv_image(color: &RgbImage) -> RgbImage {
    let mut hsv = RgbImage::new(color.width(), color.height());
    for (dst, src) in hsv.pixels_mut().zip(color.pixels()) {
        dst.0 = rgb_to_hsv(src.0);
    }
    hsv
}

/// 阈值分割
pub fn color_mask(hsv: &RgbImage, profile: &ColorProfile) -> GrayImage {
    let mut mask = GrayImage::new(hsv.width(), hsv.height());
    for (dst, src) in mask.pixels_mut().zip(hsv.pixels()) {
        if profile.contains(src.0) {
            *dst = Luma([255]);
        }
    }
    mask
}

// ========== 轮廓与合并 ==========

/// 多边形面积与质心 (from the zeroth and first moments)
fn polygon_moments(points: &[(f32, f32)]) -> (f32, f32, f32) {
    let n = points.len();
    let (mut m00, mut m10, mut m01) = (0.0f32, 0.0f32, 0.0f32);
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];
        let cross = x0 * y1 - x1 * y0;
        m00 += cross;
        m10 += (x0 + x1) * cross;
        m01 += (y0 + y1) * cross;
    }
    (m00 / 2.0, m10 / 6.0, m01 / 6.0)
}

/// 外轮廓质心, keeping contours with area strictly above `min_area`
pub fn blob_centers(mask: &GrayImage, min_area: f64) -> Vec<(f32, f32)> {
    let mut centers = Vec::new();
    for contour in find_contours::<i32>(mask) {
        if !matches!(contour.border_type, BorderType::Outer) || contour.parent.is_some() {
            continue;
        }
        let pts: Vec<(f32, f32)> = contour
            .points
            .iter()
            .map(|p| (p.x as f32, p.y as f32))
            .collect();
        let (m00, m10, m01) = polygon_moments(&pts);
        if (m00.abs() as f64) <= min_area || m00 == 0.0 {
            continue;
        }
        centers.push((m10 / m00, m01 / m00));
    }
    centers
}

fn merge_pass(points: &[(f32, f32)], threshold: f32) -> Vec<(f32, f32)> {
    let near = |a: (f32, f32), b: (f32, f32)| {
        let dx = a.0 - b.0;
        let dy = a.1 - b.1;
        (dx * dx + dy * dy).sqrt() < threshold
    };

    let mut visited = vec![false; points.len()];
    let mut merged = Vec::new();
    for start in 0..points.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![start];
        let (mut sx, mut sy, mut count) = (0.0f32, 0.0f32, 0usize);
        while let Some(i) = stack.pop() {
            sx += points[i].0;
            sy += points[i].1;
            count += 1;
            for j in 0..points.len() {
                if !visited[j] && near(points[i], points[j]) {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }
        merged.push((sx / count as f32, sy / count as f32));
    }
    merged
}

/// 邻近点合并 (single-linkage, strict `<`)
///
/// Each cluster collapses to the mean of its members; the pass repeats on the
/// means until no two are within `threshold`.
pub fn merge_nearby(points: &[(f32, f32)], threshold: f32) -> Vec<(f32, f32)> {
    let mut current = points.to_vec();
    loop {
        let merged = merge_pass(&current, threshold);
        if merged.len() == current.len() {
            return merged;
        }
        current = merged;
    }
}

// ========== 跟踪器 ==========

/// 颜色分割跟踪器
pub struct ColorTracker {
    profiles: Vec<ColorProfile>,
    config: TrackingConfig,
    resizer: fr::Resizer,
}

impl ColorTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            profiles: default_profiles(),
            config,
            resizer: fr::Resizer::new(),
        }
    }

    pub fn profiles(&self) -> &[ColorProfile] {
        &self.profiles
    }

    pub fn profile(&self, name: &str) -> Option<&ColorProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn reset_to_defaults(&mut self) {
        self.profiles = default_profiles();
    }

    /// 加载设置; missing or malformed files keep the current profiles
    pub fn load_settings(&mut self, path: &Path) -> bool {
        match color::load_settings(path, &mut self.profiles) {
            Ok(updated) => {
                tracing::info!(path = %path.display(), updated, "color settings loaded");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "color settings not loaded, keeping defaults");
                false
            }
        }
    }

    pub fn save_settings(&self, path: &Path) -> Result<(), SettingsError> {
        color::save_settings(path, &self.profiles)?;
        tracing::info!(path = %path.display(), "color settings saved");
        Ok(())
    }

    /// 检测所有颜色
    pub fn detect(
        &mut self,
        frames: &AlignedFrames,
        intrinsics: &CameraIntrinsics,
        downscale: f32,
    ) -> Vec<Detection> {
        let full_hsv = hsv_image(&frames.color);
        let (width, height) = full_hsv.dimensions();

        let mut scale = if downscale > 0.0 { downscale } else { 1.0 };
        let mut hsv = full_hsv;
        if scale != 1.0 {
            let sw = ((width as f32 * scale).round() as u32).max(1);
            let sh = ((height as f32 * scale).round() as u32).max(1);
            match resize_rgb(&mut self.resizer, &hsv, sw, sh) {
                Ok(small) => hsv = small,
                Err(e) => {
                    tracing::warn!(error = %e, "downscale failed, using full resolution");
                    scale = 1.0;
                }
            }
        }

        let min_area = self.config.min_contour_area * (scale as f64) * (scale as f64);
        let k = if scale == 1.0 { 2 } else { 1 };

        let mut detections = Vec::new();
        for profile in &self.profiles {
            let mask = color_mask(&hsv, profile);
            let mask = morphology::open(&mask, Norm::LInf, k);
            let mask = morphology::close(&mask, Norm::LInf, k);

            let centers: Vec<(f32, f32)> = blob_centers(&mask, min_area)
                .into_iter()
                .map(|(x, y)| (x / scale, y / scale))
                .collect();
            let centers = merge_nearby(&centers, self.config.merge_distance_px);

            for center in centers {
                let Some(position) = sample_and_deproject(
                    &frames.depth,
                    intrinsics,
                    center,
                    self.config.depth_patch_px,
                    self.config.max_depth_m,
                ) else {
                    continue;
                };

                detections.push(Detection {
                    id: format!("{}_{}", profile.name, frames.timestamp_us),
                    label: profile.name.clone(),
                    center: Pixel {
                        x: center.0,
                        y: center.1,
                    },
                    position,
                    confidence: 1.0,
                    is_held: false,
                    timestamp_us: frames.timestamp_us,
                });
            }
        }
        detections
    }

    /// 从 RGB 帧标定
    pub fn calibrate_frame(
        &mut self,
        color_name: &str,
        color: &RgbImage,
        click: (u32, u32),
    ) -> Result<ColorProfile, CalibrationError> {
        self.calibrate(color_name, &hsv_image(color), click)
    }

    /// 点击标定 (sample the neighbourhood of `click` in an HSV frame)
    pub fn calibrate(
        &mut self,
        color_name: &str,
        hsv: &RgbImage,
        click: (u32, u32),
    ) -> Result<ColorProfile, CalibrationError> {
        let cfg = &self.config;
        let index = self
            .profiles
            .iter()
            .position(|p| p.name == color_name)
            .ok_or_else(|| CalibrationError::UnknownColor(color_name.to_string()))?;

        let (w, h) = hsv.dimensions();
        let (x, y) = click;
        if x >= w || y >= h {
            return Err(CalibrationError::OutOfFrame {
                x,
                y,
                width: w,
                height: h,
            });
        }

        let half = cfg.calibration_patch_px / 2;
        let x0 = x.saturating_sub(half);
        let y0 = y.saturating_sub(half);
        let x1 = (x + half).min(w - 1);
        let y1 = (y + half).min(h - 1);

        let mut sum = [0.0f64; 3];
        let mut sum_sq = [0.0f64; 3];
        let mut n = 0.0f64;
        for py in y0..=y1 {
            for px in x0..=x1 {
                let p = hsv.get_pixel(px, py).0;
                for c in 0..3 {
                    sum[c] += p[c] as f64;
                    sum_sq[c] += (p[c] as f64).powi(2);
                }
                n += 1.0;
            }
        }
        let mean = sum.map(|s| s / n);
        let spread: Vec<f64> = (0..3)
            .map(|c| (sum_sq[c] / n - mean[c] * mean[c]).max(0.0).sqrt())
            .collect();

        let [mh, ms, mv] = mean.map(|m| m.round() as i32);
        let (th, ts, tv) = (
            cfg.hue_tolerance as i32,
            cfg.sat_tolerance as i32,
            cfg.val_tolerance as i32,
        );
        let s_lo = (ms - ts).clamp(0, 255) as u8;
        let s_hi = (ms + ts).clamp(0, 255) as u8;
        let v_lo = (mv - tv).clamp(0, 255) as u8;
        let v_hi = (mv + tv).clamp(0, 255) as u8;

        let wrap_low = cfg.wrap_hue_low as i32;
        let floor = cfg.wrap_hue_floor as i32;
        let interval = |h_lo: i32, h_hi: i32| {
            HsvRange::new([h_lo as u8, s_lo, v_lo], [h_hi as u8, s_hi, v_hi])
        };

        let (primary, secondary) = if mh <= wrap_low {
            (
                interval((mh - th).max(0), (mh + th).min(wrap_low)),
                Some(interval(floor.max(180 - th), 180)),
            )
        } else if color_name == cfg.wrap_prone_color && mh >= cfg.wrap_hue_high as i32 {
            (
                interval(floor.max(mh - th), 180),
                Some(interval(0, wrap_low.min(th))),
            )
        } else {
            (interval((mh - th).clamp(0, 180), (mh + th).clamp(0, 180)), None)
        };

        let profile = &mut self.profiles[index];
        profile.primary = primary;
        profile.secondary = secondary;
        tracing::info!(
            color = color_name,
            mean = ?[mh, ms, mv],
            std = ?spread,
            min = ?primary.min,
            max = ?primary.max,
            wrapped = secondary.is_some(),
            "color calibrated"
        );
        Ok(profile.clone())
    }
}
