//! 深度采样与反投影
//! Depth patch averaging and pixel → 3D lifting shared by both strategies

use super::types::Position3;
use crate::input::{CameraIntrinsics, DepthFrame};

/// 以 (x, y) 为中心的方形区域平均深度
///
/// Only strictly positive readings count; the patch is clamped to the frame.
/// Returns `None` when no valid reading exists.
pub fn averaged_depth(depth: &DepthFrame, x: u32, y: u32, patch: u32) -> Option<f32> {
    if depth.width == 0 || depth.height == 0 {
        return None;
    }
    let half = patch / 2;
    let x0 = x.saturating_sub(half);
    let y0 = y.saturating_sub(half);
    let x1 = (x + half).min(depth.width - 1);
    let y1 = (y + half).min(depth.height - 1);

    let mut sum = 0.0f32;
    let mut count = 0u32;
    for py in y0..=y1 {
        for px in x0..=x1 {
            let d = depth.distance(px, py);
            if d > 0.0 {
                sum += d;
                count += 1;
            }
        }
    }

    (count > 0).then(|| sum / count as f32)
}

/// 采样深度并反投影到相机坐标系
///
/// Centers outside the frame, patches without valid depth and depths at or
/// beyond `max_depth` yield `None`.
pub fn sample_and_deproject(
    depth: &DepthFrame,
    intrinsics: &CameraIntrinsics,
    center: (f32, f32),
    patch: u32,
    max_depth: f32,
) -> Option<Position3> {
    let (cx, cy) = center;
    if !(cx >= 0.0 && cy >= 0.0 && cx < depth.width as f32 && cy < depth.height as f32) {
        tracing::trace!(cx, cy, "center outside frame");
        return None;
    }

    let d = averaged_depth(depth, cx as u32, cy as u32, patch)?;
    if d >= max_depth {
        tracing::trace!(cx, cy, depth = d, "depth out of range");
        return None;
    }

    Some(intrinsics.deproject(center, d).into())
}
