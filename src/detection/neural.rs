//! 神经网络检测 + 身份跟踪适配器
//! Neural detection + identity tracking adapter
//!
//! 流程: 缩放 → NCHW/255 → ObjectDetector → 解码候选框 → NMS → IdentityTracker
//! → 深度融合

use anyhow::{bail, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{s, Array4, ArrayD, Axis};
use std::time::Instant;

use super::depth::sample_and_deproject;
use super::tracker::{non_max_suppression, IdentityTracker};
use super::types::{BBox, Detection, Pixel, TrackedBox};
use crate::config::TrackingConfig;
use crate::input::{AlignedFrames, CameraIntrinsics};
use crate::utils::resize_rgb;

/// 目标检测器接口
///
/// `infer` takes a `[1, 3, H, W]` tensor normalized to `[0, 1]` and returns
/// a dense `[1, 4 + classes, candidates]` tensor of `(cx, cy, w, h, scores..)`.
pub trait ObjectDetector: Send {
    /// 输入尺寸 (width, height)
    fn input_size(&self) -> (u32, u32);

    fn infer(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>>;
}

/// 神经网络跟踪器
pub struct NeuralTracker {
    detector: Box<dyn ObjectDetector>,
    tracker: Box<dyn IdentityTracker>,
    confidence_threshold: f32,
    nms_iou_threshold: f32,
    depth_patch_px: u32,
    max_depth_m: f32,
    resizer: fr::Resizer,
    frame_index: u64,
}

impl NeuralTracker {
    pub fn new(
        detector: Box<dyn ObjectDetector>,
        tracker: Box<dyn IdentityTracker>,
        config: &TrackingConfig,
    ) -> Self {
        Self {
            detector,
            tracker,
            confidence_threshold: config.confidence_threshold,
            nms_iou_threshold: config.nms_iou_threshold,
            depth_patch_px: config.depth_patch_px,
            max_depth_m: config.max_depth_m,
            resizer: fr::Resizer::new(),
            frame_index: 0,
        }
    }

    /// 预处理: 缩放到模型输入, NCHW f32 [0,1]
    fn preprocess(&mut self, color: &RgbImage) -> Result<Array4<f32>> {
        let (iw, ih) = self.detector.input_size();
        let resized = resize_rgb(&mut self.resizer, color, iw, ih)?;

        let mut input = Array4::<f32>::zeros((1, 3, ih as usize, iw as usize));
        for (x, y, px) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = px.0[c] as f32 / 255.0;
            }
        }
        Ok(input)
    }

    /// 解码候选框并缩放回帧分辨率
    fn postprocess(&self, output: &ArrayD<f32>, frame_w: u32, frame_h: u32) -> Result<Vec<BBox>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            bail!("unexpected detector output shape {:?}", shape);
        }

        let (iw, ih) = self.detector.input_size();
        let sx = frame_w as f32 / iw as f32;
        let sy = frame_h as f32 / ih as f32;

        let preds = output.index_axis(Axis(0), 0);
        let mut boxes = Vec::new();
        for anchor in preds.axis_iter(Axis(1)) {
            let (class_id, score) = anchor
                .slice(s![4..])
                .iter()
                .enumerate()
                .fold((0usize, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
            if score <= self.confidence_threshold {
                continue;
            }

            let bbox = anchor.slice(s![0..4]);
            let (cx, cy, w, h) = (bbox[0] * sx, bbox[1] * sy, bbox[2] * sx, bbox[3] * sy);
            boxes.push(BBox::from_cxcywh(cx, cy, w, h, score, class_id as u32));
        }
        Ok(boxes)
    }

    /// 检测 + 身份跟踪
    pub fn update(&mut self, color: &RgbImage) -> Vec<TrackedBox> {
        let t0 = Instant::now();
        let (fw, fh) = color.dimensions();

        let boxes = self
            .preprocess(color)
            .and_then(|input| self.detector.infer(input))
            .and_then(|output| self.postprocess(&output, fw, fh));
        let mut boxes = match boxes {
            Ok(boxes) => boxes,
            Err(e) => {
                tracing::warn!(error = %e, "neural detection failed, frame skipped");
                return Vec::new();
            }
        };
        let candidates = boxes.len();
        non_max_suppression(&mut boxes, self.nms_iou_threshold);

        let tracked = self.tracker.update(&boxes, fw, fh, self.frame_index);
        self.frame_index += 1;

        tracing::trace!(
            candidates,
            kept = boxes.len(),
            tracked = tracked.len(),
            ms = t0.elapsed().as_secs_f64() * 1000.0,
            "neural update"
        );
        tracked
    }

    /// 深度融合: 跟踪框 → 3D Detection
    pub fn fuse(
        &self,
        tracked: &[TrackedBox],
        frames: &AlignedFrames,
        intrinsics: &CameraIntrinsics,
    ) -> Vec<Detection> {
        tracked
            .iter()
            .filter_map(|t| {
                let center = t.bbox.center();
                let position = sample_and_deproject(
                    &frames.depth,
                    intrinsics,
                    center,
                    self.depth_patch_px,
                    self.max_depth_m,
                )?;
                Some(Detection {
                    id: format!("track_{}", t.track_id),
                    label: t.track_id.to_string(),
                    center: Pixel {
                        x: center.0,
                        y: center.1,
                    },
                    position,
                    confidence: t.bbox.confidence,
                    is_held: false,
                    timestamp_us: frames.timestamp_us,
                })
            })
            .collect()
    }

    pub fn detect(&mut self, frames: &AlignedFrames, intrinsics: &CameraIntrinsics) -> Vec<Detection> {
        let tracked = self.update(&frames.color);
        self.fuse(&tracked, frames, intrinsics)
    }
}
