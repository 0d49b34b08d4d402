//! 多目标跟踪公共组件
//! Common components for identity tracking: the tracker interface, a
//! constant-velocity box filter and IoU.

use super::types::{BBox, TrackedBox};

// ========== 跟踪器统一接口 ==========

/// 身份跟踪器 Trait
///
/// Receives one frame's NMS survivors and returns the boxes observed in this
/// frame tagged with persistent ids.
pub trait IdentityTracker: Send {
    fn update(
        &mut self,
        detections: &[BBox],
        frame_width: u32,
        frame_height: u32,
        frame_index: u64,
    ) -> Vec<TrackedBox>;

    /// 重置 (清除所有轨迹)
    fn reset(&mut self);

    fn track_count(&self) -> usize;
}

// ========== 卡尔曼滤波器 ==========

/// 简化卡尔曼滤波器, diagonal covariance
/// 状态向量: [cx, cy, w, h, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    /// 过程噪声
    q: f32,
    /// 观测噪声
    r: f32,
    /// 每帧速度保留比例
    velocity_decay: f32,
}

impl KalmanBoxFilter {
    pub fn new(bbox: &BBox, q: f32, r: f32) -> Self {
        let (cx, cy) = bbox.center();
        Self {
            state: [cx, cy, bbox.x2 - bbox.x1, bbox.y2 - bbox.y1, 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
        }
    }

    /// 预测 (匀速 + 衰减)
    pub fn predict(&mut self) {
        for i in 4..8 {
            self.state[i] *= self.velocity_decay;
        }
        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }
        for p in self.p.iter_mut() {
            *p += self.q;
        }
    }

    /// 融合观测
    pub fn update(&mut self, bbox: &BBox) {
        let (cx, cy) = bbox.center();
        let z = [cx, cy, bbox.x2 - bbox.x1, bbox.y2 - bbox.y1];

        for i in 0..4 {
            let residual = z[i] - self.state[i];
            let k_pos = self.p[i] / (self.p[i] + self.r);
            let k_vel = self.p[i + 4] / (self.p[i + 4] + self.r * 10.0);
            self.state[i] += k_pos * residual;
            self.state[i + 4] += k_vel * residual;
            self.p[i] *= 1.0 - k_pos;
            self.p[i + 4] *= 1.0 - k_vel;
        }
    }

    fn bbox_at(&self, cx: f32, cy: f32, w: f32, h: f32) -> BBox {
        BBox::from_cxcywh(cx, cy, w.max(1.0), h.max(1.0), 1.0, 0)
    }

    /// 当前状态框
    pub fn state_bbox(&self) -> BBox {
        let s = &self.state;
        self.bbox_at(s[0], s[1], s[2], s[3])
    }

    /// 下一帧预测框 (用于匹配)
    pub fn predicted_bbox(&self) -> BBox {
        let s = &self.state;
        self.bbox_at(s[0] + s[4], s[1] + s[5], s[2] + s[6], s[3] + s[7])
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let area1 = (bbox1.x2 - bbox1.x1) * (bbox1.y2 - bbox1.y1);
    let area2 = (bbox2.x2 - bbox2.x1) * (bbox2.y2 - bbox2.y1);
    let union = area1 + area2 - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

/// 类别无关 NMS (sorted by confidence, greedy)
pub fn non_max_suppression(boxes: &mut Vec<BBox>, iou_threshold: f32) {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..boxes.len() {
        let drop = (0..kept).any(|prev| compute_iou(&boxes[prev], &boxes[index]) > iou_threshold);
        if !drop {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> BBox {
        BBox {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id: 0,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(compute_iou(&a, &bbox(20.0, 20.0, 30.0, 30.0, 1.0)), 0.0);
        let half = compute_iou(&a, &bbox(5.0, 0.0, 15.0, 10.0, 1.0));
        assert!((half - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_highest_confidence_of_overlapping_boxes() {
        let mut boxes = vec![
            bbox(0.0, 0.0, 10.0, 10.0, 0.6),
            bbox(1.0, 1.0, 11.0, 11.0, 0.9),
            bbox(50.0, 50.0, 60.0, 60.0, 0.3),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].confidence, 0.9);
        assert_eq!(boxes[1].confidence, 0.3);
    }

    #[test]
    fn filter_follows_constant_motion() {
        let mut kf = KalmanBoxFilter::new(&bbox(0.0, 0.0, 10.0, 10.0, 1.0), 0.1, 0.5);
        for step in 1..=20 {
            kf.predict();
            let x = step as f32 * 4.0;
            kf.update(&bbox(x, 0.0, x + 10.0, 10.0, 1.0));
        }
        let (cx, _) = kf.state_bbox().center();
        assert!((cx - 85.0).abs() < 4.0);
        assert!(kf.velocity().0 > 1.0);
    }
}
