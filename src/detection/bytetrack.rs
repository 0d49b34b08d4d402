//! ByteTrack 算法实现
//! ByteTrack: two-stage IoU association with a pure motion model
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU)
//! 3. 低分框救援丢失的轨迹

use super::tracker::{compute_iou, IdentityTracker, KalmanBoxFilter};
use super::types::{BBox, TrackedBox};

/// 单条轨迹
#[derive(Clone)]
struct Track {
    id: u32,
    kalman: KalmanBoxFilter,
    /// 最近一次观测 (confidence kept from the detector)
    last: BBox,
    frames_lost: u32,
}

impl Track {
    fn new(id: u32, bbox: BBox) -> Self {
        Self {
            id,
            kalman: KalmanBoxFilter::new(&bbox, 0.1, 0.5),
            last: bbox,
            frames_lost: 0,
        }
    }

    fn observe(&mut self, bbox: BBox) {
        self.kalman.update(&bbox);
        self.last = bbox;
        self.frames_lost = 0;
    }
}

/// ByteTrack 参数
#[derive(Clone, Debug)]
pub struct ByteTrackParams {
    pub max_lost_frames: u32,
    pub high_score_threshold: f32,
    pub low_score_threshold: f32,
    pub high_iou_threshold: f32,
    pub low_iou_threshold: f32,
}

impl Default for ByteTrackParams {
    fn default() -> Self {
        Self {
            max_lost_frames: 30,
            high_score_threshold: 0.5,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.3,
            low_iou_threshold: 0.2,
        }
    }
}

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracks: Vec<Track>,
    next_id: u32,
    params: ByteTrackParams,
}

impl ByteTracker {
    pub fn new(params: ByteTrackParams) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            params,
        }
    }

    /// 贪心 IOU 匹配, returns (detection index, track index) pairs
    fn associate(
        &self,
        detections: &[(usize, &BBox)],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        let mut candidates = Vec::new();
        for (local_det, (det_idx, det)) in detections.iter().enumerate() {
            for (local_track, &track_idx) in track_indices.iter().enumerate() {
                let iou = compute_iou(det, &self.tracks[track_idx].kalman.predicted_bbox());
                if iou >= iou_threshold {
                    candidates.push((iou, *det_idx, local_det, track_idx, local_track));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut used_det = vec![false; detections.len()];
        let mut used_track = vec![false; track_indices.len()];
        let mut pairs = Vec::new();
        for (_, det_idx, local_det, track_idx, local_track) in candidates {
            if !used_det[local_det] && !used_track[local_track] {
                used_det[local_det] = true;
                used_track[local_track] = true;
                pairs.push((det_idx, track_idx));
            }
        }
        pairs
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(ByteTrackParams::default())
    }
}

impl IdentityTracker for ByteTracker {
    fn update(
        &mut self,
        detections: &[BBox],
        frame_width: u32,
        frame_height: u32,
        frame_index: u64,
    ) -> Vec<TrackedBox> {
        // 1. 所有轨迹先预测
        for track in &mut self.tracks {
            track.kalman.predict();
        }

        // 2. 分离高低分检测框
        let p = self.params.clone();
        let high: Vec<(usize, &BBox)> = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.confidence >= p.high_score_threshold)
            .collect();
        let low: Vec<(usize, &BBox)> = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.confidence >= p.low_score_threshold && d.confidence < p.high_score_threshold)
            .collect();

        let mut det_used = vec![false; detections.len()];
        let mut track_matched = vec![false; self.tracks.len()];

        // 3. 第一轮: 高分检测 + 所有轨迹
        let all: Vec<usize> = (0..self.tracks.len()).collect();
        for (d, t) in self.associate(&high, &all, p.high_iou_threshold) {
            det_used[d] = true;
            track_matched[t] = true;
            self.tracks[t].observe(detections[d].clone());
        }

        // 4. 第二轮: 低分检测 + 未匹配轨迹
        let unmatched: Vec<usize> = all.into_iter().filter(|&t| !track_matched[t]).collect();
        for (d, t) in self.associate(&low, &unmatched, p.low_iou_threshold) {
            det_used[d] = true;
            track_matched[t] = true;
            self.tracks[t].observe(detections[d].clone());
        }

        // 5. 未匹配轨迹 → 丢失计数; 6. 未匹配高分检测 → 新轨迹
        for (t, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[t].frames_lost += 1;
            }
        }
        for (d, det) in detections.iter().enumerate() {
            if !det_used[d] && det.confidence >= p.high_score_threshold {
                self.tracks.push(Track::new(self.next_id, det.clone()));
                self.next_id += 1;
            }
        }

        // 7. 删除丢失太久的轨迹
        self.tracks.retain(|t| t.frames_lost <= p.max_lost_frames);

        let (fw, fh) = (frame_width as f32, frame_height as f32);
        let out: Vec<TrackedBox> = self
            .tracks
            .iter()
            .filter(|t| t.frames_lost == 0)
            // 输出本帧观测框 (Kalman state only drives association)
            .map(|t| TrackedBox {
                track_id: t.id,
                bbox: BBox {
                    x1: t.last.x1.clamp(0.0, fw),
                    y1: t.last.y1.clamp(0.0, fh),
                    x2: t.last.x2.clamp(0.0, fw),
                    y2: t.last.y2.clamp(0.0, fh),
                    ..t.last.clone()
                },
            })
            .collect();

        tracing::trace!(frame_index, tracks = self.tracks.len(), reported = out.len(), "bytetrack update");
        out
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
