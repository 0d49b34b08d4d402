/// 检测系统数据结构定义
/// Data structures shared by the detection strategies
use serde::{Deserialize, Serialize};

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box)
#[derive(Clone, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BBox {
    /// 由中心点与宽高构造
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32, confidence: f32, class_id: u32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence,
            class_id,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// 带身份的检测框 (IdentityTracker 输出)
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedBox {
    pub track_id: u32,
    pub bbox: BBox,
}

/// 像素坐标
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pixel {
    pub x: f32,
    pub y: f32,
}

/// 相机坐标系位置 (米)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<[f32; 3]> for Position3 {
    fn from(p: [f32; 3]) -> Self {
        Self {
            x: p[0],
            y: p[1],
            z: p[2],
        }
    }
}

/// 单帧中的一个目标 (one object observed in one frame)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    /// 颜色名或跟踪ID
    pub label: String,
    pub center: Pixel,
    pub position: Position3,
    pub confidence: f32,
    /// 保留字段, always false for now
    pub is_held: bool,
    pub timestamp_us: i64,
}
