/// 检测系统 (Detection System)
///
/// 将对齐的彩色+深度帧转换为 3D 目标
/// - ColorTracker:  HSV 颜色分割 + 深度采样
/// - NeuralTracker: 目标检测 + 身份跟踪 + 深度融合
/// - ByteTracker:   默认身份跟踪器
pub mod bytetrack;
pub mod color;
pub mod depth;
pub mod neural;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod segmentation;
pub mod strategy;
pub mod tracker;
pub mod types;

pub use bytetrack::{ByteTrackParams, ByteTracker};
pub use color::{default_profiles, ColorProfile, HsvRange};
pub use neural::{NeuralTracker, ObjectDetector};
#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;
pub use segmentation::ColorTracker;
pub use strategy::{TrackerStrategy, TrackingMode};
pub use tracker::IdentityTracker;
pub use types::{BBox, Detection, Pixel, Position3, TrackedBox};
