//! 彩色+深度帧数据结构
//! Aligned color/depth frames and pinhole camera intrinsics

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// 畸变模型 (lens distortion model)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    #[default]
    None,
    /// 正向 Brown-Conrady, deprojection undistorts iteratively
    BrownConrady,
    /// 逆 Brown-Conrady, deprojection applies the polynomial directly
    InverseBrownConrady,
}

/// 相机内参 (camera intrinsics of the color stream)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub width: u32,
    pub height: u32,
    /// 主点 (principal point)
    pub ppx: f32,
    pub ppy: f32,
    /// 焦距 (focal length in pixels)
    pub fx: f32,
    pub fy: f32,
    #[serde(default)]
    pub model: DistortionModel,
    #[serde(default)]
    pub coeffs: [f32; 5],
}

impl CameraIntrinsics {
    /// 无畸变针孔模型
    pub fn pinhole(width: u32, height: u32, fx: f32, fy: f32) -> Self {
        Self {
            width,
            height,
            ppx: width as f32 / 2.0,
            ppy: height as f32 / 2.0,
            fx,
            fy,
            model: DistortionModel::None,
            coeffs: [0.0; 5],
        }
    }

    /// 像素+深度 → 相机坐标系3D点 (meters)
    pub fn deproject(&self, pixel: (f32, f32), depth: f32) -> [f32; 3] {
        let mut x = (pixel.0 - self.ppx) / self.fx;
        let mut y = (pixel.1 - self.ppy) / self.fy;
        let c = &self.coeffs;

        match self.model {
            DistortionModel::None => {}
            DistortionModel::InverseBrownConrady => {
                let r2 = x * x + y * y;
                let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
                let ux = x * f + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                let uy = y * f + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                x = ux;
                y = uy;
            }
            DistortionModel::BrownConrady => {
                let (xo, yo) = (x, y);
                for _ in 0..10 {
                    let r2 = x * x + y * y;
                    let icdist = 1.0 / (1.0 + ((c[4] * r2 + c[1]) * r2 + c[0]) * r2);
                    let dx = 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                    let dy = 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                    x = (xo - dx) * icdist;
                    y = (yo - dy) * icdist;
                }
            }
        }

        [depth * x, depth * y, depth]
    }
}

/// 深度帧 (16-bit depth, aligned to the color frame)
#[derive(Clone, Debug)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
    /// 每个深度单位对应的米数
    pub depth_scale: f32,
}

impl DepthFrame {
    pub fn new(width: u32, height: u32, depth_scale: f32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height) as usize],
            depth_scale,
        }
    }

    /// 像素深度 (米), 0 表示无效
    pub fn distance(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.data[(y * self.width + x) as usize] as f32 * self.depth_scale
    }

    pub fn set_distance(&mut self, x: u32, y: u32, meters: f32) {
        if x < self.width && y < self.height {
            let raw = (meters / self.depth_scale).round().clamp(0.0, u16::MAX as f32);
            self.data[(y * self.width + x) as usize] = raw as u16;
        }
    }
}

/// 对齐后的帧 (source → engine)
#[derive(Clone, Debug)]
pub struct AlignedFrames {
    pub color: RgbImage,
    pub depth: DepthFrame,
    pub frame_number: u64,
    /// 采集时间戳 (µs)
    pub timestamp_us: i64,
}
