//! 引擎配置 - 通过JSON文件调整参数
//! Engine configuration, loaded from a JSON file with per-field defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::input::StreamProfile;
use crate::summary::SummaryFormat;

/// 跟踪参数 (tracking constants shared by both detection strategies)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingConfig {
    // === 颜色分割 ===
    pub min_contour_area: f64, // 最小轮廓面积 (px², 全分辨率)
    pub max_depth_m: f32,      // 最大有效深度 (米)
    pub merge_distance_px: f32,
    pub depth_patch_px: u32,
    pub calibration_patch_px: u32,

    // === 标定容差 ===
    pub hue_tolerance: u8,
    pub sat_tolerance: u8,
    pub val_tolerance: u8,
    /// 低端色相环绕阈值 (mean hue <= this wraps)
    pub wrap_hue_low: u8,
    /// 高端色相环绕阈值, applies only to `wrap_prone_color`
    pub wrap_hue_high: u8,
    /// 环绕时高端区间的下限 (165)
    pub wrap_hue_floor: u8,
    pub wrap_prone_color: String,

    // === 神经网络检测 ===
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
    /// 模型输入尺寸, used when the model has dynamic input dims
    pub model_input_size: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_contour_area: 100.0,
            max_depth_m: 3.0,
            merge_distance_px: 80.0,
            depth_patch_px: 5,
            calibration_patch_px: 5,

            hue_tolerance: 8,
            sat_tolerance: 40,
            val_tolerance: 40,
            wrap_hue_low: 15,
            wrap_hue_high: 170,
            wrap_hue_floor: 165,
            wrap_prone_color: "pink".to_string(),

            confidence_threshold: 0.25,
            nms_iou_threshold: 0.45,
            model_input_size: 640,
        }
    }
}

/// 设备中继参数 (relay module defaults)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub subnet: String,
    pub port: u16,
    /// 亮度等级, `None` 不发送亮度包
    pub brightness: Option<u8>,
    pub brightness_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            subnet: "10.54.136".to_string(),
            port: 41412,
            brightness: Some(7),
            brightness_delay_ms: 100,
        }
    }
}

/// 位置→颜色模块参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PositionConfig {
    pub label: String,
    pub target_ball_id: String,
    pub range_min_m: f32,
    pub range_max_m: f32,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            label: "green".to_string(),
            target_ball_id: "all".to_string(),
            range_min_m: -0.5,
            range_max_m: 0.5,
        }
    }
}

/// 引擎参数配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub tracking: TrackingConfig,

    // === 循环节奏 ===
    pub frame_timeout_ms: u64,
    pub command_poll_ms: u64,
    pub downscale: f32,

    // === 通信端点 ===
    pub publish_addr: String,
    pub command_addr: String,

    // === 模块 ===
    pub settings_path: String,
    pub relay: RelayConfig,
    pub position: PositionConfig,
    /// 内部颜色命令的默认目标模块
    pub color_route: String,
    /// 启动时常驻的模块
    pub resident_modules: Vec<String>,

    // === 输入 ===
    pub stream: StreamProfile,
    pub model_path: Option<String>,

    pub summary: SummaryFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tracking: TrackingConfig::default(),

            frame_timeout_ms: 100,
            command_poll_ms: 10,
            downscale: 1.0,

            publish_addr: "127.0.0.1:5555".to_string(),
            command_addr: "127.0.0.1:5565".to_string(),

            settings_path: "ball_settings.json".to_string(),
            relay: RelayConfig::default(),
            position: PositionConfig::default(),
            color_route: "relay".to_string(),
            resident_modules: vec!["relay".to_string()],

            stream: StreamProfile::default(),
            model_path: None,

            summary: SummaryFormat::Off,
        }
    }
}

impl EngineConfig {
    /// 从JSON文件加载配置
    ///
    /// A missing file is created with defaults; a malformed one is reported
    /// and replaced by defaults in memory only.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "configuration loaded");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "configuration malformed, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "configuration missing, writing defaults");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    tracing::error!(path = %path.display(), error = %e, "failed to save configuration");
                } else {
                    tracing::debug!(path = %path.display(), "configuration saved");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize configuration"),
        }
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn command_poll_interval(&self) -> Duration {
        Duration::from_millis(self.command_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let config = EngineConfig::load(&path);
        assert_eq!(config, EngineConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn partial_document_keeps_defaults_for_absent_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(
            &path,
            r#"{"frame_timeout_ms": 50, "tracking": {"max_depth_m": 2.5}, "relay": {"brightness": null}}"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path);
        assert_eq!(config.frame_timeout(), Duration::from_millis(50));
        assert_eq!(config.tracking.max_depth_m, 2.5);
        assert_eq!(config.tracking.merge_distance_px, 80.0);
        assert_eq!(config.relay.brightness, None);
        assert_eq!(config.relay.port, 41412);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(EngineConfig::load(&path), EngineConfig::default());
    }
}
