//! 颜色配置与持久化
//! HSV color profiles (OpenCV 8-bit convention: H 0-180, S/V 0-255) and
//! the JSON settings document they are persisted in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::SettingsError;

/// HSV 区间, inclusive on both ends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvRange {
    pub min: [u8; 3],
    pub max: [u8; 3],
}

impl HsvRange {
    pub const fn new(min: [u8; 3], max: [u8; 3]) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.min[i] && hsv[i] <= self.max[i])
    }

    pub fn is_ordered(&self) -> bool {
        (0..3).all(|i| self.min[i] <= self.max[i])
    }
}

/// 颜色配置 (one named ball color)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorProfile {
    pub name: String,
    pub primary: HsvRange,
    /// 第二区间, models hue wrap-around near 0/180
    pub secondary: Option<HsvRange>,
}

impl ColorProfile {
    pub fn new(name: &str, min: [u8; 3], max: [u8; 3]) -> Self {
        Self {
            name: name.to_string(),
            primary: HsvRange::new(min, max),
            secondary: None,
        }
    }

    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        self.primary.contains(hsv) || self.secondary.is_some_and(|r| r.contains(hsv))
    }
}

/// 出厂默认颜色表
pub fn default_profiles() -> Vec<ColorProfile> {
    vec![
        ColorProfile::new("pink", [150, 150, 90], [170, 255, 255]),
        ColorProfile::new("orange", [5, 150, 120], [15, 255, 255]),
        ColorProfile::new("green", [45, 120, 70], [75, 255, 255]),
        ColorProfile::new("yellow", [25, 120, 100], [35, 255, 255]),
    ]
}

// ========== 持久化文档 ==========

/// 设置文件中的单个颜色条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub min_hsv: [i32; 3],
    pub max_hsv: [i32; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_hsv2: Option<[i32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hsv2: Option<[i32; 3]>,
}

/// 设置文档, keyed by color name
pub type SettingsDocument = BTreeMap<String, ProfileEntry>;

fn widen(v: [u8; 3]) -> [i32; 3] {
    v.map(i32::from)
}

fn narrow(v: [i32; 3]) -> [u8; 3] {
    v.map(|c| c.clamp(0, 255) as u8)
}

impl From<&ColorProfile> for ProfileEntry {
    fn from(profile: &ColorProfile) -> Self {
        Self {
            min_hsv: widen(profile.primary.min),
            max_hsv: widen(profile.primary.max),
            min_hsv2: profile.secondary.map(|r| widen(r.min)),
            max_hsv2: profile.secondary.map(|r| widen(r.max)),
        }
    }
}

impl ProfileEntry {
    /// 第二区间; absent or negative components read as disabled
    fn secondary(&self) -> Option<HsvRange> {
        match (self.min_hsv2, self.max_hsv2) {
            (Some(min), Some(max)) if min.iter().chain(max.iter()).all(|&c| c >= 0) => {
                Some(HsvRange::new(narrow(min), narrow(max)))
            }
            _ => None,
        }
    }

    /// 覆盖配置; returns false (and leaves the profile alone) on an inverted interval
    pub fn apply_to(&self, profile: &mut ColorProfile) -> bool {
        let primary = HsvRange::new(narrow(self.min_hsv), narrow(self.max_hsv));
        let secondary = self.secondary();
        if !primary.is_ordered() || secondary.is_some_and(|r| !r.is_ordered()) {
            return false;
        }
        profile.primary = primary;
        // 缺少 min_hsv2/max_hsv2 即关闭第二区间; save omits disabled intervals, so load mirrors it
        profile.secondary = secondary;
        true
    }
}

/// 保存全部颜色配置 (4-space pretty JSON)
pub fn save_settings(path: &Path, profiles: &[ColorProfile]) -> Result<(), SettingsError> {
    let doc: SettingsDocument = profiles
        .iter()
        .map(|p| (p.name.clone(), ProfileEntry::from(p)))
        .collect();

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser).map_err(|source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, buf).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// 读取设置并覆盖同名配置, returns how many profiles were updated
pub fn load_settings(path: &Path, profiles: &mut [ColorProfile]) -> Result<usize, SettingsError> {
    let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: SettingsDocument =
        serde_json::from_str(&json).map_err(|source| SettingsError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let mut updated = 0;
    for profile in profiles.iter_mut() {
        let Some(entry) = doc.get(&profile.name) else {
            continue;
        };
        if entry.apply_to(profile) {
            updated += 1;
        } else {
            tracing::warn!(color = %profile.name, "inverted HSV interval in settings, entry ignored");
        }
    }
    for name in doc.keys() {
        if !profiles.iter().any(|p| &p.name == name) {
            tracing::debug!(color = %name, "unknown color in settings ignored");
        }
    }
    Ok(updated)
}
