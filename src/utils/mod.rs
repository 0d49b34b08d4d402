/// 工具模块
/// Utility modules
pub mod resize;

pub use resize::resize_rgb;
