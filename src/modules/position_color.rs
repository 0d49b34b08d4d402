//! 位置 → 颜色模块
//! Maps the tracked ball's x, y, z onto R, G, B and asks the relay to send it.

use super::OutputModule;
use crate::command::{arg_str, Command, ModuleArgs, Rgb, RoutedCommand};
use crate::config::PositionConfig;
use crate::error::ModuleError;
use crate::record::FrameRecord;

pub const NAME: &str = "position_to_color";

/// 位置 → 颜色模块
pub struct PositionColorModule {
    config: PositionConfig,
    /// 颜色命令的目标模块
    route: String,
}

impl PositionColorModule {
    pub fn new(config: PositionConfig, route: String) -> Self {
        Self { config, route }
    }

    /// 线性映射到 0-255, clamped
    pub fn channel(&self, meters: f32) -> u8 {
        let span = self.config.range_max_m - self.config.range_min_m;
        let t = ((meters - self.config.range_min_m) / span).clamp(0.0, 1.0);
        (t * 255.0).round() as u8
    }

    pub fn color_for(&self, position: [f32; 3]) -> Rgb {
        Rgb::new(
            self.channel(position[0]),
            self.channel(position[1]),
            self.channel(position[2]),
        )
    }

    fn configure(&mut self, args: &ModuleArgs) {
        match arg_str(args, "target_ball_id") {
            Some(target) => {
                tracing::info!(target = %target, "position module target set");
                self.config.target_ball_id = target;
            }
            None => tracing::debug!("target_ball_id not given"),
        }
        match arg_str(args, "label") {
            Some(label) => {
                tracing::info!(label = %label, "position module label set");
                self.config.label = label;
            }
            None => tracing::debug!("label not given"),
        }
    }
}

impl OutputModule for PositionColorModule {
    fn name(&self) -> &str {
        NAME
    }

    fn setup(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn update(&mut self, record: &FrameRecord, enqueue: &mut dyn FnMut(RoutedCommand)) {
        let Some(det) = record.first_labelled(&self.config.label) else {
            return;
        };
        let p = det.position;
        let color = self.color_for([p.x, p.y, p.z]);
        enqueue(RoutedCommand::to(
            Command::SendColor {
                ball_id: self.config.target_ball_id.clone(),
                color,
            },
            self.route.clone(),
        ));
    }

    fn cleanup(&mut self) {}

    fn process_command(&mut self, command: &Command) -> Result<(), ModuleError> {
        if let Command::ConfigureModule { module_args, .. } = command {
            self.configure(module_args);
        }
        Ok(())
    }
}
