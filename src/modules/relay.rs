//! 中继模块: 颜色命令 → LED 球 UDP 控制包

use std::collections::HashSet;
use std::net::SocketAddrV4;
use std::thread;
use std::time::Duration;

use super::OutputModule;
use crate::command::{arg_str, Command, ModuleArgs, Rgb, RoutedCommand};
use crate::config::RelayConfig;
use crate::error::ModuleError;
use crate::net::{DeviceAddressing, DevicePacket, UdpSender};
use crate::record::FrameRecord;

pub const NAME: &str = "relay";

/// 中继模块
pub struct RelayModule {
    config: RelayConfig,
    addressing: Option<DeviceAddressing>,
    sender: Option<UdpSender>,
    /// 已发送亮度包的设备
    primed: HashSet<SocketAddrV4>,
}

impl RelayModule {
    /// An unparsable subnet in `config` surfaces on `setup`.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            addressing: None,
            sender: None,
            primed: HashSet::new(),
        }
    }

    fn configure(&mut self, args: &ModuleArgs) -> Result<(), ModuleError> {
        let mut next = self.config.clone();
        if let Some(subnet) = arg_str(args, "subnet") {
            next.subnet = subnet;
        }
        if let Some(port) = arg_str(args, "port") {
            next.port = port
                .parse()
                .map_err(|_| ModuleError::Setup(format!("invalid port '{port}'")))?;
        }
        if let Some(level) = arg_str(args, "brightness") {
            next.brightness = if level.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(
                    level
                        .parse()
                        .map_err(|_| ModuleError::Setup(format!("invalid brightness '{level}'")))?,
                )
            };
        }

        self.addressing = Some(DeviceAddressing::new(&next.subnet, next.port)?);
        tracing::info!(
            subnet = %next.subnet,
            port = next.port,
            brightness = ?next.brightness,
            "relay configured"
        );
        self.config = next;
        self.primed.clear();
        Ok(())
    }

    fn send_color(&mut self, ball_id: &str, color: Rgb) -> Result<(), ModuleError> {
        let (Some(sender), Some(addressing)) = (&self.sender, &self.addressing) else {
            return Err(ModuleError::Setup("relay not set up".into()));
        };
        let addr = match addressing.resolve(ball_id) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(error = %e, "color command rejected");
                return Err(e.into());
            }
        };

        // 亮度包每个设备只发一次, until setup or CONFIGURE
        if let Some(level) = self.config.brightness {
            if !self.primed.contains(&addr) {
                if let Err(e) = sender.send(addr.into(), DevicePacket::Brightness(level)) {
                    tracing::warn!(%addr, error = %e, "brightness packet not sent");
                }
                thread::sleep(Duration::from_millis(self.config.brightness_delay_ms));
                self.primed.insert(addr);
            }
        }
        match sender.send(addr.into(), DevicePacket::Color(color)) {
            Ok(_) => tracing::debug!(%addr, r = color.r, g = color.g, b = color.b, "color sent"),
            Err(e) => tracing::warn!(%addr, error = %e, "color packet not sent"),
        }
        Ok(())
    }
}

impl OutputModule for RelayModule {
    fn name(&self) -> &str {
        NAME
    }

    fn setup(&mut self) -> Result<(), ModuleError> {
        self.addressing = Some(DeviceAddressing::new(&self.config.subnet, self.config.port)?);
        if self.sender.is_none() {
            self.sender = Some(UdpSender::bind()?);
        }
        self.primed.clear();
        Ok(())
    }

    fn update(&mut self, _record: &FrameRecord, _enqueue: &mut dyn FnMut(RoutedCommand)) {}

    fn cleanup(&mut self) {
        self.sender = None;
    }

    fn process_command(&mut self, command: &Command) -> Result<(), ModuleError> {
        match command {
            Command::SendColor { ball_id, color } => self.send_color(ball_id, *color),
            Command::ConfigureModule { module_args, .. } => self.configure(module_args),
            _ => Ok(()),
        }
    }
}
