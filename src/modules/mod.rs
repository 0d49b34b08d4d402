/// 输出模块 (Output Modules)
///
/// 每帧观察 FrameRecord, 产生副作用或内部命令
/// - relay:             颜色命令 → LED 球控制包
/// - position_to_color: 目标位置 → RGB 颜色命令
pub mod position_color;
pub mod relay;

pub use position_color::PositionColorModule;
pub use relay::RelayModule;

use std::collections::BTreeMap;

use crate::command::{Command, RoutedCommand};
use crate::config::EngineConfig;
use crate::error::ModuleError;
use crate::record::FrameRecord;

/// 输出模块接口
pub trait OutputModule: Send {
    fn name(&self) -> &str;

    /// 激活时调用; calling it twice is harmless
    fn setup(&mut self) -> Result<(), ModuleError>;

    /// 每帧调用, must not block on I/O
    fn update(&mut self, record: &FrameRecord, enqueue: &mut dyn FnMut(RoutedCommand));

    /// 释放资源, safe after a partial or failed setup
    fn cleanup(&mut self);

    /// 处理命令; kinds the module does not understand are a no-op
    fn process_command(&mut self, command: &Command) -> Result<(), ModuleError>;
}

/// 模块工厂
pub type ModuleFactory = Box<dyn Fn() -> Box<dyn OutputModule> + Send + Sync>;

/// 模块注册表 (name → factory, plus aliases)
#[derive(Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
    aliases: BTreeMap<String, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置模块
    pub fn with_builtin(config: &EngineConfig) -> Self {
        let mut registry = Self::new();

        let relay = config.relay.clone();
        registry.register(relay::NAME, move || Box::new(RelayModule::new(relay.clone())));

        let position = config.position.clone();
        let route = config.color_route.clone();
        registry.register(position_color::NAME, move || {
            Box::new(PositionColorModule::new(position.clone(), route.clone()))
        });

        registry.alias("UdpBallColorModule", relay::NAME);
        registry.alias("PositionToRgbModule", position_color::NAME);
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn OutputModule> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn alias(&mut self, alias: &str, name: &str) {
        self.aliases.insert(alias.to_string(), name.to_string());
    }

    /// 规范名 (resolves aliases)
    pub fn canonical<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if let Some((key, _)) = self.factories.get_key_value(name) {
            return Some(key.as_str());
        }
        self.aliases
            .get(name)
            .filter(|target| self.factories.contains_key(*target))
            .map(String::as_str)
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn OutputModule>> {
        let canonical = self.canonical(name)?;
        self.factories.get(canonical).map(|factory| factory())
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
