/// 命令总线 (Command Bus)
///
/// - 外部请求: 控制通道 → handle_external → 恰好一个响应
/// - 内部命令: 模块 update → 队列 (FIFO) → 命令循环 → handle_internal
/// - 活动模块槽: 帧循环 try_lock, 命令循环 lock
/// - 常驻模块: 按名称接收路由命令 (默认 relay)
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crate::command::{Command, CommandResponse, ModuleArgs, RoutedCommand};
use crate::config::EngineConfig;
use crate::error::ModuleError;
use crate::modules::{ModuleRegistry, OutputModule};
use crate::record::FrameRecord;

type ModuleSlot = Option<Box<dyn OutputModule>>;

pub struct CommandBus {
    registry: ModuleRegistry,
    active: Mutex<ModuleSlot>,
    /// 活动模块名 (readable while the slot is held)
    active_name: Mutex<Option<String>>,
    residents: Mutex<BTreeMap<String, Box<dyn OutputModule>>>,
    resident_names: Vec<String>,
    default_route: String,
    queue_tx: Sender<RoutedCommand>,
    queue_rx: Receiver<RoutedCommand>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CommandBus {
    pub fn new(
        registry: ModuleRegistry,
        default_route: impl Into<String>,
        resident_names: Vec<String>,
    ) -> Self {
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        Self {
            registry,
            active: Mutex::new(None),
            active_name: Mutex::new(None),
            residents: Mutex::new(BTreeMap::new()),
            resident_names,
            default_route: default_route.into(),
            queue_tx,
            queue_rx,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            ModuleRegistry::with_builtin(config),
            config.color_route.clone(),
            config.resident_modules.clone(),
        )
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn active_name(&self) -> Option<String> {
        lock(&self.active_name).clone()
    }

    /// 内部队列发送端
    pub fn enqueuer(&self) -> Sender<RoutedCommand> {
        self.queue_tx.clone()
    }

    pub fn enqueue(&self, command: RoutedCommand) {
        // the bus owns a receiver, so the channel never disconnects
        let _ = self.queue_tx.send(command);
    }

    pub fn try_pop(&self) -> Option<RoutedCommand> {
        self.queue_rx.try_recv().ok()
    }

    pub fn pending(&self) -> usize {
        self.queue_rx.len()
    }

    // ========== 常驻模块 ==========

    /// 创建并启动常驻模块; failures are logged and the module skipped
    pub fn start_residents(&self) {
        let mut residents = lock(&self.residents);
        for name in &self.resident_names {
            let Some(canonical) = self.registry.canonical(name) else {
                tracing::warn!(module = %name, "unknown resident module");
                continue;
            };
            if residents.contains_key(canonical) {
                continue;
            }
            let Some(mut module) = self.registry.create(canonical) else {
                continue;
            };
            match module.setup() {
                Ok(()) => {
                    tracing::info!(module = %canonical, "resident module started");
                    residents.insert(canonical.to_string(), module);
                }
                Err(e) => {
                    tracing::warn!(module = %canonical, error = %e, "resident module setup failed");
                    module.cleanup();
                }
            }
        }
    }

    /// 清理活动模块与常驻模块
    pub fn shutdown(&self) {
        if let Some(mut module) = lock(&self.active).take() {
            tracing::info!(module = module.name(), "cleaning up active module");
            module.cleanup();
        }
        *lock(&self.active_name) = None;

        let mut residents = lock(&self.residents);
        for (name, module) in residents.iter_mut() {
            tracing::debug!(module = %name, "cleaning up resident module");
            module.cleanup();
        }
        residents.clear();
    }

    // ========== 帧循环 ==========

    /// 调用活动模块的 update; returns false when skipped for this frame
    pub fn update_active(&self, record: &FrameRecord) -> bool {
        let mut slot = match self.active.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        let Some(module) = slot.as_mut() else {
            return false;
        };
        let tx = &self.queue_tx;
        module.update(record, &mut |command| {
            let _ = tx.send(command);
        });
        true
    }

    // ========== 命令处理 ==========

    /// 外部请求, always answered
    pub fn handle_external(&self, command: Command) -> CommandResponse {
        let kind = command.kind();
        let response = match command {
            Command::LoadModule {
                module_name,
                module_args,
            } => self.load(&module_name, module_args),
            Command::UnloadModule => self.unload(),
            Command::ConfigureModule {
                module_name,
                module_args,
            } => self.configure(&module_name, module_args),
            command @ Command::SendColor { .. } => {
                let route = self.default_route.clone();
                match self.deliver(&route, &command) {
                    None => CommandResponse::fail(format!("No module accepts '{route}'")),
                    Some(Err(e)) => CommandResponse::fail(e.to_string()),
                    Some(Ok(())) => CommandResponse::ok("Color sent"),
                }
            }
        };
        tracing::debug!(kind, success = response.success, message = %response.message, "request handled");
        response
    }

    /// 内部命令, no response
    pub fn handle_internal(&self, routed: RoutedCommand) {
        match routed.command {
            command @ Command::SendColor { .. } => {
                let target = routed.target.unwrap_or_else(|| self.default_route.clone());
                match self.deliver(&target, &command) {
                    None => tracing::warn!(target = %target, "no module for color command, dropped"),
                    Some(Err(e)) => tracing::warn!(target = %target, error = %e, "color command failed"),
                    Some(Ok(())) => tracing::trace!(target = %target, "color command delivered"),
                }
            }
            command => {
                let response = self.handle_external(command);
                if response.success {
                    tracing::info!(message = %response.message, "internal command handled");
                } else {
                    tracing::warn!(message = %response.message, "internal command failed");
                }
            }
        }
    }

    fn load(&self, name: &str, args: ModuleArgs) -> CommandResponse {
        let Some(mut module) = self.registry.create(name) else {
            tracing::warn!(module = %name, "unknown module");
            return CommandResponse::fail(format!("Unknown module: {name}"));
        };
        let canonical = module.name().to_string();

        if !args.is_empty() {
            let configure = Command::ConfigureModule {
                module_name: canonical.clone(),
                module_args: args,
            };
            if let Err(e) = module.process_command(&configure) {
                module.cleanup();
                return CommandResponse::fail(format!("Failed to configure {canonical}: {e}"));
            }
        }
        if let Err(e) = module.setup() {
            tracing::warn!(module = %canonical, error = %e, "module setup failed");
            module.cleanup();
            return CommandResponse::fail(format!("Failed to set up {canonical}: {e}"));
        }

        let mut slot = lock(&self.active);
        if let Some(mut previous) = slot.take() {
            tracing::info!(module = previous.name(), "replacing active module");
            previous.cleanup();
        }
        *slot = Some(module);
        *lock(&self.active_name) = Some(canonical.clone());
        tracing::info!(module = %canonical, "module loaded");
        CommandResponse::ok(format!("Module loaded: {canonical}"))
    }

    fn unload(&self) -> CommandResponse {
        let mut slot = lock(&self.active);
        let Some(mut module) = slot.take() else {
            return CommandResponse::fail("No active module");
        };
        module.cleanup();
        *lock(&self.active_name) = None;
        tracing::info!(module = module.name(), "module unloaded");
        CommandResponse::ok(format!("Module unloaded: {}", module.name()))
    }

    fn configure(&self, name: &str, args: ModuleArgs) -> CommandResponse {
        let mut slot = lock(&self.active);
        let Some(module) = slot.as_mut() else {
            return CommandResponse::fail("No active module");
        };
        let active = module.name().to_string();
        if !name.is_empty() && self.registry.canonical(name) != Some(active.as_str()) {
            return CommandResponse::fail(format!("Active module is {active}, not {name}"));
        }
        let command = Command::ConfigureModule {
            module_name: active.clone(),
            module_args: args,
        };
        match module.process_command(&command) {
            Ok(()) => CommandResponse::ok(format!("Module configured: {active}")),
            Err(e) => CommandResponse::fail(format!("Failed to configure {active}: {e}")),
        }
    }

    /// 按名称投递: 活动模块优先, 其次常驻模块; `None` when nobody has that name
    fn deliver(&self, target: &str, command: &Command) -> Option<Result<(), ModuleError>> {
        let target = self.registry.canonical(target).unwrap_or(target);
        {
            let mut slot = lock(&self.active);
            if let Some(module) = slot.as_mut().filter(|m| m.name() == target) {
                return Some(module.process_command(command));
            }
        }
        let mut residents = lock(&self.residents);
        residents
            .get_mut(target)
            .map(|module| module.process_command(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Rgb;
    use std::sync::Arc;

    /// 记录收到的命令
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_setup: bool,
    }

    impl OutputModule for Probe {
        fn name(&self) -> &str {
            self.name
        }
        fn setup(&mut self) -> Result<(), ModuleError> {
            if self.fail_setup {
                return Err(ModuleError::Setup("probe refused".into()));
            }
            self.log.lock().unwrap().push(format!("{}:setup", self.name));
            Ok(())
        }
        fn update(&mut self, _record: &FrameRecord, _enqueue: &mut dyn FnMut(RoutedCommand)) {}
        fn cleanup(&mut self) {
            self.log.lock().unwrap().push(format!("{}:cleanup", self.name));
        }
        fn process_command(&mut self, command: &Command) -> Result<(), ModuleError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, command.kind()));
            Ok(())
        }
    }

    fn bus(log: &Arc<Mutex<Vec<String>>>) -> CommandBus {
        let mut registry = ModuleRegistry::new();
        for (name, fail_setup) in [("alpha", false), ("beta", false), ("broken", true)] {
            let log = log.clone();
            registry.register(name, move || {
                Box::new(Probe {
                    name,
                    log: log.clone(),
                    fail_setup,
                })
            });
        }
        registry.alias("Alpha", "alpha");
        CommandBus::new(registry, "alpha", vec!["alpha".into()])
    }

    fn load(name: &str) -> Command {
        Command::LoadModule {
            module_name: name.into(),
            module_args: ModuleArgs::new(),
        }
    }

    fn color() -> Command {
        Command::SendColor {
            ball_id: "all".into(),
            color: Rgb::new(1, 2, 3),
        }
    }

    #[test]
    fn unload_without_active_module_fails() {
        let log = Arc::default();
        let bus = bus(&log);
        let response = bus.handle_external(Command::UnloadModule);
        assert!(!response.success);
        assert_eq!(response.message, "No active module");
    }

    #[test]
    fn unknown_load_keeps_previous_module() {
        let log = Arc::default();
        let bus = bus(&log);
        assert!(bus.handle_external(load("beta")).success);
        let response = bus.handle_external(load("gamma"));
        assert!(!response.success);
        assert_eq!(bus.active_name().as_deref(), Some("beta"));
    }

    #[test]
    fn failed_setup_keeps_previous_module() {
        let log = Arc::default();
        let bus = bus(&log);
        assert!(bus.handle_external(load("beta")).success);
        assert!(!bus.handle_external(load("broken")).success);
        assert_eq!(bus.active_name().as_deref(), Some("beta"));
        assert!(!log.lock().unwrap().contains(&"beta:cleanup".to_string()));
    }

    #[test]
    fn load_replaces_and_cleans_up_previous() {
        let log = Arc::default();
        let bus = bus(&log);
        bus.handle_external(load("beta"));
        bus.handle_external(load("Alpha"));
        assert_eq!(bus.active_name().as_deref(), Some("alpha"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["beta:setup", "alpha:setup", "beta:cleanup"]
        );
    }

    #[test]
    fn configure_checks_active_module_name() {
        let log = Arc::default();
        let bus = bus(&log);
        let configure = |name: &str| Command::ConfigureModule {
            module_name: name.into(),
            module_args: ModuleArgs::new(),
        };
        assert_eq!(
            bus.handle_external(configure("beta")).message,
            "No active module"
        );
        bus.handle_external(load("beta"));
        assert!(!bus.handle_external(configure("alpha")).success);
        assert!(bus.handle_external(configure("beta")).success);
        assert!(bus.handle_external(configure("")).success);
    }

    #[test]
    fn color_goes_to_active_module_before_resident() {
        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let bus = bus(&log);
        bus.start_residents();
        bus.handle_internal(RoutedCommand::new(color()));
        bus.handle_external(load("alpha"));
        bus.handle_internal(RoutedCommand::to(color(), "alpha"));
        // nobody is called beta
        bus.handle_internal(RoutedCommand::to(color(), "beta"));

        let log = log.lock().unwrap();
        let deliveries: Vec<_> = log
            .iter()
            .filter(|l| l.ends_with("SEND_COLOR_COMMAND"))
            .collect();
        assert_eq!(deliveries.len(), 2);
    }

    #[test]
    fn external_color_without_receiver_fails() {
        let log = Arc::default();
        let bus = bus(&log);
        assert!(!bus.handle_external(color()).success);
        bus.start_residents();
        assert!(bus.handle_external(color()).success);
    }

    #[test]
    fn shutdown_cleans_up_everything() {
        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let bus = bus(&log);
        bus.start_residents();
        bus.handle_external(load("beta"));
        bus.shutdown();
        assert_eq!(bus.active_name(), None);
        let log = log.lock().unwrap();
        assert!(log.contains(&"alpha:cleanup".to_string()));
        assert!(log.contains(&"beta:cleanup".to_string()));
    }
}
