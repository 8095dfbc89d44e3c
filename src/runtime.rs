use crate::config::AppConfig;
use crate::error::{PadBridgeError, Result};
use crate::keyboard::KeyboardSink;
use crate::mapper::{Mapper, DEFAULT_MAPPER_NAME};
use crate::mapper_builder::MapperRegistry;
use crate::monitor::StateChangeMonitor;
use crate::physical::{ControllerId, PhysicalControllerHub, MAX_CONTROLLERS};
use crate::platform::InputBackend;
use crate::virtual_controller::VirtualController;
use std::sync::Arc;
use std::time::Duration;

/// Everything needed to serve the four controller slots.
///
/// Owns the mapper registry, the physical hub, one virtual controller per
/// slot and, once started, their monitor threads and the input backend.
pub struct Runtime {
    config: AppConfig,
    registry: MapperRegistry,
    hub: Arc<PhysicalControllerHub>,
    controllers: Vec<Arc<VirtualController>>,
    monitors: Vec<StateChangeMonitor>,
    backend: Option<Box<dyn InputBackend>>,
}

impl Runtime {
    pub fn new(config: AppConfig, keyboard: Arc<dyn KeyboardSink>) -> Result<Self> {
        let registry = config.build_registry();
        log::info!("Mappers available: {}", registry.names().join(", "));

        let hub = Arc::new(PhysicalControllerHub::new());
        let mut controllers = Vec::with_capacity(MAX_CONTROLLERS);
        for id in 0..MAX_CONTROLLERS as ControllerId {
            let mapper = resolve_mapper(&registry, config.mapper_for_slot(id))?;
            let controller = VirtualController::new(id, mapper, hub.clone(), keyboard.clone());
            apply_settings(&controller, &config)?;
            controllers.push(Arc::new(controller));
        }

        Ok(Self {
            config,
            registry,
            hub,
            controllers,
            monitors: Vec::new(),
            backend: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &MapperRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<PhysicalControllerHub> {
        &self.hub
    }

    pub fn controller(&self, id: ControllerId) -> Option<&Arc<VirtualController>> {
        self.controllers.get(id as usize)
    }

    pub fn controllers(&self) -> &[Arc<VirtualController>] {
        &self.controllers
    }

    /// Starts one monitor thread per controller. `on_change` runs on the
    /// monitor thread after each applied reading.
    pub fn start_monitors<F>(&mut self, on_change: F) -> Result<()>
    where
        F: Fn(&VirtualController) + Clone + Send + 'static,
    {
        if !self.monitors.is_empty() {
            return Ok(());
        }
        for controller in &self.controllers {
            let monitor = StateChangeMonitor::start_with(
                controller.clone(),
                self.hub.clone(),
                Box::new(on_change.clone()),
            )?;
            self.monitors.push(monitor);
        }
        Ok(())
    }

    pub fn start_backend(&mut self, mut backend: Box<dyn InputBackend>) -> Result<()> {
        let interval = Duration::from_millis(self.config.settings.poll_interval_ms);
        backend.start(self.hub.clone(), interval)?;
        log::info!("Input backend {} started", backend.name());
        self.backend = Some(backend);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.stop();
        }
        for monitor in &mut self.monitors {
            monitor.stop();
        }
        self.monitors.clear();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Falls back to the default mapper when the configured one did not build.
fn resolve_mapper(registry: &MapperRegistry, name: &str) -> Result<Arc<Mapper>> {
    if let Some(mapper) = registry.get(name) {
        return Ok(mapper);
    }
    log::error!("Mapper {} is not available, using {}", name, DEFAULT_MAPPER_NAME);
    registry
        .get(DEFAULT_MAPPER_NAME)
        .ok_or_else(|| PadBridgeError::UnknownMapper(name.to_string()))
}

fn apply_settings(controller: &VirtualController, config: &AppConfig) -> Result<()> {
    let settings = &config.settings;
    controller.set_event_buffer_capacity(settings.event_buffer_capacity)?;
    controller.set_force_feedback_gain(settings.force_feedback_gain)?;
    for (axis, axis_settings) in config.axis_settings() {
        controller.set_deadzone(axis, axis_settings.deadzone)?;
        controller.set_saturation(axis, axis_settings.saturation)?;
        if let Some((min, max)) = axis_settings.range {
            controller.set_range(axis, min, max)?;
        }
    }
    Ok(())
}
