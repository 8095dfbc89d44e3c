pub mod config;
pub mod data_format;
pub mod element;
pub mod element_mapper;
pub mod error;
pub mod event_buffer;
pub mod keyboard;
pub mod mapper;
pub mod mapper_builder;
pub mod mapper_parser;
pub mod monitor;
pub mod physical;
pub mod platform;
pub mod properties;
pub mod runtime;
mod sync;
pub mod virtual_controller;

pub use config::AppConfig;
pub use data_format::{DataFormat, ElementSelector, FormatEntry};
pub use element::{AbstractState, Axis, AxisDirection, Button, Capabilities, ElementIdentifier};
pub use error::{PadBridgeError, Result};
pub use mapper::Mapper;
pub use mapper_builder::{MapperBuilder, MapperRegistry};
pub use runtime::Runtime;
pub use virtual_controller::VirtualController;

use data_format::POV_CENTERED;
use event_buffer::EVENT_BUFFER_CAPACITY_MAX;
use keyboard::VirtualKeyboard;
use std::sync::Arc;

pub fn run() {
    env_logger::init();

    if let Err(e) = serve() {
        log::error!("padbridge stopped: {}", e);
        std::process::exit(1);
    }
}

fn serve() -> Result<()> {
    let config = AppConfig::load()?;
    let mut runtime = Runtime::new(config, Arc::new(VirtualKeyboard::system()))?;
    runtime.start_monitors(log_events)?;
    runtime.start_backend(platform::create_backend())?;
    log::info!("padbridge running");

    loop {
        std::thread::park();
    }
}

fn log_events(controller: &VirtualController) {
    for event in controller.pop_oldest_events(EVENT_BUFFER_CAPACITY_MAX) {
        let value = match event.element {
            ElementIdentifier::Axis(_) => (event.value as i32).to_string(),
            ElementIdentifier::Pov if event.value == POV_CENTERED => "centered".to_string(),
            _ => event.value.to_string(),
        };
        log::info!(
            "Controller {} #{} {:?} = {} ({} ms)",
            controller.id(),
            event.sequence,
            event.element,
            value,
            event.timestamp_ms
        );
    }
}
