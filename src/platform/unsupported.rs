use crate::error::{PadBridgeError, Result};
use crate::physical::PhysicalControllerHub;
use crate::platform::InputBackend;
use std::sync::Arc;
use std::time::Duration;

/// Stub for platforms without an XInput implementation.
pub struct UnsupportedBackend;

impl InputBackend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn start(&mut self, _hub: Arc<PhysicalControllerHub>, _poll_interval: Duration) -> Result<()> {
        Err(PadBridgeError::PlatformNotSupported(
            std::env::consts::OS.into(),
        ))
    }

    fn stop(&mut self) {}
}
