use crate::error::Result;
use crate::physical::PhysicalControllerHub;
use std::sync::Arc;
use std::time::Duration;

/// Feeds physical controller readings into a [`PhysicalControllerHub`].
pub trait InputBackend: Send {
    fn name(&self) -> &'static str;

    /// Begins publishing readings every `poll_interval` until stopped.
    fn start(&mut self, hub: Arc<PhysicalControllerHub>, poll_interval: Duration) -> Result<()>;

    fn stop(&mut self);
}

#[cfg(target_os = "windows")]
mod windows;
#[cfg(not(target_os = "windows"))]
mod unsupported;

/// Create the platform-appropriate input backend.
pub fn create_backend() -> Box<dyn InputBackend> {
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::XInputBackend::new())
    }
    #[cfg(not(target_os = "windows"))]
    {
        Box::new(unsupported::UnsupportedBackend)
    }
}
