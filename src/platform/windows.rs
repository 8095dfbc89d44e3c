use crate::error::{PadBridgeError, Result};
use crate::physical::{
    ControllerId, PhysicalControllerHub, PhysicalReading, ERROR_DEVICE_NOT_CONNECTED,
    MAX_CONTROLLERS,
};
use crate::platform::InputBackend;
use rusty_xinput::{XInputHandle, XInputState, XInputUsageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Polls the four XInput user slots and publishes their readings.
///
/// Runs on a dedicated `std::thread`. The XInput library is loaded on that
/// thread; `start` waits until loading has succeeded or failed.
pub struct XInputBackend {
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl XInputBackend {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }
}

fn to_reading(state: &XInputState) -> PhysicalReading {
    let gamepad = &state.raw.Gamepad;
    PhysicalReading {
        buttons: gamepad.wButtons,
        left_trigger: state.left_trigger(),
        right_trigger: state.right_trigger(),
        thumb_lx: gamepad.sThumbLX,
        thumb_ly: gamepad.sThumbLY,
        thumb_rx: gamepad.sThumbRX,
        thumb_ry: gamepad.sThumbRY,
    }
}

fn poll_slot(handle: &XInputHandle, hub: &PhysicalControllerHub, id: ControllerId) -> Result<bool> {
    match handle.get_state(id) {
        Ok(state) => hub.publish(id, 0, to_reading(&state)),
        Err(XInputUsageError::DeviceNotConnected) => hub.publish_disconnected(id),
        Err(XInputUsageError::UnknownError(code)) => {
            hub.publish(id, code, PhysicalReading::default())
        }
        Err(e) => {
            log::trace!("XInput slot {} read failed: {:?}", id, e);
            hub.publish(id, ERROR_DEVICE_NOT_CONNECTED, PhysicalReading::default())
        }
    }
}

impl InputBackend for XInputBackend {
    fn name(&self) -> &'static str {
        "xinput"
    }

    fn start(&mut self, hub: Arc<PhysicalControllerHub>, poll_interval: Duration) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("padbridge-xinput-poller".into())
            .spawn(move || {
                let xinput = match XInputHandle::load_default() {
                    Ok(xinput) => {
                        let _ = ready_tx.send(Ok(()));
                        xinput
                    }
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(format!("XInput unavailable: {:?}", e)));
                        return;
                    }
                };
                log::info!("XInput poller started ({:?} interval)", poll_interval);

                while running.load(Ordering::SeqCst) {
                    for id in 0..MAX_CONTROLLERS as ControllerId {
                        if let Err(e) = poll_slot(&xinput, &hub, id) {
                            log::warn!("Failed to publish XInput slot {}: {}", id, e);
                        }
                    }
                    std::thread::sleep(poll_interval);
                }

                log::info!("XInput poller stopped");
            })?;

        self.thread_handle = Some(handle);
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => {
                self.stop();
                Err(PadBridgeError::Physical(message))
            }
            Err(_) => {
                self.stop();
                Err(PadBridgeError::Physical("XInput poller exited during startup".into()))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for XInputBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
