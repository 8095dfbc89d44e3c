//! Physical controller readings and the source the virtual controllers poll.

use crate::error::{PadBridgeError, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Number of physical controller slots.
pub const MAX_CONTROLLERS: usize = 4;

/// Physical slot index, `0..MAX_CONTROLLERS`.
pub type ControllerId = u32;

/// Error code reported for a slot with nothing plugged in.
pub const ERROR_DEVICE_NOT_CONNECTED: u32 = 1167;

/// XInput button bit flags.
pub mod button_flags {
    pub const DPAD_UP: u16 = 0x0001;
    pub const DPAD_DOWN: u16 = 0x0002;
    pub const DPAD_LEFT: u16 = 0x0004;
    pub const DPAD_RIGHT: u16 = 0x0008;
    pub const START: u16 = 0x0010;
    pub const BACK: u16 = 0x0020;
    pub const LEFT_THUMB: u16 = 0x0040;
    pub const RIGHT_THUMB: u16 = 0x0080;
    pub const LEFT_SHOULDER: u16 = 0x0100;
    pub const RIGHT_SHOULDER: u16 = 0x0200;
    pub const A: u16 = 0x1000;
    pub const B: u16 = 0x2000;
    pub const X: u16 = 0x4000;
    pub const Y: u16 = 0x8000;
}

/// One snapshot of a physical controller's raw inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysicalReading {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

impl PhysicalReading {
    pub fn is_pressed(&self, flag: u16) -> bool {
        self.buttons & flag != 0
    }
}

/// A reading together with the status it was obtained with.
///
/// `(error_code, packet_number)` identifies a reading: two states with the
/// same pair are the same reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysicalState {
    pub error_code: u32,
    pub packet_number: u32,
    pub reading: PhysicalReading,
}

impl PhysicalState {
    pub fn disconnected() -> Self {
        Self {
            error_code: ERROR_DEVICE_NOT_CONNECTED,
            ..Self::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.error_code == 0
    }

    pub fn same_reading(&self, other: &PhysicalState) -> bool {
        self.error_code == other.error_code && self.packet_number == other.packet_number
    }
}

/// Cooperative cancellation for blocking waits.
///
/// Cloning shares the flag. Cancelling wakes every thread parked in
/// [`CancellationToken::wait_timeout`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *lock(flag) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Sleeps up to `timeout`, returning early (true) once cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = lock(flag);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard
    }
}

/// Source of physical controller readings.
pub trait PhysicalController: Send + Sync {
    fn current_state(&self, id: ControllerId) -> PhysicalState;

    /// Blocks until the reading for `id` differs from `last_seen`.
    ///
    /// Returns false without waiting further once `cancel` fires.
    fn wait_for_change(
        &self,
        id: ControllerId,
        last_seen: PhysicalState,
        cancel: &CancellationToken,
    ) -> bool;
}

/// How long a waiter sleeps between cancellation checks.
const WAIT_SLICE: Duration = Duration::from_millis(20);

struct Slot {
    state: Mutex<PhysicalState>,
    changed: Condvar,
}

/// In-memory store of the latest reading per slot.
///
/// Platform backends publish into the hub; virtual controllers read from it.
pub struct PhysicalControllerHub {
    slots: Vec<Slot>,
}

impl PhysicalControllerHub {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_CONTROLLERS)
                .map(|_| Slot {
                    state: Mutex::new(PhysicalState::disconnected()),
                    changed: Condvar::new(),
                })
                .collect(),
        }
    }

    fn slot(&self, id: ControllerId) -> Result<&Slot> {
        self.slots
            .get(id as usize)
            .ok_or_else(|| PadBridgeError::Physical(format!("No controller slot {}", id)))
    }

    /// Publishes a reading. The packet number advances only when something
    /// actually changed. Returns true if waiters were notified.
    pub fn publish(&self, id: ControllerId, error_code: u32, reading: PhysicalReading) -> Result<bool> {
        let slot = self.slot(id)?;
        let mut state = lock(&slot.state);
        let reading = if error_code == 0 {
            reading
        } else {
            PhysicalReading::default()
        };
        if state.error_code == error_code && state.reading == reading {
            return Ok(false);
        }
        state.error_code = error_code;
        state.reading = reading;
        state.packet_number = state.packet_number.wrapping_add(1);
        log::trace!(
            "Controller {} packet {} (error {})",
            id,
            state.packet_number,
            error_code
        );
        slot.changed.notify_all();
        Ok(true)
    }

    pub fn publish_disconnected(&self, id: ControllerId) -> Result<bool> {
        self.publish(id, ERROR_DEVICE_NOT_CONNECTED, PhysicalReading::default())
    }
}

impl Default for PhysicalControllerHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalController for PhysicalControllerHub {
    fn current_state(&self, id: ControllerId) -> PhysicalState {
        match self.slot(id) {
            Ok(slot) => *lock(&slot.state),
            Err(_) => PhysicalState::disconnected(),
        }
    }

    fn wait_for_change(
        &self,
        id: ControllerId,
        last_seen: PhysicalState,
        cancel: &CancellationToken,
    ) -> bool {
        let Ok(slot) = self.slot(id) else {
            return false;
        };
        let mut state = lock(&slot.state);
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if !state.same_reading(&last_seen) {
                return true;
            }
            state = slot
                .changed
                .wait_timeout(state, WAIT_SLICE)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
