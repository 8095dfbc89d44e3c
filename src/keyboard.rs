//! Virtual keyboard fed by keyboard element mappers.
//!
//! Several controllers may hold the same key. The key goes down on the first
//! press and comes up when the last controller releases it.

use crate::error::Result;
use crate::physical::ControllerId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Virtual-key code as understood by the host keyboard input API.
pub type KeyCode = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

/// Receives key state submissions from element mappers.
pub trait KeyboardSink: Send + Sync {
    fn submit_key_pressed(&self, controller: ControllerId, key: KeyCode);
    fn submit_key_released(&self, controller: ControllerId, key: KeyCode);
}

/// Collects one controller pass worth of key submissions.
///
/// Several slots of a mapper may drive the same key. A key submitted as
/// pressed by any of them stays pressed; [`commit`] then forwards a single
/// submission per key to the wrapped sink.
///
/// [`commit`]: KeyboardBatch::commit
pub struct KeyboardBatch<'a> {
    sink: &'a dyn KeyboardSink,
    keys: Mutex<BTreeMap<(ControllerId, KeyCode), bool>>,
}

impl<'a> KeyboardBatch<'a> {
    pub fn new(sink: &'a dyn KeyboardSink) -> Self {
        Self {
            sink,
            keys: Mutex::new(BTreeMap::new()),
        }
    }

    fn record(&self, controller: ControllerId, key: KeyCode, pressed: bool) {
        let mut keys = self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *keys.entry((controller, key)).or_insert(false) |= pressed;
    }

    pub fn commit(self) {
        let keys = self.keys.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        for ((controller, key), pressed) in keys {
            if pressed {
                self.sink.submit_key_pressed(controller, key);
            } else {
                self.sink.submit_key_released(controller, key);
            }
        }
    }
}

impl KeyboardSink for KeyboardBatch<'_> {
    fn submit_key_pressed(&self, controller: ControllerId, key: KeyCode) {
        self.record(controller, key, true);
    }

    fn submit_key_released(&self, controller: ControllerId, key: KeyCode) {
        self.record(controller, key, false);
    }
}

/// Delivers key transitions to the system.
pub trait KeyInjector: Send + Sync {
    fn inject(&self, key: KeyCode, action: KeyAction) -> Result<()>;
}

pub struct SystemKeyInjector;

impl KeyInjector for SystemKeyInjector {
    fn inject(&self, key: KeyCode, action: KeyAction) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            use windows::Win32::UI::Input::KeyboardAndMouse::{
                SendInput, INPUT, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
                VIRTUAL_KEY,
            };

            let flags = match action {
                KeyAction::Press => 0u32,
                KeyAction::Release => KEYEVENTF_KEYUP.0,
            };

            let mut input = INPUT::default();
            input.r#type = INPUT_KEYBOARD;
            input.Anonymous.ki = KEYBDINPUT {
                wVk: VIRTUAL_KEY(key),
                wScan: 0,
                dwFlags: KEYBD_EVENT_FLAGS(flags),
                time: 0,
                dwExtraInfo: 0,
            };

            let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
            if sent == 0 {
                return Err(crate::error::PadBridgeError::Physical(format!(
                    "SendInput failed for key {:#04x}",
                    key
                )));
            }
            Ok(())
        }

        #[cfg(not(target_os = "windows"))]
        {
            log::debug!("Key event (no injector on this platform): {:#04x} {:?}", key, action);
            Ok(())
        }
    }
}

/// Per-key record of which controllers currently hold it.
pub struct VirtualKeyboard {
    held: Mutex<HashMap<KeyCode, u32>>,
    injector: Arc<dyn KeyInjector>,
}

impl VirtualKeyboard {
    pub fn new(injector: Arc<dyn KeyInjector>) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            injector,
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemKeyInjector))
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.lock_held().get(&key).is_some_and(|mask| *mask != 0)
    }

    fn lock_held(&self) -> std::sync::MutexGuard<'_, HashMap<KeyCode, u32>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, controller: ControllerId, key: KeyCode, pressed: bool) {
        let bit = 1u32.checked_shl(controller).unwrap_or(0);
        let transition = {
            let mut held = self.lock_held();
            let mask = held.entry(key).or_insert(0);
            let was_down = *mask != 0;
            if pressed {
                *mask |= bit;
            } else {
                *mask &= !bit;
            }
            match (was_down, *mask != 0) {
                (false, true) => Some(KeyAction::Press),
                (true, false) => Some(KeyAction::Release),
                _ => None,
            }
        };

        if let Some(action) = transition {
            log::debug!("Key {:#04x} {:?} (controller {})", key, action, controller);
            if let Err(e) = self.injector.inject(key, action) {
                log::warn!("Failed to inject key {:#04x}: {}", key, e);
            }
        }
    }
}

impl KeyboardSink for VirtualKeyboard {
    fn submit_key_pressed(&self, controller: ControllerId, key: KeyCode) {
        self.update(controller, key, true);
    }

    fn submit_key_released(&self, controller: ControllerId, key: KeyCode) {
        self.update(controller, key, false);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every submission so tests can assert on side effects.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<(ControllerId, KeyCode, KeyAction)>>,
    }

    impl RecordingSink {
        pub fn take(&self) -> Vec<(ControllerId, KeyCode, KeyAction)> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl KeyboardSink for RecordingSink {
        fn submit_key_pressed(&self, controller: ControllerId, key: KeyCode) {
            self.events
                .lock()
                .unwrap()
                .push((controller, key, KeyAction::Press));
        }

        fn submit_key_released(&self, controller: ControllerId, key: KeyCode) {
            self.events
                .lock()
                .unwrap()
                .push((controller, key, KeyAction::Release));
        }
    }

    #[derive(Default)]
    struct RecordingInjector {
        injected: Mutex<Vec<(KeyCode, KeyAction)>>,
    }

    impl KeyInjector for RecordingInjector {
        fn inject(&self, key: KeyCode, action: KeyAction) -> Result<()> {
            self.injected.lock().unwrap().push((key, action));
            Ok(())
        }
    }

    #[test]
    fn key_transitions_only_on_first_press_and_last_release() {
        let injector = Arc::new(RecordingInjector::default());
        let keyboard = VirtualKeyboard::new(injector.clone());

        keyboard.submit_key_pressed(0, 0x20);
        keyboard.submit_key_pressed(1, 0x20);
        keyboard.submit_key_pressed(0, 0x20);
        keyboard.submit_key_released(0, 0x20);
        assert!(keyboard.is_pressed(0x20));
        keyboard.submit_key_released(1, 0x20);
        assert!(!keyboard.is_pressed(0x20));

        assert_eq!(
            *injector.injected.lock().unwrap(),
            vec![(0x20, KeyAction::Press), (0x20, KeyAction::Release)]
        );
    }

    #[test]
    fn batch_keeps_a_key_pressed_by_any_slot() {
        let sink = RecordingSink::default();
        let batch = KeyboardBatch::new(&sink);
        batch.submit_key_pressed(0, 0x20);
        batch.submit_key_released(0, 0x20);
        batch.submit_key_released(0, 0x41);
        batch.submit_key_released(0, 0x41);
        assert!(sink.take().is_empty());

        batch.commit();
        assert_eq!(
            sink.take(),
            vec![(0, 0x20, KeyAction::Press), (0, 0x41, KeyAction::Release)]
        );
    }

    #[test]
    fn release_of_unheld_key_is_silent() {
        let injector = Arc::new(RecordingInjector::default());
        let keyboard = VirtualKeyboard::new(injector.clone());
        keyboard.submit_key_released(2, 0x41);
        assert!(injector.injected.lock().unwrap().is_empty());
    }
}
