use padbridge::data_format::POV_CENTERED;
use padbridge::element::{ANALOG_MAX, ANALOG_MIN};
use padbridge::event_buffer::EventRecord;
use padbridge::keyboard::{KeyAction, KeyCode, KeyInjector, VirtualKeyboard};
use padbridge::physical::{button_flags, PhysicalControllerHub, PhysicalReading};
use padbridge::{
    AppConfig, Axis, Button, DataFormat, ElementIdentifier, ElementSelector, FormatEntry,
    VirtualController,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Keys {
    log: Mutex<Vec<(KeyCode, KeyAction)>>,
}

impl KeyInjector for Keys {
    fn inject(&self, key: KeyCode, action: KeyAction) -> padbridge::Result<()> {
        self.log.lock().unwrap().push((key, action));
        Ok(())
    }
}

const CONFIG: &str = r#"{
    "custom_mappers": {
        "Flight": {
            "template": "XInputNative",
            "elements": {
                "StickRightY": "Split(Axis(RotY, +), Keyboard(0x57))",
                "ButtonBack": null
            }
        }
    }
}"#;

fn read_i32(packet: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(packet[offset..offset + 4].try_into().unwrap())
}

fn events_of(records: &[EventRecord]) -> Vec<(u64, ElementIdentifier, u32)> {
    records
        .iter()
        .map(|record| (record.sequence, record.element, record.value))
        .collect()
}

fn read_u32(packet: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(packet[offset..offset + 4].try_into().unwrap())
}

#[test]
fn reading_travels_from_config_to_packet() {
    let registry = AppConfig::from_json(CONFIG).unwrap().build_registry();
    let mapper = registry.get("Flight").unwrap();

    let hub = Arc::new(PhysicalControllerHub::new());
    let keys = Arc::new(Keys::default());
    let keyboard = Arc::new(VirtualKeyboard::new(keys.clone()));
    let controller = VirtualController::new(0, mapper, hub.clone(), keyboard);
    controller.set_event_buffer_capacity(16).unwrap();

    let caps = controller.capabilities();
    let format = DataFormat::new(
        &[
            FormatEntry::new(ElementSelector::AnyAxis, 0),
            FormatEntry::new(ElementSelector::Axis(Axis::RotY), 4),
            FormatEntry::new(ElementSelector::Pov(0), 8),
            FormatEntry::new(ElementSelector::Pov(1), 12).optional(),
            FormatEntry::new(ElementSelector::Button(Button::new(0).unwrap()), 16),
            FormatEntry::new(ElementSelector::AnyButton, 17),
        ],
        20,
        &caps,
    )
    .unwrap();

    // Right stick pushed up: Y is inverted, so RotY goes negative and the
    // split routes it to the keyboard branch.
    hub.publish(
        0,
        0,
        PhysicalReading {
            buttons: button_flags::A | button_flags::DPAD_DOWN | button_flags::DPAD_LEFT,
            thumb_lx: 32767,
            thumb_ry: 20000,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(controller.refresh_state());
    assert_eq!(*keys.log.lock().unwrap(), vec![(0x57, KeyAction::Press)]);
    // Resting triggers sit at the bottom of Z and RotZ.
    assert_eq!(
        events_of(&controller.pop_oldest_events(16)),
        vec![
            (1, ElementIdentifier::Axis(Axis::X), ANALOG_MAX as u32),
            (2, ElementIdentifier::Axis(Axis::Z), ANALOG_MIN as u32),
            (3, ElementIdentifier::Axis(Axis::RotZ), ANALOG_MIN as u32),
            (4, ElementIdentifier::Button(Button::new(0).unwrap()), 0x80),
            (5, ElementIdentifier::Pov, 22500),
        ]
    );

    let mut packet = [0u8; 20];
    format.write_data_packet(&mut packet, &controller.state()).unwrap();
    assert_eq!(read_i32(&packet, 0), 32767);
    // Positive half-axis branch saw only its neutral contribution.
    assert_eq!(read_i32(&packet, 4), 0);
    assert_eq!(read_u32(&packet, 8), 22500);
    assert_eq!(read_u32(&packet, 12), POV_CENTERED);
    assert_eq!(packet[16], 0x80);
    assert_eq!(packet[17], 0x00);
    assert_eq!(
        format.element_for_offset(17),
        Some(ElementIdentifier::Button(Button::new(1).unwrap()))
    );

    // Stick pulled down: the axis branch takes over and the key is released.
    hub.publish(
        0,
        0,
        PhysicalReading {
            thumb_ry: -32767,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(controller.refresh_state());
    assert_eq!(controller.state().axis(Axis::RotY), 32767);
    assert_eq!(keys.log.lock().unwrap().last(), Some(&(0x57, KeyAction::Release)));

    let guard = controller.lock();
    assert_eq!(guard.event_count(), 4);
    assert!(!guard.is_event_buffer_overflowed());
    assert_eq!(
        events_of(&guard.pop_oldest_events(4)),
        vec![
            (6, ElementIdentifier::Axis(Axis::X), 0),
            (7, ElementIdentifier::Axis(Axis::RotY), ANALOG_MAX as u32),
            (8, ElementIdentifier::Button(Button::new(0).unwrap()), 0),
            (9, ElementIdentifier::Pov, POV_CENTERED),
        ]
    );
}

#[test]
fn removed_slot_shrinks_capabilities() {
    let registry = AppConfig::from_json(CONFIG).unwrap().build_registry();
    let native = registry.get("XInputNative").unwrap().capabilities();
    let flight = registry.get("Flight").unwrap().capabilities();

    assert_eq!(native.num_buttons(), 10);
    // Back was button 7; Start/LS/RS keep the count at 10.
    assert_eq!(flight.num_buttons(), 10);
    assert_eq!(
        flight.axes().collect::<Vec<_>>(),
        vec![Axis::X, Axis::Y, Axis::RotX, Axis::RotY, Axis::Z, Axis::RotZ]
    );
    assert!(flight.has_pov());
}
