//! Immutable per-layout aggregate of element mappers.
//!
//! A [`Mapper`] holds one optional [`ElementMapper`] per physical input slot
//! and the force feedback actuator layout, and derives the capabilities a
//! virtual controller built on it exposes.

use crate::element::{
    AbstractState, Axis, AxisDirection, Button, Capabilities, ElementIdentifier, PovDirection,
    ANALOG_MAX, ANALOG_MIN,
};
use crate::element_mapper::{ElementMapper, MapperContext};
use crate::keyboard::KeyboardBatch;
use crate::physical::{button_flags, PhysicalReading};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical input slots in mapping order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementSlot {
    StickLeftX,
    StickLeftY,
    StickRightX,
    StickRightY,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    TriggerLT,
    TriggerRT,
    ButtonA,
    ButtonB,
    ButtonX,
    ButtonY,
    ButtonLB,
    ButtonRB,
    ButtonBack,
    ButtonStart,
    ButtonLS,
    ButtonRS,
}

pub const ELEMENT_SLOT_COUNT: usize = 20;

impl ElementSlot {
    pub const ALL: [ElementSlot; ELEMENT_SLOT_COUNT] = [
        ElementSlot::StickLeftX,
        ElementSlot::StickLeftY,
        ElementSlot::StickRightX,
        ElementSlot::StickRightY,
        ElementSlot::DpadUp,
        ElementSlot::DpadDown,
        ElementSlot::DpadLeft,
        ElementSlot::DpadRight,
        ElementSlot::TriggerLT,
        ElementSlot::TriggerRT,
        ElementSlot::ButtonA,
        ElementSlot::ButtonB,
        ElementSlot::ButtonX,
        ElementSlot::ButtonY,
        ElementSlot::ButtonLB,
        ElementSlot::ButtonRB,
        ElementSlot::ButtonBack,
        ElementSlot::ButtonStart,
        ElementSlot::ButtonLS,
        ElementSlot::ButtonRS,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|slot| format!("{slot:?}").eq_ignore_ascii_case(name))
    }
}

/// One optional element mapper per physical input slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementMap {
    slots: [Option<ElementMapper>; ELEMENT_SLOT_COUNT],
}

impl ElementMap {
    pub fn get(&self, slot: ElementSlot) -> Option<&ElementMapper> {
        self.slots[slot.index()].as_ref()
    }

    pub fn set(&mut self, slot: ElementSlot, mapper: Option<ElementMapper>) {
        self.slots[slot.index()] = mapper;
    }

    pub fn with(mut self, slot: ElementSlot, mapper: ElementMapper) -> Self {
        self.set(slot, Some(mapper));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementSlot, &ElementMapper)> {
        ElementSlot::ALL
            .iter()
            .filter_map(move |slot| self.get(*slot).map(|m| (*slot, m)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActuatorSlot {
    LeftMotor,
    RightMotor,
}

pub const ACTUATOR_SLOT_COUNT: usize = 2;

impl ActuatorSlot {
    pub const ALL: [ActuatorSlot; ACTUATOR_SLOT_COUNT] =
        [ActuatorSlot::LeftMotor, ActuatorSlot::RightMotor];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|slot| format!("{slot:?}").eq_ignore_ascii_case(name))
    }
}

/// Which virtual axes drive a physical force feedback motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceFeedbackActuator {
    SingleAxis(Axis, AxisDirection),
    MagnitudeProjection(Axis, Axis),
}

impl ForceFeedbackActuator {
    pub fn axes(&self) -> Vec<Axis> {
        match *self {
            Self::SingleAxis(axis, _) => vec![axis],
            Self::MagnitudeProjection(first, second) => vec![first, second],
        }
    }
}

impl fmt::Display for ForceFeedbackActuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleAxis(axis, AxisDirection::Both) => write!(f, "SingleAxis({axis})"),
            Self::SingleAxis(axis, AxisDirection::Positive) => write!(f, "SingleAxis({axis}, +)"),
            Self::SingleAxis(axis, AxisDirection::Negative) => write!(f, "SingleAxis({axis}, -)"),
            Self::MagnitudeProjection(a, b) => write!(f, "MagnitudeProjection({a}, {b})"),
        }
    }
}

/// Actuator per motor; `None` means the motor is not driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorMap {
    slots: [Option<ForceFeedbackActuator>; ACTUATOR_SLOT_COUNT],
}

impl ActuatorMap {
    pub fn empty() -> Self {
        Self {
            slots: [None; ACTUATOR_SLOT_COUNT],
        }
    }

    pub fn get(&self, slot: ActuatorSlot) -> Option<ForceFeedbackActuator> {
        self.slots[slot as usize]
    }

    pub fn set(&mut self, slot: ActuatorSlot, actuator: Option<ForceFeedbackActuator>) {
        self.slots[slot as usize] = actuator;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActuatorSlot, ForceFeedbackActuator)> + '_ {
        ActuatorSlot::ALL
            .iter()
            .filter_map(move |slot| self.get(*slot).map(|a| (*slot, a)))
    }
}

impl Default for ActuatorMap {
    /// Both motors follow the magnitude of the X/Y plane.
    fn default() -> Self {
        let projection = ForceFeedbackActuator::MagnitudeProjection(Axis::X, Axis::Y);
        Self {
            slots: [Some(projection), Some(projection)],
        }
    }
}

/// Immutable mapping layout, shared between every controller using it.
#[derive(Debug, Clone)]
pub struct Mapper {
    name: String,
    elements: ElementMap,
    actuators: ActuatorMap,
    capabilities: Capabilities,
}

impl Mapper {
    pub fn new(name: impl Into<String>, elements: ElementMap, actuators: ActuatorMap) -> Self {
        let capabilities = derive_capabilities(&elements, &actuators);
        Self {
            name: name.into(),
            elements,
            actuators,
            capabilities,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elements(&self) -> &ElementMap {
        &self.elements
    }

    pub fn actuators(&self) -> &ActuatorMap {
        &self.actuators
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Adds every slot's contribution for `reading` onto `state`.
    ///
    /// Stick Y values are negated first: up is positive on the physical side
    /// and negative on the virtual side.
    pub fn contribute_physical_state(
        &self,
        state: &mut AbstractState,
        reading: &PhysicalReading,
        ctx: &MapperContext<'_>,
    ) {
        for (slot, mapper) in self.elements.iter() {
            match slot {
                ElementSlot::StickLeftX => {
                    mapper.contribute_from_analog(state, i32::from(reading.thumb_lx), ctx)
                }
                ElementSlot::StickLeftY => {
                    mapper.contribute_from_analog(state, -i32::from(reading.thumb_ly), ctx)
                }
                ElementSlot::StickRightX => {
                    mapper.contribute_from_analog(state, i32::from(reading.thumb_rx), ctx)
                }
                ElementSlot::StickRightY => {
                    mapper.contribute_from_analog(state, -i32::from(reading.thumb_ry), ctx)
                }
                ElementSlot::TriggerLT => {
                    mapper.contribute_from_trigger(state, reading.left_trigger, ctx)
                }
                ElementSlot::TriggerRT => {
                    mapper.contribute_from_trigger(state, reading.right_trigger, ctx)
                }
                _ => {
                    let flag = button_flag(slot);
                    mapper.contribute_from_button(state, reading.is_pressed(flag), ctx)
                }
            }
        }
    }

    /// Maps a reading into a fresh state with every axis clamped to the analog range.
    ///
    /// Key submissions are merged across slots and reach the keyboard once
    /// per key after all slots have contributed.
    pub fn map_physical_state(
        &self,
        reading: &PhysicalReading,
        ctx: &MapperContext<'_>,
    ) -> AbstractState {
        let batch = KeyboardBatch::new(ctx.keyboard);
        let batched = MapperContext {
            controller: ctx.controller,
            keyboard: &batch,
        };
        let mut state = AbstractState::default();
        self.contribute_physical_state(&mut state, reading, &batched);
        batch.commit();
        state.clamp_axes(ANALOG_MIN, ANALOG_MAX);
        state
    }

    /// Sends a neutral contribution to every slot, releasing side effects.
    pub fn contribute_neutral(&self, ctx: &MapperContext<'_>) {
        let batch = KeyboardBatch::new(ctx.keyboard);
        let batched = MapperContext {
            controller: ctx.controller,
            keyboard: &batch,
        };
        let mut scratch = AbstractState::default();
        for (_, mapper) in self.elements.iter() {
            mapper.contribute_neutral(&mut scratch, &batched);
        }
        batch.commit();
    }
}

fn button_flag(slot: ElementSlot) -> u16 {
    match slot {
        ElementSlot::DpadUp => button_flags::DPAD_UP,
        ElementSlot::DpadDown => button_flags::DPAD_DOWN,
        ElementSlot::DpadLeft => button_flags::DPAD_LEFT,
        ElementSlot::DpadRight => button_flags::DPAD_RIGHT,
        ElementSlot::ButtonA => button_flags::A,
        ElementSlot::ButtonB => button_flags::B,
        ElementSlot::ButtonX => button_flags::X,
        ElementSlot::ButtonY => button_flags::Y,
        ElementSlot::ButtonLB => button_flags::LEFT_SHOULDER,
        ElementSlot::ButtonRB => button_flags::RIGHT_SHOULDER,
        ElementSlot::ButtonBack => button_flags::BACK,
        ElementSlot::ButtonStart => button_flags::START,
        ElementSlot::ButtonLS => button_flags::LEFT_THUMB,
        ElementSlot::ButtonRS => button_flags::RIGHT_THUMB,
        ElementSlot::StickLeftX
        | ElementSlot::StickLeftY
        | ElementSlot::StickRightX
        | ElementSlot::StickRightY
        | ElementSlot::TriggerLT
        | ElementSlot::TriggerRT => 0,
    }
}

fn derive_capabilities(elements: &ElementMap, actuators: &ActuatorMap) -> Capabilities {
    let mut capabilities = Capabilities::default();
    for (_, mapper) in elements.iter() {
        for target in mapper.target_elements() {
            match target {
                ElementIdentifier::Axis(axis) => {
                    capabilities.push_axis(axis);
                }
                ElementIdentifier::Button(button) => capabilities.include_button(button),
                ElementIdentifier::Pov => capabilities.set_pov(),
                ElementIdentifier::WholeController => {}
            }
        }
    }
    for (_, actuator) in actuators.iter() {
        for axis in actuator.axes() {
            capabilities.set_force_feedback_axis(axis);
        }
    }
    capabilities
}

/// Names of the mappers available without any configuration.
pub const BUILTIN_MAPPER_NAMES: [&str; 6] = [
    "StandardGamepad",
    "DigitalGamepad",
    "ExtendedGamepad",
    "XInputNative",
    "XInputSharedTriggers",
    "Null",
];

pub const DEFAULT_MAPPER_NAME: &str = "StandardGamepad";

fn btn(number: usize) -> ElementMapper {
    // Layout tables use 1-based button numbers.
    ElementMapper::button(Button::new(number - 1).expect("builtin button number in range"))
}

fn axis(axis: Axis) -> ElementMapper {
    ElementMapper::axis(axis, AxisDirection::Both)
}

fn with_dpad_pov(map: ElementMap) -> ElementMap {
    map.with(ElementSlot::DpadUp, ElementMapper::pov(PovDirection::Up))
        .with(ElementSlot::DpadDown, ElementMapper::pov(PovDirection::Down))
        .with(ElementSlot::DpadLeft, ElementMapper::pov(PovDirection::Left))
        .with(ElementSlot::DpadRight, ElementMapper::pov(PovDirection::Right))
}

fn with_face_buttons(map: ElementMap) -> ElementMap {
    map.with(ElementSlot::ButtonA, btn(1))
        .with(ElementSlot::ButtonB, btn(2))
        .with(ElementSlot::ButtonX, btn(3))
        .with(ElementSlot::ButtonY, btn(4))
        .with(ElementSlot::ButtonLB, btn(5))
        .with(ElementSlot::ButtonRB, btn(6))
}

/// Builds one of the [`BUILTIN_MAPPER_NAMES`] layouts.
pub fn builtin_mapper(name: &str) -> Option<Mapper> {
    let elements = match name {
        "StandardGamepad" => with_face_buttons(with_dpad_pov(ElementMap::default()))
            .with(ElementSlot::StickLeftX, axis(Axis::X))
            .with(ElementSlot::StickLeftY, axis(Axis::Y))
            .with(ElementSlot::StickRightX, axis(Axis::Z))
            .with(ElementSlot::StickRightY, axis(Axis::RotZ))
            .with(ElementSlot::TriggerLT, btn(7))
            .with(ElementSlot::TriggerRT, btn(8))
            .with(ElementSlot::ButtonBack, btn(9))
            .with(ElementSlot::ButtonStart, btn(10))
            .with(ElementSlot::ButtonLS, btn(11))
            .with(ElementSlot::ButtonRS, btn(12)),
        "DigitalGamepad" => with_face_buttons(with_dpad_pov(ElementMap::default()))
            .with(
                ElementSlot::StickLeftX,
                ElementMapper::digital_axis(Axis::X, AxisDirection::Both),
            )
            .with(
                ElementSlot::StickLeftY,
                ElementMapper::digital_axis(Axis::Y, AxisDirection::Both),
            )
            .with(
                ElementSlot::StickRightX,
                ElementMapper::digital_axis(Axis::Z, AxisDirection::Both),
            )
            .with(
                ElementSlot::StickRightY,
                ElementMapper::digital_axis(Axis::RotZ, AxisDirection::Both),
            )
            .with(ElementSlot::TriggerLT, btn(7))
            .with(ElementSlot::TriggerRT, btn(8))
            .with(ElementSlot::ButtonBack, btn(9))
            .with(ElementSlot::ButtonStart, btn(10))
            .with(ElementSlot::ButtonLS, btn(11))
            .with(ElementSlot::ButtonRS, btn(12)),
        "ExtendedGamepad" => with_face_buttons(with_dpad_pov(ElementMap::default()))
            .with(ElementSlot::StickLeftX, axis(Axis::X))
            .with(ElementSlot::StickLeftY, axis(Axis::Y))
            .with(ElementSlot::StickRightX, axis(Axis::Z))
            .with(ElementSlot::StickRightY, axis(Axis::RotZ))
            .with(ElementSlot::TriggerLT, axis(Axis::RotX))
            .with(ElementSlot::TriggerRT, axis(Axis::RotY))
            .with(ElementSlot::ButtonBack, btn(7))
            .with(ElementSlot::ButtonStart, btn(8))
            .with(ElementSlot::ButtonLS, btn(9))
            .with(ElementSlot::ButtonRS, btn(10)),
        "XInputNative" => with_face_buttons(with_dpad_pov(ElementMap::default()))
            .with(ElementSlot::StickLeftX, axis(Axis::X))
            .with(ElementSlot::StickLeftY, axis(Axis::Y))
            .with(ElementSlot::StickRightX, axis(Axis::RotX))
            .with(ElementSlot::StickRightY, axis(Axis::RotY))
            .with(ElementSlot::TriggerLT, axis(Axis::Z))
            .with(ElementSlot::TriggerRT, axis(Axis::RotZ))
            .with(ElementSlot::ButtonBack, btn(7))
            .with(ElementSlot::ButtonStart, btn(8))
            .with(ElementSlot::ButtonLS, btn(9))
            .with(ElementSlot::ButtonRS, btn(10)),
        "XInputSharedTriggers" => with_face_buttons(with_dpad_pov(ElementMap::default()))
            .with(ElementSlot::StickLeftX, axis(Axis::X))
            .with(ElementSlot::StickLeftY, axis(Axis::Y))
            .with(ElementSlot::StickRightX, axis(Axis::RotX))
            .with(ElementSlot::StickRightY, axis(Axis::RotY))
            .with(
                ElementSlot::TriggerLT,
                ElementMapper::axis(Axis::Z, AxisDirection::Positive),
            )
            .with(
                ElementSlot::TriggerRT,
                ElementMapper::axis(Axis::Z, AxisDirection::Negative),
            )
            .with(ElementSlot::ButtonBack, btn(7))
            .with(ElementSlot::ButtonStart, btn(8))
            .with(ElementSlot::ButtonLS, btn(9))
            .with(ElementSlot::ButtonRS, btn(10)),
        "Null" => {
            return Some(Mapper::new(name, ElementMap::default(), ActuatorMap::empty()));
        }
        _ => return None,
    };
    Some(Mapper::new(name, elements, ActuatorMap::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::tests::RecordingSink;
    use crate::keyboard::KeyAction;

    fn ctx(sink: &RecordingSink) -> MapperContext<'_> {
        MapperContext {
            controller: 0,
            keyboard: sink,
        }
    }

    fn max_referenced_button(mapper: &Mapper) -> Option<usize> {
        mapper
            .elements()
            .iter()
            .flat_map(|(_, m)| m.target_elements())
            .filter_map(|target| match target {
                ElementIdentifier::Button(b) => Some(b.index()),
                _ => None,
            })
            .max()
    }

    #[test]
    fn builtin_capabilities_hold_invariants() {
        for name in BUILTIN_MAPPER_NAMES {
            let mapper = builtin_mapper(name).unwrap();
            let caps = mapper.capabilities();
            let expected_buttons = max_referenced_button(&mapper).map_or(0, |max| max + 1);
            assert_eq!(caps.num_buttons(), expected_buttons, "{name}");

            let axes: Vec<Axis> = caps.axes().collect();
            assert!(axes.len() <= 6);
            let mut deduped = axes.clone();
            deduped.sort();
            deduped.dedup();
            assert_eq!(deduped.len(), axes.len(), "{name}");
        }
    }

    #[test]
    fn standard_gamepad_layout() {
        let caps = builtin_mapper("StandardGamepad").unwrap().capabilities();
        assert_eq!(
            caps.axes().collect::<Vec<_>>(),
            vec![Axis::X, Axis::Y, Axis::Z, Axis::RotZ]
        );
        assert_eq!(caps.num_buttons(), 12);
        assert!(caps.has_pov());
        assert_eq!(
            caps.force_feedback_axes().collect::<Vec<_>>(),
            vec![Axis::X, Axis::Y]
        );
    }

    #[test]
    fn null_mapper_exposes_nothing() {
        let caps = builtin_mapper("Null").unwrap().capabilities();
        assert_eq!(caps.num_axes(), 0);
        assert_eq!(caps.num_buttons(), 0);
        assert!(!caps.has_pov());
        assert!(!caps.supports_force_feedback());
        assert!(builtin_mapper("Nope").is_none());
    }

    #[test]
    fn button_gaps_are_counted() {
        let elements =
            ElementMap::default().with(ElementSlot::ButtonA, ElementMapper::button(Button::new(9).unwrap()));
        let mapper = Mapper::new("Gappy", elements, ActuatorMap::empty());
        assert_eq!(mapper.capabilities().num_buttons(), 10);
    }

    #[test]
    fn axis_order_follows_slot_order() {
        let elements = ElementMap::default()
            .with(ElementSlot::StickLeftX, axis(Axis::RotY))
            .with(ElementSlot::TriggerLT, axis(Axis::X))
            .with(ElementSlot::ButtonA, axis(Axis::RotY));
        let mapper = Mapper::new("Ordered", elements, ActuatorMap::empty());
        assert_eq!(
            mapper.capabilities().axes().collect::<Vec<_>>(),
            vec![Axis::RotY, Axis::X]
        );
    }

    #[test]
    fn maps_reading_with_inverted_y_and_pov() {
        let sink = RecordingSink::default();
        let mapper = builtin_mapper("StandardGamepad").unwrap();
        let reading = PhysicalReading {
            buttons: button_flags::A | button_flags::DPAD_UP | button_flags::DPAD_RIGHT,
            left_trigger: 200,
            thumb_lx: 1000,
            thumb_ly: -32768,
            ..Default::default()
        };
        let state = mapper.map_physical_state(&reading, &ctx(&sink));
        assert_eq!(state.axis(Axis::X), 1000);
        assert_eq!(state.axis(Axis::Y), ANALOG_MAX);
        assert!(state.button(Button::new(0).unwrap()));
        assert!(state.button(Button::new(6).unwrap()));
        assert!(!state.button(Button::new(7).unwrap()));
        assert!(state.pov.is_pressed(PovDirection::Up));
        assert!(state.pov.is_pressed(PovDirection::Right));
    }

    #[test]
    fn shared_axis_contributions_add_and_clamp() {
        let sink = RecordingSink::default();
        let mapper = builtin_mapper("XInputSharedTriggers").unwrap();
        let both = PhysicalReading {
            left_trigger: 255,
            right_trigger: 255,
            ..Default::default()
        };
        assert_eq!(mapper.map_physical_state(&both, &ctx(&sink)).axis(Axis::Z), 0);

        let elements = ElementMap::default()
            .with(ElementSlot::ButtonA, axis(Axis::X))
            .with(ElementSlot::ButtonB, axis(Axis::X));
        let doubled = Mapper::new("Doubled", elements, ActuatorMap::empty());
        let pressed = PhysicalReading {
            buttons: button_flags::A | button_flags::B,
            ..Default::default()
        };
        assert_eq!(
            doubled.map_physical_state(&pressed, &ctx(&sink)).axis(Axis::X),
            ANALOG_MAX
        );
    }

    #[test]
    fn slots_sharing_a_key_submit_it_once() {
        let sink = RecordingSink::default();
        let elements = ElementMap::default()
            .with(ElementSlot::ButtonA, ElementMapper::keyboard(0x20))
            .with(ElementSlot::ButtonB, ElementMapper::keyboard(0x20));
        let mapper = Mapper::new("Space", elements, ActuatorMap::empty());

        let a_held = PhysicalReading {
            buttons: button_flags::A,
            ..Default::default()
        };
        mapper.map_physical_state(&a_held, &ctx(&sink));
        assert_eq!(sink.take(), vec![(0, 0x20, KeyAction::Press)]);

        mapper.map_physical_state(&PhysicalReading::default(), &ctx(&sink));
        assert_eq!(sink.take(), vec![(0, 0x20, KeyAction::Release)]);

        mapper.map_physical_state(&a_held, &ctx(&sink));
        mapper.contribute_neutral(&ctx(&sink));
        assert_eq!(
            sink.take(),
            vec![(0, 0x20, KeyAction::Press), (0, 0x20, KeyAction::Release)]
        );
    }

    #[test]
    fn slot_names_resolve() {
        assert_eq!(ElementSlot::from_name("buttonlb"), Some(ElementSlot::ButtonLB));
        assert_eq!(ElementSlot::from_name("TriggerRT"), Some(ElementSlot::TriggerRT));
        assert_eq!(ActuatorSlot::from_name("RightMotor"), Some(ActuatorSlot::RightMotor));
        assert_eq!(ElementSlot::from_name("Paddle1"), None);
    }
}
