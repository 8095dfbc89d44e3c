//! Leaf strategies that turn one physical input into virtual element contributions.
//!
//! Contributions are added onto the state they are given: integer addition
//! for axes, logical OR for buttons and POV directions. A caller mapping a
//! full reading starts from a zeroed state.

use crate::element::{
    AbstractState, Axis, AxisDirection, Button, ElementIdentifier, PovDirection, ANALOG_MAX,
    ANALOG_MIN, ANALOG_NEUTRAL, ANALOG_PRESSED_THRESHOLD, TRIGGER_MAX, TRIGGER_MID,
    TRIGGER_PRESSED_THRESHOLD,
};
use crate::keyboard::{KeyCode, KeyboardSink};
use crate::physical::ControllerId;
use std::fmt;

/// Who is contributing, for mappers with side effects.
pub struct MapperContext<'a> {
    pub controller: ControllerId,
    pub keyboard: &'a dyn KeyboardSink,
}

fn clamp_analog(value: i32) -> i32 {
    value.clamp(ANALOG_MIN, ANALOG_MAX)
}

fn analog_pressed(value: i32) -> bool {
    let value = clamp_analog(value);
    value >= ANALOG_PRESSED_THRESHOLD || value <= -ANALOG_PRESSED_THRESHOLD
}

fn trigger_pressed(value: u8) -> bool {
    value >= TRIGGER_PRESSED_THRESHOLD
}

/// Scales a trigger over the whole axis, `0 -> ANALOG_MIN`, `255 -> ANALOG_MAX`.
fn trigger_to_whole_axis(value: u8) -> i32 {
    let span = i64::from(ANALOG_MAX) - i64::from(ANALOG_MIN);
    let scaled = (i64::from(value) * span + i64::from(TRIGGER_MAX) / 2) / i64::from(TRIGGER_MAX);
    ANALOG_MIN + scaled as i32
}

/// Scales a trigger over one half of the axis, `0 -> 0`, `255 -> ANALOG_MAX`.
fn trigger_to_half_axis(value: u8) -> i32 {
    let span = i64::from(ANALOG_MAX) - i64::from(ANALOG_NEUTRAL);
    let scaled = (i64::from(value) * span + i64::from(TRIGGER_MAX) / 2) / i64::from(TRIGGER_MAX);
    scaled as i32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisMapper {
    pub axis: Axis,
    pub direction: AxisDirection,
}

impl AxisMapper {
    pub fn new(axis: Axis, direction: AxisDirection) -> Self {
        Self { axis, direction }
    }

    pub fn contribute_from_analog(&self, state: &mut AbstractState, value: i32) {
        let value = clamp_analog(value);
        let contribution = match self.direction {
            AxisDirection::Both => value,
            AxisDirection::Positive => (value - ANALOG_MIN) / 2,
            AxisDirection::Negative => (value - ANALOG_MAX) / 2,
        };
        state.add_to_axis(self.axis, contribution);
    }

    pub fn contribute_from_button(&self, state: &mut AbstractState, pressed: bool) {
        let contribution = match (self.direction, pressed) {
            (AxisDirection::Both, true) | (AxisDirection::Positive, true) => ANALOG_MAX,
            (AxisDirection::Both, false) => ANALOG_MIN,
            (AxisDirection::Negative, true) => ANALOG_MIN,
            (_, false) => ANALOG_NEUTRAL,
        };
        state.add_to_axis(self.axis, contribution);
    }

    pub fn contribute_from_trigger(&self, state: &mut AbstractState, value: u8) {
        let contribution = match self.direction {
            AxisDirection::Both => trigger_to_whole_axis(value),
            AxisDirection::Positive => trigger_to_half_axis(value),
            AxisDirection::Negative => -trigger_to_half_axis(value),
        };
        state.add_to_axis(self.axis, contribution);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonMapper {
    pub button: Button,
}

impl ButtonMapper {
    pub fn new(button: Button) -> Self {
        Self { button }
    }

    pub fn contribute_from_button(&self, state: &mut AbstractState, pressed: bool) {
        if pressed {
            state.set_button(self.button, true);
        }
    }
}

/// Like [`AxisMapper`] but only ever reports the extremes or neutral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitalAxisMapper {
    inner: AxisMapper,
}

impl DigitalAxisMapper {
    pub fn new(axis: Axis, direction: AxisDirection) -> Self {
        Self {
            inner: AxisMapper::new(axis, direction),
        }
    }

    pub fn axis(&self) -> Axis {
        self.inner.axis
    }

    pub fn direction(&self) -> AxisDirection {
        self.inner.direction
    }

    pub fn contribute_from_analog(&self, state: &mut AbstractState, value: i32) {
        let value = clamp_analog(value);
        match self.inner.direction {
            AxisDirection::Both => {
                let contribution = if value >= ANALOG_PRESSED_THRESHOLD {
                    ANALOG_MAX
                } else if value <= -ANALOG_PRESSED_THRESHOLD {
                    ANALOG_MIN
                } else {
                    ANALOG_NEUTRAL
                };
                state.add_to_axis(self.inner.axis, contribution);
            }
            _ => self.inner.contribute_from_button(state, analog_pressed(value)),
        }
    }

    pub fn contribute_from_button(&self, state: &mut AbstractState, pressed: bool) {
        self.inner.contribute_from_button(state, pressed);
    }

    pub fn contribute_from_trigger(&self, state: &mut AbstractState, value: u8) {
        self.inner.contribute_from_button(state, trigger_pressed(value));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PovMapper {
    pub direction: PovDirection,
}

impl PovMapper {
    pub fn new(direction: PovDirection) -> Self {
        Self { direction }
    }

    pub fn contribute_from_button(&self, state: &mut AbstractState, pressed: bool) {
        if pressed {
            state.pov.press(self.direction);
        }
    }
}

/// Presses a key on the virtual keyboard instead of touching the state.
///
/// Must run on every poll, including polls where a parent [`SplitMapper`]
/// routes input elsewhere, so a held key is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardMapper {
    pub key: KeyCode,
}

impl KeyboardMapper {
    pub fn new(key: KeyCode) -> Self {
        Self { key }
    }

    pub fn contribute_from_button(&self, pressed: bool, ctx: &MapperContext<'_>) {
        if pressed {
            ctx.keyboard.submit_key_pressed(ctx.controller, self.key);
        } else {
            ctx.keyboard.submit_key_released(ctx.controller, self.key);
        }
    }

    pub fn contribute_neutral(&self, ctx: &MapperContext<'_>) {
        ctx.keyboard.submit_key_released(ctx.controller, self.key);
    }
}

/// Routes input to one of two children depending on its sign or press state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMapper {
    pub positive: Option<Box<ElementMapper>>,
    pub negative: Option<Box<ElementMapper>>,
}

impl SplitMapper {
    pub fn new(positive: Option<ElementMapper>, negative: Option<ElementMapper>) -> Self {
        Self {
            positive: positive.map(Box::new),
            negative: negative.map(Box::new),
        }
    }

    fn branches(&self, take_positive: bool) -> (Option<&ElementMapper>, Option<&ElementMapper>) {
        let positive = self.positive.as_deref();
        let negative = self.negative.as_deref();
        if take_positive {
            (positive, negative)
        } else {
            (negative, positive)
        }
    }

    fn contribute_with(
        &self,
        take_positive: bool,
        state: &mut AbstractState,
        ctx: &MapperContext<'_>,
        contribute: impl FnOnce(&ElementMapper, &mut AbstractState),
    ) {
        let (active, inactive) = self.branches(take_positive);
        if let Some(active) = active {
            contribute(active, state);
        }
        if let Some(inactive) = inactive {
            inactive.contribute_neutral(state, ctx);
        }
    }
}

/// Closed set of element mapper strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementMapper {
    Axis(AxisMapper),
    Button(ButtonMapper),
    DigitalAxis(DigitalAxisMapper),
    Pov(PovMapper),
    Keyboard(KeyboardMapper),
    Split(SplitMapper),
}

impl ElementMapper {
    pub fn axis(axis: Axis, direction: AxisDirection) -> Self {
        Self::Axis(AxisMapper::new(axis, direction))
    }

    pub fn button(button: Button) -> Self {
        Self::Button(ButtonMapper::new(button))
    }

    pub fn digital_axis(axis: Axis, direction: AxisDirection) -> Self {
        Self::DigitalAxis(DigitalAxisMapper::new(axis, direction))
    }

    pub fn pov(direction: PovDirection) -> Self {
        Self::Pov(PovMapper::new(direction))
    }

    pub fn keyboard(key: KeyCode) -> Self {
        Self::Keyboard(KeyboardMapper::new(key))
    }

    pub fn split(positive: Option<ElementMapper>, negative: Option<ElementMapper>) -> Self {
        Self::Split(SplitMapper::new(positive, negative))
    }

    /// Contributes from an analog stick value, clamped to the analog range.
    pub fn contribute_from_analog(
        &self,
        state: &mut AbstractState,
        value: i32,
        ctx: &MapperContext<'_>,
    ) {
        match self {
            Self::Axis(m) => m.contribute_from_analog(state, value),
            Self::DigitalAxis(m) => m.contribute_from_analog(state, value),
            Self::Button(m) => m.contribute_from_button(state, analog_pressed(value)),
            Self::Pov(m) => m.contribute_from_button(state, analog_pressed(value)),
            Self::Keyboard(m) => m.contribute_from_button(analog_pressed(value), ctx),
            Self::Split(m) => m.contribute_with(value >= ANALOG_NEUTRAL, state, ctx, |child, state| {
                child.contribute_from_analog(state, value, ctx)
            }),
        }
    }

    pub fn contribute_from_button(
        &self,
        state: &mut AbstractState,
        pressed: bool,
        ctx: &MapperContext<'_>,
    ) {
        match self {
            Self::Axis(m) => m.contribute_from_button(state, pressed),
            Self::DigitalAxis(m) => m.contribute_from_button(state, pressed),
            Self::Button(m) => m.contribute_from_button(state, pressed),
            Self::Pov(m) => m.contribute_from_button(state, pressed),
            Self::Keyboard(m) => m.contribute_from_button(pressed, ctx),
            Self::Split(m) => m.contribute_with(pressed, state, ctx, |child, state| {
                child.contribute_from_button(state, pressed, ctx)
            }),
        }
    }

    pub fn contribute_from_trigger(
        &self,
        state: &mut AbstractState,
        value: u8,
        ctx: &MapperContext<'_>,
    ) {
        match self {
            Self::Axis(m) => m.contribute_from_trigger(state, value),
            Self::DigitalAxis(m) => m.contribute_from_trigger(state, value),
            Self::Button(m) => m.contribute_from_button(state, trigger_pressed(value)),
            Self::Pov(m) => m.contribute_from_button(state, trigger_pressed(value)),
            Self::Keyboard(m) => m.contribute_from_button(trigger_pressed(value), ctx),
            Self::Split(m) => m.contribute_with(value >= TRIGGER_MID, state, ctx, |child, state| {
                child.contribute_from_trigger(state, value, ctx)
            }),
        }
    }

    /// Contribution made while the mapper is inactive.
    ///
    /// Only has an effect for mappers with side effects.
    pub fn contribute_neutral(&self, state: &mut AbstractState, ctx: &MapperContext<'_>) {
        match self {
            Self::Keyboard(m) => m.contribute_neutral(ctx),
            Self::Split(m) => {
                for child in [&m.positive, &m.negative].into_iter().flatten() {
                    child.contribute_neutral(state, ctx);
                }
            }
            Self::Axis(_) | Self::Button(_) | Self::DigitalAxis(_) | Self::Pov(_) => {}
        }
    }

    /// Virtual elements this mapper can affect, in a stable order.
    pub fn target_elements(&self) -> Vec<ElementIdentifier> {
        match self {
            Self::Axis(m) => vec![ElementIdentifier::Axis(m.axis)],
            Self::DigitalAxis(m) => vec![ElementIdentifier::Axis(m.axis())],
            Self::Button(m) => vec![ElementIdentifier::Button(m.button)],
            Self::Pov(_) => vec![ElementIdentifier::Pov],
            Self::Keyboard(_) => Vec::new(),
            Self::Split(m) => {
                let mut targets = Vec::new();
                for child in [&m.positive, &m.negative].into_iter().flatten() {
                    for target in child.target_elements() {
                        if !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                }
                targets
            }
        }
    }

    pub fn target_element_count(&self) -> usize {
        self.target_elements().len()
    }
}

fn direction_suffix(direction: AxisDirection) -> &'static str {
    match direction {
        AxisDirection::Both => "",
        AxisDirection::Positive => ", +",
        AxisDirection::Negative => ", -",
    }
}

impl fmt::Display for ElementMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Axis(m) => write!(f, "Axis({}{})", m.axis, direction_suffix(m.direction)),
            Self::DigitalAxis(m) => write!(
                f,
                "DigitalAxis({}{})",
                m.axis(),
                direction_suffix(m.direction())
            ),
            Self::Button(m) => write!(f, "Button({})", m.button.index() + 1),
            Self::Pov(m) => write!(f, "Pov({:?})", m.direction),
            Self::Keyboard(m) => write!(f, "Keyboard({:#04x})", m.key),
            Self::Split(m) => {
                let side = |child: &Option<Box<ElementMapper>>| {
                    child
                        .as_ref()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "Null".to_string())
                };
                write!(f, "Split({}, {})", side(&m.positive), side(&m.negative))
            }
        }
    }
}
