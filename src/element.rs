//! Virtual controller elements and the abstract state they make up.
//!
//! Values follow the fixed ranges of the physical side: analog readings are
//! `-32767..=32767` with neutral `0`, triggers are `0..=255`.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const ANALOG_MIN: i32 = -32767;
pub const ANALOG_MAX: i32 = 32767;
pub const ANALOG_NEUTRAL: i32 = 0;

pub const TRIGGER_MIN: u8 = 0;
pub const TRIGGER_MAX: u8 = 255;
pub const TRIGGER_MID: u8 = 128;

/// Analog displacement at or beyond which an analog source counts as pressed.
pub const ANALOG_PRESSED_THRESHOLD: i32 = 8192;
/// Trigger value at or beyond which a trigger counts as pressed.
pub const TRIGGER_PRESSED_THRESHOLD: u8 = 32;

pub const AXIS_COUNT: usize = 6;
pub const BUTTON_COUNT: usize = 16;
pub const POV_DIRECTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    RotX,
    RotY,
    RotZ,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::RotX,
        Axis::RotY,
        Axis::RotZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::RotX => "RotX",
            Axis::RotY => "RotY",
            Axis::RotZ => "RotZ",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|axis| axis.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which part of an axis a mapper drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AxisDirection {
    #[default]
    Both,
    Positive,
    Negative,
}

/// Zero-based button index, `0..16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Button(u8);

impl Button {
    pub fn new(index: usize) -> Option<Self> {
        (index < BUTTON_COUNT).then_some(Self(index as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Button> {
        (0..BUTTON_COUNT as u8).map(Button)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PovDirection {
    Up,
    Down,
    Left,
    Right,
}

impl PovDirection {
    pub const ALL: [PovDirection; POV_DIRECTION_COUNT] = [
        PovDirection::Up,
        PovDirection::Down,
        PovDirection::Left,
        PovDirection::Right,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|dir| format!("{dir:?}").eq_ignore_ascii_case(name))
    }
}

/// Identifies one element of a virtual controller, or the controller as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementIdentifier {
    Axis(Axis),
    Button(Button),
    Pov,
    WholeController,
}

/// Point-of-view hat reading held as four direction flags.
///
/// The packed aggregate stores one bit per direction in `PovDirection` order,
/// so two readings are equal exactly when their flags are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PovState {
    bits: u8,
}

impl PovState {
    pub fn from_directions(directions: &[PovDirection]) -> Self {
        let mut pov = Self::default();
        for direction in directions {
            pov.press(*direction);
        }
        pov
    }

    pub fn is_pressed(&self, direction: PovDirection) -> bool {
        self.bits & direction.bit() != 0
    }

    /// Directions are OR-ed in and never cleared by a contribution.
    pub fn press(&mut self, direction: PovDirection) {
        self.bits |= direction.bit();
    }

    pub fn packed(&self) -> u32 {
        u32::from(self.bits)
    }

    pub fn is_neutral(&self) -> bool {
        self.bits == 0
    }
}

/// Abstract virtual controller state produced fresh for every poll.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbstractState {
    axes: [i32; AXIS_COUNT],
    buttons: u16,
    pub pov: PovState,
}

impl AbstractState {
    pub fn axis(&self, axis: Axis) -> i32 {
        self.axes[axis.index()]
    }

    pub fn set_axis(&mut self, axis: Axis, value: i32) {
        self.axes[axis.index()] = value;
    }

    /// Adds a contribution onto an axis. Sums may leave the analog range
    /// until [`clamp_axes`](Self::clamp_axes) runs.
    pub fn add_to_axis(&mut self, axis: Axis, contribution: i32) {
        let value = &mut self.axes[axis.index()];
        *value = value.saturating_add(contribution);
    }

    pub fn clamp_axes(&mut self, min: i32, max: i32) {
        for value in self.axes.iter_mut() {
            *value = (*value).clamp(min, max);
        }
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons & (1 << button.index()) != 0
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.buttons |= 1 << button.index();
        } else {
            self.buttons &= !(1 << button.index());
        }
    }

    /// Raw button bit vector, bit `n` is button `n`.
    pub fn button_bits(&self) -> u16 {
        self.buttons
    }
}

impl PartialEq for AbstractState {
    fn eq(&self, other: &Self) -> bool {
        self.axes == other.axes && self.buttons == other.buttons && self.pov == other.pov
    }
}

impl Eq for AbstractState {}

/// What a mapper exposes to applications.
///
/// `axes` is ordered by first appearance and its position defines the
/// caller-visible axis index. At most six axes and sixteen buttons.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    axes: [Option<Axis>; AXIS_COUNT],
    num_axes: u8,
    num_buttons: u8,
    has_pov: bool,
    ff_axes: u8,
}

impl Capabilities {
    /// Adds an axis unless already present. Returns false if it was present.
    pub(crate) fn push_axis(&mut self, axis: Axis) -> bool {
        if self.has_axis(axis) {
            return false;
        }
        self.axes[self.num_axes as usize] = Some(axis);
        self.num_axes += 1;
        true
    }

    pub(crate) fn include_button(&mut self, button: Button) {
        self.num_buttons = self.num_buttons.max(button.index() as u8 + 1);
    }

    pub(crate) fn set_pov(&mut self) {
        self.has_pov = true;
    }

    pub(crate) fn set_force_feedback_axis(&mut self, axis: Axis) {
        if self.has_axis(axis) {
            self.ff_axes |= 1 << axis.index();
        }
    }

    pub fn axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.axes[..self.num_axes as usize].iter().flatten().copied()
    }

    pub fn num_axes(&self) -> usize {
        self.num_axes as usize
    }

    pub fn axis_at(&self, index: usize) -> Option<Axis> {
        if index < self.num_axes() {
            self.axes[index]
        } else {
            None
        }
    }

    pub fn index_of_axis(&self, axis: Axis) -> Option<usize> {
        self.axes().position(|a| a == axis)
    }

    pub fn has_axis(&self, axis: Axis) -> bool {
        self.index_of_axis(axis).is_some()
    }

    pub fn num_buttons(&self) -> usize {
        self.num_buttons as usize
    }

    pub fn has_button(&self, button: Button) -> bool {
        button.index() < self.num_buttons()
    }

    pub fn has_pov(&self) -> bool {
        self.has_pov
    }

    pub fn has_element(&self, element: ElementIdentifier) -> bool {
        match element {
            ElementIdentifier::Axis(axis) => self.has_axis(axis),
            ElementIdentifier::Button(button) => self.has_button(button),
            ElementIdentifier::Pov => self.has_pov,
            ElementIdentifier::WholeController => true,
        }
    }

    pub fn force_feedback_axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.axes().filter(|axis| self.ff_axes & (1 << axis.index()) != 0)
    }

    pub fn supports_force_feedback(&self) -> bool {
        self.ff_axes != 0
    }

    /// Portable packed form.
    ///
    /// Bits 0-2 axis count, 3-7 button count, 8 POV present, then three bits
    /// per exposed axis starting at bit 9 in visible order.
    pub fn packed(&self) -> u32 {
        let mut bits = u32::from(self.num_axes) & 0b111;
        bits |= (u32::from(self.num_buttons) & 0b1_1111) << 3;
        bits |= u32::from(self.has_pov) << 8;
        for (position, axis) in self.axes().enumerate() {
            bits |= (axis.index() as u32 & 0b111) << (9 + 3 * position);
        }
        bits
    }
}

impl PartialEq for Capabilities {
    fn eq(&self, other: &Self) -> bool {
        self.axes().eq(other.axes())
            && self.num_buttons == other.num_buttons
            && self.has_pov == other.has_pov
            && self.ff_axes == other.ff_axes
    }
}

impl Eq for Capabilities {}
