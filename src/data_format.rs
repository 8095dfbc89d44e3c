//! Application-declared binary packet layouts.
//!
//! An application describes where each element of the virtual controller
//! should appear inside a fixed-size packet. [`DataFormat::new`] validates
//! that declaration against the controller's [`Capabilities`] once, after
//! which packets are written and offsets resolved without further checks.

use crate::element::{
    AbstractState, Axis, Button, Capabilities, ElementIdentifier, PovDirection, PovState,
    AXIS_COUNT, BUTTON_COUNT,
};
use crate::error::FormatError;
use std::collections::HashMap;

pub const MAX_PACKET_SIZE: usize = 4096;

/// Wire value of a centered (or contradictory) POV hat.
pub const POV_CENTERED: u32 = 0xFFFF_FFFF;

pub const BUTTON_PRESSED: u8 = 0x80;
pub const BUTTON_RELEASED: u8 = 0x00;

const AXIS_FIELD_SIZE: usize = 4;
const POV_FIELD_SIZE: usize = 4;
const BUTTON_FIELD_SIZE: usize = 1;

/// Which element a declared field asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSelector {
    Axis(Axis),
    AnyAxis,
    Button(Button),
    AnyButton,
    /// Zero-based POV instance. Only instance 0 can ever be backed.
    Pov(usize),
    AnyPov,
}

impl ElementSelector {
    fn field_size(self) -> usize {
        match self {
            Self::Axis(_) | Self::AnyAxis => AXIS_FIELD_SIZE,
            Self::Pov(_) | Self::AnyPov => POV_FIELD_SIZE,
            Self::Button(_) | Self::AnyButton => BUTTON_FIELD_SIZE,
        }
    }

    fn is_pov(self) -> bool {
        matches!(self, Self::Pov(_) | Self::AnyPov)
    }
}

/// One field of an application's packet declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatEntry {
    pub selector: ElementSelector,
    pub offset: usize,
    /// Optional fields may name elements the controller lacks.
    pub optional: bool,
}

impl FormatEntry {
    pub fn new(selector: ElementSelector, offset: usize) -> Self {
        Self {
            selector,
            offset,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFormat {
    packet_size: usize,
    axis_offsets: [Option<usize>; AXIS_COUNT],
    button_offsets: [Option<usize>; BUTTON_COUNT],
    pov_offset: Option<usize>,
    unused_pov_offsets: Vec<usize>,
    elements_by_offset: HashMap<usize, ElementIdentifier>,
}

impl DataFormat {
    pub fn new(
        entries: &[FormatEntry],
        packet_size: usize,
        capabilities: &Capabilities,
    ) -> Result<Self, FormatError> {
        if packet_size == 0 || packet_size > MAX_PACKET_SIZE || packet_size % 4 != 0 {
            return Err(FormatError::InvalidPacketSize(packet_size));
        }

        let mut format = Self {
            packet_size,
            axis_offsets: [None; AXIS_COUNT],
            button_offsets: [None; BUTTON_COUNT],
            pov_offset: None,
            unused_pov_offsets: Vec::new(),
            elements_by_offset: HashMap::new(),
        };
        let mut occupied = vec![false; packet_size];

        for entry in entries {
            let size = entry.selector.field_size();
            if size > 1 && entry.offset % size != 0 {
                return Err(FormatError::Misaligned {
                    offset: entry.offset,
                });
            }
            let end = entry.offset.checked_add(size).filter(|end| *end <= packet_size);
            let Some(end) = end else {
                return Err(FormatError::OutOfRange {
                    offset: entry.offset,
                    size,
                    packet_size,
                });
            };
            let field = &mut occupied[entry.offset..end];
            if field.iter().any(|used| *used) {
                return Err(FormatError::OffsetCollision(entry.offset));
            }
            field.fill(true);

            match format.resolve(entry.selector, capabilities)? {
                Some(element) => format.assign(element, entry.offset),
                None if !entry.optional => {
                    return Err(FormatError::UnsupportedElement {
                        offset: entry.offset,
                    });
                }
                None if entry.selector.is_pov() => format.unused_pov_offsets.push(entry.offset),
                None => log::debug!(
                    "Skipping optional field at offset {} ({:?})",
                    entry.offset,
                    entry.selector
                ),
            }
        }

        log::debug!(
            "Data format accepted: {} bytes, {} mapped fields, {} unused POV fields",
            packet_size,
            format.elements_by_offset.len(),
            format.unused_pov_offsets.len()
        );
        Ok(format)
    }

    /// Picks the element a selector refers to, or `None` if the controller
    /// cannot back it.
    fn resolve(
        &self,
        selector: ElementSelector,
        capabilities: &Capabilities,
    ) -> Result<Option<ElementIdentifier>, FormatError> {
        let element = match selector {
            ElementSelector::Axis(axis) => capabilities
                .has_axis(axis)
                .then_some(ElementIdentifier::Axis(axis)),
            ElementSelector::AnyAxis => capabilities
                .axes()
                .find(|axis| self.axis_offsets[axis.index()].is_none())
                .map(ElementIdentifier::Axis),
            ElementSelector::Button(button) => capabilities
                .has_button(button)
                .then_some(ElementIdentifier::Button(button)),
            ElementSelector::AnyButton => Button::all()
                .take(capabilities.num_buttons())
                .find(|button| self.button_offsets[button.index()].is_none())
                .map(ElementIdentifier::Button),
            ElementSelector::Pov(instance) => {
                (instance == 0 && capabilities.has_pov()).then_some(ElementIdentifier::Pov)
            }
            ElementSelector::AnyPov => (capabilities.has_pov() && self.pov_offset.is_none())
                .then_some(ElementIdentifier::Pov),
        };

        if let Some(element) = element {
            if self.offset_for_element(element).is_some() {
                return Err(FormatError::DuplicateElement(element));
            }
        }
        Ok(element)
    }

    fn assign(&mut self, element: ElementIdentifier, offset: usize) {
        match element {
            ElementIdentifier::Axis(axis) => self.axis_offsets[axis.index()] = Some(offset),
            ElementIdentifier::Button(button) => self.button_offsets[button.index()] = Some(offset),
            ElementIdentifier::Pov => self.pov_offset = Some(offset),
            ElementIdentifier::WholeController => return,
        }
        self.elements_by_offset.insert(offset, element);
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn element_for_offset(&self, offset: usize) -> Option<ElementIdentifier> {
        self.elements_by_offset.get(&offset).copied()
    }

    pub fn offset_for_element(&self, element: ElementIdentifier) -> Option<usize> {
        match element {
            ElementIdentifier::Axis(axis) => self.axis_offsets[axis.index()],
            ElementIdentifier::Button(button) => self.button_offsets[button.index()],
            ElementIdentifier::Pov => self.pov_offset,
            ElementIdentifier::WholeController => None,
        }
    }

    pub fn unused_pov_offsets(&self) -> &[usize] {
        &self.unused_pov_offsets
    }

    /// Serializes `state` into the first `packet_size` bytes of `buffer`.
    ///
    /// Bytes not covered by a declared field are left as they were.
    pub fn write_data_packet(
        &self,
        buffer: &mut [u8],
        state: &AbstractState,
    ) -> Result<(), FormatError> {
        if buffer.len() < self.packet_size {
            return Err(FormatError::BufferTooSmall {
                required: self.packet_size,
                actual: buffer.len(),
            });
        }

        for (&offset, &element) in &self.elements_by_offset {
            let value = encode_element_value(element, state).unwrap_or_default();
            match element {
                ElementIdentifier::Button(_) => buffer[offset] = value as u8,
                _ => write_u32(buffer, offset, value),
            }
        }
        for &offset in &self.unused_pov_offsets {
            write_u32(buffer, offset, POV_CENTERED);
        }
        Ok(())
    }
}

fn write_u32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Native wire value of one element: axes as two's complement integers,
/// buttons as 0x80/0x00, POV in hundredths of degrees.
pub fn encode_element_value(element: ElementIdentifier, state: &AbstractState) -> Option<u32> {
    match element {
        ElementIdentifier::Axis(axis) => Some(state.axis(axis) as u32),
        ElementIdentifier::Button(button) => Some(u32::from(if state.button(button) {
            BUTTON_PRESSED
        } else {
            BUTTON_RELEASED
        })),
        ElementIdentifier::Pov => Some(pov_value(state.pov)),
        ElementIdentifier::WholeController => None,
    }
}

/// Hat angle in hundredths of degrees clockwise from up.
pub fn pov_value(pov: PovState) -> u32 {
    let up = pov.is_pressed(PovDirection::Up);
    let down = pov.is_pressed(PovDirection::Down);
    let left = pov.is_pressed(PovDirection::Left);
    let right = pov.is_pressed(PovDirection::Right);

    if (up && down) || (left && right) {
        return POV_CENTERED;
    }
    match (up, down, left, right) {
        (true, _, false, false) => 0,
        (true, _, false, true) => 4500,
        (false, false, false, true) => 9000,
        (_, true, false, true) => 13500,
        (_, true, false, false) => 18000,
        (_, true, true, _) => 22500,
        (false, false, true, _) => 27000,
        (true, _, true, _) => 31500,
        _ => POV_CENTERED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::builtin_mapper;

    fn standard_caps() -> Capabilities {
        builtin_mapper("StandardGamepad").unwrap().capabilities()
    }

    fn button(index: usize) -> Button {
        Button::new(index).unwrap()
    }

    #[test]
    fn writes_axis_and_button_fields() {
        let format = DataFormat::new(
            &[
                FormatEntry::new(ElementSelector::Axis(Axis::X), 0),
                FormatEntry::new(ElementSelector::Button(button(0)), 4),
            ],
            8,
            &standard_caps(),
        )
        .unwrap();

        let mut state = AbstractState::default();
        state.set_axis(Axis::X, 100);
        state.set_button(button(0), true);
        let mut packet = [0u8; 8];
        format.write_data_packet(&mut packet, &state).unwrap();
        assert_eq!(packet, [100, 0, 0, 0, 0x80, 0, 0, 0]);

        state.set_axis(Axis::X, -1);
        state.set_button(button(0), false);
        format.write_data_packet(&mut packet, &state).unwrap();
        assert_eq!(packet, [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0, 0, 0]);
    }

    #[test]
    fn untouched_bytes_are_preserved() {
        let format = DataFormat::new(
            &[FormatEntry::new(ElementSelector::Button(button(1)), 2)],
            4,
            &standard_caps(),
        )
        .unwrap();
        let mut packet = [0xAAu8; 6];
        format
            .write_data_packet(&mut packet, &AbstractState::default())
            .unwrap();
        assert_eq!(packet, [0xAA, 0xAA, 0x00, 0xAA, 0xAA, 0xAA]);
    }

    #[test]
    fn pov_angles() {
        use PovDirection::*;
        let cases: [(&[PovDirection], u32); 11] = [
            (&[], POV_CENTERED),
            (&[Up], 0),
            (&[Up, Right], 4500),
            (&[Right], 9000),
            (&[Down, Right], 13500),
            (&[Down], 18000),
            (&[Down, Left], 22500),
            (&[Left], 27000),
            (&[Up, Left], 31500),
            (&[Up, Down], POV_CENTERED),
            (&[Left, Right, Up], POV_CENTERED),
        ];
        for (directions, expected) in cases {
            assert_eq!(
                pov_value(PovState::from_directions(directions)),
                expected,
                "{directions:?}"
            );
        }
    }

    #[test]
    fn unused_pov_fields_read_centered() {
        let null_caps = builtin_mapper("Null").unwrap().capabilities();
        let format = DataFormat::new(
            &[
                FormatEntry::new(ElementSelector::Pov(0), 0).optional(),
                FormatEntry::new(ElementSelector::Axis(Axis::X), 4).optional(),
            ],
            8,
            &null_caps,
        )
        .unwrap();
        assert_eq!(format.unused_pov_offsets(), &[0]);
        assert_eq!(format.element_for_offset(0), None);
        assert_eq!(format.element_for_offset(4), None);

        let mut packet = [0u8; 8];
        format
            .write_data_packet(&mut packet, &AbstractState::default())
            .unwrap();
        assert_eq!(packet, [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
    }

    #[test]
    fn second_pov_instance_is_never_backed() {
        let caps = standard_caps();
        let entries = [
            FormatEntry::new(ElementSelector::Pov(0), 0),
            FormatEntry::new(ElementSelector::Pov(1), 4).optional(),
            FormatEntry::new(ElementSelector::AnyPov, 8).optional(),
        ];
        let format = DataFormat::new(&entries, 12, &caps).unwrap();
        assert_eq!(format.offset_for_element(ElementIdentifier::Pov), Some(0));
        assert_eq!(format.unused_pov_offsets(), &[4, 8]);

        let required = [FormatEntry::new(ElementSelector::Pov(1), 0)];
        assert_eq!(
            DataFormat::new(&required, 4, &caps).unwrap_err(),
            FormatError::UnsupportedElement { offset: 0 }
        );
    }

    #[test]
    fn any_selectors_take_next_unassigned_in_capability_order() {
        let caps = standard_caps();
        let entries = [
            FormatEntry::new(ElementSelector::Axis(Axis::Y), 0),
            FormatEntry::new(ElementSelector::AnyAxis, 4),
            FormatEntry::new(ElementSelector::AnyAxis, 8),
            FormatEntry::new(ElementSelector::Button(button(0)), 12),
            FormatEntry::new(ElementSelector::AnyButton, 13),
        ];
        let format = DataFormat::new(&entries, 16, &caps).unwrap();
        assert_eq!(format.element_for_offset(4), Some(ElementIdentifier::Axis(Axis::X)));
        assert_eq!(format.element_for_offset(8), Some(ElementIdentifier::Axis(Axis::Z)));
        assert_eq!(
            format.element_for_offset(13),
            Some(ElementIdentifier::Button(button(1)))
        );
        assert_eq!(
            format.offset_for_element(ElementIdentifier::Axis(Axis::Y)),
            Some(0)
        );
        assert_eq!(format.offset_for_element(ElementIdentifier::Axis(Axis::RotZ)), None);
    }

    #[test]
    fn rejects_bad_packet_sizes() {
        let caps = standard_caps();
        for size in [0, 6, MAX_PACKET_SIZE + 4] {
            assert_eq!(
                DataFormat::new(&[], size, &caps).unwrap_err(),
                FormatError::InvalidPacketSize(size)
            );
        }
        assert!(DataFormat::new(&[], MAX_PACKET_SIZE, &caps).is_ok());
    }

    #[test]
    fn rejects_bad_field_placement() {
        let caps = standard_caps();
        assert_eq!(
            DataFormat::new(&[FormatEntry::new(ElementSelector::Axis(Axis::X), 2)], 8, &caps)
                .unwrap_err(),
            FormatError::Misaligned { offset: 2 }
        );
        assert_eq!(
            DataFormat::new(&[FormatEntry::new(ElementSelector::Axis(Axis::X), 8)], 8, &caps)
                .unwrap_err(),
            FormatError::OutOfRange {
                offset: 8,
                size: 4,
                packet_size: 8
            }
        );
        let overlapping = [
            FormatEntry::new(ElementSelector::Axis(Axis::X), 0),
            FormatEntry::new(ElementSelector::Button(button(0)), 3),
        ];
        assert_eq!(
            DataFormat::new(&overlapping, 8, &caps).unwrap_err(),
            FormatError::OffsetCollision(3)
        );
        let duplicated = [
            FormatEntry::new(ElementSelector::Button(button(2)), 0),
            FormatEntry::new(ElementSelector::Button(button(2)), 1),
        ];
        assert_eq!(
            DataFormat::new(&duplicated, 4, &caps).unwrap_err(),
            FormatError::DuplicateElement(ElementIdentifier::Button(button(2)))
        );
    }

    #[test]
    fn unsupported_required_element_fails_but_optional_is_skipped() {
        let caps = standard_caps();
        let required = [FormatEntry::new(ElementSelector::Axis(Axis::RotX), 0)];
        assert_eq!(
            DataFormat::new(&required, 4, &caps).unwrap_err(),
            FormatError::UnsupportedElement { offset: 0 }
        );
        let optional = [FormatEntry::new(ElementSelector::Button(button(15)), 0).optional()];
        let format = DataFormat::new(&optional, 4, &caps).unwrap();
        assert_eq!(format.element_for_offset(0), None);
        assert!(format.unused_pov_offsets().is_empty());
    }

    #[test]
    fn short_buffer_is_rejected() {
        let format = DataFormat::new(&[], 8, &standard_caps()).unwrap();
        let mut packet = [0u8; 4];
        assert_eq!(
            format
                .write_data_packet(&mut packet, &AbstractState::default())
                .unwrap_err(),
            FormatError::BufferTooSmall {
                required: 8,
                actual: 4
            }
        );
    }
}
