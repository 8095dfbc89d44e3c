//! Per-slot virtual controller.
//!
//! Owns the mapper reference, analog properties, the latest transformed
//! state and the buffered state-change events for one physical slot. All
//! fields sit behind one recursive lock so a caller can hold [`lock`] across
//! several reads while the controller's own methods still work underneath.
//!
//! [`lock`]: VirtualController::lock

use crate::data_format::encode_element_value;
use crate::element::{AbstractState, Axis, Button, Capabilities, ElementIdentifier, AXIS_COUNT};
use crate::element_mapper::MapperContext;
use crate::error::PropertyError;
use crate::event_buffer::{EventBuffer, EventRecord};
use crate::keyboard::KeyboardSink;
use crate::mapper::Mapper;
use crate::physical::{ControllerId, PhysicalController, PhysicalState};
use crate::properties::{AxisProperties, DeviceProperties};
use crate::sync::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

const POV_FILTER_BIT: u32 = 1 << (AXIS_COUNT + 16);
const ALL_ELEMENTS_FILTER: u32 = (POV_FILTER_BIT << 1) - 1;

/// Which elements produce buffered events. Everything passes by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EventFilter {
    allowed: u32,
}

impl EventFilter {
    fn bits(element: ElementIdentifier) -> u32 {
        match element {
            ElementIdentifier::Axis(axis) => 1 << axis.index(),
            ElementIdentifier::Button(button) => 1 << (AXIS_COUNT + button.index()),
            ElementIdentifier::Pov => POV_FILTER_BIT,
            ElementIdentifier::WholeController => ALL_ELEMENTS_FILTER,
        }
    }

    fn allows(&self, element: ElementIdentifier) -> bool {
        let bits = Self::bits(element);
        self.allowed & bits == bits
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            allowed: ALL_ELEMENTS_FILTER,
        }
    }
}

struct Inner {
    axis_properties: [AxisProperties; AXIS_COUNT],
    device_properties: DeviceProperties,
    last_physical: Option<PhysicalState>,
    raw_state: AbstractState,
    state: AbstractState,
    events: EventBuffer,
    filter: EventFilter,
}

impl Inner {
    fn reapply_properties(&mut self) {
        self.state = transform_state(&self.raw_state, &self.axis_properties);
    }
}

fn transform_state(raw: &AbstractState, properties: &[AxisProperties; AXIS_COUNT]) -> AbstractState {
    let mut state = *raw;
    for axis in Axis::ALL {
        state.set_axis(axis, properties[axis.index()].transform(raw.axis(axis)));
    }
    state
}

pub struct VirtualController {
    id: ControllerId,
    mapper: Arc<Mapper>,
    physical: Arc<dyn PhysicalController>,
    keyboard: Arc<dyn KeyboardSink>,
    created: Instant,
    inner: ReentrantMutex<RefCell<Inner>>,
}

impl VirtualController {
    pub fn new(
        id: ControllerId,
        mapper: Arc<Mapper>,
        physical: Arc<dyn PhysicalController>,
        keyboard: Arc<dyn KeyboardSink>,
    ) -> Self {
        let axis_properties = [AxisProperties::default(); AXIS_COUNT];
        let raw_state = AbstractState::default();
        let inner = Inner {
            state: transform_state(&raw_state, &axis_properties),
            axis_properties,
            device_properties: DeviceProperties::default(),
            last_physical: None,
            raw_state,
            events: EventBuffer::default(),
            filter: EventFilter::default(),
        };
        log::info!("Virtual controller {} using mapper {}", id, mapper.name());
        Self {
            id,
            mapper,
            physical,
            keyboard,
            created: Instant::now(),
            inner: ReentrantMutex::new(RefCell::new(inner)),
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    pub fn capabilities(&self) -> Capabilities {
        self.mapper.capabilities()
    }

    /// Takes the controller lock for a consistent multi-field view.
    pub fn lock(&self) -> ControllerGuard<'_> {
        ControllerGuard {
            guard: self.inner.lock(),
        }
    }

    /// Pulls the latest physical reading and updates state and events.
    ///
    /// Returns true only if a new, successfully read reading was applied.
    pub fn refresh_state(&self) -> bool {
        let guard = self.inner.lock();
        let current = self.physical.current_state(self.id);

        {
            let mut inner = guard.borrow_mut();
            if inner
                .last_physical
                .is_some_and(|last| last.same_reading(&current))
            {
                return false;
            }
            inner.last_physical = Some(current);
        }

        let ctx = MapperContext {
            controller: self.id,
            keyboard: self.keyboard.as_ref(),
        };
        if !current.is_connected() {
            log::trace!(
                "Controller {} read failed with error {}",
                self.id,
                current.error_code
            );
            // State and events keep the last good reading; held keys do not.
            self.mapper.contribute_neutral(&ctx);
            return false;
        }

        let raw = self.mapper.map_physical_state(&current.reading, &ctx);

        let mut inner = guard.borrow_mut();
        let previous = inner.state;
        inner.raw_state = raw;
        inner.reapply_properties();
        let updated = inner.state;

        let timestamp_ms = self.created.elapsed().as_millis() as u64;
        let capabilities = self.mapper.capabilities();
        let changed = capabilities
            .axes()
            .map(ElementIdentifier::Axis)
            .chain(
                Button::all()
                    .take(capabilities.num_buttons())
                    .map(ElementIdentifier::Button),
            )
            .chain(capabilities.has_pov().then_some(ElementIdentifier::Pov));

        for element in changed {
            let before = encode_element_value(element, &previous);
            let after = encode_element_value(element, &updated);
            if before == after || !inner.filter.allows(element) {
                continue;
            }
            if let Some(value) = after {
                inner.events.push(element, value, timestamp_ms);
            }
        }
        log::trace!("Controller {} packet {}", self.id, current.packet_number);
        true
    }

    pub fn state(&self) -> AbstractState {
        self.inner.lock().borrow().state
    }

    pub fn axis_properties(&self, axis: Axis) -> AxisProperties {
        self.inner.lock().borrow().axis_properties[axis.index()]
    }

    fn update_axis(
        &self,
        axis: Axis,
        update: impl FnOnce(&mut AxisProperties) -> Result<(), PropertyError>,
    ) -> Result<(), PropertyError> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        update(&mut inner.axis_properties[axis.index()])?;
        inner.reapply_properties();
        Ok(())
    }

    pub fn set_deadzone(&self, axis: Axis, deadzone: u32) -> Result<(), PropertyError> {
        self.update_axis(axis, |props| props.set_deadzone(deadzone))
    }

    pub fn set_saturation(&self, axis: Axis, saturation: u32) -> Result<(), PropertyError> {
        self.update_axis(axis, |props| props.set_saturation(saturation))
    }

    pub fn set_range(&self, axis: Axis, min: i32, max: i32) -> Result<(), PropertyError> {
        self.update_axis(axis, |props| props.set_range(min, max))
    }

    pub fn force_feedback_gain(&self) -> u32 {
        self.inner.lock().borrow().device_properties.force_feedback_gain()
    }

    pub fn set_force_feedback_gain(&self, gain: u32) -> Result<(), PropertyError> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.device_properties.set_force_feedback_gain(gain)
    }

    pub fn event_buffer_capacity(&self) -> usize {
        self.inner.lock().borrow().events.capacity()
    }

    pub fn set_event_buffer_capacity(&self, capacity: usize) -> Result<(), PropertyError> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.events.set_capacity(capacity)
    }

    pub fn pop_oldest_events(&self, count: usize) -> Vec<EventRecord> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.events.pop_oldest(count)
    }

    /// Lets events for `element` through. `WholeController` allows everything.
    pub fn event_filter_add(&self, element: ElementIdentifier) {
        let guard = self.inner.lock();
        guard.borrow_mut().filter.allowed |= EventFilter::bits(element);
    }

    /// Stops events for `element`. `WholeController` blocks everything.
    pub fn event_filter_remove(&self, element: ElementIdentifier) {
        let guard = self.inner.lock();
        guard.borrow_mut().filter.allowed &= !EventFilter::bits(element);
    }

    pub fn event_filter_allows(&self, element: ElementIdentifier) -> bool {
        self.inner.lock().borrow().filter.allows(element)
    }
}

impl Drop for VirtualController {
    fn drop(&mut self) {
        // Release any keys still held on behalf of this controller.
        let ctx = MapperContext {
            controller: self.id,
            keyboard: self.keyboard.as_ref(),
        };
        self.mapper.contribute_neutral(&ctx);
    }
}

/// Scoped view of a locked controller.
///
/// Other threads block on the controller until the guard is dropped; the
/// holding thread may keep calling controller methods.
pub struct ControllerGuard<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<Inner>>,
}

impl ControllerGuard<'_> {
    pub fn state(&self) -> AbstractState {
        self.guard.borrow().state
    }

    pub fn event_count(&self) -> usize {
        self.guard.borrow().events.len()
    }

    pub fn event(&self, index: usize) -> Option<EventRecord> {
        self.guard.borrow().events.get(index)
    }

    pub fn is_event_buffer_overflowed(&self) -> bool {
        self.guard.borrow().events.is_overflowed()
    }

    pub fn pop_oldest_events(&self, count: usize) -> Vec<EventRecord> {
        self.guard.borrow_mut().events.pop_oldest(count)
    }
}
