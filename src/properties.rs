//! Per-axis analog transform and device-wide properties.

use crate::element::{ANALOG_MAX, ANALOG_MIN};
use crate::error::PropertyError;

/// Percentages are expressed in hundredths of a percent.
pub const PERCENT_MAX: u32 = 10000;

pub const DEFAULT_DEADZONE: u32 = 0;
pub const DEFAULT_SATURATION: u32 = PERCENT_MAX;
pub const DEFAULT_FORCE_FEEDBACK_GAIN: u32 = PERCENT_MAX;

fn cutoff(percent: u32) -> i64 {
    i64::from(ANALOG_MAX) * i64::from(percent) / i64::from(PERCENT_MAX)
}

/// Deadzone, saturation and output range for one axis.
///
/// Cutoffs are kept precomputed since the transform runs on every refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisProperties {
    deadzone: u32,
    saturation: u32,
    range_min: i32,
    range_max: i32,
    deadzone_cutoff: i64,
    saturation_cutoff: i64,
}

impl Default for AxisProperties {
    fn default() -> Self {
        Self {
            deadzone: DEFAULT_DEADZONE,
            saturation: DEFAULT_SATURATION,
            range_min: ANALOG_MIN,
            range_max: ANALOG_MAX,
            deadzone_cutoff: cutoff(DEFAULT_DEADZONE),
            saturation_cutoff: cutoff(DEFAULT_SATURATION),
        }
    }
}

impl AxisProperties {
    pub fn deadzone(&self) -> u32 {
        self.deadzone
    }

    pub fn saturation(&self) -> u32 {
        self.saturation
    }

    pub fn range(&self) -> (i32, i32) {
        (self.range_min, self.range_max)
    }

    pub fn range_neutral(&self) -> i32 {
        ((i64::from(self.range_min) + i64::from(self.range_max)) / 2) as i32
    }

    pub fn set_deadzone(&mut self, deadzone: u32) -> Result<(), PropertyError> {
        if deadzone > PERCENT_MAX {
            return Err(PropertyError::Deadzone(deadzone));
        }
        self.deadzone = deadzone;
        self.deadzone_cutoff = cutoff(deadzone);
        Ok(())
    }

    pub fn set_saturation(&mut self, saturation: u32) -> Result<(), PropertyError> {
        if saturation > PERCENT_MAX {
            return Err(PropertyError::Saturation(saturation));
        }
        self.saturation = saturation;
        self.saturation_cutoff = cutoff(saturation);
        Ok(())
    }

    pub fn set_range(&mut self, min: i32, max: i32) -> Result<(), PropertyError> {
        if min >= max {
            return Err(PropertyError::Range { min, max });
        }
        self.range_min = min;
        self.range_max = max;
        Ok(())
    }

    /// Applies deadzone, saturation and range to a raw analog value.
    pub fn transform(&self, raw: i32) -> i32 {
        let raw = i64::from(raw.clamp(ANALOG_MIN, ANALOG_MAX));
        let magnitude = raw.abs();
        let neutral = i64::from(self.range_neutral());
        let extreme = if raw >= 0 {
            i64::from(self.range_max)
        } else {
            i64::from(self.range_min)
        };

        if magnitude <= self.deadzone_cutoff {
            return neutral as i32;
        }
        if magnitude >= self.saturation_cutoff {
            return extreme as i32;
        }

        let span = self.saturation_cutoff - self.deadzone_cutoff;
        let scaled = (magnitude - self.deadzone_cutoff) * (extreme - neutral) / span;
        (neutral + scaled) as i32
    }
}

/// Properties that apply to the controller as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProperties {
    force_feedback_gain: u32,
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            force_feedback_gain: DEFAULT_FORCE_FEEDBACK_GAIN,
        }
    }
}

impl DeviceProperties {
    pub fn force_feedback_gain(&self) -> u32 {
        self.force_feedback_gain
    }

    pub fn set_force_feedback_gain(&mut self, gain: u32) -> Result<(), PropertyError> {
        if gain > PERCENT_MAX {
            return Err(PropertyError::ForceFeedbackGain(gain));
        }
        self.force_feedback_gain = gain;
        Ok(())
    }
}
