use crate::element::Axis;
use crate::error::{PadBridgeError, Result};
use crate::event_buffer::EVENT_BUFFER_CAPACITY_MAX;
use crate::mapper::DEFAULT_MAPPER_NAME;
use crate::mapper_builder::{MapperBuilder, MapperRegistry};
use crate::physical::ControllerId;
use crate::properties::{DEFAULT_DEADZONE, DEFAULT_FORCE_FEEDBACK_GAIN, DEFAULT_SATURATION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable that points at an alternative config file.
pub const CONFIG_ENV_VAR: &str = "PADBRIDGE_CONFIG";

fn default_mapper() -> String {
    DEFAULT_MAPPER_NAME.to_string()
}

fn default_saturation() -> u32 {
    DEFAULT_SATURATION
}

fn default_gain() -> u32 {
    DEFAULT_FORCE_FEEDBACK_GAIN
}

fn default_poll_interval() -> u64 {
    5
}

/// Analog properties applied to one axis of every controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AxisSettings {
    #[serde(default)]
    pub deadzone: u32,
    #[serde(default = "default_saturation")]
    pub saturation: u32,
    /// Output range as `[min, max]`. Unset keeps the full analog range.
    #[serde(default)]
    pub range: Option<(i32, i32)>,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            deadzone: DEFAULT_DEADZONE,
            saturation: DEFAULT_SATURATION,
            range: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Mapper used by slots without an entry in `slot_mappers`.
    #[serde(default = "default_mapper")]
    pub default_mapper: String,
    #[serde(default)]
    pub slot_mappers: BTreeMap<ControllerId, String>,
    #[serde(default)]
    pub event_buffer_capacity: usize,
    /// Keyed by axis name (`X`, `RotY`, ...).
    #[serde(default)]
    pub axes: BTreeMap<String, AxisSettings>,
    #[serde(default = "default_gain")]
    pub force_feedback_gain: u32,
    /// How often the physical backend polls for new readings.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_mapper: default_mapper(),
            slot_mappers: BTreeMap::new(),
            event_buffer_capacity: 0,
            axes: BTreeMap::new(),
            force_feedback_gain: DEFAULT_FORCE_FEEDBACK_GAIN,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// A mapper defined in the config file.
///
/// Slot values are element mapper text such as `"Axis(RotX, +)"`; `null`
/// removes whatever the template assigned to that slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomMapper {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub elements: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub force_feedback: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub custom_mappers: BTreeMap<String, CustomMapper>,
}

impl AppConfig {
    fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::config_dir()
            .ok_or_else(|| PadBridgeError::Config("Cannot find config directory".into()))?
            .join("padbridge");
        Ok(dir.join("config.json"))
    }

    /// Loads the config file, falling back to defaults when it is absent.
    /// The file is never written.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        log::info!(
            "Loaded config from {} ({} custom mappers)",
            path.display(),
            config.custom_mappers.len()
        );
        Ok(config)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let settings = &self.settings;
        if settings.event_buffer_capacity > EVENT_BUFFER_CAPACITY_MAX {
            return Err(PadBridgeError::Config(format!(
                "event_buffer_capacity {} exceeds {}",
                settings.event_buffer_capacity, EVENT_BUFFER_CAPACITY_MAX
            )));
        }
        if settings.poll_interval_ms == 0 {
            return Err(PadBridgeError::Config("poll_interval_ms must be positive".into()));
        }
        if let Some(name) = settings.axes.keys().find(|name| Axis::from_name(name).is_none()) {
            return Err(PadBridgeError::Config(format!("Unknown axis in settings: {}", name)));
        }
        Ok(())
    }

    pub fn mapper_for_slot(&self, id: ControllerId) -> &str {
        self.settings
            .slot_mappers
            .get(&id)
            .map(String::as_str)
            .unwrap_or(&self.settings.default_mapper)
    }

    /// Per-axis settings resolved against [`Axis`] identifiers.
    pub fn axis_settings(&self) -> impl Iterator<Item = (Axis, &AxisSettings)> {
        self.settings
            .axes
            .iter()
            .filter_map(|(name, settings)| Axis::from_name(name).map(|axis| (axis, settings)))
    }

    /// Builds every custom mapper on top of the built-in ones.
    ///
    /// Errors stay confined to the mapper they occur in: it is logged and
    /// left out of the registry while the others still build.
    pub fn build_registry(&self) -> MapperRegistry {
        let mut registry = MapperRegistry::with_builtins();
        let mut builder = MapperBuilder::new();

        for (name, custom) in &self.custom_mappers {
            if let Err(e) = builder.create_blueprint(name, &registry) {
                log::warn!("Ignoring custom mapper {}: {}", name, e);
                continue;
            }
            if let Some(template) = &custom.template {
                // The blueprint was just created, so this cannot fail.
                let _ = builder.set_template(name, template);
            }
            for (slot, text) in &custom.elements {
                let _ = builder.set_element_from_text(name, slot, text.as_deref());
            }
            for (slot, text) in &custom.force_feedback {
                let _ = builder.set_actuator_from_text(name, slot, text.as_deref());
            }
        }

        if let Err(e) = builder.build_all(&mut registry) {
            log::warn!("{}", e);
        }
        registry
    }
}
