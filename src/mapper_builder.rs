//! Assembles mappers from named blueprints.
//!
//! A blueprint names an optional template (a registered mapper or another
//! blueprint) and a sparse set of per-slot overrides. Building resolves the
//! template first, copies its maps, applies the overrides and registers the
//! result. Each blueprint is attempted at most once; reaching a blueprint
//! that is still in progress means its template chain loops.

use crate::element_mapper::ElementMapper;
use crate::error::{BuildError, ParseError};
use crate::mapper::{
    builtin_mapper, ActuatorMap, ActuatorSlot, ElementMap, ElementSlot, ForceFeedbackActuator,
    Mapper, BUILTIN_MAPPER_NAMES,
};
use crate::mapper_parser::{parse_actuator, parse_element_mapper};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Named, immutable mappers available to virtual controllers.
///
/// Filled once while configuration loads, then shared read-only.
#[derive(Debug, Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, Arc<Mapper>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in layout.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for mapper in BUILTIN_MAPPER_NAMES.iter().filter_map(|name| builtin_mapper(name)) {
            registry
                .mappers
                .insert(mapper.name().to_string(), Arc::new(mapper));
        }
        registry
    }

    pub fn register(&mut self, mapper: Mapper) -> Result<Arc<Mapper>, BuildError> {
        if self.mappers.contains_key(mapper.name()) {
            return Err(BuildError::DuplicateName(mapper.name().to_string()));
        }
        let mapper = Arc::new(mapper);
        self.mappers
            .insert(mapper.name().to_string(), mapper.clone());
        Ok(mapper)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mapper>> {
        self.mappers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mappers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mappers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Unbuilt,
    InProgress,
    Built,
    Failed,
}

/// Mutable description of a mapper, consumed by [`MapperBuilder::build`].
#[derive(Debug, Clone)]
pub struct Blueprint {
    template: Option<String>,
    elements: BTreeMap<ElementSlot, Option<ElementMapper>>,
    actuators: BTreeMap<ActuatorSlot, Option<ForceFeedbackActuator>>,
    state: BuildState,
    build_permitted: bool,
}

impl Blueprint {
    fn new() -> Self {
        Self {
            template: None,
            elements: BTreeMap::new(),
            actuators: BTreeMap::new(),
            state: BuildState::Unbuilt,
            build_permitted: true,
        }
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn is_build_permitted(&self) -> bool {
        self.build_permitted
    }
}

#[derive(Debug, Default)]
pub struct MapperBuilder {
    blueprints: BTreeMap<String, Blueprint>,
}

impl MapperBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blueprint(&self, name: &str) -> Option<&Blueprint> {
        self.blueprints.get(name)
    }

    pub fn create_blueprint(&mut self, name: &str, registry: &MapperRegistry) -> Result<(), BuildError> {
        if registry.contains(name) || self.blueprints.contains_key(name) {
            return Err(BuildError::DuplicateName(name.to_string()));
        }
        self.blueprints.insert(name.to_string(), Blueprint::new());
        Ok(())
    }

    fn editable(&mut self, name: &str) -> Result<&mut Blueprint, BuildError> {
        let blueprint = self
            .blueprints
            .get_mut(name)
            .ok_or_else(|| BuildError::UnknownBlueprint(name.to_string()))?;
        if blueprint.state != BuildState::Unbuilt {
            return Err(BuildError::AlreadyBuilt(name.to_string()));
        }
        Ok(blueprint)
    }

    pub fn set_template(&mut self, name: &str, template: &str) -> Result<(), BuildError> {
        self.editable(name)?.template = Some(template.to_string());
        Ok(())
    }

    /// Overrides one slot. `None` removes whatever the template put there.
    pub fn set_element(
        &mut self,
        name: &str,
        slot: ElementSlot,
        mapper: Option<ElementMapper>,
    ) -> Result<(), BuildError> {
        self.editable(name)?.elements.insert(slot, mapper);
        Ok(())
    }

    pub fn set_actuator(
        &mut self,
        name: &str,
        slot: ActuatorSlot,
        actuator: Option<ForceFeedbackActuator>,
    ) -> Result<(), BuildError> {
        self.editable(name)?.actuators.insert(slot, actuator);
        Ok(())
    }

    /// Overrides a slot from its textual form. `None` text removes the slot.
    ///
    /// A parse error poisons the blueprint so it can never build.
    pub fn set_element_from_text(
        &mut self,
        name: &str,
        slot_name: &str,
        text: Option<&str>,
    ) -> Result<(), BuildError> {
        self.editable(name)?;
        let parsed = ElementSlot::from_name(slot_name)
            .ok_or_else(|| ParseError::UnknownSlot(slot_name.to_string()))
            .and_then(|slot| {
                let mapper = text.map(parse_element_mapper).transpose()?.flatten();
                Ok((slot, mapper))
            });
        match parsed {
            Ok((slot, mapper)) => self.set_element(name, slot, mapper),
            Err(e) => Err(self.poison(name, e)),
        }
    }

    pub fn set_actuator_from_text(
        &mut self,
        name: &str,
        slot_name: &str,
        text: Option<&str>,
    ) -> Result<(), BuildError> {
        self.editable(name)?;
        let parsed = ActuatorSlot::from_name(slot_name)
            .ok_or_else(|| ParseError::UnknownActuator(slot_name.to_string()))
            .and_then(|slot| {
                let actuator = text.map(parse_actuator).transpose()?.flatten();
                Ok((slot, actuator))
            });
        match parsed {
            Ok((slot, actuator)) => self.set_actuator(name, slot, actuator),
            Err(e) => Err(self.poison(name, e)),
        }
    }

    fn poison(&mut self, name: &str, error: ParseError) -> BuildError {
        log::warn!("Mapper {}: {}", name, error);
        if let Some(blueprint) = self.blueprints.get_mut(name) {
            blueprint.build_permitted = false;
        }
        BuildError::Parse(error)
    }

    /// Builds one blueprint (and any blueprint templates it depends on).
    pub fn build(
        &mut self,
        name: &str,
        registry: &mut MapperRegistry,
    ) -> Result<Arc<Mapper>, BuildError> {
        let blueprint = self
            .blueprints
            .get_mut(name)
            .ok_or_else(|| BuildError::UnknownBlueprint(name.to_string()))?;

        // Any earlier attempt, finished or not, means the chain came back here.
        if blueprint.state != BuildState::Unbuilt {
            return Err(BuildError::CircularDependency(name.to_string()));
        }

        if !blueprint.build_permitted {
            blueprint.state = BuildState::Failed;
            log::error!("Mapper {} cannot be built due to configuration errors", name);
            return Err(BuildError::Poisoned(name.to_string()));
        }

        blueprint.state = BuildState::InProgress;
        let template = blueprint.template.clone();
        let result = self.construct(name, template.as_deref(), registry);

        if let Some(blueprint) = self.blueprints.get_mut(name) {
            blueprint.state = if result.is_ok() {
                BuildState::Built
            } else {
                BuildState::Failed
            };
        }
        match &result {
            Ok(mapper) => log::info!(
                "Built mapper {} ({} axes, {} buttons, POV {})",
                name,
                mapper.capabilities().num_axes(),
                mapper.capabilities().num_buttons(),
                mapper.capabilities().has_pov()
            ),
            Err(e) => log::error!("Failed to build mapper {}: {}", name, e),
        }
        result
    }

    fn construct(
        &mut self,
        name: &str,
        template: Option<&str>,
        registry: &mut MapperRegistry,
    ) -> Result<Arc<Mapper>, BuildError> {
        let (mut elements, mut actuators) = match template {
            Some(template) => {
                let base = match registry.get(template) {
                    Some(mapper) => mapper,
                    None if self.blueprints.contains_key(template) => {
                        self.build(template, registry)?
                    }
                    None => {
                        return Err(BuildError::UnknownTemplate {
                            blueprint: name.to_string(),
                            template: template.to_string(),
                        })
                    }
                };
                (base.elements().clone(), *base.actuators())
            }
            None => (ElementMap::default(), ActuatorMap::default()),
        };

        let blueprint = self
            .blueprints
            .get(name)
            .ok_or_else(|| BuildError::UnknownBlueprint(name.to_string()))?;
        for (slot, mapper) in &blueprint.elements {
            elements.set(*slot, mapper.clone());
        }
        for (slot, actuator) in &blueprint.actuators {
            actuators.set(*slot, *actuator);
        }

        registry.register(Mapper::new(name, elements, actuators))
    }

    /// Attempts every blueprint not yet attempted and not poisoned.
    ///
    /// All of them are attempted even when one fails.
    pub fn build_all(&mut self, registry: &mut MapperRegistry) -> Result<(), BuildError> {
        let names: Vec<String> = self.blueprints.keys().cloned().collect();
        let mut attempted = 0;
        let mut failed = 0;

        for name in names {
            let ready = self
                .blueprints
                .get(&name)
                .is_some_and(|b| b.state == BuildState::Unbuilt && b.build_permitted);
            if !ready {
                continue;
            }
            attempted += 1;
            if self.build(&name, registry).is_err() {
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(BuildError::Incomplete { failed, attempted });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Axis, AxisDirection, Button};

    fn setup() -> (MapperBuilder, MapperRegistry) {
        (MapperBuilder::new(), MapperRegistry::with_builtins())
    }

    #[test]
    fn self_template_is_circular() {
        let (mut builder, mut registry) = setup();
        builder.create_blueprint("Loop", &registry).unwrap();
        builder.set_template("Loop", "Loop").unwrap();
        assert_eq!(
            builder.build("Loop", &mut registry).unwrap_err(),
            BuildError::CircularDependency("Loop".into())
        );
        assert!(!registry.contains("Loop"));
        assert_eq!(builder.blueprint("Loop").unwrap().state(), BuildState::Failed);
    }

    #[test]
    fn two_blueprint_cycle_is_circular() {
        let (mut builder, mut registry) = setup();
        builder.create_blueprint("A", &registry).unwrap();
        builder.create_blueprint("B", &registry).unwrap();
        builder.set_template("A", "B").unwrap();
        builder.set_template("B", "A").unwrap();
        assert!(matches!(
            builder.build("A", &mut registry),
            Err(BuildError::CircularDependency(_))
        ));
        assert!(!registry.contains("A"));
        assert!(!registry.contains("B"));
    }

    #[test]
    fn unknown_template_fails() {
        let (mut builder, mut registry) = setup();
        builder.create_blueprint("Orphan", &registry).unwrap();
        builder.set_template("Orphan", "DoesNotExist").unwrap();
        assert_eq!(
            builder.build("Orphan", &mut registry).unwrap_err(),
            BuildError::UnknownTemplate {
                blueprint: "Orphan".into(),
                template: "DoesNotExist".into()
            }
        );
    }

    #[test]
    fn overrides_apply_on_top_of_template_copy() {
        let (mut builder, mut registry) = setup();
        builder.create_blueprint("Custom", &registry).unwrap();
        builder.set_template("Custom", "StandardGamepad").unwrap();
        builder
            .set_element(
                "Custom",
                ElementSlot::TriggerLT,
                Some(ElementMapper::axis(Axis::RotX, AxisDirection::Both)),
            )
            .unwrap();
        builder.set_element("Custom", ElementSlot::ButtonRS, None).unwrap();

        let custom = builder.build("Custom", &mut registry).unwrap();
        assert!(custom.elements().get(ElementSlot::ButtonRS).is_none());
        assert!(custom.capabilities().has_axis(Axis::RotX));
        assert_eq!(custom.capabilities().num_buttons(), 11);

        let standard = registry.get("StandardGamepad").unwrap();
        assert_eq!(
            standard.elements().get(ElementSlot::TriggerLT),
            Some(&ElementMapper::button(Button::new(6).unwrap()))
        );
        assert_eq!(registry.get("Custom").unwrap().name(), "Custom");
    }

    #[test]
    fn blueprint_template_chain_resolves_in_order() {
        let (mut builder, mut registry) = setup();
        builder.create_blueprint("Base", &registry).unwrap();
        builder
            .set_element_from_text("Base", "ButtonA", Some("Keyboard(0x20)"))
            .unwrap();
        builder.create_blueprint("Derived", &registry).unwrap();
        builder.set_template("Derived", "Base").unwrap();
        builder
            .set_element_from_text("Derived", "StickLeftX", Some("Axis(X)"))
            .unwrap();

        let derived = builder.build("Derived", &mut registry).unwrap();
        assert_eq!(
            derived.elements().get(ElementSlot::ButtonA),
            Some(&ElementMapper::keyboard(0x20))
        );
        assert!(registry.contains("Base"));
        assert_eq!(builder.blueprint("Base").unwrap().state(), BuildState::Built);

        // Already built as a dependency, so build_all has nothing left to do.
        builder.build_all(&mut registry).unwrap();
    }

    #[test]
    fn no_template_starts_empty_with_default_actuators() {
        let (mut builder, mut registry) = setup();
        builder.create_blueprint("Bare", &registry).unwrap();
        builder
            .set_actuator_from_text("Bare", "RightMotor", None)
            .unwrap();
        let bare = builder.build("Bare", &mut registry).unwrap();
        assert_eq!(bare.elements().iter().count(), 0);
        assert_eq!(
            bare.actuators().get(ActuatorSlot::LeftMotor),
            ActuatorMap::default().get(ActuatorSlot::LeftMotor)
        );
        assert_eq!(bare.actuators().get(ActuatorSlot::RightMotor), None);
    }

    #[test]
    fn parse_error_poisons_blueprint() {
        let (mut builder, mut registry) = setup();
        builder.create_blueprint("Broken", &registry).unwrap();
        assert!(builder
            .set_element_from_text("Broken", "ButtonA", Some("Button(99)"))
            .is_err());
        assert!(builder
            .set_element_from_text("Broken", "Paddle", Some("Button(1)"))
            .is_err());
        assert!(!builder.blueprint("Broken").unwrap().is_build_permitted());
        assert_eq!(
            builder.build("Broken", &mut registry).unwrap_err(),
            BuildError::Poisoned("Broken".into())
        );
    }

    #[test]
    fn build_all_reports_failures_but_builds_the_rest() {
        let (mut builder, mut registry) = setup();
        builder.create_blueprint("Good", &registry).unwrap();
        builder.set_template("Good", "XInputNative").unwrap();
        builder.create_blueprint("Bad", &registry).unwrap();
        builder.set_template("Bad", "Missing").unwrap();
        builder.create_blueprint("Poisoned", &registry).unwrap();
        let _ = builder.set_element_from_text("Poisoned", "ButtonA", Some("Nope("));

        assert_eq!(
            builder.build_all(&mut registry).unwrap_err(),
            BuildError::Incomplete {
                failed: 1,
                attempted: 2
            }
        );
        assert!(registry.contains("Good"));
        assert!(!registry.contains("Bad"));
        assert!(!registry.contains("Poisoned"));
    }

    #[test]
    fn names_must_be_unique_and_blueprints_frozen_after_build() {
        let (mut builder, mut registry) = setup();
        assert_eq!(
            builder.create_blueprint("Null", &registry).unwrap_err(),
            BuildError::DuplicateName("Null".into())
        );
        builder.create_blueprint("Once", &registry).unwrap();
        assert!(builder.create_blueprint("Once", &registry).is_err());
        builder.build("Once", &mut registry).unwrap();
        assert_eq!(
            builder.set_template("Once", "Null").unwrap_err(),
            BuildError::AlreadyBuilt("Once".into())
        );
        assert!(matches!(
            builder.build("Once", &mut registry),
            Err(BuildError::CircularDependency(_))
        ));
    }
}
