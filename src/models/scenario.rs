use serde::Serialize;

/// A named background/lighting descriptor used to steer the generation
/// prompt. Immutable reference data from the compiled-in catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScenarioProfile {
    pub category: &'static str,
    pub name: &'static str,
    pub lighting_prompt: &'static str,
}
