//! `Skill` and `Phase`: a declarative multi-phase prompt
//! pipeline and its steps.

use serde::{Deserialize, Serialize};

/// The class of work a phase performs, used by the routing profile. The
/// illustrative set below is deliberately small; a skill author picks
/// whichever class best matches the phase's character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseClass {
    Drafting,
    Critique,
    Synthesis,
}

impl Default for PhaseClass {
    fn default() -> Self {
        PhaseClass::Drafting
    }
}

/// One prompt/response step inside a [`Skill`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    /// Mustache-like `{{name}}` template rendered against the
    /// accumulated phase context.
    pub prompt_template: String,
    /// Optional system prompt, rendered through the same template
    /// engine as `prompt_template`. Lets a skill definition drive
    /// `CompletionRequest.system_prompt` directly.
    #[serde(default)]
    pub system_prompt_template: Option<String>,
    /// Model identifier the phase author prefers. Overrides the routing
    /// profile's choice when that model is whitelisted by some
    /// registered provider; otherwise the profile wins.
    #[serde(default)]
    pub model_hint: Option<String>,
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    /// A phase is cacheable unless marked otherwise.
    #[serde(default = "default_true")]
    pub cacheable: bool,
    #[serde(default)]
    pub class: PhaseClass,
}

fn default_true() -> bool {
    true
}

impl Phase {
    pub fn new(id: impl Into<String>, name: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt_template: prompt_template.into(),
            system_prompt_template: None,
            model_hint: None,
            max_tokens: 1024,
            temperature: 0.0,
            cacheable: true,
            class: PhaseClass::Drafting,
        }
    }

    pub fn with_class(mut self, class: PhaseClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_model_hint(mut self, model_hint: impl Into<String>) -> Self {
        self.model_hint = Some(model_hint.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn not_cacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }

    pub fn with_system_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.system_prompt_template = Some(template.into());
        self
    }
}

/// A declarative multi-phase prompt pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub phases: Vec<Phase>,
}

impl Skill {
    pub fn new(id: impl Into<String>, name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: "0.1.0".to_string(),
            phases,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_defaults_are_cacheable_and_drafting_class() {
        let phase = Phase::new("draft", "Draft", "write about {{_input}}");
        assert!(phase.cacheable);
        assert_eq!(phase.class, PhaseClass::Drafting);
        assert!(phase.model_hint.is_none());
    }

    #[test]
    fn not_cacheable_clears_the_flag() {
        let phase = Phase::new("p", "P", "t").not_cacheable();
        assert!(!phase.cacheable);
    }

    #[test]
    fn skill_phase_lookup_by_id() {
        let skill = Skill::new(
            "summarize",
            "Summarize",
            vec![Phase::new("draft", "Draft", "t"), Phase::new("polish", "Polish", "t")],
        );
        assert_eq!(skill.phase("polish").unwrap().name, "Polish");
        assert!(skill.phase("missing").is_none());
    }
}
