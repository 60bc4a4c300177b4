//! The routing profile: "a mapping from a phase's declared
//! class... to an ordered provider-preference list and a model
//! identifier." An unknown profile fails fast with `validation`.

use std::collections::HashMap;
use std::sync::Arc;

use skillrunner_common::{EngineError, ErrorKind};
use skillrunner_providers::{Provider, ProviderRegistry};

use super::skill::{Phase, PhaseClass};

/// Cost/latency tier selected per execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingProfile {
    Cheap,
    Balanced,
    Premium,
}

impl RoutingProfile {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "cheap" => Ok(RoutingProfile::Cheap),
            "balanced" => Ok(RoutingProfile::Balanced),
            "premium" => Ok(RoutingProfile::Premium),
            other => Err(EngineError::new(
                ErrorKind::Validation,
                format!("unknown routing profile '{other}'"),
            )),
        }
    }
}

/// What a profile resolves a phase class to: a model id plus an ordered
/// list of provider names to try, earlier names preferred. Registration
/// order in the registry still breaks any remaining tie.
#[derive(Debug, Clone)]
struct ProfileEntry {
    provider_preference: Vec<String>,
    model_id: String,
}

/// The static profile → phase-class → (providers, model) table.
/// Illustrative, matching the vendor catalogs in `skillrunner-providers`.
pub struct RoutingTable {
    entries: HashMap<(RoutingProfile, PhaseClass), ProfileEntry>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        let mut entries = HashMap::new();

        for class in [PhaseClass::Drafting, PhaseClass::Synthesis] {
            entries.insert(
                (RoutingProfile::Cheap, class),
                ProfileEntry {
                    provider_preference: vec!["groq".to_string(), "ollama".to_string()],
                    model_id: "llama-3.1-8b-instant".to_string(),
                },
            );
            entries.insert(
                (RoutingProfile::Balanced, class),
                ProfileEntry {
                    provider_preference: vec!["anthropic".to_string(), "openai".to_string()],
                    model_id: "claude-sonnet-4".to_string(),
                },
            );
            entries.insert(
                (RoutingProfile::Premium, class),
                ProfileEntry {
                    provider_preference: vec!["anthropic".to_string(), "openai".to_string()],
                    model_id: "claude-opus-4".to_string(),
                },
            );
        }

        entries.insert(
            (RoutingProfile::Cheap, PhaseClass::Critique),
            ProfileEntry {
                provider_preference: vec!["groq".to_string()],
                model_id: "mixtral-8x7b-32768".to_string(),
            },
        );
        entries.insert(
            (RoutingProfile::Balanced, PhaseClass::Critique),
            ProfileEntry {
                provider_preference: vec!["openai".to_string(), "anthropic".to_string()],
                model_id: "gpt-4o".to_string(),
            },
        );
        entries.insert(
            (RoutingProfile::Premium, PhaseClass::Critique),
            ProfileEntry {
                provider_preference: vec!["anthropic".to_string(), "openai".to_string()],
                model_id: "claude-opus-4".to_string(),
            },
        );

        Self { entries }
    }
}

impl RoutingTable {
    /// Resolve `(model_id, provider)` for `phase` under `profile`. A
    /// phase's `model_hint` wins when some registered provider
    /// whitelists it; otherwise the profile's model/provider
    /// preference is used, falling back to the registry's own
    /// first-registered-wins lookup when none of the preferred providers
    /// claim the model.
    pub fn resolve(
        &self,
        profile: RoutingProfile,
        phase: &Phase,
        registry: &ProviderRegistry,
    ) -> Result<(String, Arc<dyn Provider>), EngineError> {
        if let Some(hint) = &phase.model_hint
            && let Some(provider) = registry.provider_for_model(hint)
        {
            return Ok((hint.clone(), provider));
        }

        let entry = self.entries.get(&(profile, phase.class)).ok_or_else(|| {
            EngineError::new(
                ErrorKind::Validation,
                format!("no routing entry for profile/class combination on phase '{}'", phase.id),
            )
        })?;

        for name in &entry.provider_preference {
            if let Some(provider) = registry.get(name)
                && provider.supports_model(&entry.model_id)
            {
                return Ok((entry.model_id.clone(), provider));
            }
        }

        let provider = registry.provider_for_model(&entry.model_id).ok_or_else(|| {
            EngineError::new(
                ErrorKind::Validation,
                format!("no registered provider supports model '{}'", entry.model_id),
            )
        })?;
        Ok((entry.model_id.clone(), provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillrunner_providers::testing::FakeProvider;

    #[test]
    fn unknown_profile_string_is_a_validation_error() {
        let err = RoutingProfile::parse("extravagant").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn parses_known_profiles() {
        assert_eq!(RoutingProfile::parse("cheap").unwrap(), RoutingProfile::Cheap);
        assert_eq!(RoutingProfile::parse("balanced").unwrap(), RoutingProfile::Balanced);
        assert_eq!(RoutingProfile::parse("premium").unwrap(), RoutingProfile::Premium);
    }

    #[test]
    fn model_hint_overrides_profile_when_whitelisted() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("anthropic").with_models(vec!["claude-sonnet-4".to_string()]))).unwrap();
        registry.register(Arc::new(FakeProvider::new("custom").with_models(vec!["my-finetune".to_string()]))).unwrap();

        let phase = Phase::new("p", "P", "t").with_model_hint("my-finetune");
        let table = RoutingTable::default();
        let (model, provider) = table.resolve(RoutingProfile::Cheap, &phase, &registry).unwrap();
        assert_eq!(model, "my-finetune");
        assert_eq!(provider.info().name, "custom");
    }

    #[test]
    fn unwhitelisted_hint_falls_back_to_profile() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("groq").with_models(vec!["llama-3.1-8b-instant".to_string()]))).unwrap();

        let phase = Phase::new("p", "P", "t").with_model_hint("nonexistent-model");
        let table = RoutingTable::default();
        let (model, provider) = table.resolve(RoutingProfile::Cheap, &phase, &registry).unwrap();
        assert_eq!(model, "llama-3.1-8b-instant");
        assert_eq!(provider.info().name, "groq");
    }

    #[test]
    fn falls_back_to_registry_lookup_when_preferred_providers_absent() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("some-other-vendor").with_models(vec!["claude-opus-4".to_string()]))).unwrap();

        let phase = Phase::new("p", "P", "t");
        let table = RoutingTable::default();
        let (model, provider) = table.resolve(RoutingProfile::Premium, &phase, &registry).unwrap();
        assert_eq!(model, "claude-opus-4");
        assert_eq!(provider.info().name, "some-other-vendor");
    }

    #[test]
    fn no_provider_for_model_is_a_validation_error() {
        let registry = ProviderRegistry::new();
        let phase = Phase::new("p", "P", "t");
        let table = RoutingTable::default();
        let err = table.resolve(RoutingProfile::Premium, &phase, &registry).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
