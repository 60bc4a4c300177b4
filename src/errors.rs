//! Error types for the `skillrunner` binary itself.

use skillrunner_common::EngineError;
use thiserror::Error;

/// Errors raised while assembling the CLI's runtime (config loading,
/// provider construction, skill file parsing) before the engine itself
/// ever runs.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load skill definition from {path}: {source}")]
    SkillLoadFailed {
        path: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("no provider configured for '{name}' (set {name}_API_KEY or [providers.{name}] in skillrunner.toml)")]
    ProviderNotConfigured { name: String },

    #[error(transparent)]
    Execution(#[from] EngineError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_not_configured_carries_name() {
        let err = CliError::ProviderNotConfigured { name: "anthropic".to_string() };
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn execution_error_converts_from_engine_error() {
        let engine_err = EngineError::budget("over budget");
        let cli_err: CliError = engine_err.into();
        match &cli_err {
            CliError::Execution(inner) => assert_eq!(inner.kind(), skillrunner_common::ErrorKind::Budget),
            _ => panic!("expected CliError::Execution"),
        }
    }

    #[test]
    fn all_variants_implement_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        let err = CliError::ProviderNotConfigured { name: "x".to_string() };
        assert_std_error(&err);
    }
}
