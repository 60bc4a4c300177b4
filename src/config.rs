//! Project configuration: a `skillrunner.toml` file layered with environment
//! variables and CLI overrides (file → environment → CLI).
//!
//! `skillrunner.toml` covers only what the engine itself needs: the
//! default routing profile, per-provider credentials, cache sizing and
//! TTL, budgets, the machine id used to tag checkpoints, and checkpoint
//! retention. Database paths or schema for any other subsystem are out
//! of scope.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_profile() -> String {
    "balanced".to_string()
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_memory_cache_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_durable_cache_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_delete_checkpoint_on_success() -> bool {
    true
}

/// `[defaults]` in `skillrunner.toml`: execution knobs that apply unless
/// a CLI flag overrides them for a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub token_budget: Option<u64>,
    #[serde(default)]
    pub cost_budget: Option<f64>,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_delete_checkpoint_on_success")]
    pub delete_checkpoint_on_success: bool,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            token_budget: None,
            cost_budget: None,
            cache_ttl_seconds: default_cache_ttl_seconds(),
            delete_checkpoint_on_success: default_delete_checkpoint_on_success(),
        }
    }
}

/// `[cache]`: sizing for the two-tier Response Cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_memory_cache_bytes")]
    pub memory_max_bytes: u64,
    #[serde(default = "default_durable_cache_bytes")]
    pub durable_max_bytes: u64,
    /// Path to the SQLite file backing the durable tier, relative to the
    /// project directory unless absolute. Defaults to `.skillrunner/cache.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            memory_max_bytes: default_memory_cache_bytes(),
            durable_max_bytes: default_durable_cache_bytes(),
            db_path: None,
        }
    }
}

/// `[checkpoint]`: where the Workflow Checkpoint Store persists.
/// Defaults to `.skillrunner/checkpoints.db`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointSection {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// `[metrics]`: where the Metrics Sink persists. Defaults
/// to `.skillrunner/metrics.db`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// One provider's credentials and base URL override. Every field also
/// accepts an environment fallback via [`ProviderSection::resolved_api_key`]
/// so that secrets never need to live in the checked-in TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl ProviderSection {
    /// Resolve the API key, falling back to `{NAME}_API_KEY` in the
    /// environment (populated by `.env` via `dotenvy` at startup) when
    /// the TOML file doesn't set one directly.
    pub fn resolved_api_key(&self, provider_name: &str) -> Option<String> {
        self.api_key.clone().or_else(|| {
            let env_var = format!("{}_API_KEY", provider_name.to_uppercase());
            std::env::var(env_var).ok()
        })
    }
}

/// The parsed contents of `skillrunner.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillrunnerToml {
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub checkpoint: CheckpointSection,
    #[serde(default)]
    pub metrics: MetricsSection,
    /// Keyed by provider name (`anthropic`, `openai`, `groq`, `ollama`,
    /// or a custom vendor's registered name).
    #[serde(default)]
    pub providers: std::collections::HashMap<String, ProviderSection>,
}

impl SkillrunnerToml {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse skillrunner.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Load from `<project_dir>/skillrunner.toml`, falling back to
    /// defaults when no file is present.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join("skillrunner.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize skillrunner.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

/// Unified runtime configuration: `skillrunner.toml` plus the
/// environment plus the machine id, resolved once at startup (project
/// dir, parsed toml, CLI overrides).
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
    pub toml: SkillrunnerToml,
    pub machine_id: String,
}

impl Config {
    pub fn load(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("failed to resolve project directory")?;

        // `.env` is optional; provider keys may also come from the real
        // environment or the `[providers.*]` table.
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let toml = SkillrunnerToml::load_or_default(&project_dir)?;
        let state_dir = project_dir.join(".skillrunner");
        let machine_id = Self::resolve_machine_id();

        Ok(Self { project_dir, state_dir, toml, machine_id })
    }

    fn resolve_machine_id() -> String {
        std::env::var("SKILLRUNNER_MACHINE_ID").unwrap_or_else(|_| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown-machine".to_string())
        })
    }

    pub fn ensure_state_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("failed to create state directory {}", self.state_dir.display()))?;
        Ok(())
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.toml
            .cache
            .db_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("cache.db"))
    }

    pub fn checkpoint_db_path(&self) -> PathBuf {
        self.toml
            .checkpoint
            .db_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("checkpoints.db"))
    }

    pub fn metrics_db_path(&self) -> PathBuf {
        self.toml
            .metrics
            .db_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("metrics.db"))
    }

    /// `~/.skillrunner` — used by the `config init` CLI command when no
    /// project directory has a config yet.
    pub fn global_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(home.join(".skillrunner"))
    }
}
