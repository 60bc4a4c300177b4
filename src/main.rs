use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skillrunner::config::Config;
use skillrunner::engine::{ExecutionOptions, RoutingProfile, Skill, SkillExecutionEngine};
use skillrunner::errors::CliError;
use skillrunner_common::SystemClock;
use skillrunner_providers::anthropic::AnthropicProvider;
use skillrunner_providers::groq::GroqProvider;
use skillrunner_providers::ollama::OllamaProvider;
use skillrunner_providers::openai::OpenAiProvider;
use skillrunner_providers::{Provider, ProviderRegistry};
use skillrunner_runtime::cache::ResponseCache;
use skillrunner_runtime::checkpoint::CheckpointStore;
use skillrunner_runtime::metrics::MetricsSink;

#[derive(Parser)]
#[command(name = "skillrunner")]
#[command(version, about = "Multi-phase AI skill orchestration engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a skill to completion against the configured providers.
    Run {
        /// Path to a skill definition (TOML, deserializes into `Skill`).
        #[arg(long)]
        skill: PathBuf,
        /// Raw input text, or `@path` to read it from a file.
        #[arg(long)]
        input: String,
        #[arg(long, default_value = "balanced")]
        profile: String,
        #[arg(long)]
        stream: bool,
        #[arg(long)]
        force_fresh: bool,
        #[arg(long)]
        token_budget: Option<u64>,
        #[arg(long)]
        cost_budget: Option<f64>,
    },
    /// Sweep checkpoints this machine left `in_progress` (e.g. after a
    /// crash) into `abandoned`, so they no longer resume silently.
    AbandonStale,
    /// View or initialize `skillrunner.toml`.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    Show,
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run { skill, input, profile, stream, force_fresh, token_budget, cost_budget } => {
            run_skill(&project_dir, skill, input, profile, *stream, *force_fresh, *token_budget, *cost_budget).await?;
        }
        Commands::AbandonStale => abandon_stale(&project_dir)?,
        Commands::Config { command } => config_command(&project_dir, command)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_skill(path: &std::path::Path) -> Result<Skill, CliError> {
    let content = std::fs::read_to_string(path).map_err(|err| CliError::SkillLoadFailed {
        path: path.to_path_buf(),
        source: err.into(),
    })?;
    toml::from_str(&content).map_err(|err| CliError::SkillLoadFailed { path: path.to_path_buf(), source: err.into() })
}

fn resolve_input(raw: &str) -> Result<String> {
    match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read input file {path}")),
        None => Ok(raw.to_string()),
    }
}

/// Register every vendor whose credentials are configured. A provider
/// with no API key (or, for `ollama`, simply not enabled) is skipped
/// rather than registered half-broken.
fn build_registry(config: &Config) -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    let anthropic = config.toml.providers.get("anthropic").cloned().unwrap_or_default();
    if let Some(key) = anthropic.resolved_api_key("anthropic") {
        let mut provider = AnthropicProvider::new(key);
        if let Some(base_url) = anthropic.base_url {
            provider = provider.with_base_url(base_url);
        }
        registry.register(Arc::new(provider)).expect("provider name is statically non-empty");
    }

    let openai = config.toml.providers.get("openai").cloned().unwrap_or_default();
    if let Some(key) = openai.resolved_api_key("openai") {
        let mut provider = OpenAiProvider::new(key);
        if let Some(base_url) = openai.base_url {
            provider = provider.with_base_url(base_url);
        }
        registry.register(Arc::new(provider)).expect("provider name is statically non-empty");
    }

    let groq = config.toml.providers.get("groq").cloned().unwrap_or_default();
    if let Some(key) = groq.resolved_api_key("groq") {
        let mut provider = GroqProvider::new(key);
        if let Some(base_url) = groq.base_url {
            provider = provider.with_base_url(base_url);
        }
        registry.register(Arc::new(provider)).expect("provider name is statically non-empty");
    }

    let ollama = config.toml.providers.get("ollama").cloned().unwrap_or_default();
    if ollama.enabled.unwrap_or(false) {
        let base_url = ollama.base_url.unwrap_or_else(|| "http://localhost:11434".to_string());
        registry.register(Arc::new(OllamaProvider::new(base_url))).expect("provider name is statically non-empty");
    }

    registry
}

#[allow(clippy::too_many_arguments)]
async fn run_skill(
    project_dir: &std::path::Path,
    skill_path: &std::path::Path,
    raw_input: &str,
    profile: &str,
    stream: bool,
    force_fresh: bool,
    token_budget: Option<u64>,
    cost_budget: Option<f64>,
) -> Result<()> {
    let config = Config::load(project_dir.to_path_buf())?;
    config.ensure_state_dir()?;

    let skill = load_skill(skill_path)?;
    let input = resolve_input(raw_input)?;
    let profile = RoutingProfile::parse(profile).map_err(CliError::from)?;

    let clock = Arc::new(SystemClock);
    let registry = Arc::new(build_registry(&config));
    let cache = Arc::new(ResponseCache::open(
        &config.cache_db_path(),
        config.toml.cache.memory_max_bytes,
        config.toml.cache.durable_max_bytes,
        std::time::Duration::from_secs(config.toml.defaults.cache_ttl_seconds),
        clock.clone(),
    )?);
    let checkpoints = Arc::new(CheckpointStore::open(&config.checkpoint_db_path(), clock.clone())?);
    let metrics = Arc::new(MetricsSink::open(&config.metrics_db_path())?);

    let engine = SkillExecutionEngine::new(registry, cache, checkpoints, metrics, clock, config.machine_id.clone())
        .with_checkpoint_retention(!config.toml.defaults.delete_checkpoint_on_success);
    engine.abandon_in_progress_on_this_machine().map_err(CliError::from)?;

    let options = ExecutionOptions {
        stream,
        force_fresh,
        token_budget: token_budget.or(config.toml.defaults.token_budget),
        cost_budget: cost_budget.or(config.toml.defaults.cost_budget),
        ..Default::default()
    };

    let mut stdout_sink: Box<dyn FnMut(&str) -> Result<(), skillrunner_common::EngineError> + Send> =
        Box::new(|chunk: &str| {
            print!("{chunk}");
            Ok(())
        });

    let output = if stream {
        engine.run(&skill, &input, profile, options, Some(&mut stdout_sink)).await.map_err(CliError::from)?
    } else {
        engine.run(&skill, &input, profile, options, None).await.map_err(CliError::from)?
    };

    if !stream {
        println!("{}", output.primary_output);
    } else {
        println!();
    }

    eprintln!(
        "\n[execution {}] tokens={}+{} cost=${:.4} cache_hits={} cache_misses={} duration={:?}",
        output.execution_id,
        output.totals.input_tokens,
        output.totals.output_tokens,
        output.totals.cost,
        output.totals.cache_hits,
        output.totals.cache_misses,
        output.totals.duration,
    );

    Ok(())
}

fn abandon_stale(project_dir: &std::path::Path) -> Result<()> {
    let config = Config::load(project_dir.to_path_buf())?;
    config.ensure_state_dir()?;
    let clock = Arc::new(SystemClock);
    let checkpoints = CheckpointStore::open(&config.checkpoint_db_path(), clock)?;
    let count = checkpoints.mark_abandoned(&config.machine_id)?;
    println!("abandoned {count} stale checkpoint(s) on machine '{}'", config.machine_id);
    Ok(())
}

fn config_command(project_dir: &std::path::Path, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = Config::load(project_dir.to_path_buf())?;
            println!("{:#?}", config.toml);
        }
        ConfigCommands::Init => {
            let path = project_dir.join("skillrunner.toml");
            if path.exists() {
                anyhow::bail!("{} already exists", path.display());
            }
            skillrunner::config::SkillrunnerToml::default().save(&path)?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}
