//! The execution algorithm itself: the phase
//! pipeline driver that ties the cache, provider registry, checkpoint
//! store and metrics sink together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use skillrunner_common::{Clock, CompletionRequest, EngineError, ErrorKind, Message};
use skillrunner_providers::{ChunkSink, ProviderRegistry};
use skillrunner_runtime::cache::{CacheEntry, ResponseCache};
use skillrunner_runtime::checkpoint::{CheckpointStatus, CheckpointStore, PhaseResultData, WorkflowCheckpoint};
use skillrunner_runtime::metrics::{ExecutionRecord, ExecutionStatus, MetricsSink, PhaseExecutionRecord};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::fingerprint::{fingerprint, hash_input};
use super::pricing::PriceTable;
use super::profile::{RoutingProfile, RoutingTable};
use super::skill::Skill;
use super::template;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

impl RoutingProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingProfile::Cheap => "cheap",
            RoutingProfile::Balanced => "balanced",
            RoutingProfile::Premium => "premium",
        }
    }
}

/// `(skill_id, input, profile, options)` knobs.
pub struct ExecutionOptions {
    pub stream: bool,
    /// Bypass both cache lookup and checkpoint resume.
    pub force_fresh: bool,
    pub token_budget: Option<u64>,
    pub cost_budget: Option<f64>,
    pub cache_ttl: Option<Duration>,
    /// Headline context injected into every phase's template. Treated as an
    /// external collaborator's output — the engine only has a string to
    /// inject, never its own opinion about workspace focus.
    pub headline_context: Option<String>,
    pub cancel: CancellationToken,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            stream: false,
            force_fresh: false,
            token_budget: None,
            cost_budget: None,
            cache_ttl: None,
            headline_context: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// `totals` in the engine-facing contract.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub duration: Duration,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// `run(...) → {primary_output, per_phase_outputs, totals}`.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub execution_id: String,
    pub primary_output: String,
    pub per_phase_outputs: HashMap<String, String>,
    pub totals: ExecutionTotals,
}

fn cancelled_error() -> EngineError {
    EngineError::cancelled("execution cancelled: checkpoint left in_progress for resume")
}

/// The Skill Execution Engine: drives a skill to
/// completion against the registry, with caching, checkpointing,
/// budgeting and metrics.
pub struct SkillExecutionEngine {
    registry: Arc<ProviderRegistry>,
    cache: Arc<ResponseCache>,
    checkpoints: Arc<CheckpointStore>,
    metrics: Arc<MetricsSink>,
    routing: RoutingTable,
    prices: PriceTable,
    clock: Arc<dyn Clock>,
    machine_id: String,
    delete_checkpoint_on_success: bool,
}

impl SkillExecutionEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<ResponseCache>,
        checkpoints: Arc<CheckpointStore>,
        metrics: Arc<MetricsSink>,
        clock: Arc<dyn Clock>,
        machine_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            cache,
            checkpoints,
            metrics,
            routing: RoutingTable::default(),
            prices: PriceTable::default(),
            clock,
            machine_id: machine_id.into(),
            delete_checkpoint_on_success: true,
        }
    }

    /// When `false`, a completed checkpoint row is retained instead of
    /// being deleted.
    pub fn with_checkpoint_retention(mut self, retain_on_success: bool) -> Self {
        self.delete_checkpoint_on_success = !retain_on_success;
        self
    }

    /// Sweep every `in_progress` checkpoint left by this machine into
    /// `abandoned`. Call once at process
    /// startup, before any execution is started.
    pub fn abandon_in_progress_on_this_machine(&self) -> Result<u64, EngineError> {
        self.checkpoints.mark_abandoned(&self.machine_id)
    }

    #[instrument(skip(self, skill, options, on_chunk), fields(skill_id = %skill.id, profile = profile.as_str()))]
    pub async fn run(
        &self,
        skill: &Skill,
        input: &str,
        profile: RoutingProfile,
        options: ExecutionOptions,
        mut on_chunk: Option<&mut ChunkSink<'_>>,
    ) -> Result<ExecutionOutput, EngineError> {
        if skill.phases.is_empty() {
            return Err(EngineError::validation(format!("skill '{}' has no phases", skill.id)));
        }

        let started_at = self.clock.now();
        let input_hash = hash_input(input);

        let (mut checkpoint, execution_id, start_index) = if !options.force_fresh {
            match self.checkpoints.get_latest_in_progress(&skill.id, &input_hash)? {
                Some(existing) => {
                    let next = (existing.completed_batch + 1) as usize;
                    let execution_id = existing.execution_id.clone();
                    (existing, execution_id, next)
                }
                None => self.start_fresh_checkpoint(skill, input, &input_hash)?,
            }
        } else {
            self.start_fresh_checkpoint(skill, input, &input_hash)?
        };

        let mut running_input_tokens = checkpoint.input_tokens as u64;
        let mut running_output_tokens = checkpoint.output_tokens as u64;
        let mut running_cost = 0.0_f64;
        let mut cache_hits = 0u64;
        let mut cache_misses = 0u64;

        for index in start_index..skill.phases.len() {
            if options.cancel.is_cancelled() {
                return Err(cancelled_error());
            }

            let phase = &skill.phases[index];
            let context = self.phase_context(&checkpoint, &options);
            let rendered_prompt = template::render(&phase.prompt_template, &context);
            let rendered_system = phase
                .system_prompt_template
                .as_ref()
                .map(|tmpl| template::render(tmpl, &context));

            let (model_id, provider) = self.routing.resolve(profile, phase, &self.registry)?;

            let mut req = CompletionRequest::new(model_id.clone(), vec![Message::user(rendered_prompt)])
                .with_max_tokens(phase.max_tokens)
                .with_temperature(phase.temperature);
            if let Some(system) = rendered_system {
                req = req.with_system_prompt(system);
            }

            let key = fingerprint(&req);
            let lookup_cache = phase.cacheable && !options.force_fresh;

            let (response, cache_hit) = if lookup_cache {
                match self.cache.get(&key) {
                    Ok((Some(cached), true)) => {
                        cache_hits += 1;
                        (cached, true)
                    }
                    Ok(_) => {
                        cache_misses += 1;
                        let response = self
                            .invoke_provider(provider.as_ref(), &req, &options, &mut on_chunk)
                            .await
                            .inspect_err(|err| self.fail_checkpoint(&mut checkpoint, err))?;
                        (response, false)
                    }
                    Err(err) => {
                        warn!(error = %err, "cache lookup failed, falling through to provider");
                        cache_misses += 1;
                        let response = self
                            .invoke_provider(provider.as_ref(), &req, &options, &mut on_chunk)
                            .await
                            .inspect_err(|err| self.fail_checkpoint(&mut checkpoint, err))?;
                        (response, false)
                    }
                }
            } else {
                let response = self
                    .invoke_provider(provider.as_ref(), &req, &options, &mut on_chunk)
                    .await
                    .inspect_err(|err| self.fail_checkpoint(&mut checkpoint, err))?;
                (response, false)
            };

            // Budget check: a cache hit spends no
            // new provider tokens, so it never consumes the budget — that
            // is the entire point of caching.
            let mut phase_cost = 0.0_f64;
            if !cache_hit {
                phase_cost = self.prices.cost(
                    &provider.info().name,
                    &response.model_used,
                    response.input_tokens as u64,
                    response.output_tokens as u64,
                );
                let projected_input = running_input_tokens + response.input_tokens as u64;
                let projected_output = running_output_tokens + response.output_tokens as u64;
                let projected_cost = running_cost + phase_cost;

                let over_token_budget = options
                    .token_budget
                    .is_some_and(|budget| projected_input + projected_output > budget);
                let over_cost_budget = options.cost_budget.is_some_and(|budget| projected_cost > budget);

                if over_token_budget || over_cost_budget {
                    checkpoint.status = CheckpointStatus::Failed;
                    checkpoint.updated_at = self.clock.now();
                    if let Err(err) = self.checkpoints.update(&checkpoint) {
                        warn!(error = %err, "failed to persist budget-exhausted checkpoint");
                    }
                    self.record_failed_execution(&execution_id, skill, profile, started_at, running_input_tokens, running_output_tokens, running_cost, cache_hits, cache_misses);
                    return Err(EngineError::budget(format!(
                        "execution '{execution_id}' would exceed its budget at phase '{}'",
                        phase.id
                    )));
                }

                running_input_tokens = projected_input;
                running_output_tokens = projected_output;
                running_cost = projected_cost;

                if phase.cacheable {
                    let ttl = options.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL);
                    let entry = CacheEntry::new(key.clone(), response.clone(), self.clock.now(), ttl, model_id.clone(), key.clone());
                    if let Err(err) = self.cache.set_with_metadata(entry) {
                        warn!(error = %err, "cache write-through failed");
                    }
                }
            }

            let result = PhaseResultData {
                phase_id: phase.id.clone(),
                phase_name: phase.name.clone(),
                status: "completed".to_string(),
                output: response.content.clone(),
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
                model_used: response.model_used.clone(),
                cache_hit,
            };
            checkpoint.phase_results.insert(phase.id.clone(), result);
            checkpoint.phase_outputs.insert(phase.id.clone(), response.content.clone());
            checkpoint.input_tokens = running_input_tokens as u32;
            checkpoint.output_tokens = running_output_tokens as u32;
            checkpoint.completed_batch = index as i64;
            checkpoint.updated_at = self.clock.now();
            self.checkpoints.update(&checkpoint)?;

            if let Err(err) = self.metrics.record_phase(&PhaseExecutionRecord {
                execution_id: execution_id.clone(),
                phase_id: phase.id.clone(),
                phase_name: phase.name.clone(),
                provider: provider.info().name,
                model_id: model_id.clone(),
                input_tokens: response.input_tokens as u64,
                output_tokens: response.output_tokens as u64,
                cost: phase_cost,
                duration: response.duration,
                cache_hit,
                recorded_at: self.clock.now(),
            }) {
                warn!(error = %err, "failed to record phase metrics");
            }

            info!(phase_id = %phase.id, cache_hit, "phase completed");
        }

        checkpoint.status = CheckpointStatus::Completed;
        checkpoint.updated_at = self.clock.now();
        self.checkpoints.update(&checkpoint)?;

        let duration = (self.clock.now() - started_at).to_std().unwrap_or(Duration::ZERO);

        if let Err(err) = self.metrics.record_execution(&ExecutionRecord {
            execution_id: execution_id.clone(),
            skill_id: skill.id.clone(),
            skill_name: skill.name.clone(),
            profile: profile.as_str().to_string(),
            status: ExecutionStatus::Success,
            input_tokens: running_input_tokens,
            output_tokens: running_output_tokens,
            cost: running_cost,
            duration,
            cache_hits,
            cache_misses,
            started_at,
            completed_at: self.clock.now(),
        }) {
            warn!(error = %err, "failed to record execution metrics");
        }

        let primary_output = skill
            .phases
            .last()
            .and_then(|phase| checkpoint.phase_outputs.get(&phase.id))
            .cloned()
            .unwrap_or_default();

        let mut per_phase_outputs = checkpoint.phase_outputs.clone();
        per_phase_outputs.remove("_input");

        if self.delete_checkpoint_on_success
            && let Err(err) = self.checkpoints.delete_by_execution(&execution_id)
        {
            warn!(error = %err, "failed to delete completed checkpoint");
        }

        Ok(ExecutionOutput {
            execution_id,
            primary_output,
            per_phase_outputs,
            totals: ExecutionTotals {
                input_tokens: running_input_tokens,
                output_tokens: running_output_tokens,
                cost: running_cost,
                duration,
                cache_hits,
                cache_misses,
            },
        })
    }

    fn start_fresh_checkpoint(
        &self,
        skill: &Skill,
        input: &str,
        input_hash: &str,
    ) -> Result<(WorkflowCheckpoint, String, usize), EngineError> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let checkpoint_id = format!("ckpt-{execution_id}");
        let checkpoint = WorkflowCheckpoint::new(
            checkpoint_id,
            execution_id.clone(),
            skill.id.clone(),
            skill.name.clone(),
            input.to_string(),
            input_hash.to_string(),
            skill.phases.len() as u32,
            self.machine_id.clone(),
            self.clock.now(),
        );
        self.checkpoints.create(&checkpoint)?;
        Ok((checkpoint, execution_id, 0))
    }

    fn phase_context(&self, checkpoint: &WorkflowCheckpoint, options: &ExecutionOptions) -> HashMap<String, String> {
        let mut context = checkpoint.phase_outputs.clone();
        context.insert("headline".to_string(), options.headline_context.clone().unwrap_or_default());
        context
    }

    async fn invoke_provider(
        &self,
        provider: &(dyn skillrunner_providers::Provider),
        req: &CompletionRequest,
        options: &ExecutionOptions,
        on_chunk: &mut Option<&mut ChunkSink<'_>>,
    ) -> Result<skillrunner_common::CompletionResponse, EngineError> {
        if options.cancel.is_cancelled() {
            return Err(cancelled_error());
        }
        if options.stream {
            match on_chunk.as_deref_mut() {
                Some(sink) => provider.stream(req, sink, &options.cancel).await,
                None => {
                    let mut noop: Box<dyn FnMut(&str) -> Result<(), EngineError> + Send> = Box::new(|_| Ok(()));
                    provider.stream(req, noop.as_mut(), &options.cancel).await
                }
            }
        } else {
            provider.complete(req, &options.cancel).await
        }
    }

    fn fail_checkpoint(&self, checkpoint: &mut WorkflowCheckpoint, err: &EngineError) {
        if err.kind == ErrorKind::Cancelled {
            return;
        }
        checkpoint.status = CheckpointStatus::Failed;
        checkpoint.updated_at = self.clock.now();
        if let Err(update_err) = self.checkpoints.update(checkpoint) {
            warn!(error = %update_err, "failed to persist failed checkpoint");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_failed_execution(
        &self,
        execution_id: &str,
        skill: &Skill,
        profile: RoutingProfile,
        started_at: chrono::DateTime<chrono::Utc>,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
        cache_hits: u64,
        cache_misses: u64,
    ) {
        let duration = (self.clock.now() - started_at).to_std().unwrap_or(Duration::ZERO);
        if let Err(err) = self.metrics.record_execution(&ExecutionRecord {
            execution_id: execution_id.to_string(),
            skill_id: skill.id.clone(),
            skill_name: skill.name.clone(),
            profile: profile.as_str().to_string(),
            status: ExecutionStatus::Failed,
            input_tokens,
            output_tokens,
            cost,
            duration,
            cache_hits,
            cache_misses,
            started_at,
            completed_at: self.clock.now(),
        }) {
            warn!(error = %err, "failed to record failed execution metrics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::skill::{Phase, PhaseClass};
    use skillrunner_common::{test_clock_at, CompletionResponse, FinishReason};
    use skillrunner_providers::testing::FakeProvider;
    use std::time::Duration as StdDuration;

    fn engine_with_provider(provider: Arc<FakeProvider>, clock: Arc<dyn Clock>) -> SkillExecutionEngine {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider).unwrap();
        let cache = Arc::new(ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_secs(3600), clock.clone()).unwrap());
        let checkpoints = Arc::new(CheckpointStore::open_in_memory(clock.clone()).unwrap());
        let metrics = Arc::new(MetricsSink::open_in_memory().unwrap());
        SkillExecutionEngine::new(registry, cache, checkpoints, metrics, clock, "test-machine")
    }

    fn one_phase_skill() -> Skill {
        Skill::new(
            "summarize",
            "Summarize",
            vec![Phase::new("draft", "Draft", "Summarize: {{_input}}")
                .with_class(PhaseClass::Drafting)
                .with_model_hint("fake-model")],
        )
    }

    #[tokio::test]
    async fn cache_hit_path_calls_provider_once() {
        let clock = test_clock_at(chrono::Utc::now());
        let provider = Arc::new(FakeProvider::new("fake").with_models(vec!["fake-model".to_string()]));
        let engine = engine_with_provider(provider.clone(), clock.clone());
        let skill = one_phase_skill();

        let first = engine.run(&skill, "hello world", RoutingProfile::Cheap, ExecutionOptions::default(), None).await.unwrap();
        assert_eq!(provider.complete_call_count(), 1);
        assert_eq!(first.totals.cache_misses, 1);

        let second = engine.run(&skill, "hello world", RoutingProfile::Cheap, ExecutionOptions::default(), None).await.unwrap();
        assert_eq!(provider.complete_call_count(), 1, "second run should hit the cache, not re-invoke the provider");
        assert_eq!(second.totals.cache_hits, 1);
    }

    #[tokio::test]
    async fn streaming_aggregates_chunks_in_order() {
        let clock = test_clock_at(chrono::Utc::now());
        let provider = Arc::new(FakeProvider::new("fake").with_models(vec!["fake-model".to_string()]));
        provider.queue_stream(
            vec!["Hello".to_string(), " World".to_string()],
            CompletionResponse {
                content: "Hello World".to_string(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
                model_used: "fake-model".to_string(),
                duration: StdDuration::from_millis(5),
                rate_limit: None,
            },
        );
        let engine = engine_with_provider(provider, clock.clone());
        let skill = one_phase_skill();

        let mut collected = Vec::new();
        let mut sink = |chunk: &str| -> Result<(), EngineError> {
            collected.push(chunk.to_string());
            Ok(())
        };
        let options = ExecutionOptions { stream: true, ..Default::default() };
        let output = engine.run(&skill, "hi", RoutingProfile::Cheap, options, Some(&mut sink)).await.unwrap();

        assert_eq!(collected, vec!["Hello".to_string(), " World".to_string()]);
        assert_eq!(output.primary_output, "Hello World");
        assert_eq!(output.totals.input_tokens, 10);
        assert_eq!(output.totals.output_tokens, 5);
    }

    #[tokio::test]
    async fn budget_exhaustion_fails_the_execution() {
        let clock = test_clock_at(chrono::Utc::now());
        let provider = Arc::new(FakeProvider::new("fake").with_models(vec!["fake-model".to_string()]));
        provider.queue_completion(CompletionResponse {
            content: "too much".to_string(),
            input_tokens: 1_000,
            output_tokens: 1_000,
            finish_reason: FinishReason::Stop,
            model_used: "fake-model".to_string(),
            duration: StdDuration::ZERO,
            rate_limit: None,
        });
        let engine = engine_with_provider(provider, clock.clone());
        let skill = one_phase_skill();

        let options = ExecutionOptions { token_budget: Some(100), ..Default::default() };
        let err = engine.run(&skill, "hi", RoutingProfile::Cheap, options, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Budget);
    }

    #[tokio::test]
    async fn cancellation_yields_cancelled_kind_and_leaves_checkpoint_resumable() {
        let clock = test_clock_at(chrono::Utc::now());
        let provider = Arc::new(FakeProvider::new("fake").with_models(vec!["fake-model".to_string()]));
        let engine = engine_with_provider(provider, clock.clone());
        let skill = one_phase_skill();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = ExecutionOptions { cancel, ..Default::default() };
        let err = engine.run(&skill, "hi", RoutingProfile::Cheap, options, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);

        let input_hash = hash_input("hi");
        let resumable = engine
            .checkpoints
            .get_latest_in_progress(&skill.id, &input_hash)
            .unwrap()
            .expect("cancellation should leave the checkpoint in_progress, not failed");
        assert_eq!(resumable.status, CheckpointStatus::InProgress);
    }

    #[tokio::test]
    async fn resume_picks_up_after_the_last_completed_phase() {
        let clock = test_clock_at(chrono::Utc::now());
        let provider = Arc::new(FakeProvider::new("fake").with_models(vec!["fake-model".to_string()]));
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider.clone()).unwrap();
        let cache = Arc::new(ResponseCache::open_in_memory(1_000_000, 1_000_000, StdDuration::from_secs(3600), clock.clone() as Arc<dyn Clock>).unwrap());
        let checkpoints = Arc::new(CheckpointStore::open_in_memory(clock.clone() as Arc<dyn Clock>).unwrap());
        let metrics = Arc::new(MetricsSink::open_in_memory().unwrap());

        let skill = Skill::new(
            "two-phase",
            "Two Phase",
            vec![
                Phase::new("draft", "Draft", "draft {{_input}}").with_model_hint("fake-model"),
                Phase::new("polish", "Polish", "polish {{draft}}").with_model_hint("fake-model"),
            ],
        );

        // Seed a checkpoint as if the process crashed right after "draft"
        // completed, so resume should only invoke the provider for "polish".
        let input_hash = hash_input("topic");
        let mut crashed = WorkflowCheckpoint::new(
            "ckpt-crashed",
            "exec-crashed",
            "two-phase",
            "Two Phase",
            "topic",
            input_hash,
            2,
            "test-machine",
            clock.now(),
        );
        crashed.completed_batch = 0;
        crashed.phase_outputs.insert("draft".to_string(), "drafted text".to_string());
        crashed.phase_results.insert(
            "draft".to_string(),
            PhaseResultData {
                phase_id: "draft".to_string(),
                phase_name: "Draft".to_string(),
                status: "completed".to_string(),
                output: "drafted text".to_string(),
                input_tokens: 10,
                output_tokens: 5,
                model_used: "fake-model".to_string(),
                cache_hit: false,
            },
        );
        checkpoints.create(&crashed).unwrap();

        let engine = SkillExecutionEngine::new(registry, cache, checkpoints.clone(), metrics, clock.clone(), "test-machine");
        let resumed = engine.run(&skill, "topic", RoutingProfile::Cheap, ExecutionOptions::default(), None).await.unwrap();

        assert_eq!(provider.complete_call_count(), 1, "only the unfinished phase should invoke the provider");
        assert_eq!(resumed.execution_id, "exec-crashed");
        assert_eq!(resumed.per_phase_outputs.get("draft").unwrap(), "drafted text");
        assert!(resumed.per_phase_outputs.contains_key("polish"));
        assert!(checkpoints.get_by_execution("exec-crashed").unwrap().is_empty(), "completed checkpoint should be deleted by default");
    }

    #[tokio::test]
    async fn force_fresh_bypasses_cache_and_resume() {
        let clock = test_clock_at(chrono::Utc::now());
        let provider = Arc::new(FakeProvider::new("fake").with_models(vec!["fake-model".to_string()]));
        let engine = engine_with_provider(provider.clone(), clock.clone());
        let skill = one_phase_skill();

        engine.run(&skill, "same input", RoutingProfile::Cheap, ExecutionOptions::default(), None).await.unwrap();
        let options = ExecutionOptions { force_fresh: true, ..Default::default() };
        engine.run(&skill, "same input", RoutingProfile::Cheap, options, None).await.unwrap();

        assert_eq!(provider.complete_call_count(), 2, "force_fresh should skip the cache hit");
    }

    #[tokio::test]
    async fn empty_skill_is_a_validation_error() {
        let clock = test_clock_at(chrono::Utc::now());
        let provider = Arc::new(FakeProvider::new("fake"));
        let engine = engine_with_provider(provider, clock);
        let skill = Skill::new("empty", "Empty", vec![]);
        let err = engine.run(&skill, "x", RoutingProfile::Cheap, ExecutionOptions::default(), None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
