//! The graph runtime: drives an investigation from start to verdict.
//!
//! The loop is flat: consult the router, execute the selected node, merge its
//! update, repeat. Two global budgets bound the loop — a recursion budget on
//! node executions and a wall-clock budget — and exhausting either forces a
//! single summary pass followed by completion. Nodes never raise; the only
//! errors that escape [`Engine::run`] are invariant violations.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::EngineConfig;
use crate::domains::{standard_agents, DomainAgent, DomainKind};
use crate::error::{ErrorRecord, Result, RuntimeError};
use crate::llm::LlmClient;
use crate::message::Message;
use crate::orchestrator::OrchestratorAgent;
use crate::phase::Phase;
use crate::router::{self, NextNode};
use crate::state::{
    EntityType, InvestigationState, MessageJournal, RoutingDecision, StateStore, StateUpdate,
};
use crate::summary::{self, SummaryOutcome};
use crate::tool::{ToolContext, ToolExecutor, ToolRegistry};

/// Request to open an investigation.
#[derive(Debug, Clone)]
pub struct InvestigationRequest {
    /// Kind of the subject.
    pub entity_type: EntityType,
    /// Identifier of the subject.
    pub entity_id: String,
    /// Lookback window in days.
    pub date_range_days: u32,
    /// Optional user focus instruction.
    pub custom_user_prompt: Option<String>,
}

impl InvestigationRequest {
    /// A request with no custom prompt.
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>, date_range_days: u32) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            date_range_days,
            custom_user_prompt: None,
        }
    }

    /// Attach a user focus instruction.
    #[must_use]
    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_user_prompt = Some(prompt.into());
        self
    }
}

/// The final product of an investigation.
#[derive(Debug, Clone)]
pub struct InvestigationReport {
    /// Final state, including findings, errors, and the routing audit.
    pub state: InvestigationState,
    /// The synthesised verdict.
    pub outcome: SummaryOutcome,
}

impl InvestigationReport {
    /// Whether the investigation recorded any fatal error.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.state.errors.iter().any(|e| e.fatal)
    }
}

/// Cooperative cancellation handle for one investigation.
///
/// Triggering it cancels pending tool work, records a fatal error, and moves
/// the investigation to its summary.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// A fresh, untriggered token.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger cancellation.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The investigation engine: runtime, orchestrator, tools, and agents wired
/// together over one configuration.
pub struct Engine {
    llm: Arc<dyn LlmClient>,
    orchestrator: OrchestratorAgent,
    executor: ToolExecutor,
    agents: BTreeMap<DomainKind, Box<dyn DomainAgent>>,
    config: EngineConfig,
}

impl Engine {
    /// Assemble an engine from its injected services.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, registry: ToolRegistry, config: EngineConfig) -> Self {
        let orchestrator =
            OrchestratorAgent::new(Arc::clone(&llm), registry.definitions(), config.clone());
        let executor = ToolExecutor::new(registry, config.tool_timeout);
        let agents = standard_agents()
            .into_iter()
            .map(|a| (a.kind(), a))
            .collect();
        Self {
            llm,
            orchestrator,
            executor,
            agents,
            config,
        }
    }

    /// Replace the domain agent set.
    #[must_use]
    pub fn with_agents(mut self, agents: Vec<Box<dyn DomainAgent>>) -> Self {
        self.agents = agents.into_iter().map(|a| (a.kind(), a)).collect();
        self
    }

    /// Run an investigation to completion.
    ///
    /// # Errors
    ///
    /// Only invariant violations (programmer errors) surface here; every
    /// model, tool, and budget failure is folded into the report.
    pub async fn run(&self, request: InvestigationRequest) -> Result<InvestigationReport> {
        self.run_with_cancel(request, &CancelToken::new()).await
    }

    /// Run an investigation under an external cancellation token.
    ///
    /// # Errors
    ///
    /// See [`Engine::run`].
    pub async fn run_with_cancel(
        &self,
        request: InvestigationRequest,
        cancel: &CancelToken,
    ) -> Result<InvestigationReport> {
        let mut state = InvestigationState::new(
            request.entity_type,
            request.entity_id,
            request.date_range_days,
        );
        if let Some(prompt) = request.custom_user_prompt {
            state = state.with_custom_prompt(prompt);
        }

        let span = info_span!(
            "investigation",
            investigation.id = %state.investigation_id,
            investigation.entity_type = %state.entity_type,
            investigation.entity_id = %state.entity_id,
            investigation.loops = tracing::field::Empty,
            investigation.risk = tracing::field::Empty,
        );

        self.run_inner(state, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        state: InvestigationState,
        cancel: &CancelToken,
    ) -> Result<InvestigationReport> {
        let store = StateStore::new(state);
        let journal = self.open_journal(&store).await;

        let started = Instant::now();
        let budget = Duration::from_secs(self.config.limits.wall_clock_secs);
        let deadline = started + budget;
        let mut warned_deadlock = false;
        let mut executions: u32 = 0;

        let tool_ctx = ToolContext::new(Some(deadline), cancel.subscribe());

        loop {
            // Wall-clock budget, with a deadlock warning at 80%.
            let elapsed = started.elapsed();
            if !warned_deadlock && elapsed > budget.mul_f64(0.8) {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "Investigation nearing its wall-clock budget",
                );
                warned_deadlock = true;
            }
            if elapsed >= budget {
                self.append_safety_error(
                    &store,
                    RuntimeError::Timeout(self.config.limits.wall_clock_secs),
                )
                .await?;
                break;
            }

            // Recursion budget on node executions.
            if executions >= self.config.limits.recursion_budget {
                self.append_safety_error(
                    &store,
                    RuntimeError::RecursionLimit(executions),
                )
                .await?;
                break;
            }

            if cancel.is_cancelled() {
                self.append_safety_error(
                    &store,
                    RuntimeError::Cancelled("cancellation token triggered".to_owned()),
                )
                .await?;
                break;
            }

            let snapshot = store.snapshot().await;
            let verdict = router::route(&snapshot, &self.config.limits);
            store
                .append_routing(RoutingDecision {
                    rule: verdict.rule,
                    target: verdict.node.name(),
                    reason: verdict.reason.clone(),
                    phase: snapshot.current_phase,
                    orchestrator_loops: snapshot.orchestrator_loops,
                    at: Utc::now(),
                })
                .await?;
            debug!(
                rule = verdict.rule,
                target = %verdict.node.name(),
                reason = %verdict.reason,
                "Routing decision",
            );

            match verdict.node {
                NextNode::End => break,
                NextNode::Summary => {
                    // Rule 1 is the recursion safety valve; its firing is a
                    // recorded termination, not a normal phase exit.
                    if verdict.rule == 1 {
                        self.append_safety_error(
                            &store,
                            RuntimeError::RecursionLimit(snapshot.orchestrator_loops),
                        )
                        .await?;
                    }
                    break;
                }
                NextNode::Orchestrator => {
                    executions += 1;
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let driven =
                        tokio::time::timeout(remaining, self.orchestrator.drive(&snapshot)).await;
                    let mut update = match driven {
                        Ok(update) => update,
                        Err(_) => {
                            self.append_safety_error(
                                &store,
                                RuntimeError::Timeout(self.config.limits.wall_clock_secs),
                            )
                            .await?;
                            break;
                        }
                    };
                    update.orchestrator_loop_increment = 1;
                    let fatal = update.errors.iter().any(|e| e.fatal);
                    self.apply(&store, journal.as_ref(), update).await?;
                    if fatal {
                        break;
                    }
                }
                NextNode::Tools => {
                    executions += 1;
                    let answered: BTreeSet<String> = snapshot
                        .messages
                        .iter()
                        .filter_map(|m| match m {
                            Message::Tool { call_id, .. } => Some(call_id.clone()),
                            _ => None,
                        })
                        .collect();
                    let calls: Vec<_> = snapshot
                        .unresolved_tool_calls()
                        .into_iter()
                        .cloned()
                        .collect();
                    let update = self.executor.execute_turn(&calls, &answered, &tool_ctx).await;
                    self.apply(&store, journal.as_ref(), update).await?;
                }
                NextNode::Domain(kind) => {
                    executions += 1;
                    let update = match self.agents.get(&kind) {
                        Some(agent) => {
                            let finding = agent.analyse(&snapshot).await;
                            info!(
                                domain = %kind,
                                risk = finding.risk_score,
                                confidence = finding.confidence,
                                "Domain analysis complete",
                            );
                            StateUpdate::empty().with_domain_finding(kind, finding)
                        }
                        None => {
                            // A missing agent must not wedge the phase;
                            // record the failure and count the domain done.
                            warn!(domain = %kind, "No agent registered for domain");
                            StateUpdate::empty()
                                .with_error(ErrorRecord::new(
                                    "runtime.invariant",
                                    format!("no agent registered for domain {kind}"),
                                    snapshot.current_phase,
                                ))
                                .with_domain_finding(
                                    kind,
                                    crate::state::DomainFinding::new(
                                        0.0,
                                        0.0,
                                        Vec::new(),
                                        serde_json::Value::Null,
                                    ),
                                )
                        }
                    };
                    self.apply(&store, journal.as_ref(), update).await?;
                }
            }
        }

        self.finish(&store, journal.as_ref()).await
    }

    /// Append messages to the journal (best effort) and merge the update.
    async fn apply(
        &self,
        store: &StateStore,
        journal: Option<&MessageJournal>,
        update: StateUpdate,
    ) -> Result<()> {
        if let Some(journal) = journal {
            for message in &update.messages {
                if let Err(err) = journal.append(message).await {
                    warn!(error = %err, "Journal append failed");
                }
            }
        }
        store.apply(update).await?;
        Ok(())
    }

    /// Record a safety termination.
    async fn append_safety_error(&self, store: &StateStore, err: RuntimeError) -> Result<()> {
        warn!(error = %err, kind = err.kind(), "Safety termination");
        let phase = store.snapshot().await.current_phase;
        store
            .append_error(ErrorRecord::fatal(err.kind(), err.to_string(), phase))
            .await?;
        Ok(())
    }

    /// The summary path: mark skipped phases, synthesise the verdict, close
    /// the phase machine, and finalise timing.
    async fn finish(
        &self,
        store: &StateStore,
        journal: Option<&MessageJournal>,
    ) -> Result<InvestigationReport> {
        let snapshot = store.snapshot().await;

        if snapshot.current_phase != Phase::Complete {
            // Phases jumped over on the way to the summary are recorded so a
            // reader can tell a forced termination from a full pass.
            let skipped: Vec<Phase> = Phase::ORDER
                .iter()
                .copied()
                .filter(|p| *p > snapshot.current_phase && *p < Phase::Summary)
                .collect();

            let outcome = summary::synthesise(&snapshot, self.llm.as_ref(), &self.config).await;

            let mut update = StateUpdate::empty();
            if snapshot.current_phase < Phase::Summary {
                update.set_phase = Some(Phase::Summary);
            }
            update.skipped_phases = skipped;
            update.risk_score = Some(outcome.risk_score);
            update.confidence_score = Some(outcome.confidence_score);
            update.messages.push(Message::ai(format!(
                "Final assessment: risk {:.2} ({}), confidence {:.2}. {}",
                outcome.risk_score, outcome.risk_level, outcome.confidence_score, outcome.reasoning
            )));
            self.apply(store, journal, update).await?;

            store
                .apply(StateUpdate::empty().with_phase(Phase::Complete))
                .await?;

            let state = store.finalise_timing().await;
            let span = tracing::Span::current();
            span.record("investigation.loops", state.orchestrator_loops);
            span.record("investigation.risk", outcome.risk_score);
            info!(
                risk = outcome.risk_score,
                level = %outcome.risk_level,
                confidence = outcome.confidence_score,
                loops = state.orchestrator_loops,
                duration_ms = state.total_duration_ms,
                "Investigation complete",
            );
            return Ok(InvestigationReport { state, outcome });
        }

        // Already terminal: only timing finalisation remains.
        let state = store.finalise_timing().await;
        let outcome = summary::synthesise(&state, self.llm.as_ref(), &self.config).await;
        Ok(InvestigationReport { state, outcome })
    }

    async fn open_journal(&self, store: &StateStore) -> Option<MessageJournal> {
        let dir = self.config.journal_dir.as_ref()?;
        let id = store.snapshot().await.investigation_id;
        match MessageJournal::open(dir, id).await {
            Ok(journal) => Some(journal),
            Err(err) => {
                warn!(error = %err, "Journal unavailable; continuing without");
                None
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .field("mode", &self.config.mode)
            .finish_non_exhaustive()
    }
}
