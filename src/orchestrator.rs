//! Main orchestrator - drives agents through a shared transcript
//!
//! ```text
//!   Idle ──first step──▶ Running ──should_stop──▶ Completed
//!                           │
//!                           └──selection / responder failure,
//!                              safety ceiling, cancellation──▶ Aborted
//! ```
//!
//! Each step selects a speaker, invokes it (with retry and timeout), appends
//! the reply, then asks the termination strategy. Steps are exposed as a lazy
//! [`Stream`] of [`TurnRecord`]s.

use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agent::{Agent, AgentHandle};
use crate::error::{AbortReason, ParleyError, ResponderError};
use crate::ids::{AgentId, SessionId};
use crate::responder::Reply;
use crate::retry::RetryPolicy;
use crate::selector::{RoundRobinSelector, TurnSelector};
use crate::session::{Session, SessionResult, SessionStatus};
use crate::termination::TerminationStrategy;
use crate::transcript::{TranscriptSnapshot, Turn};

/// Safety ceiling used when the caller does not set one
pub const DEFAULT_MAX_TOTAL_ITERATIONS: usize = 50;

/// Per-call responder timeout used when the caller does not set one
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(120);

/// One element of the turn stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker_id: String,
    pub content: String,
    pub sequence_number: u64,
    /// True when this turn moved the session into a terminal status
    pub is_final: bool,
}

impl TurnRecord {
    fn from_turn(turn: &Turn) -> Self {
        Self {
            speaker_id: turn.speaker_id.clone(),
            content: turn.content.clone(),
            sequence_number: turn.sequence_number,
            is_final: false,
        }
    }
}

/// Builder for [`Orchestrator`]; all validation happens in [`build`](Self::build)
pub struct OrchestratorBuilder {
    agents: Vec<AgentHandle>,
    selector: Option<Box<dyn TurnSelector>>,
    termination: Option<Box<dyn TerminationStrategy>>,
    max_total_iterations: usize,
    initial_message: Option<String>,
    retry: RetryPolicy,
    turn_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            selector: None,
            termination: None,
            max_total_iterations: DEFAULT_MAX_TOTAL_ITERATIONS,
            initial_message: None,
            retry: RetryPolicy::default(),
            turn_timeout: Some(DEFAULT_TURN_TIMEOUT),
            cancel: None,
        }
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent; registration order is the round-robin order
    pub fn agent(mut self, agent: impl Into<AgentHandle>) -> Self {
        self.agents.push(agent.into());
        self
    }

    pub fn agents<I>(mut self, agents: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AgentHandle>,
    {
        self.agents.extend(agents.into_iter().map(Into::into));
        self
    }

    /// Defaults to round-robin
    pub fn selector(mut self, selector: impl TurnSelector + 'static) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    pub fn termination(mut self, strategy: impl TerminationStrategy + 'static) -> Self {
        self.termination = Some(Box::new(strategy));
        self
    }

    pub fn max_total_iterations(mut self, limit: usize) -> Self {
        self.max_total_iterations = limit;
        self
    }

    /// Seed message, recorded as turn 0 from the `user` speaker
    pub fn initial_message(mut self, message: impl Into<String>) -> Self {
        self.initial_message = Some(message.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// `None` disables the per-call timeout
    pub fn turn_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Share an existing cancellation token instead of creating one
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<Orchestrator, ParleyError> {
        let termination = self.termination.ok_or_else(|| {
            ParleyError::InvalidConfiguration("a termination strategy is required".into())
        })?;

        if self.max_total_iterations == 0 {
            return Err(ParleyError::InvalidConfiguration(
                "max_total_iterations must be at least 1".into(),
            ));
        }
        if self.turn_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ParleyError::InvalidConfiguration(
                "turn timeout must be greater than zero".into(),
            ));
        }
        self.retry
            .validate()
            .map_err(ParleyError::InvalidConfiguration)?;

        let session = Session::new(self.agents)?;
        let selector: Box<dyn TurnSelector> = match self.selector {
            Some(selector) => selector,
            None => Box::new(RoundRobinSelector::new()),
        };

        debug!(
            session_id = %session.id,
            selector = selector.name(),
            termination = termination.name(),
            max_total_iterations = self.max_total_iterations,
            "Orchestrator configured"
        );

        Ok(Orchestrator {
            session,
            selector,
            termination,
            max_total_iterations: self.max_total_iterations,
            initial_message: self.initial_message.filter(|m| !m.trim().is_empty()),
            retry: self.retry,
            turn_timeout: self.turn_timeout,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// Drives one session from `Idle` to a terminal status.
///
/// Not restartable: once terminal, [`step`](Self::step) yields nothing and a
/// new orchestrator must be built to run again.
pub struct Orchestrator {
    session: Session,
    selector: Box<dyn TurnSelector>,
    termination: Box<dyn TerminationStrategy>,
    max_total_iterations: usize,
    initial_message: Option<String>,
    retry: RetryPolicy,
    turn_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn max_total_iterations(&self) -> usize {
        self.max_total_iterations
    }

    /// Token for cooperative cancellation.
    ///
    /// Checked between turns and between retries, never inside a responder
    /// call.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Lazy stream of turns, one per completed iteration.
    ///
    /// Ends when the session reaches a terminal status. Dropping the stream
    /// early stops the session; [`finish`](Self::finish) then reports it.
    pub fn turns(&mut self) -> impl Stream<Item = TurnRecord> + Send + '_ {
        futures::stream::unfold(self, |this| async move {
            let record = this.step().await?;
            Some((record, this))
        })
    }

    /// Run a single iteration of the loop.
    ///
    /// Returns `None` once the session is terminal, including when this very
    /// call aborted it before a turn was produced.
    #[instrument(skip(self), fields(session_id = %self.session.id))]
    pub async fn step(&mut self) -> Option<TurnRecord> {
        match self.session.status() {
            SessionStatus::Idle => self.start(),
            SessionStatus::Running => {}
            SessionStatus::Completed | SessionStatus::Aborted => return None,
        }

        if self.cancel.is_cancelled() {
            self.session.abort(AbortReason::CancelledByCaller);
            return None;
        }

        let agent_id = match self
            .selector
            .select_next(self.session.agents(), self.session.transcript().turns())
        {
            Ok(id) => id,
            Err(e) => {
                self.session.abort(AbortReason::SelectionFailure {
                    message: e.to_string(),
                });
                return None;
            }
        };

        let Some(agent) = self.session.agent(&agent_id).cloned() else {
            self.session.abort(AbortReason::SelectionFailure {
                message: ParleyError::AgentNotFound(agent_id).to_string(),
            });
            return None;
        };

        let snapshot = self.session.transcript().snapshot();
        let reply = match invoke_with_retry(
            &agent,
            snapshot,
            &self.retry,
            self.turn_timeout,
            &self.cancel,
        )
        .await
        {
            Ok(reply) => reply,
            Err(reason) => {
                self.session.abort(reason);
                return None;
            }
        };

        let mut record = TurnRecord::from_turn(self.session.append_agent(&agent_id, reply));
        let rounds = self.session.round_count();

        info!(
            agent_id = %agent_id,
            sequence = record.sequence_number,
            round = rounds,
            "Turn appended"
        );

        if self
            .termination
            .should_stop(self.session.transcript().turns(), rounds)
        {
            self.session.complete();
        } else if rounds >= self.max_total_iterations {
            self.session.abort(AbortReason::RunawayLoop {
                limit: self.max_total_iterations,
            });
        } else if self.cancel.is_cancelled() {
            self.session.abort(AbortReason::CancelledByCaller);
        }

        record.is_final = self.session.status().is_terminal();
        Some(record)
    }

    /// Drive the session to a terminal status and return the result
    pub async fn collect(mut self) -> SessionResult {
        while self.step().await.is_some() {}
        self.finish()
    }

    /// Consume the orchestrator and report the outcome.
    ///
    /// A session that is still running is evaluated once more against the
    /// termination strategy; if it does not fire, the session counts as
    /// cancelled by the caller.
    pub fn finish(mut self) -> SessionResult {
        if !self.session.status().is_terminal() {
            let rounds = self.session.round_count();
            if rounds > 0
                && self
                    .termination
                    .should_stop(self.session.transcript().turns(), rounds)
            {
                self.session.complete();
            } else {
                self.session.abort(AbortReason::CancelledByCaller);
            }
        }
        self.session.into_result()
    }

    /// Append a caller message between agent turns
    pub(crate) fn push_user_turn(&mut self, content: impl Into<String>) -> Result<(), ParleyError> {
        let status = self.session.status();
        if status.is_terminal() {
            return Err(ParleyError::SessionClosed(status));
        }
        if status == SessionStatus::Idle {
            self.start();
        }
        self.session.append_user(content);
        Ok(())
    }

    fn start(&mut self) {
        self.session.start();
        if let Some(seed) = self.initial_message.take() {
            self.session.append_user(seed);
        }
    }
}

/// Call the agent, retrying failures per `policy`.
///
/// A timeout counts as the responder being unavailable.
async fn invoke_with_retry(
    agent: &Agent,
    snapshot: TranscriptSnapshot,
    policy: &RetryPolicy,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Reply, AbortReason> {
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, agent.respond(&snapshot)).await {
                Ok(result) => result,
                Err(_) => Err(ResponderError::unavailable(format!(
                    "no response within {limit:?}"
                ))),
            },
            None => agent.respond(&snapshot).await,
        };

        let err = match result {
            Ok(reply) => {
                if attempt > 1 {
                    debug!(agent_id = %agent.id, attempt, "Responder succeeded after retry");
                }
                return Ok(reply);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts {
            warn!(
                agent_id = %agent.id,
                attempts = attempt,
                error = %err,
                "Responder retries exhausted"
            );
            return Err(responder_failure(&agent.id, attempt, &err));
        }

        warn!(agent_id = %agent.id, attempt, error = %err, "Responder failed, retrying");

        let delay = policy.delay_for(attempt);
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AbortReason::CancelledByCaller),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(AbortReason::CancelledByCaller);
        }
    }
}

fn responder_failure(agent_id: &AgentId, attempts: usize, err: &ResponderError) -> AbortReason {
    AbortReason::ResponderFailure {
        agent_id: agent_id.clone(),
        kind: err.kind(),
        attempts,
        message: err.to_string(),
    }
}
