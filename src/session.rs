//! Session state for one orchestration run

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::AgentHandle;
use crate::error::{AbortReason, ParleyError};
use crate::ids::{AgentId, SessionId, USER_SPEAKER};
use crate::responder::Reply;
use crate::transcript::{Transcript, Turn};

/// Lifecycle of a session. `Completed` and `Aborted` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        })
    }
}

/// Outcome handed back to the caller once a session is over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub status: SessionStatus,
    /// Set when `status` is `Aborted`
    pub reason: Option<AbortReason>,
    pub transcript: Transcript,
}

impl SessionResult {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Number of turns contributed by agents (the seed and user turns excluded)
    pub fn agent_turn_count(&self) -> usize {
        self.transcript.agent_turns().count()
    }

    /// Content of the last agent turn, if any
    pub fn final_message(&self) -> Option<&str> {
        self.transcript
            .agent_turns()
            .last()
            .map(|t| t.content.as_str())
    }
}

/// The aggregate of agents, transcript and status for one run.
///
/// The session is the only writer of its transcript; it is owned by the
/// orchestrator that drives it.
#[derive(Debug)]
pub struct Session {
    /// Session ID
    pub id: SessionId,
    agents: Vec<AgentHandle>,
    transcript: Transcript,
    status: SessionStatus,
    reason: Option<AbortReason>,
    round_count: usize,
}

impl Session {
    /// Create a new session, rejecting an empty or ambiguous agent set
    pub fn new(agents: Vec<AgentHandle>) -> Result<Self, ParleyError> {
        if agents.is_empty() {
            return Err(ParleyError::NoAgentsConfigured);
        }

        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.id().as_str() == USER_SPEAKER {
                return Err(ParleyError::InvalidConfiguration(format!(
                    "agent id {USER_SPEAKER:?} is reserved for caller turns"
                )));
            }
            if !seen.insert(agent.id().clone()) {
                return Err(ParleyError::DuplicateAgent(agent.id().clone()));
            }
        }

        let id = SessionId::new();
        info!(session_id = %id, agents = agents.len(), "Creating new session");

        Ok(Self {
            id,
            agents,
            transcript: Transcript::new(),
            status: SessionStatus::Idle,
            reason: None,
            round_count: 0,
        })
    }

    pub fn agents(&self) -> &[AgentHandle] {
        &self.agents
    }

    /// Get an agent by ID
    pub fn agent(&self, id: &AgentId) -> Option<&AgentHandle> {
        self.agents.iter().find(|a| a.id() == id)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn reason(&self) -> Option<&AbortReason> {
        self.reason.as_ref()
    }

    /// Agent turns appended so far
    pub fn round_count(&self) -> usize {
        self.round_count
    }

    pub(crate) fn start(&mut self) {
        if self.status == SessionStatus::Idle {
            self.status = SessionStatus::Running;
            info!(session_id = %self.id, "Session running");
        }
    }

    pub(crate) fn append_user(&mut self, content: impl Into<String>) -> &Turn {
        self.transcript.append(USER_SPEAKER, content, None)
    }

    pub(crate) fn append_agent(&mut self, agent_id: &AgentId, reply: Reply) -> &Turn {
        self.round_count += 1;
        self.transcript
            .append(agent_id.as_str(), reply.content, reply.suggested_next)
    }

    pub(crate) fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::Completed;
        info!(
            session_id = %self.id,
            rounds = self.round_count,
            "Session completed"
        );
    }

    pub(crate) fn abort(&mut self, reason: AbortReason) {
        if self.status.is_terminal() {
            return;
        }
        warn!(
            session_id = %self.id,
            rounds = self.round_count,
            reason = %reason,
            "Session aborted"
        );
        self.status = SessionStatus::Aborted;
        self.reason = Some(reason);
    }

    pub(crate) fn into_result(self) -> SessionResult {
        SessionResult {
            session_id: self.id,
            status: self.status,
            reason: self.reason,
            transcript: self.transcript,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::responder::ScriptedResponder;
    use std::sync::Arc;

    fn handle(id: &str) -> AgentHandle {
        let responder = Arc::new(ScriptedResponder::replies(Vec::<String>::new()));
        AgentHandle::new(Agent::new(id, "persona", responder))
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(vec![handle("planner"), handle("editor")]).unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.agents().len(), 2);
        assert!(session.agent(&AgentId::new("editor")).is_some());
    }

    #[test]
    fn test_rejects_empty_and_duplicate_agents() {
        assert!(matches!(
            Session::new(Vec::new()),
            Err(ParleyError::NoAgentsConfigured)
        ));
        assert!(matches!(
            Session::new(vec![handle("planner"), handle("planner")]),
            Err(ParleyError::DuplicateAgent(_))
        ));
        assert!(matches!(
            Session::new(vec![handle("user")]),
            Err(ParleyError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut session = Session::new(vec![handle("planner")]).unwrap();
        session.start();
        session.complete();
        session.abort(AbortReason::CancelledByCaller);

        let result = session.into_result();
        assert_eq!(result.status, SessionStatus::Completed);
        assert!(result.reason.is_none());
    }

    #[test]
    fn test_round_count_tracks_agent_turns_only() {
        let mut session = Session::new(vec![handle("planner")]).unwrap();
        session.append_user("seed");
        session.append_agent(&AgentId::new("planner"), Reply::new("plan"));
        assert_eq!(session.round_count(), 1);
        assert_eq!(session.transcript().len(), 2);
    }
}
