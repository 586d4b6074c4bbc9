//! Agent implementation - a named persona bound to a responder

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::ResponderError;
use crate::ids::AgentId;
use crate::responder::{Reply, Responder};
use crate::transcript::TranscriptSnapshot;

/// A single conversational participant.
///
/// Immutable once built. The responder is shared, not owned: several agents
/// usually point at the same backend with different personas.
pub struct Agent {
    /// Unique identifier within a session
    pub id: AgentId,
    /// Instruction text defining the agent's role
    pub persona: String,
    responder: Arc<dyn Responder>,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        id: impl Into<AgentId>,
        persona: impl Into<String>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            id: id.into(),
            persona: persona.into(),
            responder,
        }
    }

    /// Ask the responder for this agent's next contribution.
    ///
    /// Blank output is reported as [`ResponderError::InvalidOutput`]; the
    /// returned content is trimmed.
    #[instrument(skip(self, transcript), fields(agent_id = %self.id, turns = transcript.len()))]
    pub async fn respond(&self, transcript: &TranscriptSnapshot) -> Result<Reply, ResponderError> {
        let mut reply = self.responder.respond(&self.persona, transcript).await?;

        let trimmed = reply.content.trim();
        if trimmed.is_empty() {
            return Err(ResponderError::InvalidOutput(format!(
                "{} produced an empty message",
                self.id
            )));
        }
        if trimmed.len() != reply.content.len() {
            reply.content = trimmed.to_string();
        }

        debug!(chars = reply.content.len(), "Agent responded");
        Ok(reply)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("persona", &self.persona)
            .finish_non_exhaustive()
    }
}

/// Cheaply clonable handle to an agent
#[derive(Clone, Debug)]
pub struct AgentHandle {
    inner: Arc<Agent>,
}

impl AgentHandle {
    pub fn new(agent: Agent) -> Self {
        Self {
            inner: Arc::new(agent),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.inner.id
    }

    pub fn inner(&self) -> &Agent {
        &self.inner
    }
}

impl From<Agent> for AgentHandle {
    fn from(agent: Agent) -> Self {
        Self::new(agent)
    }
}

impl std::ops::Deref for AgentHandle {
    type Target = Agent;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::{FnResponder, ScriptedResponder};

    fn create_test_agent(responder: Arc<dyn Responder>) -> Agent {
        Agent::new("planner", "You are the facilitator.", responder)
    }

    #[tokio::test]
    async fn test_agent_trims_reply() {
        let agent = create_test_agent(Arc::new(ScriptedResponder::replies(["  step one \n"])));
        let reply = agent.respond(&TranscriptSnapshot::default()).await.unwrap();
        assert_eq!(reply.content, "step one");
    }

    #[tokio::test]
    async fn test_agent_rejects_blank_reply() {
        let agent = create_test_agent(Arc::new(ScriptedResponder::replies(["   "])));
        let err = agent.respond(&TranscriptSnapshot::default()).await.unwrap_err();
        assert!(matches!(err, ResponderError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn test_agent_passes_persona() {
        let responder = FnResponder::new(|persona: &str, _: &TranscriptSnapshot| {
            Ok(Reply::new(persona.to_uppercase()))
        });
        let agent = create_test_agent(Arc::new(responder));
        let reply = agent.respond(&TranscriptSnapshot::default()).await.unwrap();
        assert_eq!(reply.content, "YOU ARE THE FACILITATOR.");
    }

    #[test]
    fn test_handle_derefs_to_agent() {
        let handle = AgentHandle::new(create_test_agent(Arc::new(ScriptedResponder::replies(
            Vec::<String>::new(),
        ))));
        assert_eq!(handle.id().as_str(), "planner");
        assert_eq!(handle.persona, "You are the facilitator.");
    }
}
