//! Turn selection - who speaks next
//!
//! A [`TurnSelector`] proposes the next speaker from the registered agents and
//! the transcript so far. Selectors never own agents or the transcript; they
//! receive both by reference on every call.

use regex::Regex;
use tracing::{debug, trace};

use crate::agent::AgentHandle;
use crate::error::ParleyError;
use crate::ids::AgentId;
use crate::transcript::Turn;

/// Marker recognised by [`ContentDrivenSelector`] unless configured otherwise
pub const DEFAULT_HANDOFF_MARKER: &str = "NEXT";

/// Policy choosing which agent acts next
pub trait TurnSelector: Send {
    /// Short policy name for logs and errors
    fn name(&self) -> &'static str;

    /// Propose a speaker, or `None` when this policy does not apply
    fn propose(&mut self, agents: &[AgentHandle], transcript: &[Turn]) -> Option<AgentId>;

    /// Pick the next speaker.
    ///
    /// Fails with [`ParleyError::NoAgentsConfigured`] on an empty agent set and
    /// with [`ParleyError::SelectionFailure`] when nothing applicable (or an
    /// unregistered id) is proposed.
    fn select_next(
        &mut self,
        agents: &[AgentHandle],
        transcript: &[Turn],
    ) -> Result<AgentId, ParleyError> {
        if agents.is_empty() {
            return Err(ParleyError::NoAgentsConfigured);
        }

        let id = self.propose(agents, transcript).ok_or_else(|| {
            ParleyError::SelectionFailure(format!("{} proposed no speaker", self.name()))
        })?;

        if !agents.iter().any(|a| a.id() == &id) {
            return Err(ParleyError::SelectionFailure(format!(
                "{} proposed unknown agent {id}",
                self.name()
            )));
        }

        trace!(policy = self.name(), agent_id = %id, "Selected next speaker");
        Ok(id)
    }
}

impl<T: TurnSelector + ?Sized> TurnSelector for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn propose(&mut self, agents: &[AgentHandle], transcript: &[Turn]) -> Option<AgentId> {
        (**self).propose(agents, transcript)
    }

    fn select_next(
        &mut self,
        agents: &[AgentHandle],
        transcript: &[Turn],
    ) -> Result<AgentId, ParleyError> {
        (**self).select_next(agents, transcript)
    }
}

/// Agent after the most recent agent speaker, wrapping; the first agent when
/// no agent has spoken yet.
fn round_robin_next(agents: &[AgentHandle], transcript: &[Turn]) -> Option<AgentId> {
    let first = agents.first()?;

    let last_index = transcript.iter().rev().find_map(|turn| {
        agents
            .iter()
            .position(|a| a.id().as_str() == turn.speaker_id)
    });

    Some(match last_index {
        Some(idx) => agents[(idx + 1) % agents.len()].id().clone(),
        None => first.id().clone(),
    })
}

fn find_agent<'a>(agents: &'a [AgentHandle], name: &str) -> Option<&'a AgentHandle> {
    agents
        .iter()
        .find(|a| a.id().as_str() == name)
        .or_else(|| agents.iter().find(|a| a.id().as_str().eq_ignore_ascii_case(name)))
}

/// Cycles through agents in registration order.
///
/// Stateless: the next speaker is derived from the last agent turn in the
/// transcript, so content never influences the order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinSelector;

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self
    }
}

impl TurnSelector for RoundRobinSelector {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn propose(&mut self, agents: &[AgentHandle], transcript: &[Turn]) -> Option<AgentId> {
        round_robin_next(agents, transcript)
    }
}

/// Follows explicit hand-offs in the last turn, otherwise round-robin.
///
/// The structured `suggested_next` field wins over text markers. Text markers
/// look like `NEXT: editor` (case-insensitive); when several appear the last
/// one counts. Marker parsing is best effort.
#[derive(Debug, Clone)]
pub struct ContentDrivenSelector {
    pattern: Regex,
}

impl ContentDrivenSelector {
    pub fn new() -> Result<Self, ParleyError> {
        Self::with_marker(DEFAULT_HANDOFF_MARKER)
    }

    /// Use a custom marker word instead of `NEXT`
    pub fn with_marker(marker: &str) -> Result<Self, ParleyError> {
        let marker = marker.trim();
        if marker.is_empty() {
            return Err(ParleyError::InvalidConfiguration(
                "hand-off marker must not be empty".into(),
            ));
        }

        let pattern = format!(r"(?i)\b{}\s*:\s*@?([A-Za-z0-9_.\-]+)", regex::escape(marker));
        match Regex::new(&pattern) {
            Ok(pattern) => Ok(Self { pattern }),
            Err(e) => Err(ParleyError::InvalidConfiguration(format!(
                "invalid hand-off marker {marker:?}: {e}"
            ))),
        }
    }

    /// Agent named by the last marker in `content`, if any
    pub fn parse_marker<'a>(&self, content: &'a str) -> Option<&'a str> {
        self.pattern
            .captures_iter(content)
            .last()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches('.'))
    }

    fn handoff(&self, agents: &[AgentHandle], last: &Turn) -> Option<AgentId> {
        if let Some(next) = &last.suggested_next {
            if let Some(agent) = find_agent(agents, next.as_str()) {
                return Some(agent.id().clone());
            }
            debug!(suggested = %next, "Structured hand-off names unknown agent");
        }

        let named = self.parse_marker(&last.content)?;
        match find_agent(agents, named) {
            Some(agent) => Some(agent.id().clone()),
            None => {
                debug!(marker = named, "Hand-off marker names unknown agent");
                None
            }
        }
    }
}

impl TurnSelector for ContentDrivenSelector {
    fn name(&self) -> &'static str {
        "content_driven"
    }

    fn propose(&mut self, agents: &[AgentHandle], transcript: &[Turn]) -> Option<AgentId> {
        transcript
            .last()
            .and_then(|last| self.handoff(agents, last))
            .or_else(|| round_robin_next(agents, transcript))
    }
}

/// Always picks the same agent
#[derive(Debug, Clone)]
pub struct FixedSelector {
    agent: AgentId,
}

impl FixedSelector {
    pub fn new(agent: impl Into<AgentId>) -> Self {
        Self {
            agent: agent.into(),
        }
    }
}

impl TurnSelector for FixedSelector {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn propose(&mut self, _agents: &[AgentHandle], _transcript: &[Turn]) -> Option<AgentId> {
        Some(self.agent.clone())
    }
}

/// Ordered chain of selectors; the first one that proposes a speaker wins
#[derive(Default)]
pub struct ChainSelector {
    selectors: Vec<Box<dyn TurnSelector>>,
}

impl ChainSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, selector: impl TurnSelector + 'static) -> Self {
        self.selectors.push(Box::new(selector));
        self
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

impl TurnSelector for ChainSelector {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn propose(&mut self, agents: &[AgentHandle], transcript: &[Turn]) -> Option<AgentId> {
        self.selectors
            .iter_mut()
            .find_map(|s| s.propose(agents, transcript))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::responder::ScriptedResponder;
    use crate::transcript::Transcript;
    use std::sync::Arc;

    fn agents(names: &[&str]) -> Vec<AgentHandle> {
        let responder = Arc::new(ScriptedResponder::replies(Vec::<String>::new()));
        names
            .iter()
            .map(|n| AgentHandle::new(Agent::new(*n, format!("you are {n}"), responder.clone())))
            .collect()
    }

    /// Selector that never applies
    struct Abstain;

    impl TurnSelector for Abstain {
        fn name(&self) -> &'static str {
            "abstain"
        }

        fn propose(&mut self, _: &[AgentHandle], _: &[Turn]) -> Option<AgentId> {
            None
        }
    }

    #[test]
    fn test_round_robin_cycles_regardless_of_content() {
        let team = agents(&["a", "b", "c"]);
        let mut selector = RoundRobinSelector::new();
        let mut transcript = Transcript::new();
        transcript.append("user", "NEXT: c", None);

        let mut order = Vec::new();
        for _ in 0..6 {
            let next = selector.select_next(&team, transcript.turns()).unwrap();
            transcript.append(next.as_str(), "NEXT: a", None);
            order.push(next.to_string());
        }
        assert_eq!(order, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_empty_agents_fail() {
        let mut selector = RoundRobinSelector::new();
        assert!(matches!(
            selector.select_next(&[], &[]),
            Err(ParleyError::NoAgentsConfigured)
        ));
    }

    #[test]
    fn test_content_driven_follows_marker() {
        let team = agents(&["planner", "researcher", "editor"]);
        let mut selector = ContentDrivenSelector::new().unwrap();
        let mut transcript = Transcript::new();
        transcript.append("planner", "Outline ready. next: Editor", None);

        let next = selector.select_next(&team, transcript.turns()).unwrap();
        assert_eq!(next.as_str(), "editor");
    }

    #[test]
    fn test_content_driven_last_marker_wins() {
        let selector = ContentDrivenSelector::new().unwrap();
        assert_eq!(
            selector.parse_marker("NEXT: researcher ... actually NEXT: editor."),
            Some("editor")
        );
    }

    #[test]
    fn test_content_driven_prefers_structured_handoff() {
        let team = agents(&["planner", "researcher", "editor"]);
        let mut selector = ContentDrivenSelector::new().unwrap();
        let mut transcript = Transcript::new();
        transcript.append("planner", "NEXT: editor", Some(AgentId::new("researcher")));

        let next = selector.select_next(&team, transcript.turns()).unwrap();
        assert_eq!(next.as_str(), "researcher");
    }

    #[test]
    fn test_content_driven_falls_back_on_unknown_agent() {
        let team = agents(&["planner", "researcher", "editor"]);
        let mut selector = ContentDrivenSelector::new().unwrap();
        let mut transcript = Transcript::new();
        transcript.append("planner", "NEXT: lawyer", None);

        let next = selector.select_next(&team, transcript.turns()).unwrap();
        assert_eq!(next.as_str(), "researcher");
    }

    #[test]
    fn test_custom_marker() {
        let selector = ContentDrivenSelector::with_marker("HANDOFF").unwrap();
        assert_eq!(selector.parse_marker("handoff: @editor"), Some("editor"));
        assert!(ContentDrivenSelector::with_marker("  ").is_err());
    }

    #[test]
    fn test_chain_first_applicable_wins() {
        let team = agents(&["a", "b"]);
        let mut chain = ChainSelector::new()
            .then(Abstain)
            .then(FixedSelector::new("b"))
            .then(RoundRobinSelector::new());

        assert_eq!(chain.select_next(&team, &[]).unwrap().as_str(), "b");
    }

    #[test]
    fn test_chain_with_no_applicable_selector_fails() {
        let team = agents(&["a"]);
        let mut chain = ChainSelector::new().then(Abstain);
        assert!(matches!(
            chain.select_next(&team, &[]),
            Err(ParleyError::SelectionFailure(_))
        ));
    }

    #[test]
    fn test_fixed_selector_rejects_unknown_agent() {
        let team = agents(&["a"]);
        let mut selector = FixedSelector::new("ghost");
        assert!(matches!(
            selector.select_next(&team, &[]),
            Err(ParleyError::SelectionFailure(_))
        ));
    }
}
