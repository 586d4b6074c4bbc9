//! Append-only conversation log

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, USER_SPEAKER};

/// One contribution to the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker_id: String,
    pub content: String,
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    /// Structured hand-off hint supplied by the responder, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_next: Option<AgentId>,
}

impl Turn {
    pub fn is_from(&self, speaker: &str) -> bool {
        self.speaker_id == speaker
    }
}

/// Read-only, prefix-consistent view of a transcript.
///
/// Cloning is cheap; the turns are shared.
#[derive(Debug, Clone)]
pub struct TranscriptSnapshot(Arc<[Turn]>);

impl Default for TranscriptSnapshot {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl TranscriptSnapshot {
    pub fn turns(&self) -> &[Turn] {
        &self.0
    }
}

impl Deref for TranscriptSnapshot {
    type Target = [Turn];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Ordered log of turns.
///
/// Only the orchestrator holds a `Transcript` mutably; everything else
/// receives slices or [`TranscriptSnapshot`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, assigning the next sequence number
    pub(crate) fn append(
        &mut self,
        speaker_id: impl Into<String>,
        content: impl Into<String>,
        suggested_next: Option<AgentId>,
    ) -> &Turn {
        let turn = Turn {
            speaker_id: speaker_id.into(),
            content: content.into(),
            sequence_number: self.next_sequence(),
            timestamp: Utc::now(),
            suggested_next,
        };
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn next_sequence(&self) -> u64 {
        self.turns.len() as u64
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns whose speaker is not the caller
    pub fn agent_turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| !t.is_from(USER_SPEAKER))
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot(Arc::from(self.turns.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers_have_no_gaps() {
        let mut transcript = Transcript::new();
        transcript.append("user", "hello", None);
        transcript.append("planner", "plan", None);
        transcript.append("editor", "edit", None);

        let seqs: Vec<u64> = transcript.turns().iter().map(|t| t.sequence_number).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_appends() {
        let mut transcript = Transcript::new();
        transcript.append("planner", "first", None);
        let snapshot = transcript.snapshot();
        transcript.append("editor", "second", None);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_agent_turns_skip_user() {
        let mut transcript = Transcript::new();
        transcript.append("user", "seed", None);
        transcript.append("planner", "plan", None);
        assert_eq!(transcript.agent_turns().count(), 1);
    }
}
