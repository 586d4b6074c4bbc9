//! Termination strategies - when is the conversation finished
//!
//! Strategies are asked strictly after a turn has been appended, so a
//! session always produces at least one agent turn before it can stop.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::ParleyError;
use crate::transcript::Turn;

/// Decides after each turn whether the session is complete
pub trait TerminationStrategy: Send {
    fn name(&self) -> &'static str;

    /// `round_count` is the number of agent turns produced so far
    fn should_stop(&mut self, transcript: &[Turn], round_count: usize) -> bool;
}

impl<T: TerminationStrategy + ?Sized> TerminationStrategy for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn should_stop(&mut self, transcript: &[Turn], round_count: usize) -> bool {
        (**self).should_stop(transcript, round_count)
    }
}

/// Stop once a fixed number of agent turns has been produced
#[derive(Debug, Clone, Copy)]
pub struct MaxRounds {
    max: usize,
}

impl MaxRounds {
    pub fn new(max: usize) -> Result<Self, ParleyError> {
        if max == 0 {
            return Err(ParleyError::InvalidConfiguration(
                "max_rounds must be at least 1".into(),
            ));
        }
        Ok(Self { max })
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl TerminationStrategy for MaxRounds {
    fn name(&self) -> &'static str {
        "max_rounds"
    }

    fn should_stop(&mut self, _transcript: &[Turn], round_count: usize) -> bool {
        round_count >= self.max
    }
}

/// Stop when the latest turn contains a sentinel, ignoring case
#[derive(Debug, Clone)]
pub struct CompletionKeyword {
    keyword: String,
}

impl CompletionKeyword {
    pub fn new(keyword: impl Into<String>) -> Result<Self, ParleyError> {
        let keyword = keyword.into();
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ParleyError::InvalidConfiguration(
                "completion keyword must not be empty".into(),
            ));
        }
        Ok(Self {
            keyword: keyword.to_lowercase(),
        })
    }
}

impl TerminationStrategy for CompletionKeyword {
    fn name(&self) -> &'static str {
        "completion_keyword"
    }

    fn should_stop(&mut self, transcript: &[Turn], _round_count: usize) -> bool {
        transcript
            .last()
            .is_some_and(|t| t.content.to_lowercase().contains(&self.keyword))
    }
}

/// Word-set Jaccard similarity; words shorter than 3 characters are ignored.
///
/// When either text has no significant words the normalized whole strings
/// are compared instead: 1.0 if equal, 0.0 otherwise.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    fn words(text: &str) -> HashSet<String> {
        text.split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| w.chars().count() > 2)
            .collect()
    }

    fn normalized(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    let wa = words(a);
    let wb = words(b);
    if wa.is_empty() || wb.is_empty() {
        return if normalized(a) == normalized(b) { 1.0 } else { 0.0 };
    }

    let intersection = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    intersection as f64 / union as f64
}

/// Stop when the last `window` turns are near-duplicates of each other.
///
/// Guards against agents repeating themselves without ever hitting a round
/// limit.
#[derive(Debug, Clone, Copy)]
pub struct NoProgress {
    window: usize,
    threshold: f64,
}

impl NoProgress {
    pub fn new(window: usize, threshold: f64) -> Result<Self, ParleyError> {
        if window < 2 {
            return Err(ParleyError::InvalidConfiguration(
                "no_progress window must cover at least 2 turns".into(),
            ));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ParleyError::InvalidConfiguration(format!(
                "no_progress threshold {threshold} outside 0.0..=1.0"
            )));
        }
        Ok(Self { window, threshold })
    }
}

impl TerminationStrategy for NoProgress {
    fn name(&self) -> &'static str {
        "no_progress"
    }

    fn should_stop(&mut self, transcript: &[Turn], _round_count: usize) -> bool {
        if transcript.len() < self.window {
            return false;
        }

        let recent = &transcript[transcript.len() - self.window..];
        let stalled = recent.iter().enumerate().all(|(i, a)| {
            recent[i + 1..]
                .iter()
                .all(|b| jaccard_similarity(&a.content, &b.content) >= self.threshold)
        });

        if stalled {
            debug!(window = self.window, "Recent turns are near-duplicates");
        }
        stalled
    }
}

/// Stops as soon as any member strategy fires.
///
/// Every member is evaluated on each call so stateful members see every turn.
pub struct AnyOf {
    strategies: Vec<Box<dyn TerminationStrategy>>,
}

impl AnyOf {
    pub fn new(strategies: Vec<Box<dyn TerminationStrategy>>) -> Result<Self, ParleyError> {
        if strategies.is_empty() {
            return Err(ParleyError::InvalidConfiguration(
                "composite termination needs at least one strategy".into(),
            ));
        }
        Ok(Self { strategies })
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl TerminationStrategy for AnyOf {
    fn name(&self) -> &'static str {
        "any_of"
    }

    fn should_stop(&mut self, transcript: &[Turn], round_count: usize) -> bool {
        let mut fired = false;
        for strategy in &mut self.strategies {
            if strategy.should_stop(transcript, round_count) {
                debug!(strategy = strategy.name(), "Termination strategy fired");
                fired = true;
            }
        }
        fired
    }
}

/// Caller-driven stop flag.
///
/// Clones share the flag: hand one to the orchestrator and keep one to call
/// [`CloseSignal::close`].
#[derive(Debug, Clone, Default)]
pub struct CloseSignal {
    closed: Arc<AtomicBool>,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TerminationStrategy for CloseSignal {
    fn name(&self) -> &'static str {
        "close_signal"
    }

    fn should_stop(&mut self, _transcript: &[Turn], _round_count: usize) -> bool {
        self.is_closed()
    }
}
