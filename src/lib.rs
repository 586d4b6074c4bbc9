//! # Parley
//!
//! Turn-based multi-agent conversation orchestration - the round table.
//!
//! Several specialised agents take turns contributing to one shared
//! transcript until a pluggable termination strategy says the task is done.
//! Progress is delivered as a lazy stream of turns.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ORCHESTRATOR                             │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ TurnSelector │──▶│    Agent     │──▶│ Transcript (append)  │  │
//! │  └──────▲───────┘   └──────┬───────┘   └──────────┬───────────┘  │
//! │         │                  │ Responder            │              │
//! │         │                  ▼                      ▼              │
//! │         │           ┌──────────────┐   ┌──────────────────────┐  │
//! │         └───────────│  continue?   │◀──│ TerminationStrategy  │  │
//! │                     └──────────────┘   └──────────────────────┘  │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 ▼
//!                     Stream<Item = TurnRecord>
//! ```
//!
//! ## Key Concepts
//!
//! - **Agent**: a named persona bound to a [`Responder`]
//! - **Transcript**: append-only ordered record of turns
//! - **TurnSelector**: picks who speaks next
//! - **TerminationStrategy**: decides when the session is complete
//! - **Session**: one run from `Idle` to `Completed` or `Aborted`
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use parley::{Agent, CompletionKeyword, Orchestrator, ScriptedResponder};
//!
//! # async fn run() -> Result<(), parley::ParleyError> {
//! let backend = Arc::new(ScriptedResponder::replies(["Plan ready.", "Facts found.", "DONE"]));
//! let mut orchestrator = Orchestrator::builder()
//!     .agent(Agent::new("planner", "You break tasks down.", backend.clone()))
//!     .agent(Agent::new("researcher", "You find facts.", backend.clone()))
//!     .agent(Agent::new("editor", "You summarise and say DONE.", backend))
//!     .termination(CompletionKeyword::new("DONE")?)
//!     .initial_message("Write a summary.")
//!     .build()?;
//!
//! let mut turns = Box::pin(orchestrator.turns());
//! while let Some(turn) = turns.next().await {
//!     println!("{}: {}", turn.speaker_id, turn.content);
//! }
//! drop(turns);
//!
//! let result = orchestrator.finish();
//! assert!(result.is_completed());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod display;
pub mod error;
pub mod ids;
pub mod orchestrator;
pub mod responder;
pub mod retry;
pub mod selector;
pub mod session;
pub mod single;
pub mod termination;
pub mod transcript;

pub use agent::{Agent, AgentHandle};
pub use config::{AgentSpec, ConfigLoader, SelectorConfig, SessionConfig, TerminationConfig};
pub use error::{AbortReason, ParleyError, ResponderError, ResponderFailureKind};
pub use ids::{AgentId, SessionId, USER_SPEAKER};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, TurnRecord};
pub use responder::{FnResponder, Reply, Responder, Scripted, ScriptedResponder};
pub use retry::RetryPolicy;
pub use selector::{ChainSelector, ContentDrivenSelector, FixedSelector, RoundRobinSelector, TurnSelector};
pub use session::{Session, SessionResult, SessionStatus};
pub use single::SingleAgentSession;
pub use termination::{AnyOf, CloseSignal, CompletionKeyword, MaxRounds, NoProgress, TerminationStrategy};
pub use transcript::{Transcript, TranscriptSnapshot, Turn};

// Cancellation tokens are part of the public API
pub use tokio_util::sync::CancellationToken;
