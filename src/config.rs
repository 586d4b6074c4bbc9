//! Session configuration and multi-source loading

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::Agent;
use crate::error::ParleyError;
use crate::orchestrator::Orchestrator;
use crate::responder::Responder;
use crate::retry::RetryPolicy;
use crate::selector::{ContentDrivenSelector, RoundRobinSelector, TurnSelector, DEFAULT_HANDOFF_MARKER};
use crate::termination::{AnyOf, CompletionKeyword, MaxRounds, NoProgress, TerminationStrategy};

/// Project-level config file picked up from the working directory
pub const PROJECT_CONFIG_FILE: &str = "parley.toml";

/// Prefix for environment overrides, e.g. `PARLEY_MAX_TOTAL_ITERATIONS=8`
pub const ENV_PREFIX: &str = "PARLEY_";

pub const DEFAULT_PROMPT: &str =
    "Draft a lightweight product launch plan for a new AI-powered note-taking app.";

/// One agent definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    pub persona: String,
}

impl AgentSpec {
    pub fn new(id: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            persona: persona.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectorConfig {
    RoundRobin,
    ContentDriven {
        #[serde(default = "default_marker")]
        marker: String,
    },
}

fn default_marker() -> String {
    DEFAULT_HANDOFF_MARKER.to_string()
}

impl SelectorConfig {
    pub fn build(&self) -> Result<Box<dyn TurnSelector>, ParleyError> {
        Ok(match self {
            Self::RoundRobin => Box::new(RoundRobinSelector::new()),
            Self::ContentDriven { marker } => Box::new(ContentDrivenSelector::with_marker(marker)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationConfig {
    MaxRounds { max_rounds: usize },
    CompletionKeyword { keyword: String },
    NoProgress { window: usize, threshold: f64 },
    /// Stops when any member fires
    Composite { any_of: Vec<TerminationConfig> },
}

impl TerminationConfig {
    pub fn build(&self) -> Result<Box<dyn TerminationStrategy>, ParleyError> {
        Ok(match self {
            Self::MaxRounds { max_rounds } => Box::new(MaxRounds::new(*max_rounds)?),
            Self::CompletionKeyword { keyword } => Box::new(CompletionKeyword::new(keyword.as_str())?),
            Self::NoProgress { window, threshold } => Box::new(NoProgress::new(*window, *threshold)?),
            Self::Composite { any_of } => {
                let members = any_of
                    .iter()
                    .map(TerminationConfig::build)
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(AnyOf::new(members)?)
            }
        })
    }
}

/// Everything needed to assemble an orchestrator, minus the responder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Agents in registration order
    pub agents: Vec<AgentSpec>,
    pub turn_selector: SelectorConfig,
    pub termination: TerminationConfig,
    /// Safety ceiling on agent turns
    pub max_total_iterations: usize,
    pub initial_message: Option<String>,
    pub retry: RetryPolicy,
    /// Per-call responder timeout; 0 disables it
    pub turn_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            agents: default_team(),
            turn_selector: SelectorConfig::RoundRobin,
            termination: TerminationConfig::MaxRounds { max_rounds: 4 },
            max_total_iterations: crate::orchestrator::DEFAULT_MAX_TOTAL_ITERATIONS,
            initial_message: Some(DEFAULT_PROMPT.to_string()),
            retry: RetryPolicy::default(),
            turn_timeout_secs: crate::orchestrator::DEFAULT_TURN_TIMEOUT.as_secs(),
        }
    }
}

/// Planner, researcher and editor
pub fn default_team() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new(
            "planner",
            "You are the facilitator. Break the task into actionable steps, call on teammates \
             when you hand off, and keep responses under six sentences.",
        ),
        AgentSpec::new(
            "researcher",
            "You surface real-world context or data that supports the plan. If asked for \
             specifics you cannot access, state what assumptions you are making.",
        ),
        AgentSpec::new(
            "editor",
            "You synthesize what others proposed into a concise recommendation with next \
             actions and open questions.",
        ),
    ]
}

impl SessionConfig {
    pub fn turn_timeout(&self) -> Option<Duration> {
        (self.turn_timeout_secs > 0).then(|| Duration::from_secs(self.turn_timeout_secs))
    }

    /// Validate and assemble an orchestrator; every agent shares `responder`
    pub fn build(&self, responder: Arc<dyn Responder>) -> Result<Orchestrator, ParleyError> {
        let agents = self
            .agents
            .iter()
            .map(|spec| {
                if spec.id.trim().is_empty() {
                    return Err(ParleyError::InvalidConfiguration(
                        "agent id must not be empty".into(),
                    ));
                }
                Ok(Agent::new(spec.id.trim(), spec.persona.clone(), responder.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = Orchestrator::builder()
            .agents(agents)
            .selector(self.turn_selector.build()?)
            .termination(self.termination.build()?)
            .max_total_iterations(self.max_total_iterations)
            .retry(self.retry.clone())
            .turn_timeout(self.turn_timeout());

        if let Some(message) = &self.initial_message {
            builder = builder.initial_message(message.clone());
        }

        builder.build()
    }
}

/// Loads [`SessionConfig`] from defaults, files and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `PARLEY_*` environment variables (`__` separates nested keys)
    /// 2. Explicit config path (if provided; must exist)
    /// 3. Project root: `./parley.toml`
    /// 4. Default values
    pub fn load(config_path: Option<&Path>) -> Result<SessionConfig, ParleyError> {
        let config: SessionConfig = Self::figment(config_path)?.extract()?;
        debug!(agents = config.agents.len(), "Loaded session configuration");
        Ok(config)
    }

    pub fn figment(config_path: Option<&Path>) -> Result<Figment, ParleyError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(SessionConfig::default()))
            .merge(Toml::file(PROJECT_CONFIG_FILE));

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ParleyError::InvalidConfiguration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        let path = PathBuf::from(PROJECT_CONFIG_FILE);
        path.exists().then_some(path)
    }
}
