//! Scenario files.
//!
//! A scenario describes a registry shape, the listeners to register (in
//! order), backend admission rules, and a list of steps to run against the
//! registry.  `replay` runs it and records everything the backend and the
//! handlers observe.
//!
//! ```toml
//! [registry]
//! types_nr = 4
//! index_nr = 1
//!
//! [[listeners]]
//! name = "a"
//! types = 0b0001
//! index = 0
//! armed = true
//!
//! [[steps]]
//! op = "trigger"
//! index = 0
//! types = 0b0001
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use evmux_kernel::{
    Action, EventError, EventMask, EventRegistry, Listener, RegistryConfig, RegistryStats,
};
use serde::{Deserialize, Serialize};

use crate::backend::{Entry, Transcript, TranscriptBackend};

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub registry: RegistryConfig,
    /// (types, index) pairs the simulated backend refuses at admission.
    #[serde(default)]
    pub deny: Vec<DenyRule>,
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DenyRule {
    pub types: EventMask,
    pub index: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerSpec {
    pub name: String,
    pub types: EventMask,
    pub index: usize,
    /// Arm right after registration.
    #[serde(default)]
    pub armed: bool,
    /// What the handler returns on every delivery.
    #[serde(default = "continue_action")]
    pub action: Action,
}

fn continue_action() -> Action {
    Action::Continue
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Trigger { index: usize, types: EventMask },
    Arm { listener: String },
    Disarm { listener: String },
    Unregister { listener: String },
}

/// Result of [`Scenario::replay`].
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub transcript: Vec<Entry>,
    /// Registry state after the last step, before remaining listeners are
    /// torn down.
    pub stats: RegistryStats,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let scenario: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse scenario {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Structural checks that do not need a registry: a buildable shape,
    /// unique listener names, and steps that only name declared listeners.
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;

        let mut names = HashSet::new();
        for spec in &self.listeners {
            if !names.insert(spec.name.as_str()) {
                bail!("duplicate listener name `{}`", spec.name);
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            let name = match step {
                Step::Trigger { .. } => continue,
                Step::Arm { listener } | Step::Disarm { listener } | Step::Unregister { listener } => {
                    listener
                }
            };
            if !names.contains(name.as_str()) {
                bail!("step {i} refers to unknown listener `{name}`");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------------

    pub fn replay(&self) -> Result<ReplayReport> {
        let transcript = Transcript::default();
        let deny = self.deny.iter().map(|r| (r.types, r.index)).collect();
        let backend = Arc::new(TranscriptBackend::new(transcript.clone(), deny));
        let registry = EventRegistry::from_config(&self.registry, backend)?;

        let mut listeners: HashMap<&str, Listener> = HashMap::new();
        for spec in &self.listeners {
            let name = spec.name.clone();
            let action = spec.action;
            let sink = transcript.clone();
            let handler = move |fired: EventMask, index: usize| {
                sink.push(Entry::Deliver {
                    listener: name.clone(),
                    fired,
                    index,
                });
                action
            };

            match registry.register(spec.types, spec.index, handler) {
                Ok(listener) => {
                    if spec.armed {
                        listener.arm();
                    }
                    listeners.insert(spec.name.as_str(), listener);
                }
                Err(err @ EventError::AdmissionDenied { .. }) => {
                    transcript.push(Entry::Denied {
                        listener: spec.name.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to register listener `{}`", spec.name));
                }
            }
        }

        for step in &self.steps {
            tracing::debug!(?step, "replay step");
            match step {
                Step::Trigger { index, types } => {
                    registry.trigger(*index, *types);
                }
                Step::Arm { listener } => match listeners.get(listener.as_str()) {
                    Some(l) => l.arm(),
                    None => tracing::warn!(listener = %listener, "arm skipped, not registered"),
                },
                Step::Disarm { listener } => match listeners.get(listener.as_str()) {
                    Some(l) => l.disarm(),
                    None => tracing::warn!(listener = %listener, "disarm skipped, not registered"),
                },
                Step::Unregister { listener } => match listeners.remove(listener.as_str()) {
                    Some(l) => l.unregister(),
                    None => {
                        tracing::warn!(listener = %listener, "unregister skipped, not registered")
                    }
                },
            }
        }

        let stats = registry.stats();
        drop(listeners);

        Ok(ReplayReport {
            transcript: transcript.entries(),
            stats,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
