//! Registry shape configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EventError, Result};
use crate::mask::MAX_TYPES;

/// Shape of an [`EventRegistry`](crate::registry::EventRegistry).
///
/// Deserialises from TOML/JSON; missing fields fall back to [`Default`]
/// (all 32 type bits, a single index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of event type bits per index, 1..=32.
    pub types_nr: u32,
    /// Number of independent indices, at least 1.
    pub index_nr: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            types_nr: MAX_TYPES,
            index_nr: 1,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.types_nr == 0 || self.types_nr > MAX_TYPES {
            return Err(EventError::InvalidConfig {
                reason: format!("types_nr must be in 1..={MAX_TYPES}, got {}", self.types_nr),
            });
        }
        if self.index_nr == 0 {
            return Err(EventError::InvalidConfig {
                reason: "index_nr must be at least 1".into(),
            });
        }
        Ok(())
    }
}
