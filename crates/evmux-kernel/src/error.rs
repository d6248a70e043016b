//! Kernel error types.
//!
//! Every fallible operation in this crate returns [`EventError`].  Each
//! variant carries the offending values so callers can tell an invalid mask
//! from an invalid index from a backend veto without parsing strings.

use crate::mask::EventMask;

/// Unified error type for the event registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    // -- Argument errors ----------------------------------------------------
    /// The requested type mask has bits outside the registry's width.
    #[error("event types {types} exceed the supported width of {types_nr} bits")]
    InvalidTypes {
        /// The mask that was rejected.
        types: EventMask,
        /// Number of type bits the registry supports.
        types_nr: u32,
    },

    /// The requested index does not name a channel of this registry.
    #[error("event index {index} out of range (registry has {index_nr} indices)")]
    InvalidIndex { index: usize, index_nr: usize },

    /// A registry shape that cannot be built (zero or too many types,
    /// zero indices).
    #[error("invalid registry configuration: {reason}")]
    InvalidConfig { reason: String },

    // -- Backend errors -----------------------------------------------------
    /// The backend's admission check refused this (types, index) pair.
    ///
    /// Produced by [`Backend::check`](crate::backend::Backend::check) and
    /// returned from registration unchanged.
    #[error("admission denied for types {types} on index {index}: {reason}")]
    AdmissionDenied {
        types: EventMask,
        index: usize,
        reason: String,
    },

    // -- Resource errors ----------------------------------------------------
    /// Storage for counters or listener lists could not be reserved.
    /// The registry is unchanged; the caller may retry later.
    #[error("resource exhausted: {reason}")]
    ResourceExhausted { reason: String },
}

impl EventError {
    /// Whether this error came from bad caller input rather than the
    /// backend or the allocator.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidTypes { .. } | Self::InvalidIndex { .. } | Self::InvalidConfig { .. }
        )
    }
}

impl From<std::collections::TryReserveError> for EventError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::ResourceExhausted {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, EventError>;
