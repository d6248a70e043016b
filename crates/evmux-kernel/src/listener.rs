//! Listener handles.
//!
//! A [`Listener`] is the capability returned by
//! [`EventRegistry::register`](crate::registry::EventRegistry::register).  It
//! owns one registration: the wanted types, the target index, the handler
//! and the armed flag.  The handle is not `Clone`; dropping it (or calling
//! [`Listener::unregister`]) disarms the registration and unlinks it from the
//! registry, after which no trigger can reach the handler again.
//!
//! # Lifecycle
//!
//! ```text
//! register ──► disarmed ──arm──► armed ──disarm / Action::Drop──► disarmed
//!                  │                │
//!                  └──── drop / unregister (disarm + unlink) ────► gone
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mask::EventMask;
use crate::registry::{EventRegistry, RegistryInner};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Unique, time-ordered listener identifier (UUID v7).
pub type ListenerId = Uuid;

/// What a handler wants after seeing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Stay armed.
    Continue,
    /// Disarm this listener right after the current dispatch step.  It
    /// stays registered and can be armed again.
    Drop,
}

/// Callback invoked by [`EventRegistry::trigger`].
///
/// `fired` is the intersection of the listener's types with the triggered
/// types, never empty.  Handlers run with the registry's list lock held,
/// possibly from a context that cannot sleep: they must not block, must not
/// panic, and must not drop or unregister any [`Listener`] of the same
/// registry.  Client data is whatever the handler captures.
pub trait Handler: Send + Sync {
    fn handle(&self, fired: EventMask, index: usize) -> Action;
}

impl<F> Handler for F
where
    F: Fn(EventMask, usize) -> Action + Send + Sync,
{
    fn handle(&self, fired: EventMask, index: usize) -> Action {
        self(fired, index)
    }
}

/// Serialisable snapshot of a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerInfo {
    pub id: ListenerId,
    pub types: EventMask,
    pub index: usize,
    pub armed: bool,
    pub registered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Shared listener state
// ---------------------------------------------------------------------------

/// The part of a registration that lives in the registry's per-index list.
pub(crate) struct ListenerShared {
    pub(crate) id: ListenerId,
    pub(crate) types: EventMask,
    pub(crate) index: usize,
    pub(crate) armed: AtomicBool,
    pub(crate) handler: Box<dyn Handler>,
    pub(crate) registered_at: DateTime<Utc>,
}

impl ListenerShared {
    pub(crate) fn new(types: EventMask, index: usize, handler: Box<dyn Handler>) -> Self {
        Self {
            id: Uuid::now_v7(),
            types,
            index,
            armed: AtomicBool::new(false),
            handler,
            registered_at: Utc::now(),
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Listener handle
// ---------------------------------------------------------------------------

/// Owning handle to one registration.
pub struct Listener {
    pub(crate) registry: Arc<RegistryInner>,
    pub(crate) shared: Arc<ListenerShared>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.shared.id
    }

    pub fn types(&self) -> EventMask {
        self.shared.types
    }

    pub fn index(&self) -> usize {
        self.shared.index
    }

    pub fn is_armed(&self) -> bool {
        self.shared.is_armed()
    }

    /// Start receiving events.
    ///
    /// Takes a reference on every requested (index, type); the backend's
    /// `enable` runs for each one that goes from 0 to 1.  Arming an armed
    /// listener does nothing.
    pub fn arm(&self) {
        self.registry.arm(&self.shared);
    }

    /// Stop receiving events.
    ///
    /// Releases the references taken by [`arm`](Self::arm); the backend's
    /// `disable` runs for each (index, type) that drops to 0.  Disarming a
    /// disarmed listener does nothing.
    pub fn disarm(&self) {
        self.registry.disarm(&self.shared);
    }

    /// Tear the registration down: disarm, then unlink from the registry.
    ///
    /// Equivalent to dropping the handle.  Once this returns no trigger can
    /// invoke the handler.
    pub fn unregister(self) {
        drop(self);
    }

    /// Handle to the registry this listener belongs to.
    pub fn registry(&self) -> EventRegistry {
        EventRegistry::from_inner(Arc::clone(&self.registry))
    }

    pub fn info(&self) -> ListenerInfo {
        ListenerInfo {
            id: self.shared.id,
            types: self.shared.types,
            index: self.shared.index,
            armed: self.shared.is_armed(),
            registered_at: self.shared.registered_at,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // Disarm first without the list lock so `disable` never runs under it
        // on this path, then unlink.
        self.registry.disarm(&self.shared);
        self.registry.unlink(&self.shared);
        tracing::debug!(
            listener_id = %self.shared.id,
            index = self.shared.index,
            "listener unregistered"
        );
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.shared.id)
            .field("types", &self.shared.types)
            .field("index", &self.shared.index)
            .field("armed", &self.shared.is_armed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
