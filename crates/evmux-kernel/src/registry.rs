//! Listener registry.
//!
//! The registry owns, per index, the ordered list of registered listeners
//! and, per (index, type), the number of armed listeners wanting that type.
//! The backend is told about every 0→1 and 1→0 transition of those counts.
//!
//! # Locking
//!
//! Two independent locks, each on its own cache line:
//!
//! - **list lock** guards the per-index listener lists.  Registration,
//!   unlinking and [`trigger`](EventRegistry::trigger) take it.
//! - **refs lock** guards the counters.  Arming and disarming take it, and
//!   the backend's `enable`/`disable` run under it.
//!
//! The list lock may enclose the refs lock (a handler returning
//! [`Action::Drop`](crate::listener::Action::Drop) is disarmed mid-dispatch),
//! never the reverse.  Nothing done under either lock blocks or sleeps.
//!
//! # Example
//!
//! ```rust
//! # use evmux_kernel::{Action, EventMask, EventRegistry};
//! let registry = EventRegistry::new(4, 1).unwrap();
//! let listener = registry
//!     .register(EventMask::bit(0), 0, |_fired, _index| Action::Continue)
//!     .unwrap();
//!
//! listener.arm();
//! assert_eq!(registry.refcount(0, 0), 1);
//! assert_eq!(registry.trigger(0, EventMask::bit(0)), 1);
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, NullBackend};
use crate::config::RegistryConfig;
use crate::error::{EventError, Result};
use crate::listener::{Handler, Listener, ListenerShared};
use crate::mask::EventMask;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Per-index part of a [`RegistryStats`] snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub index: usize,
    /// Registered listeners, armed or not.
    pub listeners: usize,
    pub armed: usize,
    /// Non-zero reference counts keyed by type bit.
    pub active_types: BTreeMap<u32, u32>,
}

/// Serialisable snapshot of the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub types_nr: u32,
    pub index_nr: usize,
    pub created_at: DateTime<Utc>,
    pub indices: Vec<IndexStats>,
}

impl RegistryStats {
    pub fn total_listeners(&self) -> usize {
        self.indices.iter().map(|i| i.listeners).sum()
    }

    /// Whether no (index, type) is currently referenced.
    pub fn is_quiescent(&self) -> bool {
        self.indices.iter().all(|i| i.active_types.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Event registry handle.
///
/// Cheaply cloneable (`Arc`-backed) and `Send + Sync`.  Storage is released
/// once the last handle and the last [`Listener`] are gone, so a listener can
/// never outlive the lists and counters it points into.
#[derive(Clone)]
pub struct EventRegistry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    pub(crate) types_nr: u32,
    pub(crate) index_nr: usize,
    pub(crate) backend: Arc<dyn Backend>,

    /// One list per index, in registration order.
    pub(crate) lists: CachePadded<Mutex<Vec<Vec<Arc<ListenerShared>>>>>,

    /// `refs[index * types_nr + type]`: armed listeners wanting that pair.
    pub(crate) refs: CachePadded<Mutex<Box<[u32]>>>,

    pub(crate) created_at: DateTime<Utc>,
}

/// Lock a registry mutex.  A poisoned lock means a handler or backend hook
/// panicked; the guarded data is still structurally valid, so keep going.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventRegistry {
    /// Create a registry with no backend hooks.
    pub fn new(types_nr: u32, index_nr: usize) -> Result<Self> {
        Self::with_backend(types_nr, index_nr, Arc::new(NullBackend))
    }

    /// Create a registry that reports refcount transitions and admission
    /// checks to `backend`.
    pub fn with_backend(types_nr: u32, index_nr: usize, backend: Arc<dyn Backend>) -> Result<Self> {
        Self::from_config(&RegistryConfig { types_nr, index_nr }, backend)
    }

    /// Create a registry from a validated [`RegistryConfig`].
    pub fn from_config(config: &RegistryConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        config.validate()?;
        let types_nr = config.types_nr;
        let index_nr = config.index_nr;

        let len = index_nr
            .checked_mul(types_nr as usize)
            .ok_or_else(|| EventError::InvalidConfig {
                reason: format!("{index_nr} indices x {types_nr} types overflows"),
            })?;

        let mut refs = Vec::new();
        refs.try_reserve_exact(len)?;
        refs.resize(len, 0u32);

        let mut lists = Vec::new();
        lists.try_reserve_exact(index_nr)?;
        lists.extend((0..index_nr).map(|_| Vec::new()));

        tracing::info!(types_nr, index_nr, "event registry created");

        Ok(Self {
            inner: Arc::new(RegistryInner {
                types_nr,
                index_nr,
                backend,
                lists: CachePadded::new(Mutex::new(lists)),
                refs: CachePadded::new(Mutex::new(refs.into_boxed_slice())),
                created_at: Utc::now(),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &RegistryInner {
        &self.inner
    }

    /// Number of type bits per index.
    pub fn types_nr(&self) -> u32 {
        self.inner.types_nr
    }

    /// Number of independent indices.
    pub fn index_nr(&self) -> usize {
        self.inner.index_nr
    }

    /// Register a handler for `types` on `index`.
    ///
    /// The backend's admission check runs first and its error, if any, is
    /// returned unchanged.  The new listener is appended to the index's list
    /// disarmed; call [`Listener::arm`] to start delivery.
    pub fn register<H>(&self, types: EventMask, index: usize, handler: H) -> Result<Listener>
    where
        H: Handler + 'static,
    {
        let inner = &self.inner;

        if !types.fits(inner.types_nr) {
            return Err(EventError::InvalidTypes {
                types,
                types_nr: inner.types_nr,
            });
        }
        if index >= inner.index_nr {
            return Err(EventError::InvalidIndex {
                index,
                index_nr: inner.index_nr,
            });
        }

        if let Err(err) = inner.backend.check(types, index) {
            tracing::warn!(%types, index, error = %err, "listener admission refused");
            return Err(err);
        }

        let shared = Arc::new(ListenerShared::new(types, index, Box::new(handler)));
        {
            let mut lists = lock(&inner.lists);
            let list = &mut lists[index];
            list.try_reserve(1)?;
            list.push(Arc::clone(&shared));
        }

        tracing::debug!(listener_id = %shared.id, %types, index, "listener registered");

        Ok(Listener {
            registry: Arc::clone(inner),
            shared,
        })
    }

    /// Current reference count of `(index, bit)`; 0 when out of range.
    pub fn refcount(&self, index: usize, bit: u32) -> u32 {
        let inner = &self.inner;
        if index >= inner.index_nr || bit >= inner.types_nr {
            return 0;
        }
        lock(&inner.refs)[inner.slot(index, bit)]
    }

    /// Registered listeners on `index`, armed or not; 0 when out of range.
    pub fn listener_count(&self, index: usize) -> usize {
        lock(&self.inner.lists).get(index).map_or(0, Vec::len)
    }

    /// Snapshot of listeners and non-zero counters for every index.
    pub fn stats(&self) -> RegistryStats {
        let inner = &self.inner;
        let types_nr = inner.types_nr as usize;

        // List lock before refs lock, same order as dispatch.
        let lists = lock(&inner.lists);
        let refs = lock(&inner.refs);

        let indices = lists
            .iter()
            .enumerate()
            .map(|(index, list)| IndexStats {
                index,
                listeners: list.len(),
                armed: list.iter().filter(|l| l.is_armed()).count(),
                active_types: refs[index * types_nr..(index + 1) * types_nr]
                    .iter()
                    .enumerate()
                    .filter(|(_, count)| **count > 0)
                    .map(|(bit, count)| (bit as u32, *count))
                    .collect(),
            })
            .collect();

        RegistryStats {
            types_nr: inner.types_nr,
            index_nr: inner.index_nr,
            created_at: inner.created_at,
            indices,
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("types_nr", &self.inner.types_nr)
            .field("index_nr", &self.inner.index_nr)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Refcount bookkeeping
// ---------------------------------------------------------------------------

impl RegistryInner {
    fn slot(&self, index: usize, bit: u32) -> usize {
        index * self.types_nr as usize + bit as usize
    }

    /// Test-and-set the armed flag, then take one reference per type bit.
    ///
    /// The flag flips under the refs lock, so the counters always match the
    /// set of armed listeners even when independent callers race.
    pub(crate) fn arm(&self, listener: &ListenerShared) {
        let mut refs = lock(&self.refs);
        if listener.armed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return;
        }

        for bit in listener.types {
            let count = &mut refs[self.slot(listener.index, bit)];
            *count += 1;
            if *count == 1 {
                tracing::trace!(index = listener.index, bit, "event type enabled");
                self.backend.enable(EventMask::bit(bit), listener.index);
            }
        }
    }

    /// Test-and-clear the armed flag, then drop one reference per type bit.
    pub(crate) fn disarm(&self, listener: &ListenerShared) {
        let mut refs = lock(&self.refs);
        if !listener.armed.swap(false, std::sync::atomic::Ordering::AcqRel) {
            return;
        }

        for bit in listener.types {
            let count = &mut refs[self.slot(listener.index, bit)];
            debug_assert!(*count > 0, "refcount underflow on index {} bit {bit}", listener.index);
            *count -= 1;
            if *count == 0 {
                tracing::trace!(index = listener.index, bit, "event type disabled");
                self.backend.disable(EventMask::bit(bit), listener.index);
            }
        }
    }

    /// Remove `listener` from its index's list.  The caller must have
    /// disarmed it already.
    pub(crate) fn unlink(&self, listener: &Arc<ListenerShared>) {
        let mut lists = lock(&self.lists);
        let list = &mut lists[listener.index];
        if let Some(pos) = list.iter().position(|l| Arc::ptr_eq(l, listener)) {
            list.remove(pos);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
