//! evmux event kernel.
//!
//! An in-process event multiplexer for driver-style code: clients register
//! listeners keyed by an *(index, type bitmask)* pair, arm and disarm them,
//! and the backend is told exactly when the first listener for an
//! (index, type) appears and when the last one goes away.  Firing is a
//! synchronous, non-blocking fan-out that is safe to call from contexts that
//! cannot sleep.
//!
//! - **[`registry`]** -- [`EventRegistry`]: per-index listener lists,
//!   per-(index, type) reference counts, registration and introspection.
//! - **[`dispatch`]** -- [`EventRegistry::trigger`], the firing path.
//! - **[`listener`]** -- [`Listener`] handles, the [`Handler`] callback
//!   trait and [`Action`].
//! - **[`backend`]** -- the [`Backend`] hooks (`enable`, `disable`, `check`).
//! - **[`slot`]** -- [`ListenerSlot`], swap-safe storage for one listener.
//! - **[`mask`]** -- [`EventMask`] and set-bit iteration.
//! - **[`config`]** -- [`RegistryConfig`].
//! - **[`error`]** -- [`EventError`] via [`thiserror`].
//!
//! All public types are `Send + Sync`.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod mask;
pub mod registry;
pub mod slot;

pub use backend::{Backend, NullBackend};
pub use config::RegistryConfig;
pub use error::{EventError, Result};
pub use listener::{Action, Handler, Listener, ListenerId, ListenerInfo};
pub use mask::{EventMask, MAX_TYPES};
pub use registry::{EventRegistry, IndexStats, RegistryStats};
pub use slot::ListenerSlot;
