//! Simulated backends.
//!
//! The CLI has no hardware behind it, so these backends stand in for one:
//! [`TranscriptBackend`] records every hook call for `replay`, and
//! [`CountingBackend`] keeps lock-free per-(index, type) balances for
//! `stress`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use evmux_kernel::{Backend, EventError, EventMask, Result};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// One observable effect during a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Entry {
    Enable { mask: EventMask, index: usize },
    Disable { mask: EventMask, index: usize },
    Deliver {
        listener: String,
        fired: EventMask,
        index: usize,
    },
    Denied { listener: String, reason: String },
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enable { mask, index } => write!(f, "enable   {mask} @ {index}"),
            Self::Disable { mask, index } => write!(f, "disable  {mask} @ {index}"),
            Self::Deliver {
                listener,
                fired,
                index,
            } => write!(f, "deliver  {fired} @ {index} -> {listener}"),
            Self::Denied { listener, reason } => write!(f, "denied   {listener}: {reason}"),
        }
    }
}

/// Append-only log shared by the backend and the replay handlers.
///
/// Pushed to from under the registry's locks, so it is always the innermost
/// lock taken.
#[derive(Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<Entry>>>);

impl Transcript {
    pub fn push(&self, entry: Entry) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

// ---------------------------------------------------------------------------
// TranscriptBackend
// ---------------------------------------------------------------------------

/// Backend that records transitions and refuses configured (types, index)
/// pairs at admission.
pub struct TranscriptBackend {
    transcript: Transcript,
    deny: Vec<(EventMask, usize)>,
}

impl TranscriptBackend {
    pub fn new(transcript: Transcript, deny: Vec<(EventMask, usize)>) -> Self {
        Self { transcript, deny }
    }
}

impl Backend for TranscriptBackend {
    fn enable(&self, mask: EventMask, index: usize) {
        tracing::info!(%mask, index, "backend enable");
        self.transcript.push(Entry::Enable { mask, index });
    }

    fn disable(&self, mask: EventMask, index: usize) {
        tracing::info!(%mask, index, "backend disable");
        self.transcript.push(Entry::Disable { mask, index });
    }

    fn check(&self, types: EventMask, index: usize) -> Result<()> {
        if self.deny.contains(&(types, index)) {
            return Err(EventError::AdmissionDenied {
                types,
                index,
                reason: "denied by scenario".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CountingBackend
// ---------------------------------------------------------------------------

/// Backend that tracks enable/disable balance per (index, type).
pub struct CountingBackend {
    types_nr: usize,
    balance: Vec<AtomicI64>,
    enables: AtomicU64,
    disables: AtomicU64,
}

impl CountingBackend {
    pub fn new(types_nr: u32, index_nr: usize) -> Self {
        let types_nr = types_nr as usize;
        Self {
            types_nr,
            balance: (0..types_nr * index_nr).map(|_| AtomicI64::new(0)).collect(),
            enables: AtomicU64::new(0),
            disables: AtomicU64::new(0),
        }
    }

    fn slot(&self, mask: EventMask, index: usize) -> Option<&AtomicI64> {
        let bit = mask.iter().next()? as usize;
        self.balance.get(index * self.types_nr + bit)
    }

    pub fn enables(&self) -> u64 {
        self.enables.load(Ordering::Relaxed)
    }

    pub fn disables(&self) -> u64 {
        self.disables.load(Ordering::Relaxed)
    }

    /// `(index, bit, balance)` for every slot whose enable and disable
    /// counts differ.
    pub fn unbalanced(&self) -> Vec<(usize, usize, i64)> {
        self.balance
            .iter()
            .enumerate()
            .filter_map(|(slot, b)| {
                let b = b.load(Ordering::Relaxed);
                (b != 0).then_some((slot / self.types_nr, slot % self.types_nr, b))
            })
            .collect()
    }
}

impl Backend for CountingBackend {
    fn enable(&self, mask: EventMask, index: usize) {
        self.enables.fetch_add(1, Ordering::Relaxed);
        if let Some(slot) = self.slot(mask, index) {
            slot.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn disable(&self, mask: EventMask, index: usize) {
        self.disables.fetch_add(1, Ordering::Relaxed);
        if let Some(slot) = self.slot(mask, index) {
            slot.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
