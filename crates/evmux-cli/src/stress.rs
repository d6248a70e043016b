//! Concurrent stress driver.
//!
//! Spawns one tokio task per simulated client plus a set of "interrupt"
//! tasks that fire every index in a tight loop.  Clients repeatedly register,
//! arm, disarm and tear down listeners (some of which ask to be dropped on
//! delivery).  When everything has finished, the registry must be empty and
//! quiescent and the backend must have seen exactly as many disables as
//! enables for every (index, type).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Result, bail};
use evmux_kernel::{Action, EventMask, EventRegistry, RegistryConfig};
use serde::Serialize;

use crate::backend::CountingBackend;

#[derive(Debug, Clone, Copy)]
pub struct StressParams {
    pub types_nr: u32,
    pub index_nr: usize,
    pub listeners: usize,
    pub rounds: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub listeners: usize,
    pub rounds: usize,
    pub registrations: u64,
    pub triggers: u64,
    pub deliveries: u64,
    pub enables: u64,
    pub disables: u64,
    pub elapsed_ms: u128,
}

/// Run the stress scenario and verify the refcount invariants.
pub async fn run(params: StressParams) -> Result<StressReport> {
    let config = RegistryConfig {
        types_nr: params.types_nr,
        index_nr: params.index_nr,
    };
    config.validate()?;

    let backend = Arc::new(CountingBackend::new(params.types_nr, params.index_nr));
    let registry = EventRegistry::from_config(&config, backend.clone())?;

    let stop = Arc::new(AtomicBool::new(false));
    let deliveries = Arc::new(AtomicU64::new(0));
    let triggers = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    tracing::info!(
        listeners = params.listeners,
        rounds = params.rounds,
        types_nr = params.types_nr,
        index_nr = params.index_nr,
        "stress run started"
    );

    // One firing task per index.
    let mut firing = Vec::with_capacity(params.index_nr);
    for index in 0..params.index_nr {
        let registry = registry.clone();
        let stop = Arc::clone(&stop);
        let triggers = Arc::clone(&triggers);
        let all = EventMask::all(params.types_nr);
        firing.push(tokio::spawn(async move {
            while !stop.load(Ordering::Acquire) {
                registry.trigger(index, all);
                triggers.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut clients = Vec::with_capacity(params.listeners);
    for worker in 0..params.listeners {
        let registry = registry.clone();
        let deliveries = Arc::clone(&deliveries);
        clients.push(tokio::spawn(async move {
            client_loop(&registry, worker, params, &deliveries).await
        }));
    }

    let mut registrations = 0;
    for client in clients {
        registrations += client.await??;
    }
    stop.store(true, Ordering::Release);
    for task in firing {
        task.await?;
    }

    let stats = registry.stats();
    if stats.total_listeners() != 0 {
        bail!("{} listeners still linked after teardown", stats.total_listeners());
    }
    if !stats.is_quiescent() {
        bail!("reference counts left non-zero: {:?}", stats.indices);
    }
    let unbalanced = backend.unbalanced();
    if !unbalanced.is_empty() {
        bail!("enable/disable imbalance (index, bit, balance): {unbalanced:?}");
    }

    let report = StressReport {
        listeners: params.listeners,
        rounds: params.rounds,
        registrations,
        triggers: triggers.load(Ordering::Relaxed),
        deliveries: deliveries.load(Ordering::Relaxed),
        enables: backend.enables(),
        disables: backend.disables(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    tracing::info!(?report, "stress run passed");
    Ok(report)
}

/// One simulated client.  Returns how many listeners it registered.
async fn client_loop(
    registry: &EventRegistry,
    worker: usize,
    params: StressParams,
    deliveries: &Arc<AtomicU64>,
) -> Result<u64> {
    let index = worker % params.index_nr;
    let width = params.types_nr;
    let mut registrations = 0;

    for round in 0..params.rounds {
        // Walk through masks so clients overlap on some bits but not all.
        let bits = ((worker + round) as u64 % (u64::from(width) * 2)) as u32;
        let types = EventMask::bit(bits % width) | EventMask::bit((bits / 2) % width);
        let action = if round % 4 == 0 {
            Action::Drop
        } else {
            Action::Continue
        };
        let counter = Arc::clone(deliveries);

        let listener = registry.register(types, index, move |_: EventMask, _: usize| {
            counter.fetch_add(1, Ordering::Relaxed);
            action
        })?;
        registrations += 1;

        listener.arm();
        tokio::task::yield_now().await;
        if round % 3 == 0 {
            listener.disarm();
            listener.arm();
        }
        tokio::task::yield_now().await;
        listener.unregister();
    }

    Ok(registrations)
}
