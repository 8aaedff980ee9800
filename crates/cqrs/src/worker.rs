//! Shared worker pool and the handles returned by asynchronous sends.
//!
//! Handler bodies are synchronous, so dispatches run on tokio's blocking pool:
//! threads are started on demand, reused while idle and reaped after
//! `keep_alive`. The pool either owns its runtime or borrows the caller's.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use serde::Serialize;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;

use crate::config::BusConfig;
use crate::error::{BusError, ConfigError};

/// Completion handle of an asynchronous dispatch.
///
/// `.await` it from async code, or [`wait`](DispatchHandle::wait) from a plain
/// thread.
#[derive(Debug)]
pub struct DispatchHandle<T> {
    rx: oneshot::Receiver<Result<T, BusError>>,
}

impl<T> DispatchHandle<T> {
    /// A handle that is already complete.
    pub(crate) fn ready(result: Result<T, BusError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block the current thread until the dispatch completes.
    ///
    /// Panics if called from within an async runtime; `.await` the handle there.
    pub fn wait(self) -> Result<T, BusError> {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(BusError::WorkerLost))
    }

    /// Take the result if the dispatch has already completed.
    ///
    /// Yields the result at most once; afterwards the handle reports `WorkerLost`.
    pub fn try_take(&mut self) -> Option<Result<T, BusError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BusError::WorkerLost)),
        }
    }
}

impl<T> Future for DispatchHandle<T> {
    type Output = Result<T, BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(BusError::WorkerLost)))
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub submitted: u64,
    pub rejected: u64,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    in_flight: AtomicUsize,
}

struct InFlight(Arc<Counters>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An in-flight slot held between reservation and completion of a dispatch.
pub(crate) struct Slot {
    guard: InFlight,
    kind: &'static str,
    in_flight: usize,
}

/// Worker pool shared by the command and query buses.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    runtime: Option<Runtime>,
    handle: Handle,
    max_in_flight: Option<usize>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Build a pool with its own runtime.
    pub fn new(config: &BusConfig) -> Result<Self, ConfigError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_keep_alive(config.keep_alive)
            .thread_name(config.name.clone())
            .build()?;
        let handle = runtime.handle().clone();

        tracing::debug!(
            pool = %config.name,
            max_blocking_threads = config.max_blocking_threads,
            max_in_flight = ?config.max_in_flight,
            "worker pool started"
        );

        Ok(Self {
            name: config.name.clone(),
            runtime: Some(runtime),
            handle,
            max_in_flight: config.max_in_flight,
            counters: Arc::default(),
        })
    }

    /// Run dispatches on an existing runtime instead of starting one.
    ///
    /// Thread settings in `config` are ignored; `max_in_flight` still applies.
    pub fn from_handle(handle: Handle, config: &BusConfig) -> Self {
        Self {
            name: config.name.clone(),
            runtime: None,
            handle,
            max_in_flight: config.max_in_flight,
            counters: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::Acquire),
            rejected: self.counters.rejected.load(Ordering::Acquire),
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
        }
    }

    /// Claim an in-flight slot, failing fast when a bounded pool is full.
    pub(crate) fn reserve(&self, kind: &'static str) -> Result<Slot, BusError> {
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlight(self.counters.clone());

        if let Some(limit) = self.max_in_flight
            && in_flight >= limit
        {
            drop(guard);
            self.counters.rejected.fetch_add(1, Ordering::AcqRel);
            tracing::warn!(pool = %self.name, kind, limit, "worker pool saturated, dispatch rejected");
            return Err(BusError::Saturated { limit });
        }

        Ok(Slot {
            guard,
            kind,
            in_flight: in_flight + 1,
        })
    }

    /// Run `work` on a pool thread in a reserved slot. Never blocks.
    pub(crate) fn spawn<T, F>(&self, slot: Slot, work: F) -> DispatchHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BusError> + Send + 'static,
    {
        self.counters.submitted.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(pool = %self.name, kind = slot.kind, in_flight = slot.in_flight, "dispatch submitted");

        let (tx, rx) = oneshot::channel();
        let guard = slot.guard;
        self.handle.spawn_blocking(move || {
            let result = work();
            drop(guard);
            let _ = tx.send(result);
        });

        DispatchHandle { rx }
    }

    /// [`reserve`](WorkerPool::reserve) then [`spawn`](WorkerPool::spawn).
    pub(crate) fn submit<T, F>(&self, kind: &'static str, work: F) -> DispatchHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BusError> + Send + 'static,
    {
        match self.reserve(kind) {
            Ok(slot) => self.spawn(slot, work),
            Err(err) => DispatchHandle::ready(Err(err)),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside async contexts.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
