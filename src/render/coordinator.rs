//! Render coordination
//!
//! Guarantees at most one concurrent render per fingerprint. Concurrent
//! requests for the same fingerprint join a single in-flight render and all
//! observe the same outcome.
//!
//! # Lifecycle
//!
//! 1. Cache hit: returned without touching the in-flight registry.
//! 2. Miss: under the registry lock the cache is checked again, then the
//!    caller either joins the existing [`InFlightRender`] or registers a new
//!    one and spawns a detached render task.
//! 3. The render task waits for a concurrency slot, then runs the render
//!    under the timeout. Time spent waiting for the slot is not counted.
//! 4. Under the registry lock again, a success is stored in the cache and the
//!    registry entry is removed before the outcome is broadcast. Failures are
//!    broadcast without being cached.
//!
//! Every caller, including the one that started the render, is a waiter.
//! Dropping a waiter decrements the waiter count; when the last waiter goes
//! away before the outcome is known, the render task is aborted.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::AbortHandle;
use tokio::time::timeout;

use super::cache::RenderCache;
use crate::diagram::{Fingerprint, RenderError, RenderResult, RenderedDiagram};

/// Default render timeout
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome shared with every waiter of a fingerprint
pub type RenderOutcome = RenderResult<Arc<RenderedDiagram>>;

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on a single render
    pub render_timeout: Duration,
    /// Maximum renders executing at once across all fingerprints
    pub max_concurrent_renders: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            max_concurrent_renders: 4,
        }
    }
}

/// Pending computation for one fingerprint
struct InFlightRender {
    outcome: watch::Sender<Option<RenderOutcome>>,
    waiters: AtomicUsize,
    abort: Mutex<Option<AbortHandle>>,
}

impl InFlightRender {
    fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            outcome,
            waiters: AtomicUsize::new(0),
            abort: Mutex::new(None),
        }
    }

    fn is_resolved(&self) -> bool {
        self.outcome.borrow().is_some()
    }
}

#[derive(Default)]
struct CoordinatorCounters {
    renders_started: AtomicU64,
    renders_joined: AtomicU64,
    renders_abandoned: AtomicU64,
    renders_failed: AtomicU64,
}

struct CoordinatorInner {
    cache: RenderCache,
    in_flight: Mutex<HashMap<Fingerprint, Arc<InFlightRender>>>,
    permits: Semaphore,
    config: CoordinatorConfig,
    counters: CoordinatorCounters,
}

/// Deduplicates concurrent renders of the same fingerprint
#[derive(Clone)]
pub struct RenderCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RenderCoordinator {
    pub fn new(cache: RenderCache, config: CoordinatorConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent_renders.max(1));
        Self {
            inner: Arc::new(CoordinatorInner {
                cache,
                in_flight: Mutex::new(HashMap::new()),
                permits,
                config,
                counters: CoordinatorCounters::default(),
            }),
        }
    }

    pub fn cache(&self) -> &RenderCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Number of fingerprints currently rendering
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Resolve a fingerprint, rendering it at most once across concurrent callers
    ///
    /// `compute` is only called by the caller that starts a new render; its
    /// future runs on a detached task so that cancelling one waiter does not
    /// cancel the render for the others.
    pub async fn resolve<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> RenderOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RenderResult<RenderedDiagram>> + Send + 'static,
    {
        if let Some(hit) = self.inner.cache.get(&fingerprint) {
            tracing::trace!(fingerprint = %fingerprint.short(), "Render cache hit");
            return Ok(hit);
        }

        let flight = {
            let mut registry = self.inner.in_flight.lock();

            // A render may have completed between the fast-path check and the lock
            if self.inner.cache.contains(&fingerprint) {
                if let Some(hit) = self.inner.cache.get(&fingerprint) {
                    return Ok(hit);
                }
            }

            match registry.get(&fingerprint) {
                Some(existing) => {
                    existing.waiters.fetch_add(1, Ordering::SeqCst);
                    self.inner
                        .counters
                        .renders_joined
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(fingerprint = %fingerprint.short(), "Joined in-flight render");
                    Arc::clone(existing)
                }
                None => {
                    let flight = Arc::new(InFlightRender::new());
                    flight.waiters.fetch_add(1, Ordering::SeqCst);
                    registry.insert(fingerprint, Arc::clone(&flight));
                    self.spawn_render(fingerprint, Arc::clone(&flight), compute());
                    flight
                }
            }
        };

        let guard = WaiterGuard {
            coordinator: self,
            fingerprint,
            flight: Arc::clone(&flight),
        };
        let mut receiver = flight.outcome.subscribe();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone().unwrap_or_else(|| {
                Err(RenderError::Internal(
                    "render resolved without outcome".to_string(),
                ))
            }),
            Err(_) => Err(RenderError::Internal(
                "render task ended without an outcome".to_string(),
            )),
        };
        drop(guard);
        outcome
    }

    fn spawn_render<Fut>(&self, fingerprint: Fingerprint, flight: Arc<InFlightRender>, render: Fut)
    where
        Fut: Future<Output = RenderResult<RenderedDiagram>> + Send + 'static,
    {
        self.inner
            .counters
            .renders_started
            .fetch_add(1, Ordering::Relaxed);

        let coordinator = self.clone();
        let task_flight = Arc::clone(&flight);
        let handle = tokio::spawn(async move {
            let outcome = coordinator.run_render(fingerprint, render).await;
            coordinator.complete(fingerprint, &task_flight, outcome);
        });

        *flight.abort.lock() = Some(handle.abort_handle());
    }

    async fn run_render<Fut>(&self, fingerprint: Fingerprint, render: Fut) -> RenderOutcome
    where
        Fut: Future<Output = RenderResult<RenderedDiagram>> + Send + 'static,
    {
        let render_timeout = self.inner.config.render_timeout;

        // Queueing for a slot does not count against the render's own budget
        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| RenderError::Internal("render permits closed".to_string()))?;

        let bounded = async {
            match AssertUnwindSafe(render).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(RenderError::Internal("renderer panicked".to_string())),
            }
        };

        match timeout(render_timeout, bounded).await {
            Ok(Ok(rendered)) => {
                tracing::info!(
                    fingerprint = %fingerprint.short(),
                    format = %rendered.format,
                    bytes = rendered.data.len(),
                    duration_ms = rendered.render_duration.as_millis() as u64,
                    "Rendered diagram"
                );
                Ok(Arc::new(rendered))
            }
            Ok(Err(e)) => {
                tracing::warn!(fingerprint = %fingerprint.short(), error = %e, "Render failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    fingerprint = %fingerprint.short(),
                    timeout_ms = render_timeout.as_millis() as u64,
                    "Render timed out"
                );
                Err(RenderError::Timeout(render_timeout))
            }
        }
    }

    /// Promote or discard the in-flight entry, then release every waiter
    fn complete(
        &self,
        fingerprint: Fingerprint,
        flight: &Arc<InFlightRender>,
        outcome: RenderOutcome,
    ) {
        {
            let mut registry = self.inner.in_flight.lock();
            let current = registry
                .get(&fingerprint)
                .is_some_and(|entry| Arc::ptr_eq(entry, flight));

            if current {
                if let Ok(rendered) = &outcome {
                    self.inner.cache.put(fingerprint, Arc::clone(rendered));
                }
                registry.remove(&fingerprint);
            }
        }

        if outcome.is_err() {
            self.inner
                .counters
                .renders_failed
                .fetch_add(1, Ordering::Relaxed);
        }
        flight.outcome.send_replace(Some(outcome));
    }

    /// Drop one waiter, abandoning the render if nobody is left
    fn release_waiter(&self, fingerprint: Fingerprint, flight: &Arc<InFlightRender>) {
        if flight.waiters.fetch_sub(1, Ordering::SeqCst) != 1 || flight.is_resolved() {
            return;
        }

        let mut registry = self.inner.in_flight.lock();
        // Joins happen under this lock, so the count is stable here
        if flight.waiters.load(Ordering::SeqCst) != 0 || flight.is_resolved() {
            return;
        }

        let current = registry
            .get(&fingerprint)
            .is_some_and(|entry| Arc::ptr_eq(entry, flight));
        if current {
            registry.remove(&fingerprint);
            if let Some(handle) = flight.abort.lock().take() {
                handle.abort();
            }
            self.inner
                .counters
                .renders_abandoned
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(fingerprint = %fingerprint.short(), "Abandoned render with no waiters");
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        let counters = &self.inner.counters;
        CoordinatorStats {
            in_flight: self.in_flight(),
            renders_started: counters.renders_started.load(Ordering::Relaxed),
            renders_joined: counters.renders_joined.load(Ordering::Relaxed),
            renders_abandoned: counters.renders_abandoned.load(Ordering::Relaxed),
            renders_failed: counters.renders_failed.load(Ordering::Relaxed),
            render_timeout_ms: self.inner.config.render_timeout.as_millis() as u64,
            max_concurrent_renders: self.inner.config.max_concurrent_renders,
        }
    }
}

/// Reference-counted waiter registration, released on drop
struct WaiterGuard<'a> {
    coordinator: &'a RenderCoordinator,
    fingerprint: Fingerprint,
    flight: Arc<InFlightRender>,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.coordinator
            .release_waiter(self.fingerprint, &self.flight);
    }
}

/// Coordinator statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStats {
    pub in_flight: usize,
    pub renders_started: u64,
    pub renders_joined: u64,
    pub renders_abandoned: u64,
    pub renders_failed: u64,
    pub render_timeout_ms: u64,
    pub max_concurrent_renders: usize,
}
