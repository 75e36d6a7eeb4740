// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The generic Backend Connection Manager (spec §4.3): holds the single `BackendConnection`
//! per Adapter process, exposes non-blocking acquire/release, probes health on a fixed
//! interval, and reconnects with backoff+jitter on loss — resubscribing every live
//! `Subscription` before flipping back to `Ready`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::errors::FabricError;

/// State machine of spec §4.3: `Initializing -> Ready -> Degraded -> Closed -> (reconnect) ->
/// Ready`. Externally visible through [`ConnectionManager::health_snapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Initializing,
    Ready,
    Degraded,
    Closed,
}

/// Opaque id for a long-lived streaming consumer (spec §3 `Subscription`).
pub type SubscriptionId = Uuid;

/// A backend a `ConnectionManager` can hold and supervise. Implemented once per backend
/// driver (e.g. a Redis connection-manager pool for `kv`, a NATS/JetStream client for
/// `pubsub`).
#[async_trait]
pub trait ManagedBackend: Send + Sync + 'static {
    /// The live, cloneable handle handlers use to talk to the backend (a pool handle, a
    /// client, etc).
    type Handle: Clone + Send + Sync + 'static;

    /// Enough information to re-establish one `Subscription` after a reconnect (e.g. the
    /// physical subject/topic and QoS it was opened with).
    type SubscriptionSpec: Clone + Send + Sync + 'static;

    /// Establishes a fresh connection/session. Called at Adapter start and on every
    /// reconnect attempt.
    async fn connect(&self) -> Result<Self::Handle, FabricError>;

    /// A cheap backend-native liveness check (TCP reachability, a trivial query, a ping).
    async fn probe_health(&self, handle: &Self::Handle) -> bool;

    /// Re-establishes one `Subscription` against a freshly (re)connected handle. Backends
    /// with no long-lived subscriptions (key-value, relational, ...) use the default no-op.
    async fn resubscribe(
        &self,
        _handle: &Self::Handle,
        _spec: &Self::SubscriptionSpec,
    ) -> Result<(), FabricError> {
        Ok(())
    }
}

/// Exponential backoff with a capped ceiling and jitter (spec §4.3).
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Backoff {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Returns the delay to wait before the next reconnect attempt, advancing the backoff.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let exp = self
            .base
            .saturating_mul(1u32 << self.attempt.min(16));
        let capped = exp.min(self.cap);
        let jitter_frac: f64 = rand::thread_rng().gen_range(0.5..1.0);
        Duration::from_secs_f64(capped.as_secs_f64() * jitter_frac)
    }

    /// Resets the attempt counter after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(Duration::from_millis(200), Duration::from_secs(30))
    }
}

/// A point-in-time summary of connection health, used by the `HealthCheck` RPC (spec §4.4)
/// and the Discovery & Health Reporter (C7).
#[derive(Clone, Debug)]
pub struct HealthSnapshot {
    pub state: ConnectionState,
    pub healthy: bool,
    pub last_health_at: Option<Instant>,
}

struct SubscriptionEntry<Spec> {
    spec: Spec,
    terminated: Arc<AtomicBool>,
}

/// A caller-held reference to a registered `Subscription`. Dropping it does not deregister
/// the subscription — the owning streaming handler calls
/// [`ConnectionManager::remove_subscription`] explicitly once the RPC stream actually ends,
/// since cancellation (not drop order) is spec's termination signal (I5).
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    terminated: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// `true` once the Connection Manager has given up resubscribing this subscription after
    /// a reconnect; the owning handler must end its RPC stream with `Unavailable`.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

struct ManagerState<B: ManagedBackend> {
    status: ConnectionState,
    handle: Option<B::Handle>,
    last_health_at: Option<Instant>,
    consecutive_failures: u32,
}

/// Holds the single `BackendConnection` per Adapter process (spec §4.3). Cheap to clone —
/// every clone shares the same underlying state and subscription registry.
pub struct ConnectionManager<B: ManagedBackend> {
    backend: Arc<B>,
    state: Arc<RwLock<ManagerState<B>>>,
    subscriptions: Arc<AsyncMutex<HashMap<SubscriptionId, SubscriptionEntry<B::SubscriptionSpec>>>>,
}

impl<B: ManagedBackend> Clone for ConnectionManager<B> {
    fn clone(&self) -> Self {
        ConnectionManager {
            backend: self.backend.clone(),
            state: self.state.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

impl<B: ManagedBackend> ConnectionManager<B> {
    /// Constructs the manager in `Initializing` state and spawns the supervisor task that
    /// performs the initial connect, then probes on `probe_interval` and reconnects with
    /// backoff on loss, for as long as the process runs.
    pub fn spawn(backend: B, probe_interval: Duration) -> Self {
        let manager = ConnectionManager {
            backend: Arc::new(backend),
            state: Arc::new(RwLock::new(ManagerState {
                status: ConnectionState::Initializing,
                handle: None,
                last_health_at: None,
                consecutive_failures: 0,
            })),
            subscriptions: Arc::new(AsyncMutex::new(HashMap::new())),
        };

        let supervised = manager.clone();
        tokio::spawn(async move {
            supervised.supervise(probe_interval).await;
        });

        manager
    }

    async fn supervise(&self, probe_interval: Duration) {
        self.connect_with_backoff().await;

        loop {
            tokio::time::sleep(probe_interval).await;
            self.probe_once().await;
        }
    }

    async fn connect_with_backoff(&self) {
        let mut backoff = Backoff::default();
        loop {
            match self.backend.connect().await {
                Ok(handle) => {
                    self.resubscribe_all(&handle).await;
                    let mut state = self.state.write();
                    state.handle = Some(handle);
                    state.status = ConnectionState::Ready;
                    state.last_health_at = Some(Instant::now());
                    state.consecutive_failures = 0;
                    return;
                }
                Err(err) => {
                    log::warn!("backend connect failed, retrying: {err}");
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
    }

    async fn probe_once(&self) {
        let handle = {
            let state = self.state.read();
            state.handle.clone()
        };

        let Some(handle) = handle else {
            self.connect_with_backoff().await;
            return;
        };

        let healthy = self.backend.probe_health(&handle).await;

        let should_reconnect = {
            let mut state = self.state.write();
            if healthy {
                state.status = ConnectionState::Ready;
                state.last_health_at = Some(Instant::now());
                state.consecutive_failures = 0;
                false
            } else {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= 2 {
                    state.status = ConnectionState::Closed;
                    state.handle = None;
                    true
                } else {
                    state.status = ConnectionState::Degraded;
                    false
                }
            }
        };

        if should_reconnect {
            log::warn!("backend connection closed after repeated failed probes, reconnecting");
            self.connect_with_backoff().await;
        }
    }

    async fn resubscribe_all(&self, handle: &B::Handle) {
        let mut subscriptions = self.subscriptions.lock().await;
        let mut terminated_ids = Vec::new();
        for (id, entry) in subscriptions.iter() {
            if let Err(err) = self.backend.resubscribe(handle, &entry.spec).await {
                log::warn!("failed to resubscribe {id}: {err}");
                entry.terminated.store(true, Ordering::Release);
                terminated_ids.push(*id);
            }
        }
        for id in terminated_ids {
            subscriptions.remove(&id);
        }
    }

    /// Yields an already-`Ready` handle, or fails immediately with `Unavailable` — never
    /// blocks while the manager is reconnecting (spec §4.3 `Acquire()`).
    pub fn acquire(&self) -> Result<B::Handle, FabricError> {
        let state = self.state.read();
        match (state.status, state.handle.clone()) {
            (ConnectionState::Ready, Some(handle)) => Ok(handle),
            _ => Err(FabricError::Unavailable(
                "backend connection is not ready".to_owned(),
            )),
        }
    }

    /// Registers a new long-lived `Subscription` so the manager can resubscribe it after a
    /// reconnect. Only meaningful for streaming backends (pub/sub, device-messaging).
    pub async fn register_subscription(&self, spec: B::SubscriptionSpec) -> SubscriptionHandle {
        let id = Uuid::new_v4();
        let terminated = Arc::new(AtomicBool::new(false));
        self.subscriptions.lock().await.insert(
            id,
            SubscriptionEntry {
                spec,
                terminated: terminated.clone(),
            },
        );
        SubscriptionHandle { id, terminated }
    }

    /// Deregisters a `Subscription`, called once its owning RPC stream actually ends
    /// (caller cancellation, deadline, or normal completion).
    pub async fn remove_subscription(&self, id: SubscriptionId) {
        self.subscriptions.lock().await.remove(&id);
    }

    /// `healthy=true` iff state is `Ready` and the last probe is within one probe interval
    /// (I6).
    pub fn health_snapshot(&self) -> HealthSnapshot {
        let state = self.state.read();
        HealthSnapshot {
            state: state.status,
            healthy: state.status == ConnectionState::Ready,
            last_health_at: state.last_health_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    use super::*;

    #[derive(Clone)]
    struct FlakyBackend {
        connect_failures_remaining: Arc<AtomicU32>,
        healthy: Arc<AtomicBool>,
        resubscribe_should_fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ManagedBackend for FlakyBackend {
        type Handle = Arc<str>;
        type SubscriptionSpec = String;

        async fn connect(&self) -> Result<Self::Handle, FabricError> {
            if self.connect_failures_remaining.load(AtomicOrdering::SeqCst) > 0 {
                self.connect_failures_remaining
                    .fetch_sub(1, AtomicOrdering::SeqCst);
                return Err(FabricError::Unavailable("connect refused".to_owned()));
            }
            Ok(Arc::from("connected"))
        }

        async fn probe_health(&self, _handle: &Self::Handle) -> bool {
            self.healthy.load(AtomicOrdering::SeqCst)
        }

        async fn resubscribe(
            &self,
            _handle: &Self::Handle,
            _spec: &Self::SubscriptionSpec,
        ) -> Result<(), FabricError> {
            if self.resubscribe_should_fail.load(AtomicOrdering::SeqCst) {
                Err(FabricError::Unavailable("resubscribe failed".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn acquire_fails_unavailable_before_initial_connect_completes() {
        let backend = FlakyBackend {
            connect_failures_remaining: Arc::new(AtomicU32::new(0)),
            healthy: Arc::new(AtomicBool::new(true)),
            resubscribe_should_fail: Arc::new(AtomicBool::new(false)),
        };
        let manager = ConnectionManager::spawn(backend, Duration::from_millis(20));
        // Give the initial connect a moment without racing a tight busy loop.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.acquire().is_ok());
    }

    #[tokio::test]
    async fn acquire_succeeds_once_ready() {
        let backend = FlakyBackend {
            connect_failures_remaining: Arc::new(AtomicU32::new(0)),
            healthy: Arc::new(AtomicBool::new(true)),
            resubscribe_should_fail: Arc::new(AtomicBool::new(false)),
        };
        let manager = ConnectionManager::spawn(backend, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.health_snapshot().healthy);
        assert!(manager.acquire().is_ok());
    }

    #[tokio::test]
    async fn recovers_after_transient_connect_failures() {
        let backend = FlakyBackend {
            connect_failures_remaining: Arc::new(AtomicU32::new(2)),
            healthy: Arc::new(AtomicBool::new(true)),
            resubscribe_should_fail: Arc::new(AtomicBool::new(false)),
        };
        let manager = ConnectionManager::spawn(backend, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(manager.acquire().is_ok());
    }

    #[tokio::test]
    async fn degrades_after_a_single_failed_probe() {
        let healthy = Arc::new(AtomicBool::new(true));
        let backend = FlakyBackend {
            connect_failures_remaining: Arc::new(AtomicU32::new(0)),
            healthy: healthy.clone(),
            resubscribe_should_fail: Arc::new(AtomicBool::new(false)),
        };
        let manager = ConnectionManager::spawn(backend, Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(manager.acquire().is_ok());

        healthy.store(false, AtomicOrdering::SeqCst);
        manager.probe_once().await;
        assert_eq!(manager.health_snapshot().state, ConnectionState::Degraded);
        assert!(manager.acquire().is_err());
    }

    #[tokio::test]
    async fn recovers_to_ready_once_backend_becomes_healthy_again() {
        let healthy = Arc::new(AtomicBool::new(false));
        let backend = FlakyBackend {
            connect_failures_remaining: Arc::new(AtomicU32::new(0)),
            healthy: healthy.clone(),
            resubscribe_should_fail: Arc::new(AtomicBool::new(false)),
        };
        let manager = ConnectionManager::spawn(backend, Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Two consecutive failed probes close the connection and trigger a reconnect.
        manager.probe_once().await;
        manager.probe_once().await;

        healthy.store(true, AtomicOrdering::SeqCst);
        manager.probe_once().await;
        assert_eq!(manager.health_snapshot().state, ConnectionState::Ready);
        assert!(manager.acquire().is_ok());
    }

    #[tokio::test]
    async fn subscription_registry_resubscribes_on_reconnect() {
        let backend = FlakyBackend {
            connect_failures_remaining: Arc::new(AtomicU32::new(0)),
            healthy: Arc::new(AtomicBool::new(true)),
            resubscribe_should_fail: Arc::new(AtomicBool::new(false)),
        };
        let manager = ConnectionManager::spawn(backend, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let handle = manager.register_subscription("events.*".to_owned()).await;
        assert!(!handle.is_terminated());

        manager.remove_subscription(handle.id).await;
    }

    #[tokio::test]
    async fn failed_resubscribe_terminates_only_that_subscription() {
        let resubscribe_should_fail = Arc::new(AtomicBool::new(false));
        let backend = FlakyBackend {
            connect_failures_remaining: Arc::new(AtomicU32::new(0)),
            healthy: Arc::new(AtomicBool::new(true)),
            resubscribe_should_fail: resubscribe_should_fail.clone(),
        };
        let manager = ConnectionManager::spawn(backend, Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let handle = manager.register_subscription("events.*".to_owned()).await;

        resubscribe_should_fail.store(true, AtomicOrdering::SeqCst);
        manager.connect_with_backoff().await;

        assert!(handle.is_terminated());
    }

    #[test]
    fn backoff_grows_and_respects_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(200));
        let first = backoff.next_delay();
        let second = backoff.next_delay();
        assert!(second >= first || second <= Duration::from_millis(200));
        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_millis(200));
        }
    }
}
