//! Health-aware connections
//!
//! A [`StateAwareConnection`] wraps one physical handle and carries its
//! health tag. Pool managers only read the tag; transitions belong to the
//! connection. [`HealthAwareConnection`] is the stock implementation: it
//! reconnects in the background with exponential backoff and reports every
//! transition to the diagnostic sink it was built with.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;

use crate::error::ConnectError;
use crate::services::connection::StoreHandle;
use crate::utils::retry::{retry_with_backoff, RetryConfig, RetryOutcome};

// ============================================================================
// Connection State
// ============================================================================

/// Health tag of one physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Healthy = 0,
    Reconnecting = 1,
    Failed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Healthy,
            1 => Self::Reconnecting,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A physical connection together with its health
///
/// Liveness is driven by callers: a dropped session is noticed when someone
/// calls [`report_failure`](Self::report_failure), or when an implementation
/// checks the handle in [`acquire`](Self::acquire) as the stock wrapper does.
pub trait StateAwareConnection: Send + Sync + fmt::Debug {
    fn state(&self) -> ConnectionState;

    fn handle(&self) -> &Arc<dyn StoreHandle>;

    /// The handle if the connection is healthy, `None` otherwise
    fn acquire(&self) -> Option<Arc<dyn StoreHandle>> {
        (self.state() == ConnectionState::Healthy).then(|| self.handle().clone())
    }

    /// A caller observed the session dropping
    fn report_failure(&self);

    /// The session is usable again
    fn report_restored(&self);

    /// Failures reported since the connection was last healthy
    fn failure_count(&self) -> u32;

    fn last_state_change(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Stop any background work. Called once when the pool closes.
    fn shutdown(&self) {}
}

/// Strategy turning a physical handle into a health-aware connection
pub trait ConnectionWrapperFactory: Send + Sync {
    fn wrap(&self, handle: Arc<dyn StoreHandle>, diagnostics: &Dispatch) -> Arc<dyn StateAwareConnection>;
}

// ============================================================================
// Health Aware Connection
// ============================================================================

pub struct HealthAwareConnection {
    this: Weak<HealthAwareConnection>,
    handle: Arc<dyn StoreHandle>,
    state: AtomicU8,
    failure_count: AtomicU32,
    last_state_change: Mutex<DateTime<Utc>>,
    retry: RetryConfig,
    diagnostics: Dispatch,
    shutdown: CancellationToken,
    episode: Mutex<Episode>,
}

/// Current reconnect episode.
///
/// Every state transition happens with this lock held; selection only reads
/// the atomic tag.
#[derive(Debug)]
struct Episode {
    epoch: u64,
    cancel: CancellationToken,
}

impl Episode {
    /// End the episode and stop its recovery task
    fn close(&mut self) {
        self.cancel.cancel();
        self.epoch += 1;
    }

    fn restart(&mut self, shutdown: &CancellationToken) -> Ticket {
        self.close();
        self.cancel = shutdown.child_token();
        self.ticket()
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            epoch: self.epoch,
            cancel: self.cancel.clone(),
        }
    }
}

/// Held by the recovery task of one episode
#[derive(Debug, Clone)]
struct Ticket {
    epoch: u64,
    cancel: CancellationToken,
}

impl HealthAwareConnection {
    pub fn new(handle: Arc<dyn StoreHandle>, retry: RetryConfig, diagnostics: Dispatch) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let episode = Mutex::new(Episode {
            epoch: 0,
            cancel: shutdown.child_token(),
        });

        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            handle,
            state: AtomicU8::new(ConnectionState::Healthy as u8),
            failure_count: AtomicU32::new(0),
            last_state_change: Mutex::new(Utc::now()),
            retry,
            diagnostics,
            shutdown,
            episode,
        })
    }

    /// Give up on the connection until it is restored
    pub fn mark_failed(&self) {
        let previous = {
            let mut episode = self.lock_episode();
            episode.close();
            self.swap_state(ConnectionState::Failed)
        };
        if previous != ConnectionState::Failed {
            self.log_failed(previous);
        }
    }

    /// Reconnect with backoff, then settle on Healthy or Failed.
    ///
    /// Joins the running episode if the connection is already reconnecting.
    /// Returns the state after the attempt. A shutdown, or a restore reported
    /// while backing off, leaves the state to whoever caused it.
    pub async fn recover(&self) -> ConnectionState {
        if self.shutdown.is_cancelled() {
            return self.state();
        }
        let (_, ticket) = self.begin_reconnect();
        self.run_episode(ticket).await
    }

    async fn run_episode(&self, ticket: Ticket) -> ConnectionState {
        let handle = self.handle.clone();
        let outcome = retry_with_backoff(
            &self.retry,
            &ticket.cancel,
            |err: &ConnectError| !matches!(err, ConnectError::InvalidAddress(_)),
            || {
                let handle = handle.clone();
                async move { handle.reconnect().await }
            },
        )
        .await;

        match outcome {
            RetryOutcome::Succeeded { attempts, .. } => {
                if self.settle(&ticket, ConnectionState::Healthy) {
                    self.failure_count.store(0, Ordering::Release);
                    self.log_restored(ConnectionState::Reconnecting);
                }
                self.emit(|| {
                    tracing::debug!(handle = self.handle.id(), attempts, "Reconnect succeeded")
                });
            }
            RetryOutcome::Exhausted { error, attempts } => {
                self.emit(|| {
                    tracing::warn!(
                        handle = self.handle.id(),
                        attempts,
                        error = %error,
                        "Reconnect attempts exhausted"
                    )
                });
                if self.settle(&ticket, ConnectionState::Failed) {
                    self.log_failed(ConnectionState::Reconnecting);
                }
            }
            RetryOutcome::Cancelled { attempts } => {
                self.emit(|| {
                    tracing::debug!(handle = self.handle.id(), attempts, "Reconnect cancelled")
                });
            }
        }

        self.state()
    }

    fn spawn_recovery(&self, ticket: Ticket) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    this.run_episode(ticket).await;
                });
            }
            Err(_) => self.emit(|| {
                tracing::debug!(
                    handle = self.handle.id(),
                    "No async runtime available, connection stays reconnecting until restored"
                )
            }),
        }
    }

    /// Enter Reconnecting, or join the episode already running.
    ///
    /// Returns the previous state when a new episode started.
    fn begin_reconnect(&self) -> (Option<ConnectionState>, Ticket) {
        let mut episode = self.lock_episode();
        if self.state() == ConnectionState::Reconnecting {
            return (None, episode.ticket());
        }

        let ticket = episode.restart(&self.shutdown);
        let previous = self.swap_state(ConnectionState::Reconnecting);
        (Some(previous), ticket)
    }

    /// Finish the episode `ticket` belongs to. A stale ticket changes nothing.
    fn settle(&self, ticket: &Ticket, next: ConnectionState) -> bool {
        let mut episode = self.lock_episode();
        if episode.epoch != ticket.epoch || self.state() != ConnectionState::Reconnecting {
            return false;
        }
        episode.close();
        self.swap_state(next);
        true
    }

    fn lock_episode(&self) -> MutexGuard<'_, Episode> {
        self.episode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn swap_state(&self, next: ConnectionState) -> ConnectionState {
        let previous = ConnectionState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            self.touch();
        }
        previous
    }

    fn touch(&self) {
        if let Ok(mut changed) = self.last_state_change.lock() {
            *changed = Utc::now();
        }
    }

    fn log_failed(&self, previous: ConnectionState) {
        self.emit(|| {
            tracing::error!(
                handle = self.handle.id(),
                endpoint = %self.handle.endpoint(),
                previous = %previous,
                "Store connection marked as failed"
            )
        });
    }

    fn log_restored(&self, previous: ConnectionState) {
        self.emit(|| {
            tracing::info!(
                handle = self.handle.id(),
                endpoint = %self.handle.endpoint(),
                previous = %previous,
                "Store connection restored"
            )
        });
    }

    fn emit(&self, event: impl FnOnce()) {
        tracing::dispatcher::with_default(&self.diagnostics, event);
    }
}

impl StateAwareConnection for HealthAwareConnection {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn handle(&self) -> &Arc<dyn StoreHandle> {
        &self.handle
    }

    /// Also checks the session: a healthy connection whose handle is no
    /// longer connected starts reconnecting and is not handed out.
    fn acquire(&self) -> Option<Arc<dyn StoreHandle>> {
        if self.state() != ConnectionState::Healthy {
            return None;
        }
        if !self.handle.is_connected() {
            self.report_failure();
            return None;
        }
        Some(self.handle.clone())
    }

    fn report_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;

        let (Some(previous), ticket) = self.begin_reconnect() else {
            return;
        };

        self.emit(|| {
            tracing::warn!(
                handle = self.handle.id(),
                endpoint = %self.handle.endpoint(),
                previous = %previous,
                failures,
                "Store connection lost, reconnecting"
            )
        });
        self.spawn_recovery(ticket);
    }

    fn report_restored(&self) {
        let previous = {
            let mut episode = self.lock_episode();
            episode.close();
            self.failure_count.store(0, Ordering::Release);
            self.swap_state(ConnectionState::Healthy)
        };
        if previous != ConnectionState::Healthy {
            self.log_restored(previous);
        }
    }

    fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }

    fn last_state_change(&self) -> Option<DateTime<Utc>> {
        self.last_state_change.lock().ok().map(|changed| *changed)
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for HealthAwareConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthAwareConnection")
            .field("handle", &self.handle.id())
            .field("endpoint", &self.handle.endpoint())
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .finish()
    }
}

/// Wraps every handle in a [`HealthAwareConnection`]
#[derive(Debug, Clone, Default)]
pub struct HealthAwareWrapperFactory {
    retry: RetryConfig,
}

impl HealthAwareWrapperFactory {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

impl ConnectionWrapperFactory for HealthAwareWrapperFactory {
    fn wrap(&self, handle: Arc<dyn StoreHandle>, diagnostics: &Dispatch) -> Arc<dyn StateAwareConnection> {
        HealthAwareConnection::new(handle, self.retry.clone(), diagnostics.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
