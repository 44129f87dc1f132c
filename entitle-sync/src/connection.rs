//! Connection lifecycle to the billing service.
//!
//! `Disconnected → Connecting → Connected`, back to `Disconnected` when the
//! service drops us, and `Closed` (terminal) on release. Failed attempts and
//! service-initiated disconnects schedule a reconnect after an exponential
//! backoff delay.

use crate::client::{BillingClient, BillingListener};
use crate::config::ReconnectConfig;
use entitle_types::BillingResult;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Exponential backoff: starts at the floor, doubles per step, capped at
/// the ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff. A ceiling below the floor is raised to the floor.
    #[must_use]
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            current: floor,
        }
    }

    /// Returns the delay to use now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// The delay [`Self::next_delay`] will return next.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Restores the floor delay.
    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    #[must_use]
    pub fn floor(&self) -> Duration {
        self.floor
    }

    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

impl From<&ReconnectConfig> for Backoff {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(config.initial_delay(), config.max_delay())
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Released. Terminal.
    Closed,
}

/// Emitted when a scheduled reconnect delay elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectRequest {
    /// 1-based count of reconnects since the last successful connection.
    pub attempt: u32,
    /// The delay that elapsed.
    pub delay: Duration,
}

/// Result of [`ConnectionManager::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Newly connected; the caller should run its bootstrap.
    Connected,
    /// Already connecting or connected; nothing was done.
    AlreadyActive,
    /// The attempt failed and a reconnect was scheduled.
    Failed(BillingResult),
    /// The manager is released.
    Closed,
}

struct Inner {
    backoff: Backoff,
    attempt: u32,
    pending: Option<JoinHandle<()>>,
    /// A reconnect was scheduled and no attempt has started since. Stays
    /// set after the timer fires, until [`ConnectionManager::start`] runs.
    requested: bool,
    /// No further reconnects may be scheduled.
    halted: bool,
}

type ReconnectHandler = Arc<dyn Fn(ReconnectRequest) + Send + Sync>;

/// Owns the connection to the billing service and its reconnect policy.
pub struct ConnectionManager {
    client: Arc<dyn BillingClient>,
    state: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
    on_reconnect: ReconnectHandler,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("next_delay", &self.next_reconnect_delay())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a disconnected manager. `on_reconnect` is invoked from a
    /// timer task each time a scheduled reconnect delay elapses; it should
    /// arrange for [`Self::start`] to be called.
    pub fn new(
        client: Arc<dyn BillingClient>,
        config: &ReconnectConfig,
        on_reconnect: impl Fn(ReconnectRequest) + Send + Sync + 'static,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            client,
            state,
            inner: Mutex::new(Inner {
                backoff: Backoff::from(config),
                attempt: 0,
                pending: None,
                requested: false,
                halted: false,
            }),
            on_reconnect: Arc::new(on_reconnect),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watches state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// True when connected and the client reports itself usable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Connected && self.client.is_ready()
    }

    /// The delay the next scheduled reconnect will use.
    #[must_use]
    pub fn next_reconnect_delay(&self) -> Duration {
        self.lock_inner().backoff.current()
    }

    /// True from the moment a reconnect is scheduled until the next
    /// connection attempt begins, including after its timer has fired.
    #[must_use]
    pub fn has_pending_reconnect(&self) -> bool {
        self.lock_inner().requested
    }

    /// Connects to the service.
    ///
    /// No-op unless `Disconnected`. If the manager is released while the
    /// attempt is in flight, the result is discarded and the connection
    /// ended.
    pub async fn start(&self, listener: BillingListener) -> ConnectOutcome {
        if self.lock_inner().halted {
            return ConnectOutcome::Closed;
        }
        let began = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !began {
            return match self.state() {
                ConnectionState::Closed => ConnectOutcome::Closed,
                _ => ConnectOutcome::AlreadyActive,
            };
        }

        {
            let mut inner = self.lock_inner();
            inner.requested = false;
            if let Some(handle) = inner.pending.take() {
                handle.abort();
            }
        }

        debug!("connecting to billing service");
        let result = self.client.start_connection(listener).await;

        let next = if result.is_ok() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        let applied = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                false
            } else {
                *state = next;
                true
            }
        });
        if !applied {
            debug!("connection attempt finished after release; ending it");
            self.client.end_connection();
            return ConnectOutcome::Closed;
        }

        if result.is_ok() {
            let mut inner = self.lock_inner();
            inner.backoff.reset();
            inner.attempt = 0;
            info!("connected to billing service");
            ConnectOutcome::Connected
        } else {
            warn!(%result, "billing service setup failed");
            self.schedule_reconnect();
            ConnectOutcome::Failed(result)
        }
    }

    /// Handles a service-initiated disconnect. Returns true if the state
    /// changed.
    pub fn on_disconnected(&self) -> bool {
        let changed = self.state.send_if_modified(|state| match state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                *state = ConnectionState::Disconnected;
                true
            }
            _ => false,
        });
        if changed {
            warn!("billing service disconnected");
            self.schedule_reconnect();
        }
        changed
    }

    /// Makes sure a reconnect is on its way if the connection is not
    /// usable. Returns true if a reconnect was scheduled by this call.
    pub fn ensure_reconnect(&self) -> bool {
        if self.state() == ConnectionState::Connected && !self.client.is_ready() {
            return self.on_disconnected();
        }
        self.schedule_reconnect().is_some()
    }

    /// Arms the reconnect timer unless a reconnect is already requested,
    /// reconnecting is halted, or the state is not `Disconnected`. Returns
    /// the delay used.
    fn schedule_reconnect(&self) -> Option<Duration> {
        let mut inner = self.lock_inner();
        if inner.halted || inner.requested {
            return None;
        }
        if self.state() != ConnectionState::Disconnected {
            return None;
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "cannot schedule billing reconnect outside a tokio runtime");
                return None;
            }
        };

        let delay = inner.backoff.next_delay();
        inner.attempt += 1;
        inner.requested = true;
        let request = ReconnectRequest {
            attempt: inner.attempt,
            delay,
        };
        info!(
            attempt = request.attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling billing reconnect"
        );

        let on_reconnect = Arc::clone(&self.on_reconnect);
        inner.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_reconnect(request);
        }));
        Some(delay)
    }

    /// Cancels any pending reconnect and refuses new ones. The current
    /// connection stays open, so calls already in flight can finish, until
    /// [`Self::release`].
    pub fn halt(&self) {
        let mut inner = self.lock_inner();
        if !inner.halted {
            debug!("billing reconnects halted");
        }
        inner.halted = true;
        inner.requested = false;
        if let Some(handle) = inner.pending.take() {
            handle.abort();
        }
    }

    /// Cancels any pending reconnect, ends the connection and moves to
    /// `Closed`. Idempotent.
    pub fn release(&self) {
        let mut inner = self.lock_inner();
        inner.halted = true;
        inner.requested = false;
        let was_open = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        });
        if let Some(handle) = inner.pending.take() {
            handle.abort();
        }
        drop(inner);

        if was_open {
            info!("terminating billing connection");
            self.client.end_connection();
        }
    }
}
