//! Token renewal coordination.
//!
//! The coordinator owns the per-session state machine:
//!
//! ```text
//! Authenticated --401--> Refreshing --ok--> Authenticated
//!                             \---fail--> Unauthenticated (until next login)
//! ```
//!
//! Renewal is single-flight: the first unauthorized response starts one
//! renewal task and every other request that hits an unauthorized response
//! while it runs awaits the same shared outcome. The task is spawned, so it
//! completes even if every waiter goes away.
//!
//! Every transition bumps an epoch. A renewal only commits its result when
//! the epoch is still the one it started under, and sign-in/sign-out wait
//! for an in-flight renewal before committing, so a renewal never writes
//! over a session it did not start from.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::auth::{Session, SessionStore, StoreError, TokenPair};

use super::controller::SessionController;
use super::error::RenewalFailure;

/// Buffer size for the session event channel.
/// Events are rare (sign-in, renewal, end); 16 leaves room for slow subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 16;

pub type RenewalOutcome = Result<(), RenewalFailure>;

type RenewalHandle = Shared<BoxFuture<'static, RenewalOutcome>>;

/// Observable coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Authenticated,
    Refreshing,
    Unauthenticated,
}

/// Notifications for the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    Renewed,
    SignedOut,
    /// The session could not be renewed; the application should navigate
    /// to `redirect_to` and ask the user to sign in again.
    Ended {
        redirect_to: String,
        reason: RenewalFailure,
    },
}

enum State {
    Authenticated,
    Refreshing(RenewalHandle),
    Unauthenticated,
}

struct Machine {
    state: State,
    epoch: u64,
}

impl Machine {
    fn transition(&mut self, state: State) -> u64 {
        self.state = state;
        self.epoch += 1;
        self.epoch
    }

    fn in_flight(&self) -> Option<RenewalHandle> {
        match &self.state {
            State::Refreshing(handle) => Some(handle.clone()),
            _ => None,
        }
    }
}

struct Inner {
    controller: SessionController,
    store: Arc<SessionStore>,
    machine: Mutex<Machine>,
    events: broadcast::Sender<SessionEvent>,
    login_entry_point: String,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// Create a coordinator whose initial state reflects what the store holds
    pub fn new(
        controller: SessionController,
        store: Arc<SessionStore>,
        login_entry_point: impl Into<String>,
    ) -> Self {
        let state = if store.load().is_some() {
            State::Authenticated
        } else {
            State::Unauthenticated
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                controller,
                store,
                machine: Mutex::new(Machine { state, epoch: 0 }),
                events,
                login_entry_point: login_entry_point.into(),
            }),
        }
    }

    pub fn state(&self) -> AuthState {
        match self.inner.lock_machine().state {
            State::Authenticated => AuthState::Authenticated,
            State::Refreshing(_) => AuthState::Refreshing,
            State::Unauthenticated => AuthState::Unauthenticated,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Persist a freshly issued session once no renewal is running.
    pub(crate) async fn sign_in(&self, session: &Session, tokens: &TokenPair) -> Result<(), StoreError> {
        loop {
            self.settle().await;

            let committed = {
                let mut machine = self.inner.lock_machine();
                if machine.in_flight().is_some() {
                    false
                } else {
                    self.inner.store.save(session, tokens)?;
                    machine.transition(State::Authenticated);
                    true
                }
            };

            if committed {
                self.inner.emit(SessionEvent::SignedIn {
                    user_id: session.user_id.clone(),
                });
                return Ok(());
            }
        }
    }

    /// Clear the stored session once no renewal is running.
    pub(crate) async fn sign_out(&self) -> Result<(), StoreError> {
        loop {
            self.settle().await;

            let committed = {
                let mut machine = self.inner.lock_machine();
                if machine.in_flight().is_some() {
                    false
                } else {
                    self.inner.store.clear()?;
                    machine.transition(State::Unauthenticated);
                    true
                }
            };

            if committed {
                self.inner.emit(SessionEvent::SignedOut);
                return Ok(());
            }
        }
    }

    /// Wait for an in-flight renewal to finish, whatever its outcome
    pub async fn settle(&self) {
        let handle = self.inner.lock_machine().in_flight();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Obtain a usable access token after `stale_access_token` was rejected.
    ///
    /// Joins the in-flight renewal when there is one. If the stored token has
    /// already moved past `stale_access_token`, returns immediately so the
    /// caller can replay with the current token. A session written to the
    /// store by another client is adopted rather than refused.
    pub async fn renew(&self, stale_access_token: &str) -> RenewalOutcome {
        let handle = loop {
            let epoch = {
                let machine = self.inner.lock_machine();
                if let Some(handle) = machine.in_flight() {
                    debug!("Joining in-flight token renewal");
                    break handle;
                }
                machine.epoch
            };

            // Read outside the lock; the epoch tells us if anything moved meanwhile
            let stored = self.inner.store.load();

            let mut machine = self.inner.lock_machine();
            if machine.epoch != epoch {
                continue;
            }

            let signed_in = matches!(machine.state, State::Authenticated);
            let Some(stored) = stored else {
                if signed_in {
                    return Err(self.inner.end_session(&mut machine, RenewalFailure::MissingSession));
                }
                return Err(RenewalFailure::NotAuthenticated);
            };
            if !signed_in {
                info!(user_id = %stored.session.user_id, "Adopting session found in store");
                machine.transition(State::Authenticated);
            }
            if stored.access_token != stale_access_token {
                debug!("Access token already renewed, skipping refresh");
                return Ok(());
            }
            let Some(refresh_token) = stored.refresh_token else {
                return Err(self.inner.end_session(&mut machine, RenewalFailure::MissingRefreshToken));
            };

            break Inner::spawn_renewal(&self.inner, &mut machine, stored.session, refresh_token);
        };

        handle.await
    }
}

impl Inner {
    fn lock_machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Clear the store, drop to `Unauthenticated` and announce the end once.
    fn end_session(&self, machine: &mut Machine, reason: RenewalFailure) -> RenewalFailure {
        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear session store");
        }
        machine.transition(State::Unauthenticated);
        warn!(reason = %reason, "Session ended");
        self.emit(SessionEvent::Ended {
            redirect_to: self.login_entry_point.clone(),
            reason: reason.clone(),
        });
        reason
    }

    /// Start the renewal task and move `machine` to `Refreshing`.
    ///
    /// The caller holds the machine lock, so the task cannot commit before
    /// the handle is in place.
    fn spawn_renewal(
        inner: &Arc<Inner>,
        machine: &mut Machine,
        session: Session,
        refresh_token: String,
    ) -> RenewalHandle {
        let epoch = machine.epoch + 1;

        let task_inner = Arc::clone(inner);
        let task = tokio::spawn(async move { task_inner.run_renewal(epoch, session, refresh_token).await });

        let inner = Arc::clone(inner);
        let handle = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Token renewal task did not complete");
                    let mut machine = inner.lock_machine();
                    if machine.epoch == epoch {
                        Err(inner.end_session(&mut machine, RenewalFailure::Aborted))
                    } else {
                        Err(RenewalFailure::Aborted)
                    }
                }
            }
        }
        .boxed()
        .shared();

        let assigned = machine.transition(State::Refreshing(handle.clone()));
        debug_assert_eq!(assigned, epoch);
        handle
    }

    async fn run_renewal(&self, epoch: u64, session: Session, refresh_token: String) -> RenewalOutcome {
        info!(user_id = %session.user_id, "Renewing access token");

        let refreshed = self.controller.refresh(&refresh_token).await;

        let mut machine = self.lock_machine();
        if machine.epoch != epoch {
            warn!(user_id = %session.user_id, "Session changed during renewal, discarding result");
            return Err(RenewalFailure::Superseded);
        }

        let result = match refreshed {
            Ok(tokens) => self
                .store
                .save(&session, &tokens)
                .map_err(|e| RenewalFailure::Store(e.to_string())),
            Err(e) => Err(RenewalFailure::from(&e)),
        };

        match result {
            Ok(()) => {
                machine.transition(State::Authenticated);
                info!(user_id = %session.user_id, "Access token renewed");
                self.emit(SessionEvent::Renewed);
                Ok(())
            }
            Err(reason) => Err(self.end_session(&mut machine, reason)),
        }
    }
}
