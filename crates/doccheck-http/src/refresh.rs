//! Shared session state and the single-flight refresh protocol.
//!
//! The credential pair, the refresh phase and the waiter queue live behind
//! one mutex. Every critical section is synchronous, so checking the phase
//! and enqueueing a waiter happen as one step relative to other tasks.
//!
//! ```text
//!            first 401 while idle
//!   Idle ───────────────────────────▶ InFlight { waiters }
//!    ▲                                   │  401 while in flight:
//!    │    settle / lease dropped         │  enqueue waiter
//!    └───────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use doccheck_core::error::{Error, TransportError};
use doccheck_core::{AccessToken, TokenPair};

/// Result a waiter receives when the in-flight refresh settles.
pub(crate) type RefreshOutcome = Result<AccessToken, RefreshFailure>;

/// Why a refresh cycle did not produce a new access token.
#[derive(Debug, Clone)]
pub(crate) enum RefreshFailure {
    /// The service refused the refresh token, or none was held.
    Rejected,
    /// No response from the service; credentials are kept.
    Transport(TransportError),
    /// The leading task was dropped before it settled.
    Abandoned,
    /// The session was ended or replaced while the refresh was pending.
    Superseded,
}

impl From<RefreshFailure> for Error {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Rejected | RefreshFailure::Superseded => Error::SessionExpired,
            RefreshFailure::Transport(err) => Error::Network(err),
            RefreshFailure::Abandoned => Error::Network(TransportError::RefreshAbandoned),
        }
    }
}

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<RefreshOutcome>,
}

#[derive(Default)]
enum Phase {
    #[default]
    Idle,
    InFlight {
        waiters: VecDeque<Waiter>,
    },
}

/// State guarded by the [`Coordinator`] mutex.
#[derive(Default)]
pub(crate) struct Shared {
    pub tokens: TokenPair,
    phase: Phase,
    next_ticket: u64,
    generation: u64,
}

impl Shared {
    /// Mark the start of a different session (login, logout, deletion).
    /// A refresh admitted under an older generation must not touch the pair.
    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self.phase, Phase::InFlight { .. })
    }

    #[cfg(test)]
    pub fn queued(&self) -> usize {
        match &self.phase {
            Phase::Idle => 0,
            Phase::InFlight { waiters } => waiters.len(),
        }
    }

    /// Return to idle, handing back the queue in insertion order.
    fn finish(&mut self) -> VecDeque<Waiter> {
        match mem::take(&mut self.phase) {
            Phase::Idle => VecDeque::new(),
            Phase::InFlight { waiters } => waiters,
        }
    }
}

/// What a task that just saw a 401 should do next.
pub(crate) enum Admission<'a> {
    /// The pair was renewed after this request went out; retry with it.
    Rotated(AccessToken),
    /// The session was torn down after this request went out.
    Ended,
    /// No refresh is running; this task must perform it.
    Lead(RefreshLease<'a>),
    /// A refresh is running; await its outcome.
    Wait {
        ticket: u64,
        rx: oneshot::Receiver<RefreshOutcome>,
    },
}

/// Owner of the session state.
#[derive(Default)]
pub(crate) struct Coordinator {
    shared: Mutex<Shared>,
}

impl Coordinator {
    pub fn new(tokens: TokenPair) -> Self {
        Self {
            shared: Mutex::new(Shared {
                tokens,
                ..Shared::default()
            }),
        }
    }

    /// Lock the state. Critical sections never panic, so a poisoned lock
    /// still holds consistent data.
    pub fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide how to recover from a 401 on a request sent with `sent_with`.
    pub fn admit(&self, sent_with: Option<&AccessToken>) -> Admission<'_> {
        let mut guard = self.lock();
        let shared = &mut *guard;

        if !shared.is_refreshing() {
            if shared.tokens.is_empty() {
                trace!("Credentials cleared while the request was in flight");
                return Admission::Ended;
            }
            if let Some(current) = shared.tokens.access.as_ref() {
                if sent_with != Some(current) {
                    trace!("Access token already rotated; reusing it");
                    return Admission::Rotated(current.clone());
                }
            }
        }

        let ticket = shared.next_ticket;
        shared.next_ticket += 1;

        if let Phase::InFlight { waiters } = &mut shared.phase {
            let (tx, rx) = oneshot::channel();
            waiters.push_back(Waiter { ticket, tx });
            debug!(ticket, queued = waiters.len(), "Refresh in flight; queued");
            return Admission::Wait { ticket, rx };
        }

        shared.phase = Phase::InFlight {
            waiters: VecDeque::new(),
        };
        debug!(ticket, generation = shared.generation, "Starting refresh cycle");
        Admission::Lead(RefreshLease {
            coordinator: self,
            ticket,
            generation: shared.generation,
            settled: false,
        })
    }
}

/// Proof that the holder is running the one outstanding refresh.
///
/// Settling (or dropping) the lease returns the state to idle and resolves
/// every queued waiter.
pub(crate) struct RefreshLease<'a> {
    coordinator: &'a Coordinator,
    ticket: u64,
    generation: u64,
    settled: bool,
}

impl RefreshLease<'_> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Read the state while leading (e.g. to fetch the refresh token).
    pub fn with_shared<T>(&self, f: impl FnOnce(&Shared) -> T) -> T {
        f(&self.coordinator.lock())
    }

    /// Settle the cycle in one critical section and hand the outcome to each
    /// waiter in FIFO order.
    ///
    /// `apply` runs only while the session is the one this cycle was admitted
    /// under; it updates the state and decides the outcome. Otherwise the
    /// state is left alone and everyone gets [`RefreshFailure::Superseded`].
    pub fn settle(
        mut self,
        apply: impl FnOnce(&mut Shared) -> RefreshOutcome,
    ) -> (RefreshOutcome, Vec<u64>) {
        self.settled = true;

        let (outcome, waiters) = {
            let mut shared = self.coordinator.lock();
            let outcome = if shared.generation == self.generation {
                apply(&mut shared)
            } else {
                debug!(leader = self.ticket, "Session changed during refresh; discarding result");
                Err(RefreshFailure::Superseded)
            };
            (outcome, shared.finish())
        };

        let mut resolved = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped.
            let _ = waiter.tx.send(outcome.clone());
            resolved.push(waiter.ticket);
        }

        debug!(leader = self.ticket, resolved = ?resolved, ok = outcome.is_ok(), "Refresh settled");
        (outcome, resolved)
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let waiters = self.coordinator.lock().finish();
        warn!(
            leader = self.ticket,
            abandoned = waiters.len(),
            "Refresh abandoned before settling"
        );
        // Dropping the senders fails each waiter with `Abandoned`.
        drop(waiters);
    }
}

/// Await a queued refresh outcome.
pub(crate) async fn wait(ticket: u64, rx: oneshot::Receiver<RefreshOutcome>) -> RefreshOutcome {
    let outcome = rx.await.unwrap_or(Err(RefreshFailure::Abandoned));
    trace!(ticket, ok = outcome.is_ok(), "Waiter resumed");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use doccheck_core::RefreshToken;

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair::new(AccessToken::new(access), RefreshToken::new(refresh))
    }

    fn lead<'a>(coordinator: &'a Coordinator, sent_with: &AccessToken) -> RefreshLease<'a> {
        match coordinator.admit(Some(sent_with)) {
            Admission::Lead(lease) => lease,
            _ => panic!("expected to lead the refresh"),
        }
    }

    fn queue(
        coordinator: &Coordinator,
        sent_with: &AccessToken,
    ) -> (u64, oneshot::Receiver<RefreshOutcome>) {
        match coordinator.admit(Some(sent_with)) {
            Admission::Wait { ticket, rx } => (ticket, rx),
            _ => panic!("expected to wait on the refresh"),
        }
    }

    #[tokio::test]
    async fn only_first_caller_leads() {
        let t1 = AccessToken::new("T1");
        let coordinator = Coordinator::new(pair("T1", "R1"));

        let lease = lead(&coordinator, &t1);
        let (_, rx_a) = queue(&coordinator, &t1);
        let (_, rx_b) = queue(&coordinator, &t1);

        assert!(coordinator.lock().is_refreshing());
        assert_eq!(coordinator.lock().queued(), 2);

        lease.settle(|s| {
            s.tokens = pair("T2", "R2");
            Ok(AccessToken::new("T2"))
        });

        assert_eq!(wait(0, rx_a).await.unwrap().as_str(), "T2");
        assert_eq!(wait(0, rx_b).await.unwrap().as_str(), "T2");
    }

    #[tokio::test]
    async fn waiters_resolve_in_fifo_order() {
        let t1 = AccessToken::new("T1");
        let coordinator = Coordinator::new(pair("T1", "R1"));

        let lease = lead(&coordinator, &t1);
        let queued: Vec<u64> = (0..4).map(|_| queue(&coordinator, &t1).0).collect();

        let (_, resolved) = lease.settle(|_| Ok(AccessToken::new("T2")));
        assert_eq!(resolved, queued);
        assert!(queued.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn queue_is_empty_once_idle() {
        let t1 = AccessToken::new("T1");
        let coordinator = Coordinator::new(pair("T1", "R1"));

        let lease = lead(&coordinator, &t1);
        let _waiting = queue(&coordinator, &t1);
        lease.settle(|s| {
            s.tokens = TokenPair::default();
            Err(RefreshFailure::Rejected)
        });

        let shared = coordinator.lock();
        assert!(!shared.is_refreshing());
        assert_eq!(shared.queued(), 0);
        assert!(shared.tokens.is_empty());
    }

    #[tokio::test]
    async fn rejection_reaches_every_waiter() {
        let t1 = AccessToken::new("T1");
        let coordinator = Coordinator::new(pair("T1", "R1"));

        let lease = lead(&coordinator, &t1);
        let (a, rx_a) = queue(&coordinator, &t1);
        let (b, rx_b) = queue(&coordinator, &t1);
        lease.settle(|s| {
            s.tokens = TokenPair::default();
            Err(RefreshFailure::Rejected)
        });

        for (ticket, rx) in [(a, rx_a), (b, rx_b)] {
            let err: Error = wait(ticket, rx).await.unwrap_err().into();
            assert!(matches!(err, Error::SessionExpired));
        }
    }

    #[tokio::test]
    async fn dropped_lease_releases_waiters() {
        let t1 = AccessToken::new("T1");
        let coordinator = Coordinator::new(pair("T1", "R1"));

        let lease = lead(&coordinator, &t1);
        let (ticket, rx) = queue(&coordinator, &t1);
        drop(lease);

        let outcome = wait(ticket, rx).await;
        assert!(matches!(outcome, Err(RefreshFailure::Abandoned)));
        assert!(!coordinator.lock().is_refreshing());

        // The next 401 starts a fresh cycle.
        assert!(matches!(coordinator.admit(Some(&t1)), Admission::Lead(_)));
    }

    #[tokio::test]
    async fn session_change_discards_refresh_result() {
        let t1 = AccessToken::new("T1");
        let coordinator = Coordinator::new(pair("T1", "R1"));

        let lease = lead(&coordinator, &t1);
        let (ticket, rx) = queue(&coordinator, &t1);

        // Logout while the refresh is pending.
        {
            let mut shared = coordinator.lock();
            shared.tokens = TokenPair::default();
            shared.bump_generation();
        }

        let (outcome, _) = lease.settle(|s| {
            s.tokens = pair("T2", "R2");
            Ok(AccessToken::new("T2"))
        });

        assert!(matches!(outcome, Err(RefreshFailure::Superseded)));
        assert!(matches!(wait(ticket, rx).await, Err(RefreshFailure::Superseded)));
        assert!(coordinator.lock().tokens.is_empty());
    }

    #[test]
    fn stale_401_reuses_rotated_token() {
        let coordinator = Coordinator::new(pair("T2", "R2"));

        match coordinator.admit(Some(&AccessToken::new("T1"))) {
            Admission::Rotated(token) => assert_eq!(token.as_str(), "T2"),
            _ => panic!("expected the rotated token"),
        }
        assert!(!coordinator.lock().is_refreshing());
    }

    #[test]
    fn cleared_session_does_not_start_a_cycle() {
        let coordinator = Coordinator::new(TokenPair::default());

        assert!(matches!(
            coordinator.admit(Some(&AccessToken::new("T1"))),
            Admission::Ended
        ));
        assert!(!coordinator.lock().is_refreshing());
    }

    #[test]
    fn missing_access_token_still_leads() {
        let coordinator = Coordinator::new(TokenPair {
            access: None,
            refresh: Some(RefreshToken::new("R1")),
        });

        assert!(matches!(coordinator.admit(None), Admission::Lead(_)));
    }
}
