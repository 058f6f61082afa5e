//! Single-flight bookkeeping for session renewal.
//!
//! At most one renewal is in flight. Everyone who asks for a renewal while
//! one is running is parked on a oneshot channel and receives the same
//! outcome when it settles.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use super::AccessToken;
use crate::api::TransportError;

pub type RenewalOutcome = Result<AccessToken, RenewalError>;

/// Invoked once per terminal renewal failure. The caller decides what
/// "log in again" means (redirect, prompt, exit).
pub type ReauthHook = Arc<dyn Fn(&RenewalError) + Send + Sync>;

/// Why a session could not be renewed. Cloned to every waiter.
#[derive(Error, Debug, Clone)]
pub enum RenewalError {
    #[error("renewal rejected with status {status}")]
    Rejected { status: u16 },

    #[error("renewal request failed: {0}")]
    Transport(Arc<TransportError>),

    #[error("renewal timed out after {0:?}")]
    TimedOut(Duration),

    #[error("invalid renewal response: {0}")]
    InvalidResponse(String),

    #[error("session ended while renewal was in flight")]
    SessionEnded,

    #[error("renewal task stopped before settling")]
    Abandoned,
}

pub(crate) struct InFlight {
    pub epoch: u64,
    /// Credential generation when the renewal was opened.
    pub generation: u64,
    pub waiters: Vec<oneshot::Sender<RenewalOutcome>>,
}

/// Renewal in flight, if any, and who is waiting on it.
#[derive(Default)]
pub(crate) struct RenewalState {
    in_flight: Option<InFlight>,
    next_epoch: u64,
}

impl RenewalState {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Park the caller on the current renewal. When none is running, one is
    /// opened and its epoch returned: the caller must then perform it and
    /// report back through [`RenewalState::finish`].
    pub fn register(&mut self, generation: u64) -> (oneshot::Receiver<RenewalOutcome>, Option<u64>) {
        let (tx, rx) = oneshot::channel();
        match self.in_flight {
            Some(ref mut flight) => {
                flight.waiters.push(tx);
                (rx, None)
            }
            None => {
                let epoch = self.next_epoch;
                self.next_epoch += 1;
                self.in_flight = Some(InFlight {
                    epoch,
                    generation,
                    waiters: vec![tx],
                });
                (rx, Some(epoch))
            }
        }
    }

    /// Close the renewal opened under `epoch`. Returns `None` when that
    /// renewal was already abandoned by [`RenewalState::reset`].
    pub fn finish(&mut self, epoch: u64) -> Option<InFlight> {
        if self.in_flight.as_ref().map(|flight| flight.epoch) != Some(epoch) {
            return None;
        }
        self.in_flight.take()
    }

    /// Drop the in-flight renewal, if any, returning its waiters.
    pub fn reset(&mut self) -> Vec<oneshot::Sender<RenewalOutcome>> {
        self.in_flight
            .take()
            .map(|flight| flight.waiters)
            .unwrap_or_default()
    }
}

/// Resolve every waiter with the same outcome.
pub(crate) fn resolve_all(waiters: Vec<oneshot::Sender<RenewalOutcome>>, outcome: &RenewalOutcome) {
    for waiter in waiters {
        // receiver gone means the caller stopped waiting
        let _ = waiter.send(outcome.clone());
    }
}
