use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::renewal::{resolve_all, ReauthHook, RenewalError, RenewalOutcome, RenewalState};
use super::AccessToken;

/// The credential a request was (or will be) dispatched with.
#[derive(Debug, Clone)]
pub struct CredentialSnapshot {
    pub token: Option<AccessToken>,
    /// Bumped on every change to the credential.
    pub generation: u64,
}

/// Why the credential was last dropped, and the generation that left.
struct Cleared {
    generation: u64,
    reason: RenewalError,
}

#[derive(Default)]
struct SessionData {
    credential: Option<AccessToken>,
    generation: u64,
    renewal: RenewalState,
    cleared: Option<Cleared>,
}

impl SessionData {
    fn replace_credential(&mut self, credential: Option<AccessToken>) {
        self.credential = credential;
        self.generation += 1;
    }

    fn clear(&mut self, reason: RenewalError) {
        self.replace_credential(None);
        self.cleared = Some(Cleared {
            generation: self.generation,
            reason,
        });
    }
}

/// In-memory session: the access credential plus renewal coordination.
///
/// The lock is held only for short, synchronous sections and never across
/// an await point.
pub(crate) struct Session {
    data: Mutex<SessionData>,
    reauth: Option<ReauthHook>,
}

impl Session {
    pub fn new(reauth: Option<ReauthHook>) -> Self {
        Self {
            data: Mutex::new(SessionData::default()),
            reauth,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> CredentialSnapshot {
        let data = self.lock();
        CredentialSnapshot {
            token: data.credential.clone(),
            generation: data.generation,
        }
    }

    pub fn set_credential(&self, token: AccessToken) {
        self.lock().replace_credential(Some(token));
    }

    pub fn has_credential(&self) -> bool {
        self.lock().credential.is_some()
    }

    pub fn is_renewing(&self) -> bool {
        self.lock().renewal.is_in_flight()
    }

    /// What became of the credential seen at `generation`.
    ///
    /// `Some(Ok(_))` when it has been replaced, `Some(Err(_))` when the
    /// session was dropped after it (failed renewal or logout), and `None`
    /// when nothing has happened yet and a renewal is needed.
    pub fn settled_since(&self, generation: u64) -> Option<RenewalOutcome> {
        let data = self.lock();
        if data.generation == generation {
            return None;
        }
        if let Some(ref token) = data.credential {
            return Some(Ok(token.clone()));
        }
        match data.cleared {
            Some(ref cleared) if cleared.generation > generation => Some(Err(cleared.reason.clone())),
            _ => None,
        }
    }

    /// See [`RenewalState::register`].
    pub fn register_renewal(&self) -> (oneshot::Receiver<RenewalOutcome>, Option<u64>) {
        let mut data = self.lock();
        let generation = data.generation;
        data.renewal.register(generation)
    }

    /// Apply the outcome of the renewal opened under `epoch` and wake its
    /// waiters. The re-authentication hook fires once, before any waiter
    /// observes the failure.
    ///
    /// A credential set while the renewal was running wins over its outcome.
    pub fn settle(&self, epoch: u64, outcome: RenewalOutcome) {
        let waiters = {
            let mut data = self.lock();
            let Some(flight) = data.renewal.finish(epoch) else {
                debug!(epoch, "Discarding result of abandoned renewal");
                return;
            };
            let replaced = if flight.generation != data.generation {
                data.credential.clone()
            } else {
                None
            };
            if let Some(current) = replaced {
                drop(data);
                debug!(epoch, "Credential replaced during renewal, keeping it");
                resolve_all(flight.waiters, &Ok(current));
                return;
            }
            match outcome {
                Ok(ref token) => data.replace_credential(Some(token.clone())),
                Err(ref e) => data.clear(e.clone()),
            }
            flight.waiters
        };

        match outcome {
            Ok(_) => info!(waiters = waiters.len(), "Session renewed"),
            Err(ref e) => {
                warn!(
                    error = %e,
                    waiters = waiters.len(),
                    "Session renewal failed, re-authentication required"
                );
                if let Some(ref hook) = self.reauth {
                    hook(e);
                }
            }
        }

        resolve_all(waiters, &outcome);
    }

    /// Forget the credential and any renewal in flight. Waiters of that
    /// renewal are told the session ended; its late result is discarded.
    pub fn end(&self) {
        let waiters = {
            let mut data = self.lock();
            data.clear(RenewalError::SessionEnded);
            data.renewal.reset()
        };
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "Ending session with renewal in flight");
        }
        resolve_all(waiters, &Err(RenewalError::SessionEnded));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counting_hook() -> (ReauthHook, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let hook: ReauthHook = Arc::new(move |_: &RenewalError| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hook, count)
    }

    #[test]
    fn test_generation_tracks_changes() {
        let session = Session::new(None);
        let first = session.snapshot();
        assert!(first.token.is_none());

        session.set_credential(AccessToken::from("T1"));
        let second = session.snapshot();
        assert_eq!(second.token, Some(AccessToken::from("T1")));
        assert!(second.generation > first.generation);
    }

    #[test]
    fn test_settled_since() {
        let session = Session::new(None);
        session.set_credential(AccessToken::from("T1"));
        let seen = session.snapshot().generation;
        assert!(session.settled_since(seen).is_none());

        session.set_credential(AccessToken::from("T2"));
        assert!(matches!(session.settled_since(seen), Some(Ok(ref t)) if *t == AccessToken::from("T2")));

        // a failed renewal answers everyone who sent before it
        let before_failure = session.snapshot().generation;
        let (_rx, epoch) = session.register_renewal();
        session.settle(epoch.unwrap(), Err(RenewalError::Rejected { status: 401 }));
        assert!(matches!(
            session.settled_since(before_failure),
            Some(Err(RenewalError::Rejected { status: 401 }))
        ));
        assert!(matches!(session.settled_since(seen), Some(Err(_))));

        // but not requests sent afterwards
        assert!(session.settled_since(session.snapshot().generation).is_none());
    }

    #[test]
    fn test_settled_since_after_logout() {
        let session = Session::new(None);
        session.set_credential(AccessToken::from("T1"));
        let seen = session.snapshot().generation;
        session.end();
        assert!(matches!(
            session.settled_since(seen),
            Some(Err(RenewalError::SessionEnded))
        ));
    }

    #[test]
    fn test_settle_success_stores_credential() {
        let (hook, fired) = counting_hook();
        let session = Session::new(Some(hook));
        let (mut rx, epoch) = session.register_renewal();
        assert!(session.is_renewing());

        session.settle(epoch.unwrap(), Ok(AccessToken::from("T2")));
        assert!(!session.is_renewing());
        assert_eq!(session.snapshot().token, Some(AccessToken::from("T2")));
        assert_eq!(rx.try_recv().unwrap().unwrap(), AccessToken::from("T2"));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_settle_failure_clears_and_fires_hook_once() {
        let (hook, fired) = counting_hook();
        let session = Session::new(Some(hook));
        session.set_credential(AccessToken::from("T1"));

        let (mut rx1, epoch) = session.register_renewal();
        let (mut rx2, _) = session.register_renewal();
        let (mut rx3, _) = session.register_renewal();

        session.settle(epoch.unwrap(), Err(RenewalError::Rejected { status: 401 }));
        assert!(!session.has_credential());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            assert!(matches!(
                rx.try_recv(),
                Ok(Err(RenewalError::Rejected { status: 401 }))
            ));
        }
    }

    #[test]
    fn test_end_resolves_waiters_and_discards_late_result() {
        let (hook, fired) = counting_hook();
        let session = Session::new(Some(hook));
        session.set_credential(AccessToken::from("T1"));
        let (mut rx, epoch) = session.register_renewal();

        session.end();
        assert!(!session.has_credential());
        assert!(!session.is_renewing());
        assert!(matches!(rx.try_recv(), Ok(Err(RenewalError::SessionEnded))));

        session.settle(epoch.unwrap(), Ok(AccessToken::from("T2")));
        assert!(!session.has_credential());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_login_during_failed_renewal_is_kept() {
        let (hook, fired) = counting_hook();
        let session = Session::new(Some(hook));
        session.set_credential(AccessToken::from("T1"));
        let (mut rx, epoch) = session.register_renewal();

        session.set_credential(AccessToken::from("T3"));
        session.settle(epoch.unwrap(), Err(RenewalError::Rejected { status: 401 }));

        assert_eq!(session.snapshot().token, Some(AccessToken::from("T3")));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(rx.try_recv().unwrap().unwrap(), AccessToken::from("T3"));
    }

    #[test]
    fn test_login_during_successful_renewal_is_kept() {
        let session = Session::new(None);
        let (mut rx, epoch) = session.register_renewal();

        session.set_credential(AccessToken::from("T3"));
        session.settle(epoch.unwrap(), Ok(AccessToken::from("T2")));

        assert_eq!(session.snapshot().token, Some(AccessToken::from("T3")));
        assert_eq!(rx.try_recv().unwrap().unwrap(), AccessToken::from("T3"));
    }
}
