//! Fixed-interval usage polling with at most one fetch in flight

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::providers::ClaudeProvider;
use crate::session::WorkerMessage;
use crate::usage::OrganizationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No organization yet
    Idle,
    /// Waiting for the next tick or a manual refresh
    Scheduled,
    Fetching,
}

#[derive(Debug)]
pub struct Poller {
    state: PollState,
    interval: Duration,
    /// Generation of the fetch on the wire. Survives `stop` so a restart
    /// cannot put a second request in flight.
    in_flight: Option<u64>,
    /// A fetch was requested while an older generation's fetch was still out
    deferred: bool,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: PollState::Idle,
            interval,
            in_flight: None,
            deferred: false,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Organization resolved: start scheduling
    pub fn start(&mut self) {
        if self.state == PollState::Idle {
            self.state = PollState::Scheduled;
        }
    }

    /// Claim the single fetch slot for `generation`. Returns false while idle
    /// or already fetching, which coalesces a refresh into the fetch in flight.
    /// A fetch left over from before a restart holds the slot too; the request
    /// is then deferred until it reports back.
    pub fn begin_fetch(&mut self, generation: u64) -> bool {
        if self.state != PollState::Scheduled {
            return false;
        }
        if self.in_flight.is_some() {
            self.deferred = true;
            return false;
        }
        self.state = PollState::Fetching;
        self.in_flight = Some(generation);
        true
    }

    /// Release the slot held by `generation`. Success and failure both return
    /// to `Scheduled`. Returns true when a deferred fetch should start now.
    pub fn finish_fetch(&mut self, generation: u64) -> bool {
        if self.in_flight != Some(generation) {
            return false;
        }
        self.in_flight = None;
        if self.state == PollState::Fetching {
            self.state = PollState::Scheduled;
            return false;
        }
        std::mem::take(&mut self.deferred) && self.state == PollState::Scheduled
    }

    /// Stop scheduling. A fetch already on the wire keeps its slot until it finishes.
    pub fn stop(&mut self) {
        self.state = PollState::Idle;
        self.deferred = false;
    }
}

/// Run one usage fetch on a worker task and hand the typed result back to the session
pub fn spawn_fetch(
    provider: ClaudeProvider,
    org: OrganizationId,
    generation: u64,
    tx: UnboundedSender<WorkerMessage>,
) {
    tokio::spawn(async move {
        let result = provider.fetch_usage(&org).await;
        if let Err(e) = &result {
            log::warn!("Usage fetch failed: {}", e);
        }
        if tx.send(WorkerMessage::Fetched { generation, result }).is_err() {
            log::debug!("Session closed, dropping usage result");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_lifecycle() {
        let mut poller = Poller::new(Duration::from_secs(30));
        assert_eq!(poller.state(), PollState::Idle);
        assert!(!poller.begin_fetch(1));

        poller.start();
        assert_eq!(poller.state(), PollState::Scheduled);

        assert!(poller.begin_fetch(1));
        assert_eq!(poller.state(), PollState::Fetching);
        // Coalesced while in flight
        assert!(!poller.begin_fetch(1));

        assert!(!poller.finish_fetch(1));
        assert_eq!(poller.state(), PollState::Scheduled);
        assert_eq!(poller.in_flight(), None);
        assert!(poller.begin_fetch(1));

        poller.stop();
        assert_eq!(poller.state(), PollState::Idle);
        assert!(!poller.finish_fetch(1));
        assert_eq!(poller.state(), PollState::Idle);
    }

    #[test]
    fn test_start_is_idempotent_while_fetching() {
        let mut poller = Poller::new(Duration::from_secs(30));
        poller.start();
        assert!(poller.begin_fetch(1));
        poller.start();
        assert_eq!(poller.state(), PollState::Fetching);
    }

    #[test]
    fn test_fetch_from_before_restart_holds_the_slot() {
        let mut poller = Poller::new(Duration::from_secs(30));
        poller.start();
        assert!(poller.begin_fetch(1));

        // Restart, then the new generation is ready to poll
        poller.stop();
        poller.start();
        assert_eq!(poller.in_flight(), Some(1));
        assert!(!poller.begin_fetch(2));
        assert_eq!(poller.state(), PollState::Scheduled);

        // Unrelated generations don't release it
        assert!(!poller.finish_fetch(2));
        assert_eq!(poller.in_flight(), Some(1));

        // Old fetch lands: the held-back fetch is due
        assert!(poller.finish_fetch(1));
        assert!(poller.begin_fetch(2));
        assert!(!poller.finish_fetch(2));
        assert_eq!(poller.state(), PollState::Scheduled);
    }

    #[test]
    fn test_stale_finish_without_deferred_request() {
        let mut poller = Poller::new(Duration::from_secs(30));
        poller.start();
        assert!(poller.begin_fetch(1));
        poller.stop();

        assert!(!poller.finish_fetch(1));
        assert_eq!(poller.state(), PollState::Idle);
        assert_eq!(poller.in_flight(), None);
    }
}
