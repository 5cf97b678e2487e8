//! The owned session: credentials, organization, poller and reconciler
//!
//! All state lives in [`Session`] and is only mutated from its own loop.
//! Credential loading and network work run on spawned tasks that report back
//! through an unbounded channel; messages are applied one at a time in
//! arrival order. A restart bumps the generation so results of abandoned
//! requests are ignored.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::commands::Command;
use crate::config::Config;
use crate::notifications::ResetNotifier;
use crate::providers::{ClaudeProvider, Connector, FetchError, ResolutionError};
use crate::reconciler::Reconciler;
use crate::scheduler::{self, PollState, Poller};
use crate::storage::{CredentialError, CredentialSource, Credentials};
use crate::usage::{OrganizationId, UsageSnapshot};
use crate::view::ViewModel;

/// Typed results handed from worker tasks to the session loop
#[derive(Debug)]
pub enum WorkerMessage {
    Loaded {
        generation: u64,
        result: Result<Credentials, CredentialError>,
    },
    Resolved {
        generation: u64,
        result: Result<OrganizationId, ResolutionError>,
    },
    Fetched {
        generation: u64,
        result: Result<UsageSnapshot, FetchError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the credential store
    Starting,
    Resolving,
    Polling,
    /// Credentials or organization unavailable; waits for a restart
    Failed,
}

pub struct Session {
    config: Config,
    source: Arc<dyn CredentialSource>,
    connector: Box<dyn Connector>,
    provider: Option<ClaudeProvider>,
    org: Option<OrganizationId>,
    reconciler: Reconciler,
    poller: Poller,
    phase: Phase,
    generation: u64,
    compact_mode: bool,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl Session {
    pub fn new(
        config: Config,
        source: Box<dyn CredentialSource>,
        connector: Box<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            reconciler: Reconciler::new(config.refresh_interval.as_secs()),
            poller: Poller::new(config.refresh_interval),
            config,
            source: Arc::from(source),
            connector,
            provider: None,
            org: None,
            phase: Phase::Starting,
            generation: 0,
            compact_mode: false,
            tx,
        };
        (session, rx)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn organization(&self) -> Option<&OrganizationId> {
        self.org.as_ref()
    }

    pub fn poll_state(&self) -> PollState {
        self.poller.state()
    }

    pub fn set_compact_mode(&mut self, compact: bool) {
        self.compact_mode = compact;
    }

    pub fn view(&self) -> ViewModel {
        self.reconciler.view(Utc::now(), self.compact_mode)
    }

    /// Begin loading credentials; organization discovery follows once they
    /// arrive. Also used for restart.
    pub fn start(&mut self) {
        self.generation += 1;
        self.poller.stop();
        self.provider = None;
        self.org = None;
        self.reconciler = Reconciler::new(self.config.refresh_interval.as_secs());
        self.phase = Phase::Starting;

        log::info!("Loading credentials from {}", self.source.describe());
        spawn_load(self.source.clone(), self.generation, self.tx.clone());
    }

    fn connect(&mut self, credentials: Credentials) {
        let transport = match self.connector.connect(&credentials) {
            Ok(transport) => transport,
            Err(e) => {
                log::error!("Cannot build HTTP client: {}", e);
                self.fail(e.to_string());
                return;
            }
        };

        let provider = ClaudeProvider::new(transport, &self.config);
        self.reconciler.set_status("Cookies loaded, fetching org...");
        self.phase = Phase::Resolving;
        spawn_resolve(provider.clone(), self.generation, self.tx.clone());
        self.provider = Some(provider);
    }

    fn fail(&mut self, message: String) {
        self.phase = Phase::Failed;
        self.reconciler.apply_fatal(message);
    }

    /// Start a fetch unless one is in flight or polling hasn't started
    pub fn request_fetch(&mut self) -> bool {
        let (Some(provider), Some(org)) = (&self.provider, &self.org) else {
            log::debug!("Refresh ignored: no organization");
            return false;
        };
        if !self.poller.begin_fetch(self.generation) {
            log::debug!("Refresh coalesced into the fetch in flight");
            return false;
        }
        scheduler::spawn_fetch(
            provider.clone(),
            org.clone(),
            self.generation,
            self.tx.clone(),
        );
        true
    }

    /// Apply one worker result. Returns true when the polling schedule should
    /// restart from now.
    pub fn handle_message(&mut self, message: WorkerMessage) -> bool {
        match message {
            WorkerMessage::Fetched { generation, .. } if generation != self.generation => {
                log::debug!("Dropping usage result from generation {}", generation);
                // Its slot was still held; a fetch may have queued up behind it
                self.poller.finish_fetch(generation) && self.request_fetch()
            }
            WorkerMessage::Loaded { generation, .. }
            | WorkerMessage::Resolved { generation, .. }
                if generation != self.generation =>
            {
                log::debug!("Dropping result from generation {}", generation);
                false
            }
            WorkerMessage::Loaded { result, .. } => {
                match result {
                    Ok(credentials) => {
                        log::info!("Loaded {} cookies", credentials.len());
                        self.connect(credentials);
                    }
                    Err(e) => {
                        log::error!("Cookie error: {}", e);
                        self.fail(format!("Cookie error: {}", e));
                    }
                }
                false
            }
            WorkerMessage::Resolved { result, .. } => match result {
                Ok(org) => {
                    log::info!("Organization loaded: {}", org);
                    self.org = Some(org);
                    self.phase = Phase::Polling;
                    self.reconciler.set_status("Organization loaded");
                    self.poller.start();
                    self.request_fetch();
                    true
                }
                Err(e) => {
                    log::error!("Organization lookup failed: {}", e);
                    self.fail(e.to_string());
                    false
                }
            },
            WorkerMessage::Fetched { generation, result } => {
                self.poller.finish_fetch(generation);
                match result {
                    Ok(snapshot) => {
                        let outcome = self.reconciler.apply_snapshot(snapshot);
                        if outcome.reset_crossed {
                            self.notify_reset();
                        }
                    }
                    Err(e) => self.reconciler.apply_failure(&e),
                }
                false
            }
        }
    }

    fn notify_reset(&self) {
        if let (Some(provider), Some(org)) = (&self.provider, &self.org) {
            log::info!("Five-hour window reset, sending reset prompt");
            ResetNotifier::new(provider.clone(), org.clone()).spawn();
        }
    }

    /// Apply one command. Returns false on shutdown.
    pub fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::RefreshNow => {
                self.request_fetch();
            }
            Command::ToggleCompact => self.compact_mode = !self.compact_mode,
            Command::Restart => {
                log::info!("Restarting session");
                self.start();
            }
            Command::Shutdown => return false,
        }
        true
    }

    /// Drive the session until shutdown, publishing a fresh view after every change
    pub async fn run(
        mut self,
        mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
        mut commands: mpsc::Receiver<Command>,
        views: watch::Sender<ViewModel>,
    ) {
        let period = self.poller.interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.start();
        views.send_replace(self.view());

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(message) = messages.recv() => {
                    if self.handle_message(message) {
                        ticker.reset();
                    }
                }
                _ = ticker.tick() => {
                    self.request_fetch();
                }
            }
            views.send_replace(self.view());
        }

        self.poller.stop();
        log::info!("Session stopped");
    }

    /// Resolve, fetch once and return the resulting view
    pub async fn run_once(
        mut self,
        mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
    ) -> ViewModel {
        self.start();
        while self.phase != Phase::Failed {
            let Some(message) = messages.recv().await else {
                break;
            };
            let fetched = matches!(message, WorkerMessage::Fetched { .. });
            self.handle_message(message);
            if fetched {
                break;
            }
        }
        self.view()
    }
}

/// Credential stores may hit the OS keychain or run key derivation, so the
/// load runs on the blocking pool
fn spawn_load(
    source: Arc<dyn CredentialSource>,
    generation: u64,
    tx: mpsc::UnboundedSender<WorkerMessage>,
) {
    tokio::spawn(async move {
        let result = match tokio::task::spawn_blocking(move || source.load()).await {
            Ok(result) => result,
            Err(e) => Err(CredentialError::Unavailable(e.to_string())),
        };
        if tx.send(WorkerMessage::Loaded { generation, result }).is_err() {
            log::debug!("Session closed, dropping credentials");
        }
    });
}

fn spawn_resolve(
    provider: ClaudeProvider,
    generation: u64,
    tx: mpsc::UnboundedSender<WorkerMessage>,
) {
    tokio::spawn(async move {
        let result = provider.resolve_organization().await;
        if tx.send(WorkerMessage::Resolved { generation, result }).is_err() {
            log::debug!("Session closed, dropping organization result");
        }
    });
}
