//! Periodic dataset polling.
//!
//! A [`Poller`] owns one background task per active configuration. The task is the
//! only writer of the published [`PollState`]; consumers watch it through a
//! `tokio::sync::watch` receiver and re-render when `revision` moves.
//!
//! Phases run `Idle -> Loading -> Ready | Failed`, and back to `Loading` on every
//! tick or manual refresh. Entering `Loading` clears the previous error straight
//! away. A successful poll whose annotated snapshot equals the stored one leaves
//! `snapshot` and `revision` untouched, and a failed poll never replaces the last
//! good snapshot.

use crate::dataset::{annotate, DatasetQuery, SnapshotSource};
use crate::error::ApiError;
use crate::types::Dataset;
use futures::future::BoxFuture;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollInterval {
    /// Manual refresh only.
    Off,
    Every(Duration),
}

impl PollInterval {
    /// Parses milliseconds, with `0` and `off` meaning no polling.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("off") {
            return Some(PollInterval::Off);
        }
        match s.parse::<u64>().ok()? {
            0 => Some(PollInterval::Off),
            ms => Some(PollInterval::Every(Duration::from_millis(ms))),
        }
    }

    fn ticker(self) -> Option<Interval> {
        match self {
            PollInterval::Every(period) if period > Duration::from_secs(0) => {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Clone, Debug)]
pub struct PollState {
    pub phase: PollPhase,
    /// Last good annotated snapshot. Empty until the first successful poll.
    pub snapshot: Arc<Dataset>,
    /// Bumped only when `snapshot` is replaced with different data.
    pub revision: u64,
    pub error: Option<ApiError>,
    pub query: DatasetQuery,
}

impl PollState {
    fn new(query: DatasetQuery) -> Self {
        PollState {
            phase: PollPhase::Idle,
            snapshot: Arc::new(Dataset::default()),
            revision: 0,
            error: None,
            query,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == PollPhase::Loading
    }
}

#[derive(Debug)]
enum Command {
    Refresh,
    Reconfigure(DatasetQuery, PollInterval),
}

/// Handle to a running poll loop. Dropping it tears the loop down.
pub struct Poller {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<PollState>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Starts polling; the first fetch is issued immediately.
    pub fn start(
        source: Arc<dyn SnapshotSource>,
        query: DatasetQuery,
        interval: PollInterval,
    ) -> Poller {
        let (state_tx, state_rx) = watch::channel(PollState::new(query));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let poll_loop = PollLoop {
            source,
            query,
            interval,
            state: state_tx,
            issued: 0,
        };
        let task = tokio::spawn(poll_loop.run(commands_rx));
        Poller {
            commands: commands_tx,
            state: state_rx,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    /// Fetches now. An in-flight poll is abandoned in favour of this one.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    /// Swaps the query and interval, restarting the timer and fetching at once.
    pub fn reconfigure(&self, query: DatasetQuery, interval: PollInterval) {
        self.send(Command::Reconfigure(query, interval));
    }

    /// Stops the loop. No state is published after this returns.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // The only error here is the cancellation we just asked for.
            let _ = task.await;
        }
        info!("Dataset poller stopped");
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Dataset poller is no longer running");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct InFlight {
    seq: u64,
    fetch: BoxFuture<'static, Result<Dataset, ApiError>>,
}

struct PollLoop {
    source: Arc<dyn SnapshotSource>,
    query: DatasetQuery,
    interval: PollInterval,
    state: watch::Sender<PollState>,
    /// Sequence number of the most recently issued fetch.
    issued: u64,
}

impl PollLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(
            "Starting dataset poller ({:?}, {:?})",
            self.query, self.interval
        );
        let mut ticker = self.interval.ticker();
        let mut in_flight = Some(self.issue());

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Refresh) => {
                        if in_flight.is_some() {
                            debug!("Manual refresh supersedes poll #{}", self.issued);
                        }
                        in_flight = Some(self.issue());
                    }
                    Some(Command::Reconfigure(query, interval)) => {
                        info!("Reconfiguring dataset poller ({:?}, {:?})", query, interval);
                        self.query = query;
                        self.interval = interval;
                        ticker = interval.ticker();
                        in_flight = Some(self.issue());
                    }
                    None => break,
                },
                _ = next_tick(&mut ticker) => {
                    if in_flight.is_some() {
                        debug!("Poll #{} still in flight; skipping tick", self.issued);
                    } else {
                        in_flight = Some(self.issue());
                    }
                }
                (seq, result) = settle(&mut in_flight) => {
                    in_flight = None;
                    self.complete(seq, result);
                }
            }
        }
        info!("Dataset poller handle dropped; exiting");
    }

    fn issue(&mut self) -> InFlight {
        self.issued += 1;
        let query = self.query;
        self.state.send_if_modified(|state| {
            let changed = state.phase != PollPhase::Loading
                || state.error.is_some()
                || state.query != query;
            state.phase = PollPhase::Loading;
            state.error = None;
            state.query = query;
            changed
        });
        debug!("Issuing poll #{}", self.issued);
        InFlight {
            seq: self.issued,
            fetch: self.source.fetch(query),
        }
    }

    fn complete(&mut self, seq: u64, result: Result<Dataset, ApiError>) {
        if seq != self.issued {
            debug!("Discarding stale poll #{} (latest is #{})", seq, self.issued);
            return;
        }
        match result {
            Ok(raw) => {
                let next = annotate(raw);
                self.state.send_modify(|state| {
                    if *state.snapshot == next {
                        debug!("Poll #{} returned an unchanged dataset", seq);
                    } else {
                        state.snapshot = Arc::new(next);
                        state.revision += 1;
                        debug!("Poll #{} published revision {}", seq, state.revision);
                    }
                    state.phase = PollPhase::Ready;
                });
            }
            Err(e) => {
                warn!("Poll #{} failed: {}", seq, e);
                self.state.send_modify(|state| {
                    state.phase = PollPhase::Failed;
                    state.error = Some(e);
                });
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => futures::future::pending().await,
    }
}

async fn settle(in_flight: &mut Option<InFlight>) -> (u64, Result<Dataset, ApiError>) {
    match in_flight {
        Some(f) => {
            let result = f.fetch.as_mut().await;
            (f.seq, result)
        }
        None => futures::future::pending().await,
    }
}
