//! The `drivers` module contains the [ChallengeDriver], the local state loop of a single
//! challenge instance.

use crate::{
    feed::{next_event, next_event_with_deadline, try_next_event, EventFeed},
    ChallengeState, Driver, DriverConfig, Role,
};
use anyhow::Result;
use async_trait::async_trait;
use rollup_challenger_watcher::{
    start_subscription, ChainClock, ChainInfo, ChallengeContract, ChallengeError,
    ChallengeResult, ChallengeWatcher, Event, LogSource, Tick,
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// The [DriverState] enum is the local driver's view of a challenge instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriverState {
    /// Waiting for the next event from the watcher.
    #[default]
    WaitingForEvent,
    /// A terminal [ChallengeState] was reached. Nothing more is read or submitted.
    Resolved(ChallengeState),
}

/// The progress of a challenge instance, rebuilt from the events consumed so far.
#[derive(Debug, Default)]
struct Progress {
    /// The provenance of the last consumed event.
    last: Option<ChainInfo>,
    /// The party expected to move next and its deadline.
    turn: Option<(Role, Tick)>,
    /// The last deadline a timeout was submitted for.
    timeout_submitted: Option<Tick>,
    /// The local driver state.
    state: DriverState,
}

impl Progress {
    /// Applies a consumed event, returning the terminal state if the event resolved the
    /// instance.
    fn apply(
        &mut self,
        event: &Event,
        state: ChallengeState,
    ) -> ChallengeResult<Option<ChallengeState>> {
        let info = *event.chain_info();
        if let Some(prev) = self.last {
            if !info.follows(&prev) {
                return Err(ChallengeError::Reorg {
                    block_number: prev.block_number,
                    block_hash: prev.block_hash,
                });
            }
        }
        self.last = Some(info);

        let resolved = match event {
            Event::InitiateChallenge(e) => {
                self.turn = Some((Role::Asserter, e.deadline));
                None
            }
            Event::MessagesBisection(e) => {
                self.turn = Some((Role::Challenger, e.deadline));
                None
            }
            Event::ContinueChallenge(e) => {
                self.turn = Some((Role::Asserter, e.deadline));
                None
            }
            // A completed one-step proof settles the challenge in the asserter's favor.
            Event::OneStepProof(_) => Some(ChallengeState::AsserterWon),
            Event::AsserterTimeout(_) | Event::ChallengerTimeout(_) => {
                state.is_terminal().then_some(state)
            }
        };

        if let Some(outcome) = resolved {
            self.turn = None;
            self.state = DriverState::Resolved(outcome);
        }
        Ok(resolved)
    }

    /// Returns the deadline to enforce while waiting, if the counterparty of `role` is on the
    /// clock.
    fn counterparty_deadline(&self, role: Role) -> Option<Tick> {
        self.turn
            .and_then(|(mover, deadline)| (mover != role).then_some(deadline))
    }
}

/// The [ChallengeDriver] consumes the event feed of one challenge instance until it resolves,
/// timing out the counterparty when its deadline passes.
pub struct ChallengeDriver {
    /// The configuration for the driver.
    pub config: Arc<DriverConfig>,
    /// The event feed produced by the watcher.
    events: EventFeed,
    /// The error feed produced by the watcher.
    errors: mpsc::UnboundedReceiver<ChallengeError>,
    /// The cancellation token of the instance, shared with the watcher task.
    cancel: CancellationToken,
    /// The chain clock used to enforce deadlines.
    clock: Arc<dyn ChainClock>,
    /// The challenge contract timeouts are submitted to.
    contract: Arc<dyn ChallengeContract>,
    /// The progress of the instance.
    progress: Progress,
    /// The watcher task feeding `events`, if the driver spawned it.
    watcher: Option<JoinHandle<()>>,
}

impl ChallengeDriver {
    /// Creates a new [ChallengeDriver] over existing feeds.
    pub fn new(
        config: Arc<DriverConfig>,
        events: EventFeed,
        errors: mpsc::UnboundedReceiver<ChallengeError>,
        cancel: CancellationToken,
        clock: Arc<dyn ChainClock>,
        contract: Arc<dyn ChallengeContract>,
    ) -> Self {
        Self {
            config,
            events,
            errors,
            cancel,
            clock,
            contract,
            progress: Progress::default(),
            watcher: None,
        }
    }

    /// Starts `watcher` against `source` from the configured cursor and creates a
    /// [ChallengeDriver] over its feeds. The watcher is torn down when `cancel` fires or when
    /// the driver resolves the instance.
    pub async fn spawn(
        config: Arc<DriverConfig>,
        watcher: Arc<dyn ChallengeWatcher>,
        source: Arc<dyn LogSource>,
        cancel: CancellationToken,
        clock: Arc<dyn ChainClock>,
        contract: Arc<dyn ChallengeContract>,
    ) -> ChallengeResult<Self> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let handle = start_subscription(
            watcher,
            source,
            cancel.clone(),
            config.start,
            events_tx,
            errors_tx,
        )
        .await?;

        let mut driver = Self::new(config, events, errors, cancel, clock, contract);
        driver.watcher = Some(handle);
        Ok(driver)
    }

    /// Returns the local driver state.
    pub fn state(&self) -> DriverState {
        self.progress.state
    }

    /// Drives the instance until it resolves, returning the terminal [ChallengeState].
    ///
    /// A failure reported by the watcher ends the run with that failure. Unless the failure is
    /// [transient](ChallengeError::is_transient), the instance's cancellation token is fired
    /// on return, tearing the watcher down. After a transient failure `run` may be called
    /// again; a deadline whose timeout submission failed is not submitted again.
    pub async fn run(&mut self) -> ChallengeResult<ChallengeState> {
        if let DriverState::Resolved(state) = self.progress.state {
            return Ok(state);
        }

        let mut result = tokio::select! {
            biased;
            res = drive(
                &mut self.progress,
                &mut self.events,
                &self.cancel,
                &*self.clock,
                &*self.contract,
                &self.config,
            ) => res,
            Some(err) = self.errors.recv() => Err(err),
        };

        // The watcher reports its failure before dropping the event feed.
        if matches!(result, Err(ChallengeError::FeedClosed)) {
            if let Ok(err) = self.errors.try_recv() {
                result = Err(err);
            }
        }

        match &result {
            Err(err) if err.is_transient() => {
                tracing::warn!(target: "challenge-driver", "Challenge {:?} wait failed: {}", self.config.challenge, err);
            }
            _ => {
                self.cancel.cancel();
                if let Some(handle) = self.watcher.take() {
                    let _ = handle.await;
                }
            }
        }
        result
    }
}

impl Drop for ChallengeDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Driver for ChallengeDriver {
    async fn start_loop(mut self) -> Result<()> {
        tracing::info!(target: "challenge-driver", "Starting challenge driver for {:?} as {}...", self.config.challenge, self.config.role);
        let outcome = self.run().await?;
        tracing::info!(target: "challenge-driver", "Challenge {:?} resolved: {:?}", self.config.challenge, outcome);
        Ok(())
    }
}

/// Replays the already available history, then waits for events until one resolves the
/// instance.
async fn drive(
    progress: &mut Progress,
    events: &mut EventFeed,
    cancel: &CancellationToken,
    clock: &dyn ChainClock,
    contract: &dyn ChallengeContract,
    config: &DriverConfig,
) -> ChallengeResult<ChallengeState> {
    tracing::debug!(target: "challenge-driver", "Replaying historical challenge events...");
    while let Some((event, state)) = try_next_event(events, cancel, config.replay_timeout).await? {
        if let Some(outcome) = observe(progress, &event, state)? {
            return Ok(outcome);
        }
    }
    tracing::info!(target: "challenge-driver", "Replay complete, following the challenge live.");

    loop {
        let (event, state) = match progress.counterparty_deadline(config.role) {
            Some(deadline) if progress.timeout_submitted != Some(deadline) => {
                let next = next_event_with_deadline(
                    events,
                    cancel,
                    deadline,
                    clock,
                    contract,
                    config.poll_interval,
                )
                .await;
                if let Err(ChallengeError::Contract(_)) = next {
                    progress.timeout_submitted = Some(deadline);
                }
                next?
            }
            _ => next_event(events, cancel).await?,
        };
        if let Some(outcome) = observe(progress, &event, state)? {
            return Ok(outcome);
        }
    }
}

fn observe(
    progress: &mut Progress,
    event: &Event,
    state: ChallengeState,
) -> ChallengeResult<Option<ChallengeState>> {
    let info = event.chain_info();
    tracing::debug!(target: "challenge-driver", "{} event at block #{} log #{}", event.kind(), info.block_number, info.log_index);
    progress.apply(event, state)
}
