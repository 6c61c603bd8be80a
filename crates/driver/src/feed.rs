//! The `feed` module contains the three ways a challenge driver pulls the next [Event] off a
//! watcher's event feed.

use crate::state::{classify, ChallengeState};
use rollup_challenger_watcher::{
    ChainClock, ChallengeContract, ChallengeError, ChallengeResult, Event, Tick,
};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// The wall-clock interval at which the chain clock is polled while waiting on a deadline.
pub const DEADLINE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The receiving end of a watcher's event feed.
pub type EventFeed = mpsc::UnboundedReceiver<Event>;

/// Waits for the next [Event] on `feed` and classifies it.
///
/// ### Takes
/// - `feed`: The event feed of the challenge instance.
/// - `cancel`: The cancellation token of the challenge instance.
///
/// ### Returns
/// - `Ok((Event, ChallengeState))`: The next event and the state it leaves the challenge in.
/// - `Err(ChallengeError::FeedClosed)`: The feed closed without producing an event.
/// - `Err(ChallengeError::Cancelled)`: `cancel` fired first.
pub async fn next_event(
    feed: &mut EventFeed,
    cancel: &CancellationToken,
) -> ChallengeResult<(Event, ChallengeState)> {
    tokio::select! {
        biased;
        event = feed.recv() => received(event),
        _ = cancel.cancelled() => Err(ChallengeError::Cancelled),
    }
}

/// Waits for the next [Event] on `feed` while polling `clock` every `poll_interval`. The first
/// poll that observes the chain time at or past `deadline` submits a timeout to `contract`;
/// polling then stops and the wait continues until the resulting event arrives on the feed.
///
/// An event that is ready at the same time as a poll always wins. Failures from `clock` or
/// `contract` end the wait and are returned to the caller without retrying.
pub async fn next_event_with_deadline<C, K>(
    feed: &mut EventFeed,
    cancel: &CancellationToken,
    deadline: Tick,
    clock: &C,
    contract: &K,
    poll_interval: Duration,
) -> ChallengeResult<(Event, ChallengeState)>
where
    C: ChainClock + ?Sized,
    K: ChallengeContract + ?Sized,
{
    let mut ticker = time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polling = true;

    loop {
        tokio::select! {
            biased;
            event = feed.recv() => return received(event),
            _ = cancel.cancelled() => return Err(ChallengeError::Cancelled),
            _ = ticker.tick(), if polling => {
                let now = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ChallengeError::Cancelled),
                    now = clock.current_tick() => now.map_err(ChallengeError::ChainClock)?,
                };
                if now.reached(&deadline) {
                    tracing::info!(target: "challenge-driver", "Deadline {} reached at tick {}, submitting timeout.", deadline, now);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ChallengeError::Cancelled),
                        res = contract.submit_timeout() => res.map_err(ChallengeError::Contract)?,
                    }
                    polling = false;
                } else {
                    tracing::trace!(target: "challenge-driver", "Tick {} has not reached deadline {}.", now, deadline);
                }
            }
        }
    }
}

/// Waits up to `timeout` for the next [Event] on `feed`.
///
/// ### Returns
/// - `Ok(Some(_))`: An event arrived within the window.
/// - `Ok(None)`: Nothing arrived; the feed is untouched and still usable.
/// - `Err(ChallengeError::FeedClosed)`: The feed closed during the wait.
/// - `Err(ChallengeError::Cancelled)`: `cancel` fired first.
pub async fn try_next_event(
    feed: &mut EventFeed,
    cancel: &CancellationToken,
    timeout: Duration,
) -> ChallengeResult<Option<(Event, ChallengeState)>> {
    tokio::select! {
        biased;
        event = feed.recv() => received(event).map(Some),
        _ = cancel.cancelled() => Err(ChallengeError::Cancelled),
        _ = time::sleep(timeout) => Ok(None),
    }
}

fn received(event: Option<Event>) -> ChallengeResult<(Event, ChallengeState)> {
    let event = event.ok_or(ChallengeError::FeedClosed)?;
    let state = classify(&event);
    Ok((event, state))
}
