//! The `config` module contains the [DriverConfig].

use crate::{feed::DEADLINE_POLL_INTERVAL, ChallengeKind, Role};
use ethers::types::Address;
use rollup_challenger_watcher::LogCursor;
use std::time::Duration;

/// The window in which historical events are expected to arrive back to back during replay.
pub const REPLAY_TIMEOUT: Duration = Duration::from_secs(1);

/// The [DriverConfig] struct contains the configuration for a [ChallengeDriver](crate::ChallengeDriver).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// The URL of the RPC endpoint used to index logs and send transactions.
    pub ws_endpoint: String,
    /// The address of the challenge contract.
    pub challenge: Address,
    /// The kind of the challenge contract.
    pub kind: ChallengeKind,
    /// The side of the challenge the agent plays.
    pub role: Role,
    /// The position in the log history to start replaying from, inclusive.
    pub start: LogCursor,
    /// The wall-clock interval at which the chain clock is polled while waiting on a deadline.
    pub poll_interval: Duration,
    /// The window after which the replay of historical events is considered complete.
    pub replay_timeout: Duration,
}

impl DriverConfig {
    /// Creates a new [DriverConfig] with the given configuration and the default intervals.
    pub fn new(
        ws_endpoint: String,
        challenge: Address,
        kind: ChallengeKind,
        role: Role,
        start: LogCursor,
    ) -> Self {
        Self {
            ws_endpoint,
            challenge,
            kind,
            role,
            start,
            poll_interval: DEADLINE_POLL_INTERVAL,
            replay_timeout: REPLAY_TIMEOUT,
        }
    }
}
