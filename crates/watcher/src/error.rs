//! The `error` module contains the [ChallengeError] taxonomy shared by the watchers and the
//! challenge driver.

use ethers::types::H256;

/// A [Result] alias with a [ChallengeError] as the error variant.
pub type ChallengeResult<T> = Result<T, ChallengeError>;

/// The [ChallengeError] enum describes every way a challenge instance can fail to make progress.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    /// The event feed ended before a terminal event was observed.
    #[error("challenge notification channel terminated unexpectedly")]
    FeedClosed,
    /// The instance's cancellation token fired while waiting.
    #[error("context cancelled while waiting for event")]
    Cancelled,
    /// The chain head could not be queried while polling for a deadline.
    #[error("failed to query the chain clock: {0:#}")]
    ChainClock(anyhow::Error),
    /// The timeout transaction could not be submitted to the challenge contract.
    #[error("failed to submit challenge timeout: {0:#}")]
    Contract(anyhow::Error),
    /// Opening or reading the log subscription failed, including an unexpected closure.
    #[error("log subscription failed: {0:#}")]
    Subscription(anyhow::Error),
    /// A log passed the topic filter but no watcher layer knows how to classify it.
    #[error("unrecognized log topic {topic:?} emitted by {address:?}")]
    UnrecognizedLog {
        /// The contract that emitted the log.
        address: ethers::types::Address,
        /// The primary topic of the log, or the zero hash if the log had no topics.
        topic: H256,
    },
    /// The payload of a recognized log could not be decoded.
    #[error("failed to decode {event} log: {source}")]
    Decode {
        /// The name of the event being decoded.
        event: &'static str,
        /// The underlying ABI error.
        source: ethers::abi::Error,
    },
    /// A previously observed log was invalidated by a chain reorganization.
    #[error("reorg occurred during challenge at block #{block_number} ({block_hash:?})")]
    Reorg {
        /// The height at which the reorg was detected.
        block_number: u64,
        /// The block hash that is no longer canonical.
        block_hash: H256,
    },
}

impl ChallengeError {
    /// Returns `true` if the error was caused by the caller cancelling the instance.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the error leaves the instance's feeds intact, so the caller may
    /// retry the wait that produced it.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ChainClock(_) | Self::Contract(_))
    }
}
