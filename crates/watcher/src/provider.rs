//! The `provider` module defines the boundaries between the challenge core and the base chain:
//! the [LogSource], the [ChainClock], and the [ChallengeContract].

use crate::{BlockHeader, LogCursor, Tick};
use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Filter, Log, H256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A [LogSubscription] is the pair of feeds returned by [LogSource::open_log_subscription].
#[derive(Debug)]
pub struct LogSubscription {
    /// Logs matching the filter, in the order the source observed them.
    pub logs: mpsc::UnboundedReceiver<Log>,
    /// At most one failure, after which `logs` receives nothing more.
    pub errors: mpsc::UnboundedReceiver<anyhow::Error>,
}

/// The [LogSource] trait is the log-subscription and header-tracking surface of a base-chain
/// client. Implementations are shared read-only between watchers.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Opens a subscription that replays every log matching `filter` from `start` (inclusive)
    /// and then follows the chain head. The subscription stops when `cancel` fires.
    async fn open_log_subscription(
        &self,
        filter: Filter,
        start: LogCursor,
        cancel: CancellationToken,
    ) -> Result<LogSubscription>;

    /// Fetches the header of the block with the given hash.
    async fn header_by_hash(&self, hash: H256) -> Result<BlockHeader>;

    /// Fetches the header of the current chain head.
    async fn current_chain_head(&self) -> Result<BlockHeader>;
}

/// The [ChainClock] trait supplies the current chain time as a [Tick].
#[async_trait]
pub trait ChainClock: Send + Sync {
    /// Returns the [Tick] of the current chain head.
    async fn current_tick(&self) -> Result<Tick>;
}

/// The [ChallengeContract] trait is the state-changing surface of an on-chain challenge.
#[async_trait]
pub trait ChallengeContract: Send + Sync {
    /// Requests that the on-chain game resolve by timeout. A successful submission does not
    /// imply the timeout caused the resolution; the contract is the sole arbiter.
    async fn submit_timeout(&self) -> Result<()>;
}
