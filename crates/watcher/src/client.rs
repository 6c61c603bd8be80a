//! The `client` module implements the chain boundaries on top of an [ethers] [Middleware].

use crate::{
    bindings::BisectionChallenge, BlockHeader, ChainClock, ChallengeContract, LogCursor,
    LogSource, LogSubscription, Tick,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use ethers::{
    providers::{Middleware, PubsubClient, StreamExt},
    types::{BlockNumber, Filter, Log, H256},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The [EthersClient] implements [LogSource] and [ChainClock] for any pubsub-capable
/// [Middleware].
#[derive(Debug)]
pub struct EthersClient<M> {
    /// The provider used to index logs and headers on the base chain.
    client: Arc<M>,
}

impl<M> Clone for EthersClient<M> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<M: Middleware> EthersClient<M> {
    /// Creates a new [EthersClient] backed by the given provider.
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }

    async fn header(&self, id: impl Into<ethers::types::BlockId> + Send) -> Result<BlockHeader> {
        let id = id.into();
        let block = self
            .client
            .get_block(id)
            .await
            .map_err(|e| anyhow!("failed to fetch block {:?}: {}", id, e))?
            .ok_or_else(|| anyhow!("block {:?} not found", id))?;

        Ok(BlockHeader {
            number: block
                .number
                .ok_or_else(|| anyhow!("block {:?} is pending", id))?
                .as_u64(),
            hash: block
                .hash
                .ok_or_else(|| anyhow!("block {:?} is pending", id))?,
            timestamp: block.timestamp.low_u64(),
        })
    }
}

#[async_trait]
impl<M> LogSource for EthersClient<M>
where
    M: Middleware + 'static,
    M::Provider: PubsubClient,
{
    async fn open_log_subscription(
        &self,
        filter: Filter,
        start: LogCursor,
        cancel: CancellationToken,
    ) -> Result<LogSubscription> {
        let (log_tx, logs) = mpsc::unbounded_channel();
        let (err_tx, errors) = mpsc::unbounded_channel();
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            if let Err(e) = replay_then_follow(client, filter, start, log_tx, cancel).await {
                tracing::error!(target: "challenge-watcher", "Log subscription failed: {:#}", e);
                let _ = err_tx.send(e);
            }
        });

        Ok(LogSubscription { logs, errors })
    }

    async fn header_by_hash(&self, hash: H256) -> Result<BlockHeader> {
        self.header(hash).await
    }

    async fn current_chain_head(&self) -> Result<BlockHeader> {
        self.header(BlockNumber::Latest).await
    }
}

#[async_trait]
impl<M> ChainClock for EthersClient<M>
where
    M: Middleware + 'static,
{
    async fn current_tick(&self) -> Result<Tick> {
        let head = self
            .client
            .get_block_number()
            .await
            .map_err(|e| anyhow!("failed to fetch the chain head: {}", e))?;
        Ok(Tick::from_block_number(head.as_u64()))
    }
}

#[async_trait]
impl<M> ChallengeContract for BisectionChallenge<M>
where
    M: Middleware + 'static,
{
    async fn submit_timeout(&self) -> Result<()> {
        let call = self.timeout_challenge();
        let pending = call
            .send()
            .await
            .map_err(|e| anyhow!("timeoutChallenge was rejected: {}", e))?;
        let tx_hash = pending.tx_hash();
        tracing::info!(target: "challenge-watcher", "Timeout transaction sent. Tx hash: {:?}", tx_hash);

        match pending
            .await
            .map_err(|e| anyhow!("failed to await timeout transaction {:?}: {}", tx_hash, e))?
        {
            Some(receipt) if receipt.status == Some(0u64.into()) => {
                bail!("timeout transaction {:?} reverted", tx_hash)
            }
            Some(_) => Ok(()),
            None => bail!("timeout transaction {:?} was dropped from the mempool", tx_hash),
        }
    }
}

/// Replays historical logs from `start` and then forwards live logs into `logs`, skipping any
/// live log at or before the last replayed position. Removed logs are always forwarded so the
/// consumer can observe the reorg.
async fn replay_then_follow<M>(
    client: Arc<M>,
    filter: Filter,
    start: LogCursor,
    logs: mpsc::UnboundedSender<Log>,
    cancel: CancellationToken,
) -> Result<()>
where
    M: Middleware + 'static,
    M::Provider: PubsubClient,
{
    // Subscribe before replaying so that nothing mined in between is missed.
    let mut live = client
        .subscribe_logs(&filter)
        .await
        .map_err(|e| anyhow!("failed to subscribe to logs: {}", e))?;

    let head = client
        .get_block_number()
        .await
        .map_err(|e| anyhow!("failed to fetch the chain head: {}", e))?;
    let history = client
        .get_logs(&filter.clone().from_block(start.block_number).to_block(head))
        .await
        .map_err(|e| anyhow!("failed to fetch historical logs: {}", e))?;
    tracing::debug!(target: "challenge-watcher", "Replaying {} historical logs from block #{}", history.len(), start.block_number);

    let mut seam = ReplaySeam::new(start);
    for log in history {
        if cancel.is_cancelled() {
            return Ok(());
        }
        if !seam.admit_replayed(&log) {
            continue;
        }
        if logs.send(log).is_err() {
            return Ok(());
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            next = live.next() => {
                let Some(log) = next else {
                    bail!("log subscription terminated early");
                };
                if !seam.admit_live(&log) {
                    continue;
                }
                if logs.send(log).is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// Tracks the seam between replayed history and the live subscription.
#[derive(Debug)]
struct ReplaySeam {
    /// The first position to emit, inclusive.
    start: LogCursor,
    /// The last replayed position.
    last: Option<LogCursor>,
}

impl ReplaySeam {
    fn new(start: LogCursor) -> Self {
        Self { start, last: None }
    }

    /// Admits a historical log at or after `start`, recording its position.
    fn admit_replayed(&mut self, log: &Log) -> bool {
        match LogCursor::of_log(log) {
            Some(cursor) if cursor >= self.start => {
                self.last = Some(cursor);
                true
            }
            _ => false,
        }
    }

    /// Admits a live log at or after `start` and after the last replayed position. Removed
    /// logs and logs without a position are always admitted so the consumer observes them.
    fn admit_live(&self, log: &Log) -> bool {
        if log.removed.unwrap_or(false) {
            return true;
        }
        match LogCursor::of_log(log) {
            Some(cursor) => cursor >= self.start && self.last.map_or(true, |last| cursor > last),
            None => true,
        }
    }
}
