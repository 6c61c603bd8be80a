//! The types module contains the chain provenance types attached to every challenge event.

use ethers::types::{Log, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The number of [Tick]s that elapse per base-chain block.
pub const TICKS_PER_BLOCK: u64 = 1000;

/// A [Tick] is the chain-derived clock unit that all challenge deadlines are denominated in.
/// It is derived from a block height, never from wall-clock time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick(pub U256);

impl Tick {
    /// Returns the [Tick] at which the block at `block_number` begins.
    pub fn from_block_number(block_number: u64) -> Self {
        Self(U256::from(block_number) * U256::from(TICKS_PER_BLOCK))
    }

    /// Returns `true` if `self`, read as the current chain time, has reached `deadline`.
    /// A deadline is reached at the exact boundary tick, not one after it.
    pub fn reached(&self, deadline: &Tick) -> bool {
        self >= deadline
    }
}

impl From<u64> for Tick {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Tick {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The [BlockHeader] struct holds the subset of a base-chain header the watchers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// The height of the block.
    pub number: u64,
    /// The hash of the block.
    pub hash: H256,
    /// The UNIX timestamp of the block.
    pub timestamp: u64,
}

/// A position in the base chain's log history: a block height and a log index within it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogCursor {
    /// The block height.
    pub block_number: u64,
    /// The index of the log within the block.
    pub log_index: u64,
}

impl LogCursor {
    /// Creates a new [LogCursor].
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }

    /// Reads the cursor of a mined [Log]. Returns [None] for pending logs.
    pub fn of_log(log: &Log) -> Option<Self> {
        Some(Self::new(
            log.block_number?.as_u64(),
            log.log_index?.low_u64(),
        ))
    }
}

/// The [ChainInfo] struct is the chain provenance attached to every challenge event. It is used
/// to order events and to detect logs invalidated by a reorg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// The hash of the block that contains the log.
    pub block_hash: H256,
    /// The height of the block that contains the log.
    pub block_number: u64,
    /// The index of the log within the block.
    pub log_index: u64,
    /// The UNIX timestamp of the block.
    pub timestamp: u64,
}

impl ChainInfo {
    /// Builds the [ChainInfo] of `log` from the header of its enclosing block. Returns [None]
    /// if the log carries no log index.
    pub fn from_log(log: &Log, header: &BlockHeader) -> Option<Self> {
        Some(Self {
            block_hash: header.hash,
            block_number: header.number,
            log_index: log.log_index?.low_u64(),
            timestamp: header.timestamp,
        })
    }

    /// Returns the position of the log this [ChainInfo] describes.
    pub fn cursor(&self) -> LogCursor {
        LogCursor::new(self.block_number, self.log_index)
    }

    /// Returns the [Tick] at which the enclosing block begins.
    pub fn tick(&self) -> Tick {
        Tick::from_block_number(self.block_number)
    }

    /// Returns `true` if `self` can have been observed after `prev` on a single canonical
    /// chain: it is strictly later in (height, log index) order, and a log in the same block
    /// carries the same block hash.
    pub fn follows(&self, prev: &ChainInfo) -> bool {
        if self.block_number == prev.block_number && self.block_hash != prev.block_hash {
            return false;
        }
        self.cursor() > prev.cursor()
    }
}
