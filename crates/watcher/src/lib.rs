#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Contains the smart contract bindings used by the watchers.
pub mod bindings;

mod error;
pub use error::{ChallengeError, ChallengeResult};

mod types;
pub use types::{BlockHeader, ChainInfo, LogCursor, Tick, TICKS_PER_BLOCK};

mod events;
pub use events::*;

mod provider;
pub use provider::{ChainClock, ChallengeContract, LogSource, LogSubscription};

mod client;
pub use client::EthersClient;

mod watchers;
pub use watchers::{BisectionChallengeWatcher, ChallengeWatcher, MessagesChallengeWatcher};

mod subscription;
pub use subscription::start_subscription;
