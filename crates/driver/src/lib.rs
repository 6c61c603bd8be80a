#![doc = include_str!("../README.md")]

use anyhow::Result;
use async_trait::async_trait;

mod config;
pub use config::{DriverConfig, REPLAY_TIMEOUT};

mod types;
pub use types::{ChallengeKind, Role};

mod state;
pub use state::{classify, ChallengeState};

pub mod feed;
pub use feed::{next_event, next_event_with_deadline, try_next_event, EventFeed};

mod drivers;
pub use drivers::{ChallengeDriver, DriverState};

/// The [Driver] trait defines the interface for all driver loops that are ran by the
/// `rollup-challenger` binary.
#[async_trait]
pub trait Driver {
    /// Starts the [Driver] loop.
    async fn start_loop(self) -> Result<()>;
}
