use anyhow::anyhow;
use ethers::types::Address;
use rollup_challenger_watcher::{
    BisectionChallengeWatcher, ChallengeWatcher, MessagesChallengeWatcher,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

/// The [ChallengeKind] enum selects the watcher layering used for a challenge contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeKind {
    /// A bare bisection challenge, watched by the [BisectionChallengeWatcher] alone.
    Bisection,
    /// A messages challenge, watched by the [MessagesChallengeWatcher].
    Messages,
}

impl ChallengeKind {
    /// Creates the watcher for a challenge of this kind deployed at `address`.
    pub fn watcher(&self, address: Address) -> Arc<dyn ChallengeWatcher> {
        match self {
            Self::Bisection => Arc::new(BisectionChallengeWatcher::new(address)),
            Self::Messages => Arc::new(MessagesChallengeWatcher::new(address)),
        }
    }
}

impl FromStr for ChallengeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bisection" => Ok(Self::Bisection),
            "messages" => Ok(Self::Messages),
            _ => Err(anyhow!("Invalid challenge kind: {}", s)),
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bisection => write!(f, "bisection"),
            Self::Messages => write!(f, "messages"),
        }
    }
}

/// The [Role] enum is the side of the challenge the local agent plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The party defending the disputed assertion. Bisects the disputed range.
    Asserter,
    /// The party disputing the assertion. Picks the segment to dispute further.
    Challenger,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asserter" => Ok(Self::Asserter),
            "challenger" => Ok(Self::Challenger),
            _ => Err(anyhow!("Invalid role: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asserter => write!(f, "asserter"),
            Self::Challenger => write!(f, "challenger"),
        }
    }
}
