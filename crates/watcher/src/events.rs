//! The events module contains the typed protocol [Event]s produced by the challenge watchers.

use crate::{ChainInfo, Tick};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};

/// Emitted once when the challenge contract is initialized. The asserter must make the first
/// bisection before `deadline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateChallengeEvent {
    /// The provenance of the log.
    pub chain_info: ChainInfo,
    /// The deadline for the asserter's first move.
    pub deadline: Tick,
}

/// Emitted when the challenger picks a segment of the previous bisection to dispute further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueChallengeEvent {
    /// The provenance of the log.
    pub chain_info: ChainInfo,
    /// The index of the segment that was chosen.
    pub segment_index: U256,
    /// The deadline for the asserter's next bisection.
    pub deadline: Tick,
}

/// Emitted when the asserter failed to move before its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsserterTimeoutEvent {
    /// The provenance of the log.
    pub chain_info: ChainInfo,
}

/// Emitted when the challenger failed to move before its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengerTimeoutEvent {
    /// The provenance of the log.
    pub chain_info: ChainInfo,
}

/// Emitted when the asserter bisects a disputed range of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesBisectionEvent {
    /// The provenance of the log.
    pub chain_info: ChainInfo,
    /// The commitments to the message chain at each segment boundary.
    pub chain_hashes: Vec<H256>,
    /// The commitments to each segment.
    pub segment_hashes: Vec<H256>,
    /// The total number of messages in the disputed range.
    pub total_length: U256,
    /// The deadline for the challenger to pick a segment.
    pub deadline: Tick,
}

/// Emitted when a one-step proof settled the final indivisible step of the challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneStepProofEvent {
    /// The provenance of the log.
    pub chain_info: ChainInfo,
}

/// The [Event] enum is the closed set of protocol events a challenge watcher can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// See [InitiateChallengeEvent].
    InitiateChallenge(InitiateChallengeEvent),
    /// See [ContinueChallengeEvent].
    ContinueChallenge(ContinueChallengeEvent),
    /// See [AsserterTimeoutEvent].
    AsserterTimeout(AsserterTimeoutEvent),
    /// See [ChallengerTimeoutEvent].
    ChallengerTimeout(ChallengerTimeoutEvent),
    /// See [MessagesBisectionEvent].
    MessagesBisection(MessagesBisectionEvent),
    /// See [OneStepProofEvent].
    OneStepProof(OneStepProofEvent),
}

impl Event {
    /// Returns the [ChainInfo] of the log the event was decoded from.
    pub fn chain_info(&self) -> &ChainInfo {
        match self {
            Self::InitiateChallenge(e) => &e.chain_info,
            Self::ContinueChallenge(e) => &e.chain_info,
            Self::AsserterTimeout(e) => &e.chain_info,
            Self::ChallengerTimeout(e) => &e.chain_info,
            Self::MessagesBisection(e) => &e.chain_info,
            Self::OneStepProof(e) => &e.chain_info,
        }
    }

    /// Returns the deadline for the next move announced by this event, if any.
    pub fn deadline(&self) -> Option<Tick> {
        match self {
            Self::InitiateChallenge(e) => Some(e.deadline),
            Self::ContinueChallenge(e) => Some(e.deadline),
            Self::MessagesBisection(e) => Some(e.deadline),
            Self::AsserterTimeout(_) | Self::ChallengerTimeout(_) | Self::OneStepProof(_) => None,
        }
    }

    /// Returns a short, stable name for the event kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitiateChallenge(_) => "InitiateChallenge",
            Self::ContinueChallenge(_) => "ContinueChallenge",
            Self::AsserterTimeout(_) => "AsserterTimeout",
            Self::ChallengerTimeout(_) => "ChallengerTimeout",
            Self::MessagesBisection(_) => "MessagesBisection",
            Self::OneStepProof(_) => "OneStepProof",
        }
    }
}
