//! The state module holds the [ChallengeState] of a challenge instance and the pure
//! [classify] function that maps an [Event] onto it.

use rollup_challenger_watcher::Event;
use serde::{Deserialize, Serialize};

/// The [ChallengeState] enum is the local view of a challenge instance's outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChallengeState {
    /// The challenge has not been resolved yet. This is the initial state of every instance.
    #[default]
    Continuing = 0,
    /// The asserter's claim was upheld by a one-step proof.
    AsserterWon = 1,
    /// The asserter missed a deadline.
    AsserterTimedOut = 2,
    /// The challenger missed a deadline.
    ChallengerTimedOut = 3,
}

impl ChallengeState {
    /// Returns `true` if no further events are meaningful to the instance.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Continuing)
    }
}

/// Maps `event` to the [ChallengeState] it leaves the challenge in.
///
/// Only the two timeout events are terminal. Bisections, continuations, and the one-step
/// proof advance the protocol without ending local tracking.
pub fn classify(event: &Event) -> ChallengeState {
    match event {
        Event::AsserterTimeout(_) => ChallengeState::AsserterTimedOut,
        Event::ChallengerTimeout(_) => ChallengeState::ChallengerTimedOut,
        Event::InitiateChallenge(_)
        | Event::ContinueChallenge(_)
        | Event::MessagesBisection(_)
        | Event::OneStepProof(_) => ChallengeState::Continuing,
    }
}
