#![allow(missing_docs, clippy::too_many_arguments)]

use ethers::prelude::abigen;

// Generates the bindings for the `BisectionChallenge` base contract shared by every challenge
// variant.
abigen!(
    BisectionChallenge,
    r"[
        event InitiatedChallenge(uint256 deadlineTicks)
        event Continued(uint256 segmentIndex, uint256 deadlineTicks)
        event AsserterTimedOut()
        event ChallengerTimedOut()
        function timeoutChallenge() external
    ]"
);

// Generates the bindings for the `MessagesChallenge` contract.
abigen!(
    MessagesChallenge,
    r"[
        event Bisected(bytes32[] chainHashes, bytes32[] segmentHashes, uint256 totalLength, uint256 deadlineTicks)
        event OneStepProofCompleted()
    ]"
);
