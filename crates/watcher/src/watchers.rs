//! The `watchers` module contains the [ChallengeWatcher] trait and its layered implementations.
//!
//! Every challenge variant shares the bisection primitive, so the [BisectionChallengeWatcher]
//! classifies the shared logs exactly once. A variant watcher such as the
//! [MessagesChallengeWatcher] owns a base watcher, recognizes its own logs, and forwards
//! everything else to the base through [ChallengeWatcher::topics] and
//! [ChallengeWatcher::classify].

use crate::{
    bindings::{
        AsserterTimedOutFilter, BisectedFilter, ChallengerTimedOutFilter, ContinuedFilter,
        InitiatedChallengeFilter, OneStepProofCompletedFilter,
    },
    AsserterTimeoutEvent, ChainInfo, ChallengeError, ChallengeResult, ChallengerTimeoutEvent,
    ContinueChallengeEvent, Event, InitiateChallengeEvent, MessagesBisectionEvent,
    OneStepProofEvent, Tick,
};
use ethers::{
    abi::RawLog,
    contract::EthEvent,
    types::{Address, Filter, Log, ValueOrArray, H256},
};
use std::sync::OnceLock;

/// The [ChallengeWatcher] trait classifies the raw logs of one challenge contract into
/// [Event]s.
pub trait ChallengeWatcher: Send + Sync {
    /// Returns the address of the watched challenge contract.
    fn address(&self) -> Address;

    /// Returns every primary topic this watcher, or any watcher it wraps, can classify.
    fn topics(&self) -> Vec<H256>;

    /// Classifies and decodes `log`, delegating to the wrapped watcher if the topic is not one
    /// of this watcher's own.
    fn classify(&self, chain_info: ChainInfo, log: &Log) -> ChallengeResult<Event>;

    /// Returns the log [Filter] scoped to [Self::address] and [Self::topics].
    fn filter(&self) -> Filter {
        let topics: Vec<Option<H256>> = self.topics().into_iter().map(Some).collect();
        Filter::new()
            .address(self.address())
            .topic0(ValueOrArray::Array(topics))
    }
}

/// The primary topics of the [BisectionChallengeWatcher]'s logs.
#[derive(Debug)]
struct BisectionTopics {
    initiated: H256,
    continued: H256,
    asserter_timed_out: H256,
    challenger_timed_out: H256,
}

/// The primary topics of the [MessagesChallengeWatcher]'s own logs.
#[derive(Debug)]
struct MessagesTopics {
    bisected: H256,
    one_step_proof_completed: H256,
}

fn bisection_topics() -> &'static BisectionTopics {
    static TOPICS: OnceLock<BisectionTopics> = OnceLock::new();
    TOPICS.get_or_init(|| BisectionTopics {
        initiated: InitiatedChallengeFilter::signature(),
        continued: ContinuedFilter::signature(),
        asserter_timed_out: AsserterTimedOutFilter::signature(),
        challenger_timed_out: ChallengerTimedOutFilter::signature(),
    })
}

fn messages_topics() -> &'static MessagesTopics {
    static TOPICS: OnceLock<MessagesTopics> = OnceLock::new();
    TOPICS.get_or_init(|| MessagesTopics {
        bisected: BisectedFilter::signature(),
        one_step_proof_completed: OneStepProofCompletedFilter::signature(),
    })
}

/// Returns the primary topic of `log`, or the zero hash if it has none.
fn primary_topic(log: &Log) -> H256 {
    log.topics.first().copied().unwrap_or_default()
}

/// Decodes the payload of `log` as the event `E`.
fn decode<E: EthEvent>(log: &Log) -> ChallengeResult<E> {
    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    <E as EthEvent>::decode_log(&raw).map_err(|source| ChallengeError::Decode {
        event: std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or_default(),
        source,
    })
}

/// The [BisectionChallengeWatcher] classifies the logs every bisection challenge emits:
/// initiation, continuation, and the two timeouts. It is the innermost layer.
#[derive(Debug, Clone)]
pub struct BisectionChallengeWatcher {
    /// The address of the challenge contract.
    address: Address,
}

impl BisectionChallengeWatcher {
    /// Creates a new [BisectionChallengeWatcher] for the challenge at `address`.
    pub fn new(address: Address) -> Self {
        bisection_topics();
        Self { address }
    }
}

impl ChallengeWatcher for BisectionChallengeWatcher {
    fn address(&self) -> Address {
        self.address
    }

    fn topics(&self) -> Vec<H256> {
        let t = bisection_topics();
        vec![
            t.initiated,
            t.continued,
            t.asserter_timed_out,
            t.challenger_timed_out,
        ]
    }

    fn classify(&self, chain_info: ChainInfo, log: &Log) -> ChallengeResult<Event> {
        let t = bisection_topics();
        let topic = primary_topic(log);

        if topic == t.initiated {
            let ev = decode::<InitiatedChallengeFilter>(log)?;
            Ok(Event::InitiateChallenge(InitiateChallengeEvent {
                chain_info,
                deadline: Tick(ev.deadline_ticks),
            }))
        } else if topic == t.continued {
            let ev = decode::<ContinuedFilter>(log)?;
            Ok(Event::ContinueChallenge(ContinueChallengeEvent {
                chain_info,
                segment_index: ev.segment_index,
                deadline: Tick(ev.deadline_ticks),
            }))
        } else if topic == t.asserter_timed_out {
            decode::<AsserterTimedOutFilter>(log)?;
            Ok(Event::AsserterTimeout(AsserterTimeoutEvent { chain_info }))
        } else if topic == t.challenger_timed_out {
            decode::<ChallengerTimedOutFilter>(log)?;
            Ok(Event::ChallengerTimeout(ChallengerTimeoutEvent { chain_info }))
        } else {
            Err(ChallengeError::UnrecognizedLog {
                address: log.address,
                topic,
            })
        }
    }
}

/// The [MessagesChallengeWatcher] extends the [BisectionChallengeWatcher] with the message
/// segment bisection and the terminal one-step proof.
#[derive(Debug, Clone)]
pub struct MessagesChallengeWatcher {
    /// The wrapped base watcher, bound to the same contract.
    bisection: BisectionChallengeWatcher,
}

impl MessagesChallengeWatcher {
    /// Creates a new [MessagesChallengeWatcher] for the challenge at `address`.
    pub fn new(address: Address) -> Self {
        messages_topics();
        Self {
            bisection: BisectionChallengeWatcher::new(address),
        }
    }
}

impl ChallengeWatcher for MessagesChallengeWatcher {
    fn address(&self) -> Address {
        self.bisection.address()
    }

    fn topics(&self) -> Vec<H256> {
        let t = messages_topics();
        let mut topics = vec![t.bisected, t.one_step_proof_completed];
        topics.extend(self.bisection.topics());
        topics
    }

    fn classify(&self, chain_info: ChainInfo, log: &Log) -> ChallengeResult<Event> {
        let t = messages_topics();
        let topic = primary_topic(log);

        if topic == t.bisected {
            let ev = decode::<BisectedFilter>(log)?;
            Ok(Event::MessagesBisection(MessagesBisectionEvent {
                chain_info,
                chain_hashes: ev.chain_hashes.into_iter().map(H256::from).collect(),
                segment_hashes: ev.segment_hashes.into_iter().map(H256::from).collect(),
                total_length: ev.total_length,
                deadline: Tick(ev.deadline_ticks),
            }))
        } else if topic == t.one_step_proof_completed {
            decode::<OneStepProofCompletedFilter>(log)?;
            Ok(Event::OneStepProof(OneStepProofEvent { chain_info }))
        } else {
            self.bisection.classify(chain_info, log)
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use ethers::{
        abi::{encode, Token},
        types::{Bytes, U256, U64},
    };
    use std::collections::HashSet;

    pub(crate) fn address() -> Address {
        Address::repeat_byte(0x42)
    }

    pub(crate) fn chain_info(block_number: u64, log_index: u64) -> ChainInfo {
        ChainInfo {
            block_hash: H256::from_low_u64_be(block_number),
            block_number,
            log_index,
            timestamp: block_number * 12,
        }
    }

    pub(crate) fn raw_log(topic: H256, data: Vec<u8>, block_number: u64, log_index: u64) -> Log {
        Log {
            address: address(),
            topics: vec![topic],
            data: Bytes::from(data),
            block_hash: Some(H256::from_low_u64_be(block_number)),
            block_number: Some(U64::from(block_number)),
            log_index: Some(U256::from(log_index)),
            ..Default::default()
        }
    }

    pub(crate) fn bisected_log(
        segment_hashes: &[H256],
        total_length: u64,
        deadline: u64,
        block_number: u64,
        log_index: u64,
    ) -> Log {
        let hashes = |hs: &[H256]| {
            Token::Array(hs.iter().map(|h| Token::FixedBytes(h.0.to_vec())).collect())
        };
        let data = encode(&[
            hashes(&[H256::repeat_byte(0x01), H256::repeat_byte(0x02)]),
            hashes(segment_hashes),
            Token::Uint(U256::from(total_length)),
            Token::Uint(U256::from(deadline)),
        ]);
        raw_log(BisectedFilter::signature(), data, block_number, log_index)
    }

    pub(crate) fn continued_log(segment: u64, deadline: u64, block_number: u64, log_index: u64) -> Log {
        let data = encode(&[Token::Uint(segment.into()), Token::Uint(deadline.into())]);
        raw_log(ContinuedFilter::signature(), data, block_number, log_index)
    }

    pub(crate) fn asserter_timed_out_log(block_number: u64, log_index: u64) -> Log {
        raw_log(AsserterTimedOutFilter::signature(), vec![], block_number, log_index)
    }

    #[test]
    fn derived_topics_are_the_union() {
        let base = BisectionChallengeWatcher::new(address());
        let messages = MessagesChallengeWatcher::new(address());

        let base_topics: HashSet<_> = base.topics().into_iter().collect();
        let derived_topics = messages.topics();
        let derived_set: HashSet<_> = derived_topics.iter().copied().collect();

        assert_eq!(derived_topics.len(), 6);
        assert_eq!(derived_set.len(), 6);
        assert!(base_topics.is_subset(&derived_set));
        assert!(derived_set.contains(&BisectedFilter::signature()));
        assert!(derived_set.contains(&OneStepProofCompletedFilter::signature()));
    }

    #[test]
    fn filter_is_scoped_to_contract_and_topics() {
        let messages = MessagesChallengeWatcher::new(address());
        let filter = messages.filter();
        let topics: Vec<Option<H256>> = messages.topics().into_iter().map(Some).collect();
        assert_eq!(filter.address, Some(ValueOrArray::Value(address())));
        assert_eq!(filter.topics[0], Some(ValueOrArray::Array(topics)));
    }

    #[test]
    fn classifies_bisection() {
        let watcher = MessagesChallengeWatcher::new(address());
        let segments = [H256::repeat_byte(0xa1), H256::repeat_byte(0xa2)];
        let log = bisected_log(&segments, 10, 100, 5, 0);

        let event = watcher.classify(chain_info(5, 0), &log).unwrap();
        let Event::MessagesBisection(bisection) = event.clone() else {
            panic!("expected a bisection event, got {:?}", event);
        };
        assert_eq!(bisection.chain_hashes, vec![H256::repeat_byte(0x01), H256::repeat_byte(0x02)]);
        assert_eq!(bisection.segment_hashes, segments.to_vec());
        assert_eq!(bisection.total_length, U256::from(10));
        assert_eq!(bisection.deadline, Tick::from(100));
        assert_eq!(bisection.chain_info, chain_info(5, 0));
    }

    #[test]
    fn classifies_one_step_proof() {
        let watcher = MessagesChallengeWatcher::new(address());
        let log = raw_log(OneStepProofCompletedFilter::signature(), vec![], 9, 3);
        assert_eq!(
            watcher.classify(chain_info(9, 3), &log).unwrap(),
            Event::OneStepProof(OneStepProofEvent {
                chain_info: chain_info(9, 3)
            })
        );
    }

    #[test]
    fn delegates_shared_logs_to_the_base() {
        let base = BisectionChallengeWatcher::new(address());
        let messages = MessagesChallengeWatcher::new(address());

        for log in [
            continued_log(1, 2_000, 7, 1),
            asserter_timed_out_log(7, 2),
            raw_log(ChallengerTimedOutFilter::signature(), vec![], 7, 3),
            raw_log(
                InitiatedChallengeFilter::signature(),
                encode(&[Token::Uint(U256::from(1_000))]),
                7,
                4,
            ),
        ] {
            let info = chain_info(7, log.log_index.unwrap().as_u64());
            assert_eq!(
                messages.classify(info, &log).unwrap(),
                base.classify(info, &log).unwrap()
            );
        }

        let event = messages
            .classify(chain_info(7, 1), &continued_log(1, 2_000, 7, 1))
            .unwrap();
        assert_eq!(
            event,
            Event::ContinueChallenge(ContinueChallengeEvent {
                chain_info: chain_info(7, 1),
                segment_index: U256::one(),
                deadline: Tick::from(2_000),
            })
        );
    }

    #[test]
    fn unrecognized_topic_reaches_the_innermost_layer() {
        let messages = MessagesChallengeWatcher::new(address());
        let topic = H256::repeat_byte(0xee);
        let err = messages
            .classify(chain_info(1, 0), &raw_log(topic, vec![], 1, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            ChallengeError::UnrecognizedLog { topic: t, .. } if t == topic
        ));
    }

    #[test]
    fn base_does_not_recognize_variant_logs() {
        let base = BisectionChallengeWatcher::new(address());
        let log = bisected_log(&[H256::zero()], 1, 1, 1, 0);
        assert!(matches!(
            base.classify(chain_info(1, 0), &log),
            Err(ChallengeError::UnrecognizedLog { .. })
        ));
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let messages = MessagesChallengeWatcher::new(address());
        let log = raw_log(BisectedFilter::signature(), vec![0u8; 7], 1, 0);
        assert!(matches!(
            messages.classify(chain_info(1, 0), &log),
            Err(ChallengeError::Decode { .. })
        ));
    }
}
