//! The `subscription` module runs a [ChallengeWatcher] against a [LogSource] as an independent
//! task that emits typed [Event]s.

use crate::{ChainInfo, ChallengeError, ChallengeResult, ChallengeWatcher, Event, LogCursor, LogSource};
use anyhow::anyhow;
use ethers::types::Log;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Opens a historical-then-live log subscription for `watcher` beginning at `start`
/// (inclusive) and spawns the task that classifies each log and pushes the resulting [Event]
/// into `events`.
///
/// Any failure is pushed once into `errors` and ends the task; a malformed event is never
/// emitted. The task also ends when `cancel` fires, and cancels the underlying subscription
/// when it exits.
pub async fn start_subscription<W, L>(
    watcher: Arc<W>,
    source: Arc<L>,
    cancel: CancellationToken,
    start: LogCursor,
    events: mpsc::UnboundedSender<Event>,
    errors: mpsc::UnboundedSender<ChallengeError>,
) -> ChallengeResult<JoinHandle<()>>
where
    W: ChallengeWatcher + ?Sized + 'static,
    L: LogSource + ?Sized + 'static,
{
    let source_cancel = cancel.child_token();
    let mut subscription = source
        .open_log_subscription(watcher.filter(), start, source_cancel.clone())
        .await
        .map_err(ChallengeError::Subscription)?;

    tracing::info!(
        target: "challenge-watcher",
        "Subscribed to challenge {:?} from block #{} log #{}",
        watcher.address(),
        start.block_number,
        start.log_index
    );

    Ok(tokio::spawn(async move {
        let _source_guard = source_cancel.drop_guard();

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(target: "challenge-watcher", "Watcher for {:?} cancelled", watcher.address());
                    return;
                }
                log = subscription.logs.recv() => match log {
                    Some(log) => tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::debug!(target: "challenge-watcher", "Watcher for {:?} cancelled", watcher.address());
                            return;
                        }
                        res = process_log(&*watcher, &*source, log) => res,
                    },
                    None => Err(ChallengeError::Subscription(
                        subscription
                            .errors
                            .recv()
                            .await
                            .unwrap_or_else(|| anyhow!("log feed terminated early")),
                    )),
                },
                Some(err) = subscription.errors.recv() => Err(ChallengeError::Subscription(err)),
            };

            match result {
                Ok(event) => {
                    tracing::debug!(
                        target: "challenge-watcher",
                        "{} event observed at block #{} log #{}",
                        event.kind(),
                        event.chain_info().block_number,
                        event.chain_info().log_index
                    );
                    if events.send(event).is_err() {
                        tracing::debug!(target: "challenge-watcher", "Event feed dropped, stopping watcher.");
                        return;
                    }
                }
                Err(err) => {
                    tracing::error!(target: "challenge-watcher", "Watcher for {:?} failed: {}", watcher.address(), err);
                    let _ = errors.send(err);
                    return;
                }
            }
        }
    }))
}

/// Resolves the enclosing block of `log` and classifies it with `watcher`.
async fn process_log<W, L>(watcher: &W, source: &L, log: Log) -> ChallengeResult<Event>
where
    W: ChallengeWatcher + ?Sized,
    L: LogSource + ?Sized,
{
    let block_hash = log
        .block_hash
        .ok_or_else(|| ChallengeError::Subscription(anyhow!("received a pending log")))?;

    if log.removed.unwrap_or(false) {
        return Err(ChallengeError::Reorg {
            block_number: log.block_number.map(|n| n.as_u64()).unwrap_or_default(),
            block_hash,
        });
    }

    let header = source
        .header_by_hash(block_hash)
        .await
        .map_err(ChallengeError::Subscription)?;

    let chain_info = ChainInfo::from_log(&log, &header)
        .ok_or_else(|| ChallengeError::Subscription(anyhow!("received a log without a log index")))?;
    watcher.classify(chain_info, &log)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        watchers::test::{address, asserter_timed_out_log, bisected_log, continued_log, raw_log},
        BlockHeader, LogSubscription, MessagesChallengeWatcher,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use ethers::types::{Filter, H256};
    use std::{sync::Mutex, time::Duration};

    /// A [LogSource] that replays a fixed list of logs and then either stays open, closes, or
    /// fails.
    struct MockSource {
        logs: Vec<Log>,
        then: Then,
        opened: Mutex<Option<(Filter, LogCursor)>>,
        header_delay: Duration,
        keep_alive: Mutex<Vec<mpsc::UnboundedSender<Log>>>,
    }

    #[derive(Clone, Copy)]
    enum Then {
        StayOpen,
        Close,
        Fail,
    }

    impl MockSource {
        fn new(logs: Vec<Log>, then: Then) -> Self {
            Self {
                logs,
                then,
                opened: Mutex::new(None),
                header_delay: Duration::ZERO,
                keep_alive: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LogSource for MockSource {
        async fn open_log_subscription(
            &self,
            filter: Filter,
            start: LogCursor,
            _cancel: CancellationToken,
        ) -> Result<LogSubscription> {
            *self.opened.lock().unwrap() = Some((filter, start));
            let (log_tx, logs) = mpsc::unbounded_channel();
            let (err_tx, errors) = mpsc::unbounded_channel();
            for log in self.logs.iter() {
                log_tx.send(log.clone()).unwrap();
            }
            match self.then {
                Then::StayOpen => self.keep_alive.lock().unwrap().push(log_tx),
                Then::Close => {}
                Then::Fail => {
                    self.keep_alive.lock().unwrap().push(log_tx);
                    err_tx.send(anyhow!("websocket closed")).unwrap();
                }
            }
            Ok(LogSubscription { logs, errors })
        }

        async fn header_by_hash(&self, hash: H256) -> Result<BlockHeader> {
            tokio::time::sleep(self.header_delay).await;
            let number = hash.to_low_u64_be();
            Ok(BlockHeader {
                number,
                hash,
                timestamp: number * 12,
            })
        }

        async fn current_chain_head(&self) -> Result<BlockHeader> {
            self.header_by_hash(H256::from_low_u64_be(1_000)).await
        }
    }

    async fn run(
        source: MockSource,
    ) -> (
        Arc<MockSource>,
        mpsc::UnboundedReceiver<Event>,
        mpsc::UnboundedReceiver<ChallengeError>,
        CancellationToken,
        JoinHandle<()>,
    ) {
        let source = Arc::new(source);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = start_subscription(
            Arc::new(MessagesChallengeWatcher::new(address())),
            Arc::clone(&source),
            cancel.clone(),
            LogCursor::new(5, 0),
            events_tx,
            errors_tx,
        )
        .await
        .unwrap();
        (source, events, errors, cancel, handle)
    }

    #[tokio::test]
    async fn emits_events_in_log_order() {
        let logs = vec![
            bisected_log(&[H256::repeat_byte(1), H256::repeat_byte(2)], 10, 100, 5, 0),
            continued_log(1, 200, 6, 3),
            asserter_timed_out_log(7, 0),
        ];
        let (source, mut events, mut errors, cancel, handle) =
            run(MockSource::new(logs, Then::StayOpen)).await;

        let (filter, start) = source.opened.lock().unwrap().clone().unwrap();
        assert_eq!(filter, MessagesChallengeWatcher::new(address()).filter());
        assert_eq!(start, LogCursor::new(5, 0));

        let kinds = [
            "MessagesBisection",
            "ContinueChallenge",
            "AsserterTimeout",
        ];
        let mut last: Option<ChainInfo> = None;
        for kind in kinds {
            let event = events.recv().await.unwrap();
            assert_eq!(event.kind(), kind);
            assert_eq!(event.chain_info().timestamp, event.chain_info().block_number * 12);
            if let Some(prev) = last {
                assert!(event.chain_info().follows(&prev));
            }
            last = Some(*event.chain_info());
        }

        cancel.cancel();
        handle.await.unwrap();
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn unexpected_closure_is_an_error() {
        let (_source, mut events, mut errors, _cancel, handle) =
            run(MockSource::new(vec![continued_log(0, 1, 5, 0)], Then::Close)).await;

        assert_eq!(events.recv().await.unwrap().kind(), "ContinueChallenge");
        handle.await.unwrap();
        assert!(matches!(errors.recv().await, Some(ChallengeError::Subscription(_))));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn source_failure_is_reported_once() {
        let (_source, mut events, mut errors, _cancel, handle) =
            run(MockSource::new(vec![], Then::Fail)).await;

        handle.await.unwrap();
        let err = errors.recv().await.unwrap();
        assert!(err.to_string().contains("websocket closed"));
        assert!(errors.recv().await.is_none());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn classification_failure_stops_without_emitting() {
        let logs = vec![
            raw_log(H256::repeat_byte(0xee), vec![], 5, 0),
            continued_log(0, 1, 5, 1),
        ];
        let (_source, mut events, mut errors, _cancel, handle) =
            run(MockSource::new(logs, Then::StayOpen)).await;

        handle.await.unwrap();
        assert!(matches!(
            errors.recv().await,
            Some(ChallengeError::UnrecognizedLog { .. })
        ));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn log_without_an_index_is_rejected() {
        let mut unindexed = continued_log(0, 1, 6, 0);
        unindexed.log_index = None;
        let (_source, mut events, mut errors, _cancel, handle) =
            run(MockSource::new(vec![unindexed], Then::StayOpen)).await;

        handle.await.unwrap();
        assert!(matches!(errors.recv().await, Some(ChallengeError::Subscription(_))));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn removed_log_is_a_reorg() {
        let mut removed = continued_log(0, 1, 6, 0);
        removed.removed = Some(true);
        let (_source, mut events, mut errors, _cancel, handle) =
            run(MockSource::new(vec![continued_log(0, 1, 5, 0), removed], Then::StayOpen)).await;

        handle.await.unwrap();
        assert_eq!(events.recv().await.unwrap().kind(), "ContinueChallenge");
        assert!(matches!(
            errors.recv().await,
            Some(ChallengeError::Reorg { block_number: 6, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_header_fetch() {
        let source = MockSource {
            header_delay: Duration::from_secs(3_600),
            ..MockSource::new(vec![continued_log(0, 1, 5, 0)], Then::StayOpen)
        };
        let (_source, mut events, mut errors, cancel, handle) = run(source).await;

        let started = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(events.recv().await.is_none());
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_stops_the_task() {
        let (_source, mut events, mut errors, cancel, handle) =
            run(MockSource::new(vec![], Then::StayOpen)).await;

        cancel.cancel();
        handle.await.unwrap();
        assert!(events.recv().await.is_none());
        assert!(errors.recv().await.is_none());
    }
}
