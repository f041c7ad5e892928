//! Property-based tests for the work queue using proptest.
//!
//! Properties verified:
//! - Any burst of adds hands each distinct key out exactly once
//! - A key is never handed out while it is still being processed

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use proptest::prelude::*;
use seed_sync_reconciler::{BackoffConfig, WorkQueue};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime creation should succeed")
}

fn key_burst() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("(alpha|beta|gamma|delta)", 1..40)
}

proptest! {
    #[test]
    fn prop_burst_is_coalesced(keys in key_burst()) {
        let distinct: BTreeSet<String> = keys.iter().cloned().collect();

        let handed_out = runtime().block_on(async {
            let queue = WorkQueue::new(BackoffConfig::default());
            for key in &keys {
                queue.add(key.clone()).await;
            }

            let mut handed_out = Vec::new();
            while !queue.is_empty().await {
                let key = queue.get().await.expect("queue is open");
                queue.done(&key).await;
                handed_out.push(key);
            }
            handed_out
        });

        prop_assert_eq!(handed_out.len(), distinct.len());
        prop_assert_eq!(handed_out.into_iter().collect::<BTreeSet<_>>(), distinct);
    }

    #[test]
    fn prop_busy_keys_are_exclusive(first in key_burst(), second in key_burst()) {
        let result: Result<(), TestCaseError> = runtime().block_on(async {
            let queue = WorkQueue::new(BackoffConfig::default());
            for key in &first {
                queue.add(key.clone()).await;
            }

            // Take everything queued so far, then re-add while busy.
            let mut busy = HashSet::new();
            while !queue.is_empty().await {
                busy.insert(queue.get().await.expect("queue is open"));
            }
            for key in &second {
                queue.add(key.clone()).await;
            }

            // Keys still being processed must not come back yet.
            while !queue.is_empty().await {
                let key = queue.get().await.expect("queue is open");
                prop_assert!(!busy.contains(&key), "busy key {} handed out twice", key);
                queue.done(&key).await;
            }

            // Finishing a busy key that was re-added queues it once more.
            for key in &busy {
                queue.done(key).await;
            }
            let requeued: BTreeSet<String> = second
                .iter()
                .filter(|k| busy.contains(*k))
                .cloned()
                .collect();
            prop_assert_eq!(queue.len().await, requeued.len());
            Ok(())
        });
        result?;
    }
}

#[tokio::test]
async fn test_concurrent_workers_never_share_a_key() {
    let queue = WorkQueue::new(BackoffConfig::default());
    let in_flight = std::sync::Arc::new(tokio::sync::Mutex::new(HashSet::new()));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                let mut processed = 0_usize;
                while let Some(key) = queue.get().await {
                    assert!(in_flight.lock().await.insert(key.clone()), "{key} shared");
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    in_flight.lock().await.remove(&key);
                    queue.done(&key).await;
                    processed = processed.saturating_add(1);
                }
                processed
            })
        })
        .collect();

    for id in (0..5).cycle().take(50) {
        queue.add(format!("object-{id}")).await;
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    queue.shut_down().await;

    let mut total = 0_usize;
    for worker in workers {
        total = total.saturating_add(worker.await.unwrap());
    }
    assert!(total >= 5);
}
