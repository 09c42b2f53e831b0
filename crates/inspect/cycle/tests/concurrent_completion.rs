//! Property tests: one judgement per cycle, whatever the interleaving.
//!
//! Completions are issued from separate tasks on a multi-threaded runtime
//! with randomised spin and yield injection, and raced against short
//! timeout windows.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use inspect_cycle::mocks::{RecordingFaultResetter, RecordingJudgement};
use inspect_cycle::{
    ChannelResultCache, Collaborators, CompletionOutcome, CycleConfig, DetectionCycleTracker,
    InMemoryResultCache, OperatingContext,
};
use inspect_types::{ChannelId, OperatingMode, SystemState};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

struct Line {
    tracker: DetectionCycleTracker,
    judgement: Arc<RecordingJudgement>,
    resetter: Arc<RecordingFaultResetter>,
    cache: Arc<InMemoryResultCache>,
}

fn line(mode: OperatingMode, grace_ms: u64) -> Line {
    let state = if mode == OperatingMode::SystemTest {
        SystemState::SystemTesting
    } else {
        SystemState::WaitingForTrigger
    };
    let context = Arc::new(OperatingContext::with(mode, state));
    let judgement = Arc::new(RecordingJudgement::new());
    let resetter = Arc::new(RecordingFaultResetter::new());
    let cache = Arc::new(InMemoryResultCache::new());
    let config = CycleConfig {
        timeout_grace_ms: grace_ms,
        ..Default::default()
    };
    let collaborators = Collaborators::new(judgement.clone())
        .with_cache(cache.clone())
        .with_fault_resetter(resetter.clone());

    Line {
        tracker: DetectionCycleTracker::new(config, context, collaborators),
        judgement,
        resetter,
        cache,
    }
}

fn block_on<F: Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(fut)
}

async fn jitter(spins: u32, yields: u32) {
    for _ in 0..spins {
        std::hint::spin_loop();
    }
    for _ in 0..yields {
        tokio::task::yield_now().await;
    }
}

fn arb_mode() -> impl Strategy<Value = OperatingMode> {
    prop_oneof![
        Just(OperatingMode::Full),
        Just(OperatingMode::Only2D),
        Just(OperatingMode::SystemTest),
    ]
}

fn dispatched(outcome: CompletionOutcome) -> bool {
    matches!(outcome, CompletionOutcome::Dispatched { .. })
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    /// Concurrent A and B completions on a dual-channel cycle judge once.
    #[test]
    fn concurrent_completions_dispatch_once(
        mode in arb_mode(),
        spins_a in 0u32..5_000,
        spins_b in 0u32..5_000,
        yields_a in 0u32..6,
        yields_b in 0u32..6,
    ) {
        let (outcome_a, outcome_b, judged) = block_on(async move {
            let line = line(mode, 2000);
            line.tracker.start_cycle(true);

            let ta = line.tracker.clone();
            let tb = line.tracker.clone();
            let a = tokio::spawn(async move {
                jitter(spins_a, yields_a).await;
                ta.mark_channel_a_completed().await
            });
            let b = tokio::spawn(async move {
                jitter(spins_b, yields_b).await;
                tb.mark_channel_b_completed().await
            });

            let outcome_a = a.await.expect("task a");
            let outcome_b = b.await.expect("task b");
            line.judgement.wait_for(1, Duration::from_secs(1)).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            (outcome_a, outcome_b, line.judgement.count())
        });

        prop_assert_eq!(judged, 1);
        prop_assert!(dispatched(outcome_a) ^ dispatched(outcome_b));
    }

    /// A 2D completion racing the grace deadline judges once, and the
    /// sentinel is written only when the deadline won.
    #[test]
    fn completion_racing_timeout_dispatches_once(
        grace_ms in 1u64..6,
        late_ms in 0u64..10,
        spins in 0u32..5_000,
    ) {
        let (outcome_a, judged, sentinel, resets) = block_on(async move {
            let line = line(OperatingMode::Full, grace_ms);
            line.tracker.start_cycle(true);
            line.tracker.mark_channel_b_completed().await;

            tokio::time::sleep(Duration::from_millis(late_ms)).await;
            jitter(spins, 0).await;
            let outcome_a = line.tracker.mark_channel_a_completed().await;

            line.judgement.wait_for(1, Duration::from_secs(1)).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            (
                outcome_a,
                line.judgement.count(),
                line.cache.get(ChannelId::A).is_sentinel(),
                line.resetter.count(),
            )
        });

        prop_assert_eq!(judged, 1);
        if dispatched(outcome_a) {
            prop_assert!(!sentinel);
            prop_assert_eq!(resets, 0);
        } else {
            prop_assert_eq!(outcome_a, CompletionOutcome::Duplicate);
            prop_assert!(sentinel);
            prop_assert_eq!(resets, 1);
        }
    }

    /// Repeated and duplicated completions across many cycles yield one
    /// judgement per cycle.
    #[test]
    fn one_judgement_per_cycle(
        cycles in prop::collection::vec((any::<bool>(), 1usize..4, 1usize..4), 1..12),
    ) {
        let expected = cycles.len();
        let judged = block_on(async move {
            let line = line(OperatingMode::SystemTest, 2000);
            for (with_height, repeats_a, repeats_b) in cycles {
                line.tracker.start_cycle(with_height);
                for _ in 0..repeats_b {
                    if with_height {
                        line.tracker.mark_channel_b_completed().await;
                    }
                }
                for _ in 0..repeats_a {
                    line.tracker.mark_channel_a_completed().await;
                }
            }
            line.judgement.count()
        });

        prop_assert_eq!(judged, expected);
    }
}
