#![cfg(not(loom))]
//! 轮询器行为测试：排空顺序、关闭活性、收尾不丢完成、致命错误。

#[path = "../support/mod.rs"]
mod support;

use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use pulse_core::{CompletionPoller, PollerConfig, PollerStats, PulseError, ShutdownSignal};
use pulse_transport::{PollStatus, TransportErrorKind};
use tracing_test::traced_test;

use support::{Event, ScriptedContext, Step, protocol_error, wait_until};

fn fast_config() -> PollerConfig {
    PollerConfig::default().with_poll_timeout(Duration::from_millis(5))
}

/// 在作用域线程上运行轮询器，`drive` 在主线程执行后负责触发令牌。
fn run_with(
    context: &ScriptedContext,
    config: PollerConfig,
    drive: impl FnOnce(&ScriptedContext, &ShutdownSignal),
) -> pulse_core::Result<PollerStats> {
    let signal = ShutdownSignal::new();
    thread::scope(|scope| {
        let poller = CompletionPoller::new(context, signal.clone(), config);
        let handle = scope.spawn(move || poller.run());
        drive(context, &signal);
        signal.raise();
        handle.join().expect("轮询线程不应 panic")
    })
}

#[test]
fn ready_completions_are_drained_before_first_block() {
    let context = ScriptedContext::new([Step::Idle]);
    context.make_ready(3);

    let stats = run_with(&context, fast_config(), |context, _| {
        assert!(wait_until(Duration::from_secs(2), || {
            context
                .journal()
                .position(|event| matches!(event, Event::Progress(_)))
                .is_some()
        }));
    })
    .expect("轮询应正常结束");

    let first_progress = context
        .journal()
        .position(|event| matches!(event, Event::Progress(_)))
        .expect("令牌触发前已完成一次阻塞推进");
    let delivered_before = context.journal().snapshot()[..first_progress]
        .iter()
        .filter(|event| **event == Event::Deliver)
        .count();
    assert_eq!(delivered_before, 3, "就绪完成必须在第一次阻塞前全部交付");
    assert_eq!(stats.completions, 3);
}

#[test]
fn raised_signal_skips_blocking_progress() {
    let context = ScriptedContext::new([Step::Idle]);
    context.make_ready(2);
    let signal = ShutdownSignal::new();
    signal.raise();

    let stats = CompletionPoller::new(&context, signal, fast_config())
        .run()
        .expect("轮询应正常结束");

    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.skipped_blocks, 1);
    assert_eq!(stats.progress_calls, 0);
    assert_eq!(stats.completions, 2);
    assert!(
        context
            .journal()
            .position(|event| matches!(event, Event::Progress(_)))
            .is_none(),
        "令牌已触发时不得进入阻塞推进"
    );
}

#[test]
fn completions_readied_before_raise_are_never_dropped() {
    for _ in 0..50 {
        let context = ScriptedContext::idle();
        let stats = run_with(&context, fast_config(), |context, _| {
            thread::sleep(Duration::from_millis(1));
            context.make_ready(4);
        })
        .expect("轮询应正常结束");

        assert_eq!(context.delivered(), 4, "触发前就绪的完成必须全部交付");
        assert_eq!(stats.completions, 4);
        assert_eq!(
            context.journal().snapshot().last(),
            Some(&Event::Trigger { delivered: 0 }),
            "收尾排空必须以一次空触发结束"
        );
    }
}

#[test]
fn shutdown_is_observed_within_one_poll_timeout() {
    let timeout = Duration::from_millis(100);
    let context = ScriptedContext::idle();
    let signal = ShutdownSignal::new();

    let elapsed = thread::scope(|scope| {
        let poller = CompletionPoller::new(
            &context,
            signal.clone(),
            PollerConfig::default().with_poll_timeout(timeout),
        );
        let handle = scope.spawn(move || poller.run());
        thread::sleep(Duration::from_millis(30));
        let raised_at = Instant::now();
        signal.raise();
        handle
            .join()
            .expect("轮询线程不应 panic")
            .expect("轮询应正常结束");
        raised_at.elapsed()
    });

    assert!(
        elapsed < timeout + Duration::from_millis(150),
        "触发后至多再阻塞一个推进超时周期，实际 {elapsed:?}"
    );
}

#[test]
fn drain_budget_yields_to_progress() {
    let context = ScriptedContext::idle();
    context.make_ready(5);

    let stats = run_with(
        &context,
        fast_config().with_drain_budget(Some(2)),
        |context, _| {
            assert!(wait_until(Duration::from_secs(2), || context.delivered() >= 5));
        },
    )
    .expect("轮询应正常结束");

    let journal = context.journal().snapshot();
    let first_progress = journal
        .iter()
        .position(|event| matches!(event, Event::Progress(_)))
        .expect("预算耗尽后应让位给推进");
    let third_delivery = journal
        .iter()
        .enumerate()
        .filter(|(_, event)| **event == Event::Deliver)
        .nth(2)
        .map(|(idx, _)| idx)
        .expect("应交付五个完成");
    assert!(first_progress < third_delivery, "第三个完成必须等到推进之后");
    assert!(stats.budget_yields >= 2);
    assert_eq!(stats.completions, 5);
}

#[test]
#[traced_test]
fn progress_failure_is_fatal() {
    let context = ScriptedContext::new([
        Step::Ready(1),
        Step::Fail(protocol_error("completion queue corrupted")),
    ]);

    let err = CompletionPoller::new(&context, ShutdownSignal::new(), fast_config())
        .run()
        .expect_err("推进失败必须终止轮询");

    assert!(matches!(err, PulseError::Progress(_)));
    assert_eq!(err.code(), "transport.progress");
    assert_eq!(
        err.transport_error().map(|source| source.kind()),
        Some(TransportErrorKind::Protocol)
    );
    assert_eq!(context.delivered(), 1, "失败前就绪的完成应已交付");
    assert!(logs_contain("progress loop aborted"));
}

#[test]
fn trigger_failure_is_fatal() {
    let context = ScriptedContext::idle();
    context.fail_next_trigger(protocol_error("trigger on torn-down queue"));

    let err = CompletionPoller::new(&context, ShutdownSignal::new(), fast_config())
        .run()
        .expect_err("触发失败必须终止轮询");

    assert!(err.is_poller_failure());
    assert_eq!(err.code(), "transport.trigger");
    assert_eq!(
        context
            .journal()
            .position(|event| *event == Event::Progress(PollStatus::TimedOut)),
        None,
        "触发失败后不得继续推进"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_ready_completion_is_delivered_exactly_once(
        batches in prop::collection::vec(0u32..6, 0..8),
        budget in prop::option::of(1u32..4),
    ) {
        let expected: u32 = batches.iter().sum();
        let context = ScriptedContext::new(batches.into_iter().map(Step::Ready));
        let config = PollerConfig::default()
            .with_poll_timeout(Duration::from_millis(1))
            .with_drain_budget(budget);

        let stats = run_with(&context, config, |context, _| {
            assert!(wait_until(Duration::from_secs(5), || context.script_exhausted()));
        })
        .expect("轮询应正常结束");

        prop_assert_eq!(context.delivered(), expected as usize);
        prop_assert_eq!(stats.completions, u64::from(expected));
        prop_assert!(stats.cycles >= 1);
    }
}
