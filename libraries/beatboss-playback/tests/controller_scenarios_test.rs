//! Scenario tests for the playback controller
//!
//! Drives the synchronous state machine through realistic sequences:
//! - Completion policy under each loop mode
//! - Premature completion and transport error recovery
//! - Stale results after skips and stops
//! - Queue edits while playing
//! - Unplayable tracks

mod common;

use beatboss_playback::{
    BackendEvent, BackendOp, Command, Effect, Input, LoopMode, MediaUri, PlaybackConfig,
    PlaybackEvent, PlaybackState, ProcessingState, SkipReason, SourceTag, Track,
};
use common::{init_tracing, status, track, Harness, TRACK_LENGTH};
use std::sync::Arc;
use std::time::Duration;

fn harness_with_loop(loop_mode: LoopMode) -> Harness {
    init_tracing();
    Harness::with_config(PlaybackConfig {
        loop_mode,
        ..PlaybackConfig::default()
    })
}

// ===== Completion Policy =====

#[test]
fn loop_off_consumes_queue_until_stopped() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b", "c"], 0);
    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.current_id().as_deref(), Some("a"));

    h.complete();
    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.current_id().as_deref(), Some("b"));
    assert_eq!(h.queue_ids(), ["b", "c"]);

    h.complete();
    assert_eq!(h.current_id().as_deref(), Some("c"));
    assert_eq!(h.queue_ids(), ["c"]);

    h.complete();
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert!(h.queue_ids().is_empty());
    assert_eq!(h.controller.queue().current_index(), None);

    assert_eq!(h.started_ids(), ["a", "b", "c"]);
    assert_eq!(h.events.last(), Some(&PlaybackEvent::QueueExhausted));
}

#[test]
fn loop_off_started_mid_queue_clamps_backwards() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b", "c"], 2);

    h.complete();
    assert_eq!(h.queue_ids(), ["a", "b"]);
    assert_eq!(h.current_id().as_deref(), Some("b"));
}

#[test]
fn loop_all_single_track_replays_itself() {
    let mut h = harness_with_loop(LoopMode::All);
    h.load(&["a"], 0);
    let generation = h.controller.generation();

    h.complete();

    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.current_id().as_deref(), Some("a"));
    assert_eq!(h.queue_ids(), ["a"]);
    assert_eq!(h.controller.generation(), generation + 1);
    assert_eq!(h.started_ids(), ["a", "a"]);
}

#[test]
fn loop_all_rotates_finished_track_to_back() {
    let mut h = harness_with_loop(LoopMode::All);
    h.load(&["a", "b", "c"], 0);

    h.complete();
    assert_eq!(h.queue_ids(), ["b", "c", "a"]);
    assert_eq!(h.current_id().as_deref(), Some("b"));

    for _ in 0..10 {
        h.complete();
        assert_eq!(h.controller.queue().len(), 3);
        assert_eq!(h.controller.state(), PlaybackState::Playing);
    }
}

#[test]
fn loop_one_replays_without_touching_queue() {
    let mut h = harness_with_loop(LoopMode::One);
    h.load(&["a", "b"], 1);
    let generation = h.controller.generation();

    for _ in 0..3 {
        h.complete();
        // Backend catches up with the seek
        h.report(Duration::from_secs(1), ProcessingState::Ready);
    }

    assert_eq!(h.queue_ids(), ["a", "b"]);
    assert_eq!(h.controller.queue().current_index(), Some(1));
    assert_eq!(h.controller.generation(), generation);
    assert_eq!(h.started_ids(), ["b", "b", "b", "b"]);

    let seeks = h
        .ops
        .iter()
        .filter(|op| **op == BackendOp::Seek(Duration::ZERO))
        .count();
    assert_eq!(seeks, 3);
}

#[test]
fn loop_one_ignores_repeated_completion_until_backend_catches_up() {
    let mut h = harness_with_loop(LoopMode::One);
    h.load(&["a"], 0);

    h.complete();
    h.complete();

    assert_eq!(h.started_ids(), ["a", "a"]);
}

#[test]
fn unknown_duration_completion_is_legitimate() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.command(Command::LoadQueue {
        tracks: vec![Arc::new(Track::new("a", "Untimed", "Artist"))],
        start_index: 0,
    });

    let mut report = status(h.controller.generation(), Duration::from_secs(10), ProcessingState::Completed);
    report.duration = None;
    h.input(Input::Tick(report));

    assert_eq!(h.controller.state(), PlaybackState::Stopped);
}

// ===== Recovery =====

#[test]
fn premature_completion_resumes_at_same_position() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 0);
    let generation = h.controller.generation();

    h.report(Duration::from_secs(20), ProcessingState::Ready);
    h.controller.handle(Input::Tick(status(
        generation,
        Duration::from_secs(20),
        ProcessingState::Completed,
    )));

    assert_eq!(h.controller.state(), PlaybackState::Recovering);
    assert_eq!(h.controller.generation(), generation + 1);

    h.settle();

    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.current_id().as_deref(), Some("a"));
    assert_eq!(h.queue_ids(), ["a", "b"]);
    assert_eq!(h.controller.position(), Duration::from_secs(20));
    assert_eq!(h.controller.generation(), generation + 1);
    assert!(h.ops.contains(&BackendOp::Open {
        tag: SourceTag(generation + 1),
        uri: MediaUri::Remote("https://cdn.test/a".to_string()),
        start_at: Some(Duration::from_secs(20)),
    }));

    // Recovery is not a new play start
    assert_eq!(h.started_ids(), ["a"]);
    assert!(h.events.contains(&PlaybackEvent::Recovering {
        track_id: "a".to_string(),
        attempt: 1,
    }));
}

#[test]
fn completion_within_tolerance_is_not_premature() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 0);

    h.complete_at(TRACK_LENGTH - Duration::from_millis(1500));

    assert_eq!(h.current_id().as_deref(), Some("b"));
    assert_eq!(h.queue_ids(), ["b"]);
}

#[test]
fn transport_error_recovery_is_bounded() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 0);
    h.report(Duration::from_secs(30), ProcessingState::Ready);

    h.backend_error("connection reset");
    assert_eq!(h.current_id().as_deref(), Some("a"));
    assert_eq!(h.controller.state(), PlaybackState::Playing);

    h.backend_error("connection reset");
    assert_eq!(h.current_id().as_deref(), Some("a"));

    // Budget of two recoveries spent; the track counts as finished
    h.backend_error("connection reset");
    assert_eq!(h.current_id().as_deref(), Some("b"));
    assert_eq!(h.queue_ids(), ["b"]);

    let attempts: Vec<u32> = h
        .events
        .iter()
        .filter_map(|e| match e {
            PlaybackEvent::Recovering { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, [1, 2]);
}

#[test]
fn failed_recovery_is_treated_as_completion() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 0);
    h.report(Duration::from_secs(20), ProcessingState::Ready);

    h.make_unavailable("a");
    h.complete_at(Duration::from_secs(20));

    assert_eq!(h.current_id().as_deref(), Some("b"));
    assert_eq!(h.queue_ids(), ["b"]);
    assert!(!h
        .events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::TrackSkipped { .. })));
}

#[test]
fn backend_error_while_opening_retries_the_open() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.controller.command(Command::LoadQueue {
        tracks: vec![Arc::new(track("a")), Arc::new(track("b"))],
        start_index: 0,
    });
    let generation = h.controller.generation();
    h.take_effects();

    h.controller.handle(Input::Resolved {
        generation,
        result: Ok(MediaUri::Remote("https://cdn.test/a".to_string())),
    });
    h.take_effects();

    // Stream breaks between set_source and the open acknowledgement
    h.controller.handle(Input::Backend(BackendEvent::Error {
        tag: SourceTag(generation),
        message: "connection reset".to_string(),
    }));
    h.controller.handle(Input::SourceOpened {
        generation,
        result: Ok(()),
    });

    assert_eq!(h.controller.state(), PlaybackState::Loading);
    let effects = h.take_effects();
    assert!(effects.contains(&Effect::ScheduleRetry {
        generation,
        delay: Duration::from_secs(1),
    }));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::Emit(PlaybackEvent::TrackStarted { .. }))));

    h.input(Input::RetryDue { generation });

    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.current_id().as_deref(), Some("a"));
    assert_eq!(h.started_ids(), ["a"]);
}

#[test]
fn loop_one_replay_ignores_completed_report_before_seek_lands() {
    let mut h = harness_with_loop(LoopMode::One);
    h.load(&["a"], 0);

    h.complete();
    // Poll taken before the seek to zero reached the backend
    h.report(TRACK_LENGTH, ProcessingState::Completed);
    h.report(Duration::ZERO, ProcessingState::Ready);

    assert_eq!(h.controller.position(), Duration::ZERO);
    assert_eq!(h.controller.snapshot().position, Duration::ZERO);
    assert_eq!(h.started_ids(), ["a", "a"]);
}

// ===== Stale Inputs =====

#[test]
fn skip_during_loading_discards_stale_resolution() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b", "c"], 0);

    h.controller.command(Command::SkipNext);
    let loading_b = h.controller.generation();
    assert_eq!(h.current_id().as_deref(), Some("b"));

    h.controller.command(Command::SkipNext);
    let loading_c = h.controller.generation();
    assert_eq!(h.current_id().as_deref(), Some("c"));
    h.take_effects();

    h.controller.handle(Input::Resolved {
        generation: loading_b,
        result: Ok(MediaUri::Remote("https://cdn.test/b".to_string())),
    });
    assert!(h.take_effects().is_empty());
    assert_eq!(h.controller.state(), PlaybackState::Loading);

    h.input(Input::Resolved {
        generation: loading_c,
        result: Ok(MediaUri::Remote("https://cdn.test/c".to_string())),
    });

    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.current_id().as_deref(), Some("c"));
    assert_eq!(h.started_ids(), ["a", "c"]);
}

#[test]
fn stale_completion_is_a_noop() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 0);
    let old = h.controller.generation();
    h.command(Command::SkipNext);

    let before = h.controller.snapshot();
    h.controller.handle(Input::Tick(status(old, TRACK_LENGTH, ProcessingState::Completed)));

    assert!(h.take_effects().is_empty());
    assert_eq!(h.controller.snapshot(), before);
}

#[test]
fn stop_invalidates_in_flight_resolution() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.controller.command(Command::LoadQueue {
        tracks: vec![Arc::new(track("a"))],
        start_index: 0,
    });
    let generation = h.controller.generation();
    h.controller.command(Command::Stop);
    h.take_effects();

    h.input(Input::Resolved {
        generation,
        result: Ok(MediaUri::Remote("https://cdn.test/a".to_string())),
    });

    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert!(h.ops.is_empty());
}

// ===== Queue Edits =====

#[test]
fn removing_current_track_triggers_one_transition() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b", "c"], 0);
    let generation = h.controller.generation();
    h.clear_log();

    h.command(Command::RemoveAt(0));

    assert_eq!(h.controller.generation(), generation + 1);
    assert_eq!(h.current_id().as_deref(), Some("b"));
    assert_eq!(h.queue_ids(), ["b", "c"]);
    assert_eq!(h.started_ids(), ["b"]);
}

#[test]
fn removing_last_current_track_stops_unless_looping() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 1);
    h.command(Command::RemoveAt(1));
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert_eq!(h.queue_ids(), ["a"]);

    let mut h = harness_with_loop(LoopMode::All);
    h.load(&["a", "b"], 1);
    h.command(Command::RemoveAt(1));
    assert_eq!(h.controller.state(), PlaybackState::Playing);
    assert_eq!(h.current_id().as_deref(), Some("a"));
}

#[test]
fn removing_earlier_track_keeps_current() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b", "c"], 2);
    let generation = h.controller.generation();

    h.command(Command::RemoveAt(0));

    assert_eq!(h.controller.generation(), generation);
    assert_eq!(h.controller.queue().current_index(), Some(1));
    assert_eq!(h.current_id().as_deref(), Some("c"));
}

#[test]
fn insert_next_plays_after_current() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 0);

    h.command(Command::InsertNext(Arc::new(track("x"))));
    assert_eq!(h.queue_ids(), ["a", "x", "b"]);
    assert_eq!(h.current_id().as_deref(), Some("a"));

    h.complete();
    assert_eq!(h.current_id().as_deref(), Some("x"));
}

#[test]
fn enqueue_and_jump() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a"], 0);
    h.command(Command::Enqueue(Arc::new(track("z"))));
    h.command(Command::JumpTo(1));

    assert_eq!(h.current_id().as_deref(), Some("z"));
    assert_eq!(h.controller.state(), PlaybackState::Playing);
}

#[test]
fn clear_queue_stops() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 0);
    h.command(Command::ClearQueue);

    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert!(h.queue_ids().is_empty());
    assert!(h.ops.contains(&BackendOp::Stop));
}

#[test]
fn clear_queue_turns_shuffle_off() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b", "c", "d"], 0);
    h.command(Command::ToggleShuffle);
    assert!(h.controller.is_shuffled());

    h.command(Command::ClearQueue);
    assert!(!h.controller.is_shuffled());
    assert!(!h.controller.snapshot().shuffle);

    h.load(&["a", "b", "c", "d"], 0);
    assert_eq!(h.queue_ids(), ["a", "b", "c", "d"]);
}

#[test]
fn shuffle_cycle_keeps_current_track() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b", "c", "d", "e", "f"], 3);
    let generation = h.controller.generation();

    h.command(Command::ToggleShuffle);
    assert!(h.controller.is_shuffled());
    assert_eq!(h.controller.queue().current_index(), Some(0));
    assert_eq!(h.current_id().as_deref(), Some("d"));

    h.command(Command::ToggleShuffle);
    assert!(!h.controller.is_shuffled());
    assert_eq!(h.current_id().as_deref(), Some("d"));
    assert_eq!(h.controller.generation(), generation);
    assert_eq!(h.controller.state(), PlaybackState::Playing);
}

// ===== Navigation =====

#[test]
fn previous_early_in_track_goes_back() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 1);
    h.report(Duration::from_secs(1), ProcessingState::Ready);

    h.command(Command::SkipPrevious);
    assert_eq!(h.current_id().as_deref(), Some("a"));
}

#[test]
fn manual_skip_under_loop_one_moves_on_and_wraps() {
    let mut h = harness_with_loop(LoopMode::One);
    h.load(&["a", "b"], 0);

    h.command(Command::SkipNext);
    assert_eq!(h.current_id().as_deref(), Some("b"));

    h.command(Command::SkipNext);
    assert_eq!(h.current_id().as_deref(), Some("a"));
}

#[test]
fn skip_past_end_stops() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 1);

    h.command(Command::SkipNext);
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert_eq!(h.queue_ids(), ["a", "b"]);
    assert_eq!(h.events.last(), Some(&PlaybackEvent::QueueExhausted));
}

// ===== Unplayable Tracks =====

#[test]
fn unavailable_track_is_skipped() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.make_unavailable("b");
    h.load(&["a", "b", "c"], 0);

    h.complete();

    assert_eq!(h.current_id().as_deref(), Some("c"));
    assert!(h.events.contains(&PlaybackEvent::TrackSkipped {
        track_id: "b".to_string(),
        reason: SkipReason::NotFound,
    }));
    assert_eq!(h.started_ids(), ["a", "c"]);
}

#[test]
fn nothing_playable_ends_idle() {
    let mut h = harness_with_loop(LoopMode::All);
    h.make_unavailable("a");
    h.make_unavailable("b");
    h.load(&["a", "b"], 0);

    assert_eq!(h.controller.state(), PlaybackState::Idle);
    assert_eq!(h.controller.queue().current_index(), None);
    assert_eq!(h.events.last(), Some(&PlaybackEvent::NothingPlayable));
    assert!(h.started_ids().is_empty());
}

#[test]
fn history_records_each_start_most_recent_first() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b", "c"], 0);
    h.complete();
    h.complete();

    let history: Vec<String> = h
        .controller
        .snapshot()
        .history
        .iter()
        .map(|t| t.id.clone())
        .collect();
    assert_eq!(history, ["c", "b", "a"]);
}

#[test]
fn effects_before_answers_are_ordered() {
    let mut h = harness_with_loop(LoopMode::Off);
    h.load(&["a", "b"], 0);
    h.controller.command(Command::SkipNext);

    let effects = h.take_effects();
    assert_eq!(effects[0], Effect::Backend(BackendOp::Stop));
    assert!(matches!(effects[1], Effect::Resolve { ref track, .. } if track.id == "b"));
}
