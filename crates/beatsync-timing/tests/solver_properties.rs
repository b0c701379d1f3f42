use std::sync::Arc;

use beatsync_score::BeatScore;
use beatsync_timing::{BeatEvent, SolverPhase, TimingSolver};
use beatsync_types::ClipHandle;
use proptest::prelude::*;

fn looping_score(bpm_end: f64) -> Arc<BeatScore> {
    let score = BeatScore::builder()
        .looping(true)
        .bpm(0.0, 120.0)
        .bpm(3.0, bpm_end)
        .subdivision(8, 4)
        .intro(Some(ClipHandle(1)), 1.0)
        .main_loop(Some(ClipHandle(2)), 2.0)
        .bake_interval(1e-4)
        .bake()
        .unwrap();
    Arc::new(score)
}

/// Split an event stream into the tick runs between `Looped` markers.
fn passes(events: &[BeatEvent]) -> Vec<Vec<u32>> {
    let mut passes = vec![Vec::new()];
    for event in events {
        match event {
            BeatEvent::BeatCrossed(info) => passes.last_mut().unwrap().push(info.tick),
            BeatEvent::Looped => passes.push(Vec::new()),
            _ => {}
        }
    }
    passes
}

proptest! {
    #[test]
    fn ticks_advance_one_at_a_time(
        steps in prop::collection::vec(0.0f64..0.7, 1..200),
        bpm_end in 60.0f64..240.0,
    ) {
        let score = looping_score(bpm_end);
        let mut solver = TimingSolver::new();
        solver.set_score(Arc::clone(&score), 0.0);

        let mut now = 0.0;
        let mut events = Vec::new();
        for step in steps {
            now += step;
            events.extend(solver.advance(now));
        }

        let intro = score.intro_tick_sum() as u32;
        for (index, pass) in passes(&events).iter().enumerate() {
            for pair in pass.windows(2) {
                prop_assert_eq!(pair[1], pair[0] + 1);
            }
            if let Some(&first) = pass.first() {
                let expected_start = if index == 0 { 0 } else { intro };
                prop_assert_eq!(first, expected_start);
            }
        }
    }

    #[test]
    fn elapsed_is_continuous_across_loops(
        steps in prop::collection::vec(0.01f64..0.5, 1..100),
    ) {
        let score = looping_score(120.0);
        let mut solver = TimingSolver::new();
        solver.set_score(Arc::clone(&score), 0.0);

        let mut now = 0.0;
        for step in steps {
            let before = solver.elapsed(now);
            let previous = now;
            now += step;
            let looped = solver
                .advance(now)
                .iter()
                .filter(|e| **e == BeatEvent::Looped)
                .count();
            let after = solver.elapsed(now);
            let expected = before + (now - previous) - looped as f64 * score.loop_length();
            prop_assert!((after - expected).abs() < 1e-9);
        }
    }
}

#[test]
fn pause_window_freezes_music_time() {
    let score = looping_score(120.0);
    let mut solver = TimingSolver::new();
    solver.set_score(score, 0.0);
    solver.advance(1.0);

    solver.begin_pause(1.0).unwrap();
    let frozen = solver.elapsed(1.0);
    let during = solver.advance(2.5);
    assert!(during.is_empty());
    assert!((solver.elapsed(2.5) - frozen).abs() < 1e-12);

    solver.end_pause(4.0).unwrap();
    assert!((solver.elapsed(4.0) - frozen).abs() < 1e-12);
    assert!((solver.elapsed(4.5) - (frozen + 0.5)).abs() < 1e-12);
    assert!(!solver.advance(4.5).is_empty());
}

#[test]
fn end_of_score_precedes_looped() {
    let score = looping_score(120.0);
    let mut solver = TimingSolver::new();
    solver.set_score(Arc::clone(&score), 0.0);
    let events = solver.advance(score.total_length() + 0.01);
    let end = events.iter().position(|e| *e == BeatEvent::EndOfScore);
    let looped = events.iter().position(|e| *e == BeatEvent::Looped);
    assert!(end.unwrap() < looped.unwrap());
    assert_eq!(solver.phase(), SolverPhase::Playing);
}

#[test]
fn manual_offset_shifts_music_time() {
    let score = looping_score(120.0);
    let mut solver = TimingSolver::with_manual_offset(0.25);
    solver.set_score(score, 10.0);
    assert!((solver.elapsed(10.0) - 0.25).abs() < 1e-12);
    solver.set_offset_time(0.0);
    assert!(solver.elapsed(10.0).abs() < 1e-12);
}
