use std::sync::Arc;

use beatsync_score::BeatScore;
use beatsync_types::BeatWarning;
use log::{debug, info, warn};

use crate::event::BeatEvent;
use crate::tick_info::TickInfo;

/// Tempo the solver reports before any score is armed.
const IDLE_BPM: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverPhase {
    Idle,
    Armed,
    Playing,
    WaitingLoop,
}

/// Live solver state. Clock values are in the scheduling clock's seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingCursor {
    pub current_tick: usize,
    pub waiting_for_loop: bool,
    pub loop_start_clock_time: f64,
    pub start_clock_time: f64,
    pub manual_offset_seconds: f64,
    /// Finished pauses, folded in by `end_pause`.
    pub pause_offset: f64,
    /// Clock time the running pause began at.
    pub pause_started_at: Option<f64>,
    pub current_bpm: f64,
}

impl Default for TimingCursor {
    fn default() -> Self {
        Self {
            current_tick: 0,
            waiting_for_loop: false,
            loop_start_clock_time: 0.0,
            start_clock_time: 0.0,
            manual_offset_seconds: 0.0,
            pause_offset: 0.0,
            pause_started_at: None,
            current_bpm: IDLE_BPM,
        }
    }
}

impl TimingCursor {
    /// Length of the running pause at `now`, zero when not paused.
    pub fn pause_accumulated(&self, now: f64) -> f64 {
        self.pause_started_at.map_or(0.0, |start| now - start)
    }
}

/// Result of a nearest-tick query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestTick {
    pub tick: usize,
    /// Tick time minus the queried time; negative when the tick already passed.
    pub delta: f64,
}

/// Converts clock readings into tick crossings for one armed score.
#[derive(Debug, Clone)]
pub struct TimingSolver {
    score: Option<Arc<BeatScore>>,
    cursor: TimingCursor,
    phase: SolverPhase,
}

impl Default for TimingSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingSolver {
    pub fn new() -> Self {
        Self {
            score: None,
            cursor: TimingCursor::default(),
            phase: SolverPhase::Idle,
        }
    }

    pub fn with_manual_offset(offset: f64) -> Self {
        let mut solver = Self::new();
        solver.cursor.manual_offset_seconds = offset;
        solver
    }

    /// Arm `score` to start at `start_clock_time`. The manual offset carries over.
    pub fn set_score(&mut self, score: Arc<BeatScore>, start_clock_time: f64) -> BeatEvent {
        info!(
            "Arming score: {} ticks, {:.3}s, starts at {:.3}",
            score.total_tick_sum(),
            score.total_length(),
            start_clock_time
        );
        self.cursor = TimingCursor {
            loop_start_clock_time: start_clock_time,
            start_clock_time,
            manual_offset_seconds: self.cursor.manual_offset_seconds,
            current_bpm: score.bpm_at(0.0),
            ..TimingCursor::default()
        };
        self.phase = SolverPhase::Armed;
        self.score = Some(Arc::clone(&score));
        BeatEvent::ScoreArmed {
            score,
            start_time: start_clock_time,
        }
    }

    /// Back to `Idle`, dropping the score. The manual offset carries over.
    pub fn reset(&mut self) {
        debug!("Timing solver reset");
        self.score = None;
        self.cursor = TimingCursor {
            manual_offset_seconds: self.cursor.manual_offset_seconds,
            ..TimingCursor::default()
        };
        self.phase = SolverPhase::Idle;
    }

    pub fn set_offset_time(&mut self, seconds: f64) {
        self.cursor.manual_offset_seconds = seconds;
    }

    pub fn offset_time(&self) -> f64 {
        self.cursor.manual_offset_seconds
    }

    pub fn score(&self) -> Option<&Arc<BeatScore>> {
        self.score.as_ref()
    }

    pub fn cursor(&self) -> &TimingCursor {
        &self.cursor
    }

    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    pub fn current_tick(&self) -> usize {
        self.cursor.current_tick
    }

    pub fn start_clock_time(&self) -> f64 {
        self.cursor.start_clock_time
    }

    pub fn is_paused(&self) -> bool {
        self.cursor.pause_started_at.is_some()
    }

    /// Music time of the current loop pass.
    pub fn elapsed(&self, now: f64) -> f64 {
        self.music_time(now, self.cursor.loop_start_clock_time)
    }

    /// Music time since the score started, growing across loop passes.
    pub fn elapsed_no_repeat(&self, now: f64) -> f64 {
        self.music_time(now, self.cursor.start_clock_time)
    }

    fn music_time(&self, now: f64, basis: f64) -> f64 {
        let score_offset = self.score.as_ref().map_or(0.0, |s| s.offset());
        now - basis + score_offset + self.cursor.manual_offset_seconds
            - self.cursor.pause_offset
            - self.cursor.pause_accumulated(now)
    }

    pub fn current_bpm(&self) -> f64 {
        self.cursor.current_bpm
    }

    /// Seconds per beat at the current tempo.
    pub fn beat_length(&self) -> f64 {
        60.0 / self.cursor.current_bpm
    }

    /// Tempo relative to 120 BPM.
    pub fn speed_scale(&self) -> f64 {
        self.cursor.current_bpm / 120.0
    }

    pub fn music_beat_time(&self, now: f64) -> f64 {
        self.elapsed(now) / self.beat_length()
    }

    pub fn music_beat_time_no_repeat(&self, now: f64) -> f64 {
        self.elapsed_no_repeat(now) / self.beat_length()
    }

    /// Emit every tick boundary crossed up to `now`, in order.
    ///
    /// At most one pass over the table plus its loop seam is emitted per
    /// call; a larger jump is caught up by later calls. A non-looping score
    /// passes its seam once and then stays parked at the end.
    pub fn advance(&mut self, now: f64) -> Vec<BeatEvent> {
        let mut events = Vec::new();
        let Some(score) = self.score.clone() else {
            return events;
        };
        let total = score.total_tick_sum();
        let ticks_per_measure = score.measure_tick_count();
        let mut elapsed = self.elapsed(now);
        let budget = total + 1;
        let mut crossed = 0;

        loop {
            if self.cursor.waiting_for_loop {
                if crossed >= budget
                    || score.loop_length() <= 0.0
                    || elapsed < score.total_length()
                {
                    break;
                }
                self.cursor.loop_start_clock_time += score.loop_length();
                elapsed -= score.loop_length();
                events.push(BeatEvent::Looped);
                crossed += 1;
                // a non-looping score stays parked at the end, where timing is infinite
                self.cursor.waiting_for_loop = false;
                self.phase = SolverPhase::Playing;
                continue;
            }

            if crossed >= budget || elapsed < score.beat_timing(self.cursor.current_tick as i64) {
                break;
            }
            self.cursor.current_bpm = score.bpm_at(elapsed);
            events.push(BeatEvent::BeatCrossed(TickInfo::new(
                self.cursor.current_tick as u32,
                ticks_per_measure,
            )));
            crossed += 1;
            self.cursor.current_tick += 1;
            self.phase = SolverPhase::Playing;

            if self.cursor.current_tick >= total {
                if score.is_loop() {
                    self.cursor.current_tick = score.intro_tick_sum();
                }
                self.cursor.waiting_for_loop = true;
                self.phase = SolverPhase::WaitingLoop;
                events.push(BeatEvent::EndOfScore);
            }
        }
        events
    }

    pub fn begin_pause(&mut self, now: f64) -> Result<(), BeatWarning> {
        if self.cursor.pause_started_at.is_some() {
            warn!("{}", BeatWarning::DoublePause);
            return Err(BeatWarning::DoublePause);
        }
        debug!("Pausing at {now:.3}");
        self.cursor.pause_started_at = Some(now);
        Ok(())
    }

    pub fn end_pause(&mut self, now: f64) -> Result<(), BeatWarning> {
        let Some(start) = self.cursor.pause_started_at.take() else {
            warn!("{}", BeatWarning::NotPaused);
            return Err(BeatWarning::NotPaused);
        };
        self.cursor.pause_offset += now - start;
        debug!("Resumed after {:.3}s pause", now - start);
        Ok(())
    }

    /// Tick closest to `elapsed` music time. `beats_per_measure` restricts
    /// candidates to that subdivision and must divide the measure evenly.
    pub fn nearest_tick(&self, elapsed: f64, beats_per_measure: Option<u32>) -> Option<NearestTick> {
        let score = self.score.as_ref()?;
        let total = score.total_tick_sum() as i64;
        let measure = score.measure_tick_count();
        if total == 0 {
            return None;
        }
        let size = match beats_per_measure {
            None => 1,
            Some(beats) if beats == 0 || measure % beats != 0 => return None,
            Some(beats) => i64::from(measure / beats),
        };

        let current = self.cursor.current_tick as i64;
        let mut last = current - current % size;
        let mut next = last + size;
        let mut pre = score.beat_timing(last);
        let mut nex = score.beat_timing(next);
        while elapsed < pre && last - size >= 0 {
            last -= size;
            next -= size;
            pre = score.beat_timing(last);
            nex = score.beat_timing(next);
        }
        while nex < elapsed && next + size < total {
            last += size;
            next += size;
            pre = score.beat_timing(last);
            nex = score.beat_timing(next);
        }

        let (tick, time) = if elapsed <= (pre + nex) / 2.0 {
            (last, pre)
        } else {
            (next, nex)
        };
        Some(NearestTick {
            tick: tick as usize,
            delta: time - elapsed,
        })
    }

    /// [`Self::nearest_tick`] at the music time for clock reading `now`.
    pub fn nearest_tick_at(&self, now: f64, beats_per_measure: Option<u32>) -> Option<NearestTick> {
        self.nearest_tick(self.elapsed(now), beats_per_measure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatsync_types::ClipHandle;

    /// 120 BPM, 4 ticks per measure of 4 beats: one tick every 0.5 s.
    fn score(is_loop: bool, intro: f64, main: f64) -> Arc<BeatScore> {
        let mut builder = BeatScore::builder()
            .looping(is_loop)
            .bpm(0.0, 120.0)
            .subdivision(4, 4)
            .main_loop(Some(ClipHandle(2)), main)
            .bake_interval(1e-4);
        if intro > 0.0 {
            builder = builder.intro(Some(ClipHandle(1)), intro);
        }
        Arc::new(builder.bake().unwrap())
    }

    /// Hand-authored table with ticks exactly every 0.5 s.
    fn exact_score() -> Arc<BeatScore> {
        let table = (0..8).map(|i| f64::from(i) * 0.5).collect();
        let score = BeatScore::builder()
            .looping(true)
            .subdivision(4, 4)
            .main_loop(Some(ClipHandle(2)), 4.0)
            .timing_table(table, 0)
            .build()
            .unwrap();
        Arc::new(score)
    }

    fn beats(events: &[BeatEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                BeatEvent::BeatCrossed(info) => Some(info.tick),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn idle_solver_emits_nothing() {
        let mut solver = TimingSolver::new();
        assert!(solver.advance(100.0).is_empty());
        assert_eq!(solver.phase(), SolverPhase::Idle);
        assert_eq!(solver.current_bpm(), 120.0);
    }

    #[test]
    fn arming_resets_cursor() {
        let mut solver = TimingSolver::with_manual_offset(0.02);
        let s = score(true, 0.0, 2.0);
        let event = solver.set_score(Arc::clone(&s), 10.0);
        assert_eq!(
            event,
            BeatEvent::ScoreArmed {
                score: s,
                start_time: 10.0
            }
        );
        assert_eq!(solver.phase(), SolverPhase::Armed);
        assert_eq!(solver.cursor().loop_start_clock_time, 10.0);
        assert_eq!(solver.offset_time(), 0.02);
    }

    #[test]
    fn skipped_ticks_are_all_emitted_in_order() {
        let mut solver = TimingSolver::new();
        solver.set_score(score(true, 0.0, 4.0), 0.0);
        assert_eq!(beats(&solver.advance(0.0)), vec![0]);
        assert_eq!(beats(&solver.advance(1.6)), vec![1, 2, 3]);
        assert_eq!(solver.phase(), SolverPhase::Playing);
        assert!(solver.advance(1.7).is_empty());
    }

    #[test]
    fn loop_skips_intro_and_fires_looped_first() {
        let mut solver = TimingSolver::new();
        // intro 1.0 s (2 ticks) + loop 1.0 s (2 ticks)
        solver.set_score(score(true, 1.0, 1.0), 0.0);
        let events = solver.advance(1.6);
        assert_eq!(beats(&events), vec![0, 1, 2, 3]);
        assert_eq!(events.last(), Some(&BeatEvent::EndOfScore));
        assert_eq!(solver.phase(), SolverPhase::WaitingLoop);
        assert_eq!(solver.current_tick(), 2);

        let events = solver.advance(2.1);
        assert_eq!(events[0], BeatEvent::Looped);
        assert_eq!(beats(&events), vec![2]);
        assert!((solver.cursor().loop_start_clock_time - 1.0).abs() < 1e-12);
        // elapsed is continuous across the seam
        assert!((solver.elapsed(2.1) - 1.1).abs() < 1e-9);
        assert!((solver.elapsed_no_repeat(2.1) - 2.1).abs() < 1e-9);
    }

    #[test]
    fn non_loop_score_parks_at_end() {
        let mut solver = TimingSolver::new();
        solver.set_score(score(false, 0.0, 2.0), 0.0);
        let events = solver.advance(1.6);
        assert_eq!(beats(&events), vec![0, 1, 2, 3]);
        assert_eq!(events.last(), Some(&BeatEvent::EndOfScore));
        assert_eq!(solver.phase(), SolverPhase::WaitingLoop);
        assert_eq!(solver.advance(2.1), vec![BeatEvent::Looped]);
        assert_eq!(solver.phase(), SolverPhase::Playing);
        assert_eq!(solver.current_tick(), 4);
        assert!(!solver.cursor().waiting_for_loop);
        // the seam is passed once; later clock jumps emit nothing
        assert!(solver.advance(4.1).is_empty());
        assert!(solver.advance(100.0).is_empty());
        assert_eq!(solver.current_tick(), 4);
    }

    #[test]
    fn clock_jump_is_bounded_across_seams() {
        let mut solver = TimingSolver::new();
        // 2 ticks of intro and 2 of loop
        let s = score(true, 1.0, 1.0);
        solver.set_score(Arc::clone(&s), 0.0);
        let events = solver.advance(1000.0);
        let passes = events
            .iter()
            .filter(|e| matches!(e, BeatEvent::BeatCrossed(_) | BeatEvent::Looped))
            .count();
        assert_eq!(passes, s.total_tick_sum() + 1);
        assert_eq!(events.last(), Some(&BeatEvent::Looped));
    }

    #[test]
    fn pause_freezes_music_time() {
        let mut solver = TimingSolver::new();
        solver.set_score(score(true, 0.0, 4.0), 0.0);
        solver.begin_pause(1.0).unwrap();
        assert_eq!(solver.begin_pause(1.5), Err(BeatWarning::DoublePause));
        assert!((solver.elapsed(3.0) - 1.0).abs() < 1e-12);
        solver.end_pause(3.0).unwrap();
        assert_eq!(solver.end_pause(3.0), Err(BeatWarning::NotPaused));
        assert!((solver.elapsed(3.5) - 1.5).abs() < 1e-12);
        assert!(!solver.is_paused());
    }

    #[test]
    fn nearest_tick_prefers_earlier_on_tie() {
        let mut solver = TimingSolver::new();
        solver.set_score(exact_score(), 0.0);
        solver.advance(1.1);
        let hit = solver.nearest_tick(1.2, None).unwrap();
        assert_eq!(hit.tick, 2);
        assert!((hit.delta + 0.2).abs() < 1e-12);
        let hit = solver.nearest_tick(1.3, None).unwrap();
        assert_eq!(hit.tick, 3);
        assert_eq!(solver.nearest_tick(1.25, None).unwrap().tick, 2);
        // walks backward past the cursor
        assert_eq!(solver.nearest_tick(0.1, None).unwrap().tick, 0);
    }

    #[test]
    fn nearest_tick_on_half_measure_grid() {
        let mut solver = TimingSolver::new();
        solver.set_score(exact_score(), 0.0);
        // candidates every 2 ticks (1.0 s)
        let hit = solver.nearest_tick(1.4, Some(2)).unwrap();
        assert_eq!(hit.tick, 2);
        let hit = solver.nearest_tick(1.6, Some(2)).unwrap();
        assert_eq!(hit.tick, 4);
        assert_eq!(solver.nearest_tick(1.0, Some(3)), None);
    }

    #[test]
    fn derived_tempo_readings() {
        let mut solver = TimingSolver::new();
        solver.set_score(score(true, 0.0, 4.0), 0.0);
        solver.advance(0.0);
        assert_eq!(solver.current_bpm(), 120.0);
        assert!((solver.beat_length() - 0.5).abs() < 1e-12);
        assert!((solver.speed_scale() - 1.0).abs() < 1e-12);
        assert!((solver.music_beat_time(1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reset_keeps_manual_offset() {
        let mut solver = TimingSolver::new();
        solver.set_offset_time(-0.05);
        solver.set_score(score(true, 0.0, 2.0), 0.0);
        solver.reset();
        assert_eq!(solver.phase(), SolverPhase::Idle);
        assert!(solver.score().is_none());
        assert_eq!(solver.offset_time(), -0.05);
    }
}
