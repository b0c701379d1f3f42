/// Position of a crossed tick within the measure grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickInfo {
    /// Absolute tick number.
    pub tick: u32,
    /// Ticks in one measure.
    pub ticks_per_measure: u32,
}

impl TickInfo {
    pub fn new(tick: u32, ticks_per_measure: u32) -> Self {
        Self {
            tick,
            ticks_per_measure,
        }
    }

    /// Zero-based measure index.
    pub fn measure(&self) -> u32 {
        self.tick / self.ticks_per_measure.max(1)
    }

    pub fn tick_in_measure(&self) -> u32 {
        self.tick % self.ticks_per_measure.max(1)
    }

    /// Same grid, tick moved by `offset` (saturating at zero).
    pub fn with_offset(&self, offset: i32) -> Self {
        Self::new(self.offset_tick(offset).max(0) as u32, self.ticks_per_measure)
    }

    pub fn with_tick(&self, tick: u32) -> Self {
        Self::new(tick, self.ticks_per_measure)
    }

    /// Whether the tick lands on any beat of a measure split into `beat` beats.
    pub fn is_just_for_any_beat(&self, beat: u32, offset: i32) -> bool {
        self.beat_index_for(beat, offset).is_some()
    }

    /// Index of the beat this tick lands on when a measure is split into
    /// `beat` beats, or `None` between beats.
    pub fn beat_index_for(&self, beat: u32, offset: i32) -> Option<u32> {
        if beat == 0 || beat > self.ticks_per_measure {
            return None;
        }
        let size = i64::from(self.ticks_per_measure / beat);
        let tick = self.offset_tick(offset);
        if tick < 0 || tick % size != 0 {
            return None;
        }
        u32::try_from(tick / size).ok()
    }

    /// Whether the tick lands on slot `tick` of a measure split into
    /// `measure_tick` slots. Slots past `measure_tick` address later measures
    /// of a repeating pattern.
    pub fn is_just(&self, tick: u32, measure_tick: u32) -> bool {
        if measure_tick == 0 {
            return false;
        }
        let scale = f64::from(self.ticks_per_measure) / f64::from(measure_tick);
        let measures = 1 + tick / measure_tick;
        let span = f64::from(measures) * f64::from(measure_tick) * scale;
        (f64::from(self.tick) % span) as i64 == (f64::from(tick) * scale) as i64
    }

    fn offset_tick(&self, offset: i32) -> i64 {
        i64::from(self.tick) + i64::from(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_and_position() {
        let info = TickInfo::new(19, 8);
        assert_eq!(info.measure(), 2);
        assert_eq!(info.tick_in_measure(), 3);
    }

    #[test]
    fn offsets() {
        let info = TickInfo::new(5, 8);
        assert_eq!(info.with_offset(3).tick, 8);
        assert_eq!(info.with_offset(-9).tick, 0);
        assert_eq!(info.with_tick(1), TickInfo::new(1, 8));
    }

    #[test]
    fn quarter_beats_on_eighth_grid() {
        // 8 ticks per measure, 4 beats: every second tick is a beat
        assert!(TickInfo::new(6, 8).is_just_for_any_beat(4, 0));
        assert!(!TickInfo::new(5, 8).is_just_for_any_beat(4, 0));
        assert!(TickInfo::new(5, 8).is_just_for_any_beat(4, 1));
        assert_eq!(TickInfo::new(6, 8).beat_index_for(4, 0), Some(3));
        assert_eq!(TickInfo::new(7, 8).beat_index_for(4, 0), None);
        assert_eq!(TickInfo::new(7, 8).beat_index_for(0, 0), None);
    }

    #[test]
    fn is_just_matches_slot_within_pattern() {
        // 16 ticks per measure, measure split into 4 slots of 4 ticks
        assert!(TickInfo::new(8, 16).is_just(2, 4));
        assert!(TickInfo::new(24, 16).is_just(2, 4));
        assert!(!TickInfo::new(9, 16).is_just(2, 4));
        // slot 5 of a 4-slot measure lives in the second measure of a 2-measure pattern
        assert!(TickInfo::new(20, 16).is_just(5, 4));
        assert!(!TickInfo::new(4, 16).is_just(5, 4));
    }
}
