/// One chart entry: a set of action flags placed on a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatAction<T> {
    pub measure: u32,
    /// Tick within the measure on the final grid; `None` until quantized.
    pub tick_on_measure: Option<u32>,
    pub flags: T,
}

impl<T: Copy> BeatAction<T> {
    pub fn new(measure: u32, tick_on_measure: Option<u32>, flags: T) -> Self {
        Self {
            measure,
            tick_on_measure,
            flags,
        }
    }

    /// Absolute tick on a grid of `grid_size` ticks per measure. `None` when
    /// unquantized or past the tick range.
    pub fn tick(&self, grid_size: u32) -> Option<u32> {
        let t = self.tick_on_measure?;
        self.measure.checked_mul(grid_size)?.checked_add(t)
    }

    /// The same action moved by whole measures and ticks.
    pub fn shifted(&self, measures: u32, ticks: u32) -> Self {
        Self {
            measure: self.measure + measures,
            tick_on_measure: self.tick_on_measure.map(|t| t + ticks),
            flags: self.flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_on_grid() {
        let a = BeatAction::new(2, Some(3), 1u8);
        assert_eq!(a.tick(8), Some(19));
        assert_eq!(BeatAction::new(2, None, 1u8).tick(8), None);
        assert_eq!(BeatAction::new(3, Some(0), 1u8).tick(1 << 31), None);
    }

    #[test]
    fn shifted_keeps_flags() {
        let a = BeatAction::new(1, Some(2), 5u8).shifted(1, 1);
        assert_eq!(a, BeatAction::new(2, Some(3), 5u8));
    }
}
