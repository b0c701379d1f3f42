/// Clock readings supplied by the host for one update step.
///
/// `dsp` is the monotonically increasing audio-hardware clock used for all
/// scheduling and tick math. `wall` is the frame clock used to pace volume
/// fades. Both are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    pub dsp: f64,
    pub wall: f64,
}

impl FrameTime {
    pub fn new(dsp: f64, wall: f64) -> Self {
        Self { dsp, wall }
    }

    /// A reading where the frame clock tracks the audio clock exactly.
    pub fn uniform(seconds: f64) -> Self {
        Self {
            dsp: seconds,
            wall: seconds,
        }
    }

    /// Advance both clocks by `delta` seconds.
    pub fn advanced(self, delta: f64) -> Self {
        Self {
            dsp: self.dsp + delta,
            wall: self.wall + delta,
        }
    }
}
