use std::task::Poll;

use beatsync_types::{BeatError, CancelToken, FrameTime};
use log::debug;

use crate::backend::AudioBackend;
use crate::channel::ChannelId;
use crate::engine::CrossfadeEngine;

/// Seconds a fade from `from` to `target` takes when a full 0↔1 swing
/// takes `duration`.
pub fn fade_span(duration: f64, from: f32, target: f32) -> f64 {
    duration.max(0.0) * f64::from((from - target).abs())
}

/// Fade registered on a channel. Only the newest one per channel is live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ActiveFade {
    pub generation: u64,
    pub from: f32,
    pub target: f32,
    pub span: f64,
    pub started_at: f64,
}

impl ActiveFade {
    /// Volume at frame-clock time `wall`, and whether the fade has finished.
    pub fn volume_at(&self, wall: f64) -> (f32, bool) {
        let elapsed = wall - self.started_at;
        if self.span <= 0.0 || elapsed >= self.span {
            return (self.target, true);
        }
        let progress = (elapsed.max(0.0) / self.span) as f32;
        (self.from + (self.target - self.from) * progress, false)
    }
}

/// Pollable linear volume fade on one channel.
///
/// Reaching zero stops the channel's transport. Issuing another fade on the
/// same channel supersedes this one, which then resolves to
/// [`BeatError::Cancelled`] without touching the channel.
#[derive(Debug)]
pub struct FadeTask {
    channel: ChannelId,
    generation: u64,
    cancel: CancelToken,
    done: bool,
}

impl FadeTask {
    pub(crate) fn new(channel: ChannelId, generation: u64, cancel: CancelToken) -> Self {
        Self {
            channel,
            generation,
            cancel,
            done: false,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn poll<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
        now: FrameTime,
    ) -> Poll<Result<(), BeatError>> {
        if self.done {
            return Poll::Ready(Ok(()));
        }
        match self.step(engine, backend, now) {
            Ok(false) => Poll::Pending,
            Ok(true) => {
                self.done = true;
                Poll::Ready(Ok(()))
            }
            Err(err) => {
                self.done = true;
                Poll::Ready(Err(err))
            }
        }
    }

    fn step<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
        now: FrameTime,
    ) -> Result<bool, BeatError> {
        let state = engine.channel_mut(self.channel);
        let fade = match state.fade {
            Some(fade) if fade.generation == self.generation => fade,
            _ => {
                debug!("Fade on {} superseded", self.channel);
                return Err(BeatError::Cancelled);
            }
        };
        if self.cancel.is_cancelled() {
            state.fade = None;
            return Err(BeatError::Cancelled);
        }

        let (volume, finished) = fade.volume_at(now.wall);
        state.volume = volume;
        let output = state.output_volume();
        if finished {
            state.fade = None;
        }
        let stop = finished && volume <= 0.0 && state.is_playing;
        if stop {
            state.is_playing = false;
        }

        backend.set_volume(self.channel, output)?;
        if stop {
            debug!("Stopping {} after fade-out", self.channel);
            backend.stop(self.channel)?;
        }
        Ok(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_scales_with_distance() {
        assert_eq!(fade_span(2.0, 1.0, 0.0), 2.0);
        assert_eq!(fade_span(2.0, 0.5, 0.0), 1.0);
        assert_eq!(fade_span(-1.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn linear_progress() {
        let fade = ActiveFade {
            generation: 1,
            from: 0.0,
            target: 1.0,
            span: 2.0,
            started_at: 10.0,
        };
        assert_eq!(fade.volume_at(10.0), (0.0, false));
        let (v, done) = fade.volume_at(11.0);
        assert!((v - 0.5).abs() < 1e-6);
        assert!(!done);
        assert_eq!(fade.volume_at(12.5), (1.0, true));
    }

    #[test]
    fn zero_span_snaps() {
        let fade = ActiveFade {
            generation: 1,
            from: 0.7,
            target: 0.0,
            span: 0.0,
            started_at: 0.0,
        };
        assert_eq!(fade.volume_at(0.0), (0.0, true));
    }
}
