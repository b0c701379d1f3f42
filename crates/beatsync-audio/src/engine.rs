use std::collections::BTreeSet;
use std::task::Poll;

use beatsync_types::{BeatError, BeatWarning, CancelToken, ClipHandle, FrameTime};
use log::{debug, info, warn};

use crate::backend::{AudioBackend, LoadState, TrackPart};
use crate::channel::{ChannelId, ChannelLoad, ChannelState};
use crate::fade::{ActiveFade, FadeTask, fade_span};

/// Two playback channels with an active/standby toggle.
///
/// All channel mutation goes through the engine. Operations that have to
/// wait (loads, scheduled starts, fades, unloads) are returned as task
/// values the caller polls once per update with the current clock reading.
#[derive(Debug)]
pub struct CrossfadeEngine {
    channels: [ChannelState; 2],
    active: ChannelId,
    default_start_offset: f64,
    next_generation: u64,
}

impl CrossfadeEngine {
    /// `default_start_offset` is added to "now" whenever a start time is
    /// missing or already past.
    pub fn new(default_start_offset: f64) -> Self {
        Self {
            channels: [ChannelState::default(), ChannelState::default()],
            active: ChannelId::A,
            default_start_offset: default_start_offset.max(0.0),
            next_generation: 0,
        }
    }

    pub fn active(&self) -> ChannelId {
        self.active
    }

    pub fn standby(&self) -> ChannelId {
        self.active.other()
    }

    pub fn channel(&self, id: ChannelId) -> &ChannelState {
        &self.channels[id.index()]
    }

    pub(crate) fn channel_mut(&mut self, id: ChannelId) -> &mut ChannelState {
        &mut self.channels[id.index()]
    }

    pub fn default_start_offset(&self) -> f64 {
        self.default_start_offset
    }

    pub fn swap_active_standby(&mut self) {
        self.active = self.active.other();
        debug!("Active channel is now {}", self.active);
    }

    /// Start time no earlier than `now`. A past request is moved to
    /// `now + default_start_offset` and reported.
    pub fn resolve_start_time(
        &self,
        requested: Option<f64>,
        now: f64,
    ) -> (f64, Option<BeatWarning>) {
        let corrected = now + self.default_start_offset;
        match requested {
            None => (corrected, None),
            Some(time) if time < now => {
                let warning = BeatWarning::ScheduleCorrected {
                    requested: time,
                    corrected,
                };
                warn!("{warning}");
                (corrected, Some(warning))
            }
            Some(time) => (time, None),
        }
    }

    /// Fade `channel` towards `target` from its current volume. Any fade
    /// already running on the channel is superseded.
    pub fn fade(
        &mut self,
        channel: ChannelId,
        target: f32,
        duration: f64,
        now: FrameTime,
        cancel: CancelToken,
    ) -> FadeTask {
        self.next_generation += 1;
        let generation = self.next_generation;
        let state = self.channel_mut(channel);
        let target = target.clamp(0.0, 1.0);
        state.fade = Some(ActiveFade {
            generation,
            from: state.volume,
            target,
            span: fade_span(duration, state.volume, target),
            started_at: now.wall,
        });
        FadeTask::new(channel, generation, cancel)
    }

    /// Place `request` on the standby channel and load every clip it names.
    pub fn load_standby(&mut self, request: ChannelLoad, cancel: CancelToken) -> LoadStandby {
        LoadStandby {
            channel: self.standby(),
            request,
            cancel,
            pending: Vec::new(),
            stage: Stage::Init,
        }
    }

    /// Schedule `channel` to start at `start_time` and fade it in.
    pub fn schedule_start(
        &mut self,
        channel: ChannelId,
        start_time: f64,
        fade_duration: f64,
        cancel: CancelToken,
    ) -> ScheduleStart {
        ScheduleStart {
            channel,
            requested: start_time,
            fade_duration,
            cancel,
            stage: ScheduleStage::Init,
        }
    }

    /// Fade `channel` out, stop it, and release its clips plus `unload_with`.
    /// Clips also held by `preserve` stay loaded.
    pub fn unload_channel(
        &mut self,
        channel: ChannelId,
        preserve: Option<ChannelId>,
        fade_duration: f64,
        unload_with: Vec<ClipHandle>,
        now: FrameTime,
        cancel: CancelToken,
    ) -> UnloadChannel {
        let fade = self.fade(channel, 0.0, fade_duration, now, cancel.clone());
        UnloadChannel {
            channel,
            preserve,
            unload_with,
            released: false,
            cancel,
            stage: UnloadStage::Fading(fade),
        }
    }

    pub fn pause_channel<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        channel: ChannelId,
    ) -> Result<(), BeatError> {
        if self.channel(channel).is_playing {
            backend.pause(channel)?;
        }
        Ok(())
    }

    pub fn resume_channel<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        channel: ChannelId,
    ) -> Result<(), BeatError> {
        if self.channel(channel).is_playing {
            backend.resume(channel)?;
        }
        Ok(())
    }

    /// Clips held by `channel` that are safe to release: not resident and not
    /// held by `preserve`.
    fn releasable<B: AudioBackend + ?Sized>(
        &self,
        backend: &B,
        clips: BTreeSet<ClipHandle>,
        preserve: Option<ChannelId>,
    ) -> Vec<ClipHandle> {
        clips
            .into_iter()
            .filter(|&clip| !backend.is_preloaded(clip))
            .filter(|&clip| preserve.is_none_or(|other| !self.channel(other).holds(clip)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    Waiting,
    Done,
}

/// Pollable load of the standby channel.
///
/// Fails with [`BeatError::LoadAborted`] when cancelled before every clip
/// reports loaded; the channel is then left `Unloaded`.
#[derive(Debug)]
pub struct LoadStandby {
    channel: ChannelId,
    request: ChannelLoad,
    cancel: CancelToken,
    pending: Vec<ClipHandle>,
    stage: Stage,
}

impl LoadStandby {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn poll<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
        _now: FrameTime,
    ) -> Poll<Result<(), BeatError>> {
        if self.stage == Stage::Done {
            return Poll::Ready(Ok(()));
        }
        let result = self.step(engine, backend);
        if !matches!(result, Poll::Pending) {
            self.stage = Stage::Done;
        }
        result
    }

    fn step<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
    ) -> Poll<Result<(), BeatError>> {
        if self.cancel.is_cancelled() {
            self.pending.retain(|&clip| backend.load_state(clip) != LoadState::Loaded);
            let state = engine.channel_mut(self.channel);
            state.load_state = if self.stage == Stage::Waiting && self.pending.is_empty() {
                LoadState::Loaded
            } else {
                LoadState::Unloaded
            };
            debug!("Load of {} aborted", self.channel);
            return Poll::Ready(Err(BeatError::LoadAborted));
        }
        if self.stage == Stage::Init {
            if let Err(err) = self.begin(engine, backend) {
                engine.channel_mut(self.channel).load_state = LoadState::Unloaded;
                return Poll::Ready(Err(err));
            }
            self.stage = Stage::Waiting;
        }

        self.pending.retain(|&clip| backend.load_state(clip) != LoadState::Loaded);
        if self.pending.is_empty() {
            engine.channel_mut(self.channel).load_state = LoadState::Loaded;
            debug!("{} loaded", self.channel);
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }

    fn begin<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
    ) -> Result<(), BeatError> {
        let channel = self.channel;
        let wanted = self.request.clips();

        // a standby left over from an interrupted transition may still be audible
        if engine.channel(channel).is_playing {
            backend.stop(channel)?;
        }
        let stale: BTreeSet<ClipHandle> = engine
            .channel(channel)
            .clips()
            .difference(&wanted)
            .copied()
            .collect();
        for clip in engine.releasable(backend, stale, Some(channel.other())) {
            debug!("Releasing stale {clip} from {channel}");
            backend.begin_unload(clip)?;
        }

        let state = engine.channel_mut(channel);
        state.intro_clip = self.request.intro_clip;
        state.loop_clip = self.request.loop_clip;
        state.aux_clips = self.request.aux_clips.iter().copied().collect();
        state.trim = self.request.trim;
        state.volume = 0.0;
        state.is_playing = false;
        state.fade = None;
        state.load_state = LoadState::Loading;

        for clip in wanted {
            if backend.is_preloaded(clip) {
                continue;
            }
            match backend.load_state(clip) {
                LoadState::Loaded => {}
                LoadState::Loading => self.pending.push(clip),
                LoadState::Unloaded | LoadState::Unloading => {
                    debug!("Loading {clip} into {channel}");
                    backend.begin_load(clip)?;
                    self.pending.push(clip);
                }
            }
        }
        Ok(())
    }
}

/// Outcome of a completed [`ScheduleStart`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledStart {
    pub start_time: f64,
    /// Set when the requested start had already passed.
    pub warning: Option<BeatWarning>,
}

#[derive(Debug)]
enum ScheduleStage {
    Init,
    /// Scheduled and silent until the scheduling clock reaches the start.
    Waiting(ScheduledStart),
    Fading {
        start: ScheduledStart,
        fade: FadeTask,
    },
    Done(ScheduledStart),
}

/// Pollable scheduled start followed by a fade-in.
///
/// The channel stays silent until the scheduling clock reaches the start
/// time; the fade-in runs from there and the task completes when it ends.
#[derive(Debug)]
pub struct ScheduleStart {
    channel: ChannelId,
    requested: f64,
    fade_duration: f64,
    cancel: CancelToken,
    stage: ScheduleStage,
}

impl ScheduleStart {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn poll<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
        now: FrameTime,
    ) -> Poll<Result<ScheduledStart, BeatError>> {
        if let ScheduleStage::Done(start) = &self.stage {
            return Poll::Ready(Ok(start.clone()));
        }
        if self.cancel.is_cancelled() {
            self.stage = ScheduleStage::Done(ScheduledStart {
                start_time: self.requested,
                warning: None,
            });
            return Poll::Ready(Err(BeatError::Cancelled));
        }
        if matches!(self.stage, ScheduleStage::Init) {
            match self.begin(engine, backend, now) {
                Ok(running) => self.stage = running,
                Err(err) => {
                    self.stage = ScheduleStage::Done(ScheduledStart {
                        start_time: self.requested,
                        warning: None,
                    });
                    return Poll::Ready(Err(err));
                }
            }
        }

        if let ScheduleStage::Waiting(start) = &self.stage {
            if now.dsp < start.start_time {
                return Poll::Pending;
            }
            let start = start.clone();
            debug!("{} reached its start, fading in", self.channel);
            let fade = engine.fade(
                self.channel,
                1.0,
                self.fade_duration,
                now,
                self.cancel.clone(),
            );
            self.stage = ScheduleStage::Fading { start, fade };
        }

        let ScheduleStage::Fading { start, fade } = &mut self.stage else {
            return Poll::Pending;
        };
        match fade.poll(engine, backend, now) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                let start = start.clone();
                self.stage = ScheduleStage::Done(start.clone());
                Poll::Ready(result.map(|()| start))
            }
        }
    }

    fn begin<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
        now: FrameTime,
    ) -> Result<ScheduleStage, BeatError> {
        let channel = self.channel;
        let state = engine.channel(channel);
        let (intro, main_loop) = (state.intro_clip, state.loop_clip);
        if state.load_state != LoadState::Loaded {
            if let Some(clip) = intro.or(main_loop) {
                return Err(BeatError::ClipNotLoaded { clip });
            }
        }

        let (start_time, warning) = engine.resolve_start_time(Some(self.requested), now.dsp);
        let state = engine.channel_mut(channel);
        state.fade = None;
        state.volume = 0.0;
        backend.set_volume(channel, 0.0)?;

        let mut loop_time = start_time;
        if let Some(clip) = intro {
            backend.play_scheduled(channel, TrackPart::Intro, clip, start_time)?;
            loop_time += backend.length_seconds(clip)?;
        }
        if let Some(clip) = main_loop {
            backend.play_scheduled(channel, TrackPart::Loop, clip, loop_time)?;
        }
        engine.channel_mut(channel).is_playing = intro.is_some() || main_loop.is_some();
        info!("{channel} scheduled at {start_time:.3} (loop at {loop_time:.3})");

        Ok(ScheduleStage::Waiting(ScheduledStart {
            start_time,
            warning,
        }))
    }
}

#[derive(Debug)]
enum UnloadStage {
    Fading(FadeTask),
    Releasing(Vec<ClipHandle>),
    Done,
}

/// Pollable fade-out, stop and release of one channel.
#[derive(Debug)]
pub struct UnloadChannel {
    channel: ChannelId,
    preserve: Option<ChannelId>,
    unload_with: Vec<ClipHandle>,
    released: bool,
    cancel: CancelToken,
    stage: UnloadStage,
}

impl UnloadChannel {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// The extra clips this task never got to release, typically because it
    /// was cancelled mid-fade. Empty once the release has begun.
    pub fn take_unreleased(&mut self) -> Vec<ClipHandle> {
        if self.released {
            return Vec::new();
        }
        std::mem::take(&mut self.unload_with)
    }

    pub fn poll<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
        now: FrameTime,
    ) -> Poll<Result<(), BeatError>> {
        let result = self.step(engine, backend, now);
        if !matches!(result, Poll::Pending) {
            self.stage = UnloadStage::Done;
        }
        result
    }

    fn step<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
        now: FrameTime,
    ) -> Poll<Result<(), BeatError>> {
        if let UnloadStage::Fading(fade) = &mut self.stage {
            match fade.poll(engine, backend, now) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Ready(Ok(())) => match self.release(engine, backend) {
                    Ok(pending) => self.stage = UnloadStage::Releasing(pending),
                    Err(err) => return Poll::Ready(Err(err)),
                },
            }
        }

        match &mut self.stage {
            UnloadStage::Fading(_) => Poll::Pending,
            UnloadStage::Done => Poll::Ready(Ok(())),
            UnloadStage::Releasing(pending) => {
                if self.cancel.is_cancelled() {
                    engine.channel_mut(self.channel).load_state = LoadState::Unloaded;
                    return Poll::Ready(Err(BeatError::Cancelled));
                }
                pending.retain(|&clip| backend.load_state(clip) != LoadState::Unloaded);
                if !pending.is_empty() {
                    return Poll::Pending;
                }
                engine.channel_mut(self.channel).clear_clips();
                debug!("{} unloaded", self.channel);
                Poll::Ready(Ok(()))
            }
        }
    }

    fn release<B: AudioBackend + ?Sized>(
        &mut self,
        engine: &mut CrossfadeEngine,
        backend: &mut B,
    ) -> Result<Vec<ClipHandle>, BeatError> {
        let mut clips = engine.channel(self.channel).clips();
        clips.extend(self.unload_with.iter().copied());
        let preserve = self.preserve.filter(|&other| other != self.channel);
        let release = engine.releasable(backend, clips, preserve);
        self.released = true;
        for &clip in &release {
            debug!("Unloading {clip} from {}", self.channel);
            backend.begin_unload(clip)?;
        }
        engine.channel_mut(self.channel).load_state = LoadState::Unloaded;
        Ok(release)
    }
}
