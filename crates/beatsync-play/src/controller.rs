use std::sync::Arc;
use std::task::Poll;

use beatsync_audio::{
    AudioBackend, ChannelId, ChannelLoad, CrossfadeEngine, LoadStandby, ScheduleStart,
    UnloadChannel,
};
use beatsync_score::BeatScore;
use beatsync_timing::{BeatEvent, TimingSolver};
use beatsync_types::{
    BeatError, BeatWarning, CancelToken, ClipHandle, EventBus, FrameTime, Subscription,
};
use log::{debug, error, info, warn};

use crate::config::PlaybackConfig;
use crate::request::StartRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Start,
    Stop,
}

/// Outcome of a finished or interrupted start/stop.
#[derive(Debug)]
pub struct TransitionReport {
    pub kind: TransitionKind,
    pub result: Result<(), BeatError>,
    /// Recoverable conditions met along the way.
    pub warnings: Vec<BeatWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDisposition {
    Started,
    /// The score is already playing (or starting) and the request was not forced.
    AlreadyActive,
}

struct ActiveTrack {
    score: Arc<BeatScore>,
    unload_with: Vec<ClipHandle>,
}

struct StartTransition {
    request: StartRequest,
    start_time: f64,
    fade: f64,
    cancel: CancelToken,
    warnings: Vec<BeatWarning>,
    stage: StartStage,
}

enum StartStage {
    Loading(LoadStandby),
    Crossing {
        unload: Option<UnloadChannel>,
        start: Option<ScheduleStart>,
        error: Option<BeatError>,
    },
}

struct StopTransition {
    cancel: CancelToken,
    unloads: Vec<UnloadChannel>,
    error: Option<BeatError>,
}

enum Transition {
    Start(StartTransition),
    Stop(StopTransition),
}

impl Transition {
    fn kind(&self) -> TransitionKind {
        match self {
            Self::Start(_) => TransitionKind::Start,
            Self::Stop(_) => TransitionKind::Stop,
        }
    }

    fn cancel(&self) {
        match self {
            Self::Start(t) => t.cancel.cancel(),
            Self::Stop(t) => t.cancel.cancel(),
        }
    }

    fn take_warnings(&mut self) -> Vec<BeatWarning> {
        match self {
            Self::Start(t) => std::mem::take(&mut t.warnings),
            Self::Stop(_) => Vec::new(),
        }
    }
}

struct PendingResume {
    at: f64,
    countdown: Box<dyn FnMut(f64)>,
}

/// Drives one beat-synchronized track at a time over a crossfade engine.
///
/// Every method that touches audio takes the backend and the current
/// [`FrameTime`]; [`Self::update`] must be called once per host frame to
/// progress transitions and emit beat events.
pub struct PlaybackController {
    config: PlaybackConfig,
    engine: CrossfadeEngine,
    solver: TimingSolver,
    events: EventBus<BeatEvent>,
    active: Option<ActiveTrack>,
    transition: Option<Transition>,
    /// `unload_with` clips of an interrupted unload, released by the next one.
    leftover_releases: Vec<ClipHandle>,
    pending_resume: Option<PendingResume>,
    reports: Vec<TransitionReport>,
    time_scale: f64,
}

impl PlaybackController {
    pub fn new(mut config: PlaybackConfig) -> Self {
        config.validate();
        Self {
            engine: CrossfadeEngine::new(config.default_start_offset),
            solver: TimingSolver::with_manual_offset(config.manual_offset),
            config,
            events: EventBus::new(),
            active: None,
            transition: None,
            leftover_releases: Vec::new(),
            pending_resume: None,
            reports: Vec::new(),
            time_scale: 1.0,
        }
    }

    /// Also keep published events for [`Self::drain_events`].
    pub fn with_event_queue(mut self) -> Self {
        self.events = EventBus::with_queue();
        self
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn engine(&self) -> &CrossfadeEngine {
        &self.engine
    }

    pub fn solver(&self) -> &TimingSolver {
        &self.solver
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&BeatEvent) + 'static) -> Subscription {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    pub fn drain_events(&mut self) -> Vec<BeatEvent> {
        self.events.drain()
    }

    /// Global time scale for the rest of the application: 0.0 while paused
    /// when `pauseTimeScale` is set, 1.0 otherwise.
    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn active_score(&self) -> Option<&Arc<BeatScore>> {
        self.active.as_ref().map(|a| &a.score)
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.solver.is_paused()
    }

    pub fn set_offset_time(&mut self, seconds: f64) {
        self.solver.set_offset_time(seconds);
    }

    /// Begin a transition to `request.score`. Any start or stop in flight is
    /// cancelled first; its report is returned by the next `update`.
    pub fn start<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        request: StartRequest,
        now: FrameTime,
    ) -> StartDisposition {
        let same = self
            .target_score()
            .is_some_and(|score| Arc::ptr_eq(score, &request.score));
        if same && !request.force_restart {
            debug!("Start ignored: score already active");
            return StartDisposition::AlreadyActive;
        }
        self.interrupt(backend, now);

        let (start_time, warning) = self.engine.resolve_start_time(request.start_time, now.dsp);
        let fade = request
            .fade_duration
            .unwrap_or(self.config.default_fade_duration);
        let score = &request.score;
        let load = ChannelLoad::new(score.intro_clip(), score.loop_clip())
            .with_aux(request.load_with.iter().copied())
            .with_trim(score.volume());
        let cancel = CancelToken::new();
        let load = self.engine.load_standby(load, cancel.child());
        info!("Starting score at {start_time:.3} with {fade:.2}s crossfade");

        self.transition = Some(Transition::Start(StartTransition {
            request,
            start_time,
            fade,
            cancel,
            warnings: warning.into_iter().collect(),
            stage: StartStage::Loading(load),
        }));
        StartDisposition::Started
    }

    /// Fade out and release everything, then reset the solver to idle.
    pub fn stop<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        fade_duration: Option<f64>,
        now: FrameTime,
    ) {
        self.interrupt(backend, now);
        let fade = fade_duration.unwrap_or(self.config.default_fade_duration);
        let cancel = CancelToken::new();
        let active = self.engine.active();
        let standby = self.engine.standby();
        let mut unload_with = self
            .active
            .as_ref()
            .map(|a| a.unload_with.clone())
            .unwrap_or_default();
        unload_with.append(&mut self.leftover_releases);

        // leftovers of an interrupted crossfade go first, keeping clips the active channel holds
        let mut unloads = Vec::new();
        if self.channel_in_use(standby) {
            unloads.push(self.engine.unload_channel(
                standby,
                Some(active),
                0.0,
                Vec::new(),
                now,
                cancel.child(),
            ));
        }
        unloads.push(self.engine.unload_channel(
            active,
            None,
            fade,
            unload_with,
            now,
            cancel.child(),
        ));
        info!("Stopping with {fade:.2}s fade");
        self.transition = Some(Transition::Stop(StopTransition {
            cancel,
            unloads,
            error: None,
        }));
    }

    /// Freeze music time and pause both channels. `Ok(Some(_))` is a logged no-op.
    pub fn pause<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        now: FrameTime,
    ) -> Result<Option<BeatWarning>, BeatError> {
        if let Err(warning) = self.solver.begin_pause(now.dsp) {
            return Ok(Some(warning));
        }
        for channel in [ChannelId::A, ChannelId::B] {
            self.engine.pause_channel(backend, channel)?;
        }
        if self.config.pause_time_scale {
            self.time_scale = 0.0;
        }
        info!("Paused at {:.3}", now.dsp);
        Ok(None)
    }

    /// Resume immediately. Cancels a pending countdown resume.
    pub fn resume<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        now: FrameTime,
    ) -> Result<Option<BeatWarning>, BeatError> {
        self.pending_resume = None;
        if let Err(warning) = self.solver.end_pause(now.dsp) {
            return Ok(Some(warning));
        }
        for channel in [ChannelId::A, ChannelId::B] {
            self.engine.resume_channel(backend, channel)?;
        }
        self.time_scale = 1.0;
        info!("Resumed at {:.3}", now.dsp);
        Ok(None)
    }

    /// Resume once the scheduling clock reaches `clock_time`. Until then
    /// `countdown` is called every update with the seconds remaining.
    pub fn resume_at(
        &mut self,
        clock_time: f64,
        countdown: impl FnMut(f64) + 'static,
    ) -> Option<BeatWarning> {
        if !self.solver.is_paused() {
            warn!("{}", BeatWarning::NotPaused);
            return Some(BeatWarning::NotPaused);
        }
        self.pending_resume = Some(PendingResume {
            at: clock_time,
            countdown: Box::new(countdown),
        });
        None
    }

    /// Progress the countdown resume and any transition, then publish every
    /// event the solver produces for `now`. Returns the transitions that
    /// finished since the last call.
    pub fn update<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        now: FrameTime,
    ) -> Result<Vec<TransitionReport>, BeatError> {
        self.poll_resume(backend, now)?;

        if let Some(mut transition) = self.transition.take() {
            match self.poll_transition(&mut transition, backend, now) {
                Poll::Pending => self.transition = Some(transition),
                Poll::Ready(result) => self.finish(transition, result),
            }
        }

        let events = self.solver.advance(now.dsp);
        self.events.publish_all(events);
        Ok(std::mem::take(&mut self.reports))
    }

    fn poll_resume<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        now: FrameTime,
    ) -> Result<(), BeatError> {
        let Some(pending) = &mut self.pending_resume else {
            return Ok(());
        };
        if now.dsp < pending.at {
            (pending.countdown)(pending.at - now.dsp);
            return Ok(());
        }
        self.resume(backend, now)?;
        Ok(())
    }

    fn target_score(&self) -> Option<&Arc<BeatScore>> {
        match &self.transition {
            Some(Transition::Start(t)) => Some(&t.request.score),
            Some(Transition::Stop(_)) => None,
            None => self.active_score(),
        }
    }

    fn channel_in_use(&self, channel: ChannelId) -> bool {
        let state = self.engine.channel(channel);
        state.is_playing || !state.clips().is_empty()
    }

    /// Cancel the transition in flight and let its tasks unwind once.
    fn interrupt<B: AudioBackend + ?Sized>(&mut self, backend: &mut B, now: FrameTime) {
        let Some(mut transition) = self.transition.take() else {
            return;
        };
        debug!("Interrupting {:?} transition", transition.kind());
        transition.cancel();
        let result = match self.poll_transition(&mut transition, backend, now) {
            Poll::Ready(result) => result,
            Poll::Pending => Err(BeatError::Cancelled),
        };
        self.finish(transition, result);
    }

    fn finish(&mut self, mut transition: Transition, result: Result<(), BeatError>) {
        let kind = transition.kind();
        match &result {
            Ok(()) => info!("{kind:?} transition finished"),
            Err(err) if err.is_cancellation() => debug!("{kind:?} transition cancelled"),
            Err(err) => error!("{kind:?} transition failed: {err:#}"),
        }
        self.reports.push(TransitionReport {
            kind,
            result,
            warnings: transition.take_warnings(),
        });
    }

    fn poll_transition<B: AudioBackend + ?Sized>(
        &mut self,
        transition: &mut Transition,
        backend: &mut B,
        now: FrameTime,
    ) -> Poll<Result<(), BeatError>> {
        match transition {
            Transition::Start(start) => self.poll_start(start, backend, now),
            Transition::Stop(stop) => self.poll_stop(stop, backend, now),
        }
    }

    fn poll_start<B: AudioBackend + ?Sized>(
        &mut self,
        t: &mut StartTransition,
        backend: &mut B,
        now: FrameTime,
    ) -> Poll<Result<(), BeatError>> {
        if let StartStage::Loading(load) = &mut t.stage {
            match load.poll(&mut self.engine, backend, now) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Ready(Ok(())) => t.stage = self.cross_over(t, now),
            }
        }

        let StartStage::Crossing {
            unload,
            start,
            error,
        } = &mut t.stage
        else {
            return Poll::Pending;
        };
        if let Some(task) = unload {
            if let Poll::Ready(result) = task.poll(&mut self.engine, backend, now) {
                if let Err(err) = result {
                    error.get_or_insert(err);
                }
                self.leftover_releases.extend(task.take_unreleased());
                *unload = None;
            }
        }
        if let Some(task) = start {
            if let Poll::Ready(result) = task.poll(&mut self.engine, backend, now) {
                match result {
                    Ok(scheduled) => t.warnings.extend(scheduled.warning),
                    Err(err) => {
                        error.get_or_insert(err);
                    }
                }
                *start = None;
            }
        }
        if unload.is_some() || start.is_some() {
            return Poll::Pending;
        }
        Poll::Ready(error.take().map_or(Ok(()), Err))
    }

    /// Arm the solver on the loaded standby, swap channels, and begin the
    /// fade-out/fade-in pair.
    fn cross_over(&mut self, t: &mut StartTransition, now: FrameTime) -> StartStage {
        let (start_time, warning) = self.engine.resolve_start_time(Some(t.start_time), now.dsp);
        t.warnings.extend(warning);
        t.start_time = start_time;

        let score = Arc::clone(&t.request.score);
        let armed = self.solver.set_score(Arc::clone(&score), start_time);
        self.events.publish(armed);

        let outgoing = self.engine.active();
        self.engine.swap_active_standby();
        let incoming = self.engine.active();

        let mut unload_with = self
            .active
            .take()
            .map(|a| a.unload_with)
            .unwrap_or_default();
        unload_with.append(&mut self.leftover_releases);
        let unload = (self.channel_in_use(outgoing) || !unload_with.is_empty()).then(|| {
            self.engine.unload_channel(
                outgoing,
                Some(incoming),
                t.fade,
                unload_with,
                now,
                t.cancel.child(),
            )
        });
        let start = self
            .engine
            .schedule_start(incoming, start_time, t.fade, t.cancel.child());
        self.active = Some(ActiveTrack {
            score,
            unload_with: t.request.unload_with.clone(),
        });
        StartStage::Crossing {
            unload,
            start: Some(start),
            error: None,
        }
    }

    fn poll_stop<B: AudioBackend + ?Sized>(
        &mut self,
        t: &mut StopTransition,
        backend: &mut B,
        now: FrameTime,
    ) -> Poll<Result<(), BeatError>> {
        let mut remaining = Vec::with_capacity(t.unloads.len());
        for mut task in t.unloads.drain(..) {
            match task.poll(&mut self.engine, backend, now) {
                Poll::Pending => remaining.push(task),
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(err)) => {
                    t.error.get_or_insert(err);
                    self.leftover_releases.extend(task.take_unreleased());
                }
            }
        }
        t.unloads = remaining;
        if !t.unloads.is_empty() {
            return Poll::Pending;
        }

        self.solver.reset();
        self.active = None;
        self.pending_resume = None;
        self.time_scale = 1.0;
        Poll::Ready(t.error.take().map_or(Ok(()), Err))
    }
}
