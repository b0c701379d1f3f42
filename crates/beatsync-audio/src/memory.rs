use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, anyhow, bail};
use beatsync_types::ClipHandle;

use crate::backend::{ClipStorage, LoadState, TrackPart, Transport};
use crate::channel::ChannelId;

/// A transport call recorded by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    PlayScheduled {
        channel: ChannelId,
        part: TrackPart,
        clip: ClipHandle,
        clock_time: f64,
    },
    Stop(ChannelId),
    Pause(ChannelId),
    Resume(ChannelId),
    SetVolume(ChannelId, f32),
}

#[derive(Debug, Clone)]
struct MemoryClip {
    length: f64,
    state: LoadState,
    preloaded: bool,
    /// Frames left before a pending load or unload finishes.
    remaining: u32,
}

/// Clip storage and transport kept entirely in memory.
///
/// Loads and unloads finish after `latency` calls to [`Self::advance_frame`];
/// with zero latency they finish immediately.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    clips: BTreeMap<ClipHandle, MemoryClip>,
    latency: u32,
    failing: BTreeSet<ClipHandle>,
    pub calls: Vec<TransportCall>,
    pub loads: Vec<ClipHandle>,
    pub unloads: Vec<ClipHandle>,
    pub volumes: [f32; 2],
    pub paused: [bool; 2],
    scheduled: [Vec<(TrackPart, ClipHandle, f64)>; 2],
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, frames: u32) -> Self {
        self.latency = frames;
        self
    }

    pub fn register(&mut self, clip: ClipHandle, length: f64) {
        self.insert(clip, length, false);
    }

    /// Register a resident clip that is always loaded.
    pub fn register_preloaded(&mut self, clip: ClipHandle, length: f64) {
        self.insert(clip, length, true);
    }

    /// Make every later `begin_load` of `clip` fail.
    pub fn fail_loads_of(&mut self, clip: ClipHandle) {
        self.failing.insert(clip);
    }

    fn insert(&mut self, clip: ClipHandle, length: f64, preloaded: bool) {
        let state = if preloaded {
            LoadState::Loaded
        } else {
            LoadState::Unloaded
        };
        self.clips.insert(
            clip,
            MemoryClip {
                length,
                state,
                preloaded,
                remaining: 0,
            },
        );
    }

    /// Step pending loads and unloads by one frame.
    pub fn advance_frame(&mut self) {
        for clip in self.clips.values_mut() {
            if clip.remaining > 0 {
                clip.remaining -= 1;
            }
            if clip.remaining == 0 {
                clip.state = match clip.state {
                    LoadState::Loading => LoadState::Loaded,
                    LoadState::Unloading => LoadState::Unloaded,
                    settled => settled,
                };
            }
        }
    }

    /// Clips currently scheduled on `channel`, in scheduling order.
    pub fn scheduled(&self, channel: ChannelId) -> &[(TrackPart, ClipHandle, f64)] {
        &self.scheduled[channel.index()]
    }

    pub fn is_loaded(&self, clip: ClipHandle) -> bool {
        self.load_state(clip) == LoadState::Loaded
    }

    fn clip_mut(&mut self, clip: ClipHandle) -> Result<&mut MemoryClip> {
        self.clips
            .get_mut(&clip)
            .ok_or_else(|| anyhow!("{clip} is not registered"))
    }

    fn transition(&mut self, clip: ClipHandle, pending: LoadState, settled: LoadState) -> Result<()> {
        let latency = self.latency;
        let entry = self.clip_mut(clip)?;
        if latency == 0 {
            entry.state = settled;
        } else {
            entry.state = pending;
            entry.remaining = latency;
        }
        Ok(())
    }
}

impl ClipStorage for MemoryBackend {
    fn begin_load(&mut self, clip: ClipHandle) -> Result<()> {
        if self.failing.contains(&clip) {
            bail!("failed to decode {clip}");
        }
        self.loads.push(clip);
        self.transition(clip, LoadState::Loading, LoadState::Loaded)
    }

    fn begin_unload(&mut self, clip: ClipHandle) -> Result<()> {
        self.unloads.push(clip);
        self.transition(clip, LoadState::Unloading, LoadState::Unloaded)
    }

    fn load_state(&self, clip: ClipHandle) -> LoadState {
        self.clips.get(&clip).map_or(LoadState::Unloaded, |c| c.state)
    }

    fn length_seconds(&self, clip: ClipHandle) -> Result<f64> {
        self.clips
            .get(&clip)
            .map(|c| c.length)
            .ok_or_else(|| anyhow!("{clip} is not registered"))
    }

    fn is_preloaded(&self, clip: ClipHandle) -> bool {
        self.clips.get(&clip).is_some_and(|c| c.preloaded)
    }
}

impl Transport for MemoryBackend {
    fn play_scheduled(
        &mut self,
        channel: ChannelId,
        part: TrackPart,
        clip: ClipHandle,
        clock_time: f64,
    ) -> Result<()> {
        if !self.is_loaded(clip) {
            bail!("{clip} scheduled on {channel} before it finished loading");
        }
        self.scheduled[channel.index()].push((part, clip, clock_time));
        self.calls.push(TransportCall::PlayScheduled {
            channel,
            part,
            clip,
            clock_time,
        });
        Ok(())
    }

    fn stop(&mut self, channel: ChannelId) -> Result<()> {
        self.scheduled[channel.index()].clear();
        self.paused[channel.index()] = false;
        self.calls.push(TransportCall::Stop(channel));
        Ok(())
    }

    fn pause(&mut self, channel: ChannelId) -> Result<()> {
        self.paused[channel.index()] = true;
        self.calls.push(TransportCall::Pause(channel));
        Ok(())
    }

    fn resume(&mut self, channel: ChannelId) -> Result<()> {
        self.paused[channel.index()] = false;
        self.calls.push(TransportCall::Resume(channel));
        Ok(())
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) -> Result<()> {
        self.volumes[channel.index()] = volume;
        self.calls.push(TransportCall::SetVolume(channel, volume));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_delays_load() {
        let mut backend = MemoryBackend::new().with_latency(2);
        backend.register(ClipHandle(1), 3.0);
        backend.begin_load(ClipHandle(1)).unwrap();
        assert_eq!(backend.load_state(ClipHandle(1)), LoadState::Loading);
        backend.advance_frame();
        assert_eq!(backend.load_state(ClipHandle(1)), LoadState::Loading);
        backend.advance_frame();
        assert_eq!(backend.load_state(ClipHandle(1)), LoadState::Loaded);
    }

    #[test]
    fn unknown_clip_errors() {
        let mut backend = MemoryBackend::new();
        assert!(backend.begin_load(ClipHandle(9)).is_err());
        assert!(backend.length_seconds(ClipHandle(9)).is_err());
        assert_eq!(backend.load_state(ClipHandle(9)), LoadState::Unloaded);
    }

    #[test]
    fn scheduling_unloaded_clip_fails() {
        let mut backend = MemoryBackend::new();
        backend.register(ClipHandle(1), 1.0);
        let err = backend
            .play_scheduled(ChannelId::A, TrackPart::Loop, ClipHandle(1), 0.0)
            .unwrap_err();
        assert!(err.to_string().contains("before it finished loading"));
    }
}
