use anyhow::Result;
use beatsync_types::ClipHandle;

use crate::channel::ChannelId;

/// Residency of a clip in storage, or of a channel's clip set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    /// Release requested but not yet finished. Only reported by storage.
    Unloading,
}

/// Which section of a track a scheduled clip plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackPart {
    Intro,
    Loop,
}

/// Loads and releases clip data.
///
/// `begin_load`/`begin_unload` only start the work; completion is observed
/// by polling `load_state`.
pub trait ClipStorage {
    fn begin_load(&mut self, clip: ClipHandle) -> Result<()>;
    fn begin_unload(&mut self, clip: ClipHandle) -> Result<()>;
    fn load_state(&self, clip: ClipHandle) -> LoadState;
    fn length_seconds(&self, clip: ClipHandle) -> Result<f64>;

    /// Resident clips are never loaded or unloaded by the engine.
    fn is_preloaded(&self, _clip: ClipHandle) -> bool {
        false
    }
}

/// Plays clips on one of the two engine channels.
/// Implementations: a realtime mixer, `MemoryBackend` (testing).
pub trait Transport {
    /// Start `clip` at `clock_time` on the scheduling clock, sample-accurately.
    fn play_scheduled(
        &mut self,
        channel: ChannelId,
        part: TrackPart,
        clip: ClipHandle,
        clock_time: f64,
    ) -> Result<()>;
    fn stop(&mut self, channel: ChannelId) -> Result<()>;
    fn pause(&mut self, channel: ChannelId) -> Result<()>;
    fn resume(&mut self, channel: ChannelId) -> Result<()>;

    /// Set volume (0.0..=1.0).
    fn set_volume(&mut self, channel: ChannelId, volume: f32) -> Result<()>;
}

/// Everything the engine needs from the host audio stack.
pub trait AudioBackend: ClipStorage + Transport {}

impl<T: ClipStorage + Transport + ?Sized> AudioBackend for T {}
