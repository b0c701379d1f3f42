use std::collections::BTreeSet;
use std::fmt;

use beatsync_types::ClipHandle;

use crate::backend::LoadState;
use crate::fade::ActiveFade;

/// One of the two crossfade channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    A,
    B,
}

impl ChannelId {
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "channel A"),
            Self::B => write!(f, "channel B"),
        }
    }
}

/// Clips to place on the standby channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLoad {
    pub intro_clip: Option<ClipHandle>,
    pub loop_clip: Option<ClipHandle>,
    /// Loaded with the channel and released with it.
    pub aux_clips: Vec<ClipHandle>,
    /// Multiplier applied to every volume sent to the transport.
    pub trim: f32,
}

impl ChannelLoad {
    pub fn new(intro_clip: Option<ClipHandle>, loop_clip: Option<ClipHandle>) -> Self {
        Self {
            intro_clip,
            loop_clip,
            aux_clips: Vec::new(),
            trim: 1.0,
        }
    }

    pub fn with_aux(mut self, clips: impl IntoIterator<Item = ClipHandle>) -> Self {
        self.aux_clips.extend(clips);
        self
    }

    pub fn with_trim(mut self, trim: f32) -> Self {
        self.trim = trim.clamp(0.0, 1.0);
        self
    }

    /// Every referenced clip, deduplicated.
    pub fn clips(&self) -> BTreeSet<ClipHandle> {
        self.intro_clip
            .into_iter()
            .chain(self.loop_clip)
            .chain(self.aux_clips.iter().copied())
            .collect()
    }
}

/// Per-channel playback state, owned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    pub intro_clip: Option<ClipHandle>,
    pub loop_clip: Option<ClipHandle>,
    pub aux_clips: BTreeSet<ClipHandle>,
    /// Fade volume before trim, 0.0..=1.0.
    pub volume: f32,
    pub trim: f32,
    pub is_playing: bool,
    pub load_state: LoadState,
    pub(crate) fade: Option<ActiveFade>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            intro_clip: None,
            loop_clip: None,
            aux_clips: BTreeSet::new(),
            volume: 0.0,
            trim: 1.0,
            is_playing: false,
            load_state: LoadState::Unloaded,
            fade: None,
        }
    }
}

impl ChannelState {
    /// Every clip the channel holds: intro, loop and auxiliary.
    pub fn clips(&self) -> BTreeSet<ClipHandle> {
        self.intro_clip
            .into_iter()
            .chain(self.loop_clip)
            .chain(self.aux_clips.iter().copied())
            .collect()
    }

    pub fn holds(&self, clip: ClipHandle) -> bool {
        self.intro_clip == Some(clip) || self.loop_clip == Some(clip) || self.aux_clips.contains(&clip)
    }

    /// Target of the running fade, if any.
    pub fn fade_target(&self) -> Option<f32> {
        self.fade.map(|f| f.target)
    }

    /// Volume actually sent to the transport.
    pub fn output_volume(&self) -> f32 {
        self.volume * self.trim
    }

    pub(crate) fn clear_clips(&mut self) {
        self.intro_clip = None;
        self.loop_clip = None;
        self.aux_clips.clear();
        self.load_state = LoadState::Unloaded;
        self.trim = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_channel() {
        assert_eq!(ChannelId::A.other(), ChannelId::B);
        assert_eq!(ChannelId::B.other().index(), 0);
    }

    #[test]
    fn load_request_dedupes_clips() {
        let load = ChannelLoad::new(Some(ClipHandle(1)), Some(ClipHandle(2)))
            .with_aux([ClipHandle(2), ClipHandle(3)]);
        let clips: Vec<_> = load.clips().into_iter().collect();
        assert_eq!(clips, vec![ClipHandle(1), ClipHandle(2), ClipHandle(3)]);
        assert_eq!(load.with_trim(1.5).trim, 1.0);
    }

    #[test]
    fn fresh_channel_is_silent() {
        let state = ChannelState::default();
        assert_eq!(state.volume, 0.0);
        assert_eq!(state.load_state, LoadState::Unloaded);
        assert!(state.clips().is_empty());
    }
}
