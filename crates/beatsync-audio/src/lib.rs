// Two-channel crossfade engine over abstract clip storage and transport

pub mod backend;
pub mod channel;
pub mod engine;
pub mod fade;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use backend::{AudioBackend, ClipStorage, LoadState, TrackPart, Transport};
pub use channel::{ChannelId, ChannelLoad, ChannelState};
pub use engine::{CrossfadeEngine, LoadStandby, ScheduleStart, ScheduledStart, UnloadChannel};
pub use fade::{FadeTask, fade_span};
#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryBackend, TransportCall};
