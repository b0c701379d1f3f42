// Shared primitives: clip handles, clock readings, cancellation, errors, event bus

pub mod cancel;
pub mod clip;
pub mod clock;
pub mod error;
pub mod event_bus;

pub use cancel::CancelToken;
pub use clip::ClipHandle;
pub use clock::FrameTime;
pub use error::{BeatError, BeatWarning};
pub use event_bus::{EventBus, Subscription};
