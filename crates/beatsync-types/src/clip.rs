use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of an audio clip owned by the clip storage collaborator.
///
/// Two channels referencing the same clip compare equal by handle; that
/// identity is what keeps a shared clip alive across a crossfade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipHandle(pub u32);

impl fmt::Display for ClipHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_id() {
        assert_eq!(ClipHandle(7).to_string(), "clip#7");
    }

    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&ClipHandle(42)).unwrap();
        assert_eq!(json, "42");
        let back: ClipHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClipHandle(42));
    }
}
