use bitflags::Flags;
use log::warn;

/// Opens a group of simultaneous actions occupying one slot.
pub const GROUP_OPEN: char = '[';
/// Closes a group opened by [`GROUP_OPEN`].
pub const GROUP_CLOSE: char = ']';
/// Written for slots with no action.
pub const FILLER: char = '0';

/// Character ↔ flag table for a bit-flag action type.
#[derive(Debug, Clone)]
pub struct ActionAlphabet<T> {
    entries: Vec<(T, char)>,
}

impl<T> ActionAlphabet<T>
where
    T: Flags<Bits = u32> + Copy,
{
    /// Build a table. Entries using a reserved character or an empty flag
    /// are dropped.
    pub fn new(entries: impl IntoIterator<Item = (T, char)>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|&(flag, c)| {
                let reserved = c == GROUP_OPEN || c == GROUP_CLOSE || c == FILLER;
                if reserved || c.is_whitespace() || flag.bits() == 0 {
                    warn!("Ignoring alphabet entry {c:?} with flags {:#x}", flag.bits());
                    return false;
                }
                true
            })
            .collect();
        Self { entries }
    }

    /// Flag bits for a character; unknown characters are empty slots.
    pub fn bits_for(&self, c: char) -> u32 {
        self.entries
            .iter()
            .find(|(_, ch)| *ch == c)
            .map_or(0, |(flag, _)| flag.bits())
    }

    /// Text for one slot: the filler, a single character, or a bracketed group.
    pub fn encode_slot(&self, bits: u32) -> String {
        let chars: Vec<char> = self
            .entries
            .iter()
            .filter(|(flag, _)| bits & flag.bits() == flag.bits())
            .map(|&(_, c)| c)
            .collect();
        match chars.as_slice() {
            [] => FILLER.to_string(),
            [c] => c.to_string(),
            _ => {
                let mut text = String::with_capacity(chars.len() + 2);
                text.push(GROUP_OPEN);
                text.extend(chars);
                text.push(GROUP_CLOSE);
                text
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    bitflags::bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        struct Hit: u32 {
            const KICK = 1;
            const SNARE = 1 << 1;
            const HAT = 1 << 2;
        }
    }

    fn alphabet() -> ActionAlphabet<Hit> {
        ActionAlphabet::new([(Hit::KICK, 'K'), (Hit::SNARE, 'S'), (Hit::HAT, 'H')])
    }

    #[test]
    fn bits_for_known_and_unknown() {
        let a = alphabet();
        assert_eq!(a.bits_for('S'), 2);
        assert_eq!(a.bits_for('.'), 0);
    }

    #[test]
    fn encode_slot_forms() {
        let a = alphabet();
        assert_eq!(a.encode_slot(0), "0");
        assert_eq!(a.encode_slot(Hit::HAT.bits()), "H");
        assert_eq!(a.encode_slot((Hit::KICK | Hit::HAT).bits()), "[KH]");
    }

    #[test]
    fn reserved_entries_are_dropped() {
        let a = ActionAlphabet::new([(Hit::KICK, '['), (Hit::SNARE, '0'), (Hit::HAT, 'H')]);
        assert_eq!(a.len(), 1);
        assert_eq!(a.bits_for('['), 0);
    }
}
