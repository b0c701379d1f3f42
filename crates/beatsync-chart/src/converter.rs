use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use beatsync_types::{BeatError, BeatWarning};
use bitflags::Flags;
use log::{debug, warn};

use crate::action::BeatAction;
use crate::alphabet::{ActionAlphabet, GROUP_CLOSE, GROUP_OPEN};

/// Sparse tick → action table. Inserting twice on one tick is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickMap<T> {
    actions: BTreeMap<u32, BeatAction<T>>,
}

impl<T> Default for TickMap<T> {
    fn default() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }
}

impl<T: Copy> TickMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tick: u32, action: BeatAction<T>) -> Result<(), BeatError> {
        match self.actions.entry(tick) {
            Entry::Occupied(_) => Err(BeatError::ConflictingTick { tick }),
            Entry::Vacant(slot) => {
                slot.insert(action);
                Ok(())
            }
        }
    }

    pub fn get(&self, tick: u32) -> Option<&BeatAction<T>> {
        self.actions.get(&tick)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BeatAction<T>)> {
        self.actions.iter().map(|(&tick, action)| (tick, action))
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.actions.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Result of parsing chart text.
#[derive(Debug, Clone)]
pub struct ParsedChart<T> {
    /// Ticks per measure of the quantized grid.
    pub grid_size: u32,
    /// Number of non-empty source lines, each one measure.
    pub measure_count: usize,
    pub actions: TickMap<T>,
    /// Recoverable problems, scoped to the line they occurred on.
    pub warnings: Vec<BeatWarning>,
}

/// Converts between chart text and tick-indexed actions.
///
/// One non-empty line is one measure; each character is one slot, and a
/// bracketed run of characters is one slot holding all of their flags.
/// Measures are quantized onto the least common multiple of every
/// measure's slot count.
#[derive(Debug, Clone)]
pub struct BeatChartConverter<T> {
    alphabet: ActionAlphabet<T>,
}

impl<T> BeatChartConverter<T>
where
    T: Flags<Bits = u32> + Copy,
{
    pub fn new(alphabet: ActionAlphabet<T>) -> Self {
        Self { alphabet }
    }

    pub fn alphabet(&self) -> &ActionAlphabet<T> {
        &self.alphabet
    }

    /// Parse chart text. `base_subdivision` seeds the LCM so the grid is
    /// always a multiple of it.
    pub fn parse(
        &self,
        text: &str,
        base_subdivision: Option<u32>,
    ) -> Result<ParsedChart<T>, BeatError> {
        let mut warnings = Vec::new();
        let measures: Vec<Vec<u32>> = text
            .split(['\n', '\r'])
            .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(measure, line)| self.split_slots(measure, &line, &mut warnings))
            .collect();

        let mut grid_size = base_subdivision.unwrap_or(1).max(1);
        for (measure, slots) in measures.iter().enumerate() {
            if slots.is_empty() {
                continue;
            }
            grid_size = u32::try_from(slots.len())
                .ok()
                .and_then(|len| lcm(grid_size, len))
                .ok_or_else(|| BeatError::GridOverflow { measure })?;
        }

        let mut actions = TickMap::new();
        for (index, slots) in measures.iter().enumerate() {
            if slots.is_empty() {
                continue;
            }
            let overflow = || BeatError::GridOverflow { measure: index };
            let measure = u32::try_from(index).map_err(|_| overflow())?;
            let measure_start = measure.checked_mul(grid_size).ok_or_else(overflow)?;
            // the grid is a multiple of every slot count, so these stay below it
            let scale = grid_size / slots.len() as u32;
            for (slot, &bits) in slots.iter().enumerate() {
                if bits == 0 {
                    continue;
                }
                let tick_on_measure = slot as u32 * scale;
                let tick = measure_start.checked_add(tick_on_measure).ok_or_else(overflow)?;
                let action =
                    BeatAction::new(measure, Some(tick_on_measure), T::from_bits_retain(bits));
                actions.insert(tick, action)?;
            }
        }

        debug!(
            "Parsed {} measures onto a {}-tick grid ({} actions)",
            measures.len(),
            grid_size,
            actions.len()
        );

        Ok(ParsedChart {
            grid_size,
            measure_count: measures.len(),
            actions,
            warnings,
        })
    }

    /// Regenerate chart text with `grid_size` slots per line. The measure
    /// count is inferred from the last action.
    pub fn encode(&self, actions: &TickMap<T>, grid_size: u32) -> String {
        let measures = match (actions.last_tick(), grid_size) {
            (_, 0) | (None, _) => 0,
            (Some(last), grid) => (last / grid) as usize + 1,
        };
        self.encode_measures(actions, grid_size, measures)
    }

    /// Regenerate a parsed chart, keeping trailing empty measures.
    pub fn encode_chart(&self, chart: &ParsedChart<T>) -> String {
        let inferred = match chart.actions.last_tick() {
            Some(last) if chart.grid_size > 0 => (last / chart.grid_size) as usize + 1,
            _ => 0,
        };
        self.encode_measures(
            &chart.actions,
            chart.grid_size,
            chart.measure_count.max(inferred),
        )
    }

    fn encode_measures(&self, actions: &TickMap<T>, grid_size: u32, measures: usize) -> String {
        let mut text = String::new();
        for measure in 0..measures as u32 {
            for slot in 0..grid_size {
                let bits = measure
                    .checked_mul(grid_size)
                    .and_then(|start| start.checked_add(slot))
                    .and_then(|tick| actions.get(tick))
                    .map_or(0, |action| action.flags.bits());
                text.push_str(&self.alphabet.encode_slot(bits));
            }
            text.push('\n');
        }
        text
    }

    fn split_slots(
        &self,
        measure: usize,
        line: &str,
        warnings: &mut Vec<BeatWarning>,
    ) -> Vec<u32> {
        let mut slots = Vec::new();
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            if c != GROUP_OPEN {
                slots.push(self.alphabet.bits_for(c));
                continue;
            }
            let mut bits = 0;
            let mut closed = false;
            for inner in chars.by_ref() {
                if inner == GROUP_CLOSE {
                    closed = true;
                    break;
                }
                bits |= self.alphabet.bits_for(inner);
            }
            if !closed {
                let warning = BeatWarning::UnterminatedGroup { measure };
                warn!("{warning}");
                warnings.push(warning);
                break;
            }
            slots.push(bits);
        }
        slots
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Least common multiple; zero if either side is zero, `None` on overflow.
pub fn lcm(a: u32, b: u32) -> Option<u32> {
    if a == 0 || b == 0 {
        return Some(0);
    }
    (a / gcd(a, b)).checked_mul(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    bitflags::bitflags! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        struct Act: u32 {
            const A = 1;
            const B = 1 << 1;
            const C = 1 << 2;
        }
    }

    fn converter() -> BeatChartConverter<Act> {
        BeatChartConverter::new(ActionAlphabet::new([
            (Act::A, 'A'),
            (Act::B, 'B'),
            (Act::C, 'C'),
        ]))
    }

    fn ticks(chart: &ParsedChart<Act>) -> Vec<(u32, u32)> {
        chart
            .actions
            .iter()
            .map(|(tick, a)| (tick, a.flags.bits()))
            .collect()
    }

    #[test]
    fn lcm_basics() {
        assert_eq!(lcm(4, 6), Some(12));
        assert_eq!(lcm(1, 7), Some(7));
        assert_eq!(lcm(8, 4), Some(8));
        assert_eq!(lcm(0, 3), Some(0));
        assert_eq!(lcm(u32::MAX, 2), None);
    }

    #[test]
    fn coprime_line_lengths_overflow_grid() {
        let text: String = [23, 29, 31, 37, 41, 43, 47]
            .iter()
            .map(|&n| format!("{}\n", "A".repeat(n)))
            .collect();
        let err = converter().parse(&text, None).unwrap_err();
        // 23 * 29 * 31 * 37 * 41 * 43 still fits, the seventh line does not
        assert!(matches!(err, BeatError::GridOverflow { measure: 6 }));
    }

    #[test]
    fn late_measure_past_tick_range_is_rejected() {
        let c = converter();
        assert!(c.parse("A\nA", Some(1 << 31)).is_ok());
        let err = c.parse("A\nA\nA", Some(1 << 31)).unwrap_err();
        assert!(matches!(err, BeatError::GridOverflow { measure: 2 }));
    }

    #[test]
    fn mixed_resolutions_share_lcm_grid() {
        let chart = converter().parse("AB\nA.B.\n", None).unwrap();
        assert_eq!(chart.grid_size, 4);
        assert_eq!(chart.measure_count, 2);
        // measure 0 stretches each slot by two ticks
        assert_eq!(ticks(&chart), vec![(0, 1), (2, 2), (4, 1), (6, 2)]);
        let first_b = chart.actions.get(2).unwrap();
        assert_eq!(first_b.measure, 0);
        assert_eq!(first_b.tick_on_measure, Some(2));
    }

    #[test]
    fn base_subdivision_seeds_grid() {
        let chart = converter().parse("AB", Some(3)).unwrap();
        assert_eq!(chart.grid_size, 6);
        assert_eq!(ticks(&chart), vec![(0, 1), (3, 2)]);
    }

    #[test]
    fn groups_combine_flags() {
        let chart = converter().parse("[AC]0B0", None).unwrap();
        assert_eq!(chart.grid_size, 4);
        assert_eq!(ticks(&chart), vec![(0, 5), (2, 2)]);
    }

    #[test]
    fn whitespace_and_blank_lines_are_ignored() {
        let chart = converter().parse("\r\n A B \n\n\t\nB A\r\n", None).unwrap();
        assert_eq!(chart.measure_count, 2);
        assert_eq!(ticks(&chart), vec![(0, 1), (1, 2), (2, 2), (3, 1)]);
    }

    #[test]
    fn unterminated_group_truncates_line_only() {
        let chart = converter().parse("A0[BC\nABAB", None).unwrap();
        assert_eq!(
            chart.warnings,
            vec![BeatWarning::UnterminatedGroup { measure: 0 }]
        );
        // measure 0 keeps its two slots, measure 1 parses normally
        assert_eq!(chart.grid_size, 4);
        assert_eq!(ticks(&chart), vec![(0, 1), (4, 1), (5, 2), (6, 1), (7, 2)]);
    }

    #[test]
    fn line_with_no_slots_still_counts_as_measure() {
        let chart = converter().parse("[AB\nA", None).unwrap();
        assert_eq!(chart.measure_count, 2);
        assert_eq!(chart.grid_size, 1);
        assert_eq!(ticks(&chart), vec![(1, 1)]);
    }

    #[test]
    fn tick_map_rejects_collisions() {
        let mut map = TickMap::new();
        map.insert(4, BeatAction::new(1, Some(0), Act::A)).unwrap();
        let err = map.insert(4, BeatAction::new(1, Some(0), Act::B)).unwrap_err();
        assert!(matches!(err, BeatError::ConflictingTick { tick: 4 }));
        assert_eq!(map.get(4).unwrap().flags, Act::A);
    }

    #[test]
    fn encode_writes_every_grid_slot() {
        let c = converter();
        let chart = c.parse("AB\nA.[BC].", None).unwrap();
        assert_eq!(c.encode(&chart.actions, chart.grid_size), "A0B0\nA0[BC]0\n");
    }

    #[test]
    fn encode_chart_keeps_trailing_empty_measures() {
        let c = converter();
        let chart = c.parse("A\n0\n0", None).unwrap();
        assert_eq!(c.encode_chart(&chart), "A\n0\n0\n");
        assert_eq!(c.encode(&chart.actions, chart.grid_size), "A\n");
    }

    #[test]
    fn round_trip_with_explicit_grid() {
        let c = converter();
        let text = "A.B\n[AB]C\nC..A..";
        let first = c.parse(text, Some(6)).unwrap();
        let again = c.parse(&c.encode_chart(&first), Some(first.grid_size)).unwrap();
        assert_eq!(again.actions, first.actions);
        assert_eq!(again.grid_size, first.grid_size);
    }

    #[test]
    fn inferred_grid_can_shrink() {
        let c = converter();
        let first = c.parse("A0B0", Some(4)).unwrap();
        // reparsing without the grid hint rediscovers the same spacing here
        let again = c.parse(&c.encode_chart(&first), None).unwrap();
        assert_eq!(again.grid_size, 4);
        let sparse = c.parse("A000", Some(4)).unwrap();
        assert_eq!(sparse.grid_size, 4);
        assert_eq!(c.parse("A", None).unwrap().grid_size, 1);
    }
}
