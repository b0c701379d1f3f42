use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use beatsync_chart::{ActionAlphabet, BeatChartConverter, ParsedChart};
use bitflags::Flags;

bitflags::bitflags! {
    /// Lane mask used by the command-line chart tools. Lanes are written
    /// `1`..`9`; `0` stays the empty-slot filler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lane: u32 {
        const L1 = 1;
        const L2 = 1 << 1;
        const L3 = 1 << 2;
        const L4 = 1 << 3;
        const L5 = 1 << 4;
        const L6 = 1 << 5;
        const L7 = 1 << 6;
        const L8 = 1 << 7;
        const L9 = 1 << 8;
    }
}

pub fn default_converter() -> BeatChartConverter<Lane> {
    let alphabet = Lane::FLAGS
        .iter()
        .zip('1'..='9')
        .map(|(flag, c)| (*flag.value(), c));
    BeatChartConverter::new(ActionAlphabet::new(alphabet))
}

pub fn run(path: &Path, grid: Option<u32>, encode: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chart: {}", path.display()))?;
    let converter = default_converter();
    let parsed = converter
        .parse(&text, grid)
        .with_context(|| format!("Failed to parse chart: {}", path.display()))?;
    if encode {
        print!("{}", converter.encode_chart(&parsed));
    } else {
        print!("{}", describe(&converter, &parsed));
    }
    Ok(())
}

/// Grid header, warnings, then one `tick measure slot flags` line per action.
fn describe(converter: &BeatChartConverter<Lane>, chart: &ParsedChart<Lane>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "grid {} ticks/measure, {} measures, {} actions",
        chart.grid_size,
        chart.measure_count,
        chart.actions.len()
    );
    for warning in &chart.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    for (tick, action) in chart.actions.iter() {
        let slot = action
            .tick_on_measure
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        let _ = writeln!(
            out,
            "{tick:>6} {:>4} {slot:>4} {}",
            action.measure,
            converter.alphabet().encode_slot(action.flags.bits())
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alphabet_maps_digits_to_lanes() {
        let c = default_converter();
        assert_eq!(c.alphabet().len(), 9);
        assert_eq!(c.alphabet().bits_for('1'), Lane::L1.bits());
        assert_eq!(c.alphabet().bits_for('9'), Lane::L9.bits());
        assert_eq!(c.alphabet().bits_for('0'), 0);
    }

    #[test]
    fn describe_lists_actions_in_tick_order() {
        let c = default_converter();
        let chart = c.parse("1020\n[34]\n", None).unwrap();
        let text = describe(&c, &chart);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "grid 4 ticks/measure, 2 measures, 3 actions");
        assert_eq!(
            lines[1..]
                .iter()
                .map(|l| l.split_whitespace().collect::<Vec<_>>())
                .collect::<Vec<_>>(),
            vec![
                vec!["0", "0", "0", "1"],
                vec!["2", "0", "2", "2"],
                vec!["4", "1", "0", "[34]"],
            ]
        );
    }

    #[test]
    fn describe_reports_warnings() {
        let c = default_converter();
        let chart = c.parse("1[23\n1", None).unwrap();
        let text = describe(&c, &chart);
        assert!(text.contains("warning: unterminated group in measure 0"));
    }

    #[test]
    fn run_reads_chart_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.chart");
        std::fs::write(&path, "1111\n").unwrap();
        run(&path, Some(8), true).unwrap();
        assert!(run(&dir.path().join("missing.chart"), None, false).is_err());
    }
}
