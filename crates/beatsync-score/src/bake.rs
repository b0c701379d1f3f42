use log::debug;

use crate::bpm::{BpmBreakpoint, bpm_at};

/// Integration step used when a score does not specify one (seconds).
pub const DEFAULT_BAKE_INTERVAL: f64 = 0.000_001;
/// Smallest accepted integration step (seconds).
pub const MIN_BAKE_INTERVAL: f64 = 0.000_001;

/// Ticks this close to the intro boundary count as loop ticks.
const BOUNDARY_EPSILON: f64 = 1e-9;

pub(crate) struct BakedTiming {
    pub table: Vec<f64>,
    pub intro_tick_sum: usize,
    pub interval: f64,
}

/// Walk the BPM curve in fixed steps and record a tick each time the
/// accumulated tick count crosses an integer.
///
/// The crossing time is interpolated inside the step. A trailing partial
/// measure is dropped.
pub(crate) fn bake_timing(
    breakpoints: &[BpmBreakpoint],
    measure_tick_count: u32,
    beat_count: u32,
    intro_length: f64,
    total_length: f64,
    interval: f64,
) -> BakedTiming {
    let interval = interval.max(MIN_BAKE_INTERVAL);
    let ticks_per_beat = f64::from(measure_tick_count) / f64::from(beat_count);

    let mut table = vec![0.0];
    let mut ticks = 0.0_f64;
    let mut step: u64 = 0;
    loop {
        let time = step as f64 * interval;
        if time >= total_length {
            break;
        }
        let delta = bpm_at(breakpoints, time) / 60.0 * ticks_per_beat * interval;
        let next = ticks + delta;
        if ticks.floor() < next.floor() && delta > 0.0 {
            let crossing = time + (next.floor() - ticks) / delta * interval;
            if crossing < total_length - BOUNDARY_EPSILON {
                table.push(crossing);
            }
        }
        ticks = next;
        step += 1;
    }

    let measure = measure_tick_count as usize;
    table.truncate(table.len() - table.len() % measure);
    let intro_tick_sum = table
        .iter()
        .take_while(|&&t| t < intro_length - BOUNDARY_EPSILON)
        .count();

    debug!(
        "Baked {} ticks ({} intro) over {:.3}s at step {:e}",
        table.len(),
        intro_tick_sum,
        total_length,
        interval
    );

    BakedTiming {
        table,
        intro_tick_sum,
        interval,
    }
}
