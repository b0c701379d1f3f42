use std::path::Path;

use anyhow::{Context, Result};
use beatsync_types::{BeatError, ClipHandle};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::bake::{self, DEFAULT_BAKE_INTERVAL};
use crate::bpm::{self, BpmBreakpoint};

/// Musical score driving the tick schedule.
///
/// Immutable once built. The serialized form is the BPM breakpoint list plus
/// the baked timing table; deserializing runs the same validation as
/// [`ScoreBuilder::build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ScoreBuilder")]
pub struct BeatScore {
    is_loop: bool,
    timing_table: Vec<f64>,
    intro_tick_sum: usize,
    measure_tick_count: u32,
    beat_count: u32,
    bpm_breakpoints: Vec<BpmBreakpoint>,
    bake_interval: f64,
    intro_clip: Option<ClipHandle>,
    loop_clip: Option<ClipHandle>,
    intro_length: f64,
    loop_length: f64,
    volume: f32,
    offset: f64,
}

impl BeatScore {
    pub fn builder() -> ScoreBuilder {
        ScoreBuilder::default()
    }

    /// Copy of this score's inputs, for editing and rebaking.
    pub fn to_builder(&self) -> ScoreBuilder {
        ScoreBuilder {
            is_loop: self.is_loop,
            timing_table: self.timing_table.clone(),
            intro_tick_sum: self.intro_tick_sum,
            measure_tick_count: self.measure_tick_count,
            beat_count: self.beat_count,
            bpm_breakpoints: self.bpm_breakpoints.clone(),
            bake_interval: self.bake_interval,
            intro_clip: self.intro_clip,
            loop_clip: self.loop_clip,
            intro_length: self.intro_length,
            loop_length: self.loop_length,
            volume: self.volume,
            offset: self.offset,
        }
    }

    /// Rebuild the timing table from the current BPM curve and clip lengths.
    pub fn rebake(&self) -> Result<Self, BeatError> {
        self.to_builder().bake()
    }

    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    pub fn timing_table(&self) -> &[f64] {
        &self.timing_table
    }

    pub fn measure_tick_count(&self) -> u32 {
        self.measure_tick_count
    }

    pub fn beat_count(&self) -> u32 {
        self.beat_count
    }

    /// Ticks per beat.
    pub fn beat_tick(&self) -> u32 {
        self.measure_tick_count / self.beat_count
    }

    pub fn intro_tick_sum(&self) -> usize {
        self.intro_tick_sum
    }

    pub fn loop_tick_sum(&self) -> usize {
        self.total_tick_sum() - self.intro_tick_sum
    }

    pub fn total_tick_sum(&self) -> usize {
        self.timing_table.len()
    }

    pub fn bpm_breakpoints(&self) -> &[BpmBreakpoint] {
        &self.bpm_breakpoints
    }

    pub fn intro_clip(&self) -> Option<ClipHandle> {
        self.intro_clip
    }

    pub fn loop_clip(&self) -> Option<ClipHandle> {
        self.loop_clip
    }

    pub fn intro_length(&self) -> f64 {
        self.intro_length
    }

    pub fn loop_length(&self) -> f64 {
        self.loop_length
    }

    pub fn total_length(&self) -> f64 {
        self.intro_length + self.loop_length
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Seconds from the start at which `tick` occurs, or infinity when the
    /// tick is outside the table.
    pub fn beat_timing(&self, tick: i64) -> f64 {
        usize::try_from(tick)
            .ok()
            .and_then(|index| self.timing_table.get(index))
            .copied()
            .unwrap_or(f64::INFINITY)
    }

    pub fn bpm_at(&self, time: f64) -> f64 {
        bpm::bpm_at(&self.bpm_breakpoints, time)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse score JSON")
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize score")
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read score: {}", path.display()))?;
        Self::from_json_str(&data).with_context(|| format!("Invalid score: {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)
            .with_context(|| format!("Failed to write score: {}", path.display()))
    }
}

/// Editable inputs of a [`BeatScore`]; also its on-disk representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ScoreBuilder {
    pub is_loop: bool,
    pub timing_table: Vec<f64>,
    pub intro_tick_sum: usize,
    pub measure_tick_count: u32,
    pub beat_count: u32,
    pub bpm_breakpoints: Vec<BpmBreakpoint>,
    pub bake_interval: f64,
    pub intro_clip: Option<ClipHandle>,
    pub loop_clip: Option<ClipHandle>,
    pub intro_length: f64,
    pub loop_length: f64,
    pub volume: f32,
    pub offset: f64,
}

impl Default for ScoreBuilder {
    fn default() -> Self {
        Self {
            is_loop: false,
            timing_table: Vec::new(),
            intro_tick_sum: 0,
            measure_tick_count: 8,
            beat_count: 4,
            bpm_breakpoints: Vec::new(),
            bake_interval: DEFAULT_BAKE_INTERVAL,
            intro_clip: None,
            loop_clip: None,
            intro_length: 0.0,
            loop_length: 0.0,
            volume: 1.0,
            offset: 0.0,
        }
    }
}

impl ScoreBuilder {
    pub fn looping(mut self, is_loop: bool) -> Self {
        self.is_loop = is_loop;
        self
    }

    pub fn subdivision(mut self, measure_tick_count: u32, beat_count: u32) -> Self {
        self.measure_tick_count = measure_tick_count;
        self.beat_count = beat_count;
        self
    }

    pub fn bpm(mut self, time: f64, bpm: f64) -> Self {
        self.bpm_breakpoints.push(BpmBreakpoint::new(time, bpm));
        self
    }

    pub fn intro(mut self, clip: Option<ClipHandle>, length: f64) -> Self {
        self.intro_clip = clip;
        self.intro_length = length;
        self
    }

    pub fn main_loop(mut self, clip: Option<ClipHandle>, length: f64) -> Self {
        self.loop_clip = clip;
        self.loop_length = length;
        self
    }

    pub fn bake_interval(mut self, interval: f64) -> Self {
        self.bake_interval = interval;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Replace the timing table with a hand-authored one.
    pub fn timing_table(mut self, table: Vec<f64>, intro_tick_sum: usize) -> Self {
        self.timing_table = table;
        self.intro_tick_sum = intro_tick_sum;
        self
    }

    /// Validate and freeze the score using the timing table as given.
    pub fn build(mut self) -> Result<BeatScore, BeatError> {
        self.validate()?;
        let whole = self.timing_table.len() - self.timing_table.len() % self.mtc();
        if whole != self.timing_table.len() {
            warn!(
                "Timing table has {} ticks, trimming partial measure to {}",
                self.timing_table.len(),
                whole
            );
            self.timing_table.truncate(whole);
        }
        if self.intro_tick_sum > self.timing_table.len() {
            return Err(BeatError::InvalidScore(format!(
                "introTickSum {} exceeds {} ticks",
                self.intro_tick_sum,
                self.timing_table.len()
            )));
        }
        Ok(self.freeze())
    }

    /// Validate, regenerate the timing table from the BPM curve, and freeze.
    pub fn bake(mut self) -> Result<BeatScore, BeatError> {
        self.validate()?;
        if self.loop_length <= 0.0 {
            return Err(BeatError::InvalidScore(
                "baking requires a loop clip with a positive length".to_string(),
            ));
        }
        let baked = bake::bake_timing(
            &self.bpm_breakpoints,
            self.measure_tick_count,
            self.beat_count,
            self.intro_length,
            self.intro_length + self.loop_length,
            self.bake_interval,
        );
        self.bake_interval = baked.interval;
        self.timing_table = baked.table;
        self.intro_tick_sum = baked.intro_tick_sum;
        Ok(self.freeze())
    }

    fn mtc(&self) -> usize {
        self.measure_tick_count as usize
    }

    fn validate(&mut self) -> Result<(), BeatError> {
        if self.measure_tick_count == 0 || self.beat_count == 0 {
            return Err(BeatError::InvalidScore(
                "measureTickCount and beatCount must be positive".to_string(),
            ));
        }
        if self.measure_tick_count % self.beat_count != 0 {
            return Err(BeatError::InvalidScore(format!(
                "measureTickCount {} is not a multiple of beatCount {}",
                self.measure_tick_count, self.beat_count
            )));
        }
        if self.intro_length < 0.0 || self.loop_length < 0.0 {
            return Err(BeatError::InvalidScore(
                "clip lengths must not be negative".to_string(),
            ));
        }
        self.volume = self.volume.clamp(0.0, 1.0);
        self.bpm_breakpoints.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(())
    }

    fn freeze(self) -> BeatScore {
        BeatScore {
            is_loop: self.is_loop,
            timing_table: self.timing_table,
            intro_tick_sum: self.intro_tick_sum,
            measure_tick_count: self.measure_tick_count,
            beat_count: self.beat_count,
            bpm_breakpoints: self.bpm_breakpoints,
            bake_interval: self.bake_interval,
            intro_clip: self.intro_clip,
            loop_clip: self.loop_clip,
            intro_length: self.intro_length,
            loop_length: self.loop_length,
            volume: self.volume,
            offset: self.offset,
        }
    }
}

impl TryFrom<ScoreBuilder> for BeatScore {
    type Error = BeatError;

    fn try_from(builder: ScoreBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}
