use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use beatsync_audio::MemoryBackend;
use beatsync_play::{PlaybackConfig, PlaybackController, StartRequest, TransitionReport};
use beatsync_score::BeatScore;
use beatsync_timing::BeatEvent;
use beatsync_types::FrameTime;
use log::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Options {
    pub seconds: f64,
    pub fps: f64,
    /// `(clock time, duration)` of a single pause window.
    pub pause: Option<(f64, f64)>,
    pub config: Option<PathBuf>,
}

pub fn run(path: &Path, options: &Options) -> Result<()> {
    let score = Arc::new(BeatScore::read(path)?);
    let config = match &options.config {
        Some(path) => PlaybackConfig::read(path)?,
        None => PlaybackConfig::default(),
    };
    for line in simulate(score, config, options)? {
        println!("{line}");
    }
    Ok(())
}

/// Run the host loop and collect one line per event and finished transition.
fn simulate(
    score: Arc<BeatScore>,
    config: PlaybackConfig,
    options: &Options,
) -> Result<Vec<String>> {
    if !(options.fps.is_finite() && options.fps > 0.0) {
        bail!("fps must be positive, got {}", options.fps);
    }
    let frame = 1.0 / options.fps;

    let mut backend = MemoryBackend::new();
    if let Some(clip) = score.intro_clip() {
        backend.register(clip, score.intro_length());
    }
    if let Some(clip) = score.loop_clip() {
        backend.register(clip, score.loop_length());
    }

    let mut controller = PlaybackController::new(config).with_event_queue();
    let mut now = FrameTime::uniform(0.0);
    let mut lines = Vec::new();
    let mut pause = options.pause;

    controller.start(&mut backend, StartRequest::new(score), now);
    info!(
        "Simulating {:.2}s at {:.0} fps with {}",
        options.seconds,
        options.fps,
        config_label(options)
    );

    while now.dsp < options.seconds {
        now = now.advanced(frame);
        backend.advance_frame();

        if let Some((at, duration)) = pause
            && now.dsp >= at
        {
            pause = None;
            if let Some(warning) = controller.pause(&mut backend, now)? {
                warn!("{warning}");
            }
            lines.push(format!("{:9.4} paused", now.dsp));
            let mut last_whole = None;
            let countdown = move |remaining: f64| {
                let whole = remaining.ceil() as i64;
                if last_whole != Some(whole) {
                    last_whole = Some(whole);
                    debug!("Resuming in {whole}");
                }
            };
            if let Some(warning) = controller.resume_at(now.dsp + duration, countdown) {
                warn!("{warning}");
            }
        }

        let was_paused = controller.is_paused();
        let reports = controller.update(&mut backend, now)?;
        if was_paused && !controller.is_paused() {
            lines.push(format!("{:9.4} resumed", now.dsp));
        }
        for event in controller.drain_events() {
            lines.push(format!("{:9.4} {}", now.dsp, describe_event(&event)));
        }
        for report in reports {
            lines.push(format!("{:9.4} {}", now.dsp, describe_report(&report)));
        }
    }
    Ok(lines)
}

fn config_label(options: &Options) -> String {
    options
        .config
        .as_ref()
        .map_or_else(|| "default config".to_string(), |p| p.display().to_string())
}

fn describe_event(event: &BeatEvent) -> String {
    match event {
        BeatEvent::ScoreArmed { score, start_time } => format!(
            "armed start={start_time:.4} ticks={} intro={}",
            score.total_tick_sum(),
            score.intro_tick_sum()
        ),
        BeatEvent::BeatCrossed(info) => format!(
            "beat tick={} measure={} in-measure={}",
            info.tick,
            info.measure(),
            info.tick_in_measure()
        ),
        BeatEvent::Looped => "looped".to_string(),
        BeatEvent::EndOfScore => "end-of-score".to_string(),
    }
}

fn describe_report(report: &TransitionReport) -> String {
    let mut text = match &report.result {
        Ok(()) => format!("{:?} finished", report.kind),
        Err(err) => format!("{:?} failed: {err}", report.kind),
    };
    for warning in &report.warnings {
        text.push_str(&format!(" [{warning}]"));
    }
    text
}
