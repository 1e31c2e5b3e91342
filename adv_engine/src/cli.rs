use std::path::PathBuf;

use adv_dispatch::Trigger;
use anyhow::{bail, ensure, Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Host prototype that drives room dispatch tables from timer and sample clocks",
    version
)]
pub struct Args {
    /// Room script JSON to load instead of the built-in rooms (repeatable; the first is the starting room)
    #[arg(long = "room", value_name = "PATH")]
    pub rooms: Vec<PathBuf>,

    /// Player event to dispatch, as kind:primary:secondary:modifier (repeatable)
    #[arg(long = "input", value_name = "TRIGGER")]
    pub inputs: Vec<String>,

    /// Number of world-clock ticks to deliver after the inputs
    #[arg(long, default_value_t = 0)]
    pub ticks: u32,

    /// Logical world-clock frequency in Hz
    #[arg(long, default_value_t = 18)]
    pub tick_hz: u32,

    /// Fastest rate the host timer will be installed at
    #[arg(long, default_value_t = adv_timing::DEFAULT_MAX_TIMER_FREQUENCY)]
    pub max_timer_hz: u32,

    /// Drive the world clock from an OS timer thread instead of stepping it (requires --ticks)
    #[arg(long)]
    pub realtime: bool,

    /// Render this many frames of the sequenced music demo
    #[arg(long, default_value_t = 0)]
    pub render_frames: u32,

    /// Output rate for the music demo
    #[arg(long, default_value_t = 22_050)]
    pub sample_rate: u32,

    /// Sequencer callback frequency for the music demo
    #[arg(long, default_value_t = adv_timing::DEFAULT_CALLBACK_FREQUENCY)]
    pub music_hz: u32,

    /// Refuse room scripts containing rows that can never match
    #[arg(long)]
    pub strict_rooms: bool,

    /// Path to write the session report as JSON
    #[arg(long)]
    pub event_log_json: Option<PathBuf>,

    /// Print every recorded event instead of the compact view
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    Stepped,
    Realtime,
}

#[derive(Debug)]
pub struct MusicArgs {
    pub frames: u32,
    pub sample_rate: u32,
    pub callback_hz: u32,
}

#[derive(Debug)]
pub struct RunArgs {
    pub rooms: Vec<PathBuf>,
    pub inputs: Vec<Trigger>,
    pub ticks: u32,
    pub tick_hz: u32,
    pub max_timer_hz: u32,
    pub clock: ClockMode,
    pub music: Option<MusicArgs>,
    pub strict_rooms: bool,
    pub event_log_json: Option<PathBuf>,
    pub verbose: bool,
}

pub fn parse() -> Result<RunArgs> {
    Args::parse().into_run_args()
}

impl Args {
    fn into_run_args(self) -> Result<RunArgs> {
        ensure!(self.tick_hz > 0, "--tick-hz must be at least 1");
        ensure!(
            (1..=1_000_000).contains(&self.max_timer_hz),
            "--max-timer-hz must be between 1 and 1000000"
        );
        if self.realtime && self.ticks == 0 {
            bail!("--realtime requires --ticks");
        }

        let music = if self.render_frames > 0 {
            ensure!(self.sample_rate > 0, "--sample-rate must be at least 1");
            ensure!(self.music_hz > 0, "--music-hz must be at least 1");
            Some(MusicArgs {
                frames: self.render_frames,
                sample_rate: self.sample_rate,
                callback_hz: self.music_hz,
            })
        } else {
            None
        };

        let inputs = self
            .inputs
            .iter()
            .map(|raw| {
                raw.parse::<Trigger>()
                    .with_context(|| format!("parsing --input `{raw}`"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RunArgs {
            rooms: self.rooms,
            inputs,
            ticks: self.ticks,
            tick_hz: self.tick_hz,
            max_timer_hz: self.max_timer_hz,
            clock: if self.realtime {
                ClockMode::Realtime
            } else {
                ClockMode::Stepped
            },
            music,
            strict_rooms: self.strict_rooms,
            event_log_json: self.event_log_json,
            verbose: self.verbose,
        })
    }
}
