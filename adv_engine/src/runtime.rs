use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use adv_dispatch::RoomScript;
use adv_timing::{ManualTimerManager, ThreadTimerManager, TimerManager};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;

use crate::cli::{ClockMode, RunArgs};
use crate::demo::{demo_registry, demo_scripts};
use crate::music::{render_sequence, MusicSummary};
use crate::room::{RoomEngine, RoomEvent};

const COMPACT_EVENT_LIMIT: usize = 8;

#[derive(Serialize)]
struct SessionReport<'a> {
    room: &'a str,
    tick_hz: u32,
    host_timer_hz: Option<u32>,
    ticks_delivered: u64,
    flags: &'a BTreeSet<String>,
    counters: &'a BTreeMap<String, i64>,
    events: &'a [RoomEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    music: Option<&'a MusicSummary>,
}

pub fn execute(args: RunArgs) -> Result<()> {
    let scripts = load_scripts(&args)?;
    let music = args
        .music
        .as_ref()
        .map(|music| render_sequence(music.sample_rate, music.callback_hz, music.frames));

    match args.clock {
        ClockMode::Stepped => {
            let timers = ManualTimerManager::new();
            let driver = timers.clone();
            run_session(timers, scripts, &args, music.as_ref(), |engine| {
                drive_stepped(engine, &driver, args.ticks)
            })
        }
        ClockMode::Realtime => {
            run_session(ThreadTimerManager::new(), scripts, &args, music.as_ref(), |engine| {
                drive_realtime(engine, args.ticks, args.tick_hz)
            })
        }
    }
}

fn load_scripts(args: &RunArgs) -> Result<Vec<RoomScript>> {
    if args.rooms.is_empty() {
        return demo_scripts();
    }
    args.rooms
        .iter()
        .map(|path| {
            RoomScript::from_path(path)
                .with_context(|| format!("loading room script {}", path.display()))
        })
        .collect()
}

fn run_session<M, F>(
    timers: M,
    scripts: Vec<RoomScript>,
    args: &RunArgs,
    music: Option<&MusicSummary>,
    drive: F,
) -> Result<()>
where
    M: TimerManager,
    F: FnOnce(&mut RoomEngine<M>) -> Result<Option<u32>>,
{
    let start_room = scripts
        .first()
        .map(|script| script.room.clone())
        .context("no room scripts to load")?;

    let mut engine = RoomEngine::new(timers, args.max_timer_hz, demo_registry());
    engine.set_strict(args.strict_rooms);
    for script in scripts {
        engine.add_script(script);
    }
    engine
        .enter_room(&start_room)
        .with_context(|| format!("entering starting room `{start_room}`"))?;
    info!(
        "rooms loaded: {}; starting in `{start_room}` with {} actions",
        engine.room_names().collect::<Vec<_>>().join(", "),
        engine.table().len()
    );

    for trigger in &args.inputs {
        if !engine.input(*trigger)? {
            eprintln!(
                "[adv_engine] warning: no action in `{}` matches {trigger}",
                engine.state().room
            );
        }
    }

    let host_timer_hz = if args.ticks > 0 {
        engine.start_clock(args.tick_hz);
        let host = drive(&mut engine)?;
        engine.stop_clock();
        engine.pump_up_to(remaining_ticks(&engine, args.ticks))?;
        let surplus = engine.discard_pending();
        if surplus > 0 {
            debug!("{surplus} ticks past --ticks were not dispatched");
        }
        host
    } else {
        None
    };
    info!(
        "session finished in `{}` after {} ticks",
        engine.state().room,
        engine.ticks_delivered()
    );

    let state = engine.state();
    let report = SessionReport {
        room: &state.room,
        tick_hz: args.tick_hz,
        host_timer_hz,
        ticks_delivered: engine.ticks_delivered(),
        flags: &state.flags,
        counters: &state.counters,
        events: &state.events,
        music,
    };
    if let Some(path) = args.event_log_json.as_ref() {
        persist_report(path, &report)?;
    }
    print_report(&report, args.verbose);
    Ok(())
}

fn remaining_ticks<M: TimerManager>(engine: &RoomEngine<M>, ticks: u32) -> usize {
    u64::from(ticks).saturating_sub(engine.ticks_delivered()) as usize
}

/// Fire the manual host timer until exactly `ticks` logical ticks have been
/// dispatched. A host tick may post several; the surplus stays queued.
fn drive_stepped(
    engine: &mut RoomEngine<ManualTimerManager>,
    timers: &ManualTimerManager,
    ticks: u32,
) -> Result<Option<u32>> {
    let host = engine.clock().host_frequency();
    while remaining_ticks(engine, ticks) > 0 {
        if timers.fire_all() == 0 {
            break;
        }
        engine.pump_up_to(remaining_ticks(engine, ticks))?;
    }
    Ok(host)
}

/// Let the OS timer thread run for roughly `ticks` worth of wall time,
/// draining the tick channel between sleeps.
fn drive_realtime(
    engine: &mut RoomEngine<ThreadTimerManager>,
    ticks: u32,
    tick_hz: u32,
) -> Result<Option<u32>> {
    let host = engine.clock().host_frequency();
    let poll = Duration::from_micros(1_000_000 / u64::from(host.unwrap_or(tick_hz).max(1)));
    let expected = Duration::from_secs_f64(f64::from(ticks) / f64::from(tick_hz));
    let deadline = Instant::now() + expected * 2 + Duration::from_secs(1);

    while remaining_ticks(engine, ticks) > 0 && Instant::now() < deadline {
        thread::sleep(poll);
        engine.pump_up_to(remaining_ticks(engine, ticks))?;
    }
    if remaining_ticks(engine, ticks) > 0 {
        eprintln!(
            "[adv_engine] warning: realtime clock delivered {} of {ticks} ticks before the deadline",
            engine.ticks_delivered()
        );
    }
    Ok(host)
}

fn persist_report(path: &Path, report: &SessionReport<'_>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(report).context("serializing session report to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("writing session report to {}", path.display()))?;
    println!("Saved session report to {}", path.display());
    Ok(())
}

fn print_report(report: &SessionReport<'_>, verbose: bool) {
    println!("Current room: {}", report.room);
    match report.host_timer_hz {
        Some(host) => println!(
            "World clock: {} ticks delivered at {} Hz (host timer {host} Hz)",
            report.ticks_delivered, report.tick_hz
        ),
        None => println!("World clock: idle"),
    }

    let limit = if verbose {
        report.events.len()
    } else {
        report.events.len().min(COMPACT_EVENT_LIMIT)
    };
    if !report.events.is_empty() {
        println!("\nEvents:");
        for event in report.events.iter().take(limit) {
            println!(
                "  {:>3}. [{}] {} -> {}",
                event.sequence, event.room, event.trigger, event.outcome
            );
        }
        if report.events.len() > limit {
            println!("  ... +{} more events", report.events.len() - limit);
        }
    }

    if !report.flags.is_empty() {
        let flags: Vec<&str> = report.flags.iter().map(String::as_str).collect();
        println!("\nFlags: {}", flags.join(", "));
    }
    if !report.counters.is_empty() {
        println!("\nCounters:");
        for (name, value) in report.counters {
            println!("  {name}: {value}");
        }
    }

    if let Some(music) = report.music {
        println!(
            "\nMusic: {} frames at {} Hz, {} sequencer callbacks at {} Hz, {} notes, peak {}",
            music.frames,
            music.sample_rate,
            music.callbacks,
            music.callback_hz,
            music.notes,
            music.peak
        );
    }
}
