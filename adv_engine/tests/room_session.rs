use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::tempdir;

fn run_engine(args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_adv_engine"))
        .args(args)
        .output()
        .context("executing adv_engine")
}

fn read_report(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading session report {}", path.display()))?;
    serde_json::from_str(&raw).context("parsing session report JSON")
}

fn outcomes(report: &Value) -> Vec<String> {
    report["events"]
        .as_array()
        .map(|events| {
            events
                .iter()
                .filter_map(|event| event["outcome"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn transcript(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

#[test]
fn player_inputs_follow_first_matching_row() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for session report")?;
    let report_path = temp_dir.path().join("session.json");
    let report_str = report_path
        .to_str()
        .context("report path is not valid UTF-8")?;

    let output = run_engine(&[
        "--input",
        "use:5:7:3",
        "--input",
        "look:5:0:0",
        "--input",
        "use:1:1:1",
        "--input",
        "options:0:0:0",
        "--event-log-json",
        report_str,
    ])?;
    assert!(
        output.status.success(),
        "adv_engine exited with {:?}: {}",
        output.status,
        transcript(&output)
    );

    let report = read_report(&report_path)?;
    assert_eq!(report["room"], "bridge");
    assert_eq!(report["ticks_delivered"], 0);
    assert_eq!(report["flags"], serde_json::json!(["panel_open"]));
    assert_eq!(
        outcomes(&report),
        vec![
            "arrived in bridge",
            "the access panel slides open",
            "the open panel shows a tangle of wiring",
            "nothing happens",
            "unhandled",
        ]
    );
    assert!(String::from_utf8_lossy(&output.stderr).contains("no action in `bridge` matches options:0:0:0"));
    Ok(())
}

#[test]
fn fast_world_clock_is_capped_without_losing_ticks() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for session report")?;
    let report_path = temp_dir.path().join("ticks.json");
    let report_str = report_path
        .to_str()
        .context("report path is not valid UTF-8")?;

    let output = run_engine(&[
        "--ticks",
        "250",
        "--tick-hz",
        "250",
        "--max-timer-hz",
        "100",
        "--event-log-json",
        report_str,
    ])?;
    assert!(output.status.success(), "{}", transcript(&output));

    let report = read_report(&report_path)?;
    assert_eq!(report["ticks_delivered"], 250);
    assert_eq!(report["host_timer_hz"], 100);
    // Frame 10 goes to the ambience row; every other tick hits the counter.
    assert_eq!(report["counters"]["room_ticks"], 249);
    assert!(outcomes(&report).contains(&"the engines hum".to_string()));
    assert!(String::from_utf8_lossy(&output.stdout).contains("250 ticks delivered at 250 Hz"));
    Ok(())
}

#[test]
fn tick_budget_is_exact_when_host_ticks_post_several() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for session report")?;
    let report_path = temp_dir.path().join("budget.json");
    let report_str = report_path
        .to_str()
        .context("report path is not valid UTF-8")?;

    let output = run_engine(&[
        "--ticks",
        "4",
        "--tick-hz",
        "250",
        "--max-timer-hz",
        "100",
        "--event-log-json",
        report_str,
    ])?;
    assert!(output.status.success(), "{}", transcript(&output));

    let report = read_report(&report_path)?;
    assert_eq!(report["ticks_delivered"], 4);
    assert_eq!(report["counters"]["room_ticks"], 4);
    Ok(())
}

#[test]
fn realtime_clock_delivers_requested_ticks() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for session report")?;
    let report_path = temp_dir.path().join("realtime.json");
    let report_str = report_path
        .to_str()
        .context("report path is not valid UTF-8")?;

    let output = run_engine(&[
        "--realtime",
        "--ticks",
        "20",
        "--tick-hz",
        "100",
        "--event-log-json",
        report_str,
    ])?;
    assert!(output.status.success(), "{}", transcript(&output));

    let report = read_report(&report_path)?;
    assert_eq!(report["ticks_delivered"], 20, "{}", transcript(&output));
    assert_eq!(report["host_timer_hz"], 100);
    // Frame 10 goes to the ambience row.
    assert_eq!(report["counters"]["room_ticks"], 19);
    Ok(())
}

#[test]
fn warps_rebuild_the_room_table() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for session report")?;
    let report_path = temp_dir.path().join("warp.json");
    let report_str = report_path
        .to_str()
        .context("report path is not valid UTF-8")?;

    let output = run_engine(&[
        "--input",
        "touched_warp:1:0:0",
        "--input",
        "get:4:0:0",
        "--input",
        "touched_warp:0:0:0",
        "--event-log-json",
        report_str,
    ])?;
    assert!(output.status.success(), "{}", transcript(&output));

    let report = read_report(&report_path)?;
    assert_eq!(report["room"], "bridge");
    assert_eq!(report["flags"], serde_json::json!(["holding_4"]));
    let outcomes = outcomes(&report);
    assert!(outcomes.contains(&"arrived in corridor".to_string()));
    assert!(outcomes.contains(&"picked up object 4".to_string()));
    assert_eq!(outcomes.last().map(String::as_str), Some("back in bridge (visit 2)"));
    Ok(())
}

#[test]
fn room_file_with_unknown_handler_is_rejected() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for room script")?;
    let room_path = temp_dir.path().join("brig.json");
    fs::write(
        &room_path,
        r#"{ "room": "brig", "actions": [ { "on": "look:*:*:*", "handler": "interrogate" } ] }"#,
    )?;
    let room_str = room_path.to_str().context("room path is not valid UTF-8")?;

    let output = run_engine(&["--room", room_str])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown handler `interrogate`"), "{stderr}");
    Ok(())
}

#[test]
fn strict_rooms_refuse_unreachable_rows() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for room script")?;
    let room_path = temp_dir.path().join("lab.json");
    fs::write(
        &room_path,
        r#"{
            "room": "lab",
            "actions": [
                { "on": ["use", "*", "*", "*"], "handler": "nothing_happens" },
                { "on": ["use", 5, 7, "*"], "handler": "open_panel" }
            ]
        }"#,
    )?;
    let room_str = room_path.to_str().context("room path is not valid UTF-8")?;

    let lenient = run_engine(&["--room", room_str, "--input", "use:5:7:0"])?;
    assert!(lenient.status.success(), "{}", transcript(&lenient));
    assert!(String::from_utf8_lossy(&lenient.stdout).contains("nothing happens"));

    let strict = run_engine(&["--room", room_str, "--strict-rooms"])?;
    assert!(!strict.status.success());
    assert!(String::from_utf8_lossy(&strict.stderr).contains("can never match"));
    Ok(())
}

#[test]
fn music_demo_reports_sequencer_callbacks() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for session report")?;
    let report_path = temp_dir.path().join("music.json");
    let report_str = report_path
        .to_str()
        .context("report path is not valid UTF-8")?;

    let output = run_engine(&[
        "--render-frames",
        "22050",
        "--sample-rate",
        "22050",
        "--music-hz",
        "250",
        "--event-log-json",
        report_str,
    ])?;
    assert!(output.status.success(), "{}", transcript(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Music: 22050 frames"));

    let report = read_report(&report_path)?;
    let callbacks = report["music"]["callbacks"]
        .as_u64()
        .context("music summary lacks a callback count")?;
    assert!((250..=253).contains(&callbacks), "callbacks: {callbacks}");
    assert_eq!(report["music"]["peak"], 4000);
    Ok(())
}

#[test]
fn malformed_input_is_reported() -> Result<()> {
    let output = run_engine(&["--input", "use:5:7"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("use:5:7"));
    Ok(())
}
