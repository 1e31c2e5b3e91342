use adv_dispatch::{HandlerRegistry, RoomScript, Trigger};
use anyhow::{Context, Result};

use crate::room::RoomState;

const BRIDGE: &str = r#"{
  "room": "bridge",
  "actions": [
    { "on": ["finished_entering_room", "*", "*", "*"], "handler": "arrive" },
    { "on": ["use", 5, 7, "*"], "handler": "open_panel" },
    { "on": ["use", "*", "*", "*"], "handler": "nothing_happens" },
    { "on": ["look", "*", "*", "*"], "handler": "describe" },
    { "on": ["talk", "*", "*", "*"], "handler": "greet_crew" },
    { "on": ["touched_warp", 1, "*", "*"], "handler": "warp_corridor" },
    { "on": ["tick", 10, "*", "*"], "handler": "ambient_hum" },
    { "on": ["tick", "*", "*", "*"], "handler": "count_tick" }
  ]
}"#;

const CORRIDOR: &str = r#"{
  "room": "corridor",
  "actions": [
    { "on": ["finished_entering_room", "*", "*", "*"], "handler": "arrive" },
    { "on": ["get", "*", "*", "*"], "handler": "pick_up" },
    { "on": ["look", "*", "*", "*"], "handler": "describe" },
    { "on": ["touched_warp", 0, "*", "*"], "handler": "warp_bridge" },
    { "on": ["tick", "*", "*", "*"], "handler": "count_tick" }
  ]
}"#;

/// Built-in rooms used when no `--room` scripts are given. The bridge is
/// listed first and becomes the starting room.
pub fn demo_scripts() -> Result<Vec<RoomScript>> {
    [BRIDGE, CORRIDOR]
        .into_iter()
        .map(|raw| RoomScript::from_json_str(raw).context("parsing built-in room script"))
        .collect()
}

/// Native handlers available to every room script.
pub fn demo_registry() -> HandlerRegistry<RoomState> {
    let mut registry = HandlerRegistry::new();

    registry.register("arrive", |state: &mut RoomState, event: &Trigger| {
        let room = state.room.clone();
        let outcome = match state.bump(&format!("visits_{room}"), 1) {
            1 => format!("arrived in {room}"),
            visits => format!("back in {room} (visit {visits})"),
        };
        state.record(event, outcome);
    });
    registry.register("open_panel", |state: &mut RoomState, event: &Trigger| {
        if state.set_flag("panel_open") {
            state.record(event, "the access panel slides open");
        } else {
            state.record(event, "the panel is already open");
        }
    });
    registry.register("nothing_happens", |state: &mut RoomState, event: &Trigger| {
        state.record(event, "nothing happens");
    });
    registry.register("describe", |state: &mut RoomState, event: &Trigger| {
        let outcome = if event.primary == 5 && state.has_flag("panel_open") {
            "the open panel shows a tangle of wiring".to_string()
        } else {
            format!("looking at object {}", event.primary)
        };
        state.record(event, outcome);
    });
    registry.register("greet_crew", |state: &mut RoomState, event: &Trigger| {
        let count = state.bump("conversations", 1);
        state.record(
            event,
            format!("crew member {} answers (conversation {count})", event.primary),
        );
    });
    registry.register("pick_up", |state: &mut RoomState, event: &Trigger| {
        if state.set_flag(format!("holding_{}", event.primary)) {
            state.record(event, format!("picked up object {}", event.primary));
        } else {
            state.record(event, "already carrying that");
        }
    });
    registry.register("warp_corridor", |state: &mut RoomState, event: &Trigger| {
        state.record(event, "stepping into the corridor");
        state.request_room("corridor");
    });
    registry.register("warp_bridge", |state: &mut RoomState, event: &Trigger| {
        state.record(event, "returning to the bridge");
        state.request_room("bridge");
    });
    registry.register("ambient_hum", |state: &mut RoomState, event: &Trigger| {
        state.record(event, "the engines hum");
    });
    registry.register("count_tick", |state: &mut RoomState, _event: &Trigger| {
        state.bump("room_ticks", 1);
    });

    registry
}
