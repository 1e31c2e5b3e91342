use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{self, Receiver, Sender};

use adv_dispatch::{ActionDispatchTable, ActionKind, HandlerRegistry, RoomScript, Trigger};
use adv_timing::{CallbackScheduler, TimerManager, TimerScheduler};
use anyhow::{bail, Context, Result};
use log::{debug, trace, warn};
use serde::Serialize;

/// Room hops allowed while settling a single event.
const MAX_ROOM_HOPS: usize = 16;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoomEvent {
    pub sequence: u32,
    pub room: String,
    pub trigger: String,
    pub outcome: String,
}

/// Mutable world state handed to room handlers.
#[derive(Debug, Default, Serialize)]
pub struct RoomState {
    pub room: String,
    pub flags: BTreeSet<String>,
    pub counters: BTreeMap<String, i64>,
    pub events: Vec<RoomEvent>,
    #[serde(skip)]
    pending_room: Option<String>,
}

impl RoomState {
    pub fn record(&mut self, trigger: &Trigger, outcome: impl Into<String>) {
        let event = RoomEvent {
            sequence: self.events.len() as u32 + 1,
            room: self.room.clone(),
            trigger: trigger.to_string(),
            outcome: outcome.into(),
        };
        debug!("[{}] {} -> {}", event.room, event.trigger, event.outcome);
        self.events.push(event);
    }

    /// Returns false when the flag was already set.
    pub fn set_flag(&mut self, name: impl Into<String>) -> bool {
        self.flags.insert(name.into())
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    pub fn bump(&mut self, name: &str, by: i64) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter += by;
        *counter
    }

    /// Ask the engine to switch rooms once the current handler returns.
    pub fn request_room(&mut self, name: impl Into<String>) {
        self.pending_room = Some(name.into());
    }

    fn take_room_request(&mut self) -> Option<String> {
        self.pending_room.take()
    }
}

/// Host-side composition of a room's dispatch table and its world clock.
///
/// The clock callback only posts tick triggers onto a channel; `pump`
/// drains them on the caller's thread, so handlers never run on the timer
/// thread.
pub struct RoomEngine<M: TimerManager> {
    registry: HandlerRegistry<RoomState>,
    scripts: BTreeMap<String, RoomScript>,
    table: ActionDispatchTable<RoomState>,
    state: RoomState,
    strict: bool,
    clock: TimerScheduler<M>,
    tick_tx: Sender<Trigger>,
    tick_rx: Receiver<Trigger>,
    ticks_delivered: u64,
}

impl<M: TimerManager> RoomEngine<M> {
    pub fn new(timers: M, max_timer_hz: u32, registry: HandlerRegistry<RoomState>) -> Self {
        let (tick_tx, tick_rx) = mpsc::channel();
        RoomEngine {
            registry,
            scripts: BTreeMap::new(),
            table: ActionDispatchTable::new(),
            state: RoomState::default(),
            strict: false,
            clock: TimerScheduler::with_max_frequency(timers, max_timer_hz),
            tick_tx,
            tick_rx,
            ticks_delivered: 0,
        }
    }

    /// Reject room scripts containing rows that can never fire.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn add_script(&mut self, script: RoomScript) {
        if self.scripts.contains_key(&script.room) {
            warn!("room `{}` defined twice; keeping the later script", script.room);
        }
        self.scripts.insert(script.room.clone(), script);
    }

    pub fn room_names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }

    /// Swap in the named room's table, then deliver its entering event.
    pub fn enter_room(&mut self, name: &str) -> Result<()> {
        self.load_room(name)?;
        self.settle_room_changes()
    }

    fn load_room(&mut self, name: &str) -> Result<()> {
        let script = self
            .scripts
            .get(name)
            .with_context(|| format!("room `{name}` is not loaded"))?;
        let rows = script
            .bind(&self.registry)
            .with_context(|| format!("binding room `{name}`"))?;

        if self.strict {
            self.table
                .build_checked(rows)
                .with_context(|| format!("room `{name}` has unreachable actions"))?;
        } else {
            self.table.build(rows);
            self.table.shadowed_rows();
        }

        self.state.room = name.to_string();
        debug!("entered room `{name}` ({} actions)", self.table.len());

        let entering = Trigger::new(ActionKind::FinishedEnteringRoom, 0, 0, 0);
        if self.table.has_handler(&entering) {
            self.dispatch(entering);
        }
        Ok(())
    }

    fn settle_room_changes(&mut self) -> Result<()> {
        for _ in 0..MAX_ROOM_HOPS {
            match self.state.take_room_request() {
                Some(next) => self.load_room(&next)?,
                None => return Ok(()),
            }
        }
        bail!("room changes did not settle after {MAX_ROOM_HOPS} hops")
    }

    fn dispatch(&mut self, trigger: Trigger) -> bool {
        match self.table.matched_row(&trigger) {
            Some((index, row)) => {
                trace!(
                    "{trigger} matched row {index} ({})",
                    row.label().unwrap_or("unlabeled")
                );
                row.handler().invoke(&mut self.state, &trigger);
                true
            }
            None => {
                // Unhandled world ticks are routine; anything else is worth a
                // line in the log.
                if trigger.kind != ActionKind::Tick {
                    self.state.record(&trigger, "unhandled");
                }
                false
            }
        }
    }

    /// Dispatch one player event. Returns whether a handler ran.
    pub fn input(&mut self, trigger: Trigger) -> Result<bool> {
        let handled = self.dispatch(trigger);
        self.settle_room_changes()?;
        Ok(handled)
    }

    pub fn start_clock(&mut self, frequency: u32) {
        let tx = self.tick_tx.clone();
        let mut frame: u32 = 0;
        self.clock.start(
            Box::new(move || {
                frame = frame.saturating_add(1);
                // The receiver lives as long as the engine, which outlives
                // the registration.
                let _ = tx.send(Trigger::tick(frame));
            }),
            frequency,
        );
    }

    pub fn stop_clock(&mut self) {
        self.clock.stop();
    }

    pub fn clock(&self) -> &TimerScheduler<M> {
        &self.clock
    }

    /// Dispatch every tick posted by the clock since the last call.
    pub fn pump(&mut self) -> Result<usize> {
        self.pump_up_to(usize::MAX)
    }

    /// Dispatch at most `limit` queued ticks; the rest stay queued.
    pub fn pump_up_to(&mut self, limit: usize) -> Result<usize> {
        let mut delivered = 0;
        while delivered < limit {
            let Ok(trigger) = self.tick_rx.try_recv() else {
                break;
            };
            self.ticks_delivered += 1;
            delivered += 1;
            self.dispatch(trigger);
            self.settle_room_changes()?;
        }
        Ok(delivered)
    }

    /// Drop ticks that were posted but never dispatched.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.tick_rx.try_iter().count();
        if dropped > 0 {
            debug!("discarded {dropped} undelivered ticks");
        }
        dropped
    }

    pub fn ticks_delivered(&self) -> u64 {
        self.ticks_delivered
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn table(&self) -> &ActionDispatchTable<RoomState> {
        &self.table
    }
}

impl<M: TimerManager> Drop for RoomEngine<M> {
    fn drop(&mut self) {
        self.clock.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{demo_registry, demo_scripts};
    use adv_timing::ManualTimerManager;

    fn demo_engine() -> (RoomEngine<ManualTimerManager>, ManualTimerManager) {
        let timers = ManualTimerManager::new();
        let mut engine = RoomEngine::new(timers.clone(), 100, demo_registry());
        for script in demo_scripts().unwrap() {
            engine.add_script(script);
        }
        engine.enter_room("bridge").unwrap();
        (engine, timers)
    }

    fn outcomes(engine: &RoomEngine<ManualTimerManager>) -> Vec<&str> {
        engine
            .state()
            .events
            .iter()
            .map(|event| event.outcome.as_str())
            .collect()
    }

    #[test]
    fn specific_use_beats_fallback() {
        let (mut engine, _) = demo_engine();
        assert!(engine.input("use:5:7:3".parse().unwrap()).unwrap());
        assert!(engine.input("use:1:1:1".parse().unwrap()).unwrap());
        assert!(engine.state().has_flag("panel_open"));
        assert_eq!(
            outcomes(&engine),
            vec!["arrived in bridge", "the access panel slides open", "nothing happens"]
        );
    }

    #[test]
    fn unhandled_input_is_recorded_not_fatal() {
        let (mut engine, _) = demo_engine();
        assert!(!engine.input("options:0:0:0".parse().unwrap()).unwrap());
        assert_eq!(outcomes(&engine).last(), Some(&"unhandled"));
    }

    #[test]
    fn clock_ticks_are_dispatched_on_pump() {
        let (mut engine, timers) = demo_engine();
        engine.start_clock(100);
        for _ in 0..10 {
            timers.fire_all();
        }
        assert_eq!(engine.ticks_delivered(), 0);
        assert_eq!(engine.pump().unwrap(), 10);
        engine.stop_clock();

        assert_eq!(engine.ticks_delivered(), 10);
        // Tick 10 is claimed by the ambience row ahead of the counter row.
        assert_eq!(engine.state().counters["room_ticks"], 9);
        assert_eq!(outcomes(&engine).last(), Some(&"the engines hum"));
        assert_eq!(timers.installed(), 0);
    }

    #[test]
    fn fast_clock_delivers_exact_tick_count() {
        let (mut engine, timers) = demo_engine();
        engine.start_clock(250);
        assert_eq!(engine.clock().host_frequency(), Some(100));
        for _ in 0..100 {
            timers.fire_all();
        }
        engine.pump().unwrap();
        assert_eq!(engine.ticks_delivered(), 250);
    }

    #[test]
    fn bounded_pump_leaves_surplus_ticks_queued() {
        let (mut engine, timers) = demo_engine();
        engine.start_clock(250);
        timers.fire_all();
        timers.fire_all();
        engine.stop_clock();

        // 2 + 3 ticks were posted by the two host ticks.
        assert_eq!(engine.pump_up_to(4).unwrap(), 4);
        assert_eq!(engine.ticks_delivered(), 4);
        assert_eq!(engine.discard_pending(), 1);
        assert_eq!(engine.pump().unwrap(), 0);
        assert_eq!(engine.state().counters["room_ticks"], 4);
    }

    #[test]
    fn warp_rebuilds_table_for_next_room() {
        let (mut engine, _) = demo_engine();
        engine.input("touched_warp:1:0:0".parse().unwrap()).unwrap();
        assert_eq!(engine.state().room, "corridor");

        // Bridge-only rows are gone after the rebuild.
        assert!(!engine.input("talk:2:0:0".parse().unwrap()).unwrap());
        assert!(engine.input("get:4:0:0".parse().unwrap()).unwrap());
        assert!(engine.state().has_flag("holding_4"));
        assert!(outcomes(&engine).contains(&"arrived in corridor"));
    }

    #[test]
    fn entering_unknown_room_fails() {
        let (mut engine, _) = demo_engine();
        let err = engine.enter_room("engineering").unwrap_err();
        assert!(err.to_string().contains("engineering"));
        assert_eq!(engine.state().room, "bridge");
    }

    #[test]
    fn strict_mode_rejects_shadowed_rows() {
        let timers = ManualTimerManager::new();
        let mut engine = RoomEngine::new(timers, 100, demo_registry());
        engine.set_strict(true);
        engine.add_script(
            RoomScript::from_json_str(
                r#"{ "room": "bad", "actions": [
                    { "on": "use:*:*:*", "handler": "nothing_happens" },
                    { "on": "use:5:7:*", "handler": "open_panel" }
                ] }"#,
            )
            .unwrap(),
        );
        let err = engine.enter_room("bad").unwrap_err();
        assert!(format!("{err:#}").contains("can never match"));
        assert!(engine.table().is_empty());
    }

    #[test]
    fn dropping_engine_stops_clock() {
        let (mut engine, timers) = demo_engine();
        engine.start_clock(60);
        assert_eq!(timers.installed(), 1);
        drop(engine);
        assert_eq!(timers.installed(), 0);
    }
}
