use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, trace};

use crate::timer::{TimerId, TimerManager, TimerProc};
use crate::{lock, Callback, CallbackScheduler, DEFAULT_MAX_TIMER_FREQUENCY};

struct TimerState {
    callback: Option<Callback>,
    requested: u32,
    remaining_ticks: u32,
    max_frequency: u32,
}

impl TimerState {
    fn on_timer(&mut self) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };

        let mut calls = 1;
        if self.requested > self.max_frequency {
            // Faster than the host timer allows: catch up with several calls
            // per tick and carry the remainder to the next one.
            let total = u64::from(self.requested) + u64::from(self.remaining_ticks);
            let max = u64::from(self.max_frequency);
            calls = total / max;
            self.remaining_ticks = (total % max) as u32;
        }

        trace!("timer tick -> {calls} callback(s)");
        for _ in 0..calls {
            callback();
        }
    }
}

/// Callback scheduler that rides on a periodic host timer.
///
/// Requests above `max_frequency` install the host timer at the maximum and
/// run the callback several times per tick, carrying the integer remainder so
/// the long-run rate matches the request exactly.
pub struct TimerScheduler<M: TimerManager> {
    timers: M,
    max_frequency: u32,
    state: Arc<Mutex<TimerState>>,
    installed: Option<TimerId>,
}

impl<M: TimerManager> TimerScheduler<M> {
    pub fn new(timers: M) -> Self {
        Self::with_max_frequency(timers, DEFAULT_MAX_TIMER_FREQUENCY)
    }

    pub fn with_max_frequency(timers: M, max_frequency: u32) -> Self {
        assert!(
            (1..=1_000_000).contains(&max_frequency),
            "host timer frequency must be between 1 Hz and 1 MHz"
        );
        TimerScheduler {
            timers,
            max_frequency,
            state: Arc::new(Mutex::new(TimerState {
                callback: None,
                requested: 0,
                remaining_ticks: 0,
                max_frequency,
            })),
            installed: None,
        }
    }

    pub fn timers(&self) -> &M {
        &self.timers
    }

    pub fn max_frequency(&self) -> u32 {
        self.max_frequency
    }

    /// Rate the host timer is actually installed at.
    pub fn host_frequency(&self) -> Option<u32> {
        self.frequency().map(|hz| hz.min(self.max_frequency))
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        self.installed
    }
}

fn host_interval(frequency: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(frequency))
}

impl<M: TimerManager> CallbackScheduler for TimerScheduler<M> {
    fn start(&mut self, callback: Callback, frequency: u32) {
        assert!(frequency > 0, "callback frequency must be non-zero");
        self.stop();

        {
            let mut state = lock(&self.state);
            state.callback = Some(callback);
            state.requested = frequency;
            state.remaining_ticks = 0;
        }

        let host = frequency.min(self.max_frequency);
        let state = Arc::clone(&self.state);
        let proc_: TimerProc = Arc::new(move || lock(&state).on_timer());
        self.installed = Some(self.timers.install(host_interval(host), proc_));
        debug!("timer callbacks started at {frequency} Hz (host timer {host} Hz)");
    }

    fn stop(&mut self) {
        // The host timer goes first so no tick can observe a half-released
        // callback.
        if let Some(id) = self.installed.take() {
            self.timers.remove(id);
        }

        let released = {
            let mut state = lock(&self.state);
            state.requested = 0;
            state.remaining_ticks = 0;
            state.callback.take()
        };
        if released.is_some() {
            debug!("timer callbacks stopped");
        }
        drop(released);
    }

    fn set_frequency(&mut self, frequency: u32) {
        assert!(frequency > 0, "callback frequency must be non-zero");
        let callback = lock(&self.state).callback.take();
        match callback {
            Some(callback) => self.start(callback, frequency),
            None => debug!("ignoring frequency change to {frequency} Hz while idle"),
        }
    }

    fn is_active(&self) -> bool {
        self.installed.is_some()
    }

    fn frequency(&self) -> Option<u32> {
        let requested = lock(&self.state).requested;
        (requested > 0).then_some(requested)
    }
}

impl<M: TimerManager> Drop for TimerScheduler<M> {
    fn drop(&mut self) {
        self.stop();
    }
}
