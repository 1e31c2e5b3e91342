use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::lock;

/// Procedure a host timer calls on every tick.
pub type TimerProc = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// Periodic timer facility offered by the host platform.
pub trait TimerManager {
    /// Install `proc_` to run every `interval` until removed.
    fn install(&self, interval: Duration, proc_: TimerProc) -> TimerId;

    /// Remove a timer. Once this returns the procedure will not be called
    /// again, and any tick already running on another thread has finished.
    fn remove(&self, id: TimerId);
}

impl<T: TimerManager + ?Sized> TimerManager for Arc<T> {
    fn install(&self, interval: Duration, proc_: TimerProc) -> TimerId {
        (**self).install(interval, proc_)
    }

    fn remove(&self, id: TimerId) {
        (**self).remove(id)
    }
}

struct ManualTimer {
    interval: Duration,
    elapsed: Duration,
    proc_: TimerProc,
}

#[derive(Default)]
struct ManualTimers {
    next_id: u64,
    timers: BTreeMap<TimerId, ManualTimer>,
}

/// Timer manager driven explicitly by the caller.
///
/// Clones share the same timer set, so a test or a headless host keeps one
/// handle while the scheduler owns another.
#[derive(Clone, Default)]
pub struct ManualTimerManager {
    inner: Arc<Mutex<ManualTimers>>,
}

impl ManualTimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installed(&self) -> usize {
        lock(&self.inner).timers.len()
    }

    pub fn intervals(&self) -> Vec<Duration> {
        lock(&self.inner)
            .timers
            .values()
            .map(|timer| timer.interval)
            .collect()
    }

    /// Deliver exactly one tick to every installed timer. Returns the number
    /// of procedures called.
    pub fn fire_all(&self) -> usize {
        let procs: Vec<TimerProc> = lock(&self.inner)
            .timers
            .values()
            .map(|timer| Arc::clone(&timer.proc_))
            .collect();
        for proc_ in &procs {
            proc_();
        }
        procs.len()
    }

    /// Let `elapsed` of host time pass. Each timer fires once per full
    /// interval; partial intervals carry over to the next call.
    pub fn advance(&self, elapsed: Duration) -> usize {
        let due: Vec<(TimerId, u128, TimerProc)> = {
            let mut inner = lock(&self.inner);
            inner
                .timers
                .iter_mut()
                .filter_map(|(id, timer)| {
                    timer.elapsed += elapsed;
                    let interval = timer.interval.as_nanos().max(1);
                    let fires = timer.elapsed.as_nanos() / interval;
                    if fires == 0 {
                        return None;
                    }
                    let consumed = fires * interval;
                    timer.elapsed = Duration::from_nanos(
                        (timer.elapsed.as_nanos() - consumed) as u64,
                    );
                    Some((*id, fires, Arc::clone(&timer.proc_)))
                })
                .collect()
        };

        let mut delivered = 0;
        for (id, fires, proc_) in due {
            for _ in 0..fires {
                if !lock(&self.inner).timers.contains_key(&id) {
                    break;
                }
                proc_();
                delivered += 1;
            }
        }
        delivered
    }
}

impl TimerManager for ManualTimerManager {
    fn install(&self, interval: Duration, proc_: TimerProc) -> TimerId {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = TimerId(inner.next_id);
        inner.timers.insert(
            id,
            ManualTimer {
                interval,
                elapsed: Duration::ZERO,
                proc_,
            },
        );
        id
    }

    fn remove(&self, id: TimerId) {
        lock(&self.inner).timers.remove(&id);
    }
}

struct ThreadTimer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.thread().unpark();
        // A timer removed from inside its own tick cannot wait for itself.
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }
}

#[derive(Default)]
struct ThreadTimers {
    next_id: u64,
    timers: BTreeMap<TimerId, ThreadTimer>,
}

impl Drop for ThreadTimers {
    fn drop(&mut self) {
        for (_, timer) in std::mem::take(&mut self.timers) {
            timer.shutdown();
        }
    }
}

/// Real-time timer manager backed by one OS thread per installed timer.
#[derive(Clone, Default)]
pub struct ThreadTimerManager {
    inner: Arc<Mutex<ThreadTimers>>,
}

impl ThreadTimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installed(&self) -> usize {
        lock(&self.inner).timers.len()
    }
}

fn run_timer_thread(interval: Duration, stop: Arc<AtomicBool>, proc_: TimerProc) {
    let mut deadline = Instant::now() + interval;
    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < deadline {
            thread::park_timeout(deadline - now);
            continue;
        }
        proc_();
        deadline += interval;
    }
}

impl TimerManager for ThreadTimerManager {
    fn install(&self, interval: Duration, proc_: TimerProc) -> TimerId {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = TimerId(inner.next_id);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let interval = interval.max(Duration::from_micros(1));

        let handle = thread::Builder::new()
            .name(format!("adv-timer-{}", id.0))
            .spawn(move || run_timer_thread(interval, thread_stop, proc_));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!("failed to spawn timer thread {}: {err}", id.0);
                None
            }
        };
        debug!("installed timer {} every {:?}", id.0, interval);
        inner.timers.insert(id, ThreadTimer { stop, handle });
        id
    }

    fn remove(&self, id: TimerId) {
        let timer = lock(&self.inner).timers.remove(&id);
        if let Some(timer) = timer {
            timer.shutdown();
            debug!("removed timer {}", id.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_proc(counter: &Arc<AtomicU32>) -> TimerProc {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn manual_fire_all_hits_every_timer_once() {
        let timers = ManualTimerManager::new();
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));
        timers.install(Duration::from_millis(10), counting_proc(&a));
        timers.install(Duration::from_millis(20), counting_proc(&b));

        assert_eq!(timers.fire_all(), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn manual_advance_carries_partial_intervals() {
        let timers = ManualTimerManager::new();
        let count = Arc::new(AtomicU32::new(0));
        timers.install(Duration::from_millis(10), counting_proc(&count));

        timers.advance(Duration::from_millis(15));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        timers.advance(Duration::from_millis(5));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        timers.advance(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn removed_manual_timer_stops_firing() {
        let timers = ManualTimerManager::new();
        let count = Arc::new(AtomicU32::new(0));
        let id = timers.install(Duration::from_millis(10), counting_proc(&count));
        timers.fire_all();
        timers.remove(id);
        timers.remove(id);

        assert_eq!(timers.fire_all(), 0);
        assert_eq!(timers.installed(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn thread_timer_ticks_until_removed() {
        let timers = ThreadTimerManager::new();
        let count = Arc::new(AtomicU32::new(0));
        let id = timers.install(Duration::from_millis(2), counting_proc(&count));

        let start = Instant::now();
        while count.load(Ordering::SeqCst) < 3 && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
        timers.remove(id);
        let after_remove = count.load(Ordering::SeqCst);
        assert!(after_remove >= 3, "timer thread only ticked {after_remove} times");

        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_remove);
        assert_eq!(timers.installed(), 0);
    }
}
