//! Logical callback scheduling for adventure-engine hosts.
//!
//! Game drivers (music sequencers, palette cyclers, script clocks) want a
//! callback at some logical rate. Hosts only offer coarse periodic timers or
//! the steady consumption of audio samples, so this crate converts either
//! tick source into callbacks at the requested frequency without drift.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod fixed;
pub mod mixer;
pub mod sample;
pub mod timer;
pub mod timer_scheduler;

pub use fixed::{samples_per_tick, FIXP_ONE, FIXP_SHIFT};
pub use mixer::{AudioSource, ChannelHandle, SharedSource, SoftMixer};
pub use sample::{PitchControl, SampleGenerator, SampleScheduler, Silence, SquareWave};
pub use timer::{ManualTimerManager, ThreadTimerManager, TimerId, TimerManager, TimerProc};
pub use timer_scheduler::TimerScheduler;

/// Host timers cannot reliably tick faster than this.
pub const DEFAULT_MAX_TIMER_FREQUENCY: u32 = 100;

/// Rate most chip drivers ask for when they have no tempo of their own.
pub const DEFAULT_CALLBACK_FREQUENCY: u32 = 250;

/// Zero-argument logical callback owned by a scheduler.
pub type Callback = Box<dyn FnMut() + Send>;

/// Common surface of the timer-driven and sample-driven strategies.
pub trait CallbackScheduler {
    /// Register `callback` at `frequency` Hz, replacing any previous one.
    ///
    /// The previous callback is dropped before the new registration can tick.
    /// Panics when `frequency` is zero.
    fn start(&mut self, callback: Callback, frequency: u32);

    /// Release the registration. Calling this while idle does nothing.
    fn stop(&mut self);

    /// Restart the stored callback at a new rate. Idle schedulers ignore it.
    fn set_frequency(&mut self, frequency: u32);

    fn is_active(&self) -> bool;

    /// Requested logical frequency of the active registration.
    fn frequency(&self) -> Option<u32>;
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
