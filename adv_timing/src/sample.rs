use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, trace};

use crate::fixed::{samples_per_tick, FIXP_ONE, FIXP_SHIFT};
use crate::{Callback, CallbackScheduler};

/// Sound chip (or any synthesizer) that renders interleaved PCM on demand.
pub trait SampleGenerator: Send {
    /// Fill `out` completely. Stereo generators receive whole L/R pairs.
    fn generate(&mut self, out: &mut [i16]);

    fn sample_rate(&self) -> u32;

    fn is_stereo(&self) -> bool {
        false
    }
}

/// Callback scheduler whose clock is the audio being produced.
///
/// Every `produce` call renders the requested frames in slices that end on
/// logical tick boundaries, firing the callback between slices. The distance
/// between ticks is kept in 16.16 fixed point so fractional frames carry
/// forward instead of accumulating rounding error.
pub struct SampleScheduler<G: SampleGenerator> {
    generator: G,
    callback: Option<Callback>,
    requested: u32,
    samples_per_tick: u64,
    next_tick: u64,
}

impl<G: SampleGenerator> SampleScheduler<G> {
    pub fn new(generator: G) -> Self {
        SampleScheduler {
            generator,
            callback: None,
            requested: 0,
            samples_per_tick: 0,
            next_tick: 0,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Frames between ticks in 16.16 fixed point, zero while idle.
    pub fn samples_per_tick(&self) -> u64 {
        self.samples_per_tick
    }

    /// Fixed-point countdown to the next tick.
    pub fn next_tick(&self) -> u64 {
        self.next_tick
    }

    pub fn channels(&self) -> usize {
        if self.generator.is_stereo() {
            2
        } else {
            1
        }
    }

    /// Render into `out`, interleaving logical ticks at their sample
    /// positions. Returns the number of samples written, which is `out.len()`
    /// rounded down to whole frames. An empty `out` renders nothing and
    /// leaves a tick pending at countdown zero for the next call.
    pub fn produce(&mut self, out: &mut [i16]) -> usize {
        let channels = self.channels();
        let frames = out.len() / channels;
        let produced = frames * channels;
        let out = &mut out[..produced];

        let Some(callback) = self.callback.as_mut() else {
            self.generator.generate(out);
            return produced;
        };

        let mut offset = 0;
        let mut remaining = frames;
        while remaining > 0 {
            let until_tick = (self.next_tick >> FIXP_SHIFT) as usize;
            let step = remaining.min(until_tick);
            let end = offset + step * channels;
            self.generator.generate(&mut out[offset..end]);
            self.next_tick -= (step as u64) << FIXP_SHIFT;

            if self.next_tick >> FIXP_SHIFT == 0 {
                trace!("logical tick at frame {}", offset / channels + step);
                callback();
                self.next_tick += self.samples_per_tick;
            }

            offset = end;
            remaining -= step;
        }
        produced
    }
}

impl<G: SampleGenerator> CallbackScheduler for SampleScheduler<G> {
    fn start(&mut self, callback: Callback, frequency: u32) {
        assert!(frequency > 0, "callback frequency must be non-zero");
        self.stop();
        // Requests above one tick per frame still make progress each pass.
        self.samples_per_tick = samples_per_tick(self.generator.sample_rate(), frequency).max(1);
        self.requested = frequency;
        self.next_tick = 0;
        self.callback = Some(callback);
        debug!(
            "sample callbacks started at {frequency} Hz ({:.3} frames per tick)",
            self.samples_per_tick as f64 / FIXP_ONE as f64
        );
    }

    fn stop(&mut self) {
        if self.callback.take().is_some() {
            debug!("sample callbacks stopped");
        }
        self.requested = 0;
        self.samples_per_tick = 0;
        self.next_tick = 0;
    }

    fn set_frequency(&mut self, frequency: u32) {
        assert!(frequency > 0, "callback frequency must be non-zero");
        if self.callback.is_none() {
            debug!("ignoring frequency change to {frequency} Hz while idle");
            return;
        }
        self.samples_per_tick = samples_per_tick(self.generator.sample_rate(), frequency).max(1);
        self.requested = frequency;
    }

    fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    fn frequency(&self) -> Option<u32> {
        self.callback.as_ref().map(|_| self.requested)
    }
}

impl<G: SampleGenerator> Drop for SampleScheduler<G> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generator that outputs nothing but zeroes.
#[derive(Debug, Clone, Default)]
pub struct Silence {
    sample_rate: u32,
    stereo: bool,
}

impl Silence {
    pub fn new(sample_rate: u32, stereo: bool) -> Self {
        Silence {
            sample_rate,
            stereo,
        }
    }
}

impl SampleGenerator for Silence {
    fn generate(&mut self, out: &mut [i16]) {
        out.fill(0);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_stereo(&self) -> bool {
        self.stereo
    }
}

/// Shared pitch register for [`SquareWave`]; zero mutes the voice.
#[derive(Debug, Clone, Default)]
pub struct PitchControl(Arc<AtomicU32>);

impl PitchControl {
    pub fn set(&self, hz: u32) {
        self.0.store(hz, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Single square-wave voice, enough to audibly follow a sequencer.
#[derive(Debug, Clone)]
pub struct SquareWave {
    sample_rate: u32,
    stereo: bool,
    amplitude: i16,
    pitch: PitchControl,
    phase: u64,
    high: bool,
}

impl SquareWave {
    pub fn new(sample_rate: u32, stereo: bool, amplitude: i16) -> Self {
        SquareWave {
            sample_rate,
            stereo,
            amplitude,
            pitch: PitchControl::default(),
            phase: 0,
            high: true,
        }
    }

    pub fn pitch(&self) -> PitchControl {
        self.pitch.clone()
    }
}

impl SampleGenerator for SquareWave {
    fn generate(&mut self, out: &mut [i16]) {
        let hz = self.pitch.get();
        if hz == 0 || self.sample_rate == 0 {
            out.fill(0);
            return;
        }

        let half_period = samples_per_tick(self.sample_rate, hz.saturating_mul(2)).max(FIXP_ONE);
        let channels = if self.stereo { 2 } else { 1 };
        for frame in out.chunks_mut(channels) {
            let value = if self.high {
                self.amplitude
            } else {
                -self.amplitude
            };
            frame.fill(value);
            self.phase += FIXP_ONE;
            if self.phase >= half_period {
                self.phase -= half_period;
                self.high = !self.high;
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_stereo(&self) -> bool {
        self.stereo
    }
}
