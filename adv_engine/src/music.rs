use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use adv_timing::{CallbackScheduler, SampleScheduler, SoftMixer, SquareWave};
use log::debug;
use serde::Serialize;

const MELODY: [u32; 8] = [262, 294, 330, 349, 392, 440, 494, 523];
const TICKS_PER_NOTE: u32 = 16;
const CHUNK_FRAMES: usize = 512;
const VOICE_AMPLITUDE: i16 = 4_000;

#[derive(Debug, Clone, Serialize)]
pub struct MusicSummary {
    pub sample_rate: u32,
    pub frames: u32,
    pub callback_hz: u32,
    pub callbacks: u32,
    pub notes: u32,
    pub peak: i16,
}

/// Render `frames` of a sequenced square-wave melody through the software
/// mixer. The sequencer runs from the sample-driven scheduler, so note
/// changes land on exact frame positions regardless of chunk size.
pub fn render_sequence(sample_rate: u32, callback_hz: u32, frames: u32) -> MusicSummary {
    let voice = SquareWave::new(sample_rate, false, VOICE_AMPLITUDE);
    let pitch = voice.pitch();
    let scheduler = Arc::new(Mutex::new(SampleScheduler::new(voice)));

    let callbacks = Arc::new(AtomicU32::new(0));
    let notes = Arc::new(AtomicU32::new(0));
    {
        let callbacks = Arc::clone(&callbacks);
        let notes = Arc::clone(&notes);
        let sequencer = move || {
            let tick = callbacks.fetch_add(1, Ordering::Relaxed);
            if tick % TICKS_PER_NOTE == 0 {
                let index = notes.fetch_add(1, Ordering::Relaxed) as usize;
                pitch.set(MELODY[index % MELODY.len()]);
            }
        };
        scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start(Box::new(sequencer), callback_hz);
    }

    let mut mixer = SoftMixer::new(sample_rate, false);
    let channel = mixer.play(scheduler.clone());

    let mut peak: i16 = 0;
    let mut buffer = vec![0i16; CHUNK_FRAMES];
    let mut remaining = frames as usize;
    while remaining > 0 {
        let chunk = remaining.min(CHUNK_FRAMES);
        mixer.mix(&mut buffer[..chunk]);
        peak = buffer[..chunk]
            .iter()
            .map(|sample| sample.saturating_abs())
            .fold(peak, i16::max);
        remaining -= chunk;
    }

    mixer.stop_channel(channel);
    scheduler
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .stop();

    let summary = MusicSummary {
        sample_rate,
        frames,
        callback_hz,
        callbacks: callbacks.load(Ordering::Relaxed),
        notes: notes.load(Ordering::Relaxed),
        peak,
    };
    debug!("rendered sequence: {summary:?}");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_at_default_rate_runs_the_sequencer() {
        let summary = render_sequence(22_050, 250, 22_050);
        assert!(
            (250..=253).contains(&summary.callbacks),
            "callbacks: {}",
            summary.callbacks
        );
        assert_eq!(summary.notes, summary.callbacks.div_ceil(TICKS_PER_NOTE));
        assert_eq!(summary.peak, VOICE_AMPLITUDE);
    }

    #[test]
    fn zero_frames_fire_nothing() {
        let summary = render_sequence(11_025, 60, 0);
        assert_eq!(summary.callbacks, 0);
        assert_eq!(summary.notes, 0);
        assert_eq!(summary.peak, 0);
    }
}
