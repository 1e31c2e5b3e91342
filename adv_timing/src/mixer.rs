use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::lock;
use crate::sample::{SampleGenerator, SampleScheduler};

/// Pull-based PCM source consumed by a mixer.
pub trait AudioSource {
    /// Write up to `out.len()` interleaved samples, returning how many were
    /// produced.
    fn produce(&mut self, out: &mut [i16]) -> usize;

    fn sample_rate(&self) -> u32;

    fn is_stereo(&self) -> bool;
}

impl<G: SampleGenerator> AudioSource for SampleScheduler<G> {
    fn produce(&mut self, out: &mut [i16]) -> usize {
        SampleScheduler::produce(self, out)
    }

    fn sample_rate(&self) -> u32 {
        self.generator().sample_rate()
    }

    fn is_stereo(&self) -> bool {
        self.generator().is_stereo()
    }
}

/// Source shared between the mixer (pulling audio) and its owner
/// (reconfiguring it). The mutex serializes the two.
pub type SharedSource = Arc<Mutex<dyn AudioSource + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelHandle(u32);

/// Minimal software mixer: sums every playing channel with saturation.
///
/// Sources must already match the mixer's rate and channel layout; there is
/// no resampling.
pub struct SoftMixer {
    sample_rate: u32,
    stereo: bool,
    next_handle: u32,
    channels: BTreeMap<ChannelHandle, SharedSource>,
    scratch: Vec<i16>,
}

impl SoftMixer {
    pub fn new(sample_rate: u32, stereo: bool) -> Self {
        SoftMixer {
            sample_rate,
            stereo,
            next_handle: 0,
            channels: BTreeMap::new(),
            scratch: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    pub fn play(&mut self, source: SharedSource) -> ChannelHandle {
        {
            let guard = lock(&source);
            if guard.sample_rate() != self.sample_rate || guard.is_stereo() != self.stereo {
                warn!(
                    "mixing {} Hz {} source into {} Hz {} output without conversion",
                    guard.sample_rate(),
                    layout(guard.is_stereo()),
                    self.sample_rate,
                    layout(self.stereo)
                );
            }
        }
        self.next_handle += 1;
        let handle = ChannelHandle(self.next_handle);
        self.channels.insert(handle, source);
        debug!("mixer channel {} playing", handle.0);
        handle
    }

    pub fn stop_channel(&mut self, handle: ChannelHandle) -> bool {
        let removed = self.channels.remove(&handle).is_some();
        if removed {
            debug!("mixer channel {} stopped", handle.0);
        }
        removed
    }

    pub fn is_playing(&self, handle: ChannelHandle) -> bool {
        self.channels.contains_key(&handle)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Pull every channel and sum into `out`. Always fills the whole buffer.
    pub fn mix(&mut self, out: &mut [i16]) -> usize {
        out.fill(0);
        self.scratch.resize(out.len(), 0);
        for source in self.channels.values() {
            self.scratch.fill(0);
            let produced = lock(source).produce(&mut self.scratch).min(out.len());
            for (mixed, sample) in out.iter_mut().zip(&self.scratch[..produced]) {
                *mixed = mixed.saturating_add(*sample);
            }
        }
        out.len()
    }
}

fn layout(stereo: bool) -> &'static str {
    if stereo {
        "stereo"
    } else {
        "mono"
    }
}
