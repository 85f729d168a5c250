use std::f64::consts::TAU;

use rand::prelude::*;
use visualizer::AudioBuffer;

use crate::cli::Signal;

const TONE_HZ: f64 = 440.0;
const AMPLITUDE: f64 = 0.5 * i16::MAX as f64;

/// Produces interleaved stereo S16 buffers for the chosen test signal.
pub struct SignalGenerator {
    signal: Signal,
    rate: u32,
    position: u64,
    rng: StdRng,
}

impl SignalGenerator {
    pub fn new(signal: Signal, rate: u32, seed: u64) -> Self {
        Self {
            signal,
            rate,
            position: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next `frames` stereo frames.
    pub fn next_buffer(&mut self, frames: usize) -> AudioBuffer {
        let mut samples = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            let value = match self.signal {
                Signal::Silence => 0,
                Signal::Sine => {
                    let t = self.position as f64 / f64::from(self.rate);
                    (AMPLITUDE * (TAU * TONE_HZ * t).sin()).round() as i16
                }
                Signal::Noise => (self.rng.gen_range(-1.0..=1.0) * AMPLITUDE) as i16,
            };
            samples.extend([value, value]);
            self.position += 1;
        }
        AudioBuffer::from_samples(&samples)
    }
}
