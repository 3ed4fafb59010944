//! Noise-suppression collaborator.
//!
//! The suppressor works on 20 ms blocks of 16-bit mono PCM, in place. The
//! algorithm itself lives behind `NoiseSuppressor`; the in-tree
//! `Passthrough` only enforces the calling contract.

use crate::error::Error;

pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [8000, 16000];

/// Length of one processing block.
pub const FRAME_MS: u32 = 20;

const BYTES_PER_SAMPLE: usize = 2;

/// Samples in one frame at `sample_rate`.
pub fn frame_samples(sample_rate: u32) -> usize {
    sample_rate as usize * FRAME_MS as usize / 1000
}

/// Bytes in one frame at `sample_rate` (640 at 16 kHz).
pub fn frame_bytes(sample_rate: u32) -> usize {
    frame_samples(sample_rate) * BYTES_PER_SAMPLE
}

pub trait NoiseSuppressor: Send {
    fn init(&mut self, sample_rate: u32) -> Result<(), Error>;
    /// Denoise one frame in place.
    fn process(&mut self, frame: &mut [i16]) -> Result<(), Error>;
    fn uninit(&mut self) -> Result<(), Error>;
}

/// Run `suppressor` over a frame of little-endian PCM bytes, in place.
pub fn process_frame_bytes(
    suppressor: &mut dyn NoiseSuppressor,
    frame: &mut [u8],
) -> Result<(), Error> {
    if frame.len() % BYTES_PER_SAMPLE != 0 {
        return Err(Error::FrameLength {
            expected: frame.len() - frame.len() % BYTES_PER_SAMPLE,
            actual: frame.len(),
        });
    }

    let mut samples: Vec<i16> = frame
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    suppressor.process(&mut samples)?;

    for (dst, sample) in frame.chunks_exact_mut(BYTES_PER_SAMPLE).zip(samples) {
        dst.copy_from_slice(&sample.to_le_bytes());
    }
    Ok(())
}

/// Suppressor that checks the contract and leaves samples untouched.
#[derive(Debug, Default)]
pub struct Passthrough {
    sample_rate: Option<u32>,
}

impl NoiseSuppressor for Passthrough {
    fn init(&mut self, sample_rate: u32) -> Result<(), Error> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(Error::UnsupportedSampleRate(sample_rate));
        }
        self.sample_rate = Some(sample_rate);
        Ok(())
    }

    fn process(&mut self, frame: &mut [i16]) -> Result<(), Error> {
        let fs = self.sample_rate.ok_or(Error::NotInitialized)?;
        let expected = frame_samples(fs);
        if frame.len() != expected {
            return Err(Error::FrameLength {
                expected: expected * BYTES_PER_SAMPLE,
                actual: frame.len() * BYTES_PER_SAMPLE,
            });
        }
        Ok(())
    }

    fn uninit(&mut self) -> Result<(), Error> {
        self.sample_rate.take().ok_or(Error::NotInitialized)?;
        Ok(())
    }
}
