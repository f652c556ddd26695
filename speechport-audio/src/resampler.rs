//! Audio resampling with rubato
//!
//! Converts a whole mono clip from its native rate to the rate the acoustic
//! model was trained on (16 kHz for wav2vec2-style models).

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::info;

use crate::error::{AudioError, Result};

/// Input frames per rubato call
const CHUNK_SIZE: usize = 1024;

/// Resampler for converting mono audio to a target sample rate
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    resampler: Option<SincFixedIn<f32>>,
}

impl Resampler {
    /// Create new resampler
    ///
    /// # Arguments
    ///
    /// * `source_rate` - Source sample rate (e.g., 44100)
    /// * `target_rate` - Target sample rate (typically 16000)
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::invalid_config("Sample rate cannot be zero"));
        }

        // If rates are the same, no resampling needed
        let resampler = if source_rate != target_rate {
            Some(Self::create_resampler(source_rate, target_rate)?)
        } else {
            None
        };

        Ok(Self {
            source_rate,
            target_rate,
            resampler,
        })
    }

    fn create_resampler(source_rate: u32, target_rate: u32) -> Result<SincFixedIn<f32>> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        SincFixedIn::<f32>::new(
            target_rate as f64 / source_rate as f64,
            1.0,
            params,
            CHUNK_SIZE,
            1,
        )
        .map_err(|e| AudioError::ResampleError(format!("Failed to create resampler: {:?}", e)))
    }

    /// Resample a complete clip.
    ///
    /// The filter delay is trimmed so the output lines up with the input and
    /// has `round(len * target / source)` samples.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let expected = self.expected_output_len(input.len());
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };

        if input.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            "Resampling from {} Hz to {} Hz",
            self.source_rate, self.target_rate
        );

        let delay = resampler.output_delay();
        let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);

        let mut pos = 0;
        while input.len() - pos >= resampler.input_frames_next() {
            let frames = resampler.input_frames_next();
            let frames_in: [&[f32]; 1] = [&input[pos..pos + frames]];
            let chunk = resampler
                .process(&frames_in[..], None)
                .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?;
            output.extend_from_slice(&chunk[0]);
            pos += frames;
        }

        if pos < input.len() {
            let tail: [&[f32]; 1] = [&input[pos..]];
            let chunk = resampler
                .process_partial(Some(&tail[..]), None)
                .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?;
            output.extend_from_slice(&chunk[0]);
        }

        // Flush the filter tail until the delayed output is complete
        while output.len() < expected + delay {
            let chunk = resampler
                .process_partial(None::<&[&[f32]]>, None)
                .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?;
            if chunk[0].is_empty() {
                break;
            }
            output.extend_from_slice(&chunk[0]);
        }

        let start = delay.min(output.len());
        let mut aligned = output.split_off(start);
        aligned.truncate(expected);
        Ok(aligned)
    }

    /// Get expected output length for given input length
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        if self.resampler.is_none() {
            return input_len;
        }

        (input_len as f64 * self.target_rate as f64 / self.source_rate as f64).round() as usize
    }
}

/// Resample `samples` from `from_rate` to `to_rate` in one call
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    Resampler::new(from_rate, to_rate)?.process(samples)
}
