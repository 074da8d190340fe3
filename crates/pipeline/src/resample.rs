//! Sample-rate conversion for the synthesis resample path

use rubato::{FftFixedIn, Resampler as RubatoResampler};

/// Sample-rate converter. FFT-based for quality, with a linear fallback for
/// inputs too short to window.
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self { from_rate, to_rate }
    }

    /// Resample a mono f32 buffer.
    pub fn resample(&self, input: &[f32]) -> Vec<f32> {
        if self.from_rate == self.to_rate || input.is_empty() {
            return input.to_vec();
        }

        if input.len() < 64 {
            return self.resample_linear(input);
        }

        let chunk_size = 1024.min(input.len());
        let mut resampler = match FftFixedIn::<f64>::new(
            self.from_rate as usize,
            self.to_rate as usize,
            chunk_size,
            2,
            1,
        ) {
            Ok(resampler) => resampler,
            Err(e) => {
                tracing::warn!(error = %e, "fft resampler init failed, using linear");
                return self.resample_linear(input);
            }
        };

        let expected_len =
            (input.len() as f64 * self.to_rate as f64 / self.from_rate as f64).round() as usize;
        let mut output = Vec::with_capacity(expected_len);

        // FftFixedIn consumes fixed-size input blocks; pad the tail with
        // zeros and trim the output to the expected length afterwards.
        let mut offset = 0;
        while offset < input.len() {
            let end = (offset + chunk_size).min(input.len());
            let mut block: Vec<f64> = input[offset..end].iter().map(|&s| s as f64).collect();
            block.resize(chunk_size, 0.0);

            match resampler.process(&[block], None) {
                Ok(frames) => output.extend(frames[0].iter().map(|&s| s as f32)),
                Err(e) => {
                    tracing::warn!(error = %e, "fft resampling failed, using linear");
                    return self.resample_linear(input);
                }
            }
            offset = end;
        }

        output.truncate(expected_len);
        output
    }

    fn resample_linear(&self, input: &[f32]) -> Vec<f32> {
        let ratio = self.to_rate as f64 / self.from_rate as f64;
        let output_len = (input.len() as f64 * ratio).ceil() as usize;
        let mut output = Vec::with_capacity(output_len);

        for i in 0..output_len {
            let src = i as f64 / ratio;
            let floor = src.floor() as usize;
            let ceil = (floor + 1).min(input.len().saturating_sub(1));
            let frac = (src - floor as f64) as f32;
            output.push(input[floor] * (1.0 - frac) + input[ceil] * frac);
        }

        output
    }
}

/// Average interleaved channels down to mono.
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
