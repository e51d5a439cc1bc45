use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Result, VizError};

const CHUNK_SIZE: usize = 1024;

/// Resample a mono channel from `from_rate` to `to_rate` with sinc interpolation.
///
/// The output is trimmed to `round(len * to_rate / from_rate)` samples so the
/// duration, and therefore the frame count, is preserved.
pub fn resample_channel(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_SIZE, 1)
        .map_err(|e| VizError::input(format!("failed to create resampler: {}", e)))?;

    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected_len + CHUNK_SIZE);

    let mut pos = 0;
    while pos + CHUNK_SIZE <= samples.len() {
        let chunk = &samples[pos..pos + CHUNK_SIZE];
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| VizError::input(format!("resample error: {}", e)))?;
        output.extend_from_slice(&result[0]);
        pos += CHUNK_SIZE;
    }

    if pos < samples.len() {
        let remaining = &samples[pos..];
        let result = resampler
            .process_partial(Some(&[remaining]), None)
            .map_err(|e| VizError::input(format!("resample error: {}", e)))?;
        output.extend_from_slice(&result[0]);
    }

    // Flush the filter tail until the expected length is covered.
    while output.len() < expected_len {
        let result = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| VizError::input(format!("resample error: {}", e)))?;
        if result[0].is_empty() {
            break;
        }
        output.extend_from_slice(&result[0]);
    }

    output.resize(expected_len, 0.0);
    Ok(output)
}
