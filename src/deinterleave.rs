//! Interleaved to planar sample conversion.

/// Copy `frames` interleaved frames from `interleaved` into one slice per channel.
///
/// Channel `c` of frame `i` is read from `interleaved[i * channels + c]` and
/// written to `outputs[c][i]`.
///
/// # Panics
///
/// Panics if `outputs` holds fewer than `channels` slices, if any of those
/// slices is shorter than `frames`, or if `interleaved` is shorter than
/// `frames * channels`.
pub fn deinterleave(interleaved: &[f32], channels: usize, frames: usize, outputs: &mut [&mut [f32]]) {
    assert!(
        outputs.len() >= channels,
        "{} output buffers supplied for {} channels",
        outputs.len(),
        channels
    );
    if channels == 0 || frames == 0 {
        return;
    }

    let interleaved = &interleaved[..frames * channels];
    for (c, out) in outputs.iter_mut().take(channels).enumerate() {
        let out = &mut out[..frames];
        for (i, sample) in out.iter_mut().enumerate() {
            *sample = interleaved[i * channels + c];
        }
    }
}
