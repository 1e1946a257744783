//! Coarse temporal energy profiles.
//!
//! The nearest-exemplar strategy does not compare band energies at all; it
//! compares the rough loudness contour of the utterance over time.  This
//! module computes that contour: a fixed-length vector of segment RMS values.

/// Reduce `samples` to a `points`-long RMS contour.
///
/// The clip is walked in segments of `max(1, len / points)` samples and the
/// RMS of each segment recorded; the result is truncated or zero-padded to
/// exactly `points` values.  An empty input yields all zeros.
pub fn temporal_profile(samples: &[f32], points: usize) -> Vec<f32> {
    if points == 0 {
        return Vec::new();
    }
    if samples.is_empty() {
        return vec![0.0; points];
    }

    let seg = (samples.len() / points).max(1);
    let mut profile = Vec::with_capacity(points + 1);
    let mut start = 0;
    while start + seg < samples.len() {
        let segment = &samples[start..start + seg];
        let sum_sq: f32 = segment.iter().map(|s| s * s).sum();
        profile.push((sum_sq / seg as f32).sqrt());
        start += seg;
    }

    profile.truncate(points);
    profile.resize(points, 0.0);
    profile
}
