use super::buffer::{HistogramBuffer, MaxBinValues};
use crate::types::LAYER_COUNT;

/// Per-layer maxima over `[bin][layer]` cells.
pub fn max_bin_values(cells: &[u32]) -> MaxBinValues {
    let mut maxima = [0u32; LAYER_COUNT];
    for bin in cells.chunks_exact(LAYER_COUNT) {
        for (max, &count) in maxima.iter_mut().zip(bin) {
            *max = (*max).max(count);
        }
    }
    MaxBinValues(maxima)
}

/// Normalization stage: stores the per-layer maxima of the finished counts in `histogram`.
pub fn normalize(histogram: &mut HistogramBuffer) -> MaxBinValues {
    let values = max_bin_values(histogram.cells());
    histogram.set_max_bin_values(values);
    values
}
