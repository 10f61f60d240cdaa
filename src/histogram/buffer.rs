use crate::errors::{HistogramError, Result};
use crate::types::{BinsCount, HistogramLayer, RgblBin, LAYER_COUNT};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-layer maxima produced by the normalization stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxBinValues(pub RgblBin);

impl MaxBinValues {
    pub fn get(&self, layer: HistogramLayer) -> u32 {
        self.0[layer.index()]
    }

    /// Largest count across every layer.
    pub fn overall(&self) -> u32 {
        self.0.iter().copied().max().unwrap_or(0)
    }

    /// Divisor used to scale bar heights; never zero.
    pub fn denominator(&self, layer: HistogramLayer) -> u32 {
        self.get(layer).max(1)
    }
}

/// Host-side histogram storage shared by every stage.
///
/// Cells are laid out `[bin][layer]`: bin `i` occupies cells `4 * i .. 4 * i + 4` in
/// Red, Green, Blue, Luminance order. The GPU buffers use the identical layout so
/// readback is a plain copy.
#[derive(Debug, Clone)]
pub struct HistogramBuffer {
    id: Uuid,
    bins: BinsCount,
    generation: u64,
    cells: Vec<u32>,
    max_bin_values: MaxBinValues,
}

impl HistogramBuffer {
    pub fn new(bins: BinsCount) -> Self {
        Self {
            id: Uuid::new_v4(),
            bins,
            generation: 0,
            cells: vec![0; bins.cell_count()],
            max_bin_values: MaxBinValues::default(),
        }
    }

    /// Identity of this allocation. Reallocation always yields a new id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of times the buffer has been cleared for a new frame.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bins_count(&self) -> BinsCount {
        self.bins
    }

    /// Zeroes counts and maxima and starts a new frame generation.
    pub fn clear(&mut self) {
        self.cells.fill(0);
        self.max_bin_values = MaxBinValues::default();
        self.generation += 1;
    }

    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    /// Overwrites all counts, e.g. from a device readback.
    pub fn copy_from_cells(&mut self, cells: &[u32]) -> Result<()> {
        if cells.len() != self.cells.len() {
            return Err(HistogramError::BufferSizeMismatch {
                expected: self.cells.len(),
                actual: cells.len(),
            });
        }
        self.cells.copy_from_slice(cells);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.cells)
    }

    /// Red, Green, Blue and Luminance counts of bin `index`, or `None` past the last bin.
    pub fn bin(&self, index: usize) -> Option<RgblBin> {
        let start = index.checked_mul(LAYER_COUNT)?;
        let end = start.checked_add(LAYER_COUNT)?;
        let cells = self.cells.get(start..end)?;
        Some([cells[0], cells[1], cells[2], cells[3]])
    }

    pub fn count(&self, layer: HistogramLayer, bin: usize) -> u32 {
        self.bin(bin).map_or(0, |counts| counts[layer.index()])
    }

    /// Counts of one layer in bin order.
    pub fn layer(&self, layer: HistogramLayer) -> impl Iterator<Item = u32> + '_ {
        self.cells
            .iter()
            .skip(layer.index())
            .step_by(LAYER_COUNT)
            .copied()
    }

    /// Sum of one layer's counts, i.e. the number of samples binned for it.
    pub fn total(&self, layer: HistogramLayer) -> u64 {
        self.layer(layer).map(u64::from).sum()
    }

    pub fn max_bin_values(&self) -> MaxBinValues {
        self.max_bin_values
    }

    pub fn set_max_bin_values(&mut self, values: MaxBinValues) {
        self.max_bin_values = values;
    }

    pub fn is_zero(&self) -> bool {
        self.cells.iter().all(|&c| c == 0)
    }

    /// Owned copy of the current frame suitable for serialization.
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bins_count: self.bins.get(),
            max_bin_values: self.max_bin_values.0,
            bins: (0..self.bins.as_usize()).filter_map(|i| self.bin(i)).collect(),
        }
    }

    /// Logs every bin at trace level.
    pub fn dump(&self) {
        for i in 0..self.bins.as_usize() {
            if let Some([r, g, b, l]) = self.bin(i) {
                tracing::trace!("{}: ({}, {}, {}, {})", i, r, g, b, l);
            }
        }
        tracing::trace!(max_bin_values = ?self.max_bin_values.0, "histogram dump");
    }
}

/// Serializable histogram contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub bins_count: u32,
    pub max_bin_values: RgblBin,
    pub bins: Vec<RgblBin>,
}
