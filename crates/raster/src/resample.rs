//! Nearest-neighbour resampling between north-up grids.

use ndarray::ArrayView2;

use exposure_common::GridSpec;

/// Slack allowed when a target centre sits on the edge of the source range.
const EDGE_EPSILON: f64 = 1e-9;

/// Precomputed source index for every target cell.
///
/// Built once per (source, target) grid pair and reused for every date that
/// shares the source grid.
#[derive(Debug, Clone)]
pub struct ResamplePlan {
    source: GridSpec,
    target: GridSpec,
    /// Source flat index per target cell, `None` outside the source range
    indices: Vec<Option<usize>>,
}

impl ResamplePlan {
    /// Nearest source cell centre for each target cell centre.
    ///
    /// A target centre outside the span of source cell centres gets no value.
    pub fn nearest(source: &GridSpec, target: &GridSpec) -> Self {
        let cols: Vec<Option<usize>> = (0..target.width)
            .map(|col| nearest_index(source.fractional_col(target.col_center(col)), source.width))
            .collect();
        let rows: Vec<Option<usize>> = (0..target.height)
            .map(|row| nearest_index(source.fractional_row(target.row_center(row)), source.height))
            .collect();

        let mut indices = Vec::with_capacity(target.len());
        for row in &rows {
            for col in &cols {
                indices.push(match (row, col) {
                    (Some(r), Some(c)) => Some(source.flat_index(*c, *r)),
                    _ => None,
                });
            }
        }

        Self {
            source: *source,
            target: *target,
            indices,
        }
    }

    pub fn source(&self) -> &GridSpec {
        &self.source
    }

    pub fn target(&self) -> &GridSpec {
        &self.target
    }

    /// Whether this plan can be reused for the given grid pair.
    pub fn matches(&self, source: &GridSpec, target: &GridSpec) -> bool {
        self.source.is_aligned_with(source) && self.target.is_aligned_with(target)
    }

    /// Resample row-major source values onto the target grid.
    pub fn apply(&self, source: &[f32]) -> Vec<f32> {
        self.indices
            .iter()
            .map(|idx| idx.and_then(|i| source.get(i).copied()).unwrap_or(f32::NAN))
            .collect()
    }

    /// Resample a row × col layer onto the target grid.
    pub fn apply_layer(&self, layer: ArrayView2<'_, f32>) -> Vec<f32> {
        match layer.as_slice() {
            Some(values) => self.apply(values),
            None => self.apply(&layer.iter().copied().collect::<Vec<_>>()),
        }
    }
}

fn nearest_index(fractional: f64, len: usize) -> Option<usize> {
    if len == 0 || fractional < -EDGE_EPSILON || fractional > (len - 1) as f64 + EDGE_EPSILON {
        return None;
    }
    Some((fractional.round().max(0.0) as usize).min(len - 1))
}
