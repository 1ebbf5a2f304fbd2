//! Date-indexed raster stacks.

use chrono::NaiveDate;
use ndarray::{Array3, ArrayView2, Axis};

use exposure_common::GridSpec;

use crate::error::{RasterError, Result};

/// A date × row × col cube of single-band rasters sharing one grid.
#[derive(Debug, Clone)]
pub struct RasterStack {
    grid: GridSpec,
    dates: Vec<NaiveDate>,
    data: Array3<f32>,
}

impl RasterStack {
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// The row × col layer for the `index`-th date.
    pub fn layer(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }

    /// Iterate (date, layer) pairs in stack order.
    pub fn layers(&self) -> impl Iterator<Item = (NaiveDate, ArrayView2<'_, f32>)> {
        self.dates
            .iter()
            .copied()
            .zip(self.data.axis_iter(Axis(0)))
    }

    /// Apply `f` to every layer, producing a stack on `grid`.
    ///
    /// `f` must return `grid.len()` values in row-major order.
    pub fn map_layers<F>(&self, grid: GridSpec, mut f: F) -> Result<RasterStack>
    where
        F: FnMut(ArrayView2<'_, f32>) -> Vec<f32>,
    {
        let mut builder = RasterStackBuilder::with_grid(grid);
        for (date, layer) in self.layers() {
            builder.push(date, grid, f(layer))?;
        }
        Ok(builder.build())
    }
}

/// Accumulates layers for a [`RasterStack`], rejecting misaligned grids.
#[derive(Debug, Default)]
pub struct RasterStackBuilder {
    grid: Option<GridSpec>,
    dates: Vec<NaiveDate>,
    values: Vec<f32>,
}

impl RasterStackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder whose layers must all match `grid`.
    pub fn with_grid(grid: GridSpec) -> Self {
        Self {
            grid: Some(grid),
            ..Self::default()
        }
    }

    /// The grid fixed by the first pushed layer, if any.
    pub fn grid(&self) -> Option<&GridSpec> {
        self.grid.as_ref()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Append a layer. The first layer fixes the grid of the stack.
    pub fn push(&mut self, date: NaiveDate, grid: GridSpec, data: Vec<f32>) -> Result<()> {
        if data.len() != grid.len() {
            return Err(RasterError::ShapeMismatch {
                expected: grid.len(),
                found: data.len(),
            });
        }
        match &self.grid {
            Some(expected) if !expected.is_aligned_with(&grid) => {
                return Err(RasterError::grid_mismatch(expected, &grid));
            }
            Some(_) => {}
            None => self.grid = Some(grid),
        }

        self.dates.push(date);
        self.values.extend(data);
        Ok(())
    }

    /// Finish the stack. An empty builder yields an empty stack on a 0 × 0 grid.
    pub fn build(self) -> RasterStack {
        let grid = self
            .grid
            .unwrap_or_else(|| GridSpec::new(0, 0, 0.0, 0.0, 1.0, 1.0));
        let shape = (self.dates.len(), grid.height, grid.width);
        // Every push checked `data.len() == grid.len()`, so the shape always fits.
        let data = Array3::from_shape_vec(shape, self.values)
            .unwrap_or_else(|_| Array3::zeros((0, grid.height, grid.width)));

        RasterStack {
            grid,
            dates: self.dates,
            data,
        }
    }
}

/// Copy a layer view into row-major order.
pub fn layer_to_vec(layer: ArrayView2<'_, f32>) -> Vec<f32> {
    layer.iter().copied().collect()
}

/// Wrap row-major values as a row × col array.
#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_stack_layers_in_push_order() {
        let grid = GridSpec::new(2, 1, 0.0, 1.0, 1.0, 1.0);
        let mut builder = RasterStackBuilder::new();
        builder.push(date(2), grid, vec![1.0, 2.0]).unwrap();
        builder.push(date(1), grid, vec![3.0, 4.0]).unwrap();

        let stack = builder.build();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.dates(), &[date(2), date(1)]);
        assert_eq!(layer_to_vec(stack.layer(1)), vec![3.0, 4.0]);
        assert_eq!(stack.data().shape(), &[2, 1, 2]);
    }

    #[test]
    fn test_misaligned_layer_is_rejected() {
        let grid = GridSpec::new(2, 1, 0.0, 1.0, 1.0, 1.0);
        let shifted = GridSpec::new(2, 1, 0.5, 1.0, 1.0, 1.0);
        let mut builder = RasterStackBuilder::new();
        builder.push(date(1), grid, vec![1.0, 2.0]).unwrap();

        let err = builder.push(date(2), shifted, vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, RasterError::GridMismatch { .. }));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_map_layers() {
        let grid = GridSpec::new(2, 1, 0.0, 1.0, 1.0, 1.0);
        let mut builder = RasterStackBuilder::new();
        builder.push(date(1), grid, vec![1.0, 2.0]).unwrap();
        let stack = builder.build();

        let doubled = stack
            .map_layers(grid, |layer| layer.iter().map(|v| v * 2.0).collect())
            .unwrap();
        assert_eq!(layer_to_vec(doubled.layer(0)), vec![2.0, 4.0]);
    }

    #[test]
    fn test_empty_stack() {
        let stack = RasterStackBuilder::new().build();
        assert!(stack.is_empty());
    }
}
