//! Grid specifications for north-up rasters.

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing grid origins and resolutions.
pub const GRID_TOLERANCE: f64 = 1e-9;

/// Specification of a regular north-up raster grid.
///
/// The origin is the outer corner of the top-left cell. Columns advance east
/// by `res_x`, rows advance south by `res_y`. Both resolutions are positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of columns
    pub width: usize,
    /// Number of rows
    pub height: usize,
    /// X coordinate of the left edge of column 0
    pub origin_x: f64,
    /// Y coordinate of the top edge of row 0
    pub origin_y: f64,
    /// Cell width
    pub res_x: f64,
    /// Cell height
    pub res_y: f64,
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(
        width: usize,
        height: usize,
        origin_x: f64,
        origin_y: f64,
        res_x: f64,
        res_y: f64,
    ) -> Self {
        Self {
            width,
            height,
            origin_x,
            origin_y,
            res_x,
            res_y,
        }
    }

    /// X coordinate of the centre of column `col`.
    pub fn col_center(&self, col: usize) -> f64 {
        self.origin_x + (col as f64 + 0.5) * self.res_x
    }

    /// Y coordinate of the centre of row `row`.
    pub fn row_center(&self, row: usize) -> f64 {
        self.origin_y - (row as f64 + 0.5) * self.res_y
    }

    /// Fractional column index of `x` measured between cell centres.
    pub fn fractional_col(&self, x: f64) -> f64 {
        (x - self.col_center(0)) / self.res_x
    }

    /// Fractional row index of `y` measured between cell centres.
    pub fn fractional_row(&self, y: f64) -> f64 {
        (self.row_center(0) - y) / self.res_y
    }

    /// Column range whose centres fall inside `[min_x, max_x]`, if any.
    pub fn col_span(&self, min_x: f64, max_x: f64) -> Option<(usize, usize)> {
        let first = ((min_x - self.origin_x) / self.res_x - 0.5).ceil().max(0.0);
        let last = ((max_x - self.origin_x) / self.res_x - 0.5)
            .floor()
            .min(self.width as f64 - 1.0);
        (first <= last).then(|| (first as usize, last as usize))
    }

    /// Row range whose centres fall inside `[min_y, max_y]`, if any.
    pub fn row_span(&self, min_y: f64, max_y: f64) -> Option<(usize, usize)> {
        let first = ((self.origin_y - max_y) / self.res_y - 0.5).ceil().max(0.0);
        let last = ((self.origin_y - min_y) / self.res_y - 0.5)
            .floor()
            .min(self.height as f64 - 1.0);
        (first <= last).then(|| (first as usize, last as usize))
    }

    /// Get the 1D array index for a 2D grid position (row-major).
    pub fn flat_index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    /// Total number of grid cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Same shape, origin and resolution within [`GRID_TOLERANCE`].
    pub fn is_aligned_with(&self, other: &GridSpec) -> bool {
        self.width == other.width
            && self.height == other.height
            && (self.origin_x - other.origin_x).abs() <= GRID_TOLERANCE
            && (self.origin_y - other.origin_y).abs() <= GRID_TOLERANCE
            && (self.res_x - other.res_x).abs() <= GRID_TOLERANCE
            && (self.res_y - other.res_y).abs() <= GRID_TOLERANCE
    }
}
