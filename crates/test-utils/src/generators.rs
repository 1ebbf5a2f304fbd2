//! Test data generators for synthetic flood and population grids.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a flood extent grid cycling through fractions 0.00, 0.02, 0.04 ... 0.18.
///
/// The first three values of every cycle fall below the 0.05 noise
/// threshold, the rest survive it.
pub fn create_flood_fraction_grid(width: usize, height: usize) -> Vec<f32> {
    (0..width * height)
        .map(|i| (i % 10) as f32 * 0.02)
        .collect()
}

/// Creates a population grid where each cell holds `(row + 1) * 100 + col`.
pub fn create_population_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(((row + 1) * 100 + col) as f32);
        }
    }
    data
}

/// Creates a grid with NaN values at specified positions.
///
/// # Arguments
///
/// * `nan_positions` - List of (col, row) positions that should be NaN
///
/// # Returns
///
/// A `Vec<f32>` with NaN at specified positions, `fill` elsewhere.
pub fn create_grid_with_nans(
    width: usize,
    height: usize,
    fill: f32,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![fill; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}
