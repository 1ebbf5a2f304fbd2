//! Polygon cell masks.
//!
//! A cell belongs to a polygon when its centre lies inside it. Only cells in
//! the polygon's bounding box are tested.

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use ndarray::ArrayView2;

use exposure_common::GridSpec;

/// Flat indices of the grid cells whose centres fall inside a polygon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellMask {
    indices: Vec<usize>,
}

impl CellMask {
    pub fn for_polygon(grid: &GridSpec, polygon: &MultiPolygon<f64>) -> Self {
        let Some(rect) = polygon.bounding_rect() else {
            return Self::default();
        };
        let (Some((col0, col1)), Some((row0, row1))) = (
            grid.col_span(rect.min().x, rect.max().x),
            grid.row_span(rect.min().y, rect.max().y),
        ) else {
            return Self::default();
        };

        let mut indices = Vec::new();
        for row in row0..=row1 {
            let y = grid.row_center(row);
            for col in col0..=col1 {
                if polygon.contains(&Point::new(grid.col_center(col), y)) {
                    indices.push(grid.flat_index(col, row));
                }
            }
        }

        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Sum of the non-NaN values under the mask, accumulated in f64.
    pub fn sum(&self, layer: ArrayView2<'_, f32>) -> f64 {
        match layer.as_slice() {
            Some(values) => self.sum_slice(values),
            None => {
                let width = layer.ncols();
                self.indices
                    .iter()
                    .filter_map(|&i| layer.get((i / width, i % width)))
                    .filter(|v| !v.is_nan())
                    .map(|&v| f64::from(v))
                    .sum()
            }
        }
    }

    /// Sum over a row-major slice.
    pub fn sum_slice(&self, values: &[f32]) -> f64 {
        self.indices
            .iter()
            .filter_map(|&i| values.get(i))
            .filter(|v| !v.is_nan())
            .map(|&v| f64::from(v))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn grid() -> GridSpec {
        // 5 x 5 unit cells, top-left corner at (0, 5)
        GridSpec::new(5, 5, 0.0, 5.0, 1.0, 1.0)
    }

    #[test]
    fn test_mask_selects_contained_centres() {
        // Covers centres (0.5..2.5, 3.5..4.5): 3 columns x 2 rows
        let poly = MultiPolygon(vec![polygon![
            (x: 0.0, y: 3.0),
            (x: 3.0, y: 3.0),
            (x: 3.0, y: 5.0),
            (x: 0.0, y: 5.0),
        ]]);
        let mask = CellMask::for_polygon(&grid(), &poly);
        assert_eq!(mask.indices(), &[0, 1, 2, 5, 6, 7]);
    }

    #[test]
    fn test_triangle_excludes_corner_cells() {
        let poly = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 0.0, y: 5.0),
        ]]);
        let mask = CellMask::for_polygon(&grid(), &poly);
        // Centres with x + y < 5 lie strictly inside; diagonal centres sit on the edge.
        assert_eq!(mask.len(), 10);
    }

    #[test]
    fn test_polygon_outside_grid_is_empty() {
        let poly = MultiPolygon(vec![polygon![
            (x: 10.0, y: 10.0),
            (x: 11.0, y: 10.0),
            (x: 11.0, y: 11.0),
        ]]);
        let mask = CellMask::for_polygon(&grid(), &poly);
        assert!(mask.is_empty());
        assert_eq!(mask.sum_slice(&[1.0; 25]), 0.0);
    }

    #[test]
    fn test_sum_skips_nan() {
        let poly = MultiPolygon(vec![polygon![
            (x: 0.0, y: 4.0),
            (x: 2.0, y: 4.0),
            (x: 2.0, y: 5.0),
            (x: 0.0, y: 5.0),
        ]]);
        let mask = CellMask::for_polygon(&grid(), &poly);
        let mut values = vec![0.0f32; 25];
        values[0] = 2.5;
        values[1] = f32::NAN;
        assert_eq!(mask.sum_slice(&values), 2.5);

        let layer = ndarray::Array2::from_shape_vec((5, 5), values).unwrap();
        assert_eq!(mask.sum(layer.view()), 2.5);
    }
}
