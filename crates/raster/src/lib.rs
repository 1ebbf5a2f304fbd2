//! Raster handling for flood exposure processing.
//!
//! - GeoTIFF decode/encode with GDAL band descriptions and no-data, including
//!   pixel-interleaved multi-band images
//! - Date-indexed stacks backed by `ndarray`
//! - Flood extent band selection
//! - Nearest-neighbour resampling plans
//! - Polygon cell masks for zonal sums

pub mod bands;
mod chunks;
pub mod error;
pub mod geotiff;
pub mod mask;
pub mod raster;
pub mod resample;
pub mod stack;

pub use bands::{select_flood_band, BandLayout};
pub use error::{RasterError, Result};
pub use geotiff::{decode_geotiff, encode_geotiff, encode_geotiff_bands};
pub use mask::CellMask;
pub use raster::{Band, Raster};
pub use resample::ResamplePlan;
pub use stack::{layer_to_vec, RasterStack, RasterStackBuilder};
