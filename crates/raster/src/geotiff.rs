//! GeoTIFF reading and writing.
//!
//! Only north-up rasters georeferenced with `ModelPixelScale` and
//! `ModelTiepoint` are supported. Band descriptions come from the GDAL
//! metadata tag and no-data values from the GDAL no-data tag. Multi-band
//! images must be pixel-interleaved.

use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::{PhotometricInterpretation, SampleFormat, Tag};
use tracing::debug;

use exposure_common::GridSpec;

use crate::chunks::read_interleaved;
use crate::error::{RasterError, Result};
use crate::raster::{Band, Raster};

/// GDAL's XML metadata tag.
const GDAL_METADATA: u16 = 42112;

/// GeoKey directory declaring a geographic EPSG:4326 raster with area pixels.
const GEO_KEYS_EPSG_4326: [u16; 16] = [
    1, 1, 0, 3, // header: version 1.1.0, 3 keys
    1024, 0, 1, 2, // GTModelTypeGeoKey = geographic
    1025, 0, 1, 1, // GTRasterTypeGeoKey = pixel is area
    2048, 0, 1, 4326, // GeographicTypeGeoKey = WGS 84
];

/// Two float32 samples per pixel, the layout GDAL uses for two-band float rasters.
struct GrayPair32Float;

impl colortype::ColorType for GrayPair32Float {
    type Inner = f32;
    const TIFF_VALUE: PhotometricInterpretation = PhotometricInterpretation::BlackIsZero;
    const BITS_PER_SAMPLE: &'static [u16] = &[32, 32];
    const SAMPLE_FORMAT: &'static [SampleFormat] = &[SampleFormat::IEEEFP; 2];
}

fn gdal_metadata_tag() -> Tag {
    Tag::from_u16_exhaustive(GDAL_METADATA)
}

/// Decode a GeoTIFF into a [`Raster`], one [`Band`] per sample.
pub fn decode_geotiff(bytes: &[u8]) -> Result<Raster> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let grid = read_grid(&mut decoder, width as usize, height as usize)?;

    let samples = match decoder.find_tag(Tag::SamplesPerPixel)? {
        Some(value) => value.into_u32()? as usize,
        None => 1,
    };
    if samples > 1 {
        if let Some(planar) = decoder.find_tag(Tag::PlanarConfiguration)? {
            if planar.into_u32()? == 2 {
                return Err(RasterError::UnsupportedLayout(
                    "planar multi-band images".to_string(),
                ));
            }
        }
    }

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => parse_nodata(&value.into_string()?),
        None => None,
    };

    let labels = match decoder.find_tag(gdal_metadata_tag())? {
        Some(value) => parse_band_descriptions(&value.into_string()?, samples)?,
        None => vec![None; samples],
    };

    let mut values = if samples == 1 {
        samples_to_f32(decoder.read_image()?)?
    } else {
        read_interleaved(&mut decoder, bytes, width as usize, height as usize, samples)?
    };
    let expected = grid.len() * samples;
    if values.len() != expected {
        return Err(RasterError::ShapeMismatch {
            expected,
            found: values.len(),
        });
    }

    if let Some(nodata) = nodata {
        for v in values.iter_mut().filter(|v| **v == nodata) {
            *v = f32::NAN;
        }
    }

    debug!(width, height, samples, "Decoded GeoTIFF");

    let bands = if samples == 1 {
        vec![Band {
            label: labels.into_iter().next().flatten(),
            data: values,
        }]
    } else {
        labels
            .into_iter()
            .enumerate()
            .map(|(band, label)| Band {
                label,
                data: values.iter().skip(band).step_by(samples).copied().collect(),
            })
            .collect()
    };

    Raster::with_bands(grid, bands)
}

/// Encode one band as a float32 GeoTIFF with no-data `nan`.
///
/// `label` is written as the band description when given.
pub fn encode_geotiff(grid: &GridSpec, data: &[f32], label: Option<&str>) -> Result<Vec<u8>> {
    encode_geotiff_bands(
        grid,
        &[Band {
            label: label.map(str::to_string),
            data: data.to_vec(),
        }],
    )
}

/// Encode one or two bands as a pixel-interleaved float32 GeoTIFF with
/// no-data `nan`. Labelled bands get GDAL band descriptions.
pub fn encode_geotiff_bands(grid: &GridSpec, bands: &[Band]) -> Result<Vec<u8>> {
    if let Some(bad) = bands.iter().find(|b| b.data.len() != grid.len()) {
        return Err(RasterError::ShapeMismatch {
            expected: grid.len(),
            found: bad.data.len(),
        });
    }

    let labels: Vec<&str> = bands.iter().filter_map(|b| b.label.as_deref()).collect();
    let metadata = (labels.len() == bands.len() && !labels.is_empty())
        .then(|| band_descriptions_xml(&labels));

    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf)?;
        let (width, height) = (grid.width as u32, grid.height as u32);
        match bands {
            [band] => {
                let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;
                write_georeference(image.encoder(), grid, metadata.as_deref())?;
                image.write_data(&band.data)?;
            }
            [first, second] => {
                let interleaved: Vec<f32> = first
                    .data
                    .iter()
                    .zip(&second.data)
                    .flat_map(|(a, b)| [*a, *b])
                    .collect();
                let mut image = encoder.new_image::<GrayPair32Float>(width, height)?;
                write_georeference(image.encoder(), grid, metadata.as_deref())?;
                image.write_data(&interleaved)?;
            }
            _ => {
                return Err(RasterError::UnsupportedLayout(format!(
                    "writing {} bands",
                    bands.len()
                )))
            }
        }
    }

    Ok(buf.into_inner())
}

fn write_georeference<W, K>(
    dir: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
    grid: &GridSpec,
    metadata: Option<&str>,
) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
    K: tiff::encoder::TiffKind,
{
    dir.write_tag(Tag::ModelPixelScaleTag, &[grid.res_x, grid.res_y, 0.0][..])?;
    dir.write_tag(
        Tag::ModelTiepointTag,
        &[0.0, 0.0, 0.0, grid.origin_x, grid.origin_y, 0.0][..],
    )?;
    dir.write_tag(Tag::GeoKeyDirectoryTag, &GEO_KEYS_EPSG_4326[..])?;
    dir.write_tag(Tag::GdalNodata, "nan")?;
    if let Some(metadata) = metadata {
        dir.write_tag(gdal_metadata_tag(), metadata)?;
    }
    Ok(())
}

fn read_grid<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
) -> Result<GridSpec> {
    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .ok_or_else(|| RasterError::MissingGeoreference("no ModelPixelScale tag".to_string()))?
        .into_f64_vec()?;
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .ok_or_else(|| RasterError::MissingGeoreference("no ModelTiepoint tag".to_string()))?
        .into_f64_vec()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(RasterError::MissingGeoreference(format!(
            "pixel scale has {} values, tiepoint has {}",
            scale.len(),
            tiepoint.len()
        )));
    }

    let (res_x, res_y) = (scale[0], scale[1]);
    if !(res_x > 0.0 && res_y > 0.0) {
        return Err(RasterError::MissingGeoreference(format!(
            "non-positive pixel scale ({}, {})",
            res_x, res_y
        )));
    }

    // Tiepoint maps raster (i, j) to model (x, y); shift it to the (0, 0) corner.
    let origin_x = tiepoint[3] - tiepoint[0] * res_x;
    let origin_y = tiepoint[4] + tiepoint[1] * res_y;

    Ok(GridSpec::new(width, height, origin_x, origin_y, res_x, res_y))
}

fn parse_nodata(text: &str) -> Option<f32> {
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    (!value.is_nan()).then_some(value as f32)
}

fn samples_to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    Ok(match result {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => {
            return Err(RasterError::UnsupportedLayout(
                "64-bit integer samples".to_string(),
            ))
        }
    })
}

/// Extract per-band `DESCRIPTION` items from GDAL metadata XML.
pub fn parse_band_descriptions(xml: &str, samples: usize) -> Result<Vec<Option<String>>> {
    let mut labels = vec![None; samples];
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut current: Option<usize> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"Item" => {
                let mut is_description = false;
                let mut sample = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| RasterError::Metadata(e.to_string()))?;
                    let value = attr.unescape_value()?;
                    match attr.key.as_ref() {
                        b"name" => is_description = value == "DESCRIPTION",
                        b"sample" => sample = value.parse::<usize>().ok(),
                        _ => {}
                    }
                }
                current = if is_description { sample } else { None };
            }
            Event::Text(t) => {
                if let Some(band) = current.filter(|b| *b < samples) {
                    labels[band] = Some(t.unescape()?.trim().to_string());
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(labels)
}

fn band_descriptions_xml(labels: &[&str]) -> String {
    let items: String = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            format!(
                "<Item name=\"DESCRIPTION\" sample=\"{}\" role=\"description\">{}</Item>",
                i, label
            )
        })
        .collect();
    format!("<GDALMetadata>{}</GDALMetadata>", items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_band_descriptions() {
        let xml = r#"<GDALMetadata>
  <Item name="DESCRIPTION" sample="0" role="description">MFED</Item>
  <Item name="DESCRIPTION" sample="1" role="description">SFED</Item>
  <Item name="OFFSET" sample="1" role="offset">0</Item>
</GDALMetadata>"#;
        let labels = parse_band_descriptions(xml, 2).unwrap();
        assert_eq!(labels, vec![Some("MFED".to_string()), Some("SFED".to_string())]);
    }

    #[test]
    fn test_parse_band_descriptions_ignores_out_of_range_samples() {
        let xml = r#"<GDALMetadata><Item name="DESCRIPTION" sample="3" role="description">X</Item></GDALMetadata>"#;
        assert_eq!(parse_band_descriptions(xml, 1).unwrap(), vec![None]);
    }

    #[test]
    fn test_encode_decode_preserves_grid_and_nan() {
        let grid = GridSpec::new(3, 2, 2.0, 14.0, 0.25, 0.5);
        let data = vec![1.0, f32::NAN, 3.5, 0.0, -2.0, 6.25];

        let bytes = encode_geotiff(&grid, &data, Some("SFED")).unwrap();
        let raster = decode_geotiff(&bytes).unwrap();

        assert!(raster.grid.is_aligned_with(&grid));
        assert_eq!(raster.band_count(), 1);
        assert_eq!(raster.labels(), vec![Some("SFED")]);

        let band = raster.band(0).unwrap();
        assert_eq!(band[0], 1.0);
        assert!(band[1].is_nan());
        assert_eq!(&band[2..], &data[2..]);
    }

    fn labelled(label: &str, data: &[f32]) -> Band {
        Band {
            label: Some(label.to_string()),
            data: data.to_vec(),
        }
    }

    /// Two-band chunky image written one row per strip with `compression`.
    fn two_band_strips<D: tiff::encoder::compression::Compression>(
        grid: &GridSpec,
        first: &Band,
        second: &Band,
        compression: D,
    ) -> Vec<u8> {
        let labels = [first, second].map(|b| b.label.as_deref().unwrap_or_default());
        let data: Vec<f32> = first
            .data
            .iter()
            .zip(&second.data)
            .flat_map(|(a, b)| [*a, *b])
            .collect();

        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            let mut image = encoder
                .new_image_with_compression::<GrayPair32Float, D>(
                    grid.width as u32,
                    grid.height as u32,
                    compression,
                )
                .unwrap();
            image.rows_per_strip(1).unwrap();
            write_georeference(image.encoder(), grid, Some(&band_descriptions_xml(&labels))).unwrap();
            image.write_data(&data).unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_two_band_raster_in_both_orders() {
        let grid = GridSpec::new(2, 1, 10.0, 5.0, 0.5, 0.5);
        let sfed = labelled("SFED", &[0.1, 0.2]);
        let mfed = labelled("MFED", &[0.7, f32::NAN]);

        let raster = decode_geotiff(&encode_geotiff_bands(&grid, &[mfed.clone(), sfed.clone()]).unwrap()).unwrap();
        assert!(raster.grid.is_aligned_with(&grid));
        assert_eq!(raster.labels(), vec![Some("MFED"), Some("SFED")]);
        assert_eq!(crate::select_flood_band(&raster.labels()), Some(1));
        assert_eq!(raster.band(1).unwrap(), &[0.1, 0.2]);
        assert_eq!(raster.band(0).unwrap()[0], 0.7);
        assert!(raster.band(0).unwrap()[1].is_nan());

        let raster = decode_geotiff(&encode_geotiff_bands(&grid, &[sfed, mfed]).unwrap()).unwrap();
        assert_eq!(raster.labels(), vec![Some("SFED"), Some("MFED")]);
        assert_eq!(crate::select_flood_band(&raster.labels()), Some(0));
        assert_eq!(raster.band(0).unwrap(), &[0.1, 0.2]);
    }

    #[test]
    fn test_two_band_compressed_strips() {
        use tiff::encoder::compression::{Deflate, Lzw};

        let grid = GridSpec::new(3, 4, 0.0, 4.0, 1.0, 1.0);
        let first = labelled("MFED", &(0..12).map(|i| i as f32).collect::<Vec<_>>());
        let second = labelled("SFED", &(0..12).map(|i| i as f32 * 0.05).collect::<Vec<_>>());

        for bytes in [
            two_band_strips(&grid, &first, &second, Deflate::default()),
            two_band_strips(&grid, &first, &second, Lzw),
        ] {
            let raster = decode_geotiff(&bytes).unwrap();
            assert_eq!(raster.band_count(), 2);
            assert_eq!(raster.band(0).unwrap(), first.data.as_slice());
            assert_eq!(raster.band(1).unwrap(), second.data.as_slice());
        }
    }

    #[test]
    fn test_encode_rejects_three_bands() {
        let grid = GridSpec::new(1, 1, 0.0, 1.0, 1.0, 1.0);
        let band = labelled("SFED", &[1.0]);
        assert!(matches!(
            encode_geotiff_bands(&grid, &[band.clone(), band.clone(), band]),
            Err(RasterError::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn test_encode_rejects_wrong_length() {
        let grid = GridSpec::new(2, 2, 0.0, 2.0, 1.0, 1.0);
        assert!(encode_geotiff(&grid, &[1.0; 3], None).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_geotiff(b"not a tiff").is_err());
    }

    #[test]
    fn test_parse_nodata() {
        assert_eq!(parse_nodata("-99999"), Some(-99999.0));
        assert_eq!(parse_nodata("nan\0"), None);
        assert_eq!(parse_nodata("garbage"), None);
    }
}
