//! Chunky multi-sample TIFF images.
//!
//! The `tiff` decoder only reads single-sample grey images, so images with
//! more than one sample per pixel are decoded here from their raw strips or
//! tiles. Tags still come from the decoder. Chunks may be uncompressed, LZW
//! or Deflate, with no predictor, the horizontal predictor (integers) or the
//! floating-point predictor (floats).

use std::io::{Read, Seek};

use flate2::read::ZlibDecoder;
use tiff::decoder::Decoder;
use tiff::tags::{CompressionMethod, Predictor, SampleFormat, Tag};
use tracing::debug;

use crate::error::{RasterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn of(bytes: &[u8]) -> Result<Self> {
        match bytes.get(..2) {
            Some(b"II") => Ok(Endian::Little),
            Some(b"MM") => Ok(Endian::Big),
            _ => Err(RasterError::Tiff("missing byte order mark".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleKind {
    Unsigned,
    Signed,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SampleType {
    kind: SampleKind,
    bytes: usize,
}

impl SampleType {
    fn new(format: SampleFormat, bits: u16) -> Result<Self> {
        let kind = match format {
            SampleFormat::Uint => SampleKind::Unsigned,
            SampleFormat::Int => SampleKind::Signed,
            SampleFormat::IEEEFP => SampleKind::Float,
            other => {
                return Err(RasterError::UnsupportedLayout(format!(
                    "sample format {:?}",
                    other
                )))
            }
        };
        match (kind, bits) {
            (SampleKind::Unsigned | SampleKind::Signed, 8 | 16 | 32) | (SampleKind::Float, 32 | 64) => {
                Ok(Self {
                    kind,
                    bytes: usize::from(bits / 8),
                })
            }
            _ => Err(RasterError::UnsupportedLayout(format!(
                "{:?} samples of {} bits",
                kind, bits
            ))),
        }
    }

    fn mask(&self) -> u64 {
        if self.bytes >= 8 {
            u64::MAX
        } else {
            (1u64 << (8 * self.bytes)) - 1
        }
    }

    fn to_f32(self, bits: u64) -> f32 {
        match (self.kind, self.bytes) {
            (SampleKind::Float, 4) => f32::from_bits(bits as u32),
            (SampleKind::Float, _) => f64::from_bits(bits) as f32,
            (SampleKind::Unsigned, _) => bits as f32,
            (SampleKind::Signed, n) => {
                let shift = 64 - 8 * n as u32;
                ((bits << shift) as i64 >> shift) as f32
            }
        }
    }
}

fn read_bits(bytes: &[u8], endian: Endian) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    }
}

/// Position and size of every strip or tile.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChunkLayout {
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl ChunkLayout {
    fn read<R: Read + Seek>(decoder: &mut Decoder<R>, width: usize, height: usize) -> Result<Self> {
        let tile_width = decoder.find_tag_unsigned::<u32>(Tag::TileWidth)?;
        let tile_length = decoder.find_tag_unsigned::<u32>(Tag::TileLength)?;

        let (chunk_width, chunk_height, offsets_tag, counts_tag) = match (tile_width, tile_length) {
            (Some(tw), Some(tl)) => (tw as usize, tl as usize, Tag::TileOffsets, Tag::TileByteCounts),
            _ => {
                let rows = decoder
                    .find_tag_unsigned::<u32>(Tag::RowsPerStrip)?
                    .map_or(height, |r| (r as usize).min(height));
                (width, rows, Tag::StripOffsets, Tag::StripByteCounts)
            }
        };
        if chunk_width == 0 || chunk_height == 0 {
            return Err(RasterError::Tiff("zero-sized chunks".to_string()));
        }

        let offsets = decoder
            .find_tag_unsigned_vec::<u64>(offsets_tag)?
            .ok_or_else(|| RasterError::Tiff("no chunk offsets".to_string()))?;
        let byte_counts = decoder
            .find_tag_unsigned_vec::<u64>(counts_tag)?
            .ok_or_else(|| RasterError::Tiff("no chunk byte counts".to_string()))?;

        let layout = Self {
            chunk_width,
            chunk_height,
            chunks_across: width.div_ceil(chunk_width),
            offsets,
            byte_counts,
        };
        let expected = layout.chunks_across * height.div_ceil(chunk_height);
        if layout.offsets.len() < expected || layout.byte_counts.len() < layout.offsets.len() {
            return Err(RasterError::Tiff(format!(
                "expected {} chunks, found {} offsets and {} byte counts",
                expected,
                layout.offsets.len(),
                layout.byte_counts.len()
            )));
        }
        Ok(layout)
    }

    /// Top-left pixel of chunk `index`.
    fn origin(&self, index: usize) -> (usize, usize) {
        (
            (index % self.chunks_across) * self.chunk_width,
            (index / self.chunks_across) * self.chunk_height,
        )
    }
}

fn decompress(method: CompressionMethod, raw: &[u8]) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(raw.to_vec()),
        CompressionMethod::LZW => {
            let mut out = Vec::new();
            weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                .into_vec(&mut out)
                .decode(raw)
                .status
                .map_err(|e| RasterError::Tiff(format!("lzw: {}", e)))?;
            Ok(out)
        }
        CompressionMethod::Deflate | CompressionMethod::OldDeflate => {
            let mut out = Vec::new();
            ZlibDecoder::new(raw).read_to_end(&mut out)?;
            Ok(out)
        }
        other => Err(RasterError::UnsupportedLayout(format!(
            "{:?} compression",
            other
        ))),
    }
}

/// Decode one row of a chunk into `samples_per_row` values.
fn decode_row(
    row: &mut [u8],
    sample: SampleType,
    samples: usize,
    predictor: Predictor,
    endian: Endian,
) -> Result<Vec<f32>> {
    let count = row.len() / sample.bytes;
    match predictor {
        Predictor::None => Ok(row
            .chunks_exact(sample.bytes)
            .map(|b| sample.to_f32(read_bits(b, endian)))
            .collect()),
        Predictor::Horizontal if sample.kind != SampleKind::Float => {
            let mask = sample.mask();
            let mut bits: Vec<u64> = row
                .chunks_exact(sample.bytes)
                .map(|b| read_bits(b, endian))
                .collect();
            for i in samples..bits.len() {
                bits[i] = bits[i].wrapping_add(bits[i - samples]) & mask;
            }
            Ok(bits.into_iter().map(|b| sample.to_f32(b)).collect())
        }
        Predictor::FloatingPoint if sample.kind == SampleKind::Float => {
            for i in samples..row.len() {
                row[i] = row[i].wrapping_add(row[i - samples]);
            }
            // Bytes are stored as planes, most significant first.
            Ok((0..count)
                .map(|i| {
                    let bits = (0..sample.bytes).fold(0u64, |acc, plane| {
                        (acc << 8) | u64::from(row[plane * count + i])
                    });
                    sample.to_f32(bits)
                })
                .collect())
        }
        other => Err(RasterError::UnsupportedLayout(format!(
            "{:?} predictor on {:?} samples",
            other, sample.kind
        ))),
    }
}

/// Read a chunky image with `samples` samples per pixel as pixel-interleaved f32.
pub(crate) fn read_interleaved<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    bytes: &[u8],
    width: usize,
    height: usize,
    samples: usize,
) -> Result<Vec<f32>> {
    let endian = Endian::of(bytes)?;

    let bits = decoder
        .find_tag_unsigned_vec::<u16>(Tag::BitsPerSample)?
        .unwrap_or_else(|| vec![1]);
    let first_bits = bits.first().copied().unwrap_or(1);
    if bits.iter().any(|b| *b != first_bits) {
        return Err(RasterError::UnsupportedLayout(format!(
            "mixed bits per sample {:?}",
            bits
        )));
    }
    let format = decoder
        .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)?
        .and_then(|v| v.first().copied())
        .map_or(SampleFormat::Uint, SampleFormat::from_u16_exhaustive);
    let sample = SampleType::new(format, first_bits)?;

    let compression = decoder
        .find_tag_unsigned::<u16>(Tag::Compression)?
        .map_or(CompressionMethod::None, CompressionMethod::from_u16_exhaustive);
    let predictor = match decoder.find_tag_unsigned::<u16>(Tag::Predictor)? {
        None => Predictor::None,
        Some(value) => Predictor::from_u16(value)
            .ok_or_else(|| RasterError::UnsupportedLayout(format!("predictor {}", value)))?,
    };

    let layout = ChunkLayout::read(decoder, width, height)?;
    let row_bytes = layout.chunk_width * samples * sample.bytes;
    debug!(
        chunks = layout.offsets.len(),
        chunk_width = layout.chunk_width,
        chunk_height = layout.chunk_height,
        ?compression,
        ?predictor,
        "Reading chunky image"
    );

    let mut values = vec![0.0f32; width * height * samples];
    for (index, (&offset, &count)) in layout.offsets.iter().zip(&layout.byte_counts).enumerate() {
        let (col0, row0) = layout.origin(index);
        if row0 >= height {
            break;
        }
        let rows = layout.chunk_height.min(height - row0);
        let cols = layout.chunk_width.min(width - col0);

        let raw = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(count).ok())
            .and_then(|(start, len)| bytes.get(start..start.checked_add(len)?))
            .ok_or_else(|| RasterError::Tiff(format!("chunk {} lies outside the file", index)))?;
        let mut data = decompress(compression, raw)?;
        if data.len() < rows * row_bytes {
            return Err(RasterError::Tiff(format!(
                "chunk {} holds {} bytes, expected {}",
                index,
                data.len(),
                rows * row_bytes
            )));
        }

        for (r, row) in data.chunks_exact_mut(row_bytes).take(rows).enumerate() {
            let decoded = decode_row(row, sample, samples, predictor, endian)?;
            let start = ((row0 + r) * width + col0) * samples;
            values[start..start + cols * samples].copy_from_slice(&decoded[..cols * samples]);
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_respects_byte_order() {
        assert_eq!(read_bits(&[0x01, 0x02], Endian::Little), 0x0201);
        assert_eq!(read_bits(&[0x01, 0x02], Endian::Big), 0x0102);
    }

    #[test]
    fn test_signed_samples_sign_extend() {
        let sample = SampleType::new(SampleFormat::Int, 16).unwrap();
        assert_eq!(sample.to_f32(0xFFFE), -2.0);
        assert_eq!(sample.to_f32(0x0005), 5.0);
    }

    #[test]
    fn test_unsupported_sample_types() {
        assert!(SampleType::new(SampleFormat::IEEEFP, 16).is_err());
        assert!(SampleType::new(SampleFormat::Uint, 64).is_err());
        assert!(SampleType::new(SampleFormat::Void, 8).is_err());
    }

    #[test]
    fn test_horizontal_predictor_accumulates_per_sample() {
        // Two u8 samples per pixel, three pixels: deltas against the previous pixel
        let mut row = vec![10, 100, 1, 5, 2, 250];
        let sample = SampleType::new(SampleFormat::Uint, 8).unwrap();
        let values = decode_row(&mut row, sample, 2, Predictor::Horizontal, Endian::Little).unwrap();
        // Second sample wraps at 8 bits: 105 + 250 = 355 mod 256 = 99
        assert_eq!(values, vec![10.0, 100.0, 11.0, 105.0, 13.0, 99.0]);
    }

    #[test]
    fn test_floating_point_predictor() {
        let expected = [1.5f32, -0.25, 0.1, 2.0];
        let count = expected.len();
        let samples = 2;

        // Encode: split big-endian bytes into planes, then difference with stride `samples`.
        let mut planes = vec![0u8; count * 4];
        for (i, v) in expected.iter().enumerate() {
            for (plane, b) in v.to_bits().to_be_bytes().iter().enumerate() {
                planes[plane * count + i] = *b;
            }
        }
        let mut row = planes.clone();
        for i in samples..row.len() {
            row[i] = planes[i].wrapping_sub(planes[i - samples]);
        }

        let sample = SampleType::new(SampleFormat::IEEEFP, 32).unwrap();
        let values = decode_row(&mut row, sample, samples, Predictor::FloatingPoint, Endian::Little).unwrap();
        assert_eq!(values, expected.to_vec());
    }

    #[test]
    fn test_predictor_mismatch_is_rejected() {
        let sample = SampleType::new(SampleFormat::IEEEFP, 32).unwrap();
        let mut row = vec![0u8; 8];
        assert!(decode_row(&mut row, sample, 2, Predictor::Horizontal, Endian::Little).is_err());
    }

    #[test]
    fn test_tile_origins() {
        let layout = ChunkLayout {
            chunk_width: 16,
            chunk_height: 8,
            chunks_across: 3,
            offsets: vec![0; 6],
            byte_counts: vec![0; 6],
        };
        assert_eq!(layout.origin(0), (0, 0));
        assert_eq!(layout.origin(2), (32, 0));
        assert_eq!(layout.origin(4), (16, 8));
    }

    #[test]
    fn test_lzw_and_deflate_chunks() {
        use std::io::Write;

        let payload: Vec<u8> = (0..64u8).collect();

        let lzw = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(&payload)
            .unwrap();
        assert_eq!(decompress(CompressionMethod::LZW, &lzw).unwrap(), payload);

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(&payload).unwrap();
        let deflated = zlib.finish().unwrap();
        assert_eq!(decompress(CompressionMethod::Deflate, &deflated).unwrap(), payload);

        assert!(decompress(CompressionMethod::PackBits, &payload).is_err());
    }
}
