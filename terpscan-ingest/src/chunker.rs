//! Image chunker
//!
//! Splits tall menu screenshots into overlapping vertical bands so the
//! vision model sees each band at full resolution instead of a downsampled
//! whole.
//!
//! Never fails: any decode or encode problem yields the original image as a
//! single segment.

use crate::types::ImageSegment;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use terpscan_common::config::ChunkingSettings;
use tracing::{debug, warn};

/// Fallback MIME type when the format cannot be sniffed
const DEFAULT_MIME: &str = "image/jpeg";

/// Vertical band `[start, start + height)` in source rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub start: u32,
    pub height: u32,
}

impl Band {
    pub fn end(&self) -> u32 {
        self.start + self.height
    }
}

/// Plan the bands for an image of `height` rows
///
/// Each band is `max_chunk_height` tall and starts `max_chunk_height - overlap`
/// rows after the previous one, so adjacent bands share exactly `overlap`
/// rows. The last band ends at `height` and may be shorter.
///
/// Returns `None` when the settings cannot produce forward progress.
pub fn plan_bands(height: u32, max_chunk_height: u32, overlap: u32) -> Option<Vec<Band>> {
    if max_chunk_height == 0 || overlap >= max_chunk_height {
        return None;
    }
    let step = max_chunk_height - overlap;

    let mut bands = Vec::new();
    let mut start = 0u32;
    loop {
        let band_height = max_chunk_height.min(height - start);
        bands.push(Band {
            start,
            height: band_height,
        });
        if start + band_height >= height {
            break;
        }
        start += step;
    }
    Some(bands)
}

/// Split `bytes` into segments per `settings`
///
/// Images no taller than `settings.threshold` come back untouched as a
/// single segment.
pub fn chunk(bytes: &[u8], settings: &ChunkingSettings) -> Vec<ImageSegment> {
    match try_chunk(bytes, settings) {
        Ok(segments) => segments,
        Err(e) => {
            warn!(error = %e, "Image chunking failed, sending original image");
            vec![whole_image(bytes, 0)]
        }
    }
}

fn try_chunk(
    bytes: &[u8],
    settings: &ChunkingSettings,
) -> Result<Vec<ImageSegment>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());

    if height <= settings.threshold {
        debug!(width, height, "Image below chunking threshold");
        return Ok(vec![whole_image(bytes, height)]);
    }

    let Some(bands) = plan_bands(height, settings.max_chunk_height, settings.overlap) else {
        warn!(
            max_chunk_height = settings.max_chunk_height,
            overlap = settings.overlap,
            "Chunk overlap must be smaller than chunk height, sending original image"
        );
        return Ok(vec![whole_image(bytes, height)]);
    };

    debug!(width, height, bands = bands.len(), "Splitting menu image");

    bands
        .iter()
        .map(|band| encode_band(&img, band))
        .collect()
}

fn encode_band(img: &DynamicImage, band: &Band) -> Result<ImageSegment, image::ImageError> {
    let cropped = img.crop_imm(0, band.start, img.width(), band.height);
    let mut out = Cursor::new(Vec::new());
    cropped.write_to(&mut out, ImageFormat::Png)?;

    Ok(ImageSegment {
        bytes: out.into_inner(),
        mime_type: ImageFormat::Png.to_mime_type().to_string(),
        offset_y: band.start,
        height: band.height,
    })
}

/// The untouched image as a single segment
pub fn whole_image(bytes: &[u8], height: u32) -> ImageSegment {
    ImageSegment {
        bytes: bytes.to_vec(),
        mime_type: sniff_mime(bytes),
        offset_y: 0,
        height,
    }
}

/// MIME type of encoded image bytes
pub fn sniff_mime(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| DEFAULT_MIME.to_string())
}
