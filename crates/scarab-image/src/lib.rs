// Author: Lukas Bower
// Purpose: Transcode arbitrary raster images into the fixed SCARAB RGB565A8 artifact format.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Transcodes arbitrary raster images into the fixed SCARAB artifact format
//! the embedded display expects: a 16-byte header followed by a planar
//! RGB565 block and an 8-bit alpha block, with a CRC32 trailer computed
//! over the whole artifact (transmitted out of band in `IMG_END`, never
//! stored in the file itself).
//!
//! The transcoder never upscales a source image past the device's
//! 240×240 canvas; smaller sources are centered on a fully transparent
//! canvas rather than stretched.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use thiserror::Error;

/// Canvas width/height the device expects, in pixels.
pub const CANVAS_SIZE: u32 = 240;
/// Pixel format tag written into the header (`RGB565A8`).
pub const FORMAT_RGB565A8: u8 = 1;
/// Header version written into the artifact.
pub const HEADER_VERSION: u8 = 1;
/// Size of the header, in bytes.
pub const HEADER_LEN: usize = 16;
/// Size of the RGB565 plane, in bytes (2 bytes/pixel).
pub const RGB_PLANE_LEN: usize = (CANVAS_SIZE * CANVAS_SIZE * 2) as usize;
/// Size of the alpha plane, in bytes (1 byte/pixel).
pub const ALPHA_PLANE_LEN: usize = (CANVAS_SIZE * CANVAS_SIZE) as usize;
/// `data_size` header field: the combined size of both planes.
pub const DATA_SIZE: u32 = (RGB_PLANE_LEN + ALPHA_PLANE_LEN) as u32;
/// Total artifact length: header + both planes.
pub const ARTIFACT_LEN: usize = HEADER_LEN + RGB_PLANE_LEN + ALPHA_PLANE_LEN;

/// Magic bytes stored at offset 0: `"SCAR"` read as a little-endian 32-bit
/// word and re-serialized little-endian, which comes out byte-reversed
/// from the ASCII string itself.
const MAGIC: [u8; 4] = [0x52, 0x41, 0x43, 0x53];

/// Errors raised while transcoding a source image.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The `image` crate could not decode the source bytes.
    #[error("image decode failed: {0}")]
    ImageDecodeFailed(#[from] image::ImageError),
    /// The source path could not be read from disk.
    #[error("failed to read image file {path}: {source}")]
    Io {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A finished SCARAB artifact: the full byte buffer plus its CRC32, ready
/// for [`scarab_upload`](https://docs.rs/scarab-upload) (the CRC is sent
/// out of band in `IMG_END`, never embedded in the file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Vec<u8>,
    crc32: u32,
}

impl Artifact {
    /// The full artifact byte buffer (header + RGB565 plane + alpha plane).
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the artifact, returning its owned byte buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// CRC32 (IEEE, same polynomial as the identity hash) over the full
    /// artifact, including the header.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// The CRC32 rendered as 8 uppercase hex digits, as transmitted in
    /// `IMG_END:<hex>`.
    #[must_use]
    pub fn crc32_hex(&self) -> String {
        format!("{:08X}", self.crc32)
    }
}

/// Decode `bytes` and transcode to a SCARAB artifact.
pub fn transcode_bytes(bytes: &[u8]) -> Result<Artifact, TranscodeError> {
    let decoded = image::load_from_memory(bytes)?;
    Ok(transcode_image(&decoded))
}

/// Decode the image file at `path` and transcode to a SCARAB artifact.
pub fn transcode_path(path: impl AsRef<std::path::Path>) -> Result<Artifact, TranscodeError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| TranscodeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    transcode_bytes(&bytes)
}

/// Resize (no upscale) and composite a decoded image onto the canvas,
/// then encode it as a SCARAB artifact. Exposed separately from
/// [`transcode_bytes`] so callers that already hold a `DynamicImage`
/// (e.g. from a settings-dialog preview) can skip decoding twice.
#[must_use]
pub fn transcode_image(source: &DynamicImage) -> Artifact {
    let canvas = compose_canvas(source);
    encode_canvas(&canvas)
}

fn compose_canvas(source: &DynamicImage) -> RgbaImage {
    let (sw, sh) = source.dimensions();
    let rgba = source.to_rgba8();

    let fitted = if sw <= CANVAS_SIZE && sh <= CANVAS_SIZE {
        rgba
    } else {
        let scale = (CANVAS_SIZE as f64 / sw as f64).min(CANVAS_SIZE as f64 / sh as f64);
        let new_w = ((sw as f64 * scale).floor() as u32).max(1);
        let new_h = ((sh as f64 * scale).floor() as u32).max(1);
        image::imageops::resize(&rgba, new_w, new_h, FilterType::CatmullRom)
    };

    let (fw, fh) = fitted.dimensions();
    let mut canvas = RgbaImage::from_pixel(CANVAS_SIZE, CANVAS_SIZE, image::Rgba([0, 0, 0, 0]));
    let offset_x = (CANVAS_SIZE - fw) / 2;
    let offset_y = (CANVAS_SIZE - fh) / 2;
    image::imageops::overlay(&mut canvas, &fitted, offset_x as i64, offset_y as i64);
    canvas
}

fn encode_canvas(canvas: &RgbaImage) -> Artifact {
    let mut bytes = Vec::with_capacity(ARTIFACT_LEN);
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&(CANVAS_SIZE as u16).to_le_bytes());
    bytes.extend_from_slice(&(CANVAS_SIZE as u16).to_le_bytes());
    bytes.push(FORMAT_RGB565A8);
    bytes.push(HEADER_VERSION);
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&DATA_SIZE.to_le_bytes());
    debug_assert_eq!(bytes.len(), HEADER_LEN);

    let mut alpha_plane = Vec::with_capacity(ALPHA_PLANE_LEN);
    for pixel in canvas.pixels() {
        let [r, g, b, a] = pixel.0;
        let rgb565 = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
        bytes.extend_from_slice(&rgb565.to_le_bytes());
        alpha_plane.push(a);
    }
    bytes.extend_from_slice(&alpha_plane);

    debug_assert_eq!(bytes.len(), ARTIFACT_LEN);
    let crc32 = crc32fast::hash(&bytes);
    Artifact { bytes, crc32 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn artifact_size_is_fixed() {
        let artifact = transcode_image(&solid(100, 50, [255, 0, 0, 255]));
        assert_eq!(artifact.bytes().len(), 172_816);
    }

    #[test]
    fn header_layout_matches_expected_fields() {
        let artifact = transcode_image(&solid(240, 240, [0, 0, 0, 255]));
        let bytes = artifact.bytes();
        assert_eq!(&bytes[0..4], &[0x52, 0x41, 0x43, 0x53]);
        assert_eq!(&bytes[4..6], &[0xF0, 0x00]);
        assert_eq!(&bytes[6..8], &[0xF0, 0x00]);
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[9], 1);
        assert_eq!(&bytes[12..16], &[0x00, 0xA3, 0x02, 0x00]);
    }

    #[test]
    fn pixel_encoding_packs_rgb565_and_keeps_alpha() {
        let artifact = transcode_image(&solid(240, 240, [0xFF, 0x80, 0x10, 0x77]));
        let expected = ((0xFFu16 >> 3) << 11) | ((0x80u16 >> 2) << 5) | (0x10u16 >> 3);
        let rgb_bytes = &artifact.bytes()[16..18];
        assert_eq!(u16::from_le_bytes([rgb_bytes[0], rgb_bytes[1]]), expected);
        let alpha_offset = HEADER_LEN + RGB_PLANE_LEN;
        assert_eq!(artifact.bytes()[alpha_offset], 0x77);
    }

    #[test]
    fn small_sprite_centers_without_upscale() {
        let artifact = transcode_image(&solid(100, 50, [10, 20, 30, 255]));
        let bytes = artifact.bytes();
        let alpha_start = HEADER_LEN + RGB_PLANE_LEN;

        for y in 0..CANVAS_SIZE {
            for x in 0..CANVAS_SIZE {
                let idx = alpha_start + (y * CANVAS_SIZE + x) as usize;
                let inside = (70..170).contains(&x) && (95..145).contains(&y);
                let alpha = bytes[idx];
                if inside {
                    assert_eq!(alpha, 255, "expected opaque at ({x},{y})");
                } else {
                    assert_eq!(alpha, 0, "expected transparent at ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn oversized_source_is_downscaled_not_cropped() {
        let artifact = transcode_image(&solid(480, 240, [1, 2, 3, 255]));
        assert_eq!(artifact.bytes().len(), ARTIFACT_LEN);
        let alpha_start = HEADER_LEN + RGB_PLANE_LEN;
        // 480x240 scales to 240x120, centered with a transparent border top/bottom.
        let top_border_idx = alpha_start; // (0,0)
        assert_eq!(artifact.bytes()[top_border_idx], 0);
        let middle_idx = alpha_start + (120 * CANVAS_SIZE + 120) as usize;
        assert_eq!(artifact.bytes()[middle_idx], 255);
    }

    #[test]
    fn crc_is_deterministic() {
        let a = transcode_image(&solid(240, 240, [5, 6, 7, 255]));
        let b = transcode_image(&solid(240, 240, [5, 6, 7, 255]));
        assert_eq!(a.crc32(), b.crc32());
        assert_eq!(a.crc32_hex().len(), 8);
        assert!(a.crc32_hex().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
