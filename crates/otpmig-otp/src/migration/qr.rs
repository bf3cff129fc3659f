//! QR rendering behind a small trait, so callers that only need a PNG
//! (the CLI, the live server) never touch `qrcode` or `image` directly.

use std::path::Path;

use image::{GrayImage, Luma};
use qrcode::QrCode;

use crate::migration::codec::encode_entry_uri;
use crate::migration::types::*;

/// Module size in pixels.
const MODULE_PX: u32 = 8;
/// Quiet-zone border in modules.
const QUIET_ZONE: u32 = 4;

/// Turns text into an image blob.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u8>, MigrationError>;
}

/// Black-on-white PNG renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngQrEncoder {
    pub module_px: u32,
}

impl Default for PngQrEncoder {
    fn default() -> Self {
        Self { module_px: MODULE_PX }
    }
}

fn qr_err(what: &str, e: impl std::fmt::Display) -> MigrationError {
    MigrationError::new(MigrationErrorKind::QrEncodeFailed, format!("{}: {}", what, e))
}

impl QrEncoder for PngQrEncoder {
    fn encode(&self, text: &str) -> Result<Vec<u8>, MigrationError> {
        let code = QrCode::new(text.as_bytes()).map_err(|e| qr_err("QR encode error", e))?;

        let px = self.module_px.max(1);
        let matrix = code.to_colors();
        let width = code.width() as u32;
        let img_size = (width + QUIET_ZONE * 2) * px;

        let mut img = GrayImage::from_pixel(img_size, img_size, Luma([255u8]));
        for (i, color) in matrix.iter().enumerate() {
            if *color != qrcode::Color::Dark {
                continue;
            }
            let x = (i as u32 % width + QUIET_ZONE) * px;
            let y = (i as u32 / width + QUIET_ZONE) * px;
            for dy in 0..px {
                for dx in 0..px {
                    img.put_pixel(x + dx, y + dy, Luma([0u8]));
                }
            }
        }

        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img_size,
            img_size,
            image::ExtendedColorType::L8,
        )
        .map_err(|e| qr_err("PNG encode error", e))?;

        Ok(buf)
    }
}

/// Render an entry's credential URI.
pub fn entry_png(encoder: &dyn QrEncoder, entry: &OtpEntry) -> Result<Vec<u8>, MigrationError> {
    encoder.encode(&encode_entry_uri(entry))
}

/// Render `text` and write it to `path`.
pub fn write_png(encoder: &dyn QrEncoder, text: &str, path: &Path) -> Result<(), MigrationError> {
    let png = encoder.encode(text)?;
    std::fs::write(path, png)
        .map_err(|e| MigrationError::from(e).with_detail(path.display().to_string()))
}
