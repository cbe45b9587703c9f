//! 8-bit preview rasters for saved patches.
//!
//! A preview is a single-channel PNG of the cutout samples pushed through a
//! display stretch. Rows are written in storage order, so sample row 0 is the
//! top row of the PNG.

use std::path::Path;

use thiserror::Error;

use crate::cutout::Cutout;
use crate::stretch::{normalize, to_u8, StretchMode};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to encode preview: {0}")]
    Encode(String),
    #[error("preview support not compiled in (enable the `image` feature)")]
    Unsupported,
    #[error("cannot preview an empty cutout")]
    Empty,
}

/// Normalize a cutout to 8-bit gray levels, row-major.
pub fn render_gray(cutout: &Cutout, mode: StretchMode) -> Result<Vec<u8>, PreviewError> {
    if cutout.grid.is_empty() {
        return Err(PreviewError::Empty);
    }
    Ok(to_u8(&normalize(&cutout.grid.to_f64(), mode)))
}

/// Write the cutout as a grayscale PNG at `path`.
#[cfg(feature = "image")]
pub fn write_preview(path: &Path, cutout: &Cutout, mode: StretchMode) -> Result<(), PreviewError> {
    let pixels = render_gray(cutout, mode)?;
    let img = image::GrayImage::from_raw(cutout.width() as u32, cutout.height() as u32, pixels)
        .ok_or_else(|| PreviewError::Encode("pixel buffer does not match dimensions".into()))?;
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| PreviewError::Encode(e.to_string()))
}

#[cfg(not(feature = "image"))]
pub fn write_preview(
    _path: &Path,
    _cutout: &Cutout,
    _mode: StretchMode,
) -> Result<(), PreviewError> {
    Err(PreviewError::Unsupported)
}
