//! Loaded image frames.
//!
//! An [`ImageFrame`] is the full-resolution 2D grid read from a source file,
//! together with its header and world-coordinate transform. It is read-only
//! once loaded; cutouts copy out of it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::fits::{read_fits, FitsHeader, Samples};
use crate::stretch::{normalize, StretchMode};
use crate::wcs::Wcs;

/// A row-major 2D grid of samples in their stored numeric type.
///
/// Sample `(x, y)` lives at flat index `y * width + x`; `x` is the column
/// (`NAXIS1`) and `y` the row (`NAXIS2`).
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    pub width: usize,
    pub height: usize,
    pub samples: Samples,
}

impl SampleGrid {
    /// Wrap `samples`, checking that they fill a `width × height` grid.
    pub fn new(width: usize, height: usize, samples: Samples) -> Result<Self> {
        anyhow::ensure!(
            samples.len() == width * height,
            "{} samples cannot fill a {}x{} grid",
            samples.len(),
            width,
            height
        );
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Copy the `w × h` window at `(x0, y0)`, keeping the numeric type.
    ///
    /// Returns `None` if the window is not fully inside the grid.
    pub fn crop(&self, x0: usize, y0: usize, w: usize, h: usize) -> Option<SampleGrid> {
        if x0 + w > self.width || y0 + h > self.height {
            return None;
        }
        Some(SampleGrid {
            width: w,
            height: h,
            samples: self.samples.window(self.width, x0, y0, w, h),
        })
    }

    /// Sample at column `x`, row `y`, widened to f64.
    pub fn value_f64(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples.get_f64(y * self.width + x)
    }

    pub fn to_f64(&self) -> Vec<f64> {
        self.samples.to_f64()
    }
}

/// A loaded 2D image with its provenance header and (optional) sky transform.
#[derive(Debug, Clone)]
pub struct ImageFrame {
    pub path: PathBuf,
    pub grid: SampleGrid,
    pub header: FitsHeader,
    /// `None` when the header declares no world axes.
    pub wcs: Option<Wcs>,
}

impl ImageFrame {
    /// Load the first image HDU of a FITS file.
    ///
    /// Fails if the file cannot be parsed or the image is not 2D.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = read_fits(path)
            .with_context(|| format!("Failed to read FITS file {}", path.display()))?;

        anyhow::ensure!(
            image.axes.len() == 2,
            "Only 2D FITS images supported ({} has {} axes)",
            path.display(),
            image.axes.len()
        );

        let (width, height) = (image.axes[0], image.axes[1]);
        let grid = SampleGrid::new(width, height, image.samples)?;
        let wcs = Wcs::from_header(&image.header);

        match &wcs {
            Some(w) if w.has_celestial_frame() => debug!(
                "Loaded {} ({}x{}, BITPIX {}), WCS {} / {}",
                path.display(),
                width,
                height,
                grid.samples.bitpix(),
                w.ctype[0],
                w.ctype[1]
            ),
            _ => info!(
                "Loaded {} ({}x{}) without a usable celestial WCS",
                path.display(),
                width,
                height
            ),
        }

        Ok(Self {
            path: path.to_path_buf(),
            grid,
            header: image.header,
            wcs,
        })
    }

    /// Build a frame from in-memory parts.
    pub fn from_parts(
        path: impl Into<PathBuf>,
        grid: SampleGrid,
        header: FitsHeader,
        wcs: Option<Wcs>,
    ) -> Self {
        Self {
            path: path.into(),
            grid,
            header,
            wcs,
        }
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    /// Source file name without its directory, as recorded in patch history.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Normalized `[0, 1]` display samples for the whole frame, row-major.
    pub fn display(&self, mode: StretchMode) -> Vec<f32> {
        normalize(&self.grid.to_f64(), mode)
    }
}
