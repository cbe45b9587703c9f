//! Coordinate-aware cutouts.
//!
//! A cutout is requested as a center and an extent, the way an interactive
//! selection is described. The sub-array edges are reconstructed from those
//! (`ceil(center ∓ extent/2)` on each axis), clipped to the frame, and the
//! frame's transform is shifted so that the cutout's own sample `(0, 0)` maps
//! to the same sky position it had in the full frame.

use thiserror::Error;
use tracing::debug;

use crate::frame::{ImageFrame, SampleGrid};
use crate::geometry::PixelRect;
use crate::wcs::{Wcs, WcsError};

#[derive(Debug, Error)]
pub enum CutoutError {
    #[error("degenerate cutout extent {width}x{height}")]
    DegenerateExtent { width: f64, height: f64 },
    #[error("cutout at ({cx}, {cy}) does not overlap the {width}x{height} frame")]
    NoOverlap {
        cx: f64,
        cy: f64,
        width: usize,
        height: usize,
    },
    #[error("cannot slice world transform: {0}")]
    Wcs(#[from] WcsError),
}

/// A sub-grid of a frame with its local transform.
#[derive(Debug, Clone)]
pub struct Cutout {
    pub grid: SampleGrid,
    /// Transform valid on the cutout's own 0-based grid.
    pub wcs: Option<Wcs>,
    /// Bounds actually extracted, in frame pixels. Smaller than the request
    /// when the request ran past a frame edge.
    pub bounds: PixelRect,
}

impl Cutout {
    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    /// Local pixel center `(width / 2, height / 2)`.
    pub fn center(&self) -> (f64, f64) {
        (self.width() as f64 / 2.0, self.height() as f64 / 2.0)
    }
}

/// Edges `[start, end)` of an extent centred at `center`, clipped to `[0, len)`.
fn axis_edges(center: f64, extent: f64, len: usize) -> Option<(usize, usize)> {
    let start = (center - extent / 2.0).ceil();
    let end = (center + extent / 2.0).ceil();
    if end <= 0.0 || start >= len as f64 {
        return None;
    }
    let start = start.max(0.0) as usize;
    let end = (end as usize).min(len);
    (end > start).then_some((start, end))
}

/// Cut a centred sub-array of `frame` covering `rect`.
pub fn cut(frame: &ImageFrame, rect: &PixelRect) -> Result<Cutout, CutoutError> {
    let width = rect.x1 as f64 - rect.x0 as f64;
    let height = rect.y1 as f64 - rect.y0 as f64;
    if !(width > 0.0 && height > 0.0) {
        return Err(CutoutError::DegenerateExtent { width, height });
    }
    cut_centered(
        frame,
        rect.x0 as f64 + width / 2.0,
        rect.y0 as f64 + height / 2.0,
        width,
        height,
    )
}

/// Cut a `width × height` sub-array centred at `(cx, cy)`, clipping at the frame edges.
pub fn cut_centered(
    frame: &ImageFrame,
    cx: f64,
    cy: f64,
    width: f64,
    height: f64,
) -> Result<Cutout, CutoutError> {
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Err(CutoutError::DegenerateExtent { width, height });
    }

    let no_overlap = || CutoutError::NoOverlap {
        cx,
        cy,
        width: frame.width(),
        height: frame.height(),
    };
    let (x0, x1) = axis_edges(cx, width, frame.width()).ok_or_else(no_overlap)?;
    let (y0, y1) = axis_edges(cy, height, frame.height()).ok_or_else(no_overlap)?;

    let grid = frame
        .grid
        .crop(x0, y0, x1 - x0, y1 - y0)
        .ok_or_else(no_overlap)?;

    let wcs = match &frame.wcs {
        Some(w) => Some(w.offset(x0 as f64, y0 as f64)?),
        None => None,
    };

    let bounds = PixelRect {
        x0: x0 as u32,
        y0: y0 as u32,
        x1: x1 as u32,
        y1: y1 as u32,
    };
    if (bounds.width() as f64) < width || (bounds.height() as f64) < height {
        debug!(
            "Cutout clipped to {} (requested {}x{} at ({}, {}))",
            bounds, width, height, cx, cy
        );
    }

    Ok(Cutout { grid, wcs, bounds })
}
