//! Turn a dragged selection into integer pixel bounds.
//!
//! A selection comes from a pointer drag, so its corners may be fractional and
//! in either order. Validation rounds **outward** (floor the low edge, ceil the
//! high edge) so the resulting rectangle always covers every requested pixel.
//!
//! A rejected selection is not an error: it simply does not qualify as a patch.

use std::fmt;

use thiserror::Error;

/// Raw selection corners in pixel units, in any order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Selection {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

/// Integer pixel rectangle, half-open on both axes: columns `x0..x1`, rows `y0..y1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x=[{}:{}) y=[{}:{})", self.x0, self.x1, self.y0, self.y1)
    }
}

/// Why a selection did not become a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("selection has non-finite corners")]
    NonFinite,
    #[error("too small ({width}x{height} < {min_size})")]
    TooSmall {
        width: i64,
        height: i64,
        min_size: u32,
    },
    #[error("rectangle extends outside image bounds")]
    OutOfBounds,
}

/// Validate a selection against a `frame_width × frame_height` image.
///
/// Steps: order each axis, round outward, reject if either side is shorter than
/// `min_size`, then reject if any edge falls outside `[0, W] × [0, H]`.
pub fn validate(
    selection: Selection,
    frame_height: usize,
    frame_width: usize,
    min_size: u32,
) -> Result<PixelRect, Rejection> {
    let Selection { x0, y0, x1, y1 } = selection;
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
        return Err(Rejection::NonFinite);
    }

    let (lo_x, hi_x) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
    let (lo_y, hi_y) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };

    let ix0 = lo_x.floor() as i64;
    let iy0 = lo_y.floor() as i64;
    let ix1 = hi_x.ceil() as i64;
    let iy1 = hi_y.ceil() as i64;

    // Corners far enough out to saturate the casts cannot lie inside any frame
    let (Some(width), Some(height)) = (ix1.checked_sub(ix0), iy1.checked_sub(iy0)) else {
        return Err(Rejection::OutOfBounds);
    };
    if width < min_size as i64 || height < min_size as i64 {
        return Err(Rejection::TooSmall {
            width,
            height,
            min_size,
        });
    }

    if ix0 < 0 || iy0 < 0 || ix1 > frame_width as i64 || iy1 > frame_height as i64 {
        return Err(Rejection::OutOfBounds);
    }

    Ok(PixelRect {
        x0: ix0 as u32,
        y0: iy0 as u32,
        x1: ix1 as u32,
        y1: iy1 as u32,
    })
}
