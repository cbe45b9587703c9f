//! # fits-slicer
//!
//! Cut rectangular **patches** out of 2D astronomical FITS images and keep a
//! consistent, undoable log of them on disk.
//!
//! Each patch is written as a standalone FITS file whose header is a copy of
//! the source header with a world-coordinate transform valid for the patch's
//! own pixel grid, plus a `HISTORY` note recording where it came from. A
//! sidecar CSV carries one row per patch, including the sky position of the
//! patch center.
//!
//! ## Features
//!
//! - **Forgiving selections**: fractional, inverted drag rectangles are rounded
//!   outward to whole pixels, then checked against a minimum size and the frame
//! - **Coordinate-aware cutouts**: the reference pixel is shifted so the patch
//!   maps to the same sky as the frame it came from (TAN and SIN projections)
//! - **Exact samples**: patch data keeps the source's numeric type bit for bit
//! - **Crash-safe numbering**: the next patch id is recovered from the files on
//!   disk, never from a stored counter
//! - **Undo and clear**: the in-memory list, the sidecar and the files stay in step
//! - **Previews**: optional 8-bit PNG previews through a selectable display
//!   stretch (zscale/asinh, linear, log, histogram equalization)
//!
//! ## Example
//!
//! ```no_run
//! use fits_slicer::{PatchSession, SlicerConfig};
//!
//! let config = SlicerConfig {
//!     out_dir: "patches".into(),
//!     min_size: 16,
//!     ..Default::default()
//! };
//! let mut session = PatchSession::open("data/m31.fits", config).unwrap();
//!
//! // Drag corners in pixel coordinates, in any order
//! if let Some(saved) = session.save_patch(30.1, 50.9, 10.2, 10.8, Some("core")).unwrap() {
//!     let p = &saved.patch;
//!     println!(
//!         "patch_{} {}x{} at RA {:?} Dec {:?}",
//!         p.patch_id(),
//!         p.width,
//!         p.height,
//!         p.centroid.ra_deg,
//!         p.centroid.dec_deg
//!     );
//! }
//!
//! session.undo_last_patch().unwrap();
//! ```
//!
//! ## Pixel conventions
//!
//! Public pixel coordinates are 0-based with `x` along `NAXIS1` (columns) and
//! `y` along `NAXIS2` (rows). Rectangles are half-open: `x0..x1`, `y0..y1`.
//! FITS `CRPIXi` keywords stay 1-based in headers.
//!

pub mod centroid;
pub mod config;
pub mod cutout;
pub mod fits;
pub mod frame;
pub mod geometry;
pub mod preview;
pub mod session;
pub mod store;
pub mod stretch;
pub mod wcs;

pub use centroid::{resolve, SkyCentroid};
pub use config::SlicerConfig;
pub use cutout::{cut, Cutout, CutoutError};
pub use fits::{read_fits, write_fits, FitsError, FitsHeader, FitsImage, FitsValue, Samples};
pub use frame::{ImageFrame, SampleGrid};
pub use geometry::{validate, PixelRect, Rejection, Selection};
pub use preview::{write_preview, PreviewError};
pub use session::PatchSession;
pub use store::{ExtractError, Patch, PatchStore, PreviewStatus, SavedPatch, StoreError};
pub use stretch::{normalize, StretchMode};
pub use wcs::{Projection, Wcs, WcsError};

// Sky transforms need 64-bit floats: sub-arcsecond precision at
// degree-scale reference values is beyond f32.
pub type Matrix2 = nalgebra::Matrix2<f64>;
pub type Vector2 = nalgebra::Vector2<f64>;
