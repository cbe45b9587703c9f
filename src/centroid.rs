//! Sky position of a cutout's center.
//!
//! The center is taken at `(width / 2, height / 2)` on the cutout's own grid,
//! the same convention the cutout builder uses to place its edges.
//! Coordinate resolution never fails a save: a cutout without a usable
//! celestial transform simply has no sky centroid.

use tracing::debug;

use crate::cutout::Cutout;

/// Right ascension / declination of a cutout center, in degrees.
///
/// Both fields are `None` when the position could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SkyCentroid {
    pub ra_deg: Option<f64>,
    pub dec_deg: Option<f64>,
}

impl SkyCentroid {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            ra_deg: Some(ra_deg),
            dec_deg: Some(dec_deg),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.ra_deg.is_some() && self.dec_deg.is_some()
    }
}

/// Resolve the sky position of the cutout's local center.
pub fn resolve(cutout: &Cutout) -> SkyCentroid {
    let (cx, cy) = cutout.center();
    let Some(wcs) = cutout.wcs.as_ref() else {
        debug!("No WCS on cutout {}; centroid left empty", cutout.bounds);
        return SkyCentroid::default();
    };
    if !wcs.has_celestial_frame() {
        debug!(
            "WCS ({}, {}) has no celestial frame; centroid left empty",
            wcs.ctype[0], wcs.ctype[1]
        );
        return SkyCentroid::default();
    }

    match wcs.pixel_to_world(cx, cy) {
        Some((ra, dec)) => SkyCentroid::new(ra, dec),
        None => {
            debug!("Center ({}, {}) did not resolve to sky coordinates", cx, cy);
            SkyCentroid::default()
        }
    }
}
