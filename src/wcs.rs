//! Celestial world-coordinate transform for 2D images.
//!
//! Implements the FITS WCS linear transform followed by a zenithal
//! projection (gnomonic `TAN` or orthographic `SIN`), the two projections
//! found in practically every survey cutout and plate-solved camera frame.
//!
//! ## Conventions
//!
//! - `crpix` is stored exactly as in the header: **1-based**.
//! - Public pixel coordinates are **0-based** (sample `(0, 0)` is the centre
//!   of the first pixel), so `pixel = fits_pixel - 1`.
//! - The CD matrix maps pixel offsets to intermediate world coordinates in
//!   degrees.
//!
//! Reference: Calabretta & Greisen (2002), FITS WCS Paper II.

use thiserror::Error;

use crate::fits::{FitsHeader, FitsValue};
use crate::{Matrix2, Vector2};

#[derive(Debug, Error, PartialEq)]
pub enum WcsError {
    #[error("reference pixel is not finite after shifting by ({dx}, {dy})")]
    NonFinite { dx: f64, dy: f64 },
}

// ── Zenithal projections ────────────────────────────────────────────────────

/// Sky projection named by the last three characters of `CTYPEi`.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Gnomonic.
    Tan,
    /// Orthographic / slant orthographic with zero obliquity.
    Sin,
    /// Anything else; kept so the header round-trips, but not evaluated.
    Unsupported(String),
}

impl Projection {
    fn from_code(code: &str) -> Self {
        match code {
            "TAN" => Projection::Tan,
            "SIN" => Projection::Sin,
            other => Projection::Unsupported(other.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Projection::Unsupported(_))
    }
}

/// Forward zenithal projection.
///
/// Projects `(ra, dec)` onto the plane tangent at `(crval_ra, crval_dec)`,
/// returning `(ξ, η)` in radians, or `None` when the point is on the far side.
fn project(
    projection: &Projection,
    ra: f64,
    dec: f64,
    crval_ra: f64,
    crval_dec: f64,
) -> Option<(f64, f64)> {
    let da = ra - crval_ra;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let cos_da = da.cos();

    // cos of the angular distance from the reference point
    let cos_c = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da;
    let xi = cos_dec * da.sin();
    let eta = sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_da;

    match projection {
        Projection::Tan => {
            if cos_c <= 1e-12 {
                return None;
            }
            Some((xi / cos_c, eta / cos_c))
        }
        Projection::Sin => {
            if cos_c < 0.0 {
                return None;
            }
            Some((xi, eta))
        }
        Projection::Unsupported(_) => None,
    }
}

/// Inverse zenithal projection.
///
/// Given plane coordinates `(ξ, η)` in radians at reference point
/// `(crval_ra, crval_dec)`, returns `(ra, dec)` in radians.
fn deproject(
    projection: &Projection,
    xi: f64,
    eta: f64,
    crval_ra: f64,
    crval_dec: f64,
) -> Option<(f64, f64)> {
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let rho_sq = xi * xi + eta * eta;

    if rho_sq < 1e-30 {
        return Some((crval_ra, crval_dec));
    }
    let rho = rho_sq.sqrt();

    // Angular distance from the reference point
    let c = match projection {
        Projection::Tan => rho.atan(),
        Projection::Sin => {
            if rho > 1.0 {
                return None;
            }
            rho.asin()
        }
        Projection::Unsupported(_) => return None,
    };
    let (sin_c, cos_c) = c.sin_cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = crval_ra + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    Some((ra, dec))
}

// ── The transform ───────────────────────────────────────────────────────────

/// Pixel ↔ sky mapping for one image grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Wcs {
    /// Reference pixel `(CRPIX1, CRPIX2)`, 1-based.
    pub crpix: [f64; 2],
    /// Reference world coordinates `(CRVAL1, CRVAL2)` in degrees.
    pub crval: [f64; 2],
    /// Linear transform in degrees per pixel: `[[CD1_1, CD1_2], [CD2_1, CD2_2]]`.
    pub cd: Matrix2,
    /// Axis types, e.g. `("RA---TAN", "DEC--TAN")`.
    pub ctype: [String; 2],
    pub projection: Projection,
    /// Which world axis is right ascension (0 or 1), if the axes are RA/DEC.
    lon_axis: Option<usize>,
}

impl Wcs {
    /// Build an RA/DEC transform with the given projection.
    pub fn new(crpix: [f64; 2], crval: [f64; 2], cd: Matrix2, projection: Projection) -> Self {
        let code = match &projection {
            Projection::Tan => "TAN".to_string(),
            Projection::Sin => "SIN".to_string(),
            Projection::Unsupported(c) => c.clone(),
        };
        Self {
            crpix,
            crval,
            cd,
            ctype: [format!("RA---{}", code), format!("DEC--{}", code)],
            projection,
            lon_axis: Some(0),
        }
    }

    /// Parse the transform from an image header.
    ///
    /// The linear part is taken from `CDi_j` if present, else `PCi_j` scaled by
    /// `CDELTi`, else `CDELTi` with an optional `CROTA2` rotation. Returns
    /// `None` when the header declares no world axes at all.
    pub fn from_header(header: &FitsHeader) -> Option<Self> {
        let ctype1 = header.get_str("CTYPE1")?.trim().to_uppercase();
        let ctype2 = header.get_str("CTYPE2")?.trim().to_uppercase();

        let crpix = [
            header.get_f64("CRPIX1").unwrap_or(0.0),
            header.get_f64("CRPIX2").unwrap_or(0.0),
        ];
        let crval = [
            header.get_f64("CRVAL1").unwrap_or(0.0),
            header.get_f64("CRVAL2").unwrap_or(0.0),
        ];

        let cd_key = |i: usize, j: usize| header.get_f64(&format!("CD{}_{}", i, j));
        let pc_key = |i: usize, j: usize| header.get_f64(&format!("PC{}_{}", i, j));
        let has_cd = (1..=2).any(|i| (1..=2).any(|j| cd_key(i, j).is_some()));
        let has_pc = (1..=2).any(|i| (1..=2).any(|j| pc_key(i, j).is_some()));

        let cdelt = [
            header.get_f64("CDELT1").unwrap_or(1.0),
            header.get_f64("CDELT2").unwrap_or(1.0),
        ];

        let cd = if has_cd {
            Matrix2::new(
                cd_key(1, 1).unwrap_or(0.0),
                cd_key(1, 2).unwrap_or(0.0),
                cd_key(2, 1).unwrap_or(0.0),
                cd_key(2, 2).unwrap_or(0.0),
            )
        } else if has_pc {
            let pc = Matrix2::new(
                pc_key(1, 1).unwrap_or(1.0),
                pc_key(1, 2).unwrap_or(0.0),
                pc_key(2, 1).unwrap_or(0.0),
                pc_key(2, 2).unwrap_or(1.0),
            );
            Matrix2::from_diagonal(&Vector2::new(cdelt[0], cdelt[1])) * pc
        } else {
            let rho = header.get_f64("CROTA2").unwrap_or(0.0).to_radians();
            let (sin_r, cos_r) = rho.sin_cos();
            Matrix2::new(
                cdelt[0] * cos_r,
                -cdelt[1] * sin_r,
                cdelt[0] * sin_r,
                cdelt[1] * cos_r,
            )
        };

        let lon_axis = match (axis_name(&ctype1), axis_name(&ctype2)) {
            ("RA", "DEC") => Some(0),
            ("DEC", "RA") => Some(1),
            _ => None,
        };
        let projection = Projection::from_code(projection_code(&ctype1));

        Some(Self {
            crpix,
            crval,
            cd,
            ctype: [ctype1, ctype2],
            projection,
            lon_axis,
        })
    }

    /// True when the transform maps pixels to RA/DEC with a projection we can evaluate.
    pub fn has_celestial_frame(&self) -> bool {
        self.lon_axis.is_some() && self.projection.is_supported()
    }

    /// Convert a 0-based pixel position to `(ra, dec)` in degrees, RA in `[0, 360)`.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let lon = self.lon_axis?;
        let lat = 1 - lon;

        let offset = Vector2::new(x + 1.0 - self.crpix[0], y + 1.0 - self.crpix[1]);
        let inter = self.cd * offset;

        let (ra, dec) = deproject(
            &self.projection,
            inter[lon].to_radians(),
            inter[lat].to_radians(),
            self.crval[lon].to_radians(),
            self.crval[lat].to_radians(),
        )?;

        let ra_deg = ra.to_degrees().rem_euclid(360.0);
        let dec_deg = dec.to_degrees();
        (ra_deg.is_finite() && dec_deg.is_finite()).then_some((ra_deg, dec_deg))
    }

    /// Convert `(ra, dec)` in degrees to a 0-based pixel position.
    pub fn world_to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let lon = self.lon_axis?;
        let lat = 1 - lon;

        let (xi, eta) = project(
            &self.projection,
            ra.to_radians(),
            dec.to_radians(),
            self.crval[lon].to_radians(),
            self.crval[lat].to_radians(),
        )?;

        let mut inter = Vector2::zeros();
        inter[lon] = xi.to_degrees();
        inter[lat] = eta.to_degrees();

        let cd_inv = self.cd.try_inverse()?;
        let offset = cd_inv * inter;
        Some((
            offset[0] + self.crpix[0] - 1.0,
            offset[1] + self.crpix[1] - 1.0,
        ))
    }

    /// Transform for a sub-grid whose sample `(0, 0)` is sample `(dx, dy)` of this grid.
    pub fn offset(&self, dx: f64, dy: f64) -> Result<Self, WcsError> {
        let crpix = [self.crpix[0] - dx, self.crpix[1] - dy];
        if !crpix.iter().all(|v| v.is_finite()) {
            return Err(WcsError::NonFinite { dx, dy });
        }
        Ok(Self {
            crpix,
            ..self.clone()
        })
    }

    /// Overlay this transform's keywords onto `header`.
    ///
    /// The linear part is always written as a CD matrix; `PCi_j`, `CDELTi` and
    /// `CROTAi` are removed so only one description remains.
    pub fn write_to(&self, header: &mut FitsHeader) {
        for i in 1..=2 {
            header.remove(&format!("CDELT{}", i));
            header.remove(&format!("CROTA{}", i));
            for j in 1..=2 {
                header.remove(&format!("PC{}_{}", i, j));
            }
        }

        header.set("WCSAXES", FitsValue::Integer(2));
        for i in 0..2 {
            let n = i + 1;
            header.set(&format!("CTYPE{}", n), FitsValue::Str(self.ctype[i].clone()));
            if self.lon_axis.is_some() {
                header.set(&format!("CUNIT{}", n), FitsValue::Str("deg".to_string()));
            }
            header.set(&format!("CRPIX{}", n), FitsValue::Float(self.crpix[i]));
            header.set(&format!("CRVAL{}", n), FitsValue::Float(self.crval[i]));
        }
        for i in 0..2 {
            for j in 0..2 {
                header.set(
                    &format!("CD{}_{}", i + 1, j + 1),
                    FitsValue::Float(self.cd[(i, j)]),
                );
            }
        }
    }
}

/// Axis name part of a `CTYPEi` value, e.g. `"RA"` for `"RA---TAN"`.
fn axis_name(ctype: &str) -> &str {
    ctype.get(..4).unwrap_or(ctype).trim_end_matches('-')
}

/// Projection code part of a `CTYPEi` value, e.g. `"TAN"` for `"RA---TAN"`.
fn projection_code(ctype: &str) -> &str {
    ctype.get(5..8).unwrap_or("")
}
