//! Display stretches: raw samples → `[0, 1]` display values.
//!
//! These are used only for human-viewable rendering (the on-screen frame and
//! patch preview rasters). Persisted patch samples are never stretched.
//!
//! # Modes
//!
//! - [`StretchMode::ZScale`]: IRAF zscale interval followed by an asinh stretch
//! - [`StretchMode::Linear`]: min/max interval, linear
//! - [`StretchMode::Log`]: min/max interval, logarithmic
//! - [`StretchMode::HistEq`]: histogram equalization over 256 bins

use std::fmt;
use std::str::FromStr;

/// Selectable display normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StretchMode {
    #[default]
    ZScale,
    Linear,
    Log,
    HistEq,
}

impl FromStr for StretchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zscale" | "z-scale" => Ok(StretchMode::ZScale),
            "linear" => Ok(StretchMode::Linear),
            "log" => Ok(StretchMode::Log),
            "histeq" | "hist. eq." => Ok(StretchMode::HistEq),
            other => anyhow::bail!("unknown stretch mode '{}'", other),
        }
    }
}

impl fmt::Display for StretchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StretchMode::ZScale => "zscale",
            StretchMode::Linear => "linear",
            StretchMode::Log => "log",
            StretchMode::HistEq => "histeq",
        };
        f.write_str(name)
    }
}

// ── Parameters ──────────────────────────────────────────────────────────────

/// Asinh softening; smaller values give a stronger stretch.
const ASINH_A: f64 = 0.1;
/// Log stretch exponent scale.
const LOG_A: f64 = 1000.0;
/// Bins used by histogram equalization.
const HISTEQ_BINS: usize = 256;

/// Tuning for the zscale interval. Defaults follow IRAF.
#[derive(Debug, Clone)]
struct ZScaleParams {
    n_samples: usize,
    contrast: f64,
    max_reject: f64,
    min_npixels: usize,
    krej: f64,
    max_iterations: usize,
}

impl Default for ZScaleParams {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            contrast: 0.25,
            max_reject: 0.5,
            min_npixels: 5,
            krej: 2.5,
            max_iterations: 5,
        }
    }
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Normalize `values` into `[0, 1]` with the given mode.
///
/// Non-finite inputs map to 0. An input with no finite values, or a constant
/// input, maps entirely to 0.
pub fn normalize(values: &[f64], mode: StretchMode) -> Vec<f32> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return vec![0.0; values.len()];
    }

    if mode == StretchMode::HistEq {
        return equalize(values, &finite);
    }

    let (vmin, vmax) = match mode {
        StretchMode::ZScale => zscale_interval(&finite, &ZScaleParams::default()),
        _ => min_max(&finite),
    };
    let span = vmax - vmin;

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() || span <= 0.0 {
                return 0.0;
            }
            let x = ((v - vmin) / span).clamp(0.0, 1.0);
            let y = match mode {
                StretchMode::ZScale => (x / ASINH_A).asinh() / (1.0 / ASINH_A).asinh(),
                StretchMode::Log => (LOG_A * x + 1.0).ln() / (LOG_A + 1.0).ln(),
                _ => x,
            };
            y as f32
        })
        .collect()
}

/// Scale normalized values to 8-bit levels, truncating like an integer cast.
pub fn to_u8(normalized: &[f32]) -> Vec<u8> {
    normalized
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0) as u8)
        .collect()
}

// ── Intervals ───────────────────────────────────────────────────────────────

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// IRAF zscale: fit a line to the sorted sample distribution with iterative
/// sigma rejection, and use its slope (divided by `contrast`) around the
/// median to pick display limits.
fn zscale_interval(values: &[f64], params: &ZScaleParams) -> (f64, f64) {
    let stride = (values.len() / params.n_samples).max(1);
    let mut samples: Vec<f64> = values
        .iter()
        .step_by(stride)
        .take(params.n_samples)
        .copied()
        .collect();
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let npix = samples.len();
    let mut vmin = samples[0];
    let mut vmax = samples[npix - 1];

    let minpix = params
        .min_npixels
        .max((npix as f64 * params.max_reject) as usize);
    let ngrow = ((npix as f64 * 0.01) as usize).max(1);

    let mut badpix = vec![false; npix];
    let mut ngoodpix = npix;
    let mut last_ngoodpix = npix + 1;
    let mut slope = 0.0;

    for _ in 0..params.max_iterations {
        if ngoodpix >= last_ngoodpix || ngoodpix < minpix {
            break;
        }

        let Some((m, b)) = fit_line(&samples, &badpix) else {
            break;
        };
        slope = m;

        let flat: Vec<f64> = samples
            .iter()
            .enumerate()
            .map(|(i, &s)| s - (m * i as f64 + b))
            .collect();
        let good: Vec<f64> = flat
            .iter()
            .zip(&badpix)
            .filter(|(_, &bad)| !bad)
            .map(|(&f, _)| f)
            .collect();
        let threshold = params.krej * std_dev(&good);

        let mut rejected: Vec<bool> = badpix
            .iter()
            .zip(&flat)
            .map(|(&bad, &f)| bad || f < -threshold || f > threshold)
            .collect();
        // Grow rejected pixels so neighbours of outliers are rejected too
        rejected = grow(&rejected, ngrow);
        badpix = rejected;

        last_ngoodpix = ngoodpix;
        ngoodpix = badpix.iter().filter(|&&b| !b).count();
    }

    if ngoodpix >= minpix {
        if params.contrast > 0.0 {
            slope /= params.contrast;
        }
        let center = (npix - 1) / 2;
        let median = median_sorted(&samples);
        vmin = vmin.max(median - (center as f64 - 1.0) * slope);
        vmax = vmax.min(median + (npix - center) as f64 * slope);
    }

    (vmin, vmax)
}

/// Least-squares line through `(i, samples[i])` over unmasked points.
fn fit_line(samples: &[f64], mask: &[bool]) -> Option<(f64, f64)> {
    let (mut n, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (i, (&y, &bad)) in samples.iter().zip(mask).enumerate() {
        if bad {
            continue;
        }
        let x = i as f64;
        n += 1.0;
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
    }
    let denom = n * sxx - sx * sx;
    if n < 2.0 || denom.abs() < 1e-30 {
        return None;
    }
    let slope = (n * sxy - sx * sy) / denom;
    let intercept = (sy - slope * sx) / n;
    Some((slope, intercept))
}

/// Dilate a mask with a centred window of `width` samples.
fn grow(mask: &[bool], width: usize) -> Vec<bool> {
    if width <= 1 {
        return mask.to_vec();
    }
    let before = (width - 1) / 2;
    let after = width - 1 - before;
    let n = mask.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(after);
            let hi = (i + before).min(n - 1);
            mask[lo..=hi].iter().any(|&b| b)
        })
        .collect()
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

// ── Histogram equalization ──────────────────────────────────────────────────

/// Rescale to `[0, 1]`, then map each value through the cumulative histogram,
/// interpolated between bin centres.
fn equalize(values: &[f64], finite: &[f64]) -> Vec<f32> {
    let (lo, hi) = min_max(finite);
    let span = hi - lo;
    if span <= 0.0 {
        return vec![0.0; values.len()];
    }

    let bin_width = 1.0 / HISTEQ_BINS as f64;
    let mut hist = [0u64; HISTEQ_BINS];
    for &v in finite {
        let x = (v - lo) / span;
        let bin = ((x / bin_width) as usize).min(HISTEQ_BINS - 1);
        hist[bin] += 1;
    }

    let total = finite.len() as f64;
    let mut cdf = [0.0f64; HISTEQ_BINS];
    let mut running = 0u64;
    for (c, &h) in cdf.iter_mut().zip(hist.iter()) {
        running += h;
        *c = running as f64 / total;
    }

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                return 0.0;
            }
            let x = (v - lo) / span;
            // Position in units of bins, relative to the first bin centre
            let pos = x / bin_width - 0.5;
            if pos <= 0.0 {
                return cdf[0] as f32;
            }
            let i = pos.floor() as usize;
            if i >= HISTEQ_BINS - 1 {
                return cdf[HISTEQ_BINS - 1] as f32;
            }
            let t = pos - i as f64;
            (cdf[i] + t * (cdf[i + 1] - cdf[i])) as f32
        })
        .collect()
}
