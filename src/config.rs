//! Patch extraction settings.

use std::path::PathBuf;

use crate::stretch::StretchMode;

/// Configuration for a [`PatchStore`](crate::store::PatchStore).
///
/// Passed by value into the store at initialization; nothing reads it from
/// global state.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicerConfig {
    /// Directory that holds patch files and the sidecar CSV.
    /// Created if it does not exist.
    /// Default: `patches`
    pub out_dir: PathBuf,

    /// File name of the sidecar CSV inside `out_dir`.
    /// Default: `patches.csv`
    pub csv_name: String,

    /// Minimum patch side length in pixels. Selections narrower or shorter
    /// than this (after outward rounding) are ignored.
    /// Default: 16
    pub min_size: u32,

    /// Whether to write a PNG preview next to each patch.
    /// Preview failures never block the patch itself.
    /// Default: true
    pub png_preview: bool,

    /// Display stretch used for preview rasters.
    /// Default: [`StretchMode::ZScale`]
    pub stretch_mode: StretchMode,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("patches"),
            csv_name: "patches.csv".to_string(),
            min_size: 16,
            png_preview: true,
            stretch_mode: StretchMode::ZScale,
        }
    }
}

impl SlicerConfig {
    /// Default settings writing into `out_dir`.
    pub fn with_out_dir(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SlicerConfig::default();
        assert_eq!(config.out_dir, PathBuf::from("patches"));
        assert_eq!(config.csv_name, "patches.csv");
        assert_eq!(config.min_size, 16);
        assert!(config.png_preview);
        assert_eq!(config.stretch_mode, StretchMode::ZScale);
    }

    #[test]
    fn test_with_out_dir_keeps_defaults() {
        let config = SlicerConfig::with_out_dir("/tmp/cuts");
        assert_eq!(config.out_dir, PathBuf::from("/tmp/cuts"));
        assert_eq!(config.min_size, 16);
    }
}
