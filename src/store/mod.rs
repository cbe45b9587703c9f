//! The patch store: numbered patch files plus a sidecar CSV log.
//!
//! A store owns one output directory. Each saved patch becomes
//! `patch_NNNN.fits` (plus an optional `patch_NNNN.png` preview) and one row of
//! the sidecar CSV, and is appended to the store's in-memory list. Memory,
//! sidecar and files are kept in step by every operation.
//!
//! The next patch id is never persisted. [`PatchStore::initialize`] recovers it
//! by scanning the directory for patch files, so a crash between writing a
//! file and bumping the counter can never lead to an id being reused.
//!
//! ```no_run
//! use fits_slicer::{ImageFrame, PatchStore, Selection, SlicerConfig};
//!
//! let frame = ImageFrame::open("m31.fits").unwrap();
//! let mut store = PatchStore::initialize(SlicerConfig::with_out_dir("cuts")).unwrap();
//! if let Some(saved) = store
//!     .save_patch(&frame, Selection::new(10.2, 10.8, 30.1, 50.9), None)
//!     .unwrap()
//! {
//!     println!("saved {} at {:?}", saved.patch.patch_id(), saved.patch.centroid);
//! }
//! store.undo_last().unwrap();
//! ```

pub mod sidecar;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::centroid::{resolve, SkyCentroid};
use crate::config::SlicerConfig;
use crate::cutout::{cut, Cutout, CutoutError};
use crate::fits::{write_fits, FitsError, FitsImage};
use crate::frame::ImageFrame;
use crate::geometry::{validate, PixelRect, Rejection, Selection};
use crate::preview::{write_preview, PreviewError};

const PATCH_PREFIX: &str = "patch_";
const FITS_EXT: &str = "fits";
const PREVIEW_EXT: &str = "png";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{0}' exists and is not a directory")]
    NotADirectory(PathBuf),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("sidecar CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write patch image: {0}")]
    Fits(#[from] FitsError),
    #[error("no patch with id {0:04}")]
    UnknownPatch(u32),
}

/// Why a selection produced no cutout.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("selection rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("cutout failed: {0}")]
    Cutout(#[from] CutoutError),
}

/// One saved patch, as recorded in the sidecar.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Sequential id, 1-based.
    pub id: u32,
    /// UTC save time, `YYYY-MM-DDTHH:MM:SS`.
    pub timestamp: String,
    /// Path of the frame the patch was cut from.
    pub source: PathBuf,
    /// Frame pixel bounds of the patch.
    pub rect: PixelRect,
    pub width: u32,
    pub height: u32,
    /// Sky position of the patch center.
    pub centroid: SkyCentroid,
    pub label: Option<String>,
}

impl Patch {
    /// Zero-padded display id: `0001`, `0042`, `12345`.
    pub fn patch_id(&self) -> String {
        format!("{:04}", self.id)
    }
}

/// What happened to the preview raster of a saved patch.
#[derive(Debug)]
pub enum PreviewStatus {
    Written(PathBuf),
    /// Previews are turned off in the configuration.
    Disabled,
    /// The patch was saved but its preview could not be written.
    Failed(PreviewError),
}

/// Result of a successful [`PatchStore::save_patch`].
#[derive(Debug)]
pub struct SavedPatch {
    pub patch: Patch,
    pub fits_path: PathBuf,
    pub preview: PreviewStatus,
}

/// Parse the id out of a `patch_NNNN.<ext>` file name.
fn patch_file_id(name: &str, ext: &str) -> Option<u32> {
    let digits = name
        .strip_prefix(PATCH_PREFIX)?
        .strip_suffix(ext)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Best-effort removal on a rollback or cleanup path; failures are logged.
fn discard(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        warn!("Could not remove {}: {}", path.display(), e);
    }
}

fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub struct PatchStore {
    config: SlicerConfig,
    sidecar_path: PathBuf,
    patches: Vec<Patch>,
    next_id: u32,
}

impl PatchStore {
    /// Open (creating if needed) the output directory named by `config`.
    ///
    /// Creates the sidecar with its header row if absent and sets the next id
    /// to one past the highest `patch_NNNN.fits` already in the directory.
    pub fn initialize(config: SlicerConfig) -> Result<Self, StoreError> {
        let dir = config.out_dir.clone();
        if dir.exists() && !dir.is_dir() {
            return Err(StoreError::NotADirectory(dir));
        }
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let sidecar_path = dir.join(&config.csv_name);
        if sidecar::ensure(&sidecar_path)? {
            debug!("Created sidecar {}", sidecar_path.display());
        }

        let next_id = scan_patch_ids(&dir, FITS_EXT)?
            .into_iter()
            .max()
            .map_or(1, |max| max + 1);
        info!(
            "Patch store at {} (next patch id {:04})",
            dir.display(),
            next_id
        );

        Ok(Self {
            config,
            sidecar_path,
            patches: Vec::new(),
            next_id,
        })
    }

    pub fn config(&self) -> &SlicerConfig {
        &self.config
    }

    pub fn directory(&self) -> &Path {
        &self.config.out_dir
    }

    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar_path
    }

    /// Id the next saved patch will receive.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Patches saved in this session, oldest first.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn fits_path(&self, id: u32) -> PathBuf {
        self.patch_file(id, FITS_EXT)
    }

    pub fn preview_path(&self, id: u32) -> PathBuf {
        self.patch_file(id, PREVIEW_EXT)
    }

    fn patch_file(&self, id: u32, ext: &str) -> PathBuf {
        self.config
            .out_dir
            .join(format!("{}{:04}.{}", PATCH_PREFIX, id, ext))
    }

    /// Id for the next patch, moved past any patch image already on disk.
    fn claim_id(&mut self) -> Result<u32, StoreError> {
        if self.fits_path(self.next_id).exists() {
            let highest = scan_patch_ids(&self.config.out_dir, FITS_EXT)?
                .into_iter()
                .max()
                .unwrap_or(0);
            let next = self.next_id.max(highest + 1);
            warn!(
                "patch_{:04}.{} already exists; next patch id moves to {:04}",
                self.next_id, FITS_EXT, next
            );
            self.next_id = next;
        }
        Ok(self.next_id)
    }

    /// Highest id among the patch images in the directory.
    fn highest_on_disk(&self) -> Option<u32> {
        match scan_patch_ids(&self.config.out_dir, FITS_EXT) {
            Ok(ids) => ids.into_iter().max(),
            Err(e) => {
                warn!("Could not scan {}: {}", self.config.out_dir.display(), e);
                None
            }
        }
    }

    /// Validate a selection and cut it out of `frame`, without touching disk.
    pub fn extract(&self, frame: &ImageFrame, selection: Selection) -> Result<Cutout, ExtractError> {
        let rect = validate(
            selection,
            frame.height(),
            frame.width(),
            self.config.min_size,
        )?;
        Ok(cut(frame, &rect)?)
    }

    /// Cut `selection` out of `frame` and persist it as the next patch.
    ///
    /// Returns `Ok(None)` when the selection is rejected or the cutout fails;
    /// nothing is written in that case. A failed preview does not fail the save.
    /// If the patch image or sidecar row cannot be written, files from this
    /// call are removed and the patch list is left unchanged. An existing
    /// `patch_NNNN.fits` is never overwritten: the id skips past it instead.
    pub fn save_patch(
        &mut self,
        frame: &ImageFrame,
        selection: Selection,
        label: Option<&str>,
    ) -> Result<Option<SavedPatch>, StoreError> {
        let cutout = match self.extract(frame, selection) {
            Ok(c) => c,
            Err(e) => {
                info!("No patch saved: {}", e);
                return Ok(None);
            }
        };

        let id = self.claim_id()?;
        let rect = cutout.bounds;
        let fits_path = self.fits_path(id);

        let mut header = frame.header.clone();
        if let Some(wcs) = &cutout.wcs {
            wcs.write_to(&mut header);
        }
        header.add_history(&format!("Cutout from {} {}", frame.file_name(), rect));

        let image = FitsImage {
            header,
            axes: vec![cutout.width(), cutout.height()],
            samples: cutout.grid.samples.clone(),
        };
        if let Err(e) = write_fits(&fits_path, &image) {
            discard(&fits_path);
            return Err(e.into());
        }

        let preview = if self.config.png_preview {
            let png_path = self.preview_path(id);
            match write_preview(&png_path, &cutout, self.config.stretch_mode) {
                Ok(()) => PreviewStatus::Written(png_path),
                Err(e) => {
                    warn!("Preview export failed for patch {:04}: {}", id, e);
                    discard(&png_path);
                    PreviewStatus::Failed(e)
                }
            }
        } else {
            PreviewStatus::Disabled
        };

        let patch = Patch {
            id,
            timestamp: timestamp_now(),
            source: frame.path.clone(),
            rect,
            width: rect.width(),
            height: rect.height(),
            centroid: resolve(&cutout),
            label: label.map(str::to_string),
        };

        if let Err(e) = sidecar::append(&self.sidecar_path, &patch) {
            discard(&fits_path);
            if let PreviewStatus::Written(png) = &preview {
                discard(png);
            }
            return Err(e);
        }

        self.patches.push(patch.clone());
        self.next_id += 1;
        info!(
            "Saved patch {}: {}x{} @ {}",
            patch.patch_id(),
            patch.width,
            patch.height,
            patch.rect
        );

        Ok(Some(SavedPatch {
            patch,
            fits_path,
            preview,
        }))
    }

    /// Remove the most recent patch: its sidecar row, its files and its id.
    ///
    /// Returns the removed patch, or `None` if there was nothing to undo. If the
    /// sidecar cannot be rewritten the error is returned and nothing changes.
    /// The next id steps back by one, but never onto a patch image still on disk.
    pub fn undo_last(&mut self) -> Result<Option<Patch>, StoreError> {
        let Some(last) = self.patches.last() else {
            return Ok(None);
        };
        let id = last.id;
        let patch_id = last.patch_id();

        let removed = sidecar::remove_row(&self.sidecar_path, &patch_id)?;
        if removed != 1 {
            warn!(
                "Expected one sidecar row for patch {}, removed {}",
                patch_id, removed
            );
        }

        let patch = self.patches.pop();
        discard(&self.fits_path(id));
        discard(&self.preview_path(id));

        let floor = self.highest_on_disk().map_or(1, |max| max + 1);
        self.next_id = self.next_id.saturating_sub(1).max(floor);
        info!("Undid patch {}", patch_id);
        Ok(patch)
    }

    /// Remove every patch, reset the sidecar to its header and the next id to 1.
    ///
    /// Patch files left in the directory by earlier sessions are removed too,
    /// so numbering can restart at 1 without overwriting anything.
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        for patch in &self.patches {
            remove_if_exists(&self.fits_path(patch.id))?;
            remove_if_exists(&self.preview_path(patch.id))?;
        }
        for ext in [FITS_EXT, PREVIEW_EXT] {
            for id in scan_patch_ids(&self.config.out_dir, ext)? {
                debug!("Removing leftover patch file {:04}.{}", id, ext);
                remove_if_exists(&self.patch_file(id, ext))?;
            }
        }

        sidecar::reset(&self.sidecar_path)?;
        self.patches.clear();
        self.next_id = 1;
        info!("Cleared all patches");
        Ok(())
    }

    /// Change a patch's label in memory and in its sidecar row.
    pub fn update_label(&mut self, id: u32, label: Option<&str>) -> Result<(), StoreError> {
        let patch = self
            .patches
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::UnknownPatch(id))?;
        patch.label = label.map(str::to_string);

        if !sidecar::set_label(&self.sidecar_path, &patch.patch_id(), label)? {
            warn!("Patch {:04} has no sidecar row to relabel", id);
        }
        Ok(())
    }

    /// Replace the in-memory patch list, e.g. from saved project state.
    ///
    /// The next id is left as recovered from the directory.
    pub fn restore(&mut self, patches: Vec<Patch>) {
        debug!("Restored {} patches into store", patches.len());
        self.patches = patches;
    }

    /// Parse the sidecar. Malformed rows are skipped with a warning.
    pub fn read_sidecar(&self) -> Result<Vec<Patch>, StoreError> {
        let records = sidecar::read_records(&self.sidecar_path)?;
        let mut patches = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            match sidecar::parse_record(record) {
                Some(p) => patches.push(p),
                None => warn!(
                    "Skipping malformed sidecar row {} in {}",
                    i + 1,
                    self.sidecar_path.display()
                ),
            }
        }
        Ok(patches)
    }

    /// Ids of sidecar rows whose patch image no longer exists.
    pub fn orphaned_rows(&self) -> Result<Vec<u32>, StoreError> {
        Ok(self
            .read_sidecar()?
            .into_iter()
            .map(|p| p.id)
            .filter(|&id| !self.fits_path(id).exists())
            .collect())
    }
}

/// Ids of every `patch_NNNN.<ext>` file in `dir`.
fn scan_patch_ids(dir: &Path, ext: &str) -> Result<Vec<u32>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if let Some(id) = entry.file_name().to_str().and_then(|n| patch_file_id(n, ext)) {
            ids.push(id);
        }
    }
    Ok(ids)
}
