//! One loaded frame paired with the patch store it exports into.
//!
//! This is the surface an interactive front end drives: it forwards raw drag
//! corners, undo and clear actions, and label edits, and reads back the patch
//! list for overlays and tables.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::SlicerConfig;
use crate::frame::ImageFrame;
use crate::geometry::Selection;
use crate::store::{Patch, PatchStore, SavedPatch};
use crate::stretch::StretchMode;

pub struct PatchSession {
    frame: ImageFrame,
    store: PatchStore,
}

impl PatchSession {
    /// Load `fits_path` and open the store described by `config`.
    ///
    /// Fails if the image cannot be loaded or the output directory is unusable;
    /// no patch operation is possible in either case.
    pub fn open(fits_path: impl AsRef<Path>, config: SlicerConfig) -> Result<Self> {
        let frame = ImageFrame::open(fits_path)?;
        Self::with_frame(frame, config)
    }

    /// Pair an already-loaded frame with a store.
    pub fn with_frame(frame: ImageFrame, config: SlicerConfig) -> Result<Self> {
        let out_dir = config.out_dir.clone();
        let store = PatchStore::initialize(config)
            .with_context(|| format!("Cannot use output directory {}", out_dir.display()))?;
        Ok(Self { frame, store })
    }

    pub fn frame(&self) -> &ImageFrame {
        &self.frame
    }

    pub fn store(&self) -> &PatchStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PatchStore {
        &mut self.store
    }

    /// Patches saved so far, oldest first.
    pub fn patches(&self) -> &[Patch] {
        self.store.patches()
    }

    /// Save the region between two drag corners. `Ok(None)` means the region
    /// did not qualify as a patch.
    pub fn save_patch(
        &mut self,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        label: Option<&str>,
    ) -> Result<Option<SavedPatch>> {
        Ok(self
            .store
            .save_patch(&self.frame, Selection::new(x0, y0, x1, y1), label)?)
    }

    pub fn undo_last_patch(&mut self) -> Result<Option<Patch>> {
        Ok(self.store.undo_last()?)
    }

    pub fn clear_all_patches(&mut self) -> Result<()> {
        Ok(self.store.clear_all()?)
    }

    pub fn update_label(&mut self, id: u32, label: Option<&str>) -> Result<()> {
        Ok(self.store.update_label(id, label)?)
    }

    /// Normalized display samples of the loaded frame.
    pub fn display_image(&self, mode: StretchMode) -> Vec<f32> {
        self.frame.display(mode)
    }
}
