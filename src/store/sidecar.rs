//! The sidecar CSV: one row per patch, in creation order.
//!
//! Saving appends a row. Undo, clear and relabel rewrite the whole file.
//! Rows are read as raw byte records so a rewrite can carry rows it does not
//! understand through unchanged; only the row being removed or edited is touched.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{ByteRecord, StringRecord};
use tracing::warn;

use super::{Patch, StoreError};
use crate::centroid::SkyCentroid;
use crate::geometry::PixelRect;

/// Fixed sidecar header row.
pub const HEADER: [&str; 12] = [
    "patch_id",
    "timestamp",
    "fits_path",
    "x0",
    "y0",
    "x1",
    "y1",
    "width",
    "height",
    "ra_deg_cen",
    "dec_deg_cen",
    "label",
];

const LABEL_COLUMN: usize = 11;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Create (or truncate) the sidecar with only its header row.
pub(crate) fn reset(path: &Path) -> Result<(), StoreError> {
    write_records(path, &[])
}

/// Create the sidecar if it does not exist. Returns true if it was created.
pub(crate) fn ensure(path: &Path) -> Result<bool, StoreError> {
    if path.exists() {
        return Ok(false);
    }
    reset(path)?;
    Ok(true)
}

/// Append one patch row.
pub(crate) fn append(path: &Path, patch: &Patch) -> Result<(), StoreError> {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(io_error(path))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(&to_record(patch))?;
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Read every data row, header excluded.
///
/// A first row that is neither the header nor a parseable patch row is taken
/// to be a damaged header and dropped.
pub(crate) fn read_records(path: &Path) -> Result<Vec<ByteRecord>, StoreError> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut records = Vec::new();
    for (i, result) in reader.byte_records().enumerate() {
        let record = result?;
        if i == 0 && !is_header(&record) && parse_record(&record).is_none() {
            warn!("Replacing unrecognised sidecar header in {}", path.display());
            continue;
        }
        if i == 0 && is_header(&record) {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

/// Rewrite the sidecar as the header followed by `records`.
pub(crate) fn write_records(path: &Path, records: &[ByteRecord]) -> Result<(), StoreError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(file);
    writer.write_record(HEADER)?;
    for record in records {
        writer.write_byte_record(record)?;
    }
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Remove every row whose id column is `patch_id`. Returns how many were removed.
pub(crate) fn remove_row(path: &Path, patch_id: &str) -> Result<usize, StoreError> {
    let records = read_records(path)?;
    let before = records.len();
    let kept: Vec<ByteRecord> = records
        .into_iter()
        .filter(|r| r.get(0) != Some(patch_id.as_bytes()))
        .collect();
    let removed = before - kept.len();
    write_records(path, &kept)?;
    Ok(removed)
}

/// Replace the label column of the row whose id column is `patch_id`.
///
/// Returns false if no well-formed row carries that id.
pub(crate) fn set_label(
    path: &Path,
    patch_id: &str,
    label: Option<&str>,
) -> Result<bool, StoreError> {
    let mut records = read_records(path)?;
    let mut found = false;
    for record in records.iter_mut() {
        if record.get(0) != Some(patch_id.as_bytes()) {
            continue;
        }
        if record.len() != HEADER.len() {
            warn!(
                "Sidecar row for patch {} has {} columns; label not updated",
                patch_id,
                record.len()
            );
            continue;
        }
        let mut edited = ByteRecord::new();
        for (i, field) in record.iter().enumerate() {
            if i == LABEL_COLUMN {
                edited.push_field(label.unwrap_or("").as_bytes());
            } else {
                edited.push_field(field);
            }
        }
        *record = edited;
        found = true;
    }
    write_records(path, &records)?;
    Ok(found)
}

fn is_header(record: &ByteRecord) -> bool {
    record.len() == HEADER.len()
        && record
            .iter()
            .zip(HEADER)
            .all(|(field, name)| String::from_utf8_lossy(field).trim() == name)
}

/// Render a patch as a sidecar row.
pub fn to_record(patch: &Patch) -> StringRecord {
    let opt = |v: Option<f64>| v.map(|d| d.to_string()).unwrap_or_default();
    StringRecord::from(vec![
        patch.patch_id(),
        patch.timestamp.clone(),
        patch.source.display().to_string(),
        patch.rect.x0.to_string(),
        patch.rect.y0.to_string(),
        patch.rect.x1.to_string(),
        patch.rect.y1.to_string(),
        patch.width.to_string(),
        patch.height.to_string(),
        opt(patch.centroid.ra_deg),
        opt(patch.centroid.dec_deg),
        patch.label.clone().unwrap_or_default(),
    ])
}

/// Parse a sidecar row. Returns `None` for rows that are not well formed.
pub fn parse_record(record: &ByteRecord) -> Option<Patch> {
    let record = StringRecord::from_byte_record(record.clone()).ok()?;
    if record.len() != HEADER.len() {
        return None;
    }
    let int = |i: usize| record.get(i)?.trim().parse::<u32>().ok();
    let float = |i: usize| -> Option<Option<f64>> {
        let field = record.get(i)?.trim();
        if field.is_empty() {
            Some(None)
        } else {
            field.parse::<f64>().ok().map(Some)
        }
    };

    let rect = PixelRect {
        x0: int(3)?,
        y0: int(4)?,
        x1: int(5)?,
        y1: int(6)?,
    };
    let label = record.get(LABEL_COLUMN)?;
    Some(Patch {
        id: int(0)?,
        timestamp: record.get(1)?.to_string(),
        source: PathBuf::from(record.get(2)?),
        rect,
        width: int(7)?,
        height: int(8)?,
        centroid: SkyCentroid {
            ra_deg: float(9)?,
            dec_deg: float(10)?,
        },
        label: (!label.is_empty()).then(|| label.to_string()),
    })
}
