//! Patch store behaviour against real files: numbering, undo, clear,
//! restart recovery and sample fidelity.


use std::fs;

use fits_slicer::{read_fits, ImageFrame, PatchStore, PreviewStatus, Samples, Selection, SlicerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_frames::*;

fn open_store(dir: &std::path::Path) -> PatchStore {
    PatchStore::initialize(SlicerConfig::with_out_dir(dir.join("patches"))).unwrap()
}

#[test]
fn test_concrete_selection_scenario() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 100, 100)).unwrap();
    let mut store = open_store(tmp.path());

    let saved = store
        .save_patch(&frame, Selection::new(10.2, 10.8, 30.1, 50.9), None)
        .unwrap()
        .expect("selection should qualify");
    let p = &saved.patch;
    assert_eq!(p.patch_id(), "0001");
    assert_eq!((p.rect.x0, p.rect.y0, p.rect.x1, p.rect.y1), (10, 10, 31, 51));
    assert_eq!((p.width, p.height), (21, 41));

    assert!(store
        .save_patch(&frame, Selection::new(5.0, 5.0, 5.0, 5.0), None)
        .unwrap()
        .is_none());
    assert!(store
        .save_patch(&frame, Selection::new(-5.0, 0.0, 20.0, 20.0), None)
        .unwrap()
        .is_none());
    assert_eq!(store.next_id(), 2);
    assert_eq!(sidecar_rows(store.sidecar_path()), 1);
}

#[test]
fn test_two_saves_then_undo() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 100, 100)).unwrap();
    let mut store = open_store(tmp.path());

    let a = store
        .save_patch(&frame, Selection::new(0.0, 0.0, 20.0, 20.0), None)
        .unwrap()
        .unwrap();
    let b = store
        .save_patch(&frame, Selection::new(40.0, 40.0, 70.0, 60.0), None)
        .unwrap()
        .unwrap();
    assert_eq!(a.patch.patch_id(), "0001");
    assert_eq!(b.patch.patch_id(), "0002");

    let undone = store.undo_last().unwrap().unwrap();
    assert_eq!(undone.patch_id(), "0002");
    assert_eq!(store.next_id(), 2);
    assert_eq!(store.patches().len(), 1);
    assert_eq!(store.patches()[0].patch_id(), "0001");
    assert!(store.fits_path(1).exists());
    assert!(!store.fits_path(2).exists());
    assert!(!store.preview_path(2).exists());

    let rows = store.read_sidecar().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
}

#[test]
fn test_undo_law() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 80, 60)).unwrap();
    let mut store = open_store(tmp.path());
    store
        .save_patch(&frame, Selection::new(1.0, 1.0, 30.0, 30.0), None)
        .unwrap()
        .unwrap();

    let rows_before = sidecar_rows(store.sidecar_path());
    let id_before = store.next_id();
    let saved = store
        .save_patch(&frame, Selection::new(20.0, 10.0, 60.0, 50.0), Some("arm"))
        .unwrap()
        .unwrap();
    assert_eq!(
        matches!(saved.preview, PreviewStatus::Written(_)),
        cfg!(feature = "image")
    );
    assert!(saved.fits_path.exists());

    store.undo_last().unwrap();
    assert_eq!(sidecar_rows(store.sidecar_path()), rows_before);
    assert_eq!(store.next_id(), id_before);
    assert!(!saved.fits_path.exists());
    assert!(!store.preview_path(saved.patch.id).exists());
}

#[test]
fn test_undo_on_empty_store_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let mut store = open_store(tmp.path());
    assert!(store.undo_last().unwrap().is_none());
    assert_eq!(store.next_id(), 1);
    assert_eq!(sidecar_rows(store.sidecar_path()), 0);
}

#[test]
fn test_repeated_undo_pops_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 64, 64)).unwrap();
    let mut store = open_store(tmp.path());
    for i in 0..3 {
        let x = i as f64 * 16.0;
        store
            .save_patch(&frame, Selection::new(x, 0.0, x + 16.0, 16.0), None)
            .unwrap()
            .unwrap();
    }
    let popped: Vec<u32> = (0..4)
        .filter_map(|_| store.undo_last().unwrap())
        .map(|p| p.id)
        .collect();
    assert_eq!(popped, vec![3, 2, 1]);
    assert_eq!(store.next_id(), 1);
    assert_eq!(sidecar_rows(store.sidecar_path()), 0);
}

#[test]
fn test_clear_law() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 100, 100)).unwrap();
    let mut store = open_store(tmp.path());
    for i in 0..5 {
        let x = i as f64 * 18.0;
        store
            .save_patch(&frame, Selection::new(x, 5.0, x + 17.5, 40.0), None)
            .unwrap()
            .unwrap();
    }
    assert_eq!(store.next_id(), 6);

    store.clear_all().unwrap();
    assert_eq!(store.next_id(), 1);
    assert!(store.patches().is_empty());
    let text = fs::read_to_string(store.sidecar_path()).unwrap();
    assert_eq!(
        text,
        "patch_id,timestamp,fits_path,x0,y0,x1,y1,width,height,ra_deg_cen,dec_deg_cen,label\n"
    );
    for id in 1..=5 {
        assert!(!store.fits_path(id).exists());
        assert!(!store.preview_path(id).exists());
    }

    // Numbering restarts cleanly
    let saved = store
        .save_patch(&frame, Selection::new(0.0, 0.0, 16.0, 16.0), None)
        .unwrap()
        .unwrap();
    assert_eq!(saved.patch.patch_id(), "0001");
}

#[test]
fn test_restart_recovers_counter() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 100, 100)).unwrap();
    {
        let mut store = open_store(tmp.path());
        for _ in 0..5 {
            store
                .save_patch(&frame, Selection::new(10.0, 10.0, 40.0, 40.0), None)
                .unwrap()
                .unwrap();
        }
    }

    let mut store = open_store(tmp.path());
    assert_eq!(store.next_id(), 6);
    assert!(store.patches().is_empty());
    assert_eq!(store.read_sidecar().unwrap().len(), 5);

    let saved = store
        .save_patch(&frame, Selection::new(10.0, 10.0, 40.0, 40.0), None)
        .unwrap()
        .unwrap();
    assert_eq!(saved.patch.patch_id(), "0006");
    assert_eq!(sidecar_rows(store.sidecar_path()), 6);
}

#[test]
fn test_restart_after_unrecorded_file() {
    // A crash after writing the image but before the sidecar row still
    // advances the counter past the orphaned file
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("patches");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("patch_0003.fits"), b"partial").unwrap();
    fs::write(dir.join("patch_0001.png"), b"preview only").unwrap();

    let store = open_store(tmp.path());
    assert_eq!(store.next_id(), 4);
}

#[test]
fn test_samples_roundtrip_i16() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 90, 70)).unwrap();
    let mut store = open_store(tmp.path());
    let cutout = store
        .extract(&frame, Selection::new(12.5, 3.0, 47.0, 66.2))
        .unwrap();
    let saved = store
        .save_patch(&frame, Selection::new(12.5, 3.0, 47.0, 66.2), None)
        .unwrap()
        .unwrap();

    let image = read_fits(&saved.fits_path).unwrap();
    assert_eq!(image.axes, vec![cutout.width(), cutout.height()]);
    assert_eq!(image.samples, cutout.grid.samples);
    assert!(matches!(image.samples, Samples::I16(_)));
    assert_eq!(image.header.get_i64("BZERO"), Some(32768));
    assert_eq!(image.header.get_str("OBJECT"), Some("M31"));
    assert_eq!(
        image.header.history(),
        vec![
            "Calibrated with master dark",
            "Cutout from m31.fits x=[12:47) y=[3:67)"
        ]
    );
}

#[test]
fn test_samples_roundtrip_f32_with_nan() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_f32_frame(tmp.path(), "m31.fits", 50, 50)).unwrap();
    let mut store = open_store(tmp.path());
    let saved = store
        .save_patch(&frame, Selection::new(3.0, 4.0, 35.0, 40.0), None)
        .unwrap()
        .unwrap();
    assert_eq!(
        matches!(saved.preview, PreviewStatus::Written(_)),
        cfg!(feature = "image")
    );

    let cutout = frame.grid.crop(3, 4, 32, 36).unwrap();
    let image = read_fits(&saved.fits_path).unwrap();
    match (&image.samples, &cutout.samples) {
        (Samples::F32(read), Samples::F32(expected)) => {
            assert_eq!(read.len(), expected.len());
            assert!(read
                .iter()
                .zip(expected)
                .all(|(a, b)| a.to_bits() == b.to_bits()));
            assert!(read.iter().any(|v| v.is_nan()));
        }
        other => panic!("unexpected sample types {:?}", other),
    }
}

#[test]
fn test_local_wcs_centroid_matches_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 100, 100)).unwrap();
    let mut store = open_store(tmp.path());
    let saved = store
        .save_patch(&frame, Selection::new(20.0, 30.0, 60.0, 50.0), None)
        .unwrap()
        .unwrap();

    // Patch center (20, 10) locally is frame pixel (40, 40)
    let (ra, dec) = frame
        .wcs
        .as_ref()
        .unwrap()
        .pixel_to_world(40.0, 40.0)
        .unwrap();
    let c = saved.patch.centroid;
    assert!((c.ra_deg.unwrap() - ra).abs() < 1e-9);
    assert!((c.dec_deg.unwrap() - dec).abs() < 1e-9);

    // The written header describes the same sky
    let image = read_fits(&saved.fits_path).unwrap();
    let local = fits_slicer::Wcs::from_header(&image.header).unwrap();
    let (ra_l, dec_l) = local.pixel_to_world(20.0, 10.0).unwrap();
    assert!((ra_l - ra).abs() < 1e-9);
    assert!((dec_l - dec).abs() < 1e-9);
}

#[test]
fn test_update_label_rewrites_row_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", 100, 100)).unwrap();
    let mut store = open_store(tmp.path());
    for i in 0..3 {
        let x = i as f64 * 20.0;
        store
            .save_patch(&frame, Selection::new(x, 0.0, x + 20.0, 20.0), Some("star"))
            .unwrap()
            .unwrap();
    }
    let before = store.read_sidecar().unwrap();

    store.update_label(2, Some("galaxy")).unwrap();
    assert_eq!(store.patches()[1].label.as_deref(), Some("galaxy"));

    let after = store.read_sidecar().unwrap();
    assert_eq!(after.len(), 3);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    let mut expected = before[1].clone();
    expected.label = Some("galaxy".to_string());
    assert_eq!(after[1], expected);

    store.update_label(2, None).unwrap();
    assert_eq!(store.read_sidecar().unwrap()[1].label, None);
}

#[test]
fn test_frame_without_wcs_leaves_coordinates_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let samples = Samples::U8((0..40 * 40).map(|v| (v % 256) as u8).collect());
    let path = write_frame(
        tmp.path(),
        "plain.fits",
        40,
        40,
        samples,
        fits_slicer::FitsHeader::new(),
    );
    let frame = ImageFrame::open(path).unwrap();
    let mut store = open_store(tmp.path());
    let saved = store
        .save_patch(&frame, Selection::new(0.0, 0.0, 20.0, 20.0), None)
        .unwrap()
        .unwrap();
    assert!(!saved.patch.centroid.is_resolved());

    let text = fs::read_to_string(store.sidecar_path()).unwrap();
    let row = text.lines().nth(1).unwrap();
    assert!(row.ends_with(",20,20,,,"), "row = {}", row);
}

#[test]
fn test_random_rectangles_follow_validation() {
    let tmp = tempfile::tempdir().unwrap();
    let (width, height) = (64usize, 48usize);
    let frame = ImageFrame::open(write_i16_frame(tmp.path(), "m31.fits", width, height)).unwrap();
    let mut config = SlicerConfig::with_out_dir(tmp.path().join("patches"));
    config.png_preview = false;
    let mut store = PatchStore::initialize(config).unwrap();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let x0: f64 = rng.random_range(-10.0..74.0);
        let x1: f64 = rng.random_range(-10.0..74.0);
        let y0: f64 = rng.random_range(-10.0..58.0);
        let y1: f64 = rng.random_range(-10.0..58.0);

        let (lo_x, hi_x) = (x0.min(x1).floor(), x0.max(x1).ceil());
        let (lo_y, hi_y) = (y0.min(y1).floor(), y0.max(y1).ceil());
        let big_enough = hi_x - lo_x >= 16.0 && hi_y - lo_y >= 16.0;
        let inside = lo_x >= 0.0 && lo_y >= 0.0 && hi_x <= width as f64 && hi_y <= height as f64;

        let id_before = store.next_id();
        let rows_before = sidecar_rows(store.sidecar_path());
        let saved = store
            .save_patch(&frame, Selection::new(x0, y0, x1, y1), None)
            .unwrap();

        if big_enough && inside {
            let saved = saved.expect("valid rectangle rejected");
            assert_eq!(saved.patch.id, id_before);
            assert_eq!(store.next_id(), id_before + 1);
            assert_eq!(sidecar_rows(store.sidecar_path()), rows_before + 1);
            assert_eq!(saved.patch.width as f64, hi_x - lo_x);
            assert_eq!(saved.patch.height as f64, hi_y - lo_y);
            assert!(saved.fits_path.exists());
        } else {
            assert!(saved.is_none());
            assert_eq!(store.next_id(), id_before);
            assert_eq!(sidecar_rows(store.sidecar_path()), rows_before);
            assert!(!store.fits_path(id_before).exists());
        }
    }
}
