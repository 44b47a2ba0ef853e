//! Behavioral properties of the catalogue, exercised through the public API.
//!
//! # Tiers
//!
//! - **Batching:** order under chunked creation, progress per chunk, clamping,
//!   interleaved deletes, vanished targets, the async driver
//! - **Drag:** moves keep everyone else in order, copies never remove the
//!   source and carry fresh identities
//! - **Selection:** edits land on the live entity, deletes clear it
//! - **Modifier:** the release timeout resets a stuck duplicate mode

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use catalogue_engine::types::{EntityPatch, EntityRef, FolderKey, IdentityGenerator, ItemId};
use catalogue_engine::{
    BatchState, Catalogue, CatalogueConfig, CatalogueFlow, DragGesture, DropMode, FrameTicker,
    YieldTicker,
};
use parking_lot::Mutex;

// ============================================================================
// Shared test setup
// ============================================================================

const CHUNK: usize = 5;
const CAP: u32 = 200;

/// Honor `RUST_LOG` when a test needs its engine logs.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> CatalogueConfig {
    init_logging();
    CatalogueConfig {
        max_folder_count: CAP,
        max_item_count: CAP,
        folder_chunk_size: CHUNK,
        item_chunk_size: CHUNK,
        ..Default::default()
    }
}

fn settle(catalogue: &Catalogue) {
    while catalogue.tick() > 0 {}
}

fn folder_keys(catalogue: &Catalogue) -> Vec<FolderKey> {
    catalogue.store().snapshot().folders.iter().map(|f| f.key).collect()
}

fn item_ids(catalogue: &Catalogue, key: &FolderKey) -> Vec<ItemId> {
    catalogue
        .store()
        .folder(key)
        .map(|f| f.items.iter().map(|i| i.id).collect())
        .unwrap_or_default()
}

/// Every folder key and item id in the collection.
fn all_identities(catalogue: &Catalogue) -> Vec<String> {
    let snapshot = catalogue.store().snapshot();
    let mut ids = Vec::new();
    for folder in snapshot.folders.iter() {
        ids.push(folder.key.to_string());
        ids.extend(folder.items.iter().map(|i| i.id.to_string()));
    }
    ids
}

/// A catalogue with `folders` folders of `items` items each.
fn populated(folders: i64, items: i64) -> Catalogue {
    let catalogue = Catalogue::new(config());
    catalogue.create_folders(folders);
    settle(&catalogue);
    for key in folder_keys(&catalogue) {
        catalogue.create_items(key, items);
    }
    settle(&catalogue);
    catalogue
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn test_batched_order_matches_creation_order() {
    for n in [1, CHUNK, CHUNK + 1, 10 * CHUNK] {
        let catalogue = Catalogue::new(config());
        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        let _sub = catalogue.store().subscribe(move |snapshot| {
            sink.lock().push(snapshot.folders.iter().map(|f| f.key).collect::<Vec<_>>());
        });

        let handle = catalogue.create_folders(n as i64).unwrap();
        settle(&catalogue);

        let keys = folder_keys(&catalogue);
        assert_eq!(keys.len(), n);
        assert_eq!(handle.committed(), n);
        // Every intermediate state is a prefix of the final order.
        for partial in progress.lock().iter() {
            assert_eq!(partial[..], keys[..partial.len()], "n = {n}");
        }
        assert_eq!(progress.lock().len(), 1 + n.div_ceil(CHUNK));
    }

    let catalogue = Catalogue::new(config());
    assert!(catalogue.create_folders(0).is_none());
    assert_eq!(catalogue.store().folder_count(), 0);
}

#[test]
fn test_progress_published_per_chunk() {
    let catalogue = Catalogue::new(config());
    let lens = Arc::new(Mutex::new(Vec::new()));
    let sink = lens.clone();
    let _sub = catalogue.store().subscribe(move |snapshot| sink.lock().push(snapshot.len()));

    catalogue.create_folders(12);
    settle(&catalogue);

    assert_eq!(*lens.lock(), vec![0, 5, 10, 12]);
}

#[test]
fn test_count_clamping() {
    let catalogue = Catalogue::new(config());
    catalogue.create_folders(-5);
    settle(&catalogue);
    assert_eq!(catalogue.store().folder_count(), 1);

    let catalogue = Catalogue::new(config());
    catalogue.create_folders(999_999);
    settle(&catalogue);
    assert_eq!(catalogue.store().folder_count(), CAP as usize);

    let catalogue = Catalogue::new(config());
    let version = catalogue.store().version();
    assert!(catalogue.create_folders(0).is_none());
    assert_eq!(catalogue.store().version(), version);
}

#[test]
fn test_delete_mid_batch_visible_in_next_progress() {
    let catalogue = Catalogue::new(config());
    catalogue.create_folders(15);
    let doomed = folder_keys(&catalogue)[2];

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    let _sub = catalogue.store().subscribe(move |snapshot| {
        let present = snapshot.folder(&doomed).is_some();
        sink.lock().push((snapshot.change.clone(), present));
    });

    catalogue.delete_folder(doomed);
    catalogue.tick();

    let changes = changes.lock();
    let (change, present) = changes.last().unwrap();
    assert_eq!(*change, Some(CatalogueFlow::FoldersAppended { count: 5, len: 9 }));
    assert!(!present);
}

#[test]
fn test_cancelled_batch_keeps_committed_entities() {
    let catalogue = Catalogue::new(config());
    let handle = catalogue.create_folders(20).unwrap();
    catalogue.tick();
    handle.cancel();
    settle(&catalogue);

    assert_eq!(handle.state(), BatchState::Cancelled);
    assert_eq!(catalogue.store().folder_count(), 10);
}

#[test]
fn test_subscriber_cancels_all_on_progress() {
    let catalogue = Catalogue::new(config());
    let scheduler = catalogue.store().scheduler().clone();
    let pending_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = pending_seen.clone();
    let _sub = catalogue.store().subscribe(move |snapshot| {
        if snapshot.len() == 2 * CHUNK {
            sink.lock().push(scheduler.pending());
            scheduler.cancel_all();
        }
    });

    let handle = catalogue.create_folders(50).unwrap();
    settle(&catalogue);

    assert_eq!(*pending_seen.lock(), vec![1]);
    assert_eq!(handle.state(), BatchState::Cancelled);
    assert_eq!(catalogue.store().folder_count(), 2 * CHUNK);
}

#[test]
fn test_folder_deleted_mid_item_batch_drops_remaining() {
    let catalogue = populated(2, 0);
    let [doomed, kept] = [folder_keys(&catalogue)[0], folder_keys(&catalogue)[1]];

    let handle = catalogue.create_items(doomed, 20).unwrap();
    catalogue.tick();
    catalogue.delete_folder(doomed);
    settle(&catalogue);

    assert_eq!(handle.state(), BatchState::Dropped);
    assert_eq!(handle.committed(), 10);
    assert_eq!(folder_keys(&catalogue), vec![kept]);
    assert_eq!(catalogue.store().item_count(&kept), Some(0));
}

#[tokio::test]
async fn test_drive_with_yield_ticker() {
    let catalogue = Catalogue::new(config());
    let folders = catalogue.create_folders(CAP as i64).unwrap();
    let key = folder_keys(&catalogue)[0];
    let items = catalogue.create_items(key, 42).unwrap();

    catalogue.drive(&mut YieldTicker).await;

    assert!(folders.is_finished());
    assert!(items.is_finished());
    assert_eq!(catalogue.store().folder_count(), CAP as usize);
    assert_eq!(catalogue.store().item_count(&key), Some(42));
}

#[tokio::test(start_paused = true)]
async fn test_drive_with_frame_ticker_spreads_over_frames() {
    let catalogue = Catalogue::new(config());
    catalogue.create_folders(50);

    let started = tokio::time::Instant::now();
    catalogue.drive(&mut FrameTicker::default()).await;

    assert_eq!(catalogue.store().folder_count(), 50);
    // Nine chunks after the first, one per frame; the first frame fires at once.
    assert!(started.elapsed() >= FrameTicker::DEFAULT_PERIOD * 8);
}

#[tokio::test]
async fn test_flow_stream_reports_appends_in_order() {
    let catalogue = Catalogue::new(config());
    let mut appended = catalogue.store().subscribe_flows("folder.appended");

    catalogue.create_folders(12);
    catalogue.drive(&mut YieldTicker).await;

    let mut lens = Vec::new();
    while let Some(msg) = appended.try_recv() {
        if let CatalogueFlow::FoldersAppended { len, .. } = msg.payload {
            lens.push(len);
        }
    }
    assert_eq!(lens, vec![5, 10, 12]);
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_hundred_thousand_identities_are_distinct() {
    let generator = IdentityGenerator::new();
    let ids: HashSet<_> = (0..100_000).map(|_| generator.next()).collect();
    assert_eq!(ids.len(), 100_000);
}

// ============================================================================
// Drag
// ============================================================================

#[test]
fn test_folder_move_preserves_others_order() {
    let catalogue = populated(6, 0);
    let before = folder_keys(&catalogue);

    for (i, j) in [(0, 5), (5, 0), (2, 3), (4, 1), (3, 3)] {
        let original = folder_keys(&catalogue);
        catalogue.drop_folder(DragGesture::reorder(i, j), DropMode::Move).unwrap();
        let after = folder_keys(&catalogue);

        assert_eq!(after[j], original[i]);
        let rest: Vec<_> = after.iter().filter(|k| **k != original[i]).collect();
        let expected: Vec<_> = original.iter().filter(|k| **k != original[i]).collect();
        assert_eq!(rest, expected, "move {i} -> {j}");
    }

    let mut now = folder_keys(&catalogue);
    let mut before = before;
    now.sort();
    before.sort();
    assert_eq!(now, before);
}

#[test]
fn test_item_move_within_folder() {
    let catalogue = populated(1, 6);
    let key = folder_keys(&catalogue)[0];
    let original = item_ids(&catalogue, &key);

    catalogue
        .drop_item(DragGesture::within(key, 1, 4), key, DropMode::Move)
        .unwrap();

    let after = item_ids(&catalogue, &key);
    assert_eq!(
        after,
        vec![original[0], original[2], original[3], original[4], original[1], original[5]]
    );
}

#[test]
fn test_folder_copy_never_removes_source() {
    let catalogue = populated(3, 4);
    let before_ids: HashSet<_> = all_identities(&catalogue).into_iter().collect();
    let source = folder_keys(&catalogue)[1];

    catalogue
        .drop_folder(DragGesture::reorder(1, 3), DropMode::Duplicate)
        .unwrap();

    let keys = folder_keys(&catalogue);
    assert_eq!(keys.len(), 4);
    assert_eq!(keys[1], source);
    assert_eq!(catalogue.store().item_count(&source), Some(4));

    let copy = catalogue.store().folder(&keys[3]).unwrap();
    assert_eq!(copy.items.len(), 4);
    assert!(!before_ids.contains(&copy.key.to_string()));
    for item in &copy.items {
        assert!(!before_ids.contains(&item.id.to_string()));
    }

    let all = all_identities(&catalogue);
    let unique: HashSet<_> = all.iter().collect();
    assert_eq!(unique.len(), all.len());
}

#[test]
fn test_item_copy_across_folders() {
    let catalogue = populated(2, 3);
    let keys = folder_keys(&catalogue);
    let (a, b) = (keys[0], keys[1]);
    let source_items = item_ids(&catalogue, &a);

    catalogue
        .drop_item(DragGesture::between(a, 2, b, 0), b, DropMode::Duplicate)
        .unwrap();

    assert_eq!(item_ids(&catalogue, &a), source_items);
    let destination = item_ids(&catalogue, &b);
    assert_eq!(destination.len(), 4);
    assert!(!source_items.contains(&destination[0]));

    let (_, copy) = catalogue.store().item(&destination[0]).unwrap();
    let (_, original) = catalogue.store().item(&source_items[2]).unwrap();
    assert_eq!(copy.name, original.name);
}

#[test]
fn test_out_of_range_drag_changes_nothing() {
    let catalogue = populated(2, 2);
    let version = catalogue.store().version();
    let key = folder_keys(&catalogue)[0];

    assert!(catalogue.drop_folder(DragGesture::reorder(2, 0), DropMode::Duplicate).is_none());
    assert!(catalogue
        .drop_item(DragGesture::within(key, 7, 0), key, DropMode::Move)
        .is_none());
    assert_eq!(catalogue.store().version(), version);
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_edit_through_selection_visible_in_collection() {
    let catalogue = populated(2, 2);
    let key = folder_keys(&catalogue)[1];
    let id = item_ids(&catalogue, &key)[1];

    catalogue.select(Some(EntityRef::Item(id)));
    catalogue.apply_edit(&EntityPatch::new().with_name("X"));

    let snapshot = catalogue.store().snapshot();
    let (_, item) = snapshot.item(&id).unwrap();
    assert_eq!(item.name, "X");
    assert_eq!(item.icon.as_str(), "circle");
}

#[test]
fn test_deleting_selected_item_clears_selection() {
    let catalogue = populated(1, 3);
    let key = folder_keys(&catalogue)[0];
    let id = item_ids(&catalogue, &key)[1];

    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    let _sub = catalogue
        .selection()
        .subscribe(move |selected| sink.lock().push(selected.as_ref().map(|s| s.target)));

    catalogue.select(Some(EntityRef::Item(id)));
    catalogue.delete_item(key, id);

    assert_eq!(catalogue.selection().current_selection(), None);
    assert_eq!(*published.lock(), vec![None, Some(EntityRef::Item(id)), None]);
}

#[test]
fn test_edit_with_empty_selection_is_noop() {
    let catalogue = populated(1, 1);
    let before = catalogue.store().snapshot();

    assert!(!catalogue.apply_edit(&EntityPatch::new().with_name("X")));

    let after = catalogue.store().snapshot();
    assert_eq!(after.version, before.version);
    assert!(Arc::ptr_eq(&after.folders, &before.folders));
}

// ============================================================================
// Modifier
// ============================================================================

#[test]
fn test_stuck_modifier_resets_after_timeout() {
    let catalogue = Catalogue::new(config());
    let t0 = Instant::now();

    catalogue.key_down_at("Shift", t0);
    catalogue.key_up_at("Shift", t0);
    assert_eq!(catalogue.duplicate_mode_at(t0 + Duration::from_millis(499)), DropMode::Duplicate);
    assert_eq!(catalogue.duplicate_mode_at(t0 + Duration::from_millis(500)), DropMode::Move);
}
