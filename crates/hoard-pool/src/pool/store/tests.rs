use super::*;
use hoard_core::utils::hash_bytes;
use hoard_core::HashMethod;
use std::io;
use tempfile::{tempdir, TempDir};
use url::Url;
use walkdir::WalkDir;

/// Device of fixed size whose only consumer is the pool's blob directory
#[derive(Debug)]
struct SimulatedDisk {
    total: u64,
}

impl SpaceProbe for SimulatedDisk {
    fn available_space(&self, path: &Utf8Path) -> io::Result<u64> {
        let used: u64 = WalkDir::new(path.join(BLOBS_DIR))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();
        Ok(self.total.saturating_sub(used))
    }
}

fn utf8_root(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("pool")).unwrap()
}

fn asset(name: &str, content: &[u8]) -> AssetDescriptor {
    AssetDescriptor::new(
        name,
        hoard_core::AssetHash::new(HashMethod::Sha256, hash_bytes(HashMethod::Sha256, content)),
        Url::parse(&format!("https://assets.example.com/{}", name)).unwrap(),
    )
}

fn put(store: &PoolStore, asset: &AssetDescriptor, content: &[u8]) -> PoolResult<PoolEntry> {
    let reservation = store.reserve(content.len() as u64)?;
    let staged = store.tmp_dir().join(format!("{}.part", asset.name));
    fs::write(&staged, content).unwrap();
    let hex = hash_bytes(asset.hash.method, content);
    store.commit(reservation, asset, staged.as_std_path(), &hex)
}

fn names(store: &PoolStore) -> Vec<String> {
    store.entries().into_iter().map(|e| e.name).collect()
}

#[test]
fn test_open_creates_layout() {
    let temp_dir = tempdir().unwrap();
    let root = utf8_root(&temp_dir);
    let store = PoolStore::open(&root).unwrap();

    assert!(root.join(BLOBS_DIR).is_dir());
    assert!(root.join(TMP_DIR).is_dir());
    assert!(root.join(INDEX_FILE).is_file());
    assert!(root.join("pool.lock").is_file());
    assert_eq!(store.usage(), 0);
    assert_eq!(store.maximum_pool_size(), u64::MAX);
    assert_eq!(store.reserved_free_space(), 0);
}

#[test]
fn test_commit_makes_asset_ready() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    let intro = asset("intro.mp4", b"intro video bytes");

    assert!(!store.are_assets_ready(&[intro.clone()]));
    let entry = put(&store, &intro, b"intro video bytes").unwrap();

    assert!(store.are_assets_ready(&[intro.clone()]));
    assert_eq!(entry.size, 17);
    assert_eq!(fs::read(&entry.path).unwrap(), b"intro video bytes");
    assert!(store.verify_asset("intro.mp4").unwrap());
    assert_eq!(store.usage(), 17);
    assert_eq!(fs::read_dir(store.tmp_dir()).unwrap().count(), 0);
}

#[test]
fn test_commit_rejects_wrong_digest() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    let intro = asset("intro.mp4", b"expected");

    let reservation = store.reserve(8).unwrap();
    let staged = store.tmp_dir().join("intro.part");
    fs::write(&staged, b"tampered").unwrap();
    let actual = hash_bytes(HashMethod::Sha256, b"tampered");

    let result = store.commit(reservation, &intro, staged.as_std_path(), &actual);
    assert!(matches!(result, Err(HoardError::HashMismatch { .. })));
    assert!(!store.is_asset_ready(&intro));
    assert_eq!(store.usage(), 0);
    assert_eq!(store.stats().pending_bytes, 0);
}

#[test]
fn test_entries_survive_reopen() {
    let temp_dir = tempdir().unwrap();
    let root = utf8_root(&temp_dir);
    let a = asset("a.bin", b"aaaa");
    {
        let store = PoolStore::open(&root).unwrap();
        put(&store, &a, b"aaaa").unwrap();
        store.close().unwrap();
    }

    let store = PoolStore::open(&root).unwrap();
    assert!(store.is_asset_ready(&a));
    assert_eq!(store.usage(), 4);
}

#[test]
fn test_second_open_is_locked() {
    let temp_dir = tempdir().unwrap();
    let root = utf8_root(&temp_dir);
    let store = PoolStore::open(&root).unwrap();

    assert!(matches!(PoolStore::open(&root), Err(HoardError::Lock { .. })));

    store.close().unwrap();
    assert!(PoolStore::open(&root).is_ok());
}

#[test]
fn test_same_bytes_counted_once() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    put(&store, &asset("one.bin", b"shared"), b"shared").unwrap();
    put(&store, &asset("two.bin", b"shared"), b"shared").unwrap();

    let stats = store.stats();
    assert_eq!(stats.usage, 6);
    assert_eq!(stats.blob_count, 1);
    assert_eq!(stats.asset_count, 2);
}

#[test]
fn test_replacing_name_drops_old_blob() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    let old = put(&store, &asset("firmware.img", b"v1"), b"v1").unwrap();
    put(&store, &asset("firmware.img", b"v2-longer"), b"v2-longer").unwrap();

    assert!(!old.path.exists());
    assert_eq!(store.usage(), 9);
    assert_eq!(store.stats().blob_count, 1);
}

#[test]
fn test_protected_asset_survives_unrelated_demand() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    store.set_maximum_pool_size(100).unwrap();

    let a = asset("a", &[1u8; 40]);
    let b = asset("b", &[2u8; 40]);
    let c = asset("c", &[3u8; 40]);
    store.protect_assets("playlist", &[a.clone()]);
    put(&store, &a, &[1u8; 40]).unwrap();
    put(&store, &b, &[2u8; 40]).unwrap();
    put(&store, &c, &[3u8; 40]).unwrap();

    // a is the oldest but protected, so b went
    assert_eq!(names(&store), vec!["a", "c"]);
    assert_eq!(store.protection_refcount("a"), 1);

    let released = store.unprotect_assets("playlist").unwrap();
    assert_eq!(released, vec!["a".to_string()]);
    let report = store.set_maximum_pool_size(40).unwrap();
    assert_eq!(report.assets, vec!["a".to_string()]);
    assert_eq!(names(&store), vec!["c"]);
}

#[test]
fn test_lowering_cap_evicts_least_recently_used() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    for name in ["a", "b", "c"] {
        put(&store, &asset(name, name.as_bytes().repeat(10).as_slice()), &name.as_bytes().repeat(10)).unwrap();
    }
    store.resolve("a").unwrap();

    let report = store.set_maximum_pool_size(20).unwrap();
    assert_eq!(report.assets, vec!["b".to_string()]);
    assert_eq!(report.freed_bytes, 10);
    assert_eq!(names(&store), vec!["a", "c"]);
    assert_eq!(store.usage(), 20);
}

#[test]
fn test_lowering_cap_below_protected_fails() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    let a = asset("a", &[7u8; 30]);
    let b = asset("b", &[8u8; 30]);
    store.protect_assets("all", &[a.clone(), b.clone()]);
    put(&store, &a, &[7u8; 30]).unwrap();
    put(&store, &b, &[8u8; 30]).unwrap();

    let result = store.set_maximum_pool_size(40);
    assert!(matches!(result, Err(HoardError::Capacity { .. })));
    assert_eq!(store.usage(), 60);
    assert_eq!(store.maximum_pool_size(), u64::MAX);
    assert_eq!(names(&store), vec!["a", "b"]);
}

#[test]
fn test_protected_pair_over_cap() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    store.set_maximum_pool_size(120).unwrap();

    let big = asset("big.mp4", &[1u8; 100]);
    let small = asset("small.mp4", &[2u8; 50]);
    let collection = vec![big.clone(), small.clone()];
    store.protect_assets("show", &collection);

    put(&store, &big, &[1u8; 100]).unwrap();
    let result = put(&store, &small, &[2u8; 50]);

    assert!(matches!(result, Err(HoardError::Capacity { .. })));
    assert!(!store.are_assets_ready(&collection));
    assert!(store.is_asset_ready(&big));
    assert_eq!(store.usage(), 100);
}

#[test]
fn test_free_space_floor_triggers_eviction() {
    let temp_dir = tempdir().unwrap();
    let options = PoolOptions {
        rebuild_on_corrupt: false,
        space_probe: Arc::new(SimulatedDisk { total: 200 }),
    };
    let store = PoolStore::open_with(utf8_root(&temp_dir), options).unwrap();
    store.reserve_storage(50);

    put(&store, &asset("a", &[1u8; 80]), &[1u8; 80]).unwrap();
    // 120 free, 80 more would leave 40 < 50
    put(&store, &asset("b", &[2u8; 80]), &[2u8; 80]).unwrap();

    assert_eq!(names(&store), vec!["b"]);
}

#[test]
fn test_free_space_floor_unreachable() {
    let temp_dir = tempdir().unwrap();
    let options = PoolOptions {
        rebuild_on_corrupt: false,
        space_probe: Arc::new(SimulatedDisk { total: 100 }),
    };
    let store = PoolStore::open_with(utf8_root(&temp_dir), options).unwrap();
    store.reserve_storage(50);

    assert!(matches!(store.reserve(60), Err(HoardError::Capacity { .. })));
    assert!(store.reserve(50).is_ok());
}

#[test]
fn test_pending_reservations_count_toward_cap() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    store.set_maximum_pool_size(100).unwrap();

    let first = store.reserve(60).unwrap();
    assert_eq!(store.stats().pending_bytes, 60);
    assert!(matches!(store.reserve(60), Err(HoardError::Capacity { .. })));

    drop(first);
    assert_eq!(store.stats().pending_bytes, 0);
    assert!(store.reserve(60).is_ok());
}

#[test]
fn test_owned_reservation_moves_across_threads() {
    let temp_dir = tempdir().unwrap();
    let store = Arc::new(PoolStore::open(utf8_root(&temp_dir)).unwrap());
    let clip = asset("clip", b"clip bytes");

    let abandoned = store.reserve_owned(40).unwrap();
    assert_eq!(abandoned.bytes(), 40);
    assert_eq!(store.stats().pending_bytes, 40);
    std::thread::spawn(move || drop(abandoned)).join().unwrap();
    assert_eq!(store.stats().pending_bytes, 0);

    let reservation = store.reserve_owned(10).unwrap();
    let staged = store.tmp_dir().join("clip.part");
    fs::write(&staged, b"clip bytes").unwrap();
    let worker = store.clone();
    let committed = clip.clone();
    let entry = std::thread::spawn(move || {
        let hex = hash_bytes(HashMethod::Sha256, b"clip bytes");
        worker.commit_owned(reservation, &committed, staged.as_std_path(), &hex)
    })
    .join()
    .unwrap()
    .unwrap();

    assert_eq!(entry.size, 10);
    assert_eq!(store.stats().pending_bytes, 0);
    assert!(store.is_asset_ready(&clip));
}

#[test]
fn test_remove_asset() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    let a = asset("a", b"removable");
    let entry = put(&store, &a, b"removable").unwrap();

    store.protect_assets("hold", &[a.clone()]);
    assert!(matches!(
        store.remove_asset("a"),
        Err(HoardError::AssetProtected { refcount: 1, .. })
    ));

    store.unprotect_assets("hold").unwrap();
    store.remove_asset("a").unwrap();
    assert!(!entry.path.exists());
    assert!(matches!(store.remove_asset("a"), Err(HoardError::NotReady { .. })));
}

#[test]
fn test_evict_unprotected() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    let keep = asset("keep", b"keep");
    store.protect_assets("t", &[keep.clone()]);
    put(&store, &keep, b"keep").unwrap();
    put(&store, &asset("drop1", b"drop1"), b"drop1").unwrap();
    put(&store, &asset("drop2", b"drop2"), b"drop2").unwrap();

    let report = store.evict_unprotected().unwrap();
    assert_eq!(report.evicted_blobs, 2);
    assert_eq!(report.freed_bytes, 10);
    assert_eq!(names(&store), vec!["keep"]);
}

#[test]
fn test_persistent_protection_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let root = utf8_root(&temp_dir);
    {
        let store = PoolStore::open(&root).unwrap();
        let a = asset("a", b"a");
        let b = asset("b", b"b");
        store.protect_assets_persistent("pinned", &[a.clone()]).unwrap();
        store.protect_assets("session", &[b.clone()]);
        put(&store, &a, b"a").unwrap();
        put(&store, &b, b"b").unwrap();
        store.close().unwrap();
    }

    let store = PoolStore::open(&root).unwrap();
    assert_eq!(store.protection_refcount("a"), 1);
    assert_eq!(store.protection_refcount("b"), 0);
    assert_eq!(store.protection_tags(), vec!["pinned".to_string()]);
}

#[test]
fn test_corrupt_index_is_reported() {
    let temp_dir = tempdir().unwrap();
    let root = utf8_root(&temp_dir);
    PoolStore::open(&root).unwrap().close().unwrap();
    fs::write(root.join(INDEX_FILE), b"{ truncated").unwrap();

    assert!(matches!(
        PoolStore::open(&root),
        Err(HoardError::CorruptIndex { .. })
    ));
}

#[test]
fn test_malformed_index_digest_is_reported_or_rebuilt() {
    let temp_dir = tempdir().unwrap();
    let root = utf8_root(&temp_dir);
    let kept = asset("kept", b"kept bytes");
    {
        let store = PoolStore::open(&root).unwrap();
        put(&store, &kept, b"kept bytes").unwrap();
        store.close().unwrap();
    }
    let mut index = PoolIndex::load(root.join(INDEX_FILE).as_std_path()).unwrap();
    let short = hoard_core::AssetHash::new(HashMethod::Sha256, "x");
    index.insert_blob(blob_key(&short), short, 1);
    index.save(root.join(INDEX_FILE).as_std_path()).unwrap();

    assert!(matches!(
        PoolStore::open(&root),
        Err(HoardError::CorruptIndex { .. })
    ));

    let options = PoolOptions {
        rebuild_on_corrupt: true,
        ..PoolOptions::default()
    };
    let store = PoolStore::open_with(&root, options).unwrap();
    assert_eq!(store.stats().orphan_count, 1);
    assert!(store.claim_existing(&kept).unwrap().is_some());
}

#[test]
fn test_rebuild_recovers_verified_blobs() {
    let temp_dir = tempdir().unwrap();
    let root = utf8_root(&temp_dir);
    let good = asset("good", b"good bytes");
    let bad = asset("bad", b"bad bytes");
    {
        let store = PoolStore::open(&root).unwrap();
        put(&store, &good, b"good bytes").unwrap();
        let bad_entry = put(&store, &bad, b"bad bytes").unwrap();
        store.close().unwrap();
        fs::write(&bad_entry.path, b"bit rot!!").unwrap();
    }
    fs::write(root.join(INDEX_FILE), b"garbage").unwrap();

    let options = PoolOptions {
        rebuild_on_corrupt: true,
        ..PoolOptions::default()
    };
    let store = PoolStore::open_with(&root, options).unwrap();
    let stats = store.stats();
    assert_eq!(stats.blob_count, 1);
    assert_eq!(stats.orphan_count, 1);
    assert_eq!(stats.usage, 10);

    // Orphans are adopted without transfer
    let entry = store.claim_existing(&good).unwrap().unwrap();
    assert_eq!(entry.name, "good");
    assert!(store.is_asset_ready(&good));
    assert!(store.claim_existing(&bad).unwrap().is_none());
}

#[test]
fn test_open_reconciles_directory() {
    let temp_dir = tempdir().unwrap();
    let root = utf8_root(&temp_dir);
    let kept = asset("kept", b"kept");
    let lost = asset("lost", b"lost");
    let lost_path;
    {
        let store = PoolStore::open(&root).unwrap();
        put(&store, &kept, b"kept").unwrap();
        lost_path = put(&store, &lost, b"lost").unwrap().path;
        store.close().unwrap();
    }
    fs::remove_file(&lost_path).unwrap();
    fs::write(root.join(TMP_DIR).join("half-written.part"), b"partial").unwrap();
    let unindexed = hoard_core::AssetHash::new(
        HashMethod::Sha256,
        hash_bytes(HashMethod::Sha256, b"crash leftover"),
    );
    let unindexed_path = blob_path(&root, &unindexed);
    fs::create_dir_all(unindexed_path.parent().unwrap()).unwrap();
    fs::write(&unindexed_path, b"crash leftover").unwrap();

    let store = PoolStore::open(&root).unwrap();
    assert!(store.is_asset_ready(&kept));
    assert!(!store.is_asset_ready(&lost));
    assert_eq!(store.stats().orphan_count, 1);
    assert_eq!(fs::read_dir(store.tmp_dir()).unwrap().count(), 0);

    // The orphan is the first eviction candidate
    store.set_maximum_pool_size(4).unwrap();
    assert!(!unindexed_path.exists());
    assert!(store.is_asset_ready(&kept));
}

#[test]
fn test_verify_asset_detects_tampering() {
    let temp_dir = tempdir().unwrap();
    let store = PoolStore::open(utf8_root(&temp_dir)).unwrap();
    let entry = put(&store, &asset("doc", b"original"), b"original").unwrap();
    fs::write(&entry.path, b"modified").unwrap();

    assert!(!store.verify_asset("doc").unwrap());
    assert!(matches!(store.verify_asset("missing"), Err(HoardError::NotReady { .. })));
}
