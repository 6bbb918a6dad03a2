//! End-to-end engine behavior over the in-memory backend.

use omnikv_core::{
    Arena, Database, Options, ReadBatch, ScanBatch, SizeBatch, Strided, TxnState, WriteBatch,
};

fn put(db: &Database, key: i64, value: &[u8]) {
    let keys = [key];
    let values = [Some(value)];
    db.write(
        None,
        &WriteBatch::new(&keys).per_task_values(&values),
        Options::NONE,
    )
    .unwrap();
}

fn get(db: &Database, key: i64) -> Option<Vec<u8>> {
    let mut arena = Arena::new();
    let keys = [key];
    let found = db
        .read(None, &ReadBatch::new(&keys), Options::NONE, &mut arena)
        .unwrap();
    found.value(0).map(<[u8]>::to_vec)
}

#[test]
fn round_trip_lengths_and_tape() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 1, b"a");
    put(&db, 2, b"bb");

    let mut arena = Arena::new();
    let keys = [1i64, 2, 3];
    let found = db
        .read(None, &ReadBatch::new(&keys), Options::NONE, &mut arena)
        .unwrap();

    assert_eq!(found.value_len(0), Some(1));
    assert_eq!(found.value_len(1), Some(2));
    assert_eq!(found.value_len(2), None);
    assert_eq!(found.value(0), Some(&b"a"[..]));
    assert_eq!(found.value(1), Some(&b"bb"[..]));
    // The packed tape carries the concatenated present values.
    assert_eq!(&found.tape()[keys.len() * 4..], b"abb");
}

#[test]
fn empty_value_is_not_missing() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 5, b"");

    let mut arena = Arena::new();
    let keys = [5i64, 6];
    let found = db
        .read(None, &ReadBatch::new(&keys), Options::NONE, &mut arena)
        .unwrap();
    assert_eq!(found.value_len(0), Some(0));
    assert_eq!(found.value(0), Some(&b""[..]));
    assert_eq!(found.value_len(1), None);
}

#[test]
fn null_values_delete_the_whole_batch() {
    let db = Database::open_in_memory().unwrap();
    let keys: Vec<i64> = (0..10).collect();
    for &key in &keys {
        put(&db, key, b"payload");
    }

    // No values at all: every addressed key is removed.
    db.write(None, &WriteBatch::new(&keys[..]), Options::NONE)
        .unwrap();

    let mut arena = Arena::new();
    let found = db
        .read(None, &ReadBatch::new(&keys[..]), Options::NONE, &mut arena)
        .unwrap();
    for i in 0..keys.len() {
        assert_eq!(found.value_len(i), None, "key {i} should be missing");
    }
}

#[test]
fn broadcast_value_reaches_every_key() {
    let db = Database::open_in_memory().unwrap();
    let keys = [10i64, 20, 30];
    db.write(
        None,
        &WriteBatch::new(&keys)
            .broadcast_value(b"same")
            .lengths(Strided::broadcast(4u32)),
        Options::NONE,
    )
    .unwrap();

    for key in keys {
        assert_eq!(get(&db, key).as_deref(), Some(&b"same"[..]));
    }
}

#[test]
fn array_of_structs_keys_decode_in_place() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 100, b"x");
    put(&db, 200, b"y");

    // Keys embedded in 12-byte records: 8 key bytes + 4 payload bytes.
    let mut records = Vec::new();
    for key in [100i64, 200] {
        records.extend_from_slice(&key.to_le_bytes());
        records.extend_from_slice(&[0u8; 4]);
    }
    let keys: Strided<'_, i64> = Strided::bytes(&records, 12).unwrap();

    let mut arena = Arena::new();
    let found = db
        .read(None, &ReadBatch::new(keys), Options::NONE, &mut arena)
        .unwrap();
    assert_eq!(found.value(0), Some(&b"x"[..]));
    assert_eq!(found.value(1), Some(&b"y"[..]));
}

#[test]
fn lengths_only_read_skips_bytes() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 1, b"abcde");

    let mut arena = Arena::new();
    let keys = [1i64];
    let found = db
        .read(
            None,
            &ReadBatch::new(&keys),
            Options::READ_LENGTHS,
            &mut arena,
        )
        .unwrap();
    assert_eq!(found.value_len(0), Some(5));
    assert!(!found.has_bytes());
    assert_eq!(found.tape().len(), 4);
}

#[test]
fn arena_reuse_does_not_grow_unbounded() {
    let db = Database::open_in_memory().unwrap();
    let big = vec![7u8; 64 * 1024];
    put(&db, 1, &big);
    put(&db, 2, b"tiny");

    let mut arena = Arena::new();
    let keys = [1i64];
    db.read(None, &ReadBatch::new(&keys), Options::NONE, &mut arena)
        .unwrap();
    let high_water = arena.capacity();

    let keys = [2i64];
    let found = db
        .read(None, &ReadBatch::new(&keys), Options::NONE, &mut arena)
        .unwrap();
    assert_eq!(found.value(0), Some(&b"tiny"[..]));
    assert_eq!(arena.capacity(), high_water);
}

#[test]
fn named_collection_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    let users = db.collection_open("users", "").unwrap();

    let keys = [7i64];
    let values = [Some(&b"x"[..])];
    db.write(
        None,
        &WriteBatch::new(&keys)
            .collection(users)
            .per_task_values(&values),
        Options::NONE,
    )
    .unwrap();

    let mut arena = Arena::new();
    let (count, names) = db.collection_list(&mut arena).unwrap();
    assert_eq!(count, 1);
    assert!(names.split('\0').any(|n| n == "users"));

    db.collection_remove(Some("users")).unwrap();

    let found = db
        .read(
            None,
            &ReadBatch::new(&keys).collection(users),
            Options::NONE,
            &mut arena,
        )
        .unwrap();
    assert_eq!(found.value_len(0), None);

    // Reopening the name mints a fresh id.
    let reopened = db.collection_open("users", "").unwrap();
    assert_ne!(reopened, users);
}

#[test]
fn clearing_the_default_collection_by_null_name() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 1, b"a");
    db.collection_remove(None).unwrap();
    assert_eq!(get(&db, 1), None);
}

#[test]
fn removing_unknown_collection_is_not_found() {
    let db = Database::open_in_memory().unwrap();
    let err = db.collection_remove(Some("ghost")).unwrap_err();
    assert_eq!(err.kind(), omnikv_core::ErrorKind::NotFound);
}

#[test]
fn collections_isolate_key_spaces() {
    let db = Database::open_in_memory().unwrap();
    let users = db.collection_open("users", "").unwrap();
    let posts = db.collection_open("posts", "").unwrap();

    let keys = [1i64];
    let values = [Some(&b"u"[..])];
    db.write(
        None,
        &WriteBatch::new(&keys)
            .collection(users)
            .per_task_values(&values),
        Options::NONE,
    )
    .unwrap();

    let mut arena = Arena::new();
    let found = db
        .read(
            None,
            &ReadBatch::new(&keys).collection(posts),
            Options::NONE,
            &mut arena,
        )
        .unwrap();
    assert_eq!(found.value_len(0), None);
}

#[test]
fn transactional_read_your_writes() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 1, b"live");

    let mut txn = db.txn_begin(0, Options::NONE).unwrap();
    let keys = [1i64];
    let values = [Some(&b"mine"[..])];
    db.write(
        Some(&mut txn),
        &WriteBatch::new(&keys).per_task_values(&values),
        Options::NONE,
    )
    .unwrap();

    let mut arena = Arena::new();
    let found = db
        .read(
            Some(&mut txn),
            &ReadBatch::new(&keys),
            Options::NONE,
            &mut arena,
        )
        .unwrap();
    assert_eq!(found.value(0), Some(&b"mine"[..]));

    // The live store is untouched until commit.
    assert_eq!(get(&db, 1).as_deref(), Some(&b"live"[..]));

    db.txn_commit(&mut txn, Options::NONE).unwrap();
    assert_eq!(get(&db, 1).as_deref(), Some(&b"mine"[..]));
}

#[test]
fn tracked_read_conflicts_with_intervening_commit() {
    let db = Database::open_in_memory().unwrap();

    let mut t1 = db.txn_begin(0, Options::NONE).unwrap();
    let mut arena = Arena::new();
    let keys = [5i64];
    let found = db
        .read(
            Some(&mut t1),
            &ReadBatch::new(&keys),
            Options::READ_TRACK,
            &mut arena,
        )
        .unwrap();
    assert_eq!(found.value_len(0), None);

    let mut t2 = db.txn_begin(0, Options::NONE).unwrap();
    let values = [Some(&b"v"[..])];
    db.write(
        Some(&mut t2),
        &WriteBatch::new(&keys).per_task_values(&values),
        Options::NONE,
    )
    .unwrap();
    db.txn_commit(&mut t2, Options::NONE).unwrap();

    let err = db.txn_commit(&mut t1, Options::NONE).unwrap_err();
    assert_eq!(err.kind(), omnikv_core::ErrorKind::Conflict);
    assert_eq!(t1.state(), TxnState::Conflicted);

    // Conflicted handles restart for a retry with a fresh generation.
    db.txn_restart(&mut t1, 0, Options::NONE).unwrap();
    assert!(t1.is_active());
    db.txn_commit(&mut t1, Options::NONE).unwrap();
}

#[test]
fn snapshot_reads_ignore_later_commits() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 10, b"before");

    let mut txn = db.txn_begin(0, Options::TXN_SNAPSHOT).unwrap();
    put(&db, 10, b"a");
    put(&db, 10, b"b");

    let mut arena = Arena::new();
    let keys = [10i64];
    for _ in 0..2 {
        let found = db
            .read(
                Some(&mut txn),
                &ReadBatch::new(&keys),
                Options::NONE,
                &mut arena,
            )
            .unwrap();
        assert_eq!(found.value(0), Some(&b"before"[..]));
    }
}

#[test]
fn untracked_snapshot_commit_ignores_overwrites() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 1, b"a");

    let mut txn = db.txn_begin(0, Options::TXN_SNAPSHOT).unwrap();
    let mut arena = Arena::new();
    let keys = [1i64];
    db.read(
        Some(&mut txn),
        &ReadBatch::new(&keys),
        Options::NONE,
        &mut arena,
    )
    .unwrap();

    put(&db, 1, b"b");
    // Without read-tracking the engine is not required to detect this.
    assert!(db.txn_commit(&mut txn, Options::NONE).is_ok());
}

#[test]
fn caller_generations_are_single_use() {
    let db = Database::open_in_memory().unwrap();
    let txn = db.txn_begin(99, Options::NONE).unwrap();
    assert_eq!(txn.generation().as_u64(), 99);

    let err = db.txn_begin(99, Options::NONE).unwrap_err();
    assert_eq!(err.kind(), omnikv_core::ErrorKind::Usage);
}

#[test]
fn scan_returns_ascending_bounded_page() {
    let db = Database::open_in_memory().unwrap();
    for key in [2i64, 5, 9, 11] {
        put(&db, key, b"v");
    }

    let mut arena = Arena::new();
    let mins = [0i64];
    let scan = db
        .scan(
            None,
            &ScanBatch::new(&mins, Strided::broadcast(3u64)),
            Options::NONE,
            &mut arena,
        )
        .unwrap();
    assert_eq!(scan.count(0), 3);
    assert_eq!(scan.keys(0).collect::<Vec<_>>(), vec![2, 5, 9]);
}

#[test]
fn scan_with_lengths_and_multiple_tasks() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 1, b"a");
    put(&db, 2, b"bb");
    put(&db, 50, b"ccc");

    let mut arena = Arena::new();
    let mins = [0i64, 50];
    let scan = db
        .scan(
            None,
            &ScanBatch::new(&mins, Strided::broadcast(10u64)),
            Options::READ_LENGTHS,
            &mut arena,
        )
        .unwrap();
    assert_eq!(scan.count(0), 3);
    assert_eq!(scan.count(1), 1);
    assert_eq!(scan.value_len(0, 1), Some(2));
    assert_eq!(scan.value_len(1, 0), Some(3));
}

#[test]
fn transactional_scan_merges_the_write_set() {
    let db = Database::open_in_memory().unwrap();
    for key in [2i64, 5, 9] {
        put(&db, key, b"v");
    }

    let mut txn = db.txn_begin(0, Options::NONE).unwrap();
    let write_keys = [5i64, 7];
    let chunks: [Option<&[u8]>; 2] = [None, Some(b"new")];
    db.write(
        Some(&mut txn),
        &WriteBatch::new(&write_keys).per_task_values(&chunks),
        Options::NONE,
    )
    .unwrap();

    let mut arena = Arena::new();
    let mins = [0i64];
    let scan = db
        .scan(
            Some(&txn),
            &ScanBatch::new(&mins, Strided::broadcast(10u64)),
            Options::NONE,
            &mut arena,
        )
        .unwrap();
    // Buffered delete of 5 vanishes, buffered insert of 7 appears.
    assert_eq!(scan.keys(0).collect::<Vec<_>>(), vec![2, 7, 9]);

    // The live store still sees the original page.
    let scan = db
        .scan(
            None,
            &ScanBatch::new(&mins, Strided::broadcast(10u64)),
            Options::NONE,
            &mut arena,
        )
        .unwrap();
    assert_eq!(scan.keys(0).collect::<Vec<_>>(), vec![2, 5, 9]);
}

#[test]
fn size_estimates_bound_the_truth() {
    let db = Database::open_in_memory().unwrap();
    for key in [1i64, 2, 3, 40] {
        put(&db, key, b"abcd");
    }

    let mins = [0i64];
    let maxs = [10i64];
    let estimates = db
        .size(None, &SizeBatch::new(&mins, &maxs), Options::NONE)
        .unwrap();
    assert_eq!(estimates.len(), 1);
    let est = estimates[0];
    assert!(est.cardinality.0 <= 3 && 3 <= est.cardinality.1);
    assert!(est.value_bytes.0 <= 12 && 12 <= est.value_bytes.1);
}

#[test]
fn batches_are_atomic_under_concurrent_readers() {
    let db = Database::open_in_memory().unwrap();
    let keys: Vec<i64> = (0..16).collect();

    std::thread::scope(|scope| {
        let db = &db;
        let keys = &keys;
        let reader = scope.spawn(move || {
            let mut arena = Arena::new();
            for _ in 0..500 {
                let found = db
                    .read(None, &ReadBatch::new(&keys[..]), Options::NONE, &mut arena)
                    .unwrap();
                let present = (0..keys.len())
                    .filter(|&i| found.value_len(i).is_some())
                    .count();
                // Each batch lands whole: a reader sees all keys or none.
                assert!(
                    present == 0 || present == keys.len(),
                    "observed a torn batch: {present} of {} keys",
                    keys.len()
                );
            }
        });

        let writer = scope.spawn(move || {
            let values: Vec<Option<&[u8]>> = keys.iter().map(|_| Some(&b"x"[..])).collect();
            for round in 0..50 {
                if round % 2 == 0 {
                    db.write(
                        None,
                        &WriteBatch::new(&keys[..]).per_task_values(&values),
                        Options::NONE,
                    )
                    .unwrap();
                } else {
                    db.write(None, &WriteBatch::new(&keys[..]), Options::NONE)
                        .unwrap();
                }
            }
        });

        reader.join().unwrap();
        writer.join().unwrap();
    });
}

#[test]
fn distinct_transactions_run_from_parallel_threads() {
    let db = Database::open_in_memory().unwrap();

    std::thread::scope(|scope| {
        let db = &db;
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                scope.spawn(move || {
                    let mut txn = db.txn_begin(0, Options::NONE).unwrap();
                    let keys = [worker as i64];
                    let payload = [worker as u8];
                    let values = [Some(&payload[..])];
                    db.write(
                        Some(&mut txn),
                        &WriteBatch::new(&keys).per_task_values(&values),
                        Options::NONE,
                    )
                    .unwrap();
                    db.txn_commit(&mut txn, Options::NONE).unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
    });

    for worker in 0..4i64 {
        assert_eq!(get(&db, worker), Some(vec![worker as u8]));
    }
}

#[test]
fn commit_points_order_all_writers() {
    let db = Database::open_in_memory().unwrap();
    let before = db.committed_point();
    put(&db, 1, b"a");
    let after_live = db.committed_point();
    assert!(after_live > before);

    let mut txn = db.txn_begin(0, Options::NONE).unwrap();
    let keys = [2i64];
    let values = [Some(&b"b"[..])];
    db.write(
        Some(&mut txn),
        &WriteBatch::new(&keys).per_task_values(&values),
        Options::NONE,
    )
    .unwrap();
    let committed = db.txn_commit(&mut txn, Options::NONE).unwrap();
    assert!(committed > after_live);
    assert_eq!(db.committed_point(), committed);
}

#[test]
fn stray_option_bits_are_rejected_per_operation() {
    let db = Database::open_in_memory().unwrap();
    let mut arena = Arena::new();
    let keys = [1i64];

    let err = db
        .read(
            None,
            &ReadBatch::new(&keys),
            Options::WRITE_FLUSH,
            &mut arena,
        )
        .unwrap_err();
    assert_eq!(err.kind(), omnikv_core::ErrorKind::Usage);

    let err = db
        .write(None, &WriteBatch::new(&keys), Options::READ_TRACK)
        .unwrap_err();
    assert_eq!(err.kind(), omnikv_core::ErrorKind::Usage);

    // Unknown raw bits never make it into an Options value at all.
    assert!(Options::from_bits(1 << 9).is_none());
}

#[test]
fn tracking_outside_a_transaction_is_a_usage_error() {
    let db = Database::open_in_memory().unwrap();
    let mut arena = Arena::new();
    let keys = [1i64];
    let err = db
        .read(
            None,
            &ReadBatch::new(&keys),
            Options::READ_TRACK,
            &mut arena,
        )
        .unwrap_err();
    assert_eq!(err.kind(), omnikv_core::ErrorKind::Usage);
}

#[test]
fn write_flush_is_accepted_on_the_live_path() {
    let db = Database::open_in_memory().unwrap();
    let keys = [1i64];
    let values = [Some(&b"durable"[..])];
    db.write(
        None,
        &WriteBatch::new(&keys).per_task_values(&values),
        Options::WRITE_FLUSH,
    )
    .unwrap();
    assert_eq!(get(&db, 1).as_deref(), Some(&b"durable"[..]));
}

#[test]
fn dropping_a_snapshot_transaction_releases_it() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 1, b"a");
    {
        let _txn = db.txn_begin(0, Options::TXN_SNAPSHOT).unwrap();
    }
    // A released snapshot leaves the engine able to pin fresh ones.
    let txn = db.txn_begin(0, Options::TXN_SNAPSHOT).unwrap();
    assert!(txn.is_snapshot());
}

#[test]
fn stats_reflect_traffic() {
    let db = Database::open_in_memory().unwrap();
    put(&db, 1, b"abc");
    get(&db, 1);
    get(&db, 2);

    let snap = db.stats().snapshot();
    assert_eq!(snap.writes, 1);
    assert_eq!(snap.reads, 2);
    assert_eq!(snap.bytes_written, 3);
    assert_eq!(snap.bytes_read, 3);
}
