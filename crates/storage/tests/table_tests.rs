//! Integration tests for shard storage
//!
//! - Snapshot round-trip and last-write-wins as properties
//! - Concurrent readers and writers on one shard

use proptest::prelude::*;
use psshard_core::{DType, Tensor};
use psshard_storage::{new_scalar_shard, PsShard, ShardOfScalars, Table};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

// ============================================================================
// Helper Functions
// ============================================================================

fn content(table: &Table<i64, i64>) -> HashMap<i64, i64> {
    let (keys, values) = table.export_all();
    assert_eq!(keys.len(), values.len());
    keys.into_iter().zip(values).collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// insert(clear) of an export leaves the table observationally identical
    #[test]
    fn prop_export_import_round_trip(
        pairs in prop::collection::vec((any::<i64>(), any::<i64>()), 0..200)
    ) {
        let table: Table<i64, i64> = Table::new();
        let (keys, values): (Vec<i64>, Vec<i64>) = pairs.into_iter().unzip();
        table.insert(&keys, &values, false).unwrap();
        let before = content(&table);

        let (saved_keys, saved_values) = table.export_all();
        table.insert(&saved_keys, &saved_values, true).unwrap();

        prop_assert_eq!(content(&table), before);
    }

    /// The table agrees with a HashMap fed the same batch in order
    #[test]
    fn prop_last_write_wins(pairs in prop::collection::vec((0i64..16, any::<i64>()), 1..100)) {
        let table: Table<i64, i64> = Table::new();
        let (keys, values): (Vec<i64>, Vec<i64>) = pairs.iter().copied().unzip();
        table.insert(&keys, &values, false).unwrap();

        let mut model = HashMap::new();
        for (k, v) in pairs {
            model.insert(k, v);
        }
        prop_assert_eq!(table.size(), model.len());
        prop_assert_eq!(content(&table), model);
    }

    /// Absent keys come back as their default and are not inserted
    #[test]
    fn prop_find_defaults(
        keys in prop::collection::vec(any::<i64>(), 1..50),
        default in any::<i64>()
    ) {
        let table: Table<i64, i64> = Table::new();
        let out = table.find(&keys, &[default]).unwrap();
        prop_assert!(out.iter().all(|v| *v == default));
        prop_assert_eq!(table.size(), 0);
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_readers_and_writers() {
    let shard: Arc<ShardOfScalars<i64, f32>> = Arc::new(ShardOfScalars::new());
    let writers = 4;
    let readers = 4;
    let per_writer = 500i64;
    let barrier = Arc::new(Barrier::new(writers + readers));

    let mut handles = Vec::new();
    for w in 0..writers as i64 {
        let shard = Arc::clone(&shard);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..per_writer {
                let key = w * per_writer + i;
                shard
                    .insert(&Tensor::from_vec(vec![key]), &Tensor::from_vec(vec![key as f32]))
                    .unwrap();
            }
        }));
    }
    for _ in 0..readers {
        let shard = Arc::clone(&shard);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut rng = rand::thread_rng();
            for _ in 0..1000 {
                let key = rng.gen_range(0..writers as i64 * per_writer);
                let out = shard
                    .find(&Tensor::from_vec(vec![key]), &Tensor::from_vec(vec![-1.0f32]))
                    .unwrap();
                let v = out.flat::<f32>().unwrap()[0];
                // either not yet written or the value its writer stored
                assert!(v == -1.0 || v == key as f32);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(shard.size(), writers * per_writer as usize);
}

#[test]
fn test_import_is_never_observed_half_applied() {
    let shard = new_scalar_shard(DType::Int64, DType::Int64, 0).unwrap();
    let batch_a: Vec<i64> = (0..256).collect();
    let batch_b: Vec<i64> = (1000..1256).collect();
    shard
        .import_values(&Tensor::from_vec(batch_a.clone()), &Tensor::from_vec(batch_a.clone()))
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let writer = {
        let shard = Arc::clone(&shard);
        let barrier = Arc::clone(&barrier);
        let (a, b) = (batch_a.clone(), batch_b.clone());
        thread::spawn(move || {
            barrier.wait();
            for round in 0..50 {
                let batch = if round % 2 == 0 { &b } else { &a };
                let tensor = Tensor::from_vec(batch.clone());
                shard.import_values(&tensor, &tensor).unwrap();
            }
        })
    };

    barrier.wait();
    for _ in 0..200 {
        let (keys, _) = shard.export_values().unwrap();
        let keys = keys.flat::<i64>().unwrap();
        assert_eq!(keys.len(), 256);
        let all_a = keys.iter().all(|k| *k < 1000);
        let all_b = keys.iter().all(|k| *k >= 1000);
        assert!(all_a || all_b);
    }
    writer.join().unwrap();
}
