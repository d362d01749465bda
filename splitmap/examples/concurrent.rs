//! Example: concurrent operations on the split-ordered map
//!
//! Several threads insert, read and remove at once while the map doubles its
//! bucket count underneath them.

use splitmap::SplitOrderedMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn main() {
    println!("=== Split-Ordered Map Demo ===\n");

    // Starts with one bucket and may grow to 1 << 15 buckets.
    let map = Arc::new(SplitOrderedMap::new(1 << 17, 4));

    println!("Inserting from 8 threads...");
    let start = Instant::now();
    let handles: Vec<_> = (0..8u32)
        .map(|thread_id| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..10_000 {
                    let key = thread_id * 10_000 + i;
                    map.put(key, key * 2);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let duration = start.elapsed();
    println!(
        "Inserted 80,000 entries in {:?} ({:.2} ops/sec)",
        duration,
        80_000.0 / duration.as_secs_f64()
    );
    println!(
        "Map holds {} entries in {} buckets\n",
        map.len(),
        map.bucket_count()
    );

    println!("Mixed readers, writers and removers...");
    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            let mut found = 0u32;
            for key in 0..20_000 {
                if map.get(key).is_some() {
                    found += 1;
                }
            }
            found
        }));
    }
    for thread_id in 0..2u32 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..5_000 {
                map.put(80_000 + thread_id * 5_000 + i, i);
            }
            0
        }));
    }
    for thread_id in 0..2u32 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            let mut removed = 0u32;
            for i in 0..2_500 {
                if map.remove(thread_id * 2_500 + i) {
                    removed += 1;
                }
            }
            removed
        }));
    }
    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    println!("Mixed phase done in {:?} ({} hits and removals)", start.elapsed(), total);
    println!("Final map size: {} entries\n", map.len());

    println!("Verifying data integrity...");
    let verified = (5_000..80_000).filter(|&key| map.get(key) == Some(key * 2)).count();
    println!("Verified {} of 75,000 untouched entries", verified);
}
