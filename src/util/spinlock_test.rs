use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::{sync::Arc, thread};

use super::*;

#[test]
fn test_spinlock_exclusion() {
    let seed: u64 = random();
    println!("test_spinlock_exclusion seed:{}", seed);

    let spin = Arc::new(Spinlock::new((0_u64, 0_u64)));
    let n_threads = 4;
    let n_incrs = 10_000;

    let mut handles = vec![];
    for t in 0..n_threads {
        let spin = Arc::clone(&spin);
        handles.push(thread::spawn(move || {
            let mut rng = SmallRng::seed_from_u64(seed + t);
            for _ in 0..n_incrs {
                if rng.gen::<u8>() % 4 == 0 {
                    // both halves move in lock step under the latch.
                    let r = spin.read();
                    assert_eq!(r.0, r.1);
                } else {
                    let mut w = spin.write();
                    w.0 += 1;
                    w.1 += 1;
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let r = spin.read();
    assert_eq!(r.0, r.1);
    assert!(r.0 > 0);
}

#[test]
fn test_spinlock_reader_parallelism() {
    let spin = Arc::new(Spinlock::new(42_u64));

    let mut handles = vec![];
    for _ in 0..8 {
        let spin = Arc::clone(&spin);
        handles.push(thread::spawn(move || {
            for _ in 0..100_000 {
                assert_eq!(*spin.read(), 42);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
