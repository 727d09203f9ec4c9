use std::{sync::Arc, thread};

use super::*;

#[test]
fn test_hll_init_bad() {
    assert!(Hll::new(MIN_PRECISION - 1).is_err());
    assert!(Hll::new(MAX_PRECISION + 1).is_err());

    Hll::new(MIN_PRECISION).unwrap();
    Hll::new(MAX_PRECISION).unwrap();
}

#[test]
fn test_hll_from_bitmap_short() {
    let bm = Bitmap::anonymous(10).unwrap();
    assert!(Hll::from_bitmap(10, bm).is_err());

    let bm = Bitmap::anonymous(bytes_for_precision(10)).unwrap();
    let h = Hll::from_bitmap(10, bm).unwrap();
    assert_eq!(h.byte_size(), bytes_for_precision(10));
}

#[test]
fn test_hll_fresh_size() {
    let h = Hll::new(10).unwrap();
    assert_eq!(h.estimate(), 0.0);
}

#[test]
fn test_hll_add_size() {
    let h = Hll::new(10).unwrap();
    for i in 0..100 {
        h.add(format!("test{}", i).as_bytes());
    }
    let s = h.estimate();
    assert!(s > 95.0 && s < 105.0, "estimate {}", s);
}

#[test]
fn test_hll_add_duplicates() {
    let h = Hll::new(10).unwrap();
    for _ in 0..10 {
        for i in 0..100 {
            h.add(format!("test{}", i).as_bytes());
        }
    }
    let s = h.estimate();
    assert!(s > 95.0 && s < 105.0, "estimate {}", s);
}

#[test]
fn test_hll_error_bound() {
    // precision 14 -> variance of 1%
    let h = Hll::new(14).unwrap();
    for i in 0..10_000 {
        h.add(format!("test{}", i).as_bytes());
    }
    let s = h.estimate();
    assert!(s > 9_900.0 && s < 10_100.0, "estimate {}", s);
}

#[test]
fn test_hll_add_hash_rank_cap() {
    // a zero hash yields the maximum rank for register 0, which must
    // fit the 6-bit cell.
    let h = Hll::new(10).unwrap();
    h.add_hash(0);
    assert_eq!(h.get_register(0), 54); // 64 - 10
}

#[test]
fn test_hll_concurrent_add() {
    let h = Arc::new(Hll::new(12).unwrap());
    let mut handles = vec![];
    for t in 0..4 {
        let h = Arc::clone(&h);
        handles.push(thread::spawn(move || {
            for i in 0..2500 {
                h.add(format!("key-{}-{}", t, i).as_bytes());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    let s = h.estimate();
    assert!(s > 9_500.0 && s < 10_500.0, "estimate {}", s);
}

#[test]
fn test_hll_precision_for_error() {
    assert_eq!(precision_for_error(1.0), None);
    assert_eq!(precision_for_error(0.0), None);
    assert_eq!(precision_for_error(0.02), Some(12));
    assert_eq!(precision_for_error(0.01), Some(14));
    assert_eq!(precision_for_error(0.005), Some(16));
    // tighter than precision 18 can deliver.
    assert_eq!(precision_for_error(0.0001), None);
}

#[test]
fn test_hll_error_for_precision() {
    assert_eq!(error_for_precision(3), 0.0);
    assert_eq!(error_for_precision(20), 0.0);
    assert_eq!(error_for_precision(12), 0.01625);
    assert_eq!(error_for_precision(10), 0.0325);
    assert_eq!(error_for_precision(16), 0.0040625);
}

#[test]
fn test_hll_bytes_for_precision() {
    assert_eq!(bytes_for_precision(3), 0);
    assert_eq!(bytes_for_precision(20), 0);
    assert_eq!(bytes_for_precision(12), 3280);
    assert_eq!(bytes_for_precision(10), 820);
    assert_eq!(bytes_for_precision(14), 13108);
    assert_eq!(bytes_for_precision(16), 52432);
}
