use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::collections::BTreeMap;

use super::*;

#[test]
fn test_radix_crud() {
    let mut index: Radix<u64> = Radix::new();
    assert!(index.is_empty());

    assert_eq!(index.insert(b"alpha", 1), None);
    assert_eq!(index.insert(b"beta", 2), None);
    assert_eq!(index.len(), 2);

    assert_eq!(index.search(b"alpha"), Some(&1));
    assert_eq!(index.search(b"beta"), Some(&2));
    assert_eq!(index.search(b"gamma"), None);
    assert_eq!(index.search(b"alph"), None);

    // replace keeps the count.
    assert_eq!(index.insert(b"alpha", 10), Some(1));
    assert_eq!(index.len(), 2);
    assert_eq!(index.search(b"alpha"), Some(&10));

    assert_eq!(index.remove(b"alpha"), Some(10));
    assert_eq!(index.remove(b"alpha"), None);
    assert_eq!(index.len(), 1);
    assert_eq!(index.search(b"alpha"), None);
    assert_eq!(index.search(b"beta"), Some(&2));
}

#[test]
fn test_radix_nul_terminated_keys() {
    // the set-manager appends a NUL so `ab` and `abc` stay distinct.
    let mut index: Radix<u64> = Radix::new();
    index.insert(b"ab\0", 1);
    index.insert(b"abc\0", 2);

    assert_eq!(index.search(b"ab\0"), Some(&1));
    assert_eq!(index.search(b"abc\0"), Some(&2));
    assert_eq!(index.search(b"ab"), None);

    let mut keys = vec![];
    index.iter_prefix(b"ab", &mut |key: &[u8], _: &u64| {
        keys.push(key.to_vec());
        WalkRes::Ok
    });
    assert_eq!(keys, vec![b"ab\0".to_vec(), b"abc\0".to_vec()]);

    let mut keys = vec![];
    index.iter_prefix(b"abc", &mut |key: &[u8], _: &u64| {
        keys.push(key.to_vec());
        WalkRes::Ok
    });
    assert_eq!(keys, vec![b"abc\0".to_vec()]);
}

#[test]
fn test_radix_iter_order() {
    let mut index: Radix<usize> = Radix::new();
    let keys: Vec<&[u8]> = vec![b"zoo", b"ant", b"antler", b"bee", b"a", b"z"];
    for (off, key) in keys.iter().enumerate() {
        index.insert(key, off);
    }
    assert_eq!(index.len(), keys.len());

    let mut got = vec![];
    index.iter(&mut |key: &[u8], _: &usize| {
        got.push(key.to_vec());
        WalkRes::Ok
    });

    let mut sorted: Vec<Vec<u8>> = keys.iter().map(|k| k.to_vec()).collect();
    sorted.sort();
    assert_eq!(got, sorted);
}

#[test]
fn test_radix_iter_stop() {
    let mut index: Radix<usize> = Radix::new();
    for (off, key) in [b"a", b"b", b"c", b"d"].iter().enumerate() {
        index.insert(&key[..], off);
    }
    let mut seen = 0;
    let res = index.iter(&mut |_: &[u8], _: &usize| {
        seen += 1;
        match seen {
            2 => WalkRes::Stop,
            _ => WalkRes::Ok,
        }
    });
    assert!(res == WalkRes::Stop);
    assert_eq!(seen, 2);
}

#[test]
fn test_radix_prefix_miss() {
    let mut index: Radix<usize> = Radix::new();
    index.insert(b"foo", 1);

    let mut seen = 0;
    index.iter_prefix(b"bar", &mut |_: &[u8], _: &usize| {
        seen += 1;
        WalkRes::Ok
    });
    assert_eq!(seen, 0);
}

#[test]
fn test_radix_copy() {
    let mut index: Radix<u64> = Radix::new();
    index.insert(b"one\0", 1);
    index.insert(b"two\0", 2);

    let copied = index.copy();
    assert_eq!(copied.len(), 2);

    // mutating the source must not show through the copy.
    index.remove(b"one\0");
    index.insert(b"two\0", 20);
    assert_eq!(copied.search(b"one\0"), Some(&1));
    assert_eq!(copied.search(b"two\0"), Some(&2));
    assert_eq!(index.search(b"two\0"), Some(&20));
}

#[test]
fn test_radix_random_against_btree() {
    let seed: u64 = random();
    println!("test_radix_random_against_btree seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut index: Radix<u64> = Radix::new();
    let mut reference: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

    for _ in 0..10_000 {
        let key: Vec<u8> = {
            let n = (rng.gen::<usize>() % 8) + 1;
            (0..n).map(|_| rng.gen::<u8>() % 4 + b'a').collect()
        };
        let value: u64 = rng.gen();
        match rng.gen::<u8>() % 3 {
            0 | 1 => {
                assert_eq!(index.insert(&key, value), reference.insert(key, value));
            }
            _ => {
                assert_eq!(index.remove(&key), reference.remove(&key));
            }
        }
    }

    assert_eq!(index.len(), reference.len());
    let mut got = vec![];
    index.iter(&mut |key: &[u8], value: &u64| {
        got.push((key.to_vec(), *value));
        WalkRes::Ok
    });
    let expected: Vec<(Vec<u8>, u64)> =
        reference.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(got, expected);
}
