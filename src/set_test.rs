use std::{env, fs, path, sync::Arc, thread};

use super::*;

fn test_config(name: &str) -> Arc<Config> {
    let dir = env::temp_dir().join(format!("hlld-set-{}", name));
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();

    let mut config = Config::default();
    config.data_dir = dir;
    Arc::new(config)
}

fn folder(config: &Arc<Config>, name: &str) -> path::PathBuf {
    config.data_dir.join(format!("{}{}", FOLDER_PREFIX, name))
}

#[test]
fn test_set_open_lazy() {
    let config = test_config("open-lazy");
    let set = Set::open(Arc::clone(&config), "foo", false).unwrap();

    assert!(set.is_proxied());
    assert_eq!(set.size().unwrap(), 0);
    assert_eq!(set.precision(), 12);
    assert_eq!(set.eps(), 0.01625);
    // proxied byte size is implied by the precision.
    assert_eq!(set.byte_size().unwrap(), hll::bytes_for_precision(12));

    // the folder exists, the registers are not faulted in yet.
    assert!(folder(&config, "foo").is_dir());
    assert!(!folder(&config, "foo").join("registers.mmap").exists());
}

#[test]
fn test_set_open_discover() {
    let config = test_config("open-discover");
    let set = Set::open(Arc::clone(&config), "foo", true).unwrap();

    assert!(!set.is_proxied());
    assert_eq!(set.byte_size().unwrap(), hll::bytes_for_precision(12));
    // discover writes the first config file and creates the registers.
    assert!(folder(&config, "foo").join("config.ini").exists());
    assert!(folder(&config, "foo").join("registers.mmap").exists());
    assert_eq!(
        fs::metadata(folder(&config, "foo").join("registers.mmap")).unwrap().len(),
        hll::bytes_for_precision(12)
    );
    // a fresh file is not a page-in.
    assert_eq!(set.counters().page_ins(), 0);
}

#[test]
fn test_set_add_size() {
    let config = test_config("add-size");
    let set = Set::open(config, "foo", false).unwrap();

    for i in 0..100 {
        set.add(&format!("test{}", i)).unwrap();
    }
    assert!(!set.is_proxied());
    assert_eq!(set.counters().sets(), 100);

    let size = set.size().unwrap();
    assert!(size > 95 && size < 105, "estimate {}", size);
}

#[test]
fn test_set_flush_close_reopen() {
    let config = test_config("flush-close-reopen");
    let set = Set::open(Arc::clone(&config), "foo", false).unwrap();

    for i in 0..1000 {
        set.add(&format!("foobar{}", i)).unwrap();
    }
    let size = set.size().unwrap();
    set.flush().unwrap();

    set.close().unwrap();
    assert!(set.is_proxied());
    assert_eq!(set.counters().page_outs(), 1);
    // proxied size serves the cached estimate without faulting in.
    assert_eq!(set.size().unwrap(), size);
    assert!(set.is_proxied());
    // close is idempotent once proxied.
    set.close().unwrap();
    assert_eq!(set.counters().page_outs(), 1);

    // a fresh discover of the same folder yields the same estimate.
    let set = Set::open(Arc::clone(&config), "foo", true).unwrap();
    assert!(!set.is_proxied());
    assert_eq!(set.counters().page_ins(), 1);
    assert_eq!(set.size().unwrap(), size);
}

#[test]
fn test_set_mmap_mode_reopen() {
    let mut config = (*test_config("mmap-mode")).clone();
    config.use_mmap = true;
    let config = Arc::new(config);

    let set = Set::open(Arc::clone(&config), "foo", false).unwrap();
    for i in 0..1000 {
        set.add(&format!("foobar{}", i)).unwrap();
    }
    let size = set.size().unwrap();
    set.flush().unwrap();
    set.close().unwrap();

    let set = Set::open(config, "foo", true).unwrap();
    assert_eq!(set.size().unwrap(), size);
}

#[test]
fn test_set_error_bound() {
    // default precision 12, scenario bound of 2%.
    let config = test_config("error-bound");
    let set = Set::open(config, "d", false).unwrap();
    for i in 0..10_000 {
        set.add(&format!("foobar{}", i)).unwrap();
    }
    let size = set.size().unwrap();
    assert!(size >= 9_800 && size <= 10_200, "estimate {}", size);
}

#[test]
fn test_set_in_memory() {
    let mut config = (*test_config("in-memory")).clone();
    config.in_memory = true;
    let config = Arc::new(config);

    let set = Set::open(Arc::clone(&config), "mem", false).unwrap();
    assert!(set.in_memory());
    set.add("key").unwrap();
    assert!(!set.is_proxied());
    set.flush().unwrap();

    // in-memory sets leave nothing on disk.
    assert!(!folder(&config, "mem").exists());
    set.delete().unwrap();
    assert!(!folder(&config, "mem").exists());
}

#[test]
fn test_set_delete() {
    let config = test_config("delete");
    let set = Set::open(Arc::clone(&config), "foo", true).unwrap();
    set.add("key").unwrap();
    set.flush().unwrap();

    assert!(folder(&config, "foo").is_dir());
    set.delete().unwrap();
    assert!(!folder(&config, "foo").exists());
}

#[test]
fn test_set_custom_config_persisted() {
    // per-set settings survive in config.ini and override the
    // defaults on a re-open.
    let base = test_config("custom-config");
    let mut custom = (*base).clone();
    custom.default_precision = 14;
    custom.default_eps = hll::error_for_precision(14);

    let set = Set::open(Arc::new(custom), "foo", true).unwrap();
    assert_eq!(set.precision(), 14);
    assert_eq!(set.byte_size().unwrap(), hll::bytes_for_precision(14));
    set.close().unwrap();

    let set = Set::open(Arc::clone(&base), "foo", false).unwrap();
    assert_eq!(set.precision(), 14);
    assert_eq!(set.eps(), hll::error_for_precision(14));
}

#[test]
fn test_set_concurrent_add() {
    let config = test_config("concurrent-add");
    let set = Arc::new(Set::open(config, "foo", false).unwrap());

    let mut handles = vec![];
    for t in 0..4 {
        let set = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for i in 0..2500 {
                set.add(&format!("key-{}-{}", t, i)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(set.counters().sets(), 10_000);
    let size = set.size().unwrap();
    assert!(size > 9_500 && size < 10_500, "estimate {}", size);
}
