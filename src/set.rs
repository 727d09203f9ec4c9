//! Module `set` implement one named HyperLogLog set.
//!
//! A [Set] owns its sketch, the backing bitmap and the on-disk folder
//! `<data_dir>/hlld.<name>` holding `registers.mmap` and `config.ini`.
//! Registers are faulted in on demand and can be faulted back out when
//! the set goes cold; while proxied, `size` serves the estimate cached
//! at the last flush. In-memory sets never touch the filesystem.

use log::{debug, error, info};

use std::{
    fs, path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
        Arc, RwLock,
    },
    time,
};

use crate::{
    bitmap::{Bitmap, Mode},
    config::{Config, SetConfig},
    err_at, hll,
    hll::Hll,
    util::{self, Spinlock},
    Result,
};

/// Folder prefix for sets under the data directory.
pub const FOLDER_PREFIX: &str = "hlld.";

/// File holding the raw registers of a set.
const DATA_FILE_NAME: &str = "registers.mmap";

/// File holding the per-set configuration.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Counters maintained for each set. Thread safe, but reads may be
/// mutually inconsistent.
#[derive(Default)]
pub struct Counters {
    sets: AtomicU64,
    page_ins: AtomicU64,
    page_outs: AtomicU64,
}

impl Counters {
    /// Number of keys added over the set's lifetime.
    pub fn sets(&self) -> u64 {
        self.sets.load(SeqCst)
    }

    /// Number of times an existing register file was faulted in.
    pub fn page_ins(&self) -> u64 {
        self.page_ins.load(SeqCst)
    }

    /// Number of times the registers were faulted out.
    pub fn page_outs(&self) -> u64 {
        self.page_outs.load(SeqCst)
    }
}

/// A named HyperLogLog set.
pub struct Set {
    config: Arc<Config>,
    name: String,
    full_path: path::PathBuf,

    eps: f64,
    precision: u8,
    in_memory: bool,

    // cached estimate from the last flush, served while proxied.
    size: AtomicU64,
    is_dirty: AtomicBool,
    is_proxied: AtomicBool,

    // the rwlock guards the lifetime of the sketch: add/size/flush
    // take the read end, fault-in and fault-out take the write end.
    hll: RwLock<Option<Hll>>,
    // serializes the 6-bit register read-modify-write.
    hll_update: Spinlock<u32>,

    counters: Counters,
}

impl Set {
    /// Open the set `name`, creating its folder when missing and
    /// reading the per-set config when present. With `discover` the
    /// registers are faulted in and the config file flushed out;
    /// otherwise the set stays proxied.
    pub fn open(config: Arc<Config>, name: &str, discover: bool) -> Result<Set> {
        let full_path = config.data_dir.join(format!("{}{}", FOLDER_PREFIX, name));

        let mut set_config = SetConfig::from(config.as_ref());
        if !set_config.in_memory {
            err_at!(
                IOError,
                fs::create_dir_all(&full_path),
                "failed to create set directory {:?}",
                full_path
            )?;
            set_config.load(&full_path.join(CONFIG_FILE_NAME))?;
        }

        let set = Set {
            config,
            name: name.to_string(),
            full_path,

            eps: set_config.default_eps,
            precision: set_config.default_precision,
            in_memory: set_config.in_memory,

            size: AtomicU64::new(set_config.size),
            is_dirty: AtomicBool::new(true),
            is_proxied: AtomicBool::new(true),

            hll: RwLock::new(None),
            hll_update: Spinlock::new(0),

            counters: Counters::default(),
        };

        if discover {
            set.fault_in()?;
        }
        // first flush writes the ini file for brand new sets; a no-op
        // while proxied.
        set.flush()?;

        Ok(set)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn in_memory(&self) -> bool {
        self.in_memory
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Whether the registers are currently not resident.
    pub fn is_proxied(&self) -> bool {
        self.is_proxied.load(SeqCst)
    }

    /// Add a key to the set, faulting the registers in if needed.
    pub fn add(&self, key: &str) -> Result<()> {
        // hash outside any lock, the expensive cpu bit.
        let (_, hash) = mur3::murmurhash3_x64_128(key.as_bytes(), 0);
        loop {
            {
                let guard = err_at!(Fatal, self.hll.read())?;
                if let Some(hll) = guard.as_ref() {
                    {
                        let _w = self.hll_update.write();
                        hll.add_hash(hash);
                        self.counters.sets.fetch_add(1, SeqCst);
                    }
                    self.is_dirty.store(true, SeqCst);
                    return Ok(());
                }
            }
            // raced with a fault-out, or first touch.
            self.fault_in()?;
        }
    }

    /// Estimated cardinality. Serves the cached estimate while
    /// proxied, without faulting the registers in.
    pub fn size(&self) -> Result<u64> {
        let guard = err_at!(Fatal, self.hll.read())?;
        match guard.as_ref() {
            Some(hll) => Ok(hll.estimate() as u64),
            None => Ok(self.size.load(SeqCst)),
        }
    }

    /// Total byte size of the registers, resident or not.
    pub fn byte_size(&self) -> Result<u64> {
        let guard = err_at!(Fatal, self.hll.read())?;
        match guard.as_ref() {
            Some(hll) => Ok(hll.byte_size()),
            None => Ok(hll::bytes_for_precision(self.precision)),
        }
    }

    /// Flush the set. Idempotent when proxied or clean.
    pub fn flush(&self) -> Result<()> {
        let guard = err_at!(Fatal, self.hll.read())?;
        match guard.as_ref() {
            Some(hll) => self.do_flush(hll),
            None => Ok(()),
        }
    }

    fn do_flush(&self, hll: &Hll) -> Result<()> {
        if !self.is_dirty.load(SeqCst) {
            return Ok(());
        }
        let start = time::Instant::now();

        // store the estimate for a future unmap.
        self.size.store(hll.estimate() as u64, SeqCst);

        if !self.in_memory {
            let set_config = self.to_set_config();
            let loc = self.full_path.join(CONFIG_FILE_NAME);
            if let Err(err) = set_config.save(&loc) {
                error!(
                    target: "set",
                    "failed to write set {:?} configuration: {}", self.name, err
                );
            }
        }
        self.is_dirty.store(false, SeqCst);

        if !self.in_memory {
            hll.flush()?;
        }
        debug!(
            target: "set",
            "flushed set {:?}, total time {} msec", self.name, util::elapsed_msec(start)
        );
        Ok(())
    }

    /// Gracefully fault the registers out. Idempotent when proxied.
    pub fn close(&self) -> Result<()> {
        let mut guard = err_at!(Fatal, self.hll.write())?;
        if let Some(hll) = guard.take() {
            self.do_flush(&hll)?;
            hll.close()?;
            self.is_proxied.store(true, SeqCst);
            self.counters.page_outs.fetch_add(1, SeqCst);
        }
        Ok(())
    }

    /// Close the set and remove every file under its folder, then the
    /// folder itself. In-memory sets have nothing on disk.
    pub fn delete(&self) -> Result<()> {
        self.close()?;
        if self.in_memory {
            return Ok(());
        }

        let entries: Vec<fs::DirEntry> = match fs::read_dir(&self.full_path) {
            Ok(dirs) => dirs.filter_map(|e| e.ok()).collect(),
            Err(err) => {
                error!(
                    target: "set",
                    "failed to scan {:?} for delete: {}", self.full_path, err
                );
                return Ok(());
            }
        };
        info!(
            target: "set",
            "deleting {} files for set {:?}", entries.len(), self.name
        );
        for entry in entries {
            if let Err(err) = fs::remove_file(entry.path()) {
                error!(target: "set", "failed to delete {:?}: {}", entry.path(), err);
            }
        }
        if let Err(err) = fs::remove_dir(&self.full_path) {
            error!(target: "set", "failed to delete {:?}: {}", self.full_path, err);
        }
        Ok(())
    }

    fn to_set_config(&self) -> SetConfig {
        SetConfig {
            default_eps: self.eps,
            default_precision: self.precision,
            in_memory: self.in_memory,
            size: self.size.load(SeqCst),
        }
    }

    // Fault the registers in. Double-checked under the write end of
    // the sketch lock.
    fn fault_in(&self) -> Result<()> {
        let mut guard = err_at!(Fatal, self.hll.write())?;
        if guard.is_some() {
            return Ok(());
        }

        let size = hll::bytes_for_precision(self.precision);
        let bitmap = if self.in_memory {
            Bitmap::anonymous(size)?
        } else {
            let mode = match self.config.use_mmap {
                true => Mode::Shared,
                false => Mode::Persistent,
            };
            let loc = self.full_path.join(DATA_FILE_NAME);
            match fs::metadata(&loc) {
                Ok(md) => {
                    info!(target: "set", "discovered HLL set {:?}", loc);
                    let bitmap = Bitmap::open_from_path(&loc, md.len(), false, mode)?;
                    self.counters.page_ins.fetch_add(1, SeqCst);
                    bitmap
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    info!(target: "set", "creating HLL set {:?}", loc);
                    Bitmap::open_from_path(&loc, size, true, mode)?
                }
                Err(err) => {
                    return err_at!(IOError, Err(err), "query register file {:?}", loc)
                }
            }
        };

        *guard = Some(Hll::from_bitmap(self.precision, bitmap)?);
        self.is_proxied.store(false, SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "set_test.rs"]
mod set_test;
