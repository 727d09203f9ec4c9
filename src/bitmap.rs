//! Module `bitmap` implement the byte buffer backing HLL registers.
//!
//! A [Bitmap] is a fixed length buffer addressable as bits, bytes or
//! 32-bit words, created in one of three [Mode]s:
//!
//! * [Mode::Anonymous], plain process memory, flush is a no-op.
//! * [Mode::Shared], shared memory mapping of a file, flush asks the
//!   kernel to synchronise the mapping and then forces the file.
//! * [Mode::Persistent], file read once into a private anonymous
//!   region, flush writes every 4096-byte page back with positional
//!   writes and then forces the file.
//!
//! Word and byte access go through an atomic view of the mapping so
//! that readers computing an estimate never tear a concurrent register
//! update.

use log::error;
use memmap2::MmapMut;

use std::{
    fs,
    os::unix::fs::FileExt,
    path,
    sync::atomic::{AtomicU32, AtomicU8, Ordering::SeqCst},
};

use crate::{err_at, Result};

const PAGE_SIZE: u64 = 4096;

/// Backing mode for a [Bitmap].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mode {
    /// Anonymous memory, not backed by any file.
    Anonymous,
    /// Shared memory mapping of a file, kernel handles write back.
    Shared,
    /// Private copy of a file, pages written back manually on flush.
    Persistent,
}

/// Fixed length byte buffer, possibly backed by a file.
pub struct Bitmap {
    mode: Mode,
    file: Option<fs::File>,
    map: MmapMut,
    size: u64,
}

impl Bitmap {
    /// Create an anonymous bitmap of `len` bytes, all zero.
    pub fn anonymous(len: u64) -> Result<Bitmap> {
        if len == 0 {
            return err_at!(InvalidInput, msg: "zero length bitmap");
        }
        let map = err_at!(IOError, MmapMut::map_anon(len as usize))?;
        Ok(Bitmap {
            mode: Mode::Anonymous,
            file: None,
            map,
            size: len,
        })
    }

    /// Open a file-backed bitmap of `len` bytes at `loc`.
    ///
    /// With `create`, a missing file is created and a zero-length file
    /// is truncated to `len`; an existing file of any other length is
    /// an error. When creation of a new file fails part way, the file
    /// is unlinked. Without `create` the file must exist and is opened
    /// at `len`.
    pub fn open_from_path(loc: &path::Path, len: u64, create: bool, mode: Mode) -> Result<Bitmap> {
        if len == 0 {
            return err_at!(InvalidInput, msg: "zero length bitmap {:?}", loc);
        }
        if mode == Mode::Anonymous {
            return err_at!(InvalidInput, msg: "anonymous bitmap cannot be file backed");
        }

        let mut opts = fs::OpenOptions::new();
        opts.read(true).write(true);
        if create {
            opts.create(true);
        }
        let file = match opts.open(loc) {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                err_at!(InvalidFile, msg: "missing bitmap file {:?}", loc)
            }
            Err(err) => err_at!(IOError, Err(err), "open bitmap {:?}", loc),
        }?;

        let mut new_bitmap = false;
        if create {
            let n = err_at!(IOError, file.metadata())?.len();
            if n == 0 {
                // only ever truncate a new file, never resize an
                // existing one.
                new_bitmap = true;
                if let Err(err) = file.set_len(len) {
                    fs::remove_file(loc).ok();
                    return err_at!(IOError, Err(err), "truncate bitmap {:?}", loc);
                }
            } else if n != len {
                return err_at!(
                    InvalidFile, msg: "bitmap {:?} length {} != {}", loc, n, len
                );
            }
        }

        let res = Bitmap::from_file(file, len, mode, new_bitmap);
        if res.is_err() && new_bitmap {
            if fs::remove_file(loc).is_err() {
                error!(target: "bitmap", "failed to unlink new file {:?}", loc);
            }
        }
        res
    }

    fn from_file(file: fs::File, len: u64, mode: Mode, new_bitmap: bool) -> Result<Bitmap> {
        let map = match mode {
            Mode::Shared => err_at!(IOError, unsafe { MmapMut::map_mut(&file) })?,
            Mode::Persistent => {
                let mut map = err_at!(IOError, MmapMut::map_anon(len as usize))?;
                // existing data must be read in explicitly, the kernel
                // cannot fault it into a private anonymous region.
                if !new_bitmap {
                    fill_buffer(&file, &mut map, len)?;
                }
                map
            }
            Mode::Anonymous => unreachable!(),
        };

        Ok(Bitmap {
            mode,
            file: Some(file),
            map,
            size: len,
        })
    }

    /// Flush the bitmap back to its backing file. Idempotent, and a
    /// no-op for anonymous bitmaps.
    pub fn flush(&self) -> Result<()> {
        match self.mode {
            Mode::Anonymous => return Ok(()),
            Mode::Shared => err_at!(IOError, self.map.flush())?,
            Mode::Persistent => self.flush_all_pages()?,
        }
        match self.file.as_ref() {
            Some(file) => err_at!(IOError, file.sync_all()),
            None => err_at!(Fatal, msg: "file backed bitmap without a file handle"),
        }
    }

    // Persistent mode, write every page back with positional writes.
    // Last page may be short.
    fn flush_all_pages(&self) -> Result<()> {
        let file = match self.file.as_ref() {
            Some(file) => file,
            None => return err_at!(Fatal, msg: "file backed bitmap without a file handle"),
        };
        let pages = (self.size + PAGE_SIZE - 1) / PAGE_SIZE;
        for page in 0..pages {
            let off = page * PAGE_SIZE;
            let till = std::cmp::min(off + PAGE_SIZE, self.size);
            write_at_fully(file, &self.map[off as usize..till as usize], off)?;
        }
        Ok(())
    }

    /// Flush and release the bitmap. Dropping a bitmap without calling
    /// close releases memory but does not flush.
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    /// Length of the bitmap in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Value of bit `idx`, bit 7-(idx%8) of byte idx/8.
    pub fn getbit(&self, idx: u64) -> bool {
        let byte = self.byte(idx / 8).load(SeqCst);
        (byte >> (7 - (idx % 8))) & 0x1 == 0x1
    }

    /// Set bit `idx`.
    pub fn setbit(&self, idx: u64) {
        self.byte(idx / 8).fetch_or(1 << (7 - (idx % 8)), SeqCst);
    }

    fn byte(&self, idx: u64) -> &AtomicU8 {
        assert!(idx < self.size, "byte index {} >= {}", idx, self.size);
        unsafe { &*(self.map.as_ptr().add(idx as usize) as *const AtomicU8) }
    }

    /// Atomic view of the `idx`-th 32-bit word. The mapping is page
    /// aligned, so words are naturally aligned.
    pub fn word(&self, idx: u64) -> &AtomicU32 {
        assert!((idx * 4) + 4 <= self.size, "word index {} >= {}", idx, self.size / 4);
        unsafe { &*(self.map.as_ptr() as *const AtomicU32).add(idx as usize) }
    }

    /// Copy of the raw bytes, for inspection.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.map[..self.size as usize].to_vec()
    }
}

fn fill_buffer(file: &fs::File, buf: &mut [u8], len: u64) -> Result<()> {
    let mut total: usize = 0;
    while (total as u64) < len {
        match file.read_at(&mut buf[total..len as usize], total as u64) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => (),
            Err(err) => return err_at!(IOError, Err(err), "fill bitmap buffer"),
        }
    }
    Ok(())
}

fn write_at_fully(file: &fs::File, buf: &[u8], off: u64) -> Result<()> {
    let mut total: usize = 0;
    while total < buf.len() {
        match file.write_at(&buf[total..], off + (total as u64)) {
            Ok(0) => return err_at!(IOError, msg: "zero length write at {}", off),
            Ok(n) => total += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => (),
            Err(err) => return err_at!(IOError, Err(err), "flush bitmap page"),
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "bitmap_test.rs"]
mod bitmap_test;
