//! Module `hll` implement the HyperLogLog sketch over a [Bitmap].
//!
//! A sketch of precision `p` holds `m = 2^p` 6-bit registers, packed
//! five registers to a 32-bit word in the low 30 bits. Adding a hashed
//! value uses the low `p` bits as the register index and the position
//! of the first set bit in the remaining `64-p` bits as the register
//! candidate. The cardinality estimate is the bias-corrected harmonic
//! mean of the registers, with linear counting for the small range and
//! a logarithmic correction for the large range.

use std::sync::atomic::Ordering::SeqCst;

use crate::{bitmap::Bitmap, err_at, Result};

/// Minimum digits of precision, 16 registers.
pub const MIN_PRECISION: u8 = 4;
/// Maximum digits of precision, 262,144 registers.
pub const MAX_PRECISION: u8 = 18;

// 6-bit registers, 5 to a 32-bit word.
const REG_WIDTH: u32 = 6;
const REG_PER_WORD: u64 = 5;

const TWO_POW_64: f64 = 18446744073709551616.0; // 2^64

/// HyperLogLog sketch of `2^precision` registers packed into a bitmap.
pub struct Hll {
    precision: u8,
    bitmap: Bitmap,
}

impl Hll {
    /// Create a sketch over anonymous memory.
    pub fn new(precision: u8) -> Result<Hll> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return err_at!(InvalidInput, msg: "precision {} out of range", precision);
        }
        let bitmap = Bitmap::anonymous(bytes_for_precision(precision))?;
        Hll::from_bitmap(precision, bitmap)
    }

    /// Create a sketch over `bitmap`, which must be at least
    /// [bytes_for_precision] long.
    pub fn from_bitmap(precision: u8, bitmap: Bitmap) -> Result<Hll> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return err_at!(InvalidInput, msg: "precision {} out of range", precision);
        }
        let n = bytes_for_precision(precision);
        if bitmap.len() < n {
            return err_at!(
                InvalidFile, msg: "bitmap {} bytes, need {} for precision {}",
                bitmap.len(), n, precision
            );
        }
        Ok(Hll { precision, bitmap })
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Number of registers in this sketch.
    pub fn num_registers(&self) -> u64 {
        1 << self.precision
    }

    /// Length of the backing bitmap in bytes.
    pub fn byte_size(&self) -> u64 {
        self.bitmap.len()
    }

    /// Flush the backing bitmap.
    pub fn flush(&self) -> Result<()> {
        self.bitmap.flush()
    }

    /// Flush and release the backing bitmap.
    pub fn close(self) -> Result<()> {
        self.bitmap.close()
    }

    /// Hash `key` and add it to the sketch.
    pub fn add(&self, key: &[u8]) {
        let (_, hash) = mur3::murmurhash3_x64_128(key, 0);
        self.add_hash(hash)
    }

    /// Add a 64-bit hashed value to the sketch.
    ///
    /// Concurrent callers are safe but may both win the register race;
    /// callers serialize on a short spin so the max semantics hold with
    /// plain read-modify-write cost.
    pub fn add_hash(&self, hash: u64) {
        let idx = hash & (self.num_registers() - 1);
        let rest = hash >> self.precision;
        let max_rank = 64 - (self.precision as u32);
        let rank = if rest == 0 {
            max_rank
        } else {
            std::cmp::min(max_rank, rest.leading_zeros() + 1 - (self.precision as u32))
        };
        self.update_register(idx, rank);
    }

    /// Estimate the cardinality of the sketch.
    pub fn estimate(&self) -> f64 {
        let m = self.num_registers() as f64;
        let mut inv_sum = 0.0;
        let mut num_zero = 0u64;
        for idx in 0..self.num_registers() {
            let reg = self.get_register(idx);
            inv_sum += 1.0 / ((1u64 << reg) as f64);
            if reg == 0 {
                num_zero += 1;
            }
        }
        let raw = alpha(self.precision) * m * m / inv_sum;

        // small range, fall back to linear counting while empty
        // registers remain.
        if raw <= 2.5 * m && num_zero > 0 {
            return m * (m / (num_zero as f64)).ln();
        }
        // large range correction for the 64-bit hash space.
        if raw > TWO_POW_64 / 30.0 {
            return -TWO_POW_64 * (1.0 - raw / TWO_POW_64).ln();
        }
        raw
    }

    fn get_register(&self, idx: u64) -> u32 {
        let word = self.bitmap.word(idx / REG_PER_WORD).load(SeqCst);
        let shift = REG_WIDTH * ((idx % REG_PER_WORD) as u32);
        (word >> shift) & 0x3F
    }

    // compare-and-set the 6-bit cell to max(old, rank).
    fn update_register(&self, idx: u64, rank: u32) {
        let cell = self.bitmap.word(idx / REG_PER_WORD);
        let shift = REG_WIDTH * ((idx % REG_PER_WORD) as u32);
        let mut word = cell.load(SeqCst);
        loop {
            if ((word >> shift) & 0x3F) >= rank {
                break;
            }
            let new = (word & !(0x3F << shift)) | (rank << shift);
            match cell.compare_exchange_weak(word, new, SeqCst, SeqCst) {
                Ok(_) => break,
                Err(current) => word = current,
            }
        }
    }
}

// Bias correction constant keyed by precision.
fn alpha(precision: u8) -> f64 {
    match precision {
        4 => 0.673,
        5 => 0.697,
        6 => 0.709,
        _ => {
            let m = (1u64 << precision) as f64;
            0.7213 / (1.0 + 1.079 / m)
        }
    }
}

/// Expected relative error for `precision`, `1.04 / sqrt(2^p)`.
/// Returns 0 outside the valid range.
pub fn error_for_precision(precision: u8) -> f64 {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return 0.0;
    }
    1.04 / ((1u64 << precision) as f64).sqrt()
}

/// Smallest precision whose expected error is within `eps`, or None
/// when no valid precision can satisfy it.
pub fn precision_for_error(eps: f64) -> Option<u8> {
    if eps <= 0.0 || eps >= 1.0 {
        return None;
    }
    (MIN_PRECISION..=MAX_PRECISION).find(|p| error_for_precision(*p) <= eps)
}

/// Bytes required for the registers of `precision`, 0 when out of
/// range. Registers pack 5 to a 32-bit word.
pub fn bytes_for_precision(precision: u8) -> u64 {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return 0;
    }
    let m = 1u64 << precision;
    ((m + REG_PER_WORD - 1) / REG_PER_WORD) * 4
}

#[cfg(test)]
#[path = "hll_test.rs"]
mod hll_test;
