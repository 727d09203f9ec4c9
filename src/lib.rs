//! Package implement a network daemon for approximate cardinality
//! estimation over very large key streams.
//!
//! Each named set is backed by a [HyperLogLog][hll] sketch using a few
//! kilobytes of registers, capable of estimating counts into the
//! trillions with bounded relative error. Sets are managed by the
//! [manager::SetManager] type, a concurrent registry built on a simple
//! form of multi-version-concurrency-control: reads are latch-free,
//! destructive operations serialize on a single mutex, and a background
//! vacuum thread merges pending changes and reclaims retired sets once
//! every client has moved past them.
//!
//! Component layout, bottom up:
//!
//! * [bitmap], fixed size byte buffer with three backing modes.
//! * [hll], 6-bit-register sketch packed into a bitmap.
//! * [set], one sketch per named set, with on-demand fault-in,
//!   dirty-flush and cold fault-out.
//! * [radix], ordered byte-keyed index with prefix iteration.
//! * [manager], the MVCC registry of name -> set.
//! * [background], periodic flush and cold-unmap sweeps.
//! * [config], INI configuration for the daemon and for each set.
//! * [server], line oriented TCP protocol boundary.
//!
//! [hll]: https://en.wikipedia.org/wiki/HyperLogLog

use std::fmt;

/// Convert error to crate's [Error] type, preserving the file and line
/// of the call site in the error value.
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod background;
pub mod bitmap;
pub mod config;
pub mod hll;
pub mod manager;
pub mod radix;
pub mod server;
pub mod set;
pub mod util;

/// Error enumerates over all possible errors cases of `hlld` package.
#[derive(Debug)]
pub enum Error {
    /// No active set registered under the requested name.
    SetNotFound,
    /// An active set already exists under the requested name.
    SetExists,
    /// The name is shadowed by a delete the vacuum has not reclaimed.
    DeletePending,
    /// Clear was attempted on a set whose registers are resident.
    NotProxied,
    /// Inputs rejected by the protocol or API layer.
    BadArguments(String),
    /// Invalid parameter, like an out-of-range precision or zero length.
    InvalidInput(String, String),
    /// Unexpected file, like a register file of the wrong length.
    InvalidFile(String, String),
    /// Underlying I/O failure.
    IOError(String, String),
    /// Error converting from one type to another.
    FailConvert(String, String),
    /// Inter-process-communication failure with a spawned thread.
    IPCFail(String, String),
    /// Thread failed to join.
    ThreadFail(String, String),
    /// Invariant breakage, call the programmer.
    Fatal(String, String),
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        use Error::{DeletePending, NotProxied, SetExists, SetNotFound};

        match (self, other) {
            (SetNotFound, SetNotFound) => true,
            (SetExists, SetExists) => true,
            (DeletePending, DeletePending) => true,
            (NotProxied, NotProxied) => true,
            (Error::BadArguments(m1), Error::BadArguments(m2)) => m1 == m2,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::SetNotFound => write!(f, "set does not exist"),
            Error::SetExists => write!(f, "set exists"),
            Error::DeletePending => write!(f, "delete in progress"),
            Error::NotProxied => write!(f, "set is not proxied"),
            Error::BadArguments(msg) => write!(f, "bad arguments: {}", msg),
            Error::InvalidInput(p, m) => write!(f, "{} invalid-input: {}", p, m),
            Error::InvalidFile(p, m) => write!(f, "{} invalid-file: {}", p, m),
            Error::IOError(p, m) => write!(f, "{} io-error: {}", p, m),
            Error::FailConvert(p, m) => write!(f, "{} fail-convert: {}", p, m),
            Error::IPCFail(p, m) => write!(f, "{} ipc-fail: {}", p, m),
            Error::ThreadFail(p, m) => write!(f, "{} thread-fail: {}", p, m),
            Error::Fatal(p, m) => write!(f, "{} fatal: {}", p, m),
        }
    }
}

/// Type alias for Result return type, used by this package.
pub type Result<T> = std::result::Result<T, Error>;
