//! Module `config` implement configuration for the daemon and for
//! individual sets.
//!
//! Both the global configuration and the per-set `config.ini` files use
//! the INI format with a single `[hlld]` section; that format is part
//! of the on-disk data model, so a minimal reader lives here instead of
//! pulling in a different serialisation. Unknown keys are logged and
//! ignored, matching the original daemon's behaviour.

use log::{error, warn};

use std::{fs, path};

use crate::{err_at, hll, Result};

/// Global configuration for the daemon.
///
/// Defaults create sets of about 3KB (precision 12), suited to grow
/// quickly.
#[derive(Clone, Debug)]
pub struct Config {
    /// TCP port for the line protocol.
    pub tcp_port: u16,
    /// UDP port, reserved in config but never bound.
    pub udp_port: u16,
    /// Address to bind.
    pub bind_address: String,
    /// Directory holding one folder per set.
    pub data_dir: path::PathBuf,
    /// One of DEBUG, INFO, WARN, ERROR, CRITICAL.
    pub log_level: String,
    /// Target relative error for new sets. Mutually implied with
    /// `default_precision`.
    pub default_eps: f64,
    /// Digits of precision for new sets.
    pub default_precision: u8,
    /// Seconds between flush sweeps, 0 disables.
    pub flush_interval: u64,
    /// Seconds between cold unmap sweeps, 0 disables.
    pub cold_interval: u64,
    /// Keep new sets purely in memory, never persisted.
    pub in_memory: bool,
    /// Worker threads serving client connections.
    pub worker_threads: usize,
    /// Use a shared mapping for file backed sets instead of a private
    /// one with manual page write back.
    pub use_mmap: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            tcp_port: 4553,
            udp_port: 4554,
            bind_address: "0.0.0.0".to_string(),
            data_dir: path::PathBuf::from("/tmp/hlld"),
            log_level: "INFO".to_string(),
            default_eps: 0.01625, // == precision 12
            default_precision: 12,
            flush_interval: 60,
            cold_interval: 3600,
            in_memory: false,
            worker_threads: 1,
            use_mmap: false,
        }
    }
}

impl Config {
    /// Read configuration from an INI file, starting from the
    /// defaults. Only the `[hlld]` section is considered.
    pub fn from_file<P>(loc: P) -> Result<Config>
    where
        P: AsRef<path::Path>,
    {
        let ploc: &path::Path = loc.as_ref();
        let text = err_at!(IOError, fs::read_to_string(ploc), "config {:?}", ploc)?;

        let mut config = Config::default();
        parse_ini(&text, &mut |section, name, value| {
            if !section.eq_ignore_ascii_case("hlld") {
                return Ok(());
            }
            match name.to_lowercase().as_str() {
                "port" | "tcp_port" => config.tcp_port = to_int::<u16>(name, value)?,
                "udp_port" => config.udp_port = to_int::<u16>(name, value)?,
                "bind_address" => config.bind_address = value.to_string(),
                "data_dir" => config.data_dir = path::PathBuf::from(value),
                "log_level" => config.log_level = value.to_string(),
                "flush_interval" => config.flush_interval = to_int::<u64>(name, value)?,
                "cold_interval" => config.cold_interval = to_int::<u64>(name, value)?,
                "in_memory" => config.in_memory = to_bool(name, value)?,
                "use_mmap" => config.use_mmap = to_bool(name, value)?,
                "workers" => config.worker_threads = to_int::<usize>(name, value)?,
                "default_precision" => {
                    // compute expected error given precision.
                    config.default_precision = to_int::<u8>(name, value)?;
                    config.default_eps = hll::error_for_precision(config.default_precision);
                }
                "default_eps" => {
                    // map to the smallest precision meeting the bound,
                    // then recompute eps as the true bound of that
                    // precision.
                    let eps = to_float(name, value)?;
                    config.default_precision = match hll::precision_for_error(eps) {
                        Some(precision) => precision,
                        None => {
                            return err_at!(
                                InvalidInput, msg: "no precision for eps {}", eps
                            )
                        }
                    };
                    config.default_eps = hll::error_for_precision(config.default_precision);
                }
                _ => warn!(target: "config", "unrecognized config parameter: {}", name),
            }
            Ok(())
        })?;

        Ok(config)
    }

    /// Validate the configuration, warning on suspicious values and
    /// failing on invalid ones.
    pub fn validate(&self) -> Result<()> {
        sane_data_dir(&self.data_dir)?;
        self.log_filter()?;
        sane_default_eps(self.default_eps)?;
        sane_default_precision(self.default_precision)?;
        sane_flush_interval(self.flush_interval)?;
        sane_cold_interval(self.cold_interval)?;
        if self.in_memory {
            warn!(
                target: "config",
                "default sets are in-memory only! sets not persisted by default"
            );
        }
        if !self.use_mmap {
            warn!(
                target: "config",
                "without use_mmap, a crash of hlld can result in data loss"
            );
        }
        if self.worker_threads < 1 {
            return err_at!(InvalidInput, msg: "cannot have fewer than one worker thread");
        }
        Ok(())
    }

    /// Map the configured log level onto the logging facade.
    pub fn log_filter(&self) -> Result<log::LevelFilter> {
        match self.log_level.to_uppercase().as_str() {
            "DEBUG" => Ok(log::LevelFilter::Debug),
            "INFO" => Ok(log::LevelFilter::Info),
            "WARN" => Ok(log::LevelFilter::Warn),
            "ERROR" => Ok(log::LevelFilter::Error),
            "CRITICAL" => Ok(log::LevelFilter::Error),
            _ => err_at!(InvalidInput, msg: "unknown log level {:?}", self.log_level),
        }
    }
}

/// Per-set settings, persisted to the set's `config.ini`.
#[derive(Clone, Debug, PartialEq)]
pub struct SetConfig {
    pub default_eps: f64,
    pub default_precision: u8,
    pub in_memory: bool,
    /// Cached cardinality estimate from the last flush.
    pub size: u64,
}

impl From<&Config> for SetConfig {
    fn from(config: &Config) -> SetConfig {
        SetConfig {
            default_eps: config.default_eps,
            default_precision: config.default_precision,
            in_memory: config.in_memory,
            size: 0,
        }
    }
}

impl SetConfig {
    /// Update settings from the set's INI file. A missing file leaves
    /// the inherited settings untouched.
    pub fn load(&mut self, loc: &path::Path) -> Result<()> {
        let text = match fs::read_to_string(loc) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return err_at!(IOError, Err(err), "set config {:?}", loc),
        };
        parse_ini(&text, &mut |section, name, value| {
            if !section.eq_ignore_ascii_case("hlld") {
                return Ok(());
            }
            match name.to_lowercase().as_str() {
                "size" => self.size = to_int::<u64>(name, value)?,
                "default_eps" => self.default_eps = to_float(name, value)?,
                "default_precision" => self.default_precision = to_int::<u8>(name, value)?,
                "in_memory" => self.in_memory = to_bool(name, value)?,
                _ => warn!(target: "config", "unrecognized set config parameter: {}", name),
            }
            Ok(())
        })
    }

    /// Write the settings out as the set's INI file.
    pub fn save(&self, loc: &path::Path) -> Result<()> {
        let text = format!(
            "[hlld]\nsize = {}\ndefault_eps = {:.6}\ndefault_precision = {}\nin_memory = {}\n",
            self.size,
            self.default_eps,
            self.default_precision,
            self.in_memory as u8,
        );
        err_at!(IOError, fs::write(loc, text), "set config {:?}", loc)
    }
}

fn parse_ini<F>(text: &str, callb: &mut F) -> Result<()>
where
    F: FnMut(&str, &str, &str) -> Result<()>,
{
    let mut section = String::default();
    for line in text.lines() {
        let line = match line.find(|ch| ch == ';' || ch == '#') {
            Some(off) => line[..off].trim(),
            None => line.trim(),
        };
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_string();
        } else if let Some(off) = line.find('=') {
            let (name, value) = (line[..off].trim(), line[off + 1..].trim());
            callb(&section, name, value)?;
        } else {
            warn!(target: "config", "ignoring malformed config line {:?}", line);
        }
    }
    Ok(())
}

fn to_int<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    err_at!(FailConvert, value.parse::<T>(), "key {}", name)
}

fn to_float(name: &str, value: &str) -> Result<f64> {
    err_at!(FailConvert, value.parse::<f64>(), "key {}", name)
}

fn to_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => err_at!(FailConvert, msg: "key {} must be 0 or 1, got {:?}", name, value),
    }
}

fn sane_data_dir(data_dir: &path::Path) -> Result<()> {
    match fs::metadata(data_dir) {
        Ok(md) if md.is_dir() => (),
        Ok(_) => {
            return err_at!(
                InvalidInput, msg: "data directory {:?} exists and is not a directory", data_dir
            )
        }
        Err(_) => err_at!(
            IOError,
            fs::create_dir_all(data_dir),
            "failed to make the data directory {:?}",
            data_dir
        )?,
    }

    // check we have permission to write.
    let probe = data_dir.join("PERMTEST");
    let res = fs::write(&probe, b"");
    fs::remove_file(&probe).ok();
    match res {
        Ok(_) => Ok(()),
        Err(err) => {
            error!(target: "config", "failed to write to data directory: {}", err);
            err_at!(IOError, Err(err), "data directory {:?} not writable", data_dir)
        }
    }
}

fn sane_default_eps(eps: f64) -> Result<()> {
    if eps > hll::error_for_precision(hll::MIN_PRECISION) {
        return err_at!(
            InvalidInput, msg: "epsilon cannot be greater than {}",
            hll::error_for_precision(hll::MIN_PRECISION)
        );
    } else if eps < hll::error_for_precision(hll::MAX_PRECISION) {
        return err_at!(
            InvalidInput, msg: "epsilon cannot be less than {}",
            hll::error_for_precision(hll::MAX_PRECISION)
        );
    } else if eps < 0.005 {
        warn!(target: "config", "epsilon very low, could cause high memory usage!");
    }
    Ok(())
}

fn sane_default_precision(precision: u8) -> Result<()> {
    if !(hll::MIN_PRECISION..=hll::MAX_PRECISION).contains(&precision) {
        return err_at!(
            InvalidInput, msg: "precision must be in [{},{}]",
            hll::MIN_PRECISION, hll::MAX_PRECISION
        );
    } else if precision > 15 {
        warn!(target: "config", "precision very high, could cause high memory usage!");
    }
    Ok(())
}

fn sane_flush_interval(intv: u64) -> Result<()> {
    if intv == 0 {
        warn!(target: "config", "flushing is disabled! increased risk of data loss");
    } else if intv >= 600 {
        warn!(
            target: "config",
            "flushing set to be very infrequent! increased risk of data loss"
        );
    }
    Ok(())
}

fn sane_cold_interval(intv: u64) -> Result<()> {
    if intv == 0 {
        warn!(target: "config", "cold data unmapping is disabled! memory usage may be high");
    } else if intv < 300 {
        warn!(
            target: "config",
            "cold interval is less than 5 minutes, may cause excessive unmapping"
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
