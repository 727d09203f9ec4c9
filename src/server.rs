//! Module `server` implement the line oriented TCP protocol.
//!
//! Each command is a single `\n` terminated line, optionally preceded
//! by `\r`. The listener is shared by `worker_threads` handler
//! threads; each serves one connection at a time, checkpointing with
//! the set manager before every command and leaving when the
//! connection closes. Command parsing and replies live here; the
//! semantics live in [crate::manager].

use lazy_static::lazy_static;
use log::{debug, error, info};
use regex::Regex;

use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc,
    },
    thread, time,
};

use crate::{config::Config, err_at, hll, manager::SetManager, Error, Result};

lazy_static! {
    static ref VALID_SET_NAMES: Regex = Regex::new(r"^[^ \t\n\r]{1,200}$").unwrap();
}

// various messages and responses.
const DONE_RESP: &str = "Done\n";
const EXISTS_RESP: &str = "Exists\n";
const START_RESP: &str = "START\n";
const END_RESP: &str = "END\n";
const SET_NOT_EXIST: &str = "Set does not exist\n";
const SET_NOT_PROXIED: &str = "Set is not proxied. Close it first.\n";
const DELETE_IN_PROGRESS: &str = "Delete in progress\n";
const INTERNAL_ERR: &str = "Internal Error\n";
const CMD_NOT_SUP: &str = "Client Error: Command not supported\n";
const BAD_ARGS: &str = "Client Error: Bad arguments\n";
const UNEXPECTED_ARGS: &str = "Client Error: Unexpected arguments\n";
const SET_NEEDED: &str = "Client Error: Must provide set name\n";
const SET_KEY_NEEDED: &str = "Client Error: Must provide set name and key\n";
const BAD_SET_NAME: &str = "Client Error: Bad set name\n";

// how often idle workers poll the listener for shutdown.
const ACCEPT_POLL: time::Duration = time::Duration::from_millis(100);

/// Bind the configured address and serve until `should_run` clears.
/// Blocks the calling thread; worker threads are joined on return.
pub fn run(
    config: Arc<Config>,
    mgr: Arc<SetManager>,
    should_run: Arc<AtomicBool>,
) -> Result<()> {
    let listener = bind(&config)?;
    serve(listener, config, mgr, should_run)
}

/// Bind the configured address.
pub fn bind(config: &Arc<Config>) -> Result<TcpListener> {
    err_at!(
        IOError,
        TcpListener::bind((config.bind_address.as_str(), config.tcp_port)),
        "bind {}:{}",
        config.bind_address,
        config.tcp_port
    )
}

/// Serve connections accepted from `listener` until `should_run`
/// clears.
pub fn serve(
    listener: TcpListener,
    config: Arc<Config>,
    mgr: Arc<SetManager>,
    should_run: Arc<AtomicBool>,
) -> Result<()> {
    err_at!(IOError, listener.set_nonblocking(true))?;
    info!(
        target: "server",
        "listening on {} with {} workers",
        err_at!(IOError, listener.local_addr())?,
        config.worker_threads
    );

    let mut workers = vec![];
    for n in 0..config.worker_threads {
        let listener = err_at!(IOError, listener.try_clone())?;
        let (mgr, should_run) = (Arc::clone(&mgr), Arc::clone(&should_run));
        let config = Arc::clone(&config);
        workers.push(thread::spawn(move || {
            worker_main(n, config, mgr, listener, should_run)
        }));
    }
    for worker in workers {
        err_at!(ThreadFail, worker.join().map_err(|e| format!("{:?}", e)))?;
    }
    Ok(())
}

fn worker_main(
    n: usize,
    config: Arc<Config>,
    mgr: Arc<SetManager>,
    listener: TcpListener,
    should_run: Arc<AtomicBool>,
) {
    while should_run.load(SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!(target: "server", "worker-{} accepted connection from {}", n, addr);
                if let Err(err) = handle_connection(&config, &mgr, stream) {
                    error!(target: "server", "connection from {} failed: {}", addr, err);
                }
                mgr.leave();
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                error!(target: "server", "worker-{} accept failed: {}", n, err);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn handle_connection(
    config: &Arc<Config>,
    mgr: &Arc<SetManager>,
    stream: TcpStream,
) -> Result<()> {
    err_at!(IOError, stream.set_nonblocking(false))?;
    let reader = BufReader::new(err_at!(IOError, stream.try_clone())?);
    let mut writer = stream;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break, // peer went away
        };
        let reply = handle_command(config, mgr, line.trim_end_matches('\r'));
        err_at!(IOError, writer.write_all(reply.as_bytes()))?;
        err_at!(IOError, writer.flush())?;
    }
    Ok(())
}

/// Decode one command line and run it against the manager, returning
/// the full reply including framing.
pub(crate) fn handle_command(config: &Arc<Config>, mgr: &Arc<SetManager>, line: &str) -> String {
    mgr.checkpoint();

    let mut args = line.split_whitespace();
    let cmd = args.next().unwrap_or("");
    let args: Vec<&str> = args.collect();

    match cmd {
        "create" => cmd_create(config, mgr, &args),
        "list" => cmd_list(mgr, &args),
        "drop" => cmd_drop(mgr, &args),
        "close" => cmd_close(mgr, &args),
        "clear" => cmd_clear(mgr, &args),
        "set" | "s" => cmd_set(mgr, &args),
        "bulk" | "b" => cmd_bulk(mgr, &args),
        "info" => cmd_info(mgr, &args),
        "flush" => cmd_flush(mgr, &args),
        _ => CMD_NOT_SUP.to_string(),
    }
}

fn cmd_create(config: &Arc<Config>, mgr: &Arc<SetManager>, args: &[&str]) -> String {
    let name = match args.first() {
        Some(name) => *name,
        None => return SET_NEEDED.to_string(),
    };
    if !VALID_SET_NAMES.is_match(name) {
        return BAD_SET_NAME.to_string();
    }

    // parse the optional create parameters into a custom config.
    let mut custom: Option<Config> = None;
    for arg in args[1..].iter() {
        let over = custom.get_or_insert_with(|| config.as_ref().clone());
        if let Some(value) = arg.strip_prefix("precision=") {
            match value.parse::<u8>() {
                Ok(p) if (hll::MIN_PRECISION..=hll::MAX_PRECISION).contains(&p) => {
                    over.default_precision = p;
                    over.default_eps = hll::error_for_precision(p);
                }
                _ => return BAD_ARGS.to_string(),
            }
        } else if let Some(value) = arg.strip_prefix("eps=") {
            match value.parse::<f64>().ok().and_then(hll::precision_for_error) {
                Some(p) => {
                    over.default_precision = p;
                    over.default_eps = hll::error_for_precision(p);
                }
                None => return BAD_ARGS.to_string(),
            }
        } else if let Some(value) = arg.strip_prefix("in_memory=") {
            match value {
                "0" => over.in_memory = false,
                "1" => over.in_memory = true,
                _ => return BAD_ARGS.to_string(),
            }
        } else {
            return BAD_ARGS.to_string();
        }
    }

    match mgr.create_set(name, custom.map(Arc::new)) {
        Ok(()) => DONE_RESP.to_string(),
        Err(Error::SetExists) => EXISTS_RESP.to_string(),
        Err(Error::DeletePending) => DELETE_IN_PROGRESS.to_string(),
        Err(err) => {
            error!(target: "server", "create {:?} failed: {}", name, err);
            INTERNAL_ERR.to_string()
        }
    }
}

fn cmd_list(mgr: &Arc<SetManager>, args: &[&str]) -> String {
    if args.len() > 1 {
        return UNEXPECTED_ARGS.to_string();
    }
    let prefix = args.first().copied();

    let mut out = String::from(START_RESP);
    for name in mgr.list_sets(prefix) {
        // sets may disappear while we format, skip them.
        let row = mgr
            .with_set(&name, |set| -> Result<String> {
                Ok(format!(
                    "{} {:.6} {} {} {}\n",
                    set.name(),
                    set.eps(),
                    set.precision(),
                    set.byte_size()?,
                    set.size()?,
                ))
            })
            .and_then(|row| row);
        if let Ok(row) = row {
            out.push_str(&row);
        }
    }
    out.push_str(END_RESP);
    out
}

fn cmd_drop(mgr: &Arc<SetManager>, args: &[&str]) -> String {
    match one_name(args) {
        Ok(name) => match mgr.drop_set(name) {
            Ok(()) => DONE_RESP.to_string(),
            Err(Error::SetNotFound) => SET_NOT_EXIST.to_string(),
            Err(err) => internal(args[0], err),
        },
        Err(reply) => reply,
    }
}

fn cmd_close(mgr: &Arc<SetManager>, args: &[&str]) -> String {
    match one_name(args) {
        Ok(name) => match mgr.unmap_set(name) {
            Ok(()) => DONE_RESP.to_string(),
            Err(Error::SetNotFound) => SET_NOT_EXIST.to_string(),
            Err(err) => internal(args[0], err),
        },
        Err(reply) => reply,
    }
}

fn cmd_clear(mgr: &Arc<SetManager>, args: &[&str]) -> String {
    match one_name(args) {
        Ok(name) => match mgr.clear_set(name) {
            Ok(()) => DONE_RESP.to_string(),
            Err(Error::SetNotFound) => SET_NOT_EXIST.to_string(),
            Err(Error::NotProxied) => SET_NOT_PROXIED.to_string(),
            Err(err) => internal(args[0], err),
        },
        Err(reply) => reply,
    }
}

fn cmd_set(mgr: &Arc<SetManager>, args: &[&str]) -> String {
    match args {
        [name, key] => match mgr.set_keys(name, &[*key]) {
            Ok(()) => DONE_RESP.to_string(),
            Err(Error::SetNotFound) => SET_NOT_EXIST.to_string(),
            Err(err) => internal(name, err),
        },
        _ => SET_KEY_NEEDED.to_string(),
    }
}

fn cmd_bulk(mgr: &Arc<SetManager>, args: &[&str]) -> String {
    match args {
        [name, keys @ ..] if !keys.is_empty() => match mgr.set_keys(name, keys) {
            Ok(()) => DONE_RESP.to_string(),
            Err(Error::SetNotFound) => SET_NOT_EXIST.to_string(),
            Err(err) => internal(name, err),
        },
        _ => SET_KEY_NEEDED.to_string(),
    }
}

fn cmd_info(mgr: &Arc<SetManager>, args: &[&str]) -> String {
    let name = match one_name(args) {
        Ok(name) => name,
        Err(reply) => return reply,
    };
    let info = mgr
        .with_set(name, |set| -> Result<String> {
            Ok(format!(
                concat!(
                    "in_memory {}\n",
                    "page_ins {}\n",
                    "page_outs {}\n",
                    "eps {:.6}\n",
                    "precision {}\n",
                    "sets {}\n",
                    "size {}\n",
                    "storage {}\n",
                ),
                set.in_memory() as u8,
                set.counters().page_ins(),
                set.counters().page_outs(),
                set.eps(),
                set.precision(),
                set.counters().sets(),
                set.size()?,
                set.byte_size()?,
            ))
        })
        .and_then(|info| info);
    match info {
        Ok(rows) => format!("{}{}{}", START_RESP, rows, END_RESP),
        Err(Error::SetNotFound) => SET_NOT_EXIST.to_string(),
        Err(err) => internal(name, err),
    }
}

fn cmd_flush(mgr: &Arc<SetManager>, args: &[&str]) -> String {
    match args {
        // flush a single set.
        [name] => match mgr.flush_set(name) {
            Ok(()) => DONE_RESP.to_string(),
            Err(Error::SetNotFound) => SET_NOT_EXIST.to_string(),
            Err(err) => internal(name, err),
        },
        // flush all of them.
        [] => {
            for name in mgr.list_sets(None) {
                mgr.flush_set(&name).ok();
            }
            DONE_RESP.to_string()
        }
        _ => UNEXPECTED_ARGS.to_string(),
    }
}

fn one_name<'a>(args: &[&'a str]) -> std::result::Result<&'a str, String> {
    match args {
        [name] => Ok(*name),
        [] => Err(SET_NEEDED.to_string()),
        _ => Err(UNEXPECTED_ARGS.to_string()),
    }
}

fn internal(name: &str, err: Error) -> String {
    error!(target: "server", "operation on {:?} failed: {}", name, err);
    INTERNAL_ERR.to_string()
}

#[cfg(test)]
#[path = "server_test.rs"]
mod server_test;
