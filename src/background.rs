//! Module `background` implement the periodic maintenance loops.
//!
//! Two single-purpose threads drive maintenance through the set
//! manager: a flush sweep that writes every dirty set out on a
//! configured interval, and a cold sweep that faults out sets nobody
//! has touched since the previous pass. Both loops wake four times a
//! second, checkpoint with the manager so the vacuum can make
//! progress, and fire when enough ticks have elapsed. Individual set
//! errors are ignored, sets come and go concurrently.

use log::{debug, info};

use std::{
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc,
    },
    thread, time,
};

use crate::{config::Config, manager::SetManager, util};

/// How long the loops sleep between iterations. One tick.
pub const PERIODIC_TIME: time::Duration = time::Duration::from_millis(250);

/// Ticks per second, given [PERIODIC_TIME].
const TICKS_PER_SEC: u64 = 4;

/// After how many operations a sweep forces a client checkpoint, so
/// the vacuum can make progress even during a very slow pass.
const PERIODIC_CHECKPOINT: u64 = 64;

/// Start the flushing thread, unless the interval disables it.
pub fn start_flush_thread(
    config: Arc<Config>,
    mgr: Arc<SetManager>,
    should_run: Arc<AtomicBool>,
) -> Option<thread::JoinHandle<()>> {
    if config.flush_interval == 0 {
        return None;
    }
    Some(thread::spawn(move || flush_main(config, mgr, should_run)))
}

/// Start the cold unmap thread, unless the interval disables it.
pub fn start_cold_unmap_thread(
    config: Arc<Config>,
    mgr: Arc<SetManager>,
    should_run: Arc<AtomicBool>,
) -> Option<thread::JoinHandle<()>> {
    if config.cold_interval == 0 {
        return None;
    }
    Some(thread::spawn(move || unmap_main(config, mgr, should_run)))
}

fn flush_main(config: Arc<Config>, mgr: Arc<SetManager>, should_run: Arc<AtomicBool>) {
    mgr.checkpoint();
    info!(
        target: "background",
        "flush thread started, interval: {} seconds", config.flush_interval
    );

    let fire_ticks = config.flush_interval * TICKS_PER_SEC;
    let mut ticks: u64 = 0;
    while should_run.load(SeqCst) {
        thread::sleep(PERIODIC_TIME);
        mgr.checkpoint();
        ticks += 1;
        if ticks % fire_ticks != 0 || !should_run.load(SeqCst) {
            continue;
        }

        info!(target: "background", "scheduled flush started");
        let start = time::Instant::now();

        // flush all, ignoring errors, sets may be deleted meanwhile.
        let names = mgr.list_sets(None);
        for (cmds, name) in names.iter().enumerate() {
            mgr.flush_set(name).ok();
            if (cmds as u64 + 1) % PERIODIC_CHECKPOINT == 0 {
                mgr.checkpoint();
            }
        }
        info!(
            target: "background",
            "flushed {} sets in {} msecs", names.len(), util::elapsed_msec(start)
        );
    }
    mgr.leave();
}

fn unmap_main(config: Arc<Config>, mgr: Arc<SetManager>, should_run: Arc<AtomicBool>) {
    mgr.checkpoint();
    info!(
        target: "background",
        "cold unmap thread started, interval: {} seconds", config.cold_interval
    );

    let fire_ticks = config.cold_interval * TICKS_PER_SEC;
    let mut ticks: u64 = 0;
    while should_run.load(SeqCst) {
        thread::sleep(PERIODIC_TIME);
        mgr.checkpoint();
        ticks += 1;
        if ticks % fire_ticks != 0 || !should_run.load(SeqCst) {
            continue;
        }

        info!(target: "background", "cold unmap started");
        let start = time::Instant::now();

        // listing cold sets clears the hot flag as a side effect.
        let names = mgr.list_cold_sets();
        for (cmds, name) in names.iter().enumerate() {
            debug!(target: "background", "unmapping set {:?} for being cold", name);
            mgr.unmap_set(name).ok();
            if (cmds as u64 + 1) % PERIODIC_CHECKPOINT == 0 {
                mgr.checkpoint();
            }
        }
        info!(
            target: "background",
            "unmapped {} sets in {} msecs", names.len(), util::elapsed_msec(start)
        );
    }
    mgr.leave();
}

#[cfg(test)]
#[path = "background_test.rs"]
mod background_test;
