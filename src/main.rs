use log::info;
use structopt::StructOpt;

use std::sync::{
    atomic::{AtomicBool, Ordering::SeqCst},
    Arc,
};

use hlld::{background, config::Config, err_at, manager::SetManager, server, Result};

/// Command line options for hlld.
#[derive(Clone, StructOpt)]
#[structopt(name = "hlld")]
pub struct Opt {
    /// Load configuration from an INI file.
    #[structopt(short = "f", long = "config")]
    config: Option<String>,

    /// Number of worker threads, overrides the configuration.
    #[structopt(short = "w", long = "workers")]
    workers: Option<usize>,
}

fn main() {
    let opts = Opt::from_args();
    std::process::exit(match run(opts) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("hlld: {}", err);
            1
        }
    })
}

fn run(opts: Opt) -> Result<()> {
    let mut config = match &opts.config {
        Some(loc) => Config::from_file(loc)?,
        None => Config::default(),
    };
    if let Some(workers) = opts.workers {
        config.worker_threads = workers;
    }

    env_logger::Builder::new()
        .filter_level(config.log_filter()?)
        .init();
    config.validate()?;
    let config = Arc::new(config);

    let mgr = SetManager::init(Arc::clone(&config), true)?;
    let should_run = Arc::new(AtomicBool::new(true));

    // ctrl-c clears the flag; the accept loops poll it and wind down,
    // letting the manager and sweeps tear down cleanly.
    {
        let should_run = Arc::clone(&should_run);
        err_at!(
            Fatal,
            ctrlc::set_handler(move || should_run.store(false, SeqCst))
        )?;
    }

    let flusher = background::start_flush_thread(
        Arc::clone(&config),
        Arc::clone(&mgr),
        Arc::clone(&should_run),
    );
    let unmapper = background::start_cold_unmap_thread(
        Arc::clone(&config),
        Arc::clone(&mgr),
        Arc::clone(&should_run),
    );

    // serves until should_run clears.
    let res = server::run(Arc::clone(&config), Arc::clone(&mgr), Arc::clone(&should_run));

    should_run.store(false, SeqCst);
    if let Some(handle) = flusher {
        handle.join().ok();
    }
    if let Some(handle) = unmapper {
        handle.join().ok();
    }
    mgr.close()?;
    info!(target: "hlld", "shutdown complete");
    res
}
