use std::fs::File;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use crossbeam_channel::bounded;

use pktforge::config::Config;
use pktforge::lane::LaneSummary;
use pktforge::seq;
use pktforge::ui::{self, Stats};

mod cmd;

const CHANNEL_SIZE: usize = 500;

/// Map the `Verbose` setting to a default filter; `RUST_LOG` still wins.
fn init_logging(cfg: &Config) {
    let filter = match cfg.debug.verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter));
    if let Some(dir) = &cfg.debug.log_dir {
        match File::create(Path::new(dir).join("pktforge.log")) {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(e) => eprintln!("Cannot open the log file in '{dir}': {e}"),
        }
    }
    builder.init();
}

fn main() {
    let args = cmd::Args::parse();

    let mut cfg = match Config::load_from_fs(&args.cfg) {
        Ok(cfg) => cfg,
        Err(e) => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .init();
            log::error!("Cannot load the configuration '{}': {e}", args.cfg);
            process::exit(1);
        }
    };
    init_logging(&cfg);

    if !args.apply_to(&mut cfg) {
        log::error!("No sequence to process");
        process::exit(1);
    }
    if cfg.save_cfg {
        if let Err(e) = cfg.save_to_fs(&args.cfg) {
            log::warn!("Cannot write the settings back to '{}': {e}", args.cfg);
        }
    }
    if args.list {
        cfg.list();
        return;
    }

    let stats = Arc::new(Stats::default());
    let running = Arc::new(AtomicBool::new(true));

    // Handle ctrl+C
    {
        let stats = Arc::clone(&stats);
        ctrlc::set_handler(move || {
            if !stats.should_stop() {
                log::warn!("Ending the sequences, please wait a few seconds");
                stats.stop_early();
            } else {
                log::warn!("Ending immediately");
                process::abort();
            }
        })
        .expect("Error setting Ctrl-C handler");
    }

    let monitor = {
        let stats = Arc::clone(&stats);
        let running = Arc::clone(&running);
        let builder = thread::Builder::new().name("Monitoring".into());
        builder.spawn(move || ui::run(stats, running)).unwrap()
    };

    let (tx_sum, rx_sum) = bounded::<LaneSummary>(CHANNEL_SIZE);
    let mut lane_threads = vec![];
    let mut usable = 0;
    for (i, seq) in cfg.sequences.iter().enumerate() {
        match seq::process(
            &cfg,
            seq,
            i + 1,
            args.tech.as_deref(),
            &args.outfile,
            &stats,
            &tx_sum,
        ) {
            Ok(handles) => {
                usable += 1;
                lane_threads.extend(handles);
            }
            Err(e) => log::error!("[SEQ {}] Cannot process the sequence: {e}", i + 1),
        }
    }
    if usable == 0 {
        log::error!("No sequence could be processed");
        process::exit(1);
    }

    // Wait for the outstanding lanes of the non-blocking sequences
    for handle in lane_threads {
        if handle.join().is_err() {
            log::error!("A lane panicked");
        }
    }
    // Tell the monitoring thread to stop
    running.store(false, Ordering::Relaxed);
    monitor.join().unwrap();

    drop(tx_sum);
    let mut tot_pkts: u64 = 0;
    let mut tot_bytes: u64 = 0;
    for s in rx_sum {
        log::debug!(
            "[SEQ {}] Lane #{} sent {} packets ({} bytes)",
            s.seq_index,
            s.lane_index,
            s.packets,
            s.bytes
        );
        tot_pkts += s.packets;
        tot_bytes += s.bytes;
    }
    log::info!("Done: {tot_pkts} packets sent ({tot_bytes} bytes)");
}
