use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Run-wide counters shared by every lane.
pub struct Stats {
    pub start_time: Instant,
    pub packets_counter: AtomicU64,
    pub bytes_counter: AtomicU64,
    pub early_stop: AtomicBool,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            start_time: Instant::now(),
            packets_counter: AtomicU64::new(0),
            bytes_counter: AtomicU64::new(0),
            early_stop: AtomicBool::new(false),
        }
    }
}

impl Stats {
    pub fn account(&self, pkts: u64, bytes: u64) {
        self.packets_counter.fetch_add(pkts, Ordering::Relaxed);
        self.bytes_counter.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.early_stop.load(Ordering::Relaxed)
    }

    pub fn stop_early(&self) {
        self.early_stop.store(true, Ordering::Relaxed);
    }
}

fn report(stats: &Stats) {
    let pc = stats.packets_counter.load(Ordering::Relaxed);
    let bc = stats.bytes_counter.load(Ordering::Relaxed);
    let throughput = 8. * (bc as f64)
        / (Instant::now().duration_since(stats.start_time).as_secs() as f64)
        / 1_000_000.;
    if throughput < 1. {
        log::info!("{pc} packets sent ({:.2} kbps)", throughput * 1000.);
    } else if throughput < 1000. {
        log::info!("{pc} packets sent ({:.2} Mbps)", throughput);
    } else {
        log::info!("{pc} packets sent ({:.2} Gbps)", throughput / 1000.);
    }
}

/// Periodic progress reporting until `running` is cleared. Short ticks
/// keep shutdown prompt; the report itself lands every five seconds.
pub fn run(stats: Arc<Stats>, running: Arc<AtomicBool>) {
    let mut tick: u32 = 0;
    loop {
        thread::sleep(Duration::from_millis(500));
        tick += 1;
        if tick % 10 == 0 {
            report(&stats);
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounting() {
        let stats = Stats::default();
        stats.account(1, 42);
        stats.account(2, 100);
        assert_eq!(stats.packets_counter.load(Ordering::Relaxed), 3);
        assert_eq!(stats.bytes_counter.load(Ordering::Relaxed), 142);
    }

    #[test]
    fn test_early_stop_flag() {
        let stats = Stats::default();
        assert!(!stats.should_stop());
        stats.stop_early();
        assert!(stats.should_stop());
    }
}
