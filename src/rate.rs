//! Per-second rate windows and stop conditions. Lanes drive everything
//! off a single boot-clock reading per iteration.

const WINDOW_NS: i64 = 1_000_000_000;

/// Nanoseconds since boot. CLOCK_BOOTTIME keeps counting across suspend;
/// the monotonic clock stands in where it is unavailable.
pub fn boot_time_ns() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) };
    if rc != 0 {
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    }
    (ts.tv_sec as i64) * 1_000_000_000 + (ts.tv_nsec as i64)
}

/// Current-second packet and byte counters with optional PPS/BPS ceilings.
#[derive(Debug, Clone)]
pub struct RateGate {
    pps: u64,
    bps: u64,
    track: bool,
    next_rollover: i64,
    cur_pkts: u64,
    cur_bytes: u64,
}

impl RateGate {
    pub fn new(pps: u64, bps: u64, track: bool, now: i64) -> RateGate {
        RateGate {
            pps,
            bps,
            track,
            next_rollover: now + WINDOW_NS,
            cur_pkts: 0,
            cur_bytes: 0,
        }
    }

    /// Whether the per-second window is maintained at all.
    pub fn active(&self) -> bool {
        self.pps > 0 || self.bps > 0 || self.track
    }

    /// Rolls the window over at second boundaries and reports whether the
    /// lane must hold off until the next one.
    pub fn throttled(&mut self, now: i64) -> bool {
        if !self.active() {
            return false;
        }
        if now >= self.next_rollover {
            self.next_rollover = now + WINDOW_NS;
            self.cur_pkts = 0;
            self.cur_bytes = 0;
            return false;
        }
        (self.pps > 0 && self.cur_pkts >= self.pps)
            || (self.bps > 0 && self.cur_bytes >= self.bps)
    }

    pub fn record(&mut self, len: u64) {
        if self.active() {
            self.cur_pkts += 1;
            self.cur_bytes += len;
        }
    }

    /// Current-second counters, for per-send tracing.
    pub fn current(&self) -> (u64, u64) {
        (self.cur_pkts, self.cur_bytes)
    }
}

/// Volume and time limits. Zero disables a limit; with all three unset the
/// lane floods until interrupted.
#[derive(Debug, Clone, Copy)]
pub struct StopConditions {
    pub max_pkts: u64,
    pub max_bytes: u64,
    pub end_time: i64,
}

impl StopConditions {
    pub fn reached(&self, tot_pkts: u64, tot_bytes: u64, now: i64) -> bool {
        if self.max_pkts > 0 && tot_pkts >= self.max_pkts {
            return true;
        }
        if self.max_bytes > 0 && tot_bytes > self.max_bytes {
            return true;
        }
        self.end_time > 0 && now > self.end_time
    }
}
