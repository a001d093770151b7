pub(crate) fn duration_to_timeval(duration: std::time::Duration) -> libc::timeval {
    libc::timeval {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_usec: duration.subsec_micros() as libc::suseconds_t,
    }
}

/// Sleep for the inter-packet delay. A zero delay does not yield at all.
pub fn sleep_micros(us: u64) {
    if us > 0 {
        std::thread::sleep(std::time::Duration::from_micros(us));
    }
}
