//! Sequence orchestration. Resolves the sequence settings against the
//! global config and the command line, looks up whatever addresses were
//! left implicit, then spawns one lane per thread.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use rand_core::SeedableRng;
use rand_pcg::Pcg32;

use crate::backend::{BackendOptions, Tech};
use crate::config::{Config, Sequence};
use crate::error::{Error, Result};
use crate::lane::{self, LaneSpec, LaneSummary};
use crate::net::{self, Protocol};
use crate::payload;
use crate::rate::{self, StopConditions};
use crate::ui::Stats;

/// Resolve one sequence and start its lanes.
///
/// Returns the lane handles so the caller can join them, or an empty
/// vector when `Block` made this call wait for the lanes itself. Any
/// error here is fatal for the sequence; nothing has been spawned yet.
pub fn process(
    cfg: &Config,
    seq: &Sequence,
    seq_index: usize,
    cli_tech: Option<&str>,
    outfile: &str,
    stats: &Arc<Stats>,
    summaries: &Sender<LaneSummary>,
) -> Result<Vec<JoinHandle<()>>> {
    // The command line wins over the sequence.
    let tech_name = match cli_tech.filter(|t| !t.is_empty()) {
        Some(t) => t,
        None => seq.tech.as_str(),
    };
    if tech_name.is_empty() {
        return Err(Error::NoTech);
    }
    let tech: Tech = tech_name.parse()?;
    log::debug!("[SEQ {seq_index}] Using tech => {tech}");

    let dev = if !seq.interface.is_empty() {
        seq.interface.clone()
    } else {
        cfg.interface.clone()
    };
    if dev.is_empty() {
        return Err(Error::NoInterface);
    }
    log::debug!("[SEQ {seq_index}] Using interface => {dev}");

    let lanes = if seq.threads > 0 {
        seq.threads as usize
    } else {
        num_cpus::get()
    };
    if lanes < 1 {
        return Err(Error::NoThreads);
    }

    let src_mac = if !seq.eth.src_mac.is_empty() {
        net::parse_mac(&seq.eth.src_mac)?
    } else {
        net::interface_mac(&dev)?
    };
    let dst_mac = if !seq.eth.dst_mac.is_empty() {
        net::parse_mac(&seq.eth.dst_mac)?
    } else {
        net::gateway_mac()?
    };
    log::debug!("[SEQ {seq_index}] Using src MAC => {src_mac}");
    log::debug!("[SEQ {seq_index}] Using dst MAC => {dst_mac}");

    let src_ip: Option<Ipv4Addr> = if !seq.ip4.src_ip.is_empty() {
        Some(
            seq.ip4
                .src_ip
                .parse()
                .map_err(|_| Error::InvalidIp(seq.ip4.src_ip.clone()))?,
        )
    } else {
        None
    };
    if src_ip.is_none() && seq.ip4.src_ip_ranges.is_empty() {
        return Err(Error::NoSourceIp);
    }
    if seq.ip4.dst_ip.is_empty() {
        return Err(Error::NoDestination);
    }
    let dst_ip: Ipv4Addr = seq
        .ip4
        .dst_ip
        .parse()
        .map_err(|_| Error::InvalidIp(seq.ip4.dst_ip.clone()))?;

    let proto: Protocol = seq.ip4.protocol.parse()?;

    let now = rate::boot_time_ns();
    let mut rng_base = Pcg32::seed_from_u64(now as u64);
    // A bad static payload aborts the sequence before any lane starts.
    let static_payload = payload::precompute_static(&seq.payloads, &mut rng_base)?;

    let end_time = if seq.time > 0 {
        now + seq.time * 1_000_000_000
    } else {
        0
    };
    let stops = StopConditions {
        max_pkts: seq.max_pkts,
        max_bytes: seq.max_bytes,
        end_time,
    };
    let opts = BackendOptions {
        cooked: seq.tcp.use_cooked_socket,
        pcap_out: outfile.to_string(),
    };

    let mut handles = Vec::with_capacity(lanes);
    for lane_index in 0..lanes {
        let spec = LaneSpec {
            tech,
            dev: dev.clone(),
            opts: opts.clone(),
            seq: seq.clone(),
            proto,
            src_mac: src_mac.octets(),
            dst_mac: dst_mac.octets(),
            src_ip,
            dst_ip,
            static_payload: static_payload.clone(),
            stops,
            seed: (now as u64).wrapping_add(lane_index as u64),
            lane_index,
            seq_index,
        };
        let stats = Arc::clone(stats);
        let summaries = summaries.clone();
        log::info!("[SEQ {seq_index}] Spawning lane #{lane_index}...");
        let handle = thread::Builder::new()
            .name(format!("Seq{seq_index}-Lane{lane_index}"))
            .spawn(move || lane::run(spec, stats, &summaries))?;
        handles.push(handle);
    }

    if seq.block {
        for handle in handles {
            if handle.join().is_err() {
                log::error!("[SEQ {seq_index}] A lane panicked");
            }
        }
        return Ok(Vec::new());
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::atomic::Ordering;

    fn base_seq() -> Sequence {
        let mut seq = Sequence::default();
        seq.tech = "dummy".to_string();
        seq.interface = "lo".to_string();
        seq.eth.src_mac = "02:00:00:00:00:01".to_string();
        seq.eth.dst_mac = "02:00:00:00:00:02".to_string();
        seq.ip4.protocol = "udp".to_string();
        seq.ip4.src_ip = "192.168.0.1".to_string();
        seq.ip4.dst_ip = "192.168.0.199".to_string();
        seq
    }

    // Only valid for error paths: nothing may be spawned, since the
    // summary channel dies with this call.
    fn resolve_err(seq: &Sequence) -> Error {
        let stats = Arc::new(Stats::default());
        let (tx, _rx) = bounded(1);
        match process(&Config::default(), seq, 1, None, "out.pcap", &stats, &tx) {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_empty_sequence_has_no_tech() {
        assert!(matches!(resolve_err(&Sequence::default()), Error::NoTech));
    }

    #[test]
    fn test_interface_required() {
        let mut seq = base_seq();
        seq.interface = String::new();
        assert!(matches!(resolve_err(&seq), Error::NoInterface));
    }

    #[test]
    fn test_cli_tech_wins_over_sequence() {
        let seq = base_seq();
        let stats = Arc::new(Stats::default());
        let (tx, _rx) = bounded(1);
        let got = process(
            &Config::default(),
            &seq,
            1,
            Some("af_xdp"),
            "out.pcap",
            &stats,
            &tx,
        );
        assert!(matches!(got, Err(Error::UnknownTech(t)) if t == "af_xdp"));
    }

    #[test]
    fn test_source_ip_or_ranges_required() {
        let mut seq = base_seq();
        seq.ip4.src_ip = String::new();
        assert!(matches!(resolve_err(&seq), Error::NoSourceIp));

        // Ranges alone are enough.
        seq.ip4.src_ip_ranges = vec!["10.0.0.0/24".to_string()];
        seq.ip4.dst_ip = String::new();
        assert!(matches!(resolve_err(&seq), Error::NoDestination));
    }

    #[test]
    fn test_destination_required() {
        let mut seq = base_seq();
        seq.ip4.dst_ip = String::new();
        assert!(matches!(resolve_err(&seq), Error::NoDestination));
    }

    #[test]
    fn test_protocol_must_be_known() {
        let mut seq = base_seq();
        seq.ip4.protocol = String::new();
        assert!(matches!(resolve_err(&seq), Error::UnknownProtocol(_)));

        seq.ip4.protocol = "sctp".to_string();
        assert!(matches!(resolve_err(&seq), Error::UnknownProtocol(_)));
    }

    #[test]
    fn test_blocking_run_joins_every_lane() {
        let mut seq = base_seq();
        seq.threads = 2;
        seq.max_pkts = 3;
        seq.block = true;

        let stats = Arc::new(Stats::default());
        let (tx, rx) = bounded(16);
        let handles = process(&Config::default(), &seq, 1, None, "out.pcap", &stats, &tx)
            .unwrap();
        assert!(handles.is_empty());
        drop(tx);

        let summaries: Vec<LaneSummary> = rx.iter().collect();
        assert_eq!(summaries.len(), 2);
        for s in &summaries {
            assert_eq!(s.seq_index, 1);
            assert_eq!(s.packets, 3);
        }
        assert_eq!(stats.packets_counter.load(Ordering::Relaxed), 6);
    }
}
