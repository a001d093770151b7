//! Worker lanes. Each lane owns its RNG, frame template, counters and
//! backend handle; nothing mutable is shared between lanes.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crossbeam_channel::Sender;
use rand::Rng;
use rand_core::SeedableRng;
use rand_pcg::Pcg32;

use crate::backend::{self, BackendOptions, Tech, TxBackend};
use crate::config::Sequence;
use crate::error::Result;
use crate::net::{self, Protocol};
use crate::packet::FrameTemplate;
use crate::payload;
use crate::rate::{self, RateGate, StopConditions};
use crate::ui::Stats;
use crate::utils;

/// Everything one lane needs, resolved once by the orchestrator. Every
/// lane gets its own copy.
#[derive(Clone)]
pub struct LaneSpec {
    pub tech: Tech,
    pub dev: String,
    pub opts: BackendOptions,
    pub seq: Sequence,
    pub proto: Protocol,
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Ipv4Addr,
    pub static_payload: Option<Vec<u8>>,
    pub stops: StopConditions,
    pub seed: u64,
    pub lane_index: usize,
    pub seq_index: usize,
}

/// Final per-lane counters, reported over the summary channel.
#[derive(Debug, Clone, Copy)]
pub struct LaneSummary {
    pub seq_index: usize,
    pub lane_index: usize,
    pub packets: u64,
    pub bytes: u64,
}

/// Lane entry point. Only backend acquisition can end the lane with an
/// error; everything inside the loop is recovered per iteration.
pub fn run(spec: LaneSpec, stats: Arc<Stats>, summaries: &Sender<LaneSummary>) {
    let seq_index = spec.seq_index;
    let lane_index = spec.lane_index;
    let mut lane = Lane::new(spec, stats);
    if let Err(e) = lane.drive() {
        log::error!("[SEQ {seq_index}] Lane #{lane_index} aborted: {e}");
    }
    summaries
        .send(LaneSummary {
            seq_index,
            lane_index,
            packets: lane.tot_pkts,
            bytes: lane.tot_bytes,
        })
        .unwrap();
}

struct Lane {
    spec: LaneSpec,
    stats: Arc<Stats>,
    template: FrameTemplate,
    rng: Pcg32,
    gate: RateGate,
    now: i64,
    next_rand: i64,
    rand_interval: i64,
    need_time: bool,
    need_rand: bool,
    payload_index: usize,
    payload_buf: Vec<u8>,
    cur_src: Ipv4Addr,
    tot_pkts: u64,
    tot_bytes: u64,
}

impl Lane {
    fn new(spec: LaneSpec, stats: Arc<Stats>) -> Lane {
        let now = rate::boot_time_ns();
        let initial_src = spec.src_ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let mut template = FrameTemplate::new(
            &spec.seq,
            spec.proto,
            spec.src_mac,
            spec.dst_mac,
            initial_src,
            spec.dst_ip,
        );
        if let Some(data) = &spec.static_payload {
            template.set_payload(data);
        }
        let rand_interval = if spec.seq.rand_interval < 0 {
            10_000
        } else {
            spec.seq.rand_interval
        };
        let need_rand = Lane::needs_rand(&spec);
        let gate = RateGate::new(spec.seq.pps, spec.seq.bps, spec.seq.track, now);
        let need_time = gate.active() || spec.stops.end_time > 0 || need_rand;
        Lane {
            rng: Pcg32::seed_from_u64((now as u64) ^ spec.seed),
            next_rand: now + rand_interval,
            rand_interval,
            need_time,
            need_rand,
            gate,
            now,
            template,
            payload_index: 0,
            payload_buf: Vec::new(),
            cur_src: initial_src,
            tot_pkts: 0,
            tot_bytes: 0,
            spec,
            stats,
        }
    }

    /// Whether any per-send draw needs the RNG at all.
    fn needs_rand(spec: &LaneSpec) -> bool {
        let seq = &spec.seq;
        if !seq.ip4.src_ip_ranges.is_empty()
            || seq.ip4.min_id != seq.ip4.max_id
            || seq.ip4.min_ttl != seq.ip4.max_ttl
        {
            return true;
        }
        match spec.proto {
            Protocol::Tcp if seq.tcp.src_port == 0 || seq.tcp.dst_port == 0 => return true,
            Protocol::Udp if seq.udp.src_port == 0 || seq.udp.dst_port == 0 => return true,
            _ => (),
        }
        seq.payloads.iter().any(payload::is_dynamic)
    }

    fn drive(&mut self) -> Result<()> {
        let mut backend = backend::open(
            self.spec.tech,
            &self.spec.dev,
            &self.spec.opts,
            self.spec.lane_index,
            self.spec.proto,
        )?;
        self.transmit(backend.as_mut());
        if let Err(e) = backend.cleanup() {
            log::warn!(
                "[SEQ {}] Backend cleanup failed on lane #{}: {e}",
                self.spec.seq_index,
                self.spec.lane_index
            );
        }
        Ok(())
    }

    fn draw_src_ip(&mut self) -> Result<Ipv4Addr> {
        let ranges = &self.spec.seq.ip4.src_ip_ranges;
        let range = if ranges.len() == 1 {
            &ranges[0]
        } else {
            &ranges[self.rng.gen_range(0..ranges.len())]
        };
        net::random_ip_from_range(range, &mut self.rng)
    }

    fn transmit(&mut self, backend: &mut dyn TxBackend) {
        let seq_index = self.spec.seq_index;
        let lane_index = self.spec.lane_index;
        let delay = self.spec.seq.delay;
        let n_payloads = self.spec.seq.payloads.len();

        loop {
            if self.stats.should_stop() {
                break;
            }
            // The clock is only read when a rate, time limit or reseed
            // interval depends on it.
            if self.need_time {
                self.now = rate::boot_time_ns();
            }

            if self.need_rand && self.now > self.next_rand {
                self.rng = Pcg32::seed_from_u64((self.now as u64) ^ self.spec.seed);
                self.next_rand = self.now + self.rand_interval;
            }

            if self.gate.throttled(self.now) {
                utils::sleep_micros(delay);
                continue;
            }

            if !self.spec.seq.ip4.src_ip_ranges.is_empty() {
                match self.draw_src_ip() {
                    Ok(ip) => {
                        self.cur_src = ip;
                        self.template.set_src_ip(ip);
                    }
                    Err(e) => {
                        log::warn!(
                            "[SEQ {seq_index}] Failed to draw a source address on lane #{lane_index}: {e}"
                        );
                        utils::sleep_micros(delay);
                        continue;
                    }
                }
            }
            if self.spec.seq.ip4.min_ttl < self.spec.seq.ip4.max_ttl {
                let ttl = self
                    .rng
                    .gen_range(self.spec.seq.ip4.min_ttl..=self.spec.seq.ip4.max_ttl);
                self.template.set_ttl(ttl);
            }
            if self.spec.seq.ip4.min_id < self.spec.seq.ip4.max_id {
                let id = self
                    .rng
                    .gen_range(self.spec.seq.ip4.min_id..=self.spec.seq.ip4.max_id);
                self.template.set_id(id);
            }
            match self.spec.proto {
                Protocol::Tcp => {
                    if self.spec.seq.tcp.src_port == 0 {
                        let port = self.rng.gen_range(1..=u16::MAX);
                        self.template.set_src_port(port);
                    }
                    if self.spec.seq.tcp.dst_port == 0 {
                        let port = self.rng.gen_range(1..=u16::MAX);
                        self.template.set_dst_port(port);
                    }
                }
                Protocol::Udp => {
                    if self.spec.seq.udp.src_port == 0 {
                        let port = self.rng.gen_range(1..=u16::MAX);
                        self.template.set_src_port(port);
                    }
                    if self.spec.seq.udp.dst_port == 0 {
                        let port = self.rng.gen_range(1..=u16::MAX);
                        self.template.set_dst_port(port);
                    }
                }
                Protocol::Icmp => (),
            }

            if n_payloads > 0 {
                let payload_spec = &self.spec.seq.payloads[self.payload_index];
                if n_payloads > 1 || payload::is_dynamic(payload_spec) {
                    match payload::resolve_into(payload_spec, &mut self.rng, &mut self.payload_buf)
                    {
                        Ok(()) => self.template.set_payload(&self.payload_buf),
                        Err(e) => {
                            log::warn!(
                                "[SEQ {seq_index}] Failed to resolve payload #{} on lane #{lane_index}: {e}",
                                self.payload_index
                            );
                            utils::sleep_micros(delay);
                            continue;
                        }
                    }
                }
            }

            let frame = self.template.finalize();
            let frame_len = frame.len() as u64;
            if let Err(e) = backend.send(frame) {
                log::warn!("[SEQ {seq_index}] Failed to send packet on lane #{lane_index}: {e}");
                utils::sleep_micros(delay);
                continue;
            }

            self.tot_pkts += 1;
            self.tot_bytes += frame_len;
            self.gate.record(frame_len);
            self.stats.account(1, frame_len);

            let (cur_pps, cur_bps) = self.gate.current();
            log::trace!(
                "[SEQ {seq_index}] Sent packet from '{}' to '{}' on lane #{lane_index} (length => {frame_len}, current PPS => {cur_pps}, current BPS => {cur_bps})",
                self.cur_src,
                self.spec.dst_ip
            );

            if self
                .spec
                .stops
                .reached(self.tot_pkts, self.tot_bytes, self.now)
            {
                break;
            }

            if n_payloads > 1 {
                self.payload_index = (self.payload_index + 1) % n_payloads;
            }

            utils::sleep_micros(delay);
        }
    }
}
