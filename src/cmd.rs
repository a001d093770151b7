use clap::Parser;

use pktforge::config::{Config, PayloadSpec, Sequence};

#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, default_value = "./conf.json", help = "Path to the JSON configuration")]
    pub cfg: String,
    #[arg(short, long, default_value_t = false, help = "List the loaded settings and exit")]
    pub list: bool,
    #[arg(short, long, help = "Transmission technology for every sequence (af_packet, pcap, dummy)")]
    pub tech: Option<String>,
    #[arg(short, long, default_value = "pktforge.pcap", help = "Output file for the pcap technology")]
    pub outfile: String,

    #[arg(short, long, help = "Interface to send from")]
    pub interface: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Wait for the sequence to finish before starting the next one")]
    pub block: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Keep rate counters even without a ceiling")]
    pub track: Option<bool>,
    #[arg(long, help = "Stop after this many packets")]
    pub max_pkts: Option<u64>,
    #[arg(long, help = "Stop once this many bytes were sent")]
    pub max_bytes: Option<u64>,
    #[arg(long, help = "Ceiling in packets per second")]
    pub pps: Option<u64>,
    #[arg(long, help = "Ceiling in bytes per second")]
    pub bps: Option<u64>,
    #[arg(long, help = "Stop after this many seconds")]
    pub time: Option<i64>,
    #[arg(long, help = "Delay between two packets, in microseconds")]
    pub delay: Option<u64>,
    #[arg(long, help = "Lanes to spawn; 0 means one per CPU")]
    pub threads: Option<u8>,
    #[arg(long, help = "Nanoseconds between RNG reseeds")]
    pub rand_interval: Option<i64>,

    #[arg(long, help = "Source MAC address; by default read from the interface")]
    pub smac: Option<String>,
    #[arg(long, help = "Destination MAC address; by default the gateway's")]
    pub dmac: Option<String>,

    #[arg(short, long, help = "Transport protocol (tcp, udp, icmp)")]
    pub protocol: Option<String>,
    #[arg(short, long, help = "Fixed source IP")]
    pub src: Option<String>,
    #[arg(short, long, help = "Comma-separated CIDR ranges to draw the source IP from")]
    pub ranges: Option<String>,
    #[arg(short, long, help = "Destination IP")]
    pub dst: Option<String>,
    #[arg(long, help = "Type of service byte")]
    pub tos: Option<u8>,
    #[arg(long, help = "Lowest TTL value")]
    pub minttl: Option<u8>,
    #[arg(long, help = "Highest TTL value")]
    pub maxttl: Option<u8>,
    #[arg(long, help = "Lowest IPv4 identification value")]
    pub minid: Option<u16>,
    #[arg(long, help = "Highest IPv4 identification value")]
    pub maxid: Option<u16>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Fill in the IPv4 header checksum")]
    pub l3csum: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Fill in the transport checksum")]
    pub l4csum: Option<bool>,

    #[arg(long, help = "Source port for TCP and UDP; 0 means random")]
    pub sport: Option<u16>,
    #[arg(long, help = "Destination port for TCP and UDP; 0 means random")]
    pub dport: Option<u16>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Send TCP from the IPv4 header through a cooked socket")]
    pub cooked: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Set the TCP SYN flag")]
    pub syn: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Set the TCP ACK flag")]
    pub ack: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Set the TCP PSH flag")]
    pub psh: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Set the TCP FIN flag")]
    pub fin: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Set the TCP RST flag")]
    pub rst: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Set the TCP URG flag")]
    pub urg: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Set the TCP ECE flag")]
    pub ece: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Set the TCP CWR flag")]
    pub cwr: Option<bool>,

    #[arg(long, help = "ICMP code")]
    pub code: Option<u8>,
    #[arg(long = "type", help = "ICMP type")]
    pub icmp_type: Option<u8>,

    #[arg(long, help = "Smallest random payload length")]
    pub plmin: Option<u16>,
    #[arg(long, help = "Largest random payload length")]
    pub plmax: Option<u16>,
    #[arg(long = "static", num_args = 0..=1, default_missing_value = "true", help = "Draw the random payload once and reuse it")]
    pub is_static: Option<bool>,
    #[arg(short, long, num_args = 0..=1, default_missing_value = "true", help = "Treat the exact payload as a file path")]
    pub file: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true", help = "Treat the exact payload as a literal string instead of hex")]
    pub string: Option<bool>,
    #[arg(short, long, help = "Exact payload, hex tokens unless --string")]
    pub exact: Option<String>,
}

fn normalize_ranges(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| {
            if r.contains('/') {
                r.to_string()
            } else {
                format!("{r}/32")
            }
        })
        .collect()
}

impl Args {
    fn payload_override(&self) -> bool {
        self.plmin.is_some()
            || self.plmax.is_some()
            || self.is_static.is_some()
            || self.file.is_some()
            || self.string.is_some()
            || self.exact.is_some()
    }

    /// Copy the overrides into the first sequence, creating it when the
    /// configuration has none and at least one flag was given. Returns
    /// false when no sequence exists even after the overrides.
    pub fn apply_to(&self, cfg: &mut Config) -> bool {
        let created = cfg.sequences.is_empty();
        let mut seq = if created {
            Sequence::default()
        } else {
            cfg.sequences[0].clone()
        };
        let untouched = seq.clone();

        if let Some(v) = &self.interface {
            seq.interface = v.clone();
        }
        if let Some(v) = self.block {
            seq.block = v;
        }
        if let Some(v) = self.track {
            seq.track = v;
        }
        if let Some(v) = self.max_pkts {
            seq.max_pkts = v;
        }
        if let Some(v) = self.max_bytes {
            seq.max_bytes = v;
        }
        if let Some(v) = self.pps {
            seq.pps = v;
        }
        if let Some(v) = self.bps {
            seq.bps = v;
        }
        if let Some(v) = self.time {
            seq.time = v;
        }
        if let Some(v) = self.delay {
            seq.delay = v;
        }
        if let Some(v) = self.threads {
            seq.threads = v;
        }
        if let Some(v) = self.rand_interval {
            seq.rand_interval = v;
        }

        if let Some(v) = &self.smac {
            seq.eth.src_mac = v.clone();
        }
        if let Some(v) = &self.dmac {
            seq.eth.dst_mac = v.clone();
        }

        if let Some(v) = &self.protocol {
            seq.ip4.protocol = v.clone();
        }
        if let Some(v) = &self.src {
            seq.ip4.src_ip = v.clone();
        }
        if let Some(v) = &self.ranges {
            seq.ip4.src_ip_ranges = normalize_ranges(v);
        }
        if let Some(v) = &self.dst {
            seq.ip4.dst_ip = v.clone();
        }
        if let Some(v) = self.tos {
            seq.ip4.tos = v;
        }
        if let Some(v) = self.minttl {
            seq.ip4.min_ttl = v;
        }
        if let Some(v) = self.maxttl {
            seq.ip4.max_ttl = v;
        }
        if let Some(v) = self.minid {
            seq.ip4.min_id = v;
        }
        if let Some(v) = self.maxid {
            seq.ip4.max_id = v;
        }
        if let Some(v) = self.l3csum {
            seq.ip4.csum = v;
        }
        if let Some(v) = self.l4csum {
            seq.tcp.csum = v;
            seq.udp.csum = v;
            seq.icmp.csum = v;
        }

        if let Some(v) = self.sport {
            seq.tcp.src_port = v;
            seq.udp.src_port = v;
        }
        if let Some(v) = self.dport {
            seq.tcp.dst_port = v;
            seq.udp.dst_port = v;
        }
        if let Some(v) = self.cooked {
            seq.tcp.use_cooked_socket = v;
        }
        if let Some(v) = self.syn {
            seq.tcp.flags.syn = v;
        }
        if let Some(v) = self.ack {
            seq.tcp.flags.ack = v;
        }
        if let Some(v) = self.psh {
            seq.tcp.flags.psh = v;
        }
        if let Some(v) = self.fin {
            seq.tcp.flags.fin = v;
        }
        if let Some(v) = self.rst {
            seq.tcp.flags.rst = v;
        }
        if let Some(v) = self.urg {
            seq.tcp.flags.urg = v;
        }
        if let Some(v) = self.ece {
            seq.tcp.flags.ece = v;
        }
        if let Some(v) = self.cwr {
            seq.tcp.flags.cwr = v;
        }

        if let Some(v) = self.code {
            seq.icmp.code = v;
        }
        if let Some(v) = self.icmp_type {
            seq.icmp.icmp_type = v;
        }

        if self.payload_override() {
            if seq.payloads.is_empty() {
                seq.payloads.push(PayloadSpec::default());
            }
            let pl = &mut seq.payloads[0];
            if let Some(v) = self.plmin {
                pl.min_len = v;
            }
            if let Some(v) = self.plmax {
                pl.max_len = v;
            }
            if let Some(v) = self.is_static {
                pl.is_static = v;
            }
            if let Some(v) = self.file {
                pl.is_file = v;
            }
            if let Some(v) = self.string {
                pl.is_string = v;
            }
            if let Some(v) = &self.exact {
                pl.exact = v.clone();
            }
        }

        if created {
            if seq != untouched {
                cfg.sequences.push(seq);
            }
        } else {
            cfg.sequences[0] = seq;
        }
        !cfg.sequences.is_empty()
    }
}
