//! JSON configuration model. Field names are PascalCase on the wire.
//! Unknown keys are ignored on load so configs can carry annotations.

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DebugCfg {
    /// 0 = errors only, 1 = normal, 2 = verbose, 3+ = everything
    pub verbose: u8,
    /// When set, log records go to `<LogDir>/pktforge.log` instead of stderr
    pub log_dir: Option<String>,
}

impl Default for DebugCfg {
    fn default() -> Self {
        DebugCfg {
            verbose: 1,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct EthSpec {
    /// Empty = read from the interface
    pub src_mac: String,
    /// Empty = resolve the default gateway
    pub dst_mac: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Ip4Spec {
    pub protocol: String,
    pub src_ip: String,
    pub src_ip_ranges: Vec<String>,
    pub dst_ip: String,
    pub tos: u8,
    pub min_ttl: u8,
    pub max_ttl: u8,
    pub min_id: u16,
    pub max_id: u16,
    #[serde(rename = "DoCsum")]
    pub csum: bool,
}

impl Default for Ip4Spec {
    fn default() -> Self {
        Ip4Spec {
            protocol: String::new(),
            src_ip: String::new(),
            src_ip_ranges: Vec::new(),
            dst_ip: String::new(),
            tos: 0,
            min_ttl: 64,
            max_ttl: 64,
            min_id: 0,
            max_id: 0,
            csum: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TcpFlagsSpec {
    pub syn: bool,
    pub ack: bool,
    pub psh: bool,
    pub fin: bool,
    pub rst: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TcpSpec {
    /// 0 = random per packet
    pub src_port: u16,
    pub dst_port: u16,
    /// Send from the IPv4 header and let the kernel build layer 2
    pub use_cooked_socket: bool,
    pub flags: TcpFlagsSpec,
    pub csum: bool,
}

impl Default for TcpSpec {
    fn default() -> Self {
        TcpSpec {
            src_port: 0,
            dst_port: 0,
            use_cooked_socket: false,
            flags: TcpFlagsSpec::default(),
            csum: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct UdpSpec {
    pub src_port: u16,
    pub dst_port: u16,
    pub csum: bool,
}

impl Default for UdpSpec {
    fn default() -> Self {
        UdpSpec {
            src_port: 0,
            dst_port: 0,
            csum: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct IcmpSpec {
    pub code: u8,
    #[serde(rename = "Type")]
    pub icmp_type: u8,
    pub csum: bool,
}

impl Default for IcmpSpec {
    fn default() -> Self {
        IcmpSpec {
            code: 0,
            icmp_type: 0,
            csum: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PayloadSpec {
    pub min_len: u16,
    pub max_len: u16,
    pub is_static: bool,
    pub is_file: bool,
    pub is_string: bool,
    pub exact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Sequence {
    pub tech: String,
    pub interface: String,
    pub block: bool,
    pub track: bool,
    pub max_pkts: u64,
    pub max_bytes: u64,
    pub pps: u64,
    pub bps: u64,
    /// Seconds; 0 or below means no time limit
    pub time: i64,
    /// Inter-packet delay in microseconds
    pub delay: u64,
    /// 0 = one lane per CPU
    pub threads: u8,
    /// Nanoseconds between RNG reseeds; negative falls back to 10000
    pub rand_interval: i64,
    pub eth: EthSpec,
    pub ip4: Ip4Spec,
    pub tcp: TcpSpec,
    pub udp: UdpSpec,
    pub icmp: IcmpSpec,
    pub payloads: Vec<PayloadSpec>,
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence {
            tech: String::new(),
            interface: String::new(),
            block: false,
            track: false,
            max_pkts: 0,
            max_bytes: 0,
            pps: 0,
            bps: 0,
            time: 0,
            delay: 0,
            threads: 0,
            rand_interval: 10_000,
            eth: EthSpec::default(),
            ip4: Ip4Spec::default(),
            tcp: TcpSpec::default(),
            udp: UdpSpec::default(),
            icmp: IcmpSpec::default(),
            payloads: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    pub debug: DebugCfg,
    pub interface: String,
    pub save_cfg: bool,
    pub sequences: Vec<Sequence>,
}

impl Config {
    pub fn load(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load_from_fs(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::load(&data)
    }

    pub fn save_to_fs(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Print the loaded settings to stdout, one line per field.
    pub fn list(&self) {
        println!("Listing settings...\n");

        println!("Debug Settings");
        println!("\tVerbose => {}", self.debug.verbose);
        println!(
            "\tLog Directory => {}",
            self.debug.log_dir.as_deref().unwrap_or("N/A")
        );

        println!("\nGeneral Settings");
        let dev = if self.interface.is_empty() {
            "N/A"
        } else {
            &self.interface
        };
        println!("\tInterface => {dev}");
        println!("\tSave Config => {}", self.save_cfg);

        println!("\nSequences");
        if self.sequences.is_empty() {
            println!("\t- None");
            return;
        }
        for (k, v) in self.sequences.iter().enumerate() {
            println!("\t#{}", k + 1);

            let dev = if v.interface.is_empty() {
                "N/A"
            } else {
                &v.interface
            };
            println!("\t\tTech => {}", v.tech);
            println!("\t\tInterface => {dev}");
            println!("\t\tBlock => {}", v.block);
            println!("\t\tTrack => {}", v.track);
            println!("\t\tMax Packets => {}", v.max_pkts);
            println!("\t\tMax Bytes => {}", v.max_bytes);
            println!("\t\tPPS => {}", v.pps);
            println!("\t\tBPS => {}", v.bps);
            println!("\t\tTime => {}", v.time);
            println!("\t\tDelay => {}", v.delay);
            println!("\t\tThreads => {}", v.threads);
            println!("\t\tRand Interval => {}", v.rand_interval);

            println!("\n\t\tEthernet");
            let smac = if v.eth.src_mac.is_empty() {
                "AUTO"
            } else {
                &v.eth.src_mac
            };
            println!("\t\t\tSrc MAC => {smac}");
            let dmac = if v.eth.dst_mac.is_empty() {
                "AUTO"
            } else {
                &v.eth.dst_mac
            };
            println!("\t\t\tDst MAC => {dmac}");

            println!("\n\t\tIPv4");
            println!("\t\t\tProtocol => {}", v.ip4.protocol);
            let src_ip = if v.ip4.src_ip.is_empty() {
                "AUTO"
            } else {
                &v.ip4.src_ip
            };
            println!("\t\t\tSrc IP => {src_ip}");
            println!("\t\t\tSrc Ranges");
            if v.ip4.src_ip_ranges.is_empty() {
                println!("\t\t\t\t- None");
            } else {
                for range in &v.ip4.src_ip_ranges {
                    println!("\t\t\t\t- {range}");
                }
            }
            println!("\t\t\tDst IP => {}", v.ip4.dst_ip);
            println!("\t\t\tMin TTL => {}", v.ip4.min_ttl);
            println!("\t\t\tMax TTL => {}", v.ip4.max_ttl);
            println!("\t\t\tMin ID => {}", v.ip4.min_id);
            println!("\t\t\tMax ID => {}", v.ip4.max_id);
            println!("\t\t\tChecksum => {}", v.ip4.csum);

            println!("\n\t\tTCP");
            println!("\t\t\tSrc Port => {}", v.tcp.src_port);
            println!("\t\t\tDst Port => {}", v.tcp.dst_port);
            println!("\t\t\tUse Cooked Socket => {}", v.tcp.use_cooked_socket);
            println!("\t\t\tChecksum => {}", v.tcp.csum);

            println!("\n\t\t\tFlags");
            println!("\t\t\t\tSYN => {}", v.tcp.flags.syn);
            println!("\t\t\t\tACK => {}", v.tcp.flags.ack);
            println!("\t\t\t\tPSH => {}", v.tcp.flags.psh);
            println!("\t\t\t\tFIN => {}", v.tcp.flags.fin);
            println!("\t\t\t\tRST => {}", v.tcp.flags.rst);
            println!("\t\t\t\tURG => {}", v.tcp.flags.urg);
            println!("\t\t\t\tECE => {}", v.tcp.flags.ece);
            println!("\t\t\t\tCWR => {}", v.tcp.flags.cwr);

            println!("\n\t\tUDP");
            println!("\t\t\tSrc Port => {}", v.udp.src_port);
            println!("\t\t\tDst Port => {}", v.udp.dst_port);
            println!("\t\t\tChecksum => {}", v.udp.csum);

            println!("\n\t\tICMP");
            println!("\t\t\tCode => {}", v.icmp.code);
            println!("\t\t\tType => {}", v.icmp.icmp_type);
            println!("\t\t\tChecksum => {}", v.icmp.csum);

            println!("\n\t\tPayloads");
            if v.payloads.is_empty() {
                println!("\t\t\t- None");
            } else {
                for (k2, p) in v.payloads.iter().enumerate() {
                    println!("\t\t\t#{}", k2 + 1);
                    println!("\t\t\t\tMin Length => {}", p.min_len);
                    println!("\t\t\t\tMax Length => {}", p.max_len);
                    println!("\t\t\t\tIs Static => {}", p.is_static);
                    println!("\t\t\t\tIs File => {}", p.is_file);
                    println!("\t\t\t\tIs String => {}", p.is_string);
                    let exact = if p.exact.is_empty() { "N/A" } else { &p.exact };
                    println!("\t\t\t\tExact => {exact}");
                }
            }
        }
    }
}
