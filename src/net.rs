//! Address handling: protocol names, MAC parsing and OS lookups, and the
//! CIDR ranges used to randomize the source IP.

use crate::error::{Error, Result};

use pnet::util::MacAddr;
use rand_core::RngCore;
use std::fmt;
use std::net::Ipv4Addr;
use std::process::Command;
use std::str::FromStr;

/// Transport protocols the generator can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// IANA protocol number, as written in the IPv4 header.
    pub fn number(&self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Icmp => 1,
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            _ => Err(Error::UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
        }
    }
}

/// Parse a colon-separated MAC address. Exactly six hex octets are
/// expected; surrounding whitespace is ignored.
pub fn parse_mac(s: &str) -> Result<MacAddr> {
    let trimmed = s.trim();
    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() != 6 {
        return Err(Error::MalformedAddress(trimmed.to_string()));
    }
    let mut octets = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        octets[i] = u8::from_str_radix(part, 16)
            .map_err(|_| Error::MalformedAddress(trimmed.to_string()))?;
    }
    Ok(MacAddr::new(
        octets[0], octets[1], octets[2], octets[3], octets[4], octets[5],
    ))
}

/// MAC address of a local interface, read from sysfs.
pub fn interface_mac(dev: &str) -> Result<MacAddr> {
    let path = format!("/sys/class/net/{dev}/address");
    let contents = std::fs::read_to_string(path).map_err(|e| Error::MacLookup {
        dev: dev.to_string(),
        reason: e.to_string(),
    })?;
    parse_mac(&contents)
}

fn shell_line(cmd: &str) -> Result<String> {
    let out = Command::new("sh").arg("-c").arg(cmd).output()?;
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// MAC address of the default IPv4 gateway, resolved through the routing
/// table and the neighbor cache.
pub fn gateway_mac() -> Result<MacAddr> {
    let gateway = shell_line("ip -4 route list 0/0 | awk '{print $3}'")?;
    if gateway.is_empty() {
        return Err(Error::GatewayLookup("no default route".to_string()));
    }
    let mac = shell_line(&format!("ip neigh | grep -m1 '{gateway} ' | awk '{{print $5}}'"))?;
    if mac.is_empty() {
        return Err(Error::GatewayLookup(format!(
            "gateway {gateway} not in the neighbor cache"
        )));
    }
    parse_mac(&mac)
}

/// Draw a random address inside `range`, written as `address/prefix`.
/// A missing prefix means /32, so the literal address is returned.
pub fn random_ip_from_range(range: &str, rng: &mut impl RngCore) -> Result<Ipv4Addr> {
    let (ip_str, prefix) = match range.split_once('/') {
        Some((ip, p)) => {
            let prefix: u32 = p
                .trim()
                .parse()
                .map_err(|_| Error::invalid_range(range, "prefix is not a number"))?;
            (ip.trim(), prefix)
        }
        None => (range.trim(), 32),
    };
    if prefix > 32 {
        return Err(Error::invalid_range(range, "prefix above 32"));
    }
    let network: Ipv4Addr = ip_str
        .parse()
        .map_err(|_| Error::invalid_range(range, "not an IPv4 address"))?;
    // widened to 64 bits so /0 does not overflow the shift
    let host_mask = ((1u64 << (32 - prefix)) - 1) as u32;
    let addr = (u32::from(network) & !host_mask) | (rng.next_u32() & host_mask);
    Ok(Ipv4Addr::from(addr))
}
