//! Transmission backends. Each lane opens its backend inside its own
//! thread, hands it finished frames one at a time and releases it once
//! when the lane stops.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use pnet::datalink::{self, Channel, DataLinkSender};
use pnet::transport::{transport_channel, TransportChannelType, TransportSender};
use pnet_packet::ethernet::MutableEthernetPacket;
use pnet_packet::ip::IpNextHeaderProtocol;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet as _;

use crate::error::{Error, Result};
use crate::net::Protocol;
use crate::utils;

/// The closed set of transmission technologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tech {
    AfPacket,
    Pcap,
    Dummy,
}

impl FromStr for Tech {
    type Err = Error;

    fn from_str(s: &str) -> Result<Tech> {
        match s.to_lowercase().as_str() {
            "af_packet" => Ok(Tech::AfPacket),
            "pcap" => Ok(Tech::Pcap),
            "dummy" => Ok(Tech::Dummy),
            _ => Err(Error::UnknownTech(s.to_string())),
        }
    }
}

impl std::fmt::Display for Tech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tech::AfPacket => write!(f, "af_packet"),
            Tech::Pcap => write!(f, "pcap"),
            Tech::Dummy => write!(f, "dummy"),
        }
    }
}

/// Technology-specific settings resolved by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Send from the IPv4 header and let the kernel fill the link layer.
    pub cooked: bool,
    /// Base path for capture files written by the pcap technology.
    pub pcap_out: String,
}

/// One send-capable resource. Implementations must not retain the frame
/// buffer beyond the `send` call.
pub trait TxBackend {
    fn send(&mut self, frame: &[u8]) -> Result<()>;
    fn cleanup(&mut self) -> Result<()>;
}

/// Acquires the send resource for one lane.
pub fn open(
    tech: Tech,
    dev: &str,
    opts: &BackendOptions,
    lane: usize,
    proto: Protocol,
) -> Result<Box<dyn TxBackend>> {
    match tech {
        Tech::AfPacket if opts.cooked => Ok(Box::new(CookedSocket::open(proto)?)),
        Tech::AfPacket => Ok(Box::new(RawLink::open(dev)?)),
        Tech::Pcap => Ok(Box::new(PcapSink::open(&opts.pcap_out, lane)?)),
        Tech::Dummy => Ok(Box::new(DummySink { sent: 0 })),
    }
}

/// Each lane writes its own capture file so no handle is ever shared.
fn lane_path(base: &str, lane: usize) -> String {
    if lane == 0 {
        base.to_string()
    } else {
        format!("{base}.{lane}")
    }
}

/// Link-layer channel bound to one interface.
struct RawLink {
    tx: Box<dyn DataLinkSender>,
}

impl RawLink {
    fn open(dev: &str) -> Result<RawLink> {
        let interfaces = datalink::interfaces();
        let interface = interfaces
            .into_iter()
            .find(|iface| iface.name == dev)
            .ok_or_else(|| Error::backend_setup(format!("interface '{dev}' not found")))?;
        match datalink::channel(&interface, Default::default()) {
            Ok(Channel::Ethernet(tx, _)) => Ok(RawLink { tx }),
            Ok(_) => Err(Error::backend_setup("unsupported channel type")),
            Err(e) => Err(Error::backend_setup(format!(
                "cannot open a link-layer channel on '{dev}': {e}. Please retry with root privilege."
            ))),
        }
    }
}

impl TxBackend for RawLink {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        match self.tx.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(Error::send_failed(e.to_string())),
            None => Err(Error::send_failed("link-layer channel rejected the frame")),
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Layer-3 raw socket; the kernel fills in the Ethernet header.
struct CookedSocket {
    tx: TransportSender,
}

impl CookedSocket {
    fn open(proto: Protocol) -> Result<CookedSocket> {
        let channel_type =
            TransportChannelType::Layer3(IpNextHeaderProtocol::new(proto.number()));
        let (tx, _) = transport_channel(4096, channel_type).map_err(|e| {
            Error::backend_setup(format!(
                "cannot open a transport channel: {e}. Please retry with root privilege."
            ))
        })?;
        Ok(CookedSocket { tx })
    }
}

impl TxBackend for CookedSocket {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let ip_start = MutableEthernetPacket::minimum_packet_size();
        let ipv4_packet = Ipv4Packet::new(&frame[ip_start..])
            .ok_or_else(|| Error::send_failed("frame too short for an IPv4 header"))?;
        let dst = ipv4_packet.get_destination();
        let sent = self
            .tx
            .send_to(&ipv4_packet, IpAddr::V4(dst))
            .map_err(|e| Error::send_failed(e.to_string()))?;
        if sent != ipv4_packet.packet().len() {
            return Err(Error::send_failed(format!("short send of {sent} bytes")));
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Appends frames to a capture file instead of a wire.
struct PcapSink {
    sf: pcap::Savefile,
}

impl PcapSink {
    fn open(base: &str, lane: usize) -> Result<PcapSink> {
        let capture = pcap::Capture::dead(pcap::Linktype::ETHERNET)?;
        let sf = capture.savefile(lane_path(base, lane))?;
        Ok(PcapSink { sf })
    }
}

impl TxBackend for PcapSink {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let header = pcap::PacketHeader {
            ts: utils::duration_to_timeval(since_epoch),
            caplen: frame.len() as u32,
            len: frame.len() as u32,
        };
        self.sf.write(&pcap::Packet::new(&header, frame));
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.sf.flush()?;
        Ok(())
    }
}

/// Counts and discards frames, for dry runs and tests.
struct DummySink {
    sent: u64,
}

impl TxBackend for DummySink {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.sent += 1;
        log::trace!("Discarding frame #{} ({} bytes)", self.sent, frame.len());
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        log::debug!("Dummy backend discarded {} frames", self.sent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcap::{Capture, Offline};

    #[test]
    fn test_tech_parse() {
        assert_eq!("af_packet".parse::<Tech>().unwrap(), Tech::AfPacket);
        assert_eq!("PCAP".parse::<Tech>().unwrap(), Tech::Pcap);
        assert_eq!("dummy".parse::<Tech>().unwrap(), Tech::Dummy);
        assert!(matches!(
            "af_xdp".parse::<Tech>(),
            Err(Error::UnknownTech(_))
        ));
        assert_eq!(Tech::AfPacket.to_string(), "af_packet");
    }

    #[test]
    fn test_lane_path() {
        assert_eq!(lane_path("out.pcap", 0), "out.pcap");
        assert_eq!(lane_path("out.pcap", 3), "out.pcap.3");
    }

    #[test]
    fn test_dummy_counts() {
        let mut backend = DummySink { sent: 0 };
        backend.send(&[0u8; 42]).unwrap();
        backend.send(&[0u8; 42]).unwrap();
        assert_eq!(backend.sent, 2);
        backend.cleanup().unwrap();
    }

    #[test]
    fn test_pcap_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pcap");
        let opts = BackendOptions {
            cooked: false,
            pcap_out: path.to_str().unwrap().to_string(),
        };
        let mut backend = open(Tech::Pcap, "", &opts, 0, Protocol::Udp).unwrap();
        let frame = [0xaa_u8; 60];
        backend.send(&frame).unwrap();
        backend.send(&frame).unwrap();
        backend.cleanup().unwrap();
        drop(backend);

        let mut capture = Capture::<Offline>::from_file(&path).unwrap();
        let mut count = 0;
        while let Ok(packet) = capture.next_packet() {
            assert_eq!(packet.data, &frame[..]);
            assert_eq!(packet.header.caplen, 60);
            count += 1;
        }
        assert_eq!(count, 2);
    }
}
