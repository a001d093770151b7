//! Frame templates. A lane writes the static layers once, then only
//! touches the randomized fields between sends and recomputes checksums
//! right before the frame goes to the backend.

use std::net::Ipv4Addr;

use pnet::util::MacAddr;
use pnet_packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet_packet::icmp::{self, IcmpCode, IcmpType, MutableIcmpPacket};
use pnet_packet::ip::IpNextHeaderProtocol;
use pnet_packet::ipv4::{self, MutableIpv4Packet};
use pnet_packet::tcp::{self, MutableTcpPacket, TcpFlags};
use pnet_packet::udp::MutableUdpPacket;

use crate::config::{IcmpSpec, Ip4Spec, Sequence, TcpSpec, UdpSpec};
use crate::net::Protocol;

// Type, code and checksum, then the identifier and sequence words of the
// classic echo layout, all zero unless configured.
const ICMP_HEADER_LEN: usize = 8;

/// A reusable Ethernet/IPv4 frame with one transport layer.
pub struct FrameTemplate {
    buf: Vec<u8>,
    proto: Protocol,
    l4_offset: usize,
    payload_offset: usize,
    payload_len: usize,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    l3_csum: bool,
    l4_csum: bool,
}

fn setup_ethernet_frame(packet: &mut [u8], src_mac: MacAddr, dst_mac: MacAddr) -> Option<()> {
    let mut eth_packet = MutableEthernetPacket::new(packet)?;
    eth_packet.set_source(src_mac);
    eth_packet.set_destination(dst_mac);
    eth_packet.set_ethertype(EtherTypes::Ipv4);
    Some(())
}

fn setup_ip_packet(
    packet: &mut [u8],
    ip4: &Ip4Spec,
    proto: Protocol,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    total_length: u16,
) -> Option<()> {
    let mut ipv4_packet = MutableIpv4Packet::new(packet)?;
    ipv4_packet.set_version(4);
    ipv4_packet.set_header_length(5);
    ipv4_packet.set_dscp(ip4.tos >> 2);
    ipv4_packet.set_ecn(ip4.tos & 0x3);
    ipv4_packet.set_total_length(total_length);
    ipv4_packet.set_identification(ip4.min_id);
    ipv4_packet.set_ttl(ip4.min_ttl);
    ipv4_packet.set_next_level_protocol(IpNextHeaderProtocol::new(proto.number()));
    ipv4_packet.set_source(src_ip);
    ipv4_packet.set_destination(dst_ip);
    Some(())
}

fn setup_tcp_packet(packet: &mut [u8], tcp: &TcpSpec) -> Option<()> {
    let mut tcp_packet = MutableTcpPacket::new(packet)?;
    tcp_packet.set_source(tcp.src_port);
    tcp_packet.set_destination(tcp.dst_port);
    tcp_packet.set_data_offset(5);
    tcp_packet.set_flags(
        (tcp.flags.syn as u8 * TcpFlags::SYN)
            | (tcp.flags.ack as u8 * TcpFlags::ACK)
            | (tcp.flags.psh as u8 * TcpFlags::PSH)
            | (tcp.flags.fin as u8 * TcpFlags::FIN)
            | (tcp.flags.rst as u8 * TcpFlags::RST)
            | (tcp.flags.urg as u8 * TcpFlags::URG)
            | (tcp.flags.ece as u8 * TcpFlags::ECE)
            | (tcp.flags.cwr as u8 * TcpFlags::CWR),
    );
    Some(())
}

fn setup_udp_packet(packet: &mut [u8], udp: &UdpSpec) -> Option<()> {
    let mut udp_packet = MutableUdpPacket::new(packet)?;
    udp_packet.set_source(udp.src_port);
    udp_packet.set_destination(udp.dst_port);
    udp_packet.set_length(8);
    Some(())
}

fn setup_icmp_packet(packet: &mut [u8], icmp: &IcmpSpec) -> Option<()> {
    let mut icmp_packet = MutableIcmpPacket::new(packet)?;
    icmp_packet.set_icmp_type(IcmpType::new(icmp.icmp_type));
    icmp_packet.set_icmp_code(IcmpCode::new(icmp.code));
    Some(())
}

impl FrameTemplate {
    pub fn new(
        seq: &Sequence,
        proto: Protocol,
        src_mac: [u8; 6],
        dst_mac: [u8; 6],
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
    ) -> FrameTemplate {
        let ip_start = MutableEthernetPacket::minimum_packet_size();
        let l4_offset = ip_start + MutableIpv4Packet::minimum_packet_size();
        let l4_len = match proto {
            Protocol::Tcp => MutableTcpPacket::minimum_packet_size(),
            Protocol::Udp => MutableUdpPacket::minimum_packet_size(),
            Protocol::Icmp => ICMP_HEADER_LEN,
        };
        let payload_offset = l4_offset + l4_len;
        // Big enough for the largest possible IPv4 total length.
        let mut buf = vec![0u8; ip_start + u16::MAX as usize];

        setup_ethernet_frame(&mut buf, src_mac.into(), dst_mac.into())
            .expect("Incorrect Ethernet frame");
        setup_ip_packet(
            &mut buf[ip_start..],
            &seq.ip4,
            proto,
            src_ip,
            dst_ip,
            (payload_offset - ip_start) as u16,
        )
        .expect("Incorrect IP packet");
        match proto {
            Protocol::Tcp => {
                setup_tcp_packet(&mut buf[l4_offset..], &seq.tcp).expect("Incorrect TCP packet")
            }
            Protocol::Udp => {
                setup_udp_packet(&mut buf[l4_offset..], &seq.udp).expect("Incorrect UDP packet")
            }
            Protocol::Icmp => {
                setup_icmp_packet(&mut buf[l4_offset..], &seq.icmp).expect("Incorrect ICMP packet")
            }
        }

        let l4_csum = match proto {
            Protocol::Tcp => seq.tcp.csum,
            Protocol::Udp => seq.udp.csum,
            Protocol::Icmp => seq.icmp.csum,
        };
        FrameTemplate {
            buf,
            proto,
            l4_offset,
            payload_offset,
            payload_len: 0,
            src_ip,
            dst_ip,
            l3_csum: seq.ip4.csum,
            l4_csum,
        }
    }

    fn ipv4_mut(&mut self) -> MutableIpv4Packet<'_> {
        let ip_start = MutableEthernetPacket::minimum_packet_size();
        MutableIpv4Packet::new(&mut self.buf[ip_start..]).expect("Incorrect IP packet")
    }

    pub fn set_src_ip(&mut self, ip: Ipv4Addr) {
        self.src_ip = ip;
        self.ipv4_mut().set_source(ip);
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.ipv4_mut().set_ttl(ttl);
    }

    pub fn set_id(&mut self, id: u16) {
        self.ipv4_mut().set_identification(id);
    }

    pub fn set_src_port(&mut self, port: u16) {
        match self.proto {
            Protocol::Tcp => MutableTcpPacket::new(&mut self.buf[self.l4_offset..])
                .expect("Incorrect TCP packet")
                .set_source(port),
            Protocol::Udp => MutableUdpPacket::new(&mut self.buf[self.l4_offset..])
                .expect("Incorrect UDP packet")
                .set_source(port),
            Protocol::Icmp => (),
        }
    }

    pub fn set_dst_port(&mut self, port: u16) {
        match self.proto {
            Protocol::Tcp => MutableTcpPacket::new(&mut self.buf[self.l4_offset..])
                .expect("Incorrect TCP packet")
                .set_destination(port),
            Protocol::Udp => MutableUdpPacket::new(&mut self.buf[self.l4_offset..])
                .expect("Incorrect UDP packet")
                .set_destination(port),
            Protocol::Icmp => (),
        }
    }

    /// Copies the payload into place and fixes up the length fields.
    /// Oversized payloads are clamped so the IPv4 total length cannot wrap.
    pub fn set_payload(&mut self, data: &[u8]) {
        let n = data.len().min(self.buf.len() - self.payload_offset);
        self.buf[self.payload_offset..self.payload_offset + n].copy_from_slice(&data[..n]);
        self.payload_len = n;

        let ip_start = MutableEthernetPacket::minimum_packet_size();
        let total_length = (self.payload_offset - ip_start + n) as u16;
        self.ipv4_mut().set_total_length(total_length);
        if self.proto == Protocol::Udp {
            MutableUdpPacket::new(&mut self.buf[self.l4_offset..])
                .expect("Incorrect UDP packet")
                .set_length(n as u16 + 8);
        }
    }

    /// Frame length on the wire, Ethernet header included.
    pub fn frame_len(&self) -> usize {
        self.payload_offset + self.payload_len
    }

    /// Recomputes the enabled checksums and returns the finished frame.
    pub fn finalize(&mut self) -> &[u8] {
        let end = self.frame_len();
        let ip_start = MutableEthernetPacket::minimum_packet_size();
        let (src_ip, dst_ip) = (self.src_ip, self.dst_ip);

        if self.l3_csum {
            let mut ipv4_packet = MutableIpv4Packet::new(&mut self.buf[ip_start..end])
                .expect("Incorrect IP packet");
            ipv4_packet.set_checksum(ipv4::checksum(&ipv4_packet.to_immutable()));
        }
        if self.l4_csum {
            match self.proto {
                Protocol::Tcp => {
                    let mut tcp_packet = MutableTcpPacket::new(&mut self.buf[self.l4_offset..end])
                        .expect("Incorrect TCP packet");
                    tcp_packet.set_checksum(tcp::ipv4_checksum(
                        &tcp_packet.to_immutable(),
                        &src_ip,
                        &dst_ip,
                    ));
                }
                Protocol::Udp => {
                    let mut udp_packet = MutableUdpPacket::new(&mut self.buf[self.l4_offset..end])
                        .expect("Incorrect UDP packet");
                    udp_packet.set_checksum(pnet_packet::udp::ipv4_checksum(
                        &udp_packet.to_immutable(),
                        &src_ip,
                        &dst_ip,
                    ));
                }
                Protocol::Icmp => {
                    let mut icmp_packet =
                        MutableIcmpPacket::new(&mut self.buf[self.l4_offset..end])
                            .expect("Incorrect ICMP packet");
                    icmp_packet.set_checksum(icmp::checksum(&icmp_packet.to_immutable()));
                }
            }
        }
        &self.buf[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packet::ethernet::EthernetPacket;
    use pnet_packet::icmp::IcmpPacket;
    use pnet_packet::ipv4::Ipv4Packet;
    use pnet_packet::tcp::TcpPacket;
    use pnet_packet::udp::UdpPacket;

    const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

    fn template(proto: Protocol, seq: &Sequence) -> FrameTemplate {
        FrameTemplate::new(
            seq,
            proto,
            SRC_MAC,
            DST_MAC,
            Ipv4Addr::new(192, 168, 0, 1),
            Ipv4Addr::new(192, 168, 0, 199),
        )
    }

    // Known-good header whose ones-complement checksum is 0xb861.
    #[test]
    fn test_reference_ipv4_checksum() {
        let mut raw = [0u8; 20];
        let mut p = MutableIpv4Packet::new(&mut raw).unwrap();
        p.set_version(4);
        p.set_header_length(5);
        p.set_total_length(0x73);
        p.set_flags(0b010);
        p.set_ttl(0x40);
        p.set_next_level_protocol(IpNextHeaderProtocol::new(17));
        p.set_source(Ipv4Addr::new(192, 168, 0, 1));
        p.set_destination(Ipv4Addr::new(192, 168, 0, 199));
        assert_eq!(ipv4::checksum(&p.to_immutable()), 0xb861);
    }

    #[test]
    fn test_udp_frame_layout() {
        let mut seq = Sequence::default();
        seq.udp.src_port = 1234;
        seq.udp.dst_port = 5353;
        seq.ip4.tos = 0xb8;
        let mut t = template(Protocol::Udp, &seq);
        t.set_payload(b"hello");
        let frame = t.finalize().to_vec();
        assert_eq!(frame.len(), 47);

        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_ethertype(), EtherTypes::Ipv4);
        assert_eq!(eth.get_source(), MacAddr::from(SRC_MAC));
        assert_eq!(eth.get_destination(), MacAddr::from(DST_MAC));

        let ip = Ipv4Packet::new(&frame[14..]).unwrap();
        assert_eq!(ip.get_total_length(), 33);
        assert_eq!(ip.get_next_level_protocol().0, 17);
        assert_eq!(ip.get_dscp(), 0x2e);
        assert_eq!(ip.get_ecn(), 0);
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let udp = UdpPacket::new(&frame[34..]).unwrap();
        assert_eq!(udp.get_source(), 1234);
        assert_eq!(udp.get_destination(), 5353);
        assert_eq!(udp.get_length(), 13);
        assert_eq!(
            udp.get_checksum(),
            pnet_packet::udp::ipv4_checksum(
                &udp,
                &Ipv4Addr::new(192, 168, 0, 1),
                &Ipv4Addr::new(192, 168, 0, 199)
            )
        );
        assert_eq!(&frame[42..], b"hello");
    }

    #[test]
    fn test_tcp_flags() {
        let mut seq = Sequence::default();
        seq.tcp.flags.syn = true;
        seq.tcp.flags.ack = true;
        let mut t = template(Protocol::Tcp, &seq);
        let frame = t.finalize().to_vec();
        assert_eq!(frame.len(), 54);
        let segment = TcpPacket::new(&frame[34..]).unwrap();
        assert_eq!(segment.get_flags(), TcpFlags::SYN | TcpFlags::ACK);
        assert_eq!(segment.get_data_offset(), 5);

        let mut seq = Sequence::default();
        seq.tcp.flags.ece = true;
        seq.tcp.flags.cwr = true;
        let mut t = template(Protocol::Tcp, &seq);
        let frame = t.finalize().to_vec();
        let segment = TcpPacket::new(&frame[34..]).unwrap();
        assert_eq!(segment.get_flags(), TcpFlags::ECE | TcpFlags::CWR);
    }

    #[test]
    fn test_icmp_layout() {
        let mut seq = Sequence::default();
        seq.icmp.icmp_type = 8;
        let mut t = template(Protocol::Icmp, &seq);
        let frame = t.finalize().to_vec();
        assert_eq!(frame.len(), 42);
        assert_eq!(frame[34], 8);
        assert_eq!(frame[35], 0);
        // identifier and sequence stay zero
        assert_eq!(&frame[38..42], &[0, 0, 0, 0]);
        let echo = IcmpPacket::new(&frame[34..]).unwrap();
        assert_eq!(echo.get_checksum(), icmp::checksum(&echo));
    }

    #[test]
    fn test_checksums_disabled() {
        let mut seq = Sequence::default();
        seq.ip4.csum = false;
        seq.udp.csum = false;
        let mut t = template(Protocol::Udp, &seq);
        t.set_payload(b"x");
        let frame = t.finalize().to_vec();
        let ip = Ipv4Packet::new(&frame[14..]).unwrap();
        assert_eq!(ip.get_checksum(), 0);
        let udp = UdpPacket::new(&frame[34..]).unwrap();
        assert_eq!(udp.get_checksum(), 0);
    }

    #[test]
    fn test_per_send_mutations() {
        let seq = Sequence::default();
        let mut t = template(Protocol::Udp, &seq);
        t.set_src_ip(Ipv4Addr::new(10, 1, 2, 3));
        t.set_ttl(17);
        t.set_id(0xbeef);
        t.set_src_port(4444);
        t.set_dst_port(53);
        t.set_payload(&[1, 2, 3, 4, 5, 6, 7, 8]);
        t.set_payload(&[9, 9]); // shrink
        let frame = t.finalize().to_vec();
        assert_eq!(frame.len(), 44);

        let ip = Ipv4Packet::new(&frame[14..]).unwrap();
        assert_eq!(ip.get_source(), Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(ip.get_ttl(), 17);
        assert_eq!(ip.get_identification(), 0xbeef);
        assert_eq!(ip.get_total_length(), 30);
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let udp = UdpPacket::new(&frame[34..]).unwrap();
        assert_eq!(udp.get_source(), 4444);
        assert_eq!(udp.get_destination(), 53);
        assert_eq!(udp.get_length(), 10);
        assert_eq!(&frame[42..], &[9, 9]);
    }

    #[test]
    fn test_payload_clamped() {
        let seq = Sequence::default();
        let mut t = template(Protocol::Udp, &seq);
        t.set_payload(&vec![0xab; 70000]);
        assert_eq!(t.frame_len(), 14 + 65535);
        let frame = t.finalize().to_vec();
        let ip = Ipv4Packet::new(&frame[14..]).unwrap();
        assert_eq!(ip.get_total_length(), 65535);
    }
}
