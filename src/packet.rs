use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::ofp_message::OfpError;

/// Ethernet hardware address.
pub type MacAddr = [u8; 6];

/// EtherType carried by IPv4 frames.
pub const ETH_TYPE_IP: u16 = 0x0800;
/// IANA protocol number for TCP.
pub const IP_PROTO_TCP: u8 = 6;

pub const ETH_HEADER_LENGTH: usize = 14;
pub const IP_HEADER_LENGTH: usize = 20;
const TCP_PORTS_LENGTH: usize = 4;

pub fn bytes_of_mac(addr: u64) -> MacAddr {
    let mut arr = [0; 6];
    for (i, b) in arr.iter_mut().enumerate() {
        *b = ((addr >> (8 * (5 - i))) & 0xff) as u8;
    }
    arr
}

pub fn mac_of_bytes(addr: MacAddr) -> u64 {
    addr.iter().fold(0, |acc, b| (acc << 8) | *b as u64)
}

/// Colon-separated rendering of a hardware address.
pub struct Mac<'a>(pub &'a MacAddr);

impl<'a> fmt::Display for Mac<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

fn remaining(bytes: &Cursor<&[u8]>) -> usize {
    bytes.get_ref().len().saturating_sub(bytes.position() as usize)
}

fn need(bytes: &Cursor<&[u8]>, n: usize, layer: &'static str) -> Result<(), OfpError> {
    let have = remaining(bytes);
    if have < n {
        return Err(OfpError::Truncated {
            message: layer,
            expected: n,
            actual: have,
        });
    }
    Ok(())
}

fn read_mac(bytes: &mut Cursor<&[u8]>) -> Result<MacAddr, OfpError> {
    let mut mac = [0; 6];
    bytes.read_exact(&mut mac)?;
    Ok(mac)
}

/// Ports of a TCP segment. Nothing past the ports is decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tcp {
    pub src: u16,
    pub dst: u16,
}

impl Tcp {
    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<Tcp, OfpError> {
        need(bytes, TCP_PORTS_LENGTH, "TCP header")?;
        Ok(Tcp {
            src: bytes.read_u16::<BigEndian>()?,
            dst: bytes.read_u16::<BigEndian>()?,
        })
    }
}

/// IPv4 header of a packet, with the transport ports when it carries TCP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ip {
    pub version_ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub ident: u16,
    pub flags_frag: u16,
    pub ttl: u8,
    pub proto: u8,
    pub chksum: u16,
    pub src: u32,
    pub dst: u32,
    pub options: Vec<u8>,
    pub tcp: Option<Tcp>,
}

impl Ip {
    /// Header length in bytes, as declared by the IHL nibble.
    pub fn header_length(&self) -> usize {
        (self.version_ihl & 0x0f) as usize * 4
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<Ip, OfpError> {
        need(bytes, IP_HEADER_LENGTH, "IPv4 header")?;
        let version_ihl = bytes.read_u8()?;
        let tos = bytes.read_u8()?;
        let total_length = bytes.read_u16::<BigEndian>()?;
        let ident = bytes.read_u16::<BigEndian>()?;
        let flags_frag = bytes.read_u16::<BigEndian>()?;
        let ttl = bytes.read_u8()?;
        let proto = bytes.read_u8()?;
        let chksum = bytes.read_u16::<BigEndian>()?;
        let src = bytes.read_u32::<BigEndian>()?;
        let dst = bytes.read_u32::<BigEndian>()?;

        let header_length = (version_ihl & 0x0f) as usize * 4;
        if header_length < IP_HEADER_LENGTH {
            return Err(OfpError::unexpected(
                format!("{:#x}", version_ihl),
                "version_ihl",
                "IPv4 header",
            ));
        }
        let options_len = header_length - IP_HEADER_LENGTH;
        need(bytes, options_len, "IPv4 options")?;
        let mut options = vec![0; options_len];
        bytes.read_exact(&mut options)?;

        let tcp = if proto == IP_PROTO_TCP {
            Some(Tcp::parse(bytes)?)
        } else {
            None
        };
        Ok(Ip {
            version_ihl,
            tos,
            total_length,
            ident,
            flags_frag,
            ttl,
            proto,
            chksum,
            src,
            dst,
            options,
            tcp,
        })
    }
}

/// Represents a packet at the ethernet protocol level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthFrame {
    pub dl_dst: MacAddr,
    pub dl_src: MacAddr,
    pub dl_typ: u16,
    pub ip: Option<Ip>,
}

impl EthFrame {
    /// Decode the Ethernet header and, for IPv4, the network and transport
    /// headers behind it. Layers that are not understood are left absent.
    pub fn parse(buf: &[u8]) -> Result<EthFrame, OfpError> {
        let mut bytes = Cursor::new(buf);
        need(&bytes, ETH_HEADER_LENGTH, "Ethernet header")?;
        let dl_dst = read_mac(&mut bytes)?;
        let dl_src = read_mac(&mut bytes)?;
        let dl_typ = bytes.read_u16::<BigEndian>()?;
        let ip = match dl_typ {
            ETH_TYPE_IP => Some(Ip::parse(&mut bytes)?),
            _ => None,
        };
        Ok(EthFrame {
            dl_dst,
            dl_src,
            dl_typ,
            ip,
        })
    }

    pub fn tcp(&self) -> Option<&Tcp> {
        self.ip.as_ref().and_then(|ip| ip.tcp.as_ref())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const SRC: MacAddr = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    pub const DST: MacAddr = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

    pub fn eth_header(typ: u16) -> Vec<u8> {
        let mut v = DST.to_vec();
        v.extend_from_slice(&SRC);
        v.extend_from_slice(&typ.to_be_bytes());
        v
    }

    fn ip_header(ihl: u8, proto: u8) -> Vec<u8> {
        vec![
            0x40 | ihl, 0, 0, 40, 0, 1, 0, 0, 64, proto, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2,
        ]
    }

    #[test]
    fn parses_plain_ethernet() {
        let mut buf = eth_header(0x0806);
        buf.extend_from_slice(&[0; 28]);
        let frame = EthFrame::parse(&buf).unwrap();
        assert_eq!(frame.dl_src, SRC);
        assert_eq!(frame.dl_dst, DST);
        assert_eq!(frame.dl_typ, 0x0806);
        assert!(frame.ip.is_none());
    }

    #[test]
    fn short_ethernet_header_fails() {
        let buf = eth_header(ETH_TYPE_IP);
        assert!(matches!(
            EthFrame::parse(&buf[..13]),
            Err(OfpError::Truncated { expected: 14, actual: 13, .. })
        ));
    }

    #[test]
    fn parses_ip_with_options_and_tcp_ports() {
        let mut buf = eth_header(ETH_TYPE_IP);
        buf.extend(ip_header(6, IP_PROTO_TCP));
        buf.extend_from_slice(&[1, 1, 1, 1]);
        buf.extend_from_slice(&[0x1f, 0x90, 0x00, 0x50]);
        let frame = EthFrame::parse(&buf).unwrap();
        let ip = frame.ip.as_ref().unwrap();
        assert_eq!(ip.header_length(), 24);
        assert_eq!(ip.options, vec![1, 1, 1, 1]);
        assert_eq!(ip.src, 0x0a000001);
        assert_eq!(ip.dst, 0x0a000002);
        assert_eq!(frame.tcp(), Some(&Tcp { src: 8080, dst: 80 }));
    }

    #[test]
    fn non_tcp_ip_has_no_transport() {
        let mut buf = eth_header(ETH_TYPE_IP);
        buf.extend(ip_header(5, 17));
        buf.extend_from_slice(&[0; 8]);
        let frame = EthFrame::parse(&buf).unwrap();
        assert_eq!(frame.ip.unwrap().tcp, None);
    }

    #[test]
    fn protocol_eight_is_not_tcp() {
        let mut buf = eth_header(ETH_TYPE_IP);
        buf.extend(ip_header(5, 8));
        let frame = EthFrame::parse(&buf).unwrap();
        assert_eq!(frame.tcp(), None);
    }

    #[test]
    fn ihl_below_five_is_malformed() {
        let mut buf = eth_header(ETH_TYPE_IP);
        buf.extend(ip_header(4, IP_PROTO_TCP));
        assert!(matches!(
            EthFrame::parse(&buf),
            Err(OfpError::UnexpectedValue { field: "version_ihl", .. })
        ));
    }

    #[test]
    fn truncated_tcp_ports_fail() {
        let mut buf = eth_header(ETH_TYPE_IP);
        buf.extend(ip_header(5, IP_PROTO_TCP));
        buf.extend_from_slice(&[0x00, 0x50]);
        assert!(matches!(
            EthFrame::parse(&buf),
            Err(OfpError::Truncated { message: "TCP header", .. })
        ));
    }

    #[test]
    fn mac_conversions_agree() {
        assert_eq!(mac_of_bytes(SRC), 0xaabbccddeeff);
        assert_eq!(bytes_of_mac(0xaabbccddeeff), SRC);
        assert_eq!(Mac(&DST).to_string(), "11:22:33:44:55:66");
    }
}
