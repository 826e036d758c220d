use std::fmt;
use std::io::{self, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bits::{pack_bits, test_bit};
use crate::ofp_message::OfpError;
use crate::packet::{EthFrame, MacAddr};

pub mod message;

/// Byte-size of the fixed part of a features reply, before the port list.
pub const SWITCH_FEATURES_LENGTH: usize = 24;
/// Byte-size of one `ofp_phy_port` record.
pub const PHY_PORT_LENGTH: usize = 48;
/// Byte-size of an `ofp_match`.
pub const MATCH_LENGTH: usize = 40;
/// Byte-size of a flow mod body before its action list (match included).
pub const FLOW_MOD_LENGTH: usize = MATCH_LENGTH + 24;
const FLOW_REMOVED_LENGTH: usize = MATCH_LENGTH + 40;
const PACKET_IN_LENGTH: usize = 10;
const PACKET_OUT_LENGTH: usize = 8;
const PORT_STATUS_LENGTH: usize = 8 + PHY_PORT_LENGTH;
const PORT_MOD_LENGTH: usize = 24;
const ERROR_LENGTH: usize = 4;
const SWITCH_CONFIG_LENGTH: usize = 4;
const STATS_LENGTH: usize = 4;
const VENDOR_LENGTH: usize = 4;
const ACTION_HEADER_LENGTH: usize = 4;
const MAX_PORT_NAME_LENGTH: usize = 16;

/// Default number of bytes of a new flow the switch sends to the controller.
pub const DEFAULT_MISS_SEND_LEN: u16 = 128;

/// OpenFlow 1.0 message type codes, used by headers to identify meaning of the rest of a message.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Vendor,
    FeaturesReq,
    FeaturesResp,
    GetConfigReq,
    GetConfigResp,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    PortMod,
    StatsReq,
    StatsResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
}

impl MsgCode {
    pub fn from_u8(typ: u8) -> Option<MsgCode> {
        let code = match typ {
            0 => MsgCode::Hello,
            1 => MsgCode::Error,
            2 => MsgCode::EchoReq,
            3 => MsgCode::EchoResp,
            4 => MsgCode::Vendor,
            5 => MsgCode::FeaturesReq,
            6 => MsgCode::FeaturesResp,
            7 => MsgCode::GetConfigReq,
            8 => MsgCode::GetConfigResp,
            9 => MsgCode::SetConfig,
            10 => MsgCode::PacketIn,
            11 => MsgCode::FlowRemoved,
            12 => MsgCode::PortStatus,
            13 => MsgCode::PacketOut,
            14 => MsgCode::FlowMod,
            15 => MsgCode::PortMod,
            16 => MsgCode::StatsReq,
            17 => MsgCode::StatsResp,
            18 => MsgCode::BarrierReq,
            19 => MsgCode::BarrierResp,
            20 => MsgCode::QueueGetConfigReq,
            21 => MsgCode::QueueGetConfigResp,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for MsgCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Common API for message types implementing OpenFlow Message Codes (see `MsgCode` enum).
pub trait MessageType: Sized {
    /// Return the byte-size of a message body, header excluded.
    fn size_of(msg: &Self) -> usize;
    /// Parse a body buffer into a message.
    fn parse(buf: &[u8]) -> Result<Self, OfpError>;
    /// Marshal a message body into `bytes`.
    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError>;
}

fn check_len(buf: &[u8], expected: usize, message: &'static str) -> Result<(), OfpError> {
    if buf.len() < expected {
        return Err(OfpError::Truncated {
            message,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn remaining(bytes: &Cursor<&[u8]>) -> usize {
    bytes.get_ref().len().saturating_sub(bytes.position() as usize)
}

fn rest(bytes: &Cursor<&[u8]>) -> Vec<u8> {
    let pos = bytes.position() as usize;
    bytes.get_ref().get(pos..).unwrap_or(&[]).to_vec()
}

fn skip(bytes: &mut Cursor<&[u8]>, count: usize) {
    let pos = bytes.position();
    bytes.set_position(pos + count as u64);
}

fn write_padding_bytes<W: Write>(bytes: &mut W, count: usize) -> io::Result<()> {
    for _ in 0..count {
        bytes.write_u8(0)?;
    }
    Ok(())
}

fn read_mac(bytes: &mut Cursor<&[u8]>) -> io::Result<MacAddr> {
    let mut arr = [0; 6];
    bytes.read_exact(&mut arr)?;
    Ok(arr)
}

/// Flow wildcard bitmap. The two network masks count the low-order address
/// bits to ignore; 32 or more ignores the whole address.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Wildcards {
    pub in_port: bool,
    pub dl_vlan: bool,
    pub dl_src: bool,
    pub dl_dst: bool,
    pub dl_type: bool,
    pub nw_proto: bool,
    pub tp_src: bool,
    pub tp_dst: bool,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub dl_vlan_pcp: bool,
    pub nw_tos: bool,
}

impl Wildcards {
    /// Bitmap wildcarding every field.
    pub const ALL: u32 = (1 << 22) - 1;

    const NW_SRC_SHIFT: u32 = 8;
    const NW_DST_SHIFT: u32 = 14;
    const NW_MASK_BITS: u32 = 0x3f;

    fn set_nw_mask(f: u32, offset: u32, v: u32) -> u32 {
        f | ((Self::NW_MASK_BITS & v) << offset)
    }

    fn get_nw_mask(f: u32, offset: u32) -> u32 {
        (f >> offset) & Self::NW_MASK_BITS
    }

    pub fn to_bits(&self) -> u32 {
        let ret = pack_bits(&[
            self.in_port,
            self.dl_vlan,
            self.dl_src,
            self.dl_dst,
            self.dl_type,
            self.nw_proto,
            self.tp_src,
            self.tp_dst,
        ]);
        let ret = Self::set_nw_mask(ret, Self::NW_SRC_SHIFT, self.nw_src);
        let ret = Self::set_nw_mask(ret, Self::NW_DST_SHIFT, self.nw_dst);
        ret | (self.dl_vlan_pcp as u32) << 20 | (self.nw_tos as u32) << 21
    }

    pub fn from_bits(bits: u32) -> Wildcards {
        Wildcards {
            in_port: test_bit(0, bits),
            dl_vlan: test_bit(1, bits),
            dl_src: test_bit(2, bits),
            dl_dst: test_bit(3, bits),
            dl_type: test_bit(4, bits),
            nw_proto: test_bit(5, bits),
            tp_src: test_bit(6, bits),
            tp_dst: test_bit(7, bits),
            nw_src: Self::get_nw_mask(bits, Self::NW_SRC_SHIFT),
            nw_dst: Self::get_nw_mask(bits, Self::NW_DST_SHIFT),
            dl_vlan_pcp: test_bit(20, bits),
            nw_tos: test_bit(21, bits),
        }
    }
}

/// A value with an optional count of wildcarded low-order bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Mask<T> {
    pub value: T,
    pub mask: Option<T>,
}

/// Fields to match against flows. `None` wildcards the field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern {
    pub dl_src: Option<MacAddr>,
    pub dl_dst: Option<MacAddr>,
    pub dl_typ: Option<u16>,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pcp: Option<u8>,
    pub nw_src: Option<Mask<u32>>,
    pub nw_dst: Option<Mask<u32>>,
    pub nw_proto: Option<u8>,
    pub nw_tos: Option<u8>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
    pub in_port: Option<u16>,
}

impl Pattern {
    /// A pattern matching every packet.
    pub fn match_all() -> Pattern {
        Pattern::default()
    }

    fn nw_wildcard(m: &Option<Mask<u32>>) -> u32 {
        match *m {
            None => Wildcards::NW_MASK_BITS,
            Some(Mask { mask, .. }) => mask.map_or(0, |c| c.min(Wildcards::NW_MASK_BITS)),
        }
    }

    fn nw_of_wildcard(value: u32, count: u32) -> Option<Mask<u32>> {
        match count {
            c if c >= 32 => None,
            0 => Some(Mask { value, mask: None }),
            c => Some(Mask {
                value,
                mask: Some(c),
            }),
        }
    }

    pub fn wildcards(&self) -> Wildcards {
        Wildcards {
            in_port: self.in_port.is_none(),
            dl_vlan: self.dl_vlan.is_none(),
            dl_src: self.dl_src.is_none(),
            dl_dst: self.dl_dst.is_none(),
            dl_type: self.dl_typ.is_none(),
            nw_proto: self.nw_proto.is_none(),
            tp_src: self.tp_src.is_none(),
            tp_dst: self.tp_dst.is_none(),
            nw_src: Self::nw_wildcard(&self.nw_src),
            nw_dst: Self::nw_wildcard(&self.nw_dst),
            dl_vlan_pcp: self.dl_vlan_pcp.is_none(),
            nw_tos: self.nw_tos.is_none(),
        }
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<Pattern, OfpError> {
        let w = Wildcards::from_bits(bytes.read_u32::<BigEndian>()?);
        let in_port = bytes.read_u16::<BigEndian>()?;
        let dl_src = read_mac(bytes)?;
        let dl_dst = read_mac(bytes)?;
        let dl_vlan = bytes.read_u16::<BigEndian>()?;
        let dl_vlan_pcp = bytes.read_u8()?;
        skip(bytes, 1);
        let dl_typ = bytes.read_u16::<BigEndian>()?;
        let nw_tos = bytes.read_u8()?;
        let nw_proto = bytes.read_u8()?;
        skip(bytes, 2);
        let nw_src = bytes.read_u32::<BigEndian>()?;
        let nw_dst = bytes.read_u32::<BigEndian>()?;
        let tp_src = bytes.read_u16::<BigEndian>()?;
        let tp_dst = bytes.read_u16::<BigEndian>()?;

        Ok(Pattern {
            dl_src: Some(dl_src).filter(|_| !w.dl_src),
            dl_dst: Some(dl_dst).filter(|_| !w.dl_dst),
            dl_typ: Some(dl_typ).filter(|_| !w.dl_type),
            dl_vlan: Some(dl_vlan).filter(|_| !w.dl_vlan),
            dl_vlan_pcp: Some(dl_vlan_pcp).filter(|_| !w.dl_vlan_pcp),
            nw_src: Self::nw_of_wildcard(nw_src, w.nw_src),
            nw_dst: Self::nw_of_wildcard(nw_dst, w.nw_dst),
            nw_proto: Some(nw_proto).filter(|_| !w.nw_proto),
            nw_tos: Some(nw_tos).filter(|_| !w.nw_tos),
            tp_src: Some(tp_src).filter(|_| !w.tp_src),
            tp_dst: Some(tp_dst).filter(|_| !w.tp_dst),
            in_port: Some(in_port).filter(|_| !w.in_port),
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> io::Result<()> {
        bytes.write_u32::<BigEndian>(self.wildcards().to_bits())?;
        bytes.write_u16::<BigEndian>(self.in_port.unwrap_or(0))?;
        bytes.write_all(&self.dl_src.unwrap_or_default())?;
        bytes.write_all(&self.dl_dst.unwrap_or_default())?;
        bytes.write_u16::<BigEndian>(self.dl_vlan.unwrap_or(0))?;
        bytes.write_u8(self.dl_vlan_pcp.unwrap_or(0))?;
        write_padding_bytes(bytes, 1)?;
        bytes.write_u16::<BigEndian>(self.dl_typ.unwrap_or(0))?;
        bytes.write_u8(self.nw_tos.unwrap_or(0))?;
        bytes.write_u8(self.nw_proto.unwrap_or(0))?;
        write_padding_bytes(bytes, 2)?;
        bytes.write_u32::<BigEndian>(self.nw_src.map_or(0, |m| m.value))?;
        bytes.write_u32::<BigEndian>(self.nw_dst.map_or(0, |m| m.value))?;
        bytes.write_u16::<BigEndian>(self.tp_src.unwrap_or(0))?;
        bytes.write_u16::<BigEndian>(self.tp_dst.unwrap_or(0))
    }
}

/// Port behavior.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PseudoPort {
    PhysicalPort(u16),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    /// Send to the controller, at most `max_len` bytes of the packet.
    Controller(u16),
    Local,
}

#[repr(u16)]
enum OfpPort {
    OFPPMax = 0xff00,
    OFPPInPort = 0xfff8,
    OFPPTable = 0xfff9,
    OFPPNormal = 0xfffa,
    OFPPFlood = 0xfffb,
    OFPPAll = 0xfffc,
    OFPPController = 0xfffd,
    OFPPLocal = 0xfffe,
    OFPPNone = 0xffff,
}

impl PseudoPort {
    fn of_int(p: u16) -> Result<Option<PseudoPort>, OfpError> {
        if (OfpPort::OFPPNone as u16) == p {
            Ok(None)
        } else {
            PseudoPort::make(p, 0).map(Some)
        }
    }

    fn make(p: u16, len: u16) -> Result<PseudoPort, OfpError> {
        let port = match p {
            p if p == (OfpPort::OFPPInPort as u16) => PseudoPort::InPort,
            p if p == (OfpPort::OFPPTable as u16) => PseudoPort::Table,
            p if p == (OfpPort::OFPPNormal as u16) => PseudoPort::Normal,
            p if p == (OfpPort::OFPPFlood as u16) => PseudoPort::Flood,
            p if p == (OfpPort::OFPPAll as u16) => PseudoPort::AllPorts,
            p if p == (OfpPort::OFPPController as u16) => PseudoPort::Controller(len),
            p if p == (OfpPort::OFPPLocal as u16) => PseudoPort::Local,
            p if p <= (OfpPort::OFPPMax as u16) => PseudoPort::PhysicalPort(p),
            p => return Err(OfpError::unexpected(format!("{:#x}", p), "port", "pseudo port")),
        };
        Ok(port)
    }

    fn to_int(self) -> u16 {
        match self {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u16,
            PseudoPort::Table => OfpPort::OFPPTable as u16,
            PseudoPort::Normal => OfpPort::OFPPNormal as u16,
            PseudoPort::Flood => OfpPort::OFPPFlood as u16,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u16,
            PseudoPort::Controller(_) => OfpPort::OFPPController as u16,
            PseudoPort::Local => OfpPort::OFPPLocal as u16,
        }
    }

    fn marshal<W: Write>(self, bytes: &mut W) -> io::Result<()> {
        bytes.write_u16::<BigEndian>(self.to_int())
    }

    fn marshal_optional<W: Write>(pp: Option<PseudoPort>, bytes: &mut W) -> io::Result<()> {
        match pp {
            None => bytes.write_u16::<BigEndian>(OfpPort::OFPPNone as u16),
            Some(p) => p.marshal(bytes),
        }
    }
}

/// Actions associated with flows and packets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Output(PseudoPort),
    SetVlanVid(u16),
    SetVlanPcp(u8),
    StripVlan,
    SetDlSrc(MacAddr),
    SetDlDst(MacAddr),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    /// Output to queue `queue_id` of a port.
    Enqueue(PseudoPort, u32),
    Vendor(u32),
}

#[repr(u16)]
#[derive(Copy, Clone)]
enum OfpActionType {
    OFPATOutput = 0,
    OFPATSetVlanVId = 1,
    OFPATSetVlanPCP = 2,
    OFPATStripVlan = 3,
    OFPATSetDlSrc = 4,
    OFPATSetDlDst = 5,
    OFPATSetNwSrc = 6,
    OFPATSetNwDst = 7,
    OFPATSetNwTos = 8,
    OFPATSetTpSrc = 9,
    OFPATSetTpDst = 10,
    OFPATEnqueue = 11,
    OFPATVendor = 0xffff,
}

impl OfpActionType {
    fn from_u16(t: u16) -> Option<OfpActionType> {
        let typ = match t {
            0 => OfpActionType::OFPATOutput,
            1 => OfpActionType::OFPATSetVlanVId,
            2 => OfpActionType::OFPATSetVlanPCP,
            3 => OfpActionType::OFPATStripVlan,
            4 => OfpActionType::OFPATSetDlSrc,
            5 => OfpActionType::OFPATSetDlDst,
            6 => OfpActionType::OFPATSetNwSrc,
            7 => OfpActionType::OFPATSetNwDst,
            8 => OfpActionType::OFPATSetNwTos,
            9 => OfpActionType::OFPATSetTpSrc,
            10 => OfpActionType::OFPATSetTpDst,
            11 => OfpActionType::OFPATEnqueue,
            0xffff => OfpActionType::OFPATVendor,
            _ => return None,
        };
        Some(typ)
    }

    /// Declared wire length of an action of this type, tag and length included.
    fn len(self) -> u16 {
        match self {
            OfpActionType::OFPATSetDlSrc
            | OfpActionType::OFPATSetDlDst
            | OfpActionType::OFPATEnqueue => 16,
            _ => 8,
        }
    }
}

/// Wire length of `a`, fixed per variant.
pub fn action_len(a: &Action) -> u16 {
    a.type_code().len()
}

impl Action {
    fn type_code(&self) -> OfpActionType {
        match *self {
            Action::Output(_) => OfpActionType::OFPATOutput,
            Action::SetVlanVid(_) => OfpActionType::OFPATSetVlanVId,
            Action::SetVlanPcp(_) => OfpActionType::OFPATSetVlanPCP,
            Action::StripVlan => OfpActionType::OFPATStripVlan,
            Action::SetDlSrc(_) => OfpActionType::OFPATSetDlSrc,
            Action::SetDlDst(_) => OfpActionType::OFPATSetDlDst,
            Action::SetNwSrc(_) => OfpActionType::OFPATSetNwSrc,
            Action::SetNwDst(_) => OfpActionType::OFPATSetNwDst,
            Action::SetNwTos(_) => OfpActionType::OFPATSetNwTos,
            Action::SetTpSrc(_) => OfpActionType::OFPATSetTpSrc,
            Action::SetTpDst(_) => OfpActionType::OFPATSetTpDst,
            Action::Enqueue(_, _) => OfpActionType::OFPATEnqueue,
            Action::Vendor(_) => OfpActionType::OFPATVendor,
        }
    }

    pub fn size_of(&self) -> usize {
        action_len(self) as usize
    }

    pub fn size_of_sequence(actions: &[Action]) -> usize {
        actions.iter().map(Action::size_of).sum()
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<Action, OfpError> {
        let avail = remaining(bytes);
        if avail < ACTION_HEADER_LENGTH {
            return Err(OfpError::Truncated {
                message: "action header",
                expected: ACTION_HEADER_LENGTH,
                actual: avail,
            });
        }
        let code = bytes.read_u16::<BigEndian>()?;
        let len = bytes.read_u16::<BigEndian>()?;
        let typ = OfpActionType::from_u16(code)
            .ok_or_else(|| OfpError::unexpected(code, "type", "action"))?;
        if len != typ.len() {
            return Err(OfpError::unexpected(len, "len", "action"));
        }
        let avail = remaining(bytes);
        let body = len as usize - ACTION_HEADER_LENGTH;
        if avail < body {
            return Err(OfpError::Truncated {
                message: "action",
                expected: body,
                actual: avail,
            });
        }
        let action = match typ {
            OfpActionType::OFPATOutput => {
                let port_code = bytes.read_u16::<BigEndian>()?;
                let max_len = bytes.read_u16::<BigEndian>()?;
                Action::Output(PseudoPort::make(port_code, max_len)?)
            }
            OfpActionType::OFPATSetVlanVId => {
                let vid = bytes.read_u16::<BigEndian>()?;
                skip(bytes, 2);
                Action::SetVlanVid(vid)
            }
            OfpActionType::OFPATSetVlanPCP => {
                let pcp = bytes.read_u8()?;
                skip(bytes, 3);
                Action::SetVlanPcp(pcp)
            }
            OfpActionType::OFPATStripVlan => {
                skip(bytes, 4);
                Action::StripVlan
            }
            OfpActionType::OFPATSetDlSrc | OfpActionType::OFPATSetDlDst => {
                let mac = read_mac(bytes)?;
                skip(bytes, 6);
                match typ {
                    OfpActionType::OFPATSetDlSrc => Action::SetDlSrc(mac),
                    _ => Action::SetDlDst(mac),
                }
            }
            OfpActionType::OFPATSetNwSrc => Action::SetNwSrc(bytes.read_u32::<BigEndian>()?),
            OfpActionType::OFPATSetNwDst => Action::SetNwDst(bytes.read_u32::<BigEndian>()?),
            OfpActionType::OFPATSetNwTos => {
                let tos = bytes.read_u8()?;
                skip(bytes, 3);
                Action::SetNwTos(tos)
            }
            OfpActionType::OFPATSetTpSrc | OfpActionType::OFPATSetTpDst => {
                let port = bytes.read_u16::<BigEndian>()?;
                skip(bytes, 2);
                match typ {
                    OfpActionType::OFPATSetTpSrc => Action::SetTpSrc(port),
                    _ => Action::SetTpDst(port),
                }
            }
            OfpActionType::OFPATEnqueue => {
                let port = PseudoPort::make(bytes.read_u16::<BigEndian>()?, 0)?;
                skip(bytes, 6);
                let queue_id = bytes.read_u32::<BigEndian>()?;
                Action::Enqueue(port, queue_id)
            }
            OfpActionType::OFPATVendor => Action::Vendor(bytes.read_u32::<BigEndian>()?),
        };
        Ok(action)
    }

    /// Parse a whole buffer as a sequence of actions.
    pub fn parse_sequence(buf: &[u8]) -> Result<Vec<Action>, OfpError> {
        let mut bytes = Cursor::new(buf);
        let mut actions = vec![];
        while remaining(&bytes) > 0 {
            actions.push(Action::parse(&mut bytes)?);
        }
        Ok(actions)
    }

    pub fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u16::<BigEndian>(self.type_code() as u16)?;
        bytes.write_u16::<BigEndian>(action_len(self))?;
        match *self {
            Action::Output(pp) => {
                pp.marshal(bytes)?;
                bytes.write_u16::<BigEndian>(match pp {
                    PseudoPort::Controller(w) => w,
                    _ => 0,
                })?;
            }
            Action::SetVlanVid(vid) => {
                bytes.write_u16::<BigEndian>(vid)?;
                write_padding_bytes(bytes, 2)?;
            }
            Action::SetVlanPcp(pcp) => {
                bytes.write_u8(pcp)?;
                write_padding_bytes(bytes, 3)?;
            }
            Action::StripVlan => write_padding_bytes(bytes, 4)?,
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                bytes.write_all(&mac)?;
                write_padding_bytes(bytes, 6)?;
            }
            Action::SetNwSrc(addr) | Action::SetNwDst(addr) => {
                bytes.write_u32::<BigEndian>(addr)?;
            }
            Action::SetNwTos(tos) => {
                bytes.write_u8(tos)?;
                write_padding_bytes(bytes, 3)?;
            }
            Action::SetTpSrc(port) | Action::SetTpDst(port) => {
                bytes.write_u16::<BigEndian>(port)?;
                write_padding_bytes(bytes, 2)?;
            }
            Action::Enqueue(pp, queue_id) => {
                pp.marshal(bytes)?;
                write_padding_bytes(bytes, 6)?;
                bytes.write_u32::<BigEndian>(queue_id)?;
            }
            Action::Vendor(vendor) => bytes.write_u32::<BigEndian>(vendor)?,
        }
        Ok(())
    }

    fn marshal_sequence<W: Write>(actions: &[Action], bytes: &mut W) -> Result<(), OfpError> {
        for act in actions {
            act.marshal(bytes)?;
        }
        Ok(())
    }
}

/// How long before a flow entry expires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    fn to_int(self) -> u16 {
        match self {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// Capabilities supported by the datapath.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
    pub stp: bool,
    pub ip_reasm: bool,
    pub queue_stats: bool,
    pub arp_match_ip: bool,
}

impl Capabilities {
    fn of_int(d: u32) -> Capabilities {
        Capabilities {
            flow_stats: test_bit(0, d),
            table_stats: test_bit(1, d),
            port_stats: test_bit(2, d),
            stp: test_bit(3, d),
            ip_reasm: test_bit(5, d),
            queue_stats: test_bit(6, d),
            arp_match_ip: test_bit(7, d),
        }
    }

    fn to_int(&self) -> u32 {
        // bit 4 is reserved
        pack_bits(&[
            self.flow_stats,
            self.table_stats,
            self.port_stats,
            self.stp,
            false,
            self.ip_reasm,
            self.queue_stats,
            self.arp_match_ip,
        ])
    }
}

/// Actions supported by the datapath.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SupportedActions {
    pub output: bool,
    pub set_vlan_id: bool,
    pub set_vlan_pcp: bool,
    pub strip_vlan: bool,
    pub set_dl_src: bool,
    pub set_dl_dst: bool,
    pub set_nw_src: bool,
    pub set_nw_dst: bool,
    pub set_nw_tos: bool,
    pub set_tp_src: bool,
    pub set_tp_dst: bool,
    pub enqueue: bool,
    pub vendor: bool,
}

impl SupportedActions {
    fn of_int(d: u32) -> SupportedActions {
        SupportedActions {
            output: test_bit(0, d),
            set_vlan_id: test_bit(1, d),
            set_vlan_pcp: test_bit(2, d),
            strip_vlan: test_bit(3, d),
            set_dl_src: test_bit(4, d),
            set_dl_dst: test_bit(5, d),
            set_nw_src: test_bit(6, d),
            set_nw_dst: test_bit(7, d),
            set_nw_tos: test_bit(8, d),
            set_tp_src: test_bit(9, d),
            set_tp_dst: test_bit(10, d),
            enqueue: test_bit(11, d),
            vendor: test_bit(12, d),
        }
    }

    fn to_int(&self) -> u32 {
        pack_bits(&[
            self.output,
            self.set_vlan_id,
            self.set_vlan_pcp,
            self.strip_vlan,
            self.set_dl_src,
            self.set_dl_dst,
            self.set_nw_src,
            self.set_nw_dst,
            self.set_nw_tos,
            self.set_tp_src,
            self.set_tp_dst,
            self.enqueue,
            self.vendor,
        ])
    }
}

/// Switch features.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub supported_capabilities: Capabilities,
    pub supported_actions: SupportedActions,
    pub ports: Vec<PortDesc>,
}

impl MessageType for SwitchFeatures {
    fn size_of(sf: &SwitchFeatures) -> usize {
        SWITCH_FEATURES_LENGTH + sf.ports.len() * PHY_PORT_LENGTH
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures, OfpError> {
        check_len(buf, SWITCH_FEATURES_LENGTH, "features reply")?;
        let ports_len = buf.len() - SWITCH_FEATURES_LENGTH;
        if ports_len % PHY_PORT_LENGTH != 0 {
            return Err(OfpError::Misaligned {
                message: "features reply",
                len: ports_len,
                unit: PHY_PORT_LENGTH,
            });
        }
        let mut bytes = Cursor::new(buf);
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        skip(&mut bytes, 3);
        let supported_capabilities = Capabilities::of_int(bytes.read_u32::<BigEndian>()?);
        let supported_actions = SupportedActions::of_int(bytes.read_u32::<BigEndian>()?);
        let ports = (0..ports_len / PHY_PORT_LENGTH)
            .map(|_| PortDesc::parse(&mut bytes))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            supported_capabilities,
            supported_actions,
            ports,
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u64::<BigEndian>(self.datapath_id)?;
        bytes.write_u32::<BigEndian>(self.num_buffers)?;
        bytes.write_u8(self.num_tables)?;
        write_padding_bytes(bytes, 3)?;
        bytes.write_u32::<BigEndian>(self.supported_capabilities.to_int())?;
        bytes.write_u32::<BigEndian>(self.supported_actions.to_int())?;
        for port in &self.ports {
            port.marshal(bytes)?;
        }
        Ok(())
    }
}

/// Type of modification to perform on a flow table.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    fn from_u16(cmd: u16) -> Result<FlowModCmd, OfpError> {
        match cmd {
            0 => Ok(FlowModCmd::AddFlow),
            1 => Ok(FlowModCmd::ModFlow),
            2 => Ok(FlowModCmd::ModStrictFlow),
            3 => Ok(FlowModCmd::DeleteFlow),
            4 => Ok(FlowModCmd::DeleteStrictFlow),
            c => Err(OfpError::unexpected(c, "command", "flow mod")),
        }
    }
}

/// Represents modifications to a flow table from the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub pattern: Pattern,
    pub priority: u16,
    pub actions: Vec<Action>,
    pub cookie: u64,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub check_overlap: bool,
    pub emergency: bool,
}

impl FlowMod {
    fn flags_to_int(&self) -> u16 {
        pack_bits(&[self.notify_when_removed, self.check_overlap, self.emergency]) as u16
    }
}

fn buffer_id_of_int(id: u32) -> Option<u32> {
    match id {
        0xffff_ffff => None,
        n => Some(n),
    }
}

fn buffer_id_to_int(id: Option<u32>) -> u32 {
    id.unwrap_or(0xffff_ffff)
}

impl MessageType for FlowMod {
    fn size_of(msg: &FlowMod) -> usize {
        FLOW_MOD_LENGTH + Action::size_of_sequence(&msg.actions)
    }

    fn parse(buf: &[u8]) -> Result<FlowMod, OfpError> {
        check_len(buf, FLOW_MOD_LENGTH, "flow mod")?;
        let mut bytes = Cursor::new(buf);
        let pattern = Pattern::parse(&mut bytes)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let command = FlowModCmd::from_u16(bytes.read_u16::<BigEndian>()?)?;
        let idle = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let hard = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let prio = bytes.read_u16::<BigEndian>()?;
        let buffer_id = bytes.read_u32::<BigEndian>()?;
        let out_port = PseudoPort::of_int(bytes.read_u16::<BigEndian>()?)?;
        let flags = bytes.read_u16::<BigEndian>()? as u32;
        let actions = Action::parse_sequence(&buf[FLOW_MOD_LENGTH..])?;
        Ok(FlowMod {
            command,
            pattern,
            priority: prio,
            actions,
            cookie,
            idle_timeout: idle,
            hard_timeout: hard,
            notify_when_removed: test_bit(0, flags),
            apply_to_packet: buffer_id_of_int(buffer_id),
            out_port,
            check_overlap: test_bit(1, flags),
            emergency: test_bit(2, flags),
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        if self.actions.contains(&Action::Output(PseudoPort::Table)) {
            return Err(OfpError::unexpected("OFPP_TABLE", "actions", "flow mod"));
        }
        self.pattern.marshal(bytes)?;
        bytes.write_u64::<BigEndian>(self.cookie)?;
        bytes.write_u16::<BigEndian>(self.command as u16)?;
        bytes.write_u16::<BigEndian>(self.idle_timeout.to_int())?;
        bytes.write_u16::<BigEndian>(self.hard_timeout.to_int())?;
        bytes.write_u16::<BigEndian>(self.priority)?;
        bytes.write_u32::<BigEndian>(buffer_id_to_int(self.apply_to_packet))?;
        PseudoPort::marshal_optional(self.out_port, bytes)?;
        bytes.write_u16::<BigEndian>(self.flags_to_int())?;
        Action::marshal_sequence(&self.actions, bytes)
    }
}

/// The data associated with a packet received by the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn size_of(payload: &Payload) -> usize {
        payload.bytes().len()
    }

    pub fn bytes(&self) -> &[u8] {
        match *self {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf,
        }
    }

    pub fn buffer_id(&self) -> Option<u32> {
        match *self {
            Payload::Buffered(id, _) => Some(id),
            Payload::NotBuffered(_) => None,
        }
    }

    fn of_parts(buffer_id: Option<u32>, data: Vec<u8>) -> Payload {
        match buffer_id {
            None => Payload::NotBuffered(data),
            Some(n) => Payload::Buffered(n, data),
        }
    }
}

/// The reason a packet arrives at the controller.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch,
    ExplicitSend,
}

impl PacketInReason {
    fn from_u8(r: u8) -> Result<PacketInReason, OfpError> {
        match r {
            0 => Ok(PacketInReason::NoMatch),
            1 => Ok(PacketInReason::ExplicitSend),
            r => Err(OfpError::unexpected(r, "reason", "packet in")),
        }
    }
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub port: u16,
    pub reason: PacketInReason,
    /// Headers decoded from the payload bytes.
    pub frame: EthFrame,
}

impl PacketIn {
    /// Build a packet-in, decoding the frame headers from the payload.
    pub fn new(
        input_payload: Payload,
        total_len: u16,
        port: u16,
        reason: PacketInReason,
    ) -> Result<PacketIn, OfpError> {
        let frame = EthFrame::parse(input_payload.bytes())?;
        Ok(PacketIn {
            input_payload,
            total_len,
            port,
            reason,
            frame,
        })
    }

    pub fn not_matched(&self) -> bool {
        self.reason == PacketInReason::NoMatch
    }
}

impl MessageType for PacketIn {
    fn size_of(pi: &PacketIn) -> usize {
        PACKET_IN_LENGTH + Payload::size_of(&pi.input_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketIn, OfpError> {
        check_len(buf, PACKET_IN_LENGTH, "packet in")?;
        let mut bytes = Cursor::new(buf);
        let buf_id = buffer_id_of_int(bytes.read_u32::<BigEndian>()?);
        let total_len = bytes.read_u16::<BigEndian>()?;
        let port = bytes.read_u16::<BigEndian>()?;
        let reason = PacketInReason::from_u8(bytes.read_u8()?)?;
        skip(&mut bytes, 1);
        let payload = Payload::of_parts(buf_id, rest(&bytes));
        PacketIn::new(payload, total_len, port, reason)
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u32::<BigEndian>(buffer_id_to_int(self.input_payload.buffer_id()))?;
        bytes.write_u16::<BigEndian>(self.total_len)?;
        bytes.write_u16::<BigEndian>(self.port)?;
        bytes.write_u8(self.reason as u8)?;
        write_padding_bytes(bytes, 1)?;
        bytes.write_all(self.input_payload.bytes())?;
        Ok(())
    }
}

/// Represents packets sent from the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketOut {
    pub output_payload: Payload,
    pub port_id: Option<u16>,
    pub apply_actions: Vec<Action>,
}

impl MessageType for PacketOut {
    fn size_of(po: &PacketOut) -> usize {
        PACKET_OUT_LENGTH
            + Action::size_of_sequence(&po.apply_actions)
            + Payload::size_of(&po.output_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketOut, OfpError> {
        check_len(buf, PACKET_OUT_LENGTH, "packet out")?;
        let mut bytes = Cursor::new(buf);
        let buf_id = buffer_id_of_int(bytes.read_u32::<BigEndian>()?);
        let in_port = bytes.read_u16::<BigEndian>()?;
        let actions_len = bytes.read_u16::<BigEndian>()? as usize;
        check_len(buf, PACKET_OUT_LENGTH + actions_len, "packet out actions")?;
        let actions_end = PACKET_OUT_LENGTH + actions_len;
        let actions = Action::parse_sequence(&buf[PACKET_OUT_LENGTH..actions_end])?;
        Ok(PacketOut {
            output_payload: Payload::of_parts(buf_id, buf[actions_end..].to_vec()),
            port_id: if in_port == OfpPort::OFPPNone as u16 {
                None
            } else {
                Some(in_port)
            },
            apply_actions: actions,
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        let actions_len = Action::size_of_sequence(&self.apply_actions);
        if actions_len > u16::MAX as usize {
            return Err(OfpError::TooLong {
                message: "packet out actions",
                length: actions_len,
            });
        }
        bytes.write_u32::<BigEndian>(buffer_id_to_int(self.output_payload.buffer_id()))?;
        bytes.write_u16::<BigEndian>(self.port_id.unwrap_or(OfpPort::OFPPNone as u16))?;
        bytes.write_u16::<BigEndian>(actions_len as u16)?;
        Action::marshal_sequence(&self.apply_actions, bytes)?;
        bytes.write_all(self.output_payload.bytes())?;
        Ok(())
    }
}

/// Why a flow was removed.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
}

impl FlowRemovedReason {
    fn from_u8(r: u8) -> Result<FlowRemovedReason, OfpError> {
        match r {
            0 => Ok(FlowRemovedReason::IdleTimeout),
            1 => Ok(FlowRemovedReason::HardTimeout),
            2 => Ok(FlowRemovedReason::Delete),
            r => Err(OfpError::unexpected(r, "reason", "flow removed")),
        }
    }
}

/// Flow removed (datapath -> controller).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRemoved {
    pub pattern: Pattern,
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: Timeout,
    pub packet_count: u64,
    pub byte_count: u64,
}

impl MessageType for FlowRemoved {
    fn size_of(_: &FlowRemoved) -> usize {
        FLOW_REMOVED_LENGTH
    }

    fn parse(buf: &[u8]) -> Result<FlowRemoved, OfpError> {
        check_len(buf, FLOW_REMOVED_LENGTH, "flow removed")?;
        let mut bytes = Cursor::new(buf);
        let pattern = Pattern::parse(&mut bytes)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let priority = bytes.read_u16::<BigEndian>()?;
        let reason = FlowRemovedReason::from_u8(bytes.read_u8()?)?;
        skip(&mut bytes, 1);
        let duration_sec = bytes.read_u32::<BigEndian>()?;
        let duration_nsec = bytes.read_u32::<BigEndian>()?;
        let idle_timeout = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        skip(&mut bytes, 2);
        let packet_count = bytes.read_u64::<BigEndian>()?;
        let byte_count = bytes.read_u64::<BigEndian>()?;
        Ok(FlowRemoved {
            pattern,
            cookie,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count,
            byte_count,
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        self.pattern.marshal(bytes)?;
        bytes.write_u64::<BigEndian>(self.cookie)?;
        bytes.write_u16::<BigEndian>(self.priority)?;
        bytes.write_u8(self.reason as u8)?;
        write_padding_bytes(bytes, 1)?;
        bytes.write_u32::<BigEndian>(self.duration_sec)?;
        bytes.write_u32::<BigEndian>(self.duration_nsec)?;
        bytes.write_u16::<BigEndian>(self.idle_timeout.to_int())?;
        write_padding_bytes(bytes, 2)?;
        bytes.write_u64::<BigEndian>(self.packet_count)?;
        bytes.write_u64::<BigEndian>(self.byte_count)?;
        Ok(())
    }
}

/// STP state of a port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StpState {
    Listen,
    Learn,
    Forward,
    Block,
}

/// Current state of a physical port. Not configurable by the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortState {
    pub down: bool,
    pub stp_state: StpState,
}

impl PortState {
    fn of_int(d: u32) -> PortState {
        PortState {
            down: test_bit(0, d),
            stp_state: match (d >> 8) & 3 {
                0 => StpState::Listen,
                1 => StpState::Learn,
                2 => StpState::Forward,
                _ => StpState::Block,
            },
        }
    }

    fn to_int(&self) -> u32 {
        (self.down as u32) | (self.stp_state as u32) << 8
    }
}

/// Features of physical ports available in a datapath.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortFeatures {
    pub f_10mbhd: bool,
    pub f_10mbfd: bool,
    pub f_100mbhd: bool,
    pub f_100mbfd: bool,
    pub f_1gbhd: bool,
    pub f_1gbfd: bool,
    pub f_10gbfd: bool,
    pub copper: bool,
    pub fiber: bool,
    pub autoneg: bool,
    pub pause: bool,
    pub pause_asym: bool,
}

impl PortFeatures {
    fn of_int(d: u32) -> PortFeatures {
        PortFeatures {
            f_10mbhd: test_bit(0, d),
            f_10mbfd: test_bit(1, d),
            f_100mbhd: test_bit(2, d),
            f_100mbfd: test_bit(3, d),
            f_1gbhd: test_bit(4, d),
            f_1gbfd: test_bit(5, d),
            f_10gbfd: test_bit(6, d),
            copper: test_bit(7, d),
            fiber: test_bit(8, d),
            autoneg: test_bit(9, d),
            pause: test_bit(10, d),
            pause_asym: test_bit(11, d),
        }
    }

    fn to_int(&self) -> u32 {
        pack_bits(&[
            self.f_10mbhd,
            self.f_10mbfd,
            self.f_100mbhd,
            self.f_100mbfd,
            self.f_1gbhd,
            self.f_1gbfd,
            self.f_10gbfd,
            self.copper,
            self.fiber,
            self.autoneg,
            self.pause,
            self.pause_asym,
        ])
    }
}

/// Flags to indicate behavior of the physical port.
///
/// These flags are used both to describe the current configuration of a physical port,
/// and to configure a port's behavior.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortConfig {
    pub down: bool,
    pub no_stp: bool,
    pub no_recv: bool,
    pub no_recv_stp: bool,
    pub no_flood: bool,
    pub no_fwd: bool,
    pub no_packet_in: bool,
}

impl PortConfig {
    fn of_int(d: u32) -> PortConfig {
        PortConfig {
            down: test_bit(0, d),
            no_stp: test_bit(1, d),
            no_recv: test_bit(2, d),
            no_recv_stp: test_bit(3, d),
            no_flood: test_bit(4, d),
            no_fwd: test_bit(5, d),
            no_packet_in: test_bit(6, d),
        }
    }

    fn to_int(&self) -> u32 {
        pack_bits(&[
            self.down,
            self.no_stp,
            self.no_recv,
            self.no_recv_stp,
            self.no_flood,
            self.no_fwd,
            self.no_packet_in,
        ])
    }
}

/// Description of a physical port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u16,
    pub hw_addr: MacAddr,
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
}

impl PortDesc {
    pub fn size_of(_: &PortDesc) -> usize {
        PHY_PORT_LENGTH
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<PortDesc, OfpError> {
        let port_no = bytes.read_u16::<BigEndian>()?;
        let hw_addr = read_mac(bytes)?;
        let name = {
            let mut arr = [0; MAX_PORT_NAME_LENGTH];
            bytes.read_exact(&mut arr)?;
            let end = arr.iter().position(|&c| c == 0).unwrap_or(arr.len());
            String::from_utf8_lossy(&arr[..end]).into_owned()
        };
        let config = PortConfig::of_int(bytes.read_u32::<BigEndian>()?);
        let state = PortState::of_int(bytes.read_u32::<BigEndian>()?);
        let curr = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let advertised = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let supported = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let peer = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        let name = self.name.as_bytes();
        if name.len() > MAX_PORT_NAME_LENGTH {
            return Err(OfpError::unexpected(&self.name, "name", "port description"));
        }
        bytes.write_u16::<BigEndian>(self.port_no)?;
        bytes.write_all(&self.hw_addr)?;
        bytes.write_all(name)?;
        write_padding_bytes(bytes, MAX_PORT_NAME_LENGTH - name.len())?;
        bytes.write_u32::<BigEndian>(self.config.to_int())?;
        bytes.write_u32::<BigEndian>(self.state.to_int())?;
        bytes.write_u32::<BigEndian>(self.curr.to_int())?;
        bytes.write_u32::<BigEndian>(self.advertised.to_int())?;
        bytes.write_u32::<BigEndian>(self.supported.to_int())?;
        bytes.write_u32::<BigEndian>(self.peer.to_int())?;
        Ok(())
    }
}

/// What changed about a physical port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
}

/// A physical port has changed in the datapath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

impl PortStatus {
    pub fn is_port_added(&self) -> bool {
        self.reason == PortReason::PortAdd
    }

    pub fn is_port_deleted(&self) -> bool {
        self.reason == PortReason::PortDelete
    }

    pub fn is_port_modified(&self) -> bool {
        self.reason == PortReason::PortModify
    }
}

impl MessageType for PortStatus {
    fn size_of(_: &PortStatus) -> usize {
        PORT_STATUS_LENGTH
    }

    fn parse(buf: &[u8]) -> Result<PortStatus, OfpError> {
        check_len(buf, PORT_STATUS_LENGTH, "port status")?;
        let mut bytes = Cursor::new(buf);
        let reason = match bytes.read_u8()? {
            0 => PortReason::PortAdd,
            1 => PortReason::PortDelete,
            2 => PortReason::PortModify,
            r => return Err(OfpError::unexpected(r, "reason", "port status")),
        };
        skip(&mut bytes, 7);
        let desc = PortDesc::parse(&mut bytes)?;
        Ok(PortStatus { reason, desc })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u8(self.reason as u8)?;
        write_padding_bytes(bytes, 7)?;
        self.desc.marshal(bytes)
    }
}

/// Modify the behavior of a physical port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortMod {
    pub port_no: u16,
    /// Must match the address the switch reported for the port.
    pub hw_addr: MacAddr,
    pub config: PortConfig,
    /// Which `config` bits to change.
    pub mask: PortConfig,
    /// Features to advertise; all unset leaves them unchanged.
    pub advertise: PortFeatures,
}

impl MessageType for PortMod {
    fn size_of(_: &PortMod) -> usize {
        PORT_MOD_LENGTH
    }

    fn parse(buf: &[u8]) -> Result<PortMod, OfpError> {
        check_len(buf, PORT_MOD_LENGTH, "port mod")?;
        let mut bytes = Cursor::new(buf);
        Ok(PortMod {
            port_no: bytes.read_u16::<BigEndian>()?,
            hw_addr: read_mac(&mut bytes)?,
            config: PortConfig::of_int(bytes.read_u32::<BigEndian>()?),
            mask: PortConfig::of_int(bytes.read_u32::<BigEndian>()?),
            advertise: PortFeatures::of_int(bytes.read_u32::<BigEndian>()?),
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u16::<BigEndian>(self.port_no)?;
        bytes.write_all(&self.hw_addr)?;
        bytes.write_u32::<BigEndian>(self.config.to_int())?;
        bytes.write_u32::<BigEndian>(self.mask.to_int())?;
        bytes.write_u32::<BigEndian>(self.advertise.to_int())?;
        write_padding_bytes(bytes, 4)?;
        Ok(())
    }
}

/// Values of the `type` field of an error message.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorType {
    HelloFailed,
    BadRequest,
    BadAction,
    FlowModFailed,
    PortModFailed,
    QueueOpFailed,
}

impl ErrorType {
    fn from_u16(t: u16) -> Result<ErrorType, OfpError> {
        match t {
            0 => Ok(ErrorType::HelloFailed),
            1 => Ok(ErrorType::BadRequest),
            2 => Ok(ErrorType::BadAction),
            3 => Ok(ErrorType::FlowModFailed),
            4 => Ok(ErrorType::PortModFailed),
            5 => Ok(ErrorType::QueueOpFailed),
            t => Err(OfpError::unexpected(t, "type", "error")),
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ErrorType::HelloFailed => "OFPET_HELLO_FAILED",
            ErrorType::BadRequest => "OFPET_BAD_REQUEST",
            ErrorType::BadAction => "OFPET_BAD_ACTION",
            ErrorType::FlowModFailed => "OFPET_FLOW_MOD_FAILED",
            ErrorType::PortModFailed => "OFPET_PORT_MOD_FAILED",
            ErrorType::QueueOpFailed => "OFPET_QUEUE_OP_FAILED",
        })
    }
}

/// Error message sent by either side. `data` is interpreted according to
/// the type and code, usually the start of the offending request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub typ: ErrorType,
    pub code: u16,
    pub data: Vec<u8>,
}

impl MessageType for Error {
    fn size_of(err: &Error) -> usize {
        ERROR_LENGTH + err.data.len()
    }

    fn parse(buf: &[u8]) -> Result<Error, OfpError> {
        check_len(buf, ERROR_LENGTH, "error")?;
        let mut bytes = Cursor::new(buf);
        let typ = ErrorType::from_u16(bytes.read_u16::<BigEndian>()?)?;
        let code = bytes.read_u16::<BigEndian>()?;
        Ok(Error {
            typ,
            code,
            data: rest(&bytes),
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u16::<BigEndian>(self.typ as u16)?;
        bytes.write_u16::<BigEndian>(self.code)?;
        bytes.write_all(&self.data)?;
        Ok(())
    }
}

/// Handling of IP fragments.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FragHandling {
    Normal,
    Drop,
    Reassemble,
}

/// Switch configuration, carried by get-config replies and set-config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: FragHandling,
    /// Max bytes of a new flow the datapath should send to the controller.
    pub miss_send_len: u16,
}

impl Default for SwitchConfig {
    fn default() -> SwitchConfig {
        SwitchConfig {
            flags: FragHandling::Normal,
            miss_send_len: DEFAULT_MISS_SEND_LEN,
        }
    }
}

impl MessageType for SwitchConfig {
    fn size_of(_: &SwitchConfig) -> usize {
        SWITCH_CONFIG_LENGTH
    }

    fn parse(buf: &[u8]) -> Result<SwitchConfig, OfpError> {
        check_len(buf, SWITCH_CONFIG_LENGTH, "switch config")?;
        let mut bytes = Cursor::new(buf);
        let flags = match bytes.read_u16::<BigEndian>()? & 3 {
            0 => FragHandling::Normal,
            1 => FragHandling::Drop,
            2 => FragHandling::Reassemble,
            f => return Err(OfpError::unexpected(f, "flags", "switch config")),
        };
        Ok(SwitchConfig {
            flags,
            miss_send_len: bytes.read_u16::<BigEndian>()?,
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u16::<BigEndian>(self.flags as u16)?;
        bytes.write_u16::<BigEndian>(self.miss_send_len)?;
        Ok(())
    }
}

/// Statistics request or reply. The body is carried opaquely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stats {
    pub typ: u16,
    pub flags: u16,
    pub body: Vec<u8>,
}

impl MessageType for Stats {
    fn size_of(s: &Stats) -> usize {
        STATS_LENGTH + s.body.len()
    }

    fn parse(buf: &[u8]) -> Result<Stats, OfpError> {
        check_len(buf, STATS_LENGTH, "stats")?;
        let mut bytes = Cursor::new(buf);
        Ok(Stats {
            typ: bytes.read_u16::<BigEndian>()?,
            flags: bytes.read_u16::<BigEndian>()?,
            body: rest(&bytes),
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u16::<BigEndian>(self.typ)?;
        bytes.write_u16::<BigEndian>(self.flags)?;
        bytes.write_all(&self.body)?;
        Ok(())
    }
}

/// Vendor extension message, identified by its vendor id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vendor {
    pub vendor: u32,
    pub data: Vec<u8>,
}

impl MessageType for Vendor {
    fn size_of(v: &Vendor) -> usize {
        VENDOR_LENGTH + v.data.len()
    }

    fn parse(buf: &[u8]) -> Result<Vendor, OfpError> {
        check_len(buf, VENDOR_LENGTH, "vendor")?;
        let mut bytes = Cursor::new(buf);
        Ok(Vendor {
            vendor: bytes.read_u32::<BigEndian>()?,
            data: rest(&bytes),
        })
    }

    fn marshal<W: Write>(&self, bytes: &mut W) -> Result<(), OfpError> {
        bytes.write_u32::<BigEndian>(self.vendor)?;
        bytes.write_all(&self.data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<T: MessageType>(m: &T) -> Vec<u8> {
        let mut bytes: Vec<u8> = vec![];
        m.marshal(&mut bytes).unwrap();
        bytes
    }

    pub(crate) fn port_desc(port_no: u16) -> PortDesc {
        PortDesc {
            port_no,
            hw_addr: [0, 0x11, 0x22, 0x33, 0x44, port_no as u8],
            name: format!("eth{}", port_no),
            config: PortConfig {
                no_recv_stp: true,
                ..PortConfig::default()
            },
            state: PortState {
                down: false,
                stp_state: StpState::Forward,
            },
            curr: PortFeatures {
                f_1gbfd: true,
                copper: true,
                ..PortFeatures::default()
            },
            advertised: PortFeatures::default(),
            supported: PortFeatures {
                autoneg: true,
                ..PortFeatures::default()
            },
            peer: PortFeatures::default(),
        }
    }

    #[test]
    fn action_lengths_are_fixed_per_variant() {
        let eights = vec![
            Action::Output(PseudoPort::Flood),
            Action::SetVlanVid(0xfff),
            Action::SetVlanPcp(7),
            Action::StripVlan,
            Action::SetNwSrc(0xffff_ffff),
            Action::SetNwDst(1),
            Action::SetNwTos(0xfc),
            Action::SetTpSrc(0),
            Action::SetTpDst(65535),
            Action::Vendor(0x2320),
        ];
        for a in &eights {
            assert_eq!(action_len(a), 8, "{:?}", a);
            assert_eq!(encode_action(a).len(), 8, "{:?}", a);
        }
        let sixteens = vec![
            Action::SetDlSrc([0xff; 6]),
            Action::SetDlDst([0; 6]),
            Action::Enqueue(PseudoPort::PhysicalPort(3), 7),
        ];
        for a in &sixteens {
            assert_eq!(action_len(a), 16, "{:?}", a);
            assert_eq!(encode_action(a).len(), 16, "{:?}", a);
        }
    }

    fn encode_action(a: &Action) -> Vec<u8> {
        let mut bytes: Vec<u8> = vec![];
        a.marshal(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn output_action_layout() {
        assert_eq!(
            encode_action(&Action::Output(PseudoPort::Flood)),
            vec![0, 0, 0, 8, 0xff, 0xfb, 0, 0]
        );
        assert_eq!(
            encode_action(&Action::Output(PseudoPort::Controller(128))),
            vec![0, 0, 0, 8, 0xff, 0xfd, 0, 128]
        );
        assert_eq!(
            encode_action(&Action::SetDlDst([1, 2, 3, 4, 5, 6])),
            vec![0, 5, 0, 16, 1, 2, 3, 4, 5, 6, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn action_sequence_decodes() {
        let actions = vec![
            Action::SetDlSrc([1, 2, 3, 4, 5, 6]),
            Action::SetTpDst(443),
            Action::Enqueue(PseudoPort::InPort, 2),
            Action::Output(PseudoPort::Controller(64)),
        ];
        let mut buf: Vec<u8> = vec![];
        Action::marshal_sequence(&actions, &mut buf).unwrap();
        assert_eq!(buf.len(), Action::size_of_sequence(&actions));
        assert_eq!(Action::parse_sequence(&buf).unwrap(), actions);
    }

    #[test]
    fn action_with_wrong_length_is_rejected() {
        let buf = vec![0, 0, 0, 16, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Action::parse_sequence(&buf),
            Err(OfpError::UnexpectedValue { field: "len", .. })
        ));
        assert!(matches!(
            Action::parse_sequence(&[0, 0, 0]),
            Err(OfpError::Truncated { .. })
        ));
    }

    #[test]
    fn match_all_wildcards_everything() {
        let mut buf: Vec<u8> = vec![];
        Pattern::match_all().marshal(&mut buf).unwrap();
        assert_eq!(buf.len(), MATCH_LENGTH);
        assert_eq!(&buf[0..4], &Wildcards::ALL.to_be_bytes());
        assert!(buf[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn pattern_layout_and_decode() {
        let pattern = Pattern {
            dl_src: Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            dl_typ: Some(0x0800),
            nw_src: Some(Mask {
                value: 0x0a000000,
                mask: Some(8),
            }),
            nw_dst: Some(Mask {
                value: 0x0a000002,
                mask: None,
            }),
            tp_dst: Some(80),
            ..Pattern::match_all()
        };
        let mut buf: Vec<u8> = vec![];
        pattern.marshal(&mut buf).unwrap();
        assert_eq!(buf.len(), MATCH_LENGTH);
        let w = Wildcards::from_bits(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]));
        assert!(!w.dl_src && w.dl_dst && !w.dl_type && !w.tp_dst && w.tp_src);
        assert_eq!(w.nw_src, 8);
        assert_eq!(w.nw_dst, 0);
        assert_eq!(&buf[6..12], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(&buf[22..24], &[0x08, 0x00]);
        assert_eq!(&buf[38..40], &[0, 80]);

        let decoded = Pattern::parse(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(decoded, pattern);
    }

    #[test]
    fn oversized_nw_mask_still_wildcards_the_address() {
        for count in [32, 63, 64, 100, u32::MAX] {
            let pattern = Pattern {
                nw_src: Some(Mask {
                    value: 0x0a000000,
                    mask: Some(count),
                }),
                ..Pattern::match_all()
            };
            let w = Wildcards::from_bits(pattern.wildcards().to_bits());
            assert_eq!(w.nw_src, Wildcards::NW_MASK_BITS, "count {}", count);
            assert_eq!(w.nw_dst, Wildcards::NW_MASK_BITS);
        }
    }

    #[test]
    fn wildcard_bits_round_trip() {
        let w = Wildcards {
            in_port: true,
            tp_dst: true,
            nw_src: 24,
            nw_dst: 63,
            nw_tos: true,
            ..Wildcards::default()
        };
        assert_eq!(w.to_bits(), 1 | 1 << 7 | 24 << 8 | 63 << 14 | 1 << 21);
        assert_eq!(Wildcards::from_bits(w.to_bits()), w);
    }

    #[test]
    fn port_desc_is_48_bytes() {
        let desc = port_desc(2);
        let mut buf: Vec<u8> = vec![];
        desc.marshal(&mut buf).unwrap();
        assert_eq!(buf.len(), PHY_PORT_LENGTH);
        assert_eq!(&buf[8..13], b"eth2\0");
        assert_eq!(PortDesc::parse(&mut Cursor::new(&buf[..])).unwrap(), desc);
    }

    #[test]
    fn features_reply_with_ports() {
        let feats = SwitchFeatures {
            datapath_id: 0x0011_2233_4455_6677,
            num_buffers: 256,
            num_tables: 2,
            supported_capabilities: Capabilities {
                flow_stats: true,
                arp_match_ip: true,
                ..Capabilities::default()
            },
            supported_actions: SupportedActions {
                output: true,
                enqueue: true,
                ..SupportedActions::default()
            },
            ports: vec![port_desc(1), port_desc(2)],
        };
        let buf = encode(&feats);
        assert_eq!(buf.len(), SWITCH_FEATURES_LENGTH + 2 * PHY_PORT_LENGTH);
        assert_eq!(SwitchFeatures::parse(&buf).unwrap(), feats);
    }

    #[test]
    fn misaligned_port_list_is_malformed() {
        let feats = SwitchFeatures {
            datapath_id: 1,
            num_buffers: 0,
            num_tables: 1,
            supported_capabilities: Capabilities::default(),
            supported_actions: SupportedActions::default(),
            ports: vec![port_desc(1)],
        };
        let mut buf = encode(&feats);
        buf.extend_from_slice(&[0; 5]);
        match SwitchFeatures::parse(&buf) {
            Err(OfpError::Misaligned { len, unit, .. }) => {
                assert_eq!(len, PHY_PORT_LENGTH + 5);
                assert_eq!(unit, PHY_PORT_LENGTH);
            }
            other => panic!("expected misaligned error, got {:?}", other),
        }
    }

    #[test]
    fn flow_mod_rejects_table_output() {
        let fm = FlowMod {
            command: FlowModCmd::AddFlow,
            pattern: Pattern::match_all(),
            priority: 1,
            actions: vec![Action::Output(PseudoPort::Table)],
            cookie: 0,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: false,
            apply_to_packet: None,
            out_port: None,
            check_overlap: false,
            emergency: false,
        };
        let err = fm.marshal(&mut Vec::<u8>::new()).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn flow_mod_flags_and_buffer() {
        let fm = FlowMod {
            command: FlowModCmd::ModStrictFlow,
            pattern: Pattern::match_all(),
            priority: 100,
            actions: vec![],
            cookie: 9,
            idle_timeout: Timeout::ExpiresAfter(30),
            hard_timeout: Timeout::Permanent,
            notify_when_removed: true,
            apply_to_packet: Some(12),
            out_port: Some(PseudoPort::PhysicalPort(4)),
            check_overlap: false,
            emergency: true,
        };
        let buf = encode(&fm);
        assert_eq!(buf.len(), FLOW_MOD_LENGTH);
        // flags are the last two bytes of the fixed part
        assert_eq!(&buf[62..64], &[0, 0b101]);
        assert_eq!(&buf[56..60], &[0, 0, 0, 12]);
        assert_eq!(FlowMod::parse(&buf).unwrap(), fm);
    }

    #[test]
    fn packet_in_reason_offset() {
        let mut body = vec![0xff, 0xff, 0xff, 0xff, 0, 60, 0, 3, 1, 0];
        body.extend(crate::packet::tests::eth_header(0x86dd));
        let pi = PacketIn::parse(&body).unwrap();
        assert_eq!(pi.input_payload.buffer_id(), None);
        assert_eq!(pi.port, 3);
        assert_eq!(pi.reason, PacketInReason::ExplicitSend);
        assert!(!pi.not_matched());
        assert_eq!(pi.frame.dl_typ, 0x86dd);
    }

    #[test]
    fn error_keeps_trailing_data() {
        let buf = vec![0, 1, 0, 6, 0xde, 0xad];
        let err = Error::parse(&buf).unwrap();
        assert_eq!(err.typ, ErrorType::BadRequest);
        assert_eq!(err.code, 6);
        assert_eq!(err.data, vec![0xde, 0xad]);
        assert_eq!(err.typ.to_string(), "OFPET_BAD_REQUEST");
        assert_eq!(encode(&err), buf);
    }

    #[test]
    fn port_mod_is_24_bytes() {
        let pm = PortMod {
            port_no: 5,
            hw_addr: [1, 2, 3, 4, 5, 6],
            config: PortConfig {
                no_flood: true,
                ..PortConfig::default()
            },
            mask: PortConfig {
                no_flood: true,
                ..PortConfig::default()
            },
            advertise: PortFeatures::default(),
        };
        let buf = encode(&pm);
        assert_eq!(buf.len(), PORT_MOD_LENGTH);
        assert_eq!(&buf[8..12], &[0, 0, 0, 0x10]);
        assert_eq!(PortMod::parse(&buf).unwrap(), pm);
    }

    #[test]
    fn unknown_port_number_is_rejected() {
        assert!(PseudoPort::make(0xff01, 0).is_err());
        assert_eq!(PseudoPort::of_int(0xffff).unwrap(), None);
        assert_eq!(
            PseudoPort::of_int(0xff00).unwrap(),
            Some(PseudoPort::PhysicalPort(0xff00))
        );
    }
}
