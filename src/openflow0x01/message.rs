use std::io::Write;

use super::*;
use crate::ofp_header::{OfpHeader, Xid, OFP_HEADER_LENGTH, OPENFLOW_0_01_VERSION};
use crate::ofp_message::OfpMessage;

/// Abstractions of OpenFlow 1.0 messages mapping to message codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Hello(Vec<u8>),
    Error(Error),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    Vendor(Vendor),
    FeaturesReq,
    FeaturesReply(SwitchFeatures),
    GetConfigReq,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PacketIn(PacketIn),
    FlowRemoved(FlowRemoved),
    PortStatus(PortStatus),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    PortMod(PortMod),
    StatsRequest(Stats),
    StatsReply(Stats),
    BarrierRequest,
    BarrierReply,
    /// A message whose type is outside the 1.0 range, or one this crate does not decode.
    Unrecognized(OfpHeader),
}

impl Message {
    /// Map `Message` to associated OpenFlow message type code `MsgCode`.
    pub fn msg_code_of_message(msg: &Message) -> Option<MsgCode> {
        let code = match *msg {
            Message::Hello(_) => MsgCode::Hello,
            Message::Error(_) => MsgCode::Error,
            Message::EchoRequest(_) => MsgCode::EchoReq,
            Message::EchoReply(_) => MsgCode::EchoResp,
            Message::Vendor(_) => MsgCode::Vendor,
            Message::FeaturesReq => MsgCode::FeaturesReq,
            Message::FeaturesReply(_) => MsgCode::FeaturesResp,
            Message::GetConfigReq => MsgCode::GetConfigReq,
            Message::GetConfigReply(_) => MsgCode::GetConfigResp,
            Message::SetConfig(_) => MsgCode::SetConfig,
            Message::PacketIn(_) => MsgCode::PacketIn,
            Message::FlowRemoved(_) => MsgCode::FlowRemoved,
            Message::PortStatus(_) => MsgCode::PortStatus,
            Message::PacketOut(_) => MsgCode::PacketOut,
            Message::FlowMod(_) => MsgCode::FlowMod,
            Message::PortMod(_) => MsgCode::PortMod,
            Message::StatsRequest(_) => MsgCode::StatsReq,
            Message::StatsReply(_) => MsgCode::StatsResp,
            Message::BarrierRequest => MsgCode::BarrierReq,
            Message::BarrierReply => MsgCode::BarrierResp,
            Message::Unrecognized(_) => return None,
        };
        Some(code)
    }

    fn size_of_body(msg: &Message) -> usize {
        match *msg {
            Message::Hello(ref buf) | Message::EchoRequest(ref buf) | Message::EchoReply(ref buf) => {
                buf.len()
            }
            Message::Error(ref err) => Error::size_of(err),
            Message::Vendor(ref v) => Vendor::size_of(v),
            Message::FeaturesReq
            | Message::GetConfigReq
            | Message::BarrierRequest
            | Message::BarrierReply => 0,
            Message::FeaturesReply(ref feats) => SwitchFeatures::size_of(feats),
            Message::GetConfigReply(ref cfg) | Message::SetConfig(ref cfg) => {
                SwitchConfig::size_of(cfg)
            }
            Message::PacketIn(ref packet_in) => PacketIn::size_of(packet_in),
            Message::FlowRemoved(ref flow) => FlowRemoved::size_of(flow),
            Message::PortStatus(ref ps) => PortStatus::size_of(ps),
            Message::PacketOut(ref po) => PacketOut::size_of(po),
            Message::FlowMod(ref flow_mod) => FlowMod::size_of(flow_mod),
            Message::PortMod(ref pm) => PortMod::size_of(pm),
            Message::StatsRequest(ref s) | Message::StatsReply(ref s) => Stats::size_of(s),
            Message::Unrecognized(ref header) => header.body_length().unwrap_or(0),
        }
    }

    /// Marshal the body of the OpenFlow message `msg`.
    fn marshal_body<W: Write>(msg: &Message, bytes: &mut W) -> Result<(), OfpError> {
        match *msg {
            Message::Hello(ref buf) | Message::EchoRequest(ref buf) | Message::EchoReply(ref buf) => {
                bytes.write_all(buf)?;
                Ok(())
            }
            Message::Error(ref err) => err.marshal(bytes),
            Message::Vendor(ref v) => v.marshal(bytes),
            Message::FeaturesReq
            | Message::GetConfigReq
            | Message::BarrierRequest
            | Message::BarrierReply => Ok(()),
            Message::FeaturesReply(ref feats) => feats.marshal(bytes),
            Message::GetConfigReply(ref cfg) | Message::SetConfig(ref cfg) => cfg.marshal(bytes),
            Message::PacketIn(ref packet_in) => packet_in.marshal(bytes),
            Message::FlowRemoved(ref flow) => flow.marshal(bytes),
            Message::PortStatus(ref sts) => sts.marshal(bytes),
            Message::PacketOut(ref po) => po.marshal(bytes),
            Message::FlowMod(ref flow_mod) => flow_mod.marshal(bytes),
            Message::PortMod(ref pm) => pm.marshal(bytes),
            Message::StatsRequest(ref s) | Message::StatsReply(ref s) => s.marshal(bytes),
            Message::Unrecognized(_) => Err(OfpError::Unsendable {
                message: "unrecognized message",
            }),
        }
    }
}

impl OfpMessage for Message {
    fn size_of(&self) -> usize {
        OfpHeader::size() + Message::size_of_body(self)
    }

    fn header_of(&self, xid: Xid) -> Result<OfpHeader, OfpError> {
        let code = Message::msg_code_of_message(self).ok_or(OfpError::Unsendable {
            message: "unrecognized message",
        })?;
        let length = self.size_of();
        if length > u16::MAX as usize {
            return Err(OfpError::TooLong {
                message: "message",
                length,
            });
        }
        Ok(OfpHeader::new(
            OPENFLOW_0_01_VERSION,
            code as u8,
            length as u16,
            xid,
        ))
    }

    fn marshal(&self, xid: Xid) -> Result<Vec<u8>, OfpError> {
        let hdr = self.header_of(xid)?;
        let mut bytes = Vec::with_capacity(hdr.length());
        hdr.marshal(&mut bytes)?;
        Message::marshal_body(self, &mut bytes)?;
        Ok(bytes)
    }

    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(Xid, Message), OfpError> {
        let body_length = header.body_length()?;
        if buf.len() < body_length {
            return Err(OfpError::Truncated {
                message: "message body",
                expected: body_length,
                actual: buf.len(),
            });
        }
        let buf = &buf[..body_length];
        let typ = match header.type_code() {
            Some(t) => t,
            None => return Ok((header.xid(), Message::Unrecognized(*header))),
        };
        // version negotiation happens through hellos, so those are accepted
        // from any version
        if typ != MsgCode::Hello && header.version() != OPENFLOW_0_01_VERSION {
            return Err(OfpError::UnsupportedVersion {
                version: header.version(),
            });
        }
        let msg = match typ {
            MsgCode::Hello => Message::Hello(buf.to_vec()),
            MsgCode::Error => Message::Error(Error::parse(buf)?),
            MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
            MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
            MsgCode::Vendor => Message::Vendor(Vendor::parse(buf)?),
            MsgCode::FeaturesReq => Message::FeaturesReq,
            MsgCode::FeaturesResp => Message::FeaturesReply(SwitchFeatures::parse(buf)?),
            MsgCode::GetConfigReq => Message::GetConfigReq,
            MsgCode::GetConfigResp => Message::GetConfigReply(SwitchConfig::parse(buf)?),
            MsgCode::SetConfig => Message::SetConfig(SwitchConfig::parse(buf)?),
            MsgCode::PacketIn => Message::PacketIn(PacketIn::parse(buf)?),
            MsgCode::FlowRemoved => Message::FlowRemoved(FlowRemoved::parse(buf)?),
            MsgCode::PortStatus => Message::PortStatus(PortStatus::parse(buf)?),
            MsgCode::PacketOut => Message::PacketOut(PacketOut::parse(buf)?),
            MsgCode::FlowMod => Message::FlowMod(FlowMod::parse(buf)?),
            MsgCode::PortMod => Message::PortMod(PortMod::parse(buf)?),
            MsgCode::StatsReq => Message::StatsRequest(Stats::parse(buf)?),
            MsgCode::StatsResp => Message::StatsReply(Stats::parse(buf)?),
            MsgCode::BarrierReq => Message::BarrierRequest,
            MsgCode::BarrierResp => Message::BarrierReply,
            MsgCode::QueueGetConfigReq | MsgCode::QueueGetConfigResp => {
                Message::Unrecognized(*header)
            }
        };
        Ok((header.xid(), msg))
    }
}

/// Return a `FlowMod` adding a flow parameterized by the given `priority`, `pattern`,
/// and `actions`.
pub fn add_flow(prio: u16, pattern: Pattern, actions: Vec<Action>) -> FlowMod {
    FlowMod {
        command: FlowModCmd::AddFlow,
        pattern,
        priority: prio,
        actions,
        cookie: 0,
        idle_timeout: Timeout::Permanent,
        hard_timeout: Timeout::Permanent,
        notify_when_removed: false,
        out_port: None,
        apply_to_packet: None,
        check_overlap: false,
        emergency: false,
    }
}

/// Decode one complete message, header included, from `buf`.
pub fn decode(buf: &[u8]) -> Result<(Xid, Message), OfpError> {
    if buf.len() < OFP_HEADER_LENGTH {
        return Err(OfpError::Truncated {
            message: "header",
            expected: OFP_HEADER_LENGTH,
            actual: buf.len(),
        });
    }
    let mut raw = [0; OFP_HEADER_LENGTH];
    raw.copy_from_slice(&buf[..OFP_HEADER_LENGTH]);
    let header = OfpHeader::parse(raw);
    Message::parse(&header, &buf[OFP_HEADER_LENGTH..])
}

#[cfg(test)]
mod tests {
    use super::super::tests::port_desc;
    use super::*;
    use crate::packet::tests::{eth_header, DST, SRC};

    fn round_trip(msg: Message, xid: Xid) {
        let bytes = msg.marshal(xid).unwrap();
        assert_eq!(bytes.len(), msg.size_of(), "{:?}", msg);
        assert_eq!(
            u16::from_be_bytes([bytes[2], bytes[3]]) as usize,
            bytes.len(),
            "{:?}",
            msg
        );
        let (parsed_xid, parsed) = decode(&bytes).unwrap();
        assert_eq!(parsed_xid, xid);
        assert_eq!(parsed, msg);
    }

    #[test]
    fn hello_is_just_a_header() {
        let bytes = Message::Hello(vec![]).marshal(7).unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 8, 0, 0, 0, 7]);
    }

    #[test]
    fn echo_reply_layout() {
        let bytes = Message::EchoReply(vec![1, 2, 3]).marshal(42).unwrap();
        assert_eq!(bytes, vec![1, 3, 0, 11, 0, 0, 0, 42, 1, 2, 3]);
    }

    #[test]
    fn features_request_layout() {
        let bytes = Message::FeaturesReq.marshal(0).unwrap();
        assert_eq!(bytes, vec![1, 5, 0, 8, 0, 0, 0, 0]);
    }

    #[test]
    fn set_config_uses_its_own_type() {
        let bytes = Message::SetConfig(SwitchConfig::default()).marshal(3).unwrap();
        assert_eq!(bytes, vec![1, 9, 0, 12, 0, 0, 0, 3, 0, 0, 0, 128]);
    }

    #[test]
    fn controller_messages_round_trip() {
        let flood = add_flow(
            10,
            Pattern {
                dl_src: Some(SRC),
                dl_dst: Some(DST),
                ..Pattern::match_all()
            },
            vec![
                Action::SetVlanPcp(3),
                Action::Output(PseudoPort::Flood),
            ],
        );
        round_trip(Message::FlowMod(flood), 11);
        round_trip(
            Message::PacketOut(PacketOut {
                output_payload: Payload::NotBuffered(eth_header(0x0806)),
                port_id: Some(2),
                apply_actions: vec![Action::Output(PseudoPort::AllPorts)],
            }),
            12,
        );
        round_trip(
            Message::PacketOut(PacketOut {
                output_payload: Payload::Buffered(77, vec![]),
                port_id: None,
                apply_actions: vec![],
            }),
            13,
        );
        round_trip(
            Message::PortMod(PortMod {
                port_no: 1,
                hw_addr: SRC,
                config: PortConfig::default(),
                mask: PortConfig {
                    down: true,
                    ..PortConfig::default()
                },
                advertise: PortFeatures::default(),
            }),
            14,
        );
        round_trip(Message::BarrierRequest, 15);
        round_trip(Message::GetConfigReq, 16);
        round_trip(Message::FeaturesReq, 17);
        round_trip(
            Message::SetConfig(SwitchConfig {
                flags: FragHandling::Reassemble,
                miss_send_len: 0xffff,
            }),
            18,
        );
        round_trip(
            Message::StatsRequest(Stats {
                typ: 1,
                flags: 0,
                body: vec![0xff; 44],
            }),
            19,
        );
        round_trip(Message::Hello(vec![]), 20);
        round_trip(Message::EchoRequest(vec![4, 5, 6, 7]), 0xffff_ffff);
    }

    #[test]
    fn switch_messages_round_trip() {
        let mut data = eth_header(0x0800);
        data.extend_from_slice(&[0x45, 0, 0, 40, 0, 0, 0, 0, 64, 6, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8]);
        data.extend_from_slice(&[0, 22, 0, 80]);
        let pi = PacketIn::new(
            Payload::Buffered(5, data),
            1500,
            1,
            PacketInReason::NoMatch,
        )
        .unwrap();
        assert_eq!(pi.frame.tcp().unwrap().dst, 80);
        round_trip(Message::PacketIn(pi), 21);
        round_trip(
            Message::FeaturesReply(SwitchFeatures {
                datapath_id: 0xabcd,
                num_buffers: 256,
                num_tables: 254,
                supported_capabilities: Capabilities {
                    port_stats: true,
                    ..Capabilities::default()
                },
                supported_actions: SupportedActions {
                    output: true,
                    set_dl_src: true,
                    ..SupportedActions::default()
                },
                ports: vec![port_desc(1), port_desc(2), port_desc(3)],
            }),
            27,
        );
        round_trip(
            Message::GetConfigReply(SwitchConfig {
                flags: FragHandling::Drop,
                miss_send_len: 128,
            }),
            28,
        );
        round_trip(Message::BarrierReply, 29);
        round_trip(Message::EchoReply(vec![]), 30);
        round_trip(Message::Hello(vec![0, 1]), 31);
        round_trip(
            Message::PortStatus(PortStatus {
                reason: PortReason::PortModify,
                desc: port_desc(4),
            }),
            22,
        );
        round_trip(
            Message::FlowRemoved(FlowRemoved {
                pattern: Pattern {
                    tp_src: Some(22),
                    ..Pattern::match_all()
                },
                cookie: 0xdead_beef,
                priority: 7,
                reason: FlowRemovedReason::HardTimeout,
                duration_sec: 30,
                duration_nsec: 500,
                idle_timeout: Timeout::ExpiresAfter(5),
                packet_count: 10,
                byte_count: 1000,
            }),
            23,
        );
        round_trip(
            Message::Error(Error {
                typ: ErrorType::FlowModFailed,
                code: 2,
                data: vec![1, 14, 0, 72],
            }),
            24,
        );
        round_trip(
            Message::StatsReply(Stats {
                typ: 0,
                flags: 0,
                body: vec![0; 16],
            }),
            25,
        );
        round_trip(
            Message::Vendor(Vendor {
                vendor: 0x2320,
                data: vec![9, 9],
            }),
            26,
        );
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let bytes = vec![1, 200, 0, 10, 0, 0, 0, 9, 0xab, 0xcd];
        let (xid, msg) = decode(&bytes).unwrap();
        assert_eq!(xid, 9);
        match msg {
            Message::Unrecognized(ref header) => {
                assert_eq!(header.raw_type(), 200);
                assert_eq!(header.length(), 10);
            }
            ref other => panic!("expected unrecognized, got {:?}", other),
        }
        assert!(matches!(
            msg.marshal(9),
            Err(OfpError::Unsendable { .. })
        ));
    }

    #[test]
    fn other_versions_are_rejected_except_hello() {
        let (_, msg) = decode(&[4, 0, 0, 8, 0, 0, 0, 1]).unwrap();
        assert_eq!(msg, Message::Hello(vec![]));
        assert!(matches!(
            decode(&[4, 2, 0, 8, 0, 0, 0, 1]),
            Err(OfpError::UnsupportedVersion { version: 4 })
        ));
    }

    #[test]
    fn oversized_message_is_not_encoded() {
        let msg = Message::EchoRequest(vec![0; u16::MAX as usize]);
        let err = msg.marshal(1).unwrap_err();
        assert!(matches!(err, OfpError::TooLong { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn short_body_is_truncated() {
        assert!(matches!(
            decode(&[1, 3, 0, 12, 0, 0, 0, 1, 1, 2]),
            Err(OfpError::Truncated { expected: 4, actual: 2, .. })
        ));
        assert!(matches!(
            decode(&[1, 3, 0, 6, 0, 0, 0, 1]),
            Err(OfpError::BadLength { length: 6 })
        ));
    }
}
