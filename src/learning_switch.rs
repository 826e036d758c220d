use std::collections::HashMap;

use log::{debug, info};

use crate::ofp_header::Xid;
use crate::ofp_message::OfpError;
use crate::ofp_switch::{Connection, Switch, Transport};
use crate::openflow0x01::message::{add_flow, Message};
use crate::openflow0x01::{Action, PacketIn, PacketOut, Pattern, PseudoPort, Timeout};
use crate::packet::{Mac, MacAddr};

/// Priority of the flows the learning switch installs.
pub const FLOW_PRIORITY: u16 = 10;
/// Idle timeout of a flooding flow, so it is replaced once the destination is learned.
pub const FLOOD_IDLE_TIMEOUT: u16 = 5;

/// Layer-2 learning switch: remembers which port each source address was
/// seen on, and floods traffic for addresses it has not seen yet.
#[derive(Debug, Default)]
pub struct LearningSwitch {
    known_hosts: HashMap<MacAddr, u16>,
}

impl LearningSwitch {
    pub fn new() -> LearningSwitch {
        LearningSwitch::default()
    }

    /// Install a fresh learning switch as the packet-in handler of `sw`.
    pub fn attach<S: Transport + 'static>(sw: &mut Switch<S>) {
        let mut ls = LearningSwitch::new();
        sw.on_packet_in(move |conn, xid, pkt| ls.packet_in(conn, xid, pkt));
    }

    pub fn port_of(&self, host: &MacAddr) -> Option<u16> {
        self.known_hosts.get(host).copied()
    }

    fn learning_packet_in(&mut self, pkt: &PacketIn) {
        self.known_hosts.insert(pkt.frame.dl_src, pkt.port);
    }

    fn routing_packet_in<S: Transport>(
        &mut self,
        conn: &mut Connection<S>,
        xid: Xid,
        pkt: PacketIn,
    ) -> Result<(), OfpError> {
        let pkt_dst = pkt.frame.dl_dst;
        let pkt_src = pkt.frame.dl_src;
        let src_dst_match = Pattern {
            dl_src: Some(pkt_src),
            dl_dst: Some(pkt_dst),
            ..Pattern::match_all()
        };
        match self.port_of(&pkt_dst) {
            Some(p) => {
                let dst_src_match = Pattern {
                    dl_src: Some(pkt_dst),
                    dl_dst: Some(pkt_src),
                    ..Pattern::match_all()
                };
                info!(
                    "{}: installing rule for host {} to {}",
                    conn.peer(),
                    Mac(&pkt_src),
                    Mac(&pkt_dst)
                );
                let actions = vec![Action::Output(PseudoPort::PhysicalPort(p))];
                let mut forward = add_flow(FLOW_PRIORITY, src_dst_match, actions.clone());
                forward.apply_to_packet = pkt.input_payload.buffer_id();
                conn.send(xid, &Message::FlowMod(forward))?;
                info!(
                    "{}: installing rule for host {} to {}",
                    conn.peer(),
                    Mac(&pkt_dst),
                    Mac(&pkt_src)
                );
                let reverse = vec![Action::Output(PseudoPort::PhysicalPort(pkt.port))];
                conn.send(
                    xid,
                    &Message::FlowMod(add_flow(FLOW_PRIORITY, dst_src_match, reverse)),
                )?;
                self.packet_out(conn, xid, pkt, actions)
            }
            None => {
                debug!(
                    "{}: flooding to {}, {} known hosts",
                    conn.peer(),
                    Mac(&pkt_dst),
                    self.known_hosts.len()
                );
                let actions = vec![Action::Output(PseudoPort::Flood)];
                let mut flood = add_flow(FLOW_PRIORITY, src_dst_match, actions.clone());
                flood.idle_timeout = Timeout::ExpiresAfter(FLOOD_IDLE_TIMEOUT);
                flood.apply_to_packet = pkt.input_payload.buffer_id();
                conn.send(xid, &Message::FlowMod(flood))?;
                self.packet_out(conn, xid, pkt, actions)
            }
        }
    }

    /// Forward a packet the switch did not buffer. Buffered packets are
    /// released by the flow mod that references their buffer.
    fn packet_out<S: Transport>(
        &self,
        conn: &mut Connection<S>,
        xid: Xid,
        pkt: PacketIn,
        actions: Vec<Action>,
    ) -> Result<(), OfpError> {
        if pkt.input_payload.buffer_id().is_some() {
            return Ok(());
        }
        let pkt_out = PacketOut {
            output_payload: pkt.input_payload,
            port_id: Some(pkt.port),
            apply_actions: actions,
        };
        conn.send(xid, &Message::PacketOut(pkt_out))
    }

    pub fn packet_in<S: Transport>(
        &mut self,
        conn: &mut Connection<S>,
        xid: Xid,
        pkt: PacketIn,
    ) -> Result<(), OfpError> {
        self.learning_packet_in(&pkt);
        self.routing_packet_in(conn, xid, pkt)
    }
}
