//! One OpenFlow session: the connection to a single switch, its handshake,
//! and the receive loop dispatching switch events to application callbacks.

use std::fmt;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::panic::{self, AssertUnwindSafe};

use log::{debug, info, trace, warn};

use crate::ofp_header::{read_exact, read_header, Xid};
use crate::ofp_message::{OfpError, OfpMessage};
use crate::openflow0x01::message::Message;
use crate::openflow0x01::{Error, PacketIn, PortStatus, SwitchFeatures};

/// A byte stream to a switch that can be torn down from our side.
pub trait Transport: Read + Write {
    /// Close both directions of the stream.
    fn shutdown(&mut self) -> io::Result<()>;
    /// Human-readable name of the remote end, for logging.
    fn peer(&self) -> String;
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn peer(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unknown peer>".to_string())
    }
}

/// The wire side of a session. Handlers receive it to send replies.
pub struct Connection<S: Transport> {
    stream: BufReader<S>,
    peer: String,
    datapath_id: Option<u64>,
    closed: bool,
}

impl<S: Transport> Connection<S> {
    pub fn new(stream: S) -> Connection<S> {
        let peer = stream.peer();
        Connection {
            stream: BufReader::new(stream),
            peer,
            datapath_id: None,
            closed: false,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Datapath id reported by the last features reply, if one has arrived.
    pub fn datapath_id(&self) -> Option<u64> {
        self.datapath_id
    }

    /// Encode `msg` with transaction id `xid` and write it out.
    pub fn send(&mut self, xid: Xid, msg: &Message) -> Result<(), OfpError> {
        if self.closed {
            return Err(OfpError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection closed",
            )));
        }
        let bytes = msg.marshal(xid)?;
        let stream = self.stream.get_mut();
        stream.write_all(&bytes)?;
        stream.flush()?;
        trace!(
            "{}: sent {} xid={} ({} bytes)",
            self.peer,
            MsgName(msg),
            xid,
            bytes.len()
        );
        Ok(())
    }

    /// Block until one complete message has been read and decoded.
    pub fn recv(&mut self) -> Result<(Xid, Message), OfpError> {
        let header = read_header(&mut self.stream)?;
        let body = read_exact(&mut self.stream, header.body_length()?)?;
        trace!("{}: received {}", self.peer, header);
        Message::parse(&header, &body)
    }

    /// Shut the transport down. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.get_mut().shutdown() {
            debug!("{}: shutdown failed: {}", self.peer, e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }
}

struct MsgName<'a>(&'a Message);

impl<'a> fmt::Display for MsgName<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match Message::msg_code_of_message(self.0) {
            Some(code) => write!(f, "{}", code),
            None => f.write_str("Unrecognized"),
        }
    }
}

/// Application callback for one kind of switch event.
pub type Handler<S, T> = Box<dyn FnMut(&mut Connection<S>, Xid, T) -> Result<(), OfpError>>;

fn discard<S: Transport + 'static, T: 'static>(event: &'static str) -> Handler<S, T> {
    Box::new(move |conn: &mut Connection<S>, xid: Xid, _: T| {
        debug!("{}: {} xid={} discarded", conn.peer(), event, xid);
        Ok(())
    })
}

/// Lifecycle of a session. The handshake does not wait for the switch: once
/// Hello and FeaturesRequest are written the session is `Established`, so
/// `AwaitingFeatures` only holds while the FeaturesRequest is being sent.
/// The features reply is handled whenever it arrives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingFeatures,
    Established,
    Closed,
}

/// A session with one switch.
///
/// Handlers are registered before `serve` is called and run on the session
/// thread, one message at a time.
pub struct Switch<S: Transport> {
    conn: Connection<S>,
    state: SessionState,
    packet_in: Handler<S, PacketIn>,
    switch_features: Handler<S, SwitchFeatures>,
    error: Handler<S, Error>,
    port_status: Handler<S, PortStatus>,
}

impl<S: Transport + 'static> Switch<S> {
    pub fn new(stream: S) -> Switch<S> {
        Switch {
            conn: Connection::new(stream),
            state: SessionState::Connecting,
            packet_in: discard("packet in"),
            switch_features: discard("features reply"),
            error: discard("error"),
            port_status: discard("port status"),
        }
    }

    pub fn on_packet_in<F>(&mut self, f: F)
    where
        F: FnMut(&mut Connection<S>, Xid, PacketIn) -> Result<(), OfpError> + 'static,
    {
        self.packet_in = Box::new(f);
    }

    pub fn on_switch_features<F>(&mut self, f: F)
    where
        F: FnMut(&mut Connection<S>, Xid, SwitchFeatures) -> Result<(), OfpError> + 'static,
    {
        self.switch_features = Box::new(f);
    }

    pub fn on_error<F>(&mut self, f: F)
    where
        F: FnMut(&mut Connection<S>, Xid, Error) -> Result<(), OfpError> + 'static,
    {
        self.error = Box::new(f);
    }

    pub fn on_port_status<F>(&mut self, f: F)
    where
        F: FnMut(&mut Connection<S>, Xid, PortStatus) -> Result<(), OfpError> + 'static,
    {
        self.port_status = Box::new(f);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection(&mut self) -> &mut Connection<S> {
        &mut self.conn
    }

    pub fn send(&mut self, xid: Xid, msg: &Message) -> Result<(), OfpError> {
        self.conn.send(xid, msg)
    }

    pub fn close(&mut self) {
        self.conn.close();
        self.state = SessionState::Closed;
    }

    /// Run the session until the switch disconnects, a handler closes the
    /// connection, or an error ends it. The transport is closed on return.
    ///
    /// A switch hanging up between two messages is a normal end and yields
    /// `Ok(())`; anything else is returned as the error that ended the session.
    pub fn serve(&mut self) -> Result<(), OfpError> {
        let result = self.handshake().and_then(|()| self.run());
        self.close();
        match result {
            Err(ref e) if e.is_disconnect() => {
                info!("{}: switch disconnected", self.conn.peer());
                Ok(())
            }
            r => r,
        }
    }

    /// Write Hello and FeaturesRequest, then treat the session as established
    /// without reading anything back.
    fn handshake(&mut self) -> Result<(), OfpError> {
        self.state = SessionState::Connecting;
        self.conn.send(0, &Message::Hello(vec![]))?;
        self.state = SessionState::AwaitingFeatures;
        self.conn.send(0, &Message::FeaturesReq)?;
        self.state = SessionState::Established;
        Ok(())
    }

    fn run(&mut self) -> Result<(), OfpError> {
        while !self.conn.is_closed() {
            let (xid, msg) = self.conn.recv()?;
            self.process_message(xid, msg)?;
        }
        Ok(())
    }

    fn process_message(&mut self, xid: Xid, msg: Message) -> Result<(), OfpError> {
        match msg {
            Message::Hello(_) => {
                self.conn.send(xid, &Message::Hello(vec![]))?;
                self.conn.send(0, &Message::FeaturesReq)
            }
            Message::EchoRequest(body) => self.conn.send(xid, &Message::EchoReply(body)),
            Message::FeaturesReply(feats) => {
                info!(
                    "{}: switch {:016x} connected, {} ports",
                    self.conn.peer(),
                    feats.datapath_id,
                    feats.ports.len()
                );
                self.conn.datapath_id = Some(feats.datapath_id);
                Self::dispatch(
                    &mut self.conn,
                    &mut self.switch_features,
                    "features reply",
                    xid,
                    feats,
                )
            }
            Message::PacketIn(pkt) => {
                Self::dispatch(&mut self.conn, &mut self.packet_in, "packet in", xid, pkt)
            }
            Message::Error(err) => {
                warn!(
                    "{}: switch reported {} code {} xid={} ({} data bytes)",
                    self.conn.peer(),
                    err.typ,
                    err.code,
                    xid,
                    err.data.len()
                );
                Self::dispatch(&mut self.conn, &mut self.error, "error", xid, err)
            }
            Message::PortStatus(sts) => Self::dispatch(
                &mut self.conn,
                &mut self.port_status,
                "port status",
                xid,
                sts,
            ),
            Message::Unrecognized(header) => {
                warn!("{}: ignoring message {}", self.conn.peer(), header);
                Ok(())
            }
            other => {
                debug!(
                    "{}: unhandled {} xid={}",
                    self.conn.peer(),
                    MsgName(&other),
                    xid
                );
                Ok(())
            }
        }
    }

    /// Run one handler. Panics take the session down cleanly; errors that
    /// leave the transport usable are logged and the session goes on.
    fn dispatch<T>(
        conn: &mut Connection<S>,
        handler: &mut Handler<S, T>,
        event: &'static str,
        xid: Xid,
        msg: T,
    ) -> Result<(), OfpError> {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(conn, xid, msg))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if !e.is_fatal() => {
                warn!("{}: {} handler failed xid={}: {}", conn.peer(), event, xid, e);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(OfpError::HandlerPanicked { handler: event }),
        }
    }
}
