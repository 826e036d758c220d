use std::io;

use thiserror::Error;

use crate::ofp_header::{OfpHeader, Xid};

/// Everything that can go wrong while encoding, decoding or exchanging
/// OpenFlow messages.
#[derive(Debug, Error)]
pub enum OfpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("short read: expected {expected} bytes, stream ended after {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("peer closed the connection")]
    Disconnected,
    #[error("header declares length {length}, shorter than the 8-byte header")]
    BadLength { length: u16 },
    #[error("{message} truncated: needs {expected} bytes, has {actual}")]
    Truncated {
        message: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{message} misaligned: {len} trailing bytes is not a multiple of {unit}")]
    Misaligned {
        message: &'static str,
        len: usize,
        unit: usize,
    },
    #[error("unexpected value '{value}' at field '{field}' of '{message}'")]
    UnexpectedValue {
        value: String,
        field: &'static str,
        message: &'static str,
    },
    #[error("unsupported OpenFlow version: {version}")]
    UnsupportedVersion { version: u8 },
    #[error("{message} of {length} bytes does not fit the 16-bit length field")]
    TooLong { message: &'static str, length: usize },
    #[error("{message} cannot be encoded")]
    Unsendable { message: &'static str },
    #[error("{handler} handler panicked")]
    HandlerPanicked { handler: &'static str },
}

impl OfpError {
    /// Whether an error returned by a handler must end the session. Failing to
    /// build an outgoing message writes nothing, so the stream is still usable.
    /// Errors from the receive path always end the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OfpError::TooLong { .. } | OfpError::Unsendable { .. } | OfpError::UnexpectedValue { .. }
        )
    }

    /// Whether the error is the peer closing the stream between two messages.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, OfpError::Disconnected)
    }

    pub(crate) fn unexpected<T: std::fmt::Display>(
        value: T,
        field: &'static str,
        message: &'static str,
    ) -> OfpError {
        OfpError::UnexpectedValue {
            value: value.to_string(),
            field,
            message,
        }
    }
}

/// OpenFlow Message
///
/// Version-agnostic API for handling OpenFlow messages at the byte-buffer level.
pub trait OfpMessage: Sized {
    /// Return the byte-size of an `OfpMessage`, header included.
    fn size_of(&self) -> usize;
    /// Create an `OfpHeader` for the given transaction id and OpenFlow message.
    fn header_of(&self, xid: Xid) -> Result<OfpHeader, OfpError>;
    /// Return a marshaled buffer containing an OpenFlow header and the message.
    fn marshal(&self, xid: Xid) -> Result<Vec<u8>, OfpError>;
    /// Returns a pair `(Xid, OfpMessage)` of the transaction id and OpenFlow message parsed from
    /// the given OpenFlow header `header`, and body `buf`.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(Xid, Self), OfpError>;
}
