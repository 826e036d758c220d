use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::ofp_message::OfpError;
use crate::openflow0x01::MsgCode;

/// Byte-size of the header every OpenFlow message starts with.
pub const OFP_HEADER_LENGTH: usize = 8;

/// Protocol version spoken by this crate (OpenFlow 1.0).
pub const OPENFLOW_0_01_VERSION: u8 = 0x01;

/// Transaction id pairing replies with requests.
pub type Xid = u32;

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        OFP_HEADER_LENGTH
    }

    /// Writes the header fields of an `OfpHeader` to `bytes`.
    pub fn marshal<W: Write>(&self, bytes: &mut W) -> io::Result<()> {
        write_header(bytes, self.version, self.typ, self.length, self.xid)
    }

    /// Takes a header-sized buffer and returns an `OfpHeader`.
    pub fn parse(buf: [u8; OFP_HEADER_LENGTH]) -> Self {
        OfpHeader {
            version: buf[0],
            typ: buf[1],
            length: BigEndian::read_u16(&buf[2..4]),
            xid: BigEndian::read_u32(&buf[4..8]),
        }
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the OpenFlow message type code of a header, `None` when the
    /// type byte is outside the 1.0 range.
    pub fn type_code(&self) -> Option<MsgCode> {
        MsgCode::from_u8(self.typ)
    }

    /// Return the raw type byte.
    pub fn raw_type(&self) -> u8 {
        self.typ
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Number of body bytes following the header.
    pub fn body_length(&self) -> Result<usize, OfpError> {
        self.length()
            .checked_sub(OFP_HEADER_LENGTH)
            .ok_or(OfpError::BadLength {
                length: self.length,
            })
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    ///  Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

impl fmt::Display for OfpHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.type_code() {
            Some(code) => write!(f, "type={}", code)?,
            None => write!(f, "type=unknown({})", self.typ)?,
        }
        write!(
            f,
            ", version={:#x}, length={}, xid={}",
            self.version, self.length, self.xid
        )
    }
}

/// Write the four header fields in wire order.
pub fn write_header<W: Write>(
    sink: &mut W,
    version: u8,
    typ: u8,
    length: u16,
    xid: Xid,
) -> io::Result<()> {
    sink.write_u8(version)?;
    sink.write_u8(typ)?;
    sink.write_u16::<BigEndian>(length)?;
    sink.write_u32::<BigEndian>(xid)
}

/// Read exactly `n` bytes, failing with `ShortRead` if the stream ends first.
pub fn read_exact<R: Read>(source: &mut R, n: usize) -> Result<Vec<u8>, OfpError> {
    let mut buf = vec![0; n];
    let mut filled = 0;
    while filled < n {
        match source.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(OfpError::ShortRead {
                    expected: n,
                    actual: filled,
                })
            }
            Ok(read) => filled += read,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(OfpError::Io(e)),
        }
    }
    Ok(buf)
}

/// Read and decode one header. A stream ending before its first byte is
/// `Disconnected`; ending anywhere later is a `ShortRead`.
pub fn read_header<R: Read>(source: &mut R) -> Result<OfpHeader, OfpError> {
    let raw = match read_exact(source, OFP_HEADER_LENGTH) {
        Err(OfpError::ShortRead { actual: 0, .. }) => return Err(OfpError::Disconnected),
        r => r?,
    };
    let mut buf = [0; OFP_HEADER_LENGTH];
    buf.copy_from_slice(&raw);
    Ok(OfpHeader::parse(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_is_big_endian() {
        let mut bytes: Vec<u8> = vec![];
        write_header(&mut bytes, 1, 2, 0x0102, 0x0a0b0c0d).unwrap();
        assert_eq!(bytes, vec![1, 2, 0x01, 0x02, 0x0a, 0x0b, 0x0c, 0x0d]);

        let header = read_header(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(header.version(), 1);
        assert_eq!(header.type_code(), Some(MsgCode::EchoReq));
        assert_eq!(header.length(), 0x0102);
        assert_eq!(header.xid(), 0x0a0b0c0d);
    }

    #[test]
    fn read_exact_reports_bytes_seen() {
        let mut src = Cursor::new(vec![1, 2, 3]);
        match read_exact(&mut src, 5) {
            Err(OfpError::ShortRead { expected, actual }) => {
                assert_eq!(expected, 5);
                assert_eq!(actual, 3);
            }
            other => panic!("expected short read, got {:?}", other),
        }
    }

    #[test]
    fn empty_stream_is_a_disconnect() {
        let err = read_header(&mut Cursor::new(vec![])).unwrap_err();
        assert!(err.is_disconnect());
        let err = read_header(&mut Cursor::new(vec![1, 0])).unwrap_err();
        assert!(!err.is_disconnect());
        // an empty body read is a truncation, not a hang-up
        let err = read_exact(&mut Cursor::new(vec![]), OFP_HEADER_LENGTH).unwrap_err();
        assert!(matches!(err, OfpError::ShortRead { expected: 8, actual: 0 }));
        assert!(!err.is_disconnect());
    }

    #[test]
    fn body_length_rejects_short_headers() {
        let header = OfpHeader::new(1, 0, 4, 0);
        assert!(matches!(
            header.body_length(),
            Err(OfpError::BadLength { length: 4 })
        ));
        assert_eq!(OfpHeader::new(1, 0, 12, 0).body_length().unwrap(), 4);
    }

    #[test]
    fn unknown_type_byte_has_no_code() {
        let header = OfpHeader::new(1, 0xc8, 8, 3);
        assert_eq!(header.type_code(), None);
        assert_eq!(header.raw_type(), 0xc8);
        assert!(header.to_string().contains("unknown(200)"));
    }
}
