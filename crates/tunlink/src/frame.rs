//! Wire framing for the packet-information header.
//!
//! Every frame exchanged with the device descriptor carries a 4-byte
//! header ahead of the payload:
//!
//! ```text
//! offset 0..2   flags     (u16, native byte order as stored by the kernel)
//! offset 2..4   protocol  (u16, big-endian EtherType)
//! offset 4..N   payload
//! ```
//!
//! Encoding and decoding are pure; the one-frame [`read_frame`] and
//! [`write_frame`] helpers are generic over `Read`/`Write` and shared by
//! the blocking and channel-based interfaces.

use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Length of the packet-information header.
pub const PI_LEN: usize = 4;

/// Largest frame the device will hand over in one read: a jumbo Ethernet
/// frame plus the packet-information header. Anything bigger arrives
/// clipped, with [`TUN_PKT_STRIP`] set.
pub const MAX_FRAME: usize = 10000;

/// Flag the kernel sets in the header when a packet was clipped to fit the
/// read buffer (`TUN_PKT_STRIP` from `linux/if_tun.h`).
pub const TUN_PKT_STRIP: u16 = 0x0001;

/// A single packet exchanged with the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The EtherType of the packet. Commonly seen values are 0x0800 for
    /// IPv4 and 0x86dd for IPv6. Meaningful mainly for TUN devices.
    pub protocol: u16,
    /// True if the packet was too large to be read completely.
    pub truncated: bool,
    /// The IP packet (TUN) or the full Ethernet frame (TAP).
    pub payload: Vec<u8>,
}

/// Decode one frame as read from the device.
///
/// Fails with [`Error::MalformedFrame`] when the buffer is shorter than
/// the header; that is the only failure mode.
pub fn decode(buf: &[u8]) -> Result<Packet> {
    if buf.len() < PI_LEN {
        return Err(Error::MalformedFrame { len: buf.len() });
    }
    let flags = u16::from_ne_bytes([buf[0], buf[1]]);
    let protocol = u16::from_be_bytes([buf[2], buf[3]]);
    Ok(Packet {
        protocol,
        truncated: flags & TUN_PKT_STRIP != 0,
        payload: buf[PI_LEN..].to_vec(),
    })
}

/// Encode a packet into a device-ready frame.
///
/// The flags bytes stay zero: no flag is meaningful on write, and the
/// truncation bit belongs to the kernel alone.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut buf = vec![0u8; PI_LEN + packet.payload.len()];
    buf[2..4].copy_from_slice(&packet.protocol.to_be_bytes());
    buf[PI_LEN..].copy_from_slice(&packet.payload);
    buf
}

/// Read one frame from `r` into `scratch` and decode it.
///
/// Issues exactly one read call; retry policy, if any, belongs to the
/// caller. `scratch` should be [`MAX_FRAME`] bytes when reading from a
/// real device.
pub fn read_frame<R: Read>(r: &mut R, scratch: &mut [u8]) -> Result<Packet> {
    let n = r.read(scratch).map_err(Error::Read)?;
    decode(&scratch[..n])
}

/// Write one packet to `w` as a single frame.
///
/// The device consumes exactly one packet per write call, so a short
/// count with no underlying error is surfaced as [`Error::ShortWrite`];
/// retrying would split or duplicate the frame.
pub fn write_frame<W: Write>(w: &mut W, packet: &Packet) -> Result<()> {
    let buf = encode(packet);
    let written = w.write(&buf).map_err(Error::Write)?;
    if written != buf.len() {
        return Err(Error::ShortWrite {
            written,
            len: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn packet(protocol: u16, payload: &[u8]) -> Packet {
        Packet {
            protocol,
            truncated: false,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn round_trip_preserves_packet() {
        let p = packet(0x0800, &[0x45, 0, 0, 20, 1, 2, 3]);
        assert_eq!(decode(&encode(&p)).unwrap(), p);
    }

    #[test]
    fn empty_payload_round_trips() {
        let p = packet(0x86dd, &[]);
        assert_eq!(decode(&encode(&p)).unwrap(), p);
    }

    #[test]
    fn encode_never_marks_truncated() {
        let p = Packet {
            protocol: 0x86dd,
            truncated: true,
            payload: vec![1, 2, 3],
        };
        assert!(!decode(&encode(&p)).unwrap().truncated);
    }

    #[test]
    fn encode_layout() {
        let buf = encode(&packet(0x0800, &[0xaa, 0xbb]));
        assert_eq!(buf.len(), 6);
        assert_eq!(&buf[..2], &[0, 0]);
        // Protocol is big-endian on the wire.
        assert_eq!(&buf[2..4], &[0x08, 0x00]);
        assert_eq!(&buf[4..], &[0xaa, 0xbb]);
    }

    #[test]
    fn truncation_bit_controls_flag() {
        let mut buf = encode(&packet(0x0800, b"xyz"));
        buf[..2].copy_from_slice(&TUN_PKT_STRIP.to_ne_bytes());
        assert!(decode(&buf).unwrap().truncated);
        buf[..2].copy_from_slice(&0u16.to_ne_bytes());
        assert!(!decode(&buf).unwrap().truncated);
    }

    #[test]
    fn short_buffers_are_rejected() {
        for len in 0..PI_LEN {
            match decode(&vec![0u8; len]) {
                Err(Error::MalformedFrame { len: n }) => assert_eq!(n, len),
                other => panic!("expected MalformedFrame for {len} bytes, got {other:?}"),
            }
        }
    }

    #[test]
    fn read_frame_decodes_one_frame() {
        let p = packet(0x0800, &[7, 8, 9]);
        let mut src = io::Cursor::new(encode(&p));
        let mut scratch = [0u8; 64];
        assert_eq!(read_frame(&mut src, &mut scratch).unwrap(), p);
    }

    struct FailingReader;

    impl io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("boom"))
        }
    }

    #[test]
    fn read_errors_pass_through() {
        let mut scratch = [0u8; 16];
        match read_frame(&mut FailingReader, &mut scratch) {
            Err(Error::Read(e)) => assert_eq!(e.to_string(), "boom"),
            other => panic!("expected Read error, got {other:?}"),
        }
    }

    /// Writer that accepts at most `limit` bytes per call.
    struct ShortWriter {
        limit: usize,
        written: Vec<u8>,
    }

    impl io::Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_write_is_an_error() {
        let mut w = ShortWriter {
            limit: 3,
            written: Vec::new(),
        };
        match write_frame(&mut w, &packet(0x0800, &[1, 2, 3, 4])) {
            Err(Error::ShortWrite { written, len }) => {
                assert_eq!(written, 3);
                assert_eq!(len, 8);
            }
            other => panic!("expected ShortWrite, got {other:?}"),
        }
    }

    #[test]
    fn full_write_is_one_call() {
        let mut w = ShortWriter {
            limit: usize::MAX,
            written: Vec::new(),
        };
        let p = packet(0x86dd, &[9, 9]);
        write_frame(&mut w, &p).unwrap();
        assert_eq!(w.written, encode(&p));
    }
}
