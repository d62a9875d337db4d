// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message framing.
//!
//! ```text
//! +----------------+----------------------+
//! | Length (2B BE) | UTF-8 text           |
//! +----------------+----------------------+
//! ```
//!
//! A zero length is a valid empty message.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Largest encodable message.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

pub fn write_message<W: Write>(w: &mut W, text: &str) -> io::Result<()> {
    let len = u16::try_from(text.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message too large: {} > {}", text.len(), MAX_MESSAGE_LEN),
        )
    })?;
    w.write_u16::<BigEndian>(len)?;
    w.write_all(text.as_bytes())?;
    w.flush()
}

pub fn read_message<R: Read>(r: &mut R) -> io::Result<String> {
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_layout() {
        let mut buf = Vec::new();
        write_message(&mut buf, "stop").unwrap();
        assert_eq!(buf, vec![0, 4, b's', b't', b'o', b'p']);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_message(&mut cursor).unwrap(), "stop");
    }

    #[test]
    fn test_empty_and_truncated() {
        let mut cursor = Cursor::new(vec![0, 0]);
        assert_eq!(read_message(&mut cursor).unwrap(), "");

        let mut cursor = Cursor::new(vec![0, 9, b'x']);
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut buf = Vec::new();
        let text = "x".repeat(MAX_MESSAGE_LEN + 1);
        let err = write_message(&mut buf, &text).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut cursor = Cursor::new(vec![0, 2, 0xff, 0xfe]);
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
