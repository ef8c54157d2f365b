use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

/// Line delimiter used in both directions: LF followed by CR.
pub const LINE_DELIMITER: &[u8; 2] = b"\n\r";

/// Default maximum line length: 16 MiB.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// Encode a line into the wire format (content followed by [`LINE_DELIMITER`]).
pub fn encode_line(line: &[u8], dst: &mut BytesMut) {
    dst.reserve(line.len() + LINE_DELIMITER.len());
    dst.put_slice(line);
    dst.put_slice(LINE_DELIMITER);
}

/// Decode one line from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete line yet.
/// On success, consumes the line from the buffer and returns it with its
/// delimiter still attached.
pub fn decode_line(src: &mut BytesMut, max_line: usize) -> Result<Option<Bytes>> {
    match find_delimiter(src) {
        Some(end) => {
            let total = end + LINE_DELIMITER.len();
            if total > max_line.saturating_add(LINE_DELIMITER.len()) {
                return Err(CodecError::LineTooLong {
                    len: end,
                    max: max_line,
                });
            }
            Ok(Some(src.split_to(total).freeze()))
        }
        None if src.len() > max_line => Err(CodecError::LineTooLong {
            len: src.len(),
            max: max_line,
        }),
        None => Ok(None), // Need more data
    }
}

/// Strip a trailing delimiter (and stray CR/LF bytes) from a line.
pub fn trim_delimiter(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// True for a line that carries nothing but its delimiter.
pub fn is_blank(line: &[u8]) -> bool {
    trim_delimiter(line).iter().all(u8::is_ascii_whitespace)
}

fn find_delimiter(src: &[u8]) -> Option<usize> {
    src.windows(LINE_DELIMITER.len())
        .position(|w| w == LINE_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_delimiter() {
        let mut buf = BytesMut::new();
        encode_line(b"use sid=1", &mut buf);
        assert_eq!(buf.as_ref(), b"use sid=1\n\r");
    }

    #[test]
    fn test_decode_keeps_delimiter() {
        let mut buf = BytesMut::from(&b"error id=0 msg=ok\n\rrest"[..]);
        let line = decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().unwrap();
        assert_eq!(line.as_ref(), b"error id=0 msg=ok\n\r");
        assert_eq!(buf.as_ref(), b"rest");
    }

    #[test]
    fn test_decode_incomplete_line() {
        let mut buf = BytesMut::from(&b"clid=1 cid=2\n"[..]);
        assert!(decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().is_none());
        buf.put_slice(b"\r");
        let line = decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().unwrap();
        assert_eq!(trim_delimiter(&line), b"clid=1 cid=2");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_plain_crlf_is_not_a_delimiter() {
        let mut buf = BytesMut::from(&b"a=1\r\nb=2"[..]);
        assert!(decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().is_none());
    }

    #[test]
    fn test_multiple_lines() {
        let mut buf = BytesMut::new();
        encode_line(b"first", &mut buf);
        encode_line(b"second", &mut buf);

        let l1 = decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().unwrap();
        let l2 = decode_line(&mut buf, DEFAULT_MAX_LINE).unwrap().unwrap();
        assert_eq!(trim_delimiter(&l1), b"first");
        assert_eq!(trim_delimiter(&l2), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_line_too_long() {
        let mut buf = BytesMut::from(&[b'x'; 64][..]);
        let result = decode_line(&mut buf, 16);
        assert!(matches!(result, Err(CodecError::LineTooLong { .. })));

        let mut buf = BytesMut::from(&b"0123456789abcdefXYZ\n\r"[..]);
        let result = decode_line(&mut buf, 16);
        assert!(matches!(result, Err(CodecError::LineTooLong { len: 19, max: 16 })));
    }

    #[test]
    fn test_blank_lines() {
        assert!(is_blank(b"\n\r"));
        assert!(is_blank(b""));
        assert!(!is_blank(b"x\n\r"));
    }
}
