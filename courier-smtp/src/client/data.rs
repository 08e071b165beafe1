//! Encoding of the message body for the DATA phase.

/// Encodes `data` for transmission after a `354` reply.
///
/// Line endings are normalised to CRLF, any line starting with `.` gets an
/// extra leading `.` (RFC 5321 section 4.5.2), the body is terminated with
/// CRLF if it was not already, and the closing `.` line is appended.
#[must_use]
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(data.len() + data.len() / 32 + 5);
    let mut at_line_start = true;
    let mut previous = None;

    for &byte in data {
        if at_line_start && byte == b'.' {
            encoded.push(b'.');
        }
        if byte == b'\n' && previous != Some(b'\r') {
            encoded.push(b'\r');
        }
        encoded.push(byte);

        at_line_start = byte == b'\n';
        previous = Some(byte);
    }

    if !encoded.is_empty() && !encoded.ends_with(b"\r\n") {
        encoded.extend_from_slice(b"\r\n");
    }
    encoded.extend_from_slice(b".\r\n");

    encoded
}
