//! Multiplexer frame codec.
//!
//! Every virtual connection shares one byte stream. Frames are length-prefixed
//! and tagged with the stream they belong to:
//!
//! ```text
//! [u32 LE length] [u8 type] [u32 LE stream id] [payload: length-5 bytes]
//! ```
//!
//! Frame types:
//! - `0x01`: open, the dialer asks the acceptor to attach a stream
//! - `0x02`: ack, the acceptor attached
//! - `0x03`: reject, the acceptor will never attach this id
//! - `0x04`: data, one message for the stream
//! - `0x05`: close, the sender is done with the stream

use crate::error::{Error, Result};

/// Maximum frame body size (16 MB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Size of the `[type][stream id]` header inside a frame body.
const HEADER_LEN: usize = 5;

/// Frame type constants.
pub mod frame_type {
    /// Dialer asks the acceptor to attach.
    pub const OPEN: u8 = 0x01;
    /// Acceptor attached.
    pub const ACK: u8 = 0x02;
    /// Acceptor refuses the id.
    pub const REJECT: u8 = 0x03;
    /// Stream message.
    pub const DATA: u8 = 0x04;
    /// Stream closed by the sender.
    pub const CLOSE: u8 = 0x05;
}

/// A decoded multiplexer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Attach request for a stream the peer allocated.
    Open(u32),
    /// Attach confirmation.
    Ack(u32),
    /// Attach refusal.
    Reject(u32),
    /// One message on a stream.
    Data {
        /// Stream id.
        stream: u32,
        /// Message bytes.
        payload: Vec<u8>,
    },
    /// Stream closed by the sender.
    Close(u32),
}

impl Frame {
    /// Stream id this frame refers to.
    pub fn stream(&self) -> u32 {
        match self {
            Frame::Open(id) | Frame::Ack(id) | Frame::Reject(id) | Frame::Close(id) => *id,
            Frame::Data { stream, .. } => *stream,
        }
    }

    /// Encode this frame into a wire-format byte vector.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Open(id) => encode_raw(frame_type::OPEN, *id, &[]),
            Frame::Ack(id) => encode_raw(frame_type::ACK, *id, &[]),
            Frame::Reject(id) => encode_raw(frame_type::REJECT, *id, &[]),
            Frame::Data { stream, payload } => encode_raw(frame_type::DATA, *stream, payload),
            Frame::Close(id) => encode_raw(frame_type::CLOSE, *id, &[]),
        }
    }

    /// Decode a frame body (everything after the length prefix).
    pub fn decode(body: &[u8]) -> Result<Frame> {
        if body.len() < HEADER_LEN {
            return Err(Error::protocol(format!(
                "frame too short: {} bytes",
                body.len()
            )));
        }
        let stream = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
        let payload = &body[HEADER_LEN..];
        let control = |frame: Frame| {
            if payload.is_empty() {
                Ok(frame)
            } else {
                Err(Error::protocol(format!(
                    "control frame for stream {stream} carries {} payload bytes",
                    payload.len()
                )))
            }
        };
        match body[0] {
            frame_type::OPEN => control(Frame::Open(stream)),
            frame_type::ACK => control(Frame::Ack(stream)),
            frame_type::REJECT => control(Frame::Reject(stream)),
            frame_type::DATA => Ok(Frame::Data {
                stream,
                payload: payload.to_vec(),
            }),
            frame_type::CLOSE => control(Frame::Close(stream)),
            other => Err(Error::protocol(format!("unknown frame type 0x{other:02x}"))),
        }
    }
}

/// Validate a length prefix read from the wire.
pub fn check_length(length: u32) -> Result<usize> {
    if length < HEADER_LEN as u32 {
        return Err(Error::protocol(format!("frame length {length} below header size")));
    }
    if length > MAX_FRAME_SIZE {
        return Err(Error::protocol(format!(
            "frame length {length} exceeds maximum {MAX_FRAME_SIZE}"
        )));
    }
    Ok(length as usize)
}

fn encode_raw(frame_type: u8, stream: u32, payload: &[u8]) -> Vec<u8> {
    let length = (HEADER_LEN + payload.len()) as u32;
    let mut buf = Vec::with_capacity(4 + HEADER_LEN + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.push(frame_type);
    buf.extend_from_slice(&stream.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(encoded: &[u8]) -> &[u8] {
        let length = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(length as usize, encoded.len() - 4);
        &encoded[4..]
    }

    #[test]
    fn test_data_frame_layout() {
        let frame = Frame::Data {
            stream: 7,
            payload: b"hi".to_vec(),
        };
        let encoded = frame.encode();
        assert_eq!(encoded, vec![7, 0, 0, 0, frame_type::DATA, 7, 0, 0, 0, b'h', b'i']);
        assert_eq!(Frame::decode(body(&encoded)).unwrap(), frame);
    }

    #[test]
    fn test_control_frames_decode() {
        for frame in [Frame::Open(3), Frame::Ack(3), Frame::Reject(4), Frame::Close(9)] {
            let encoded = frame.encode();
            assert_eq!(Frame::decode(body(&encoded)).unwrap(), frame);
        }
    }

    #[test]
    fn test_control_frame_with_payload_is_rejected() {
        let body = [frame_type::OPEN, 1, 0, 0, 0, 0xff];
        assert!(matches!(Frame::decode(&body), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_unknown_type_and_short_body() {
        assert!(Frame::decode(&[0x7f, 0, 0, 0, 0]).is_err());
        assert!(Frame::decode(&[frame_type::DATA, 1]).is_err());
    }

    #[test]
    fn test_check_length_bounds() {
        assert!(check_length(4).is_err());
        assert_eq!(check_length(5).unwrap(), 5);
        assert!(check_length(MAX_FRAME_SIZE + 1).is_err());
    }
}
