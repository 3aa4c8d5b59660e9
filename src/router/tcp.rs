//! Framed raw-TCP transport: WAMP's alternative to WebSocket framing.
//!
//! Handshake: the client sends 4 bytes `[0x7F, (length_exponent << 4) |
//! serializer, 0, 0]`. The router echoes the same 4 bytes back to accept, or
//! replies `[0x7F, error_code << 4, 0, 0]` and closes the socket to reject.
//!
//! Frame: `[type: u8][length: u24 big-endian][payload]`. `type` is 0 (regular
//! message), 1 (ping), or 2 (pong).

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::error::TcpHandshakeError;

const MAGIC: u8 = 0x7F;
const SERIALIZER_JSON: u8 = 1;
const SERIALIZER_MSGPACK: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Regular = 0,
    Ping = 1,
    Pong = 2,
}

impl MessageType {
    fn from_byte(b: u8) -> Option<MessageType> {
        match b {
            0 => Some(MessageType::Regular),
            1 => Some(MessageType::Ping),
            2 => Some(MessageType::Pong),
            _ => None,
        }
    }
}

pub struct Frame {
    pub kind: MessageType,
    pub payload: Vec<u8>,
}

/// Runs the 4-byte handshake on a freshly-accepted stream, returning the
/// negotiated WAMP subprotocol name on success.
pub fn handshake(stream: &mut TcpStream) -> io::Result<&'static str> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    if buf[0] != MAGIC {
        reject(stream, TcpHandshakeError::UnknownOption)?;
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic byte"));
    }
    let serializer = buf[1] & 0x0F;
    let protocol = match serializer {
        SERIALIZER_JSON => "wamp.2.json",
        SERIALIZER_MSGPACK => "wamp.2.msgpack",
        _ => {
            reject(stream, TcpHandshakeError::SerializerUnsupported)?;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported serializer",
            ));
        }
    };
    stream.write_all(&buf)?;
    Ok(protocol)
}

fn reject(stream: &mut TcpStream, error: TcpHandshakeError) -> io::Result<()> {
    stream.write_all(&[MAGIC, (error as u8) << 4, 0, 0])
}

pub fn read_frame(stream: &mut TcpStream) -> io::Result<Frame> {
    let header = stream.read_u8()?;
    let kind = MessageType::from_byte(header)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown frame type"))?;
    let length = stream.read_u24::<BigEndian>()?;
    let mut payload = vec![0u8; length as usize];
    stream.read_exact(&mut payload)?;
    Ok(Frame { kind, payload })
}

/// The largest payload a 24-bit frame length field can carry.
const MAX_FRAME_PAYLOAD: usize = 0x00FF_FFFF;

fn write_frame(stream: &mut TcpStream, kind: MessageType, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        warn!(
            "Dropping outbound frame of {} bytes: exceeds the {}-byte raw-TCP frame limit",
            payload.len(),
            MAX_FRAME_PAYLOAD
        );
        return Ok(());
    }
    stream.write_u8(kind as u8)?;
    stream.write_u24::<BigEndian>(payload.len() as u32)?;
    stream.write_all(payload)?;
    stream.flush()
}

/// A thread-safe sink for one TCP peer. Every `send_*` call takes the write
/// lock and writes one complete frame; WAMP only needs per-peer ordering, so
/// serializing writes behind a mutex is sufficient.
pub struct TcpSink {
    stream: Mutex<TcpStream>,
}

impl TcpSink {
    pub fn new(stream: TcpStream) -> TcpSink {
        TcpSink {
            stream: Mutex::new(stream),
        }
    }

    pub fn send_text(&self, payload: &str) -> io::Result<()> {
        write_frame(
            &mut self.stream.lock().unwrap(),
            MessageType::Regular,
            payload.as_bytes(),
        )
    }

    pub fn send_binary(&self, payload: &[u8]) -> io::Result<()> {
        write_frame(&mut self.stream.lock().unwrap(), MessageType::Regular, payload)
    }

    pub fn send_pong(&self, payload: &[u8]) -> io::Result<()> {
        write_frame(&mut self.stream.lock().unwrap(), MessageType::Pong, payload)
    }

    pub fn shutdown(&self) -> io::Result<()> {
        self.stream.lock().unwrap().shutdown(Shutdown::Both)
    }

    pub fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.stream.lock().unwrap().try_clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_header_round_trips() {
        let mut buf = Vec::new();
        buf.write_u8(MessageType::Ping as u8).unwrap();
        buf.write_u24::<BigEndian>(3).unwrap();
        buf.extend_from_slice(b"abc");

        let mut cursor = Cursor::new(buf);
        let kind = MessageType::from_byte(cursor.read_u8().unwrap()).unwrap();
        let len = cursor.read_u24::<BigEndian>().unwrap();
        let mut payload = vec![0u8; len as usize];
        cursor.read_exact(&mut payload).unwrap();

        assert_eq!(kind, MessageType::Ping);
        assert_eq!(&payload, b"abc");
    }

    #[test]
    fn oversize_frame_is_dropped_without_writing_anything() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let oversize = vec![0u8; MAX_FRAME_PAYLOAD + 1];
        write_frame(&mut server, MessageType::Regular, &oversize).unwrap();

        // Nothing was written for the oversize frame; a subsequent regular
        // frame is the first thing the client actually reads.
        write_frame(&mut server, MessageType::Regular, b"ok").unwrap();
        let kind = MessageType::from_byte(client.read_u8().unwrap()).unwrap();
        let len = client.read_u24::<BigEndian>().unwrap();
        let mut payload = vec![0u8; len as usize];
        client.read_exact(&mut payload).unwrap();

        assert_eq!(kind, MessageType::Regular);
        assert_eq!(&payload, b"ok");
    }
}
