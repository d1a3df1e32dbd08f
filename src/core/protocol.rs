// src/core/protocol.rs

//! The backend wire boundary. Per spec, the backend's binary protocol is an
//! external collaborator — only the interface this client needs is specified
//! here: a vbucket-addressed, CAS-aware binary frame with a flags field used
//! for the write-timestamp reconciliation hint.
//!
//! This is deliberately the smallest framing that lets [`super::connection`]
//! exercise real `AsyncRead`/`AsyncWrite` I/O against a backend; it is not a
//! complete reimplementation of any specific cache engine's protocol.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strum_macros::{Display, EnumString};
use tokio_util::codec::{Decoder, Encoder};

/// 24-byte fixed header, modeled on the shape (not the exact byte layout) of
/// common binary cache protocols: opcode, vbucket, key/extras/body lengths,
/// status, opaque, cas.
const HEADER_LEN: usize = 24;
const MAGIC_REQUEST: u8 = 0x80;
const MAGIC_RESPONSE: u8 = 0x81;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Delete = 0x04,
    Cas = 0x05,
    SetNoReply = 0x11,
}

impl Opcode {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Opcode::Get),
            0x01 => Some(Opcode::Set),
            0x02 => Some(Opcode::Add),
            0x04 => Some(Opcode::Delete),
            0x05 => Some(Opcode::Cas),
            0x11 => Some(Opcode::SetNoReply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u16)]
pub enum Status {
    Ok = 0x0000,
    NotFound = 0x0001,
    Exists = 0x0002,
    NotStored = 0x0003,
    TooLarge = 0x0004,
    ServerError = 0x0005,
}

impl Status {
    fn from_u16(v: u16) -> Self {
        match v {
            0x0000 => Status::Ok,
            0x0001 => Status::NotFound,
            0x0002 => Status::Exists,
            0x0003 => Status::NotStored,
            0x0004 => Status::TooLarge,
            _ => Status::ServerError,
        }
    }
}

/// Extras carried on `Add`/`Set`/`Cas` requests: the write-timestamp flags
/// and the backend-resolved expiration.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteExtras {
    pub flags: u32,
    pub expiration: u32,
}

/// A single request or response frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub opcode: Opcode,
    pub vbucket: u16,
    pub status: Status,
    pub opaque: u32,
    pub cas: u64,
    pub extras: WriteExtras,
    pub key: Bytes,
    pub value: Bytes,
}

impl Frame {
    pub fn request(opcode: Opcode, vbucket: u16, key: Bytes) -> Self {
        Self {
            opcode,
            vbucket,
            status: Status::Ok,
            opaque: 0,
            cas: 0,
            extras: WriteExtras::default(),
            key,
            value: Bytes::new(),
        }
    }

    pub fn with_value(mut self, value: Bytes) -> Self {
        self.value = value;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_extras(mut self, extras: WriteExtras) -> Self {
        self.extras = extras;
        self
    }
}

/// Encoder/decoder for the 24-byte-header binary frame.
pub struct BinaryCodec;

impl Encoder<Frame> for BinaryCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> std::io::Result<()> {
        let extras_len: u8 = match frame.opcode {
            Opcode::Add | Opcode::Set | Opcode::Cas | Opcode::SetNoReply => 8,
            _ => 0,
        };
        let key_len = frame.key.len() as u16;
        let body_len = extras_len as u32 + key_len as u32 + frame.value.len() as u32;

        dst.put_u8(MAGIC_REQUEST);
        dst.put_u8(frame.opcode as u8);
        dst.put_u16(key_len);
        dst.put_u8(extras_len);
        dst.put_u8(0); // data type, unused
        dst.put_u16(frame.vbucket);
        dst.put_u32(body_len);
        dst.put_u32(frame.opaque);
        dst.put_u64(frame.cas);

        if extras_len > 0 {
            dst.put_u32(frame.extras.flags);
            dst.put_u32(frame.extras.expiration);
        }
        dst.extend_from_slice(&frame.key);
        dst.extend_from_slice(&frame.value);

        Ok(())
    }
}

impl Decoder for BinaryCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<Frame>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let magic = src[0];
        if magic != MAGIC_RESPONSE && magic != MAGIC_REQUEST {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "bad frame magic",
            ));
        }
        let opcode = Opcode::from_u8(src[1]).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "unknown opcode")
        })?;
        let key_len = u16::from_be_bytes([src[2], src[3]]) as usize;
        let extras_len = src[4] as usize;
        let status_or_vbucket = u16::from_be_bytes([src[6], src[7]]);
        let body_len = u32::from_be_bytes([src[8], src[9], src[10], src[11]]) as usize;
        let opaque = u32::from_be_bytes([src[12], src[13], src[14], src[15]]);
        let cas = u64::from_be_bytes([
            src[16], src[17], src[18], src[19], src[20], src[21], src[22], src[23],
        ]);

        if src.len() < HEADER_LEN + body_len {
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let extras_bytes = src.split_to(extras_len);
        let key = src.split_to(key_len).freeze();
        let value_len = body_len - extras_len - key_len;
        let value = src.split_to(value_len).freeze();

        let extras = if extras_len >= 8 {
            WriteExtras {
                flags: u32::from_be_bytes([
                    extras_bytes[0],
                    extras_bytes[1],
                    extras_bytes[2],
                    extras_bytes[3],
                ]),
                expiration: u32::from_be_bytes([
                    extras_bytes[4],
                    extras_bytes[5],
                    extras_bytes[6],
                    extras_bytes[7],
                ]),
            }
        } else {
            WriteExtras::default()
        };

        let (status, vbucket) = if magic == MAGIC_RESPONSE {
            (Status::from_u16(status_or_vbucket), 0)
        } else {
            (Status::Ok, status_or_vbucket)
        };

        Ok(Some(Frame {
            opcode,
            vbucket,
            status,
            opaque,
            cas,
            extras,
            key,
            value,
        }))
    }
}
