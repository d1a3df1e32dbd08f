// src/core/connection.rs

//! A single connection to one backend server, and the connector that builds
//! one. Modeled on `ClusterClient`'s connect/send-and-receive shape, with the
//! timeout split into two phases: a short one while the process is still
//! bootstrapping its initial connections, and a longer one once steady state
//! is reached (long enough to tolerate a backend GC pause or a brief network
//! blip without flapping).

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::errors::{MeshKvError, Result};
use crate::core::protocol::{BinaryCodec, Frame, Opcode, Status, WriteExtras};

/// Connect timeout while the client has not yet established any connection
/// to this server (startup / reconnect-after-total-loss).
pub const LOCAL_MEMCACHED_CONNECTION_LATENCY_MS: u64 = 80;
/// Connect timeout once the client has previously connected successfully
/// (steady state): generous enough to ride out transient backend hiccups.
pub const REMOTE_MEMCACHED_CONNECTION_LATENCY_MS: u64 = 250;

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// The result of a read against the backend.
#[derive(Debug, Clone)]
pub enum GetResult {
    Found { value: Bytes, cas: u64, flags: u32 },
    NotFound,
}

/// The result of a conditional or unconditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Stored,
    /// `add` lost the race: the key already exists.
    AlreadyExists,
    /// `cas`/`set` lost the race: the CAS token is stale.
    CasMismatch,
    /// A conditional write targeted a key that no longer exists.
    NotFound,
}

/// What a single backend server is addressed by — the form used for both
/// connection-cache keys and log output.
pub type ServerIdentity = String;

/// One connection to one backend server. All operations are vbucket-scoped;
/// the caller (connection cache / client state machine) is responsible for
/// routing to the right connection in the first place.
#[async_trait]
pub trait BackendConnection: Send {
    async fn get(&mut self, vbucket: u16, key: &[u8]) -> Result<GetResult>;

    /// `cas == 0` means "add if absent, overwriting a tombstone if present".
    async fn add_or_cas(
        &mut self,
        vbucket: u16,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiration: u32,
        cas: u64,
    ) -> Result<WriteResult>;

    /// Unconditional overwrite that waits for a reply, used where a
    /// definitive per-replica result is needed (e.g. a tombstone write).
    async fn set(
        &mut self,
        vbucket: u16,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiration: u32,
    ) -> Result<WriteResult>;

    /// Unconditional overwrite, fire-and-forget: the backend is not expected
    /// to acknowledge this request.
    async fn set_noreply(
        &mut self,
        vbucket: u16,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiration: u32,
    ) -> Result<()>;

    async fn delete(&mut self, vbucket: u16, key: &[u8]) -> Result<WriteResult>;
}

pub struct TcpBackendConnection {
    identity: ServerIdentity,
    stream: TcpStream,
    codec: BinaryCodec,
    next_opaque: u32,
}

impl TcpBackendConnection {
    fn next_opaque(&mut self) -> u32 {
        self.next_opaque = self.next_opaque.wrapping_add(1);
        self.next_opaque
    }

    async fn send_and_receive(&mut self, frame: Frame) -> Result<Frame> {
        let mut write_buf = BytesMut::new();
        self.codec
            .encode(frame, &mut write_buf)
            .map_err(|e| MeshKvError::Transport(e.to_string()))?;

        tokio::time::timeout(WRITE_TIMEOUT, self.stream.write_all(&write_buf))
            .await
            .map_err(|_| MeshKvError::Timeout)?
            .map_err(|e| MeshKvError::Transport(e.to_string()))?;

        let mut read_buf = BytesMut::with_capacity(512);
        loop {
            let read_fut = self.stream.read_buf(&mut read_buf);
            match tokio::time::timeout(READ_TIMEOUT, read_fut).await {
                Ok(Ok(0)) => {
                    return Err(MeshKvError::Transport(format!(
                        "connection to '{}' closed by peer",
                        self.identity
                    )));
                }
                Ok(Ok(_)) => {
                    if let Some(reply) = self
                        .codec
                        .decode(&mut read_buf)
                        .map_err(|e| MeshKvError::Transport(e.to_string()))?
                    {
                        return Ok(reply);
                    }
                }
                Ok(Err(e)) => return Err(MeshKvError::Transport(e.to_string())),
                Err(_) => return Err(MeshKvError::Timeout),
            }
        }
    }

    async fn send_noreply(&mut self, frame: Frame) -> Result<()> {
        let mut write_buf = BytesMut::new();
        self.codec
            .encode(frame, &mut write_buf)
            .map_err(|e| MeshKvError::Transport(e.to_string()))?;

        tokio::time::timeout(WRITE_TIMEOUT, self.stream.write_all(&write_buf))
            .await
            .map_err(|_| MeshKvError::Timeout)?
            .map_err(|e| MeshKvError::Transport(e.to_string()))
    }
}

#[async_trait]
impl BackendConnection for TcpBackendConnection {
    async fn get(&mut self, vbucket: u16, key: &[u8]) -> Result<GetResult> {
        let opaque = self.next_opaque();
        let mut frame = Frame::request(Opcode::Get, vbucket, Bytes::copy_from_slice(key));
        frame.opaque = opaque;

        let reply = self.send_and_receive(frame).await?;
        match reply.status {
            Status::Ok => Ok(GetResult::Found {
                value: reply.value,
                cas: reply.cas,
                flags: reply.extras.flags,
            }),
            Status::NotFound => Ok(GetResult::NotFound),
            other => Err(MeshKvError::Transport(format!("unexpected GET status: {other}"))),
        }
    }

    async fn add_or_cas(
        &mut self,
        vbucket: u16,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiration: u32,
        cas: u64,
    ) -> Result<WriteResult> {
        let opcode = if cas == 0 { Opcode::Add } else { Opcode::Cas };
        let opaque = self.next_opaque();
        let mut frame = Frame::request(opcode, vbucket, Bytes::copy_from_slice(key))
            .with_value(Bytes::copy_from_slice(value))
            .with_cas(cas)
            .with_extras(WriteExtras { flags, expiration });
        frame.opaque = opaque;

        let reply = self.send_and_receive(frame).await?;
        match reply.status {
            Status::Ok => Ok(WriteResult::Stored),
            Status::Exists if cas == 0 => Ok(WriteResult::AlreadyExists),
            Status::Exists => Ok(WriteResult::CasMismatch),
            Status::NotFound => Ok(WriteResult::NotFound),
            other => Err(MeshKvError::Transport(format!("unexpected write status: {other}"))),
        }
    }

    async fn set(
        &mut self,
        vbucket: u16,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiration: u32,
    ) -> Result<WriteResult> {
        let opaque = self.next_opaque();
        let mut frame = Frame::request(Opcode::Set, vbucket, Bytes::copy_from_slice(key))
            .with_value(Bytes::copy_from_slice(value))
            .with_extras(WriteExtras { flags, expiration });
        frame.opaque = opaque;

        let reply = self.send_and_receive(frame).await?;
        match reply.status {
            Status::Ok => Ok(WriteResult::Stored),
            other => Err(MeshKvError::Transport(format!("unexpected SET status: {other}"))),
        }
    }

    async fn set_noreply(
        &mut self,
        vbucket: u16,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiration: u32,
    ) -> Result<()> {
        let opaque = self.next_opaque();
        let mut frame = Frame::request(Opcode::SetNoReply, vbucket, Bytes::copy_from_slice(key))
            .with_value(Bytes::copy_from_slice(value))
            .with_extras(WriteExtras { flags, expiration });
        frame.opaque = opaque;

        self.send_noreply(frame).await
    }

    async fn delete(&mut self, vbucket: u16, key: &[u8]) -> Result<WriteResult> {
        let opaque = self.next_opaque();
        let mut frame = Frame::request(Opcode::Delete, vbucket, Bytes::copy_from_slice(key));
        frame.opaque = opaque;

        let reply = self.send_and_receive(frame).await?;
        match reply.status {
            Status::Ok => Ok(WriteResult::Stored),
            Status::NotFound => Ok(WriteResult::NotFound),
            other => Err(MeshKvError::Transport(format!("unexpected DELETE status: {other}"))),
        }
    }
}

/// Builds backend connections for a server identity, splitting the connect
/// timeout by whether the caller has ever connected successfully before.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        identity: &ServerIdentity,
        has_connected_before: bool,
    ) -> Result<Box<dyn BackendConnection>>;
}

pub struct TcpConnector;

impl TcpConnector {
    fn timeout_for(has_connected_before: bool) -> Duration {
        let millis = if has_connected_before {
            REMOTE_MEMCACHED_CONNECTION_LATENCY_MS
        } else {
            LOCAL_MEMCACHED_CONNECTION_LATENCY_MS
        };
        Duration::from_millis(millis)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        identity: &ServerIdentity,
        has_connected_before: bool,
    ) -> Result<Box<dyn BackendConnection>> {
        let addr: SocketAddr = identity
            .parse()
            .map_err(|_| MeshKvError::NoConnection(identity.clone()))?;

        let stream = tokio::time::timeout(Self::timeout_for(has_connected_before), TcpStream::connect(addr))
            .await
            .map_err(|_| MeshKvError::Timeout)?
            .map_err(MeshKvError::from)?;

        stream.set_nodelay(true).ok();

        Ok(Box::new(TcpBackendConnection {
            identity: identity.clone(),
            stream,
            codec: BinaryCodec,
            next_opaque: 0,
        }))
    }
}
