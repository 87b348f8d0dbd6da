//! Wire protocol between an engine and its privileged helper
//!
//! Every message is a 4-byte big-endian length prefix followed by a msgpack
//! body. Requests and responses strictly alternate on one connection.

use crate::{Result, ShroudError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;

/// Largest frame either side accepts
pub const MAX_FRAME: usize = 1024 * 1024;

/// Parameters of one `mount(2)` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRequest {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Filesystem type, empty for bind mounts
    pub fstype: String,
    /// Raw `MS_*` flag bits
    pub flags: u64,
    /// Filesystem-specific options, empty for none
    pub data: String,
}

/// Request types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Perform a mount
    Mount(MountRequest),
    /// Change root to `path`
    Chroot { path: PathBuf },
    /// Liveness check
    Ping,
}

/// Response types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Mount result code
    Mount { code: i32 },
    /// Chroot result code
    Chroot { code: i32 },
    /// Pong
    Pong,
    /// The peer failed to perform the request
    Error { message: String },
}

/// Encode a message to msgpack
pub fn encode<T: Serialize>(msg: &T) -> std::result::Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(msg)
}

/// Decode a message from msgpack
pub fn decode<'a, T: Deserialize<'a>>(data: &'a [u8]) -> std::result::Result<T, rmp_serde::decode::Error> {
    rmp_serde::from_slice(data)
}

/// Length prefix for a body of `len` bytes
pub fn frame_header(len: usize) -> Result<[u8; 4]> {
    if len > MAX_FRAME {
        return Err(ShroudError::Protocol(format!("frame too large: {len} bytes")));
    }
    let len = u32::try_from(len)
        .map_err(|_| ShroudError::Protocol(format!("frame too large: {len} bytes")))?;
    Ok(len.to_be_bytes())
}

/// Body length announced by a received prefix
pub fn frame_len(header: [u8; 4]) -> Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME {
        return Err(ShroudError::Protocol(format!("frame too large: {len} bytes")));
    }
    Ok(len)
}

/// Encode `msg` and write it as one frame
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<()> {
    let body = encode(msg).map_err(|e| ShroudError::Protocol(format!("encode failed: {e}")))?;
    writer.write_all(&frame_header(body.len())?)?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and decode it
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> Result<T> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let mut body = vec![0u8; frame_len(header)?];
    reader.read_exact(&mut body)?;
    decode(&body).map_err(|e| ShroudError::Protocol(format!("decode failed: {e}")))
}
