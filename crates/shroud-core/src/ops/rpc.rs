//! Client side of the privileged helper channel

use super::PrivilegedOps;
use crate::protocol::{self, MountRequest, Request, Response};
use crate::{Result, ShroudError};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Blocking request/response client for a privileged helper
#[derive(Debug)]
pub struct RpcClient {
    stream: Option<UnixStream>,
}

impl RpcClient {
    /// Connect to the helper listening at `path` and check that it answers
    pub fn connect(path: &Path) -> Result<Self> {
        tracing::debug!(socket = %path.display(), "connecting to privileged helper");
        let stream = UnixStream::connect(path).map_err(|e| {
            ShroudError::Channel(format!("failed to connect to {}: {e}", path.display()))
        })?;
        Self::from_stream(stream)
    }

    /// Wrap a transport the supervisor already established
    pub fn from_stream(stream: UnixStream) -> Result<Self> {
        let mut client = Self {
            stream: Some(stream),
        };
        client.ping()?;
        Ok(client)
    }

    /// Round-trip a `Ping`
    pub fn ping(&mut self) -> Result<()> {
        match self.call(&Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn call(&mut self, request: &Request) -> Result<Response> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ShroudError::Channel("connection already closed".into()))?;

        protocol::write_message(stream, request).map_err(transport)?;
        protocol::read_message(stream).map_err(transport)
    }
}

impl PrivilegedOps for RpcClient {
    fn mount(&mut self, req: &MountRequest) -> Result<i32> {
        match self.call(&Request::Mount(req.clone()))? {
            Response::Mount { code } => Ok(code),
            Response::Error { message } => Err(ShroudError::Mount(format!(
                "remote mount of {} on {} failed: {message}",
                req.source.display(),
                req.target.display()
            ))),
            other => Err(unexpected(&other)),
        }
    }

    fn chroot(&mut self, path: &Path) -> Result<i32> {
        let request = Request::Chroot {
            path: path.to_path_buf(),
        };
        match self.call(&request)? {
            Response::Chroot { code } => Ok(code),
            Response::Error { message } => Err(ShroudError::Chroot(format!(
                "remote chroot to {} failed: {message}",
                path.display()
            ))),
            other => Err(unexpected(&other)),
        }
    }

    fn close(&mut self) -> Result<()> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| ShroudError::Channel("connection already closed".into()))?;
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // the peer hung up first; nothing left to release
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(ShroudError::Channel(format!(
                "can't close connection with privileged helper: {e}"
            ))),
        }
    }
}

fn transport(err: ShroudError) -> ShroudError {
    match err {
        ShroudError::Io(e) => ShroudError::Channel(format!("transport failure: {e}")),
        other => other,
    }
}

fn unexpected(response: &Response) -> ShroudError {
    ShroudError::Protocol(format!("unexpected response {response:?}"))
}
