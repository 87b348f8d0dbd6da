//! Unix socket server
//!
//! A helper serves exactly one engine. Its chroot lands on the filesystem
//! context it shares with that engine, so after the first connection is
//! accepted the listener is closed and its socket unlinked, and after a
//! chroot nothing else is performed.

use parking_lot::Mutex;
use shroud_core::ops::PrivilegedOps;
use shroud_core::protocol::{self, Request, Response};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
};

struct Session<O> {
    ops: O,
    chrooted: bool,
}

/// Executes requests one at a time; mount and chroot act on
/// process-global state.
pub struct Dispatcher<O> {
    session: Mutex<Session<O>>,
}

impl<O: PrivilegedOps> Dispatcher<O> {
    pub fn new(ops: O) -> Self {
        Self {
            session: Mutex::new(Session {
                ops,
                chrooted: false,
            }),
        }
    }

    /// Perform a single request
    pub fn handle(&self, request: Request) -> Response {
        let mut session = self.session.lock();
        if session.chrooted {
            tracing::warn!(?request, "request after chroot refused");
            return Response::Error {
                message: "container root already entered".into(),
            };
        }

        match request {
            Request::Mount(req) => {
                tracing::debug!(
                    source = %req.source.display(),
                    target = %req.target.display(),
                    fstype = %req.fstype,
                    "mount"
                );
                match session.ops.mount(&req) {
                    Ok(code) => Response::Mount { code },
                    Err(e) => failure(&e),
                }
            }
            Request::Chroot { path } => {
                tracing::debug!(path = %path.display(), "chroot");
                match session.ops.chroot(&path) {
                    Ok(code) => {
                        session.chrooted = true;
                        Response::Chroot { code }
                    }
                    Err(e) => failure(&e),
                }
            }
            Request::Ping => Response::Pong,
        }
    }
}

fn failure(err: &shroud_core::ShroudError) -> Response {
    tracing::warn!(error = %err, "request failed");
    Response::Error {
        message: err.to_string(),
    }
}

/// Serve the first engine that connects, until it disconnects or
/// `shutdown` resolves. Later connections are refused.
pub async fn run<O, S>(
    listener: UnixListener,
    dispatcher: Arc<Dispatcher<O>>,
    shutdown: S,
) -> anyhow::Result<()>
where
    O: PrivilegedOps + Send + 'static,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let socket = listener.local_addr()?.as_pathname().map(Path::to_path_buf);
    let accepted = tokio::select! {
        () = &mut shutdown => None,
        accepted = listener.accept() => Some(accepted?.0),
    };

    // Unlink while the path still resolves against the host root
    drop(listener);
    if let Some(Err(e)) = socket.as_deref().map(std::fs::remove_file) {
        tracing::warn!(error = %e, "failed to remove socket");
    }

    let Some(stream) = accepted else {
        return Ok(());
    };
    tracing::info!("engine connected");

    tokio::select! {
        () = &mut shutdown => Ok(()),
        served = handle_connection(stream, dispatcher) => served,
    }
}

/// Handle a single engine connection
async fn handle_connection<O>(
    mut stream: UnixStream,
    dispatcher: Arc<Dispatcher<O>>,
) -> anyhow::Result<()>
where
    O: PrivilegedOps + Send + 'static,
{
    loop {
        // Read length prefix (4 bytes, big-endian)
        let mut header = [0u8; 4];
        if stream.read_exact(&mut header).await.is_err() {
            break; // Engine disconnected
        }
        let len = protocol::frame_len(header)?;

        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;

        let request: Request = protocol::decode(&buf)?;

        let dispatcher = Arc::clone(&dispatcher);
        let response = tokio::task::spawn_blocking(move || dispatcher.handle(request)).await?;

        let body = protocol::encode(&response)?;
        stream.write_all(&protocol::frame_header(body.len())?).await?;
        stream.write_all(&body).await?;
    }

    tracing::debug!("connection closed");
    Ok(())
}
