//! Privileged operations needed to assemble a container root
//!
//! - `local` - direct syscalls, for callers already holding `CAP_SYS_ADMIN`
//! - `rpc` - requests forwarded to a privileged helper over a Unix socket

pub mod local;
pub mod rpc;

pub use self::local::LocalOps;
pub use self::rpc::RpcClient;

use crate::Result;
use crate::protocol::MountRequest;
use std::path::Path;

/// Mount and chroot capability used by the mount orchestrator.
///
/// Implementations are closed exactly once, after the final chroot.
pub trait PrivilegedOps {
    /// Perform one mount, returning the peer-defined result code
    fn mount(&mut self, req: &MountRequest) -> Result<i32>;

    /// Change root to `path`
    fn chroot(&mut self, path: &Path) -> Result<i32>;

    /// Release the capability. Calling it twice is an error.
    fn close(&mut self) -> Result<()>;
}
