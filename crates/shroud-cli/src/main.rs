//! shroud CLI - run a container through the engine phases

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use shroud_core::config::{ContainerFile, default_socket_path};
use shroud_core::crypt::{CryptSetup, LazyUnmount};
use shroud_core::engine::Teardown;
use shroud_core::instance::InstanceDir;
use shroud_core::isolation::{CgroupFs, ThreadPrivilege};
use shroud_core::network::IpNetns;
use shroud_core::ops::{LocalOps, PrivilegedOps, RpcClient};
use shroud_core::{Engine, ShroudError};
use std::os::unix::fs::MetadataExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitCode, ExitStatus};

/// Exit status after a failing `%pre` or `%setup` script
const HOOK_FAILURE: u8 = 255;

const INSTANCE_ROOT: &str = "/var/lib/shroud/instances";

#[derive(Parser)]
#[command(name = "shroud")]
#[command(author, version, about = "Container execution engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the container root and chroot into it
    Create {
        /// Container description (JSON)
        #[arg(short, long)]
        config: PathBuf,

        #[command(flatten)]
        privileges: Privileges,
    },

    /// Exec the container process
    Start {
        /// Container description (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Create then start in this process, cleaning up if creation fails
    Run {
        /// Container description (JSON)
        #[arg(short, long)]
        config: PathBuf,

        #[command(flatten)]
        privileges: Privileges,
    },

    /// Tear down what a container left behind
    Cleanup {
        /// Container description (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Raw wait status of the container process
        #[arg(long, default_value = "0")]
        status: i32,

        /// Root of the instance registry
        #[arg(long, default_value = INSTANCE_ROOT)]
        instance_dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct Privileges {
    /// Socket of the helper started for this container (defaults to
    /// SHROUD_HELPER_SOCKET env var or /run/shroud/helper.sock)
    #[arg(short, long, conflicts_with = "local")]
    socket: Option<PathBuf>,

    /// Perform mounts in this process instead of asking the helper
    #[arg(long)]
    local: bool,
}

impl Privileges {
    fn open(&self) -> Result<Box<dyn PrivilegedOps>> {
        if self.local {
            return Ok(Box::new(LocalOps::new()?));
        }
        let socket = self.socket.clone().unwrap_or_else(default_socket_path);
        let client = RpcClient::connect(&socket)
            .with_context(|| format!("connecting to helper at {}", socket.display()))?;
        Ok(Box::new(client))
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("shroud=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    Ok(match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "shroud failed");
            ExitCode::from(exit_status(&e))
        }
    })
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ShroudError>() {
        Some(e) if e.is_fatal_hook() => HOOK_FAILURE,
        _ => 1,
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Create { config, privileges } => {
            let engine = load(&config)?;
            create(&engine, &privileges)
        }

        Commands::Start { config } => {
            let engine = load(&config)?;
            match engine.start_process() {
                Err(e) => Err(e.into()),
            }
        }

        Commands::Run { config, privileges } => {
            let engine = load(&config)?;
            if let Err(e) = create(&engine, &privileges) {
                return Err(abandon(&engine, e, Path::new(INSTANCE_ROOT)));
            }
            match engine.start_process() {
                Err(e) => Err(e.into()),
            }
        }

        Commands::Cleanup {
            config,
            status,
            instance_dir,
        } => {
            let engine = load(&config)?;
            cleanup(&engine, None, ExitStatus::from_raw(status), &instance_dir)
        }
    }
}

/// Create the container and check that this process now runs inside it.
///
/// Bind mounts keep the rootfs inode, so the new root must be the same
/// file as the rootfs was before creation.
fn create(engine: &Engine, privileges: &Privileges) -> Result<()> {
    // A missing rootfs is reported by creation itself
    let before = std::fs::metadata(&engine.config().rootfs).ok();

    let mut ops = privileges.open()?;
    engine.create_container(&mut *ops)?;

    let root = std::fs::metadata("/")?;
    if before.is_some_and(|before| !same_file(&before, &root)) {
        bail!(
            "container {} was not entered: the privileged helper must share this process's filesystem context",
            engine.common().container_id
        );
    }
    Ok(())
}

fn same_file(a: &std::fs::Metadata, b: &std::fs::Metadata) -> bool {
    (a.dev(), a.ino()) == (b.dev(), b.ino())
}

/// Clean up after a failed creation. The creation error is what the
/// caller sees; a cleanup failure is only logged.
fn abandon(engine: &Engine, err: anyhow::Error, instance_dir: &Path) -> anyhow::Error {
    let fatal = err.downcast_ref::<ShroudError>();
    if let Err(e) = cleanup(engine, fatal, ExitStatus::from_raw(0), instance_dir) {
        tracing::error!(error = format!("{e:#}"), "cleanup after failed creation");
    }
    err
}

fn load(path: &Path) -> Result<Engine> {
    let file = ContainerFile::load(path)
        .with_context(|| format!("loading container description {}", path.display()))?;
    Ok(Engine::new(file.common, file.engine))
}

fn cleanup(
    engine: &Engine,
    fatal: Option<&ShroudError>,
    status: ExitStatus,
    instance_dir: &Path,
) -> Result<()> {
    let escalator = ThreadPrivilege::current();
    let network = IpNetns::default();
    let instances = InstanceDir::new(instance_dir);
    let crypt = CryptSetup::default();
    let teardown = Teardown {
        escalator: &escalator,
        network: &network,
        cgroup: &CgroupFs,
        instances: &instances,
        unmounter: &LazyUnmount,
        crypt: &crypt,
    };

    let report = engine.cleanup_container(fatal, status, &teardown)?;
    for outcome in report.failures() {
        if let Some(err) = &outcome.error {
            tracing::warn!(step = outcome.step.name(), error = %err, "left behind");
        }
    }
    tracing::info!(
        attempted = report.steps.len(),
        clean = report.is_clean(),
        "cleanup finished"
    );
    Ok(())
}
