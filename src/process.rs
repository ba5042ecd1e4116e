use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use sysinfo::System;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Process name of the web helper on Windows.
const HELPER_PROCESS: &str = "spotifywebhelper.exe";

/// Makes sure the local service process is up before the handshake.
///
/// `Ok(false)` means the check ran and the service is not running.
#[async_trait]
pub trait ServiceProcess: Send + Sync {
    async fn ensure_running(&self) -> Result<bool>;
}

/// For platforms where liveness cannot be checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeRunning;

#[async_trait]
impl ServiceProcess for AssumeRunning {
    async fn ensure_running(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Looks for the helper in the process table and starts it, detached, when
/// it is missing.
#[derive(Debug, Clone)]
pub struct LaunchIfMissing {
    process_name: String,
    executable: Option<PathBuf>,
}

impl LaunchIfMissing {
    pub fn new(process_name: impl Into<String>, executable: Option<PathBuf>) -> Self {
        Self {
            process_name: process_name.into(),
            executable,
        }
    }

    /// The Windows web helper installed under the user's roaming profile.
    pub fn web_helper() -> Self {
        let executable = std::env::var_os("USERPROFILE").map(|home| {
            PathBuf::from(home)
                .join("AppData")
                .join("Roaming")
                .join("Spotify")
                .join("Data")
                .join("SpotifyWebHelper.exe")
        });
        Self::new(HELPER_PROCESS, executable)
    }

    async fn is_running(&self) -> Result<bool> {
        let wanted = self.process_name.to_lowercase();
        tokio::task::spawn_blocking(move || {
            let mut sys = System::new();
            sys.refresh_processes();
            sys.processes()
                .values()
                .any(|p| p.name().to_lowercase().contains(&wanted))
        })
        .await
        .map_err(|e| Error::Process(e.to_string()))
    }
}

#[async_trait]
impl ServiceProcess for LaunchIfMissing {
    async fn ensure_running(&self) -> Result<bool> {
        if self.is_running().await? {
            debug!(process = %self.process_name, "web helper already running");
            return Ok(true);
        }
        let exe = self
            .executable
            .as_ref()
            .ok_or_else(|| Error::Process("failed to locate the web helper executable".into()))?;
        info!(path = %exe.display(), "starting web helper");
        let child = detached_command(exe)
            .spawn()
            .map_err(|e| Error::Process(format!("failed to start {}: {e}", exe.display())))?;
        debug!(pid = child.id(), "web helper launched");
        Ok(true)
    }
}

/// A command for `exe` that outlives us: no inherited stdio, its own process
/// group, and on Windows no console of ours.
fn detached_command(exe: &Path) -> Command {
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd
}

/// The liveness check suited to the current platform.
pub fn platform_default() -> Arc<dyn ServiceProcess> {
    if cfg!(windows) {
        Arc::new(LaunchIfMissing::web_helper())
    } else {
        Arc::new(AssumeRunning)
    }
}
