use std::process::Stdio;

use tokio::process::{Child, Command};

use super::descriptor::ServerDescriptor;
use crate::error::IdeError;

/// Starts the ide server process for a descriptor.
pub trait Launcher: Send + Sync {
    fn launch(&self, descriptor: &ServerDescriptor) -> Result<ProcessHandle, IdeError>;
}

/// A launched ide server. Dropping the handle leaves the process running.
#[derive(Debug, Default)]
pub struct ProcessHandle {
    child: Option<Child>,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    /// A handle for a server whose process is not owned by this manager.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub(crate) fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Kill ide server process {:?} failed: {e}", child.id());
            }
        }
    }
}

/// Runs the `openvscode-server` compatible binary of the descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

pub fn launch_args(descriptor: &ServerDescriptor) -> Vec<String> {
    vec![
        format!("--host={}", descriptor.host),
        format!("--port={}", descriptor.port),
        format!("--user-data-dir={}", descriptor.user_data_dir().display()),
        format!("--server-data-dir={}", descriptor.server_data_dir().display()),
        format!("--extensions-dir={}", descriptor.extensions_dir().display()),
        "--without-connection-token".to_string(),
        "--start-server".to_string(),
        "--telemetry-level=off".to_string(),
        format!("--default-folder={}", descriptor.workspace_dir.display()),
    ]
}

impl Launcher for CommandLauncher {
    fn launch(&self, descriptor: &ServerDescriptor) -> Result<ProcessHandle, IdeError> {
        let args = launch_args(descriptor);
        let command_line = format!("{} {}", descriptor.binary.display(), args.join(" "));

        let child = Command::new(&descriptor.binary)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| {
                tracing::error!("Launch ide server failed. cmd: {command_line} error: {source}");
                IdeError::Launch {
                    command: command_line.clone(),
                    source,
                }
            })?;

        tracing::info!(
            "Launch ide server succeeded. pid: {:?} cmd: {command_line}",
            child.id()
        );
        Ok(ProcessHandle::new(child))
    }
}
