//! Lifecycle of one ide server instance.
//!
//! ```text
//! Uninitialized -> Restoring -> Launching -> Ready -> Draining -> Stopped
//!                      \______________\_______> Failed
//! ```
//!
//! Startup restores the data directory in the foreground while a single
//! background task restores the workspace, launches the server, then waits until
//! it accepts TCP connections. Shutdown archives both directories back to the
//! object store, one after the other, and reports each outcome.

pub mod descriptor;
pub mod launch;
pub mod probe;
pub mod transfer;

use std::{fmt, sync::Arc, time::Duration};

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::IdeError;
use crate::storage::ObjectStore;

pub use descriptor::ServerDescriptor;
pub use launch::{CommandLauncher, Launcher, ProcessHandle, launch_args};
pub use probe::{ReadinessOptions, wait_until_reachable};
pub use transfer::{RestoreOutcome, SaveOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Restoring,
    Launching,
    Ready,
    Draining,
    Stopped,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Restoring => "restoring",
            LifecycleState::Launching => "launching",
            LifecycleState::Ready => "ready",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of [`IdeServer::shutdown`]. Each directory is saved independently.
#[derive(Debug)]
pub struct ShutdownReport {
    pub data: Result<SaveOutcome, IdeError>,
    pub workspace: Result<SaveOutcome, IdeError>,
}

impl ShutdownReport {
    pub fn is_complete(&self) -> bool {
        self.data.is_ok() && self.workspace.is_ok()
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn outcome(res: &Result<SaveOutcome, IdeError>) -> String {
            match res {
                Ok(saved) => saved.to_string(),
                Err(e) => e.to_string(),
            }
        }
        write!(
            f,
            "data: {}; workspace: {}",
            outcome(&self.data),
            outcome(&self.workspace)
        )
    }
}

pub struct IdeServer {
    descriptor: ServerDescriptor,
    store: Arc<dyn ObjectStore>,
    launcher: Arc<dyn Launcher>,
    readiness: ReadinessOptions,
    state: watch::Sender<LifecycleState>,
    process: Mutex<Option<ProcessHandle>>,
    cancel: CancellationToken,
}

impl IdeServer {
    pub fn new(
        descriptor: ServerDescriptor,
        store: Arc<dyn ObjectStore>,
        launcher: Arc<dyn Launcher>,
        readiness: ReadinessOptions,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            descriptor,
            store,
            launcher,
            readiness,
            state,
            process: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let readiness = ReadinessOptions {
            interval: config.ide.poll_interval(),
            timeout: config.ide.ready_timeout(),
        };
        Self::new(
            ServerDescriptor::from_config(config),
            store,
            launcher,
            readiness,
        )
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Abort a readiness wait in progress. Later startups are cancelled at once.
    pub fn cancel_startup(&self) {
        self.cancel.cancel();
    }

    pub async fn process_id(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(ProcessHandle::id)
    }

    /// Move to `next` if the current state is one of `allowed`.
    fn transition(
        &self,
        allowed: &[LifecycleState],
        next: LifecycleState,
    ) -> Result<(), IdeError> {
        let mut rejected = None;
        self.state.send_if_modified(|state| {
            if allowed.contains(state) {
                *state = next;
                true
            } else {
                rejected = Some(*state);
                false
            }
        });
        match rejected {
            None => {
                tracing::info!("Ide server {} is {next}", self.descriptor.addr());
                Ok(())
            }
            Some(actual) => Err(IdeError::InvalidState {
                expected: allowed[0],
                actual,
            }),
        }
    }

    fn set_state(&self, next: LifecycleState) {
        self.state.send_replace(next);
        tracing::info!("Ide server {} is {next}", self.descriptor.addr());
    }

    /// Restore both directories, launch the server and wait until it is reachable.
    ///
    /// Allowed from `Uninitialized` and, to retry, from `Failed`. On failure the
    /// launched process is killed and the state becomes `Failed`.
    pub async fn startup(&self) -> Result<(), IdeError> {
        self.transition(
            &[LifecycleState::Uninitialized, LifecycleState::Failed],
            LifecycleState::Restoring,
        )?;

        match self.run_startup().await {
            Ok(waited) => {
                self.set_state(LifecycleState::Ready);
                tracing::info!(
                    "Ide server {} accepted connections after {waited:?}",
                    self.descriptor.addr()
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Start ide server {} failed: {e}", self.descriptor.addr());
                if let Some(mut process) = self.process.lock().await.take() {
                    process.kill();
                }
                self.set_state(LifecycleState::Failed);
                Err(e)
            }
        }
    }

    async fn run_startup(&self) -> Result<Duration, IdeError> {
        let store = Arc::clone(&self.store);
        let key = self.descriptor.workspace_key.clone();
        let dir = self.descriptor.workspace_dir.clone();
        let workspace =
            tokio::spawn(async move { transfer::restore(store.as_ref(), &key, &dir).await });

        let foreground = async {
            let data = transfer::restore(
                self.store.as_ref(),
                &self.descriptor.data_key,
                &self.descriptor.data_dir,
            )
            .await?;
            tracing::info!("Data directory: {data}");

            self.set_state(LifecycleState::Launching);
            let process = self.launcher.launch(&self.descriptor)?;
            *self.process.lock().await = Some(process);

            wait_until_reachable(&self.descriptor.addr(), self.readiness, &self.cancel).await
        }
        .await;

        let workspace = workspace.await;
        let waited = foreground.inspect_err(|_| {
            if let Ok(Err(e)) = &workspace {
                tracing::error!("Restore workspace failed as well: {e}");
            }
        })?;
        let outcome = workspace??;
        tracing::info!("Workspace directory: {outcome}");
        Ok(waited)
    }

    /// Save both directories. Allowed once, from `Ready`.
    ///
    /// A failed save is recorded in the report and does not stop the other one.
    /// The server process is left running.
    pub async fn shutdown(&self) -> Result<ShutdownReport, IdeError> {
        self.transition(&[LifecycleState::Ready], LifecycleState::Draining)?;

        let data = transfer::save(
            self.store.as_ref(),
            &self.descriptor.data_dir,
            &self.descriptor.data_key,
        )
        .await
        .inspect_err(|e| tracing::error!("Save data directory failed: {e}"));
        let workspace = transfer::save(
            self.store.as_ref(),
            &self.descriptor.workspace_dir,
            &self.descriptor.workspace_key,
        )
        .await
        .inspect_err(|e| tracing::error!("Save workspace directory failed: {e}"));

        self.set_state(LifecycleState::Stopped);
        let report = ShutdownReport { data, workspace };
        tracing::info!("Shutdown ide server {}: {report}", self.descriptor.addr());
        Ok(report)
    }
}
