use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::config::Config;
use crate::error::IdeError;
use crate::server::{IdeServer, LifecycleState, Launcher};

pub struct AppState {
    pub config: Arc<Config>,
    pub launcher: Arc<dyn Launcher>,
    pub http: reqwest::Client,
    /// Held until a startup or shutdown has finished, even when the request that
    /// began it is gone.
    lifecycle: Arc<Mutex<()>>,
    server: RwLock<Option<Arc<IdeServer>>>,
}

impl AppState {
    pub fn new(config: Config, launcher: Arc<dyn Launcher>) -> Result<Self, IdeError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IdeError::Configuration(format!("build forwarding client: {e}")))?;
        Ok(Self {
            config: Arc::new(config),
            launcher,
            http,
            lifecycle: Arc::new(Mutex::new(())),
            server: RwLock::new(None),
        })
    }

    pub(crate) async fn lock_lifecycle(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.lifecycle).lock_owned().await
    }

    pub async fn server(&self) -> Option<Arc<IdeServer>> {
        self.server.read().await.clone()
    }

    pub(crate) async fn set_server(&self, server: Arc<IdeServer>) {
        *self.server.write().await = Some(server);
    }

    /// Base url of the ide server when it is ready for traffic.
    pub async fn upstream(&self) -> Option<String> {
        let server = self.server().await?;
        (server.state() == LifecycleState::Ready).then(|| server.descriptor().base_url())
    }

    /// Abort a startup that is waiting for the ide server.
    pub async fn cancel_startup(&self) {
        if let Some(server) = self.server().await {
            server.cancel_startup();
        }
    }
}
