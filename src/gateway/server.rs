use crate::access::TokenRegistry;
use crate::config::{ExternalAccessConfig, EXTERNAL_BIND_HOST};
use crate::error::Result;
use crate::gateway::port::bind_first_available;
use crate::gateway::routes;
use crate::storage::{load_setting, save_setting, SettingsStore};
use crate::vault::SecretStore;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Settings key holding the last port the service bound.
pub const EXTERNAL_PORT_SETTING: &str = "api-vault-external-port";

/// Shared state for request handlers.
#[derive(Clone)]
pub struct ExternalAccessState {
    pub store: Arc<SecretStore>,
    pub tokens: Arc<TokenRegistry>,
}

/// Token-gated localhost HTTP access to the vault.
///
/// At most one listener is live per service: [`start`](Self::start) takes
/// the previous [`ServiceHandle`] and stops it before binding again.
pub struct ExternalAccessService {
    state: ExternalAccessState,
    settings: Arc<dyn SettingsStore>,
    config: ExternalAccessConfig,
}

impl ExternalAccessService {
    pub fn new(
        store: Arc<SecretStore>,
        tokens: Arc<TokenRegistry>,
        settings: Arc<dyn SettingsStore>,
        config: ExternalAccessConfig,
    ) -> Self {
        Self {
            state: ExternalAccessState { store, tokens },
            settings,
            config,
        }
    }

    /// Port the next [`start`](Self::start) will try first.
    ///
    /// The last bound port wins over the configured one, unless it falls
    /// above `maxPort`. An ephemeral configuration (port 0) accepts any saved
    /// port.
    pub async fn preferred_port(&self) -> Result<u16> {
        let persisted: Option<u16> =
            load_setting(self.settings.as_ref(), EXTERNAL_PORT_SETTING, None).await?;

        match persisted {
            Some(port) if self.config.port == 0 || port <= self.config.max_port => Ok(port),
            Some(port) => {
                warn!(
                    "Saved port {} is above maxPort {}, using configured port {}",
                    port, self.config.max_port, self.config.port
                );
                Ok(self.config.port)
            }
            None => Ok(self.config.port),
        }
    }

    /// Stop `previous` (if any), then bind and serve on the preferred port.
    pub async fn start(&self, previous: Option<ServiceHandle>) -> Result<ServiceHandle> {
        if let Some(previous) = previous {
            previous.stop().await;
        }
        let port = self.preferred_port().await?;
        self.listen(port).await
    }

    /// Like [`start`](Self::start) but search from an explicit port.
    pub async fn start_on(
        &self,
        previous: Option<ServiceHandle>,
        port: u16,
    ) -> Result<ServiceHandle> {
        if let Some(previous) = previous {
            previous.stop().await;
        }
        self.listen(port).await
    }

    async fn listen(&self, preferred: u16) -> Result<ServiceHandle> {
        let end = self.config.max_port.max(preferred);
        let (listener, port) = bind_first_available(
            EXTERNAL_BIND_HOST,
            preferred,
            end,
            self.config.reclaim_port,
        )
        .await?;
        let addr = listener.local_addr()?;

        save_setting(self.settings.as_ref(), EXTERNAL_PORT_SETTING, &port).await?;

        let app = routes::build_routes(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    // A dropped sender also ends the service.
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("External access listening on http://{}", addr);

        Ok(ServiceHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task,
            shutdown_timeout: Duration::from_millis(self.config.shutdown_timeout_ms),
        })
    }
}

/// A live listener. Dropping it triggers shutdown without waiting.
pub struct ServiceHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
    shutdown_timeout: Duration,
}

impl ServiceHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop accepting, let in-flight requests finish, release the port.
    ///
    /// Requests still running after the shutdown timeout are cut off.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(self.shutdown_timeout, &mut self.task).await {
            Ok(Ok(Ok(()))) => info!("External access on port {} stopped", self.port()),
            Ok(Ok(Err(e))) => error!("External access on port {} failed: {}", self.port(), e),
            Ok(Err(e)) => error!("External access task on port {} ended abnormally: {}", self.port(), e),
            Err(_) => {
                warn!(
                    "External access on port {} did not stop within {:?}, aborting",
                    self.port(),
                    self.shutdown_timeout
                );
                self.task.abort();
                let _ = (&mut self.task).await;
            }
        }
    }

    /// Wait for the listener to exit on its own.
    pub async fn wait(mut self) -> Result<()> {
        match (&mut self.task).await {
            Ok(result) => Ok(result?),
            Err(e) => {
                debug!("External access task join failed: {}", e);
                Err(std::io::Error::other(e).into())
            }
        }
    }
}
