//! Plugin mode, where the controller runs alongside a CNI server that programs pods as they are
//! created.
//!
//! The plugin's drain handle replaces the process's signal handling as the controller's stop
//! source: the controller stops when the plugin is terminated.

use crate::controller::SHUTDOWN_TIMEOUT;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time;
use tracing::{error, info, info_span, warn, Instrument};

/// Serves CNI requests from the container runtime.
#[async_trait::async_trait]
pub trait Server: Send + Sync + 'static {
    async fn start(&self) -> Result<()>;
}

/// Installs the CNI plugin binary and configuration on the host.
#[async_trait::async_trait]
pub trait Installer: Send + Sync + 'static {
    /// Keeps the plugin installed until `stop` is signaled.
    async fn run(&self, stop: drain::Watch) -> Result<()>;

    /// Removes the plugin from the host.
    async fn cleanup(&self) -> Result<()>;
}

#[derive(Debug)]
pub struct Plugin<S, I> {
    server: S,
    installer: Arc<I>,
}

// === impl Plugin ===

impl<S: Server, I: Installer> Plugin<S, I> {
    pub fn new(server: S, installer: I) -> Self {
        Self {
            server,
            installer: Arc::new(installer),
        }
    }

    /// Starts the server and, in the background, the installer.
    ///
    /// When `shutdown` is signaled the plugin is terminated: the returned handle is drained and the
    /// installation is cleaned up. The returned handle is intended to be the controller's stop
    /// source.
    pub async fn start(self, shutdown: drain::Watch) -> Result<drain::Watch> {
        self.server
            .start()
            .await
            .context("failed to start CNI server")?;
        info!("CNI server started");

        let (signal, stop) = drain::channel();

        let installer = self.installer.clone();
        let installing = stop.clone();
        tokio::spawn(
            async move {
                if let Err(error) = installer.run(installing).await {
                    error!(%error, "CNI installer failed");
                }
                cleanup(&*installer).await;
            }
            .instrument(info_span!("installer")),
        );

        let installer = self.installer;
        tokio::spawn(
            async move {
                let release = shutdown.signaled().await;
                info!("Terminating CNI plugin");
                if time::timeout(SHUTDOWN_TIMEOUT, signal.drain()).await.is_err() {
                    warn!(timeout = ?SHUTDOWN_TIMEOUT, "CNI plugin did not stop in time");
                }
                cleanup(&*installer).await;
                drop(release);
            }
            .instrument(info_span!("cni")),
        );

        Ok(stop)
    }
}

async fn cleanup<I: Installer>(installer: &I) {
    if let Err(error) = installer.cleanup().await {
        error!(%error, "Failed to clean up CNI plugin");
    }
}
