use crate::{
    datapath::Datapath,
    index::{self, PolicyMap, ProcessManager, Reconciler},
    k8s::{self, watcher},
};
use anyhow::{bail, Context, Result};
use futures::prelude::*;
use std::sync::Arc;
use tokio::{sync::oneshot, time};
use tracing::{error, info, info_span, warn, Instrument};

/// Bounds how long watch tasks may take to stop once shutdown begins.
pub const SHUTDOWN_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// Runs the watches that feed a reconciler and owns the datapath's lifecycle.
#[derive(Debug)]
pub struct Controller<M, P, D> {
    reconciler: Arc<Reconciler<M, P>>,
    datapath: D,
}

// === impl Controller ===

impl<M, P, D> Controller<M, P, D>
where
    M: PolicyMap,
    P: ProcessManager,
    D: Datapath,
{
    pub fn new(reconciler: Arc<Reconciler<M, P>>, datapath: D) -> Self {
        Self {
            reconciler,
            datapath,
        }
    }

    /// Indexes namespaces and pods, attaching the datapath once both have been listed, until
    /// `stop` is signaled.
    ///
    /// Returns an error if either watch ends before it is listed or if the datapath cannot be
    /// attached. The datapath is unloaded after `stop` fires only if it was attached.
    pub async fn run<N, Q>(self, namespaces: N, pods: Q, stop: drain::Watch) -> Result<()>
    where
        N: Stream<Item = watcher::Event<k8s::Namespace>> + Send + 'static,
        Q: Stream<Item = watcher::Event<k8s::Pod>> + Send + 'static,
    {
        let (watches_tx, watches_rx) = drain::channel();

        let (namespaces_ready, namespaces_listed) = oneshot::channel();
        tokio::spawn(
            until_drained(
                watches_rx.clone(),
                index::index(self.reconciler.clone(), namespaces, namespaces_ready),
            )
            .instrument(info_span!("namespaces")),
        );

        let (pods_ready, pods_listed) = oneshot::channel();
        tokio::spawn(
            until_drained(
                watches_rx,
                index::index(self.reconciler.clone(), pods, pods_ready),
            )
            .instrument(info_span!("pods")),
        );

        let listed = future::try_join(namespaces_listed, pods_listed);
        let release = tokio::select! {
            res = listed => {
                if res.is_err() {
                    shutdown(watches_tx).await;
                    bail!("watch ended before its initial listing");
                }
                None
            }
            release = stop.clone().signaled() => Some(release),
        };
        if let Some(release) = release {
            info!("Stopped before the initial listing completed");
            shutdown(watches_tx).await;
            drop(release);
            return Ok(());
        }

        info!(flavor = %self.reconciler.flavor(), "Watches ready; attaching datapath");
        if let Err(error) = self
            .datapath
            .attach()
            .await
            .context("failed to attach datapath programs")
        {
            shutdown(watches_tx).await;
            return Err(error);
        }

        let release = stop.signaled().await;
        info!("Shutting down");
        shutdown(watches_tx).await;
        if let Err(error) = self.datapath.unload().await {
            error!(%error, "Failed to unload datapath programs");
        }
        drop(release);

        Ok(())
    }
}

async fn until_drained(drain: drain::Watch, task: impl Future<Output = ()>) {
    tokio::select! {
        () = task => {}
        release = drain.signaled() => drop(release),
    }
}

async fn shutdown(watches: drain::Signal) {
    if time::timeout(SHUTDOWN_TIMEOUT, watches.drain()).await.is_err() {
        warn!(timeout = ?SHUTDOWN_TIMEOUT, "Watches did not stop in time");
    }
}
