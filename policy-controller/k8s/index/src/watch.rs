use crate::{
    event::Watched,
    reconciler::Reconciler,
    sink::{PolicyMap, ProcessManager},
};
use futures::prelude::*;
use meshaccel_policy_controller_k8s_api::watcher;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Feeds a resource watch into the reconciler until the stream ends.
///
/// `ready` is notified once the first complete listing has been applied. Listings are buffered
/// and applied as a single reset so that resources deleted while the watch was disconnected are
/// removed.
pub async fn index<T, M, P>(
    reconciler: Arc<Reconciler<M, P>>,
    events: impl Stream<Item = watcher::Event<T>>,
    ready: oneshot::Sender<()>,
) where
    T: Watched,
    M: PolicyMap,
    P: ProcessManager,
{
    tokio::pin!(events);

    let mut ready = Some(ready);
    let mut listing = None::<Vec<T>>;
    while let Some(event) = events.next().await {
        match event {
            watcher::Event::Init => {
                debug!("Listing");
                listing = Some(Vec::new());
            }
            watcher::Event::InitApply(resource) => match listing.as_mut() {
                Some(resources) => resources.push(resource),
                None => {
                    if let Some(event) = resource.applied() {
                        reconciler.handle(event);
                    }
                }
            },
            watcher::Event::InitDone => {
                let resources = listing.take().unwrap_or_default();
                debug!(resources = resources.len(), "Listed");
                reconciler.handle(T::restarted(resources));
                if let Some(tx) = ready.take() {
                    info!("Initial listing applied");
                    let _ = tx.send(());
                }
            }
            watcher::Event::Apply(resource) => {
                if let Some(event) = resource.applied() {
                    reconciler.handle(event);
                }
            }
            watcher::Event::Delete(resource) => {
                if let Some(event) = resource.deleted() {
                    reconciler.handle(event);
                }
            }
        }
    }

    debug!("Watch ended");
}
