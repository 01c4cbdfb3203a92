use std::future::Future;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::store::Collection;

/// Snapshot stream for one query. Dropping it tears down the background task.
pub struct LiveQuery<T> {
    snapshots: mpsc::Receiver<AppResult<Vec<T>>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> LiveQuery<T> {
    pub fn spawn<F, Fut>(
        collection: Collection,
        mut changes: broadcast::Receiver<Collection>,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<Vec<T>>> + Send,
    {
        let (tx, snapshots) = mpsc::channel(4);
        let task = tokio::spawn(async move {
            if tx.send(fetch().await).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(changed) if changed != collection => continue,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(
                            skipped,
                            collection = collection.as_str(),
                            "live query lagged, refetching"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                if tx.send(fetch().await).await.is_err() {
                    break;
                }
            }
            debug!(collection = collection.as_str(), "live query finished");
        });

        Self { snapshots, task }
    }

    pub async fn next(&mut self) -> Option<AppResult<Vec<T>>> {
        self.snapshots.recv().await
    }

    pub async fn next_ok(&mut self) -> Option<Vec<T>> {
        while let Some(snapshot) = self.next().await {
            match snapshot {
                Ok(items) => return Some(items),
                Err(err) => warn!("live query refresh failed: {err}"),
            }
        }
        None
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
