//! Supervised Kubernetes watchers with liveness bookkeeping.
//!
//! Each watcher is an infinite loop over `kube::runtime::watcher`, which
//! internally does list-then-watch and re-lists when the resource version is
//! too old (410 Gone). On any other stream error the loop sleeps five
//! seconds and starts over. Every observed event advances the watcher's
//! last-progress timestamp; `/v1/health` turns red when any watcher stalls.

use futures::TryStreamExt;
use kube::Api;
use kube::runtime::watcher;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const WATCHER_STALE_AFTER: Duration = Duration::from_secs(5 * 60);
const RESTART_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
pub struct WatcherRegistry {
    inner: Arc<Mutex<HashMap<String, Instant>>>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) {
        self.inner
            .lock()
            .expect("watcher registry lock")
            .insert(name.to_string(), Instant::now());
    }

    pub fn update(&self, name: &str) {
        self.inner
            .lock()
            .expect("watcher registry lock")
            .insert(name.to_string(), Instant::now());
    }

    /// Names of watchers with no progress inside the staleness window.
    pub fn stale_watchers(&self) -> Vec<String> {
        let now = Instant::now();
        self.inner
            .lock()
            .expect("watcher registry lock")
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > WATCHER_STALE_AFTER)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn all_healthy(&self) -> bool {
        let stale = self.stale_watchers();
        for name in &stale {
            tracing::error!(watcher = %name, "watcher is stale");
        }
        stale.is_empty()
    }
}

/// What a watcher callback gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Present or changed (includes the objects seen during re-list).
    Applied,
    Deleted,
}

/// Run one supervised watcher until cancelled.
pub async fn run_watcher<K, F, Fut>(
    name: &str,
    api: Api<K>,
    config: watcher::Config,
    registry: WatcherRegistry,
    cancel: CancellationToken,
    handler: F,
) where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    F: Fn(WatchEvent, K) -> Fut,
    Fut: Future<Output = ()>,
{
    registry.register(name);
    tracing::info!(watcher = name, "starting kubernetes watcher");

    loop {
        let mut stream = pin!(watcher(api.clone(), config.clone()));
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(watcher = name, "watcher cancelled");
                    return;
                }
                event = stream.try_next() => event,
            };
            match event {
                Ok(Some(event)) => {
                    registry.update(name);
                    match event {
                        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                            handler(WatchEvent::Applied, obj).await;
                        }
                        watcher::Event::Delete(obj) => {
                            handler(WatchEvent::Deleted, obj).await;
                        }
                        watcher::Event::Init | watcher::Event::InitDone => {}
                    }
                }
                Ok(None) => {
                    tracing::warn!(watcher = name, "watch stream ended, restarting");
                    break;
                }
                Err(err) => {
                    tracing::error!(watcher = name, ?err, "watch stream error, restarting in 5s");
                    break;
                }
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RESTART_BACKOFF) => {}
        }
    }
}
