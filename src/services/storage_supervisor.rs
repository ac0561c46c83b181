use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{match_store::MatchStore, storage::StorageError},
    services::sse_events,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a match store installed in the shared state, entering degraded mode whenever it is
/// unreachable. Every degraded-mode flip is announced on the lobby.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, retry_in_ms = delay.as_millis() as u64, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        state.install_match_store(store.clone()).await;
        sse_events::broadcast_system_status(&state, false);
        info!("storage connection established; leaving degraded mode");
        delay = INITIAL_DELAY;

        watch_health(store.as_ref()).await;

        state.clear_match_store().await;
        sse_events::broadcast_system_status(&state, true);
        warn!("exhausted storage reconnect attempts; staying in degraded mode");
        sleep(delay).await;
    }
}

/// Poll the installed store until it fails and cannot be revived in place.
async fn watch_health(store: &dyn MatchStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                sleep(HEALTH_POLL_INTERVAL).await;
                continue;
            }
            Err(err) => warn!(error = %err, "storage health check failed"),
        }

        if !reconnect(store).await {
            return;
        }
    }
}

async fn reconnect(store: &dyn MatchStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::memory::MemoryMatchStore,
        services::{auth_service::TrustedPayloadProvider, rcon::SourceRconConnector},
        state::AppState,
    };

    #[tokio::test]
    async fn installs_store_and_announces_recovery() {
        let config = AppConfig::default();
        let connector = Arc::new(SourceRconConnector::new(&config.handoff));
        let state = AppState::new(config, Arc::new(TrustedPayloadProvider), connector);
        assert!(state.is_degraded().await);
        let mut lobby = state.rooms().lobby().subscribe();

        let supervised = state.clone();
        let task = tokio::spawn(run(supervised, || async {
            Ok(Arc::new(MemoryMatchStore::new()) as Arc<dyn MatchStore>)
        }));

        let event = lobby.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("system_status"));
        assert_eq!(event.data, r#"{"degraded":false}"#);
        assert!(!state.is_degraded().await);
        task.abort();
    }
}
