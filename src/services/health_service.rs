use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the installed match store and summarise backend health.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let (connected, reachable) = match state.match_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => (true, true),
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                (true, false)
            }
        },
        None => {
            warn!("storage unavailable (degraded mode)");
            (false, false)
        }
    };

    let pending_handoffs = state
        .handoffs()
        .iter()
        .filter(|entry| entry.value().is_pending())
        .count();

    HealthResponse::new(connected, reachable, pending_handoffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::memory_state;

    #[tokio::test]
    async fn reports_degraded_once_store_is_cleared() {
        let (state, _) = memory_state().await;
        assert_eq!(health_status(&state).await, HealthResponse::new(true, true, 0));

        state.clear_match_store().await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "degraded");
        assert!(!health.store_connected);
    }
}
