//! Background refresh loop.
//!
//! Wakes up on a fixed interval and refreshes the access token once it has
//! entered the skew window, so request handlers rarely pay for a refresh.

use std::time::Duration;
use tokio::task::JoinHandle;

use super::manager::CredentialManager;

/// Spawn the refresh loop. Failures are logged and the loop keeps running.
pub fn spawn_refresh_task(manager: CredentialManager, interval: Duration) -> JoinHandle<()> {
    tracing::info!("Token refresh task started (interval: {}s)", interval.as_secs());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            refresh_cycle(&manager).await;
        }
    })
}

async fn refresh_cycle(manager: &CredentialManager) {
    match manager.needs_refresh() {
        Ok(false) => {}
        Ok(true) => match manager.get_valid_token().await {
            Ok(_) => tracing::debug!("Scheduled refresh cycle completed"),
            Err(e) => tracing::error!("Scheduled token refresh failed: {}", e),
        },
        Err(e) => tracing::error!("Refresh cycle could not read credentials: {}", e),
    }
}
