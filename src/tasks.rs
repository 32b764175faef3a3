use crate::types::AppState;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Task that periodically drops sessions for calls that went quiet without a status callback.
pub async fn sweep_expired_sessions(app_state: Arc<AppState>, period: Duration) {
    let mut ticker = interval(period.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let dropped = app_state.sessions.sweep_expired(Instant::now());
        if dropped > 0 {
            info!(dropped, remaining = app_state.sessions.len(), "dropped abandoned call sessions");
        } else {
            debug!(active = app_state.sessions.len(), "session sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn sweeper_drops_idle_sessions() {
        let config = Config {
            session_ttl: Duration::from_millis(20),
            ..Default::default()
        };
        let app_state = Arc::new(AppState::new(config, None));
        app_state
            .sessions
            .with_session("CA1", Instant::now(), |_| ());

        let handle = tokio::spawn(sweep_expired_sessions(
            app_state.clone(),
            Duration::from_millis(10),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(app_state.sessions.len(), 0);
    }
}
