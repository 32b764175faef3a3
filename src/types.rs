use crate::config::Config;
use crate::ivr::RetryPolicy;
use crate::session::SessionStore;

use sqlx::{Pool, Postgres};

pub struct AppState {
    pub config: Config,
    pub retry_policy: RetryPolicy,
    // call sid => in-flight intake dialogue
    pub sessions: SessionStore,
    /// Completed intakes are only persisted when a database is configured.
    pub db_pool: Option<Pool<Postgres>>,
}

impl AppState {
    pub fn new(config: Config, db_pool: Option<Pool<Postgres>>) -> Self {
        let retry_policy = RetryPolicy::from(&config);
        let sessions = SessionStore::new(config.session_ttl, config.session_capacity);
        Self {
            config,
            retry_policy,
            sessions,
            db_pool,
        }
    }
}
