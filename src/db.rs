use crate::db_types::Intake;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

/// Well under Twilio's webhook timeout.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(database_url: &str) -> Result<Pool<Postgres>, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    info!("connected to database; migrations applied");
    Ok(pool)
}

pub async fn save_intake(pool: &Pool<Postgres>, intake: &Intake) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO intakes \
         (id, call_sid, path, caller_name, date_of_birth, preferred_when, created) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(intake.id)
    .bind(&intake.call_sid)
    .bind(intake.path.as_str())
    .bind(&intake.caller_name)
    .bind(&intake.date_of_birth)
    .bind(&intake.preferred_when)
    .bind(intake.created)
    .execute(pool)
    .await?;
    Ok(())
}
