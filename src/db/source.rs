//! Direct Postgres read path for the readings table.
//!
//! One `PgConnection` per view. A connection that failed at the transport level is
//! dropped and a fresh one is established by the next fetch, so a flaky network
//! heals on the following refresh cycle.

use crate::client::{FetchError, ReadingSource, SchemaMismatch, READINGS_TABLE};
use crate::db::models::SensorRow;
use crate::models::reading::{normalize_batch, ReadingRecord};
use crate::schema;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::PgConnection;
use log::{debug, info};
use std::num::NonZeroU32;
use std::time::Duration;

pub struct PgReadingSource {
    database_url: String,
    timeout: Duration,
    conn: Option<PgConnection>,
}

impl PgReadingSource {
    /// Connect eagerly so bad credentials surface at startup.
    pub fn connect(database_url: &str, timeout: Duration) -> Result<Self, String> {
        let database_url = with_connect_timeout(database_url, timeout);
        let conn = establish(&database_url, timeout)?;
        Ok(PgReadingSource {
            database_url,
            timeout,
            conn: Some(conn),
        })
    }

    /// Defer connecting to the first fetch; a failure there is a per-cycle error.
    pub fn lazy(database_url: &str, timeout: Duration) -> Self {
        PgReadingSource {
            database_url: with_connect_timeout(database_url, timeout),
            timeout,
            conn: None,
        }
    }
}

impl ReadingSource for PgReadingSource {
    fn describe(&self) -> String {
        String::from("postgres (sensordata)")
    }

    fn fetch_latest(&mut self, limit: NonZeroU32) -> Result<Vec<ReadingRecord>, FetchError> {
        use schema::sensordata::dsl as S;

        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = establish(&self.database_url, self.timeout).map_err(FetchError::Connectivity)?;
                info!("Re-established database connection");
                conn
            }
        };

        let result = S::sensordata
            .select(SensorRow::as_select())
            .order(S::id.desc())
            .limit(i64::from(limit.get()))
            .load::<SensorRow>(&mut conn)
            .map_err(map_query_error);

        match &result {
            Err(FetchError::Connectivity(e)) => debug!("Dropping database connection after failure: {}", e),
            _ => self.conn = Some(conn),
        }

        let rows = result?.into_iter().map(ReadingRecord::from).collect();
        Ok(normalize_batch(rows, limit.get() as usize))
    }
}

fn establish(database_url: &str, timeout: Duration) -> Result<PgConnection, String> {
    let mut conn = PgConnection::establish(database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    diesel::sql_query(format!("SET statement_timeout = {}", timeout.as_millis()))
        .execute(&mut conn)
        .map_err(|e| format!("setting statement_timeout failed: {}", e))?;
    Ok(conn)
}

fn map_query_error(e: DieselError) -> FetchError {
    match e {
        DieselError::DeserializationError(inner) => FetchError::Schema(SchemaMismatch {
            row: None,
            path: READINGS_TABLE.to_string(),
            message: inner.to_string(),
        }),
        DieselError::DatabaseError(_, info) if info.message().contains("does not exist") => {
            FetchError::Schema(SchemaMismatch {
                row: None,
                path: READINGS_TABLE.to_string(),
                message: info.message().to_string(),
            })
        }
        other => FetchError::Connectivity(other.to_string()),
    }
}

/// Add libpq's `connect_timeout` to a `postgres://` URL that does not set one.
fn with_connect_timeout(database_url: &str, timeout: Duration) -> String {
    let is_url = database_url.starts_with("postgres://") || database_url.starts_with("postgresql://");
    if !is_url || database_url.contains("connect_timeout=") {
        return database_url.to_string();
    }
    let separator = if database_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}connect_timeout={}",
        database_url,
        separator,
        timeout.as_secs().max(1)
    )
}
