//! MySQL adapter for [`VerificationStore`].
//!
//! One parameterized statement per call on a connection acquired for that
//! call only. Identifiers are always bound, never interpolated.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::domain::config::StoreConfig;
use crate::domain::{AuthCode, MatchedRecord, SessionToken, StoreError, UserId};
use crate::ports::VerificationStore;

/// Update mode. The `IS NULL` guard makes a consumed record unmatchable, so a
/// replay affects zero rows whatever the driver's found-rows setting.
pub const MARK_CODE_RECEIVED_SQL: &str = "UPDATE oauth SET authorization_code = ? \
     WHERE state = ? AND authorization_code IS NULL";

/// Lookup mode. The window is bound in seconds.
pub const FIND_FRESH_RECORD_SQL: &str = "SELECT CAST(userid AS CHAR) AS userid, email FROM verify \
     WHERE userid = ? AND bigcode = ? \
     AND TIME BETWEEN DATE_SUB(NOW(), INTERVAL ? SECOND) AND NOW() \
     ORDER BY TIME DESC LIMIT 1";

/// Store backed by a small MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlVerificationStore {
    pool: MySqlPool,
    query_timeout: Duration,
    freshness_window: Duration,
}

impl MySqlVerificationStore {
    /// Build the pool without connecting. Connection problems surface per
    /// request as [`StoreError::Connection`].
    pub fn connect_lazy(config: &StoreConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy_with(options);

        Self::from_pool(pool, config.query_timeout, config.freshness_window)
    }

    pub fn from_pool(pool: MySqlPool, query_timeout: Duration, freshness_window: Duration) -> Self {
        Self {
            pool,
            query_timeout,
            freshness_window,
        }
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VerificationStore for MySqlVerificationStore {
    #[instrument(skip_all, fields(state = %state))]
    async fn mark_code_received(
        &self,
        state: &SessionToken,
        code: &AuthCode,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;

        let result = timeout(
            self.query_timeout,
            sqlx::query(MARK_CODE_RECEIVED_SQL)
                .bind(code.as_str())
                .bind(state.as_str())
                .execute(&mut *conn),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.query_timeout))?
        .map_err(classify)?;

        debug!(rows = result.rows_affected(), "Session record update");
        Ok(result.rows_affected())
    }

    #[instrument(skip_all, fields(user = %user))]
    async fn find_fresh_record(
        &self,
        user: &UserId,
        code: &AuthCode,
    ) -> Result<Option<MatchedRecord>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;

        let row = timeout(
            self.query_timeout,
            sqlx::query(FIND_FRESH_RECORD_SQL)
                .bind(user.as_str())
                .bind(code.as_str())
                .bind(self.freshness_window.as_secs())
                .fetch_optional(&mut *conn),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.query_timeout))?
        .map_err(classify)?;

        let Some(row) = row else {
            debug!("No fresh user record");
            return Ok(None);
        };

        let user_id: String = row
            .try_get("userid")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let email: String = row
            .try_get("email")
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(Some(MatchedRecord { user_id, email }))
    }
}

/// `ER_DBACCESS_DENIED_ERROR`
const ER_DBACCESS_DENIED: u16 = 1044;
/// `ER_ACCESS_DENIED_ERROR`
const ER_ACCESS_DENIED: u16 = 1045;

/// Split driver errors into "could not reach the store" and "statement failed".
/// Rejected credentials count as unreachable.
fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => StoreError::Connection(err.to_string()),
        sqlx::Error::Database(db)
            if db
                .try_downcast_ref::<MySqlDatabaseError>()
                .is_some_and(|e| is_access_denied(e.number())) =>
        {
            StoreError::Connection(err.to_string())
        }
        _ => StoreError::Query(err.to_string()),
    }
}

fn is_access_denied(number: u16) -> bool {
    matches!(number, ER_DBACCESS_DENIED | ER_ACCESS_DENIED)
}
