// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexSpaces.
//
// PlexSpaces is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexSpaces is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexSpaces. If not, see <https://www.gnu.org/licenses/>.

//! PostgreSQL advisory lock provider.
//!
//! Runs dispatcher invocations as `pg_catalog.pg_*advisory*` calls over a
//! dedicated `sqlx` connection and reads the registry from
//! `pg_catalog.pg_locks`.
//!
//! - [`PgAdvisoryPool`] owns the pool and checks out sessions
//! - [`PgSession`] is one pooled connection held for the lifetime of its
//!   session-scoped locks
//! - [`PgTransaction`] is a transaction opened on a session; its
//!   transaction-scoped locks end with `commit` or `rollback`
//!
//! A session with no open transaction rejects transaction-scoped
//! invocations: in autocommit PostgreSQL would take the lock and drop it
//! again at the end of the statement.

use crate::config::{BackendType, LockConfig};
use crate::dispatch::{Invocation, InvocationParams};
use crate::key::{encode_int32_pair, encode_int64, LockKey};
use crate::provider::LockProvider;
use crate::request::LockScope;
use crate::{LockError, LockResult, PreconditionError};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Acquire, PgConnection, Postgres, Row, Transaction};
use tracing::{debug, instrument};

const HELD_KEYS_SQL: &str = r#"
    SELECT DISTINCT ON ((classid::bigint << 32) | objid::bigint)
        classid::bigint AS high, objid::bigint AS low, objsubid::integer AS arity
    FROM pg_catalog.pg_locks
    WHERE locktype = 'advisory' AND granted
    ORDER BY (classid::bigint << 32) | objid::bigint, objsubid
"#;

const KEY_HELD_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM pg_catalog.pg_locks
        WHERE locktype = 'advisory' AND granted
          AND ((classid::bigint << 32) | objid::bigint) = $1
    )
"#;

const UNLOCK_ALL_SQL: &str = "SELECT pg_catalog.pg_advisory_unlock_all()";

/// Connection pool handing out advisory lock sessions.
///
/// ## Example
/// ```rust,no_run
/// use plexspaces_advisory_locks::{AdvisoryLockClient, LockRequest, postgres::PgAdvisoryPool};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgAdvisoryPool::connect("postgres://localhost/plexspaces", 10).await?;
/// let mut client = AdvisoryLockClient::new(pool.session().await?);
///
/// let request = LockRequest::session(client.encode_name("orders")?);
/// client.lock(&request).await?;
/// client.unlock(&request).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgAdvisoryPool {
    pool: PgPool,
}

impl PgAdvisoryPool {
    /// Connect a pool of at most `pool_size` connections.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, pool_size: u32) -> LockResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(|e| LockError::ProviderError(format!("failed to connect PostgreSQL: {e}")))?;
        Ok(Self { pool })
    }

    /// Connect using a `postgres` backend configuration.
    pub async fn from_config(config: &LockConfig) -> LockResult<Self> {
        match &config.backend {
            BackendType::PostgreSQL {
                connection_string,
                pool_size,
            } => Self::connect(connection_string, *pool_size).await,
            BackendType::InMemory => Err(LockError::ConfigError(
                "PgAdvisoryPool requires the postgres backend".to_string(),
            )),
        }
    }

    /// Share an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check out a dedicated connection as a lock session.
    pub async fn session(&self) -> LockResult<PgSession> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| LockError::ProviderError(format!("acquire conn: {e}")))?;
        Ok(PgSession { conn })
    }
}

/// One dedicated PostgreSQL session.
///
/// Session-scoped locks stay held while this value lives; returning the
/// connection to the pool with locks still held leaks them to the next
/// borrower until `pg_advisory_unlock_all` or disconnect.
pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

impl PgSession {
    pub fn from_connection(conn: PoolConnection<Postgres>) -> Self {
        Self { conn }
    }

    pub fn into_connection(self) -> PoolConnection<Postgres> {
        self.conn
    }

    /// Open a transaction on this session.
    pub async fn begin(&mut self) -> LockResult<PgTransaction<'_>> {
        let tx = self
            .conn
            .begin()
            .await
            .map_err(|e| LockError::ProviderError(format!("begin tx: {e}")))?;
        Ok(PgTransaction { tx })
    }
}

/// A transaction on a [`PgSession`].
pub struct PgTransaction<'c> {
    tx: Transaction<'c, Postgres>,
}

impl<'c> PgTransaction<'c> {
    /// Commit, releasing transaction-scoped locks.
    pub async fn commit(self) -> LockResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| LockError::ProviderError(format!("commit tx: {e}")))
    }

    /// Roll back, releasing transaction-scoped locks.
    pub async fn rollback(self) -> LockResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| LockError::ProviderError(format!("rollback tx: {e}")))
    }
}

fn bind_params<'q>(
    query: Query<'q, Postgres, PgArguments>,
    params: InvocationParams,
) -> Query<'q, Postgres, PgArguments> {
    match params {
        InvocationParams::Single(key) => query.bind(key),
        InvocationParams::Pair(high, low) => query.bind(high).bind(low),
    }
}

fn expect_shape(invocation: &Invocation, returns_bool: bool) -> LockResult<()> {
    if invocation.function().returns_bool() == returns_bool {
        return Ok(());
    }
    Err(LockError::ProviderError(format!(
        "{} {}",
        invocation.name(),
        if returns_bool { "returns no value; use invoke" } else { "returns a value; use invoke_for_bool" }
    )))
}

async fn run(conn: &mut PgConnection, invocation: &Invocation) -> LockResult<()> {
    expect_shape(invocation, false)?;
    let sql = invocation.sql();
    debug!(sql = %sql, params = ?invocation.params(), "running advisory invocation");
    bind_params(sqlx::query(&sql), invocation.params())
        .execute(conn)
        .await?;
    Ok(())
}

async fn run_for_bool(conn: &mut PgConnection, invocation: &Invocation) -> LockResult<bool> {
    expect_shape(invocation, true)?;
    let sql = invocation.sql();
    debug!(sql = %sql, params = ?invocation.params(), "running advisory invocation");
    let row = bind_params(sqlx::query(&sql), invocation.params())
        .fetch_one(conn)
        .await?;
    Ok(row.try_get::<bool, _>(0)?)
}

fn key_from_row(row: &PgRow) -> LockResult<LockKey> {
    let high: i64 = row.try_get("high")?;
    let low: i64 = row.try_get("low")?;
    let arity: i32 = row.try_get("arity")?;
    // classid and objid are unsigned 32-bit oids
    let high = high as u32;
    let low = low as u32;
    Ok(if arity == 2 {
        encode_int32_pair(high as i32, low as i32)
    } else {
        encode_int64(((u64::from(high) << 32) | u64::from(low)) as i64)
    })
}

async fn held_keys(conn: &mut PgConnection) -> LockResult<Vec<LockKey>> {
    let rows = sqlx::query(HELD_KEYS_SQL).fetch_all(conn).await?;
    rows.iter().map(key_from_row).collect()
}

async fn is_key_held(conn: &mut PgConnection, key: LockKey) -> LockResult<bool> {
    let row = sqlx::query(KEY_HELD_SQL).bind(key.value()).fetch_one(conn).await?;
    Ok(row.try_get::<bool, _>(0)?)
}

async fn unlock_all(conn: &mut PgConnection) -> LockResult<()> {
    sqlx::query(UNLOCK_ALL_SQL).execute(conn).await?;
    Ok(())
}

fn require_transaction(invocation: &Invocation) -> LockResult<()> {
    if invocation.function().scope() == LockScope::Transaction {
        return Err(PreconditionError::NoActiveTransaction.into());
    }
    Ok(())
}

#[async_trait]
impl LockProvider for PgSession {
    async fn invoke(&mut self, invocation: &Invocation) -> LockResult<()> {
        require_transaction(invocation)?;
        run(&mut self.conn, invocation).await
    }

    async fn invoke_for_bool(&mut self, invocation: &Invocation) -> LockResult<bool> {
        require_transaction(invocation)?;
        run_for_bool(&mut self.conn, invocation).await
    }

    async fn held_keys(&mut self) -> LockResult<Vec<LockKey>> {
        held_keys(&mut self.conn).await
    }

    async fn is_key_held(&mut self, key: LockKey) -> LockResult<bool> {
        is_key_held(&mut self.conn, key).await
    }

    async fn unlock_all(&mut self) -> LockResult<()> {
        unlock_all(&mut self.conn).await
    }
}

#[async_trait]
impl<'c> LockProvider for PgTransaction<'c> {
    async fn invoke(&mut self, invocation: &Invocation) -> LockResult<()> {
        run(&mut self.tx, invocation).await
    }

    async fn invoke_for_bool(&mut self, invocation: &Invocation) -> LockResult<bool> {
        run_for_bool(&mut self.tx, invocation).await
    }

    async fn held_keys(&mut self) -> LockResult<Vec<LockKey>> {
        held_keys(&mut self.tx).await
    }

    async fn is_key_held(&mut self, key: LockKey) -> LockResult<bool> {
        is_key_held(&mut self.tx, key).await
    }

    async fn unlock_all(&mut self) -> LockResult<()> {
        unlock_all(&mut self.tx).await
    }
}
