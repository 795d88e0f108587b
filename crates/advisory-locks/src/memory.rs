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

//! In-memory advisory lock provider (for testing and single-process setups).

use crate::config::{BackendType, LockConfig};
use crate::dispatch::{AdvisoryFunction, Invocation, InvocationParams, WaitPolicy};
use crate::key::LockKey;
use crate::provider::LockProvider;
use crate::request::{LockMode, LockScope};
use crate::{LockError, LockResult, PreconditionError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, trace};

type SessionId = u64;

/// Hold counts of one session on one key.
#[derive(Debug, Default, Clone, Copy)]
struct Holds {
    session_exclusive: u32,
    session_shared: u32,
    xact_exclusive: u32,
    xact_shared: u32,
}

impl Holds {
    fn counter(&mut self, scope: LockScope, mode: LockMode) -> &mut u32 {
        match (scope, mode) {
            (LockScope::Session, LockMode::Exclusive) => &mut self.session_exclusive,
            (LockScope::Session, LockMode::Shared) => &mut self.session_shared,
            (LockScope::Transaction, LockMode::Exclusive) => &mut self.xact_exclusive,
            (LockScope::Transaction, LockMode::Shared) => &mut self.xact_shared,
        }
    }

    fn holds_exclusive(&self) -> bool {
        self.session_exclusive > 0 || self.xact_exclusive > 0
    }

    fn is_empty(&self) -> bool {
        self.session_exclusive == 0
            && self.session_shared == 0
            && self.xact_exclusive == 0
            && self.xact_shared == 0
    }
}

#[derive(Debug, Default)]
struct TableState {
    // Keyed like the provider: a BIGINT key and an INTEGER pair are distinct locks.
    locks: HashMap<InvocationParams, HashMap<SessionId, Holds>>,
}

impl TableState {
    fn try_grant(
        &mut self,
        session: SessionId,
        params: InvocationParams,
        scope: LockScope,
        mode: LockMode,
    ) -> bool {
        let holders = self.locks.entry(params).or_default();
        let conflict = holders.iter().any(|(holder, holds)| {
            *holder != session
                && match mode {
                    LockMode::Exclusive => !holds.is_empty(),
                    LockMode::Shared => holds.holds_exclusive(),
                }
        });
        if conflict {
            return false;
        }
        *holders.entry(session).or_default().counter(scope, mode) += 1;
        true
    }

    fn release(&mut self, session: SessionId, params: InvocationParams, mode: LockMode) -> bool {
        let released = match self
            .locks
            .get_mut(&params)
            .and_then(|holders| holders.get_mut(&session))
        {
            Some(holds) => {
                let counter = holds.counter(LockScope::Session, mode);
                if *counter == 0 {
                    false
                } else {
                    *counter -= 1;
                    true
                }
            }
            None => false,
        };
        self.prune();
        released
    }

    fn clear(&mut self, session: SessionId, scope: LockScope) {
        for holders in self.locks.values_mut() {
            if let Some(holds) = holders.get_mut(&session) {
                *holds.counter(scope, LockMode::Exclusive) = 0;
                *holds.counter(scope, LockMode::Shared) = 0;
            }
        }
        self.prune();
    }

    fn end_session(&mut self, session: SessionId) {
        for holders in self.locks.values_mut() {
            holders.remove(&session);
        }
        self.prune();
    }

    fn prune(&mut self) {
        self.locks.retain(|_, holders| {
            holders.retain(|_, holds| !holds.is_empty());
            !holders.is_empty()
        });
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<TableState>,
    released: Notify,
    next_session: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory advisory lock table shared by any number of sessions.
///
/// ## Purpose
/// Stands in for the database's lock table in tests and single-process
/// deployments, following the same grant rules:
/// - holds are re-entrant and counted per session, scope and mode
/// - a session never conflicts with itself
/// - exclusive conflicts with any other holder, shared only with another
///   session's exclusive hold
///
/// ## Limitations
/// - Not persistent (locks lost on restart)
/// - Not distributed (single process only)
#[derive(Debug, Clone, Default)]
pub struct MemoryLockTable {
    shared: Arc<Shared>,
}

impl MemoryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table for an `in-memory` backend configuration.
    pub fn from_config(config: &LockConfig) -> LockResult<Self> {
        match &config.backend {
            BackendType::InMemory => Ok(Self::new()),
            BackendType::PostgreSQL { .. } => Err(LockError::ConfigError(
                "MemoryLockTable requires the in-memory backend".to_string(),
            )),
        }
    }

    /// Open a new session on this table.
    pub fn session(&self) -> MemorySession {
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(session = id, "opened in-memory lock session");
        MemorySession {
            id,
            shared: Arc::clone(&self.shared),
            in_transaction: false,
        }
    }
}

/// One session on a [`MemoryLockTable`].
///
/// Dropping the session ends it and releases everything it holds.
#[derive(Debug)]
pub struct MemorySession {
    id: SessionId,
    shared: Arc<Shared>,
    in_transaction: bool,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Open a transaction; transaction-scoped invocations are accepted until it ends.
    pub fn begin(&mut self) {
        self.in_transaction = true;
    }

    /// End the transaction, releasing its transaction-scoped locks.
    pub fn commit(&mut self) {
        self.end_transaction();
    }

    /// Same as [`commit`](Self::commit): the lock table holds no data to undo.
    pub fn rollback(&mut self) {
        self.end_transaction();
    }

    fn end_transaction(&mut self) {
        if std::mem::take(&mut self.in_transaction) {
            self.shared.state().clear(self.id, LockScope::Transaction);
            self.shared.released.notify_waiters();
        }
    }

    fn check_scope(&self, scope: LockScope) -> LockResult<()> {
        if scope == LockScope::Transaction && !self.in_transaction {
            return Err(PreconditionError::NoActiveTransaction.into());
        }
        Ok(())
    }

    fn grant(&self, params: InvocationParams, scope: LockScope, mode: LockMode) -> bool {
        self.shared.state().try_grant(self.id, params, scope, mode)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.state().end_session(self.id);
        self.shared.released.notify_waiters();
    }
}

#[async_trait]
impl LockProvider for MemorySession {
    async fn invoke(&mut self, invocation: &Invocation) -> LockResult<()> {
        let AdvisoryFunction::Lock { wait: WaitPolicy::Wait, scope, mode } = invocation.function() else {
            return Err(LockError::ProviderError(format!(
                "{} returns a value; use invoke_for_bool",
                invocation.name()
            )));
        };
        self.check_scope(scope)?;

        let shared = Arc::clone(&self.shared);
        loop {
            // Register before checking so a release in between is not missed.
            let mut notified = pin!(shared.released.notified());
            notified.as_mut().enable();
            if self.grant(invocation.params(), scope, mode) {
                return Ok(());
            }
            trace!(session = self.id, "advisory lock busy, waiting");
            notified.await;
        }
    }

    async fn invoke_for_bool(&mut self, invocation: &Invocation) -> LockResult<bool> {
        match invocation.function() {
            AdvisoryFunction::Lock { wait: WaitPolicy::NoWait, scope, mode } => {
                self.check_scope(scope)?;
                Ok(self.grant(invocation.params(), scope, mode))
            }
            AdvisoryFunction::Lock { wait: WaitPolicy::Wait, .. } => Err(LockError::ProviderError(format!(
                "{} returns no value; use invoke",
                invocation.name()
            ))),
            AdvisoryFunction::Unlock { mode } => {
                let released = self.shared.state().release(self.id, invocation.params(), mode);
                if released {
                    self.shared.released.notify_waiters();
                }
                Ok(released)
            }
        }
    }

    async fn held_keys(&mut self) -> LockResult<Vec<LockKey>> {
        let mut seen = HashSet::new();
        Ok(self
            .shared
            .state()
            .locks
            .keys()
            .map(InvocationParams::key)
            .filter(|key| seen.insert(*key))
            .collect())
    }

    async fn is_key_held(&mut self, key: LockKey) -> LockResult<bool> {
        Ok(self.shared.state().locks.keys().any(|params| params.key() == key))
    }

    async fn unlock_all(&mut self) -> LockResult<()> {
        self.shared.state().clear(self.id, LockScope::Session);
        self.shared.released.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{acquire_invocation, release_invocation};
    use crate::key::{encode_int32_pair, encode_int64};
    use crate::request::LockRequest;
    use std::time::Duration;

    async fn try_lock(session: &mut MemorySession, request: &LockRequest) -> bool {
        session
            .invoke_for_bool(&acquire_invocation(request, WaitPolicy::NoWait))
            .await
            .unwrap()
    }

    async fn unlock(session: &mut MemorySession, request: &LockRequest) -> bool {
        session
            .invoke_for_bool(&release_invocation(request))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_exclusive_conflicts_across_sessions() {
        let table = MemoryLockTable::new();
        let mut a = table.session();
        let mut b = table.session();
        let request = LockRequest::session(encode_int64(1));

        assert!(try_lock(&mut a, &request).await);
        assert!(!try_lock(&mut b, &request).await);
        assert!(!try_lock(&mut b, &request.shared()).await);
        assert!(unlock(&mut a, &request).await);
        assert!(try_lock(&mut b, &request).await);
    }

    #[tokio::test]
    async fn test_shared_holders_coexist() {
        let table = MemoryLockTable::new();
        let mut a = table.session();
        let mut b = table.session();
        let shared = LockRequest::session(encode_int64(2)).shared();

        assert!(try_lock(&mut a, &shared).await);
        assert!(try_lock(&mut b, &shared).await);
        assert!(!try_lock(&mut b, &LockRequest::session(encode_int64(2))).await);
        // Wrong mode releases nothing
        assert!(!unlock(&mut a, &LockRequest::session(encode_int64(2))).await);
        assert!(unlock(&mut a, &shared).await);
        assert!(unlock(&mut b, &shared).await);
    }

    #[tokio::test]
    async fn test_session_lock_is_reentrant() {
        let table = MemoryLockTable::new();
        let mut a = table.session();
        let mut b = table.session();
        let request = LockRequest::session(encode_int64(3));

        assert!(try_lock(&mut a, &request).await);
        assert!(try_lock(&mut a, &request).await);
        assert!(unlock(&mut a, &request).await);
        assert!(!try_lock(&mut b, &request).await);
        assert!(unlock(&mut a, &request).await);
        assert!(!unlock(&mut a, &request).await);
        assert!(try_lock(&mut b, &request).await);
    }

    #[tokio::test]
    async fn test_single_and_pair_keys_are_distinct_provider_locks() {
        let table = MemoryLockTable::new();
        let mut a = table.session();
        let mut b = table.session();
        let single = LockRequest::session(encode_int64(0x0000_0001_0000_0002));
        let pair = LockRequest::session(encode_int32_pair(1, 2));

        assert!(try_lock(&mut a, &single).await);
        assert!(try_lock(&mut b, &pair).await);
        // Both provider locks share one 64-bit value.
        assert_eq!(a.held_keys().await.unwrap(), vec![encode_int64(0x0000_0001_0000_0002)]);
    }

    #[tokio::test]
    async fn test_transaction_locks_end_with_transaction() {
        let table = MemoryLockTable::new();
        let mut a = table.session();
        let mut b = table.session();
        let request = LockRequest::transaction(encode_int64(4));

        a.begin();
        assert!(try_lock(&mut a, &request).await);
        b.begin();
        assert!(!try_lock(&mut b, &request).await);

        a.commit();
        assert!(!a.in_transaction());
        assert!(try_lock(&mut b, &request).await);
        b.rollback();
        assert!(!b.is_key_held(encode_int64(4)).await.unwrap());
    }

    #[tokio::test]
    async fn test_drop_ends_session() {
        let table = MemoryLockTable::new();
        let mut b = table.session();
        let request = LockRequest::session(encode_int64(5));
        {
            let mut a = table.session();
            assert!(try_lock(&mut a, &request).await);
            assert!(!try_lock(&mut b, &request).await);
        }
        assert!(try_lock(&mut b, &request).await);
    }

    #[tokio::test]
    async fn test_blocking_lock_waits_for_release() {
        let table = MemoryLockTable::new();
        let mut a = table.session();
        let request = LockRequest::session(encode_int64(6));
        assert!(try_lock(&mut a, &request).await);

        let mut b = table.session();
        let waiter = tokio::spawn(async move {
            b.invoke(&acquire_invocation(&request, WaitPolicy::Wait))
                .await
                .unwrap();
            b
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        assert!(unlock(&mut a, &request).await);
        let mut b = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!try_lock(&mut a, &request).await);
        assert!(unlock(&mut b, &request).await);
    }

    #[tokio::test]
    async fn test_return_shape_mismatch_is_reported() {
        let table = MemoryLockTable::new();
        let mut a = table.session();
        let request = LockRequest::session(encode_int64(7));

        let result = a.invoke(&release_invocation(&request)).await;
        assert!(matches!(result, Err(LockError::ProviderError(_))));
        let result = a
            .invoke_for_bool(&acquire_invocation(&request, WaitPolicy::Wait))
            .await;
        assert!(matches!(result, Err(LockError::ProviderError(_))));
    }
}
