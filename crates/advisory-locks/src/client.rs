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

//! Lock client: acquire, try-acquire and release over a provider session.

use crate::config::LockConfig;
use crate::dispatch::{acquire_invocation, release_invocation, WaitPolicy};
use crate::key::{encode_name, LockKey};
use crate::provider::LockProvider;
use crate::registry::LockRegistry;
use crate::request::{LockRequest, LockScope};
use crate::LockResult;
use tracing::{debug, instrument, warn};

/// Advisory lock client bound to one provider session.
///
/// ## Purpose
/// Exposes the uniform lock contract. Each call builds one invocation
/// through the dispatcher and hands it to the provider; the client keeps no
/// lock state of its own.
///
/// ## Example
/// ```rust
/// use plexspaces_advisory_locks::{AdvisoryLockClient, LockRequest, memory::MemoryLockTable};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let table = MemoryLockTable::new();
/// let mut client = AdvisoryLockClient::new(table.session());
///
/// let key = client.encode_name("orders")?;
/// let request = LockRequest::session(key);
/// assert!(client.try_lock(&request).await?);
/// assert!(client.unlock(&request).await?);
/// # Ok(())
/// # }
/// ```
pub struct AdvisoryLockClient<P> {
    provider: P,
    allow_hashing: bool,
}

impl<P: LockProvider> AdvisoryLockClient<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            allow_hashing: false,
        }
    }

    /// Create a client with the name-encoding policy of `config`.
    pub fn with_config(provider: P, config: &LockConfig) -> Self {
        Self::new(provider).with_hashing(config.allow_hashing)
    }

    /// Let [`encode_name`](Self::encode_name) fall back to hashing arbitrary names.
    pub fn with_hashing(mut self, allow_hashing: bool) -> Self {
        self.allow_hashing = allow_hashing;
        self
    }

    /// Encode a lock name using this client's hashing policy.
    pub fn encode_name(&self, name: &str) -> LockResult<LockKey> {
        Ok(encode_name(name, self.allow_hashing)?)
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Read-only view of the provider's lock table.
    pub fn registry(&mut self) -> LockRegistry<'_, P> {
        LockRegistry::new(&mut self.provider)
    }

    /// Acquire a lock, waiting until the provider grants it.
    ///
    /// ## Errors
    /// - `LockError::Precondition`: transaction scope with no open transaction
    /// - `LockError::ProviderError`: provider fault, not retried
    #[instrument(skip(self, request), fields(key = %request.key(), scope = ?request.scope(), mode = ?request.mode()))]
    pub async fn lock(&mut self, request: &LockRequest) -> LockResult<()> {
        let invocation = acquire_invocation(request, WaitPolicy::Wait);
        debug!(invocation = invocation.name(), "waiting for advisory lock");
        self.provider.invoke(&invocation).await?;
        debug!("advisory lock granted");
        Ok(())
    }

    /// Try to acquire a lock without waiting.
    ///
    /// ## Returns
    /// - `Ok(true)`: granted, now held by this session or transaction
    /// - `Ok(false)`: unavailable, nothing held
    #[instrument(skip(self, request), fields(key = %request.key(), scope = ?request.scope(), mode = ?request.mode()))]
    pub async fn try_lock(&mut self, request: &LockRequest) -> LockResult<bool> {
        let invocation = acquire_invocation(request, WaitPolicy::NoWait);
        let granted = self.provider.invoke_for_bool(&invocation).await?;
        debug!(invocation = invocation.name(), granted, "advisory lock attempt");
        Ok(granted)
    }

    /// Release a session-scoped lock.
    ///
    /// Transaction-scoped locks end with their transaction; a release for one
    /// still issues the session unlock, which reports `false` unless the
    /// session also holds the key.
    ///
    /// ## Returns
    /// - `Ok(true)`: the lock was held and is released
    /// - `Ok(false)`: this session did not hold it (not an error)
    #[instrument(skip(self, request), fields(key = %request.key(), scope = ?request.scope(), mode = ?request.mode()))]
    pub async fn unlock(&mut self, request: &LockRequest) -> LockResult<bool> {
        if request.scope() == LockScope::Transaction {
            warn!("transaction-scoped locks are released at transaction end; issuing session unlock");
        }
        let invocation = release_invocation(request);
        let released = self.provider.invoke_for_bool(&invocation).await?;
        if released {
            debug!(invocation = invocation.name(), "advisory lock released");
        } else {
            debug!(invocation = invocation.name(), "advisory lock was not held by this session");
        }
        Ok(released)
    }
}
