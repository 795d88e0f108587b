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

//! Lock provider trait: the seam to the service that owns the lock table.

use crate::dispatch::Invocation;
use crate::key::LockKey;
use crate::LockResult;
use async_trait::async_trait;

/// A single provider session able to run advisory invocations.
///
/// ## Purpose
/// The provider enforces mutual exclusion; implementations only forward
/// invocations built by the dispatcher and report the outcome.
///
/// ## Design
/// - **One value, one session**: methods take `&mut self` because
///   session-scoped locks live on one dedicated connection
/// - **No retries**: provider faults surface as `LockError::ProviderError`
/// - **Preconditions**: transaction-scoped invocations outside a
///   transaction fail with `PreconditionError::NoActiveTransaction`
///
/// ## Example
/// ```rust,ignore
/// let invocation = acquire_invocation(&request, WaitPolicy::NoWait);
/// let granted = provider.invoke_for_bool(&invocation).await?;
/// ```
#[async_trait]
pub trait LockProvider: Send {
    /// Run an invocation with no result (blocking acquire).
    ///
    /// Returns once the provider has granted the lock.
    async fn invoke(&mut self, invocation: &Invocation) -> LockResult<()>;

    /// Run an invocation answering with a boolean (try-acquire, release).
    ///
    /// ## Returns
    /// - `Ok(true)`: lock granted / released
    /// - `Ok(false)`: lock unavailable / was not held
    async fn invoke_for_bool(&mut self, invocation: &Invocation) -> LockResult<bool>;

    /// Distinct keys of every advisory lock currently granted to any session.
    async fn held_keys(&mut self) -> LockResult<Vec<LockKey>>;

    /// Whether any session holds an advisory lock with this 64-bit value.
    async fn is_key_held(&mut self, key: LockKey) -> LockResult<bool>;

    /// Release every session-scoped advisory lock held by this session.
    async fn unlock_all(&mut self) -> LockResult<()>;
}

#[async_trait]
impl<P: LockProvider + ?Sized> LockProvider for &mut P {
    async fn invoke(&mut self, invocation: &Invocation) -> LockResult<()> {
        (**self).invoke(invocation).await
    }

    async fn invoke_for_bool(&mut self, invocation: &Invocation) -> LockResult<bool> {
        (**self).invoke_for_bool(invocation).await
    }

    async fn held_keys(&mut self) -> LockResult<Vec<LockKey>> {
        (**self).held_keys().await
    }

    async fn is_key_held(&mut self, key: LockKey) -> LockResult<bool> {
        (**self).is_key_held(key).await
    }

    async fn unlock_all(&mut self) -> LockResult<()> {
        (**self).unlock_all().await
    }
}
