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

//! Lock registry inspector.
//!
//! Read-only queries over the provider's advisory locks. Monitoring only:
//! results can be stale the instant after they are read, so never base a
//! synchronization decision on them.

use crate::key::LockKey;
use crate::provider::LockProvider;
use crate::LockResult;
use tracing::{debug, instrument};

/// Registry view over one provider session.
pub struct LockRegistry<'a, P: ?Sized> {
    provider: &'a mut P,
}

impl<'a, P: LockProvider + ?Sized> LockRegistry<'a, P> {
    pub fn new(provider: &'a mut P) -> Self {
        Self { provider }
    }

    /// Distinct keys of all advisory locks held by any session.
    ///
    /// Keys are reported by arity (`Int64` or `Int32Pair`); the encoding a
    /// caller originally used is not recoverable.
    #[instrument(skip(self))]
    pub async fn list_held(&mut self) -> LockResult<Vec<LockKey>> {
        let keys = self.provider.held_keys().await?;
        debug!(count = keys.len(), "listed held advisory locks");
        Ok(keys)
    }

    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn is_held_by_any_session(&mut self, key: LockKey) -> LockResult<bool> {
        self.provider.is_key_held(key).await
    }

    /// Release every session-scoped lock held by this session.
    #[instrument(skip(self))]
    pub async fn release_all_mine(&mut self) -> LockResult<()> {
        self.provider.unlock_all().await?;
        debug!("released all session advisory locks");
        Ok(())
    }
}
