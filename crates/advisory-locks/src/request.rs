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

//! Lock request model: a key plus scope and mode.

use crate::key::LockKey;
use serde::{Deserialize, Serialize};

/// Lifetime of a granted lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// Held until released or the holding session ends
    Session,
    /// Held until the enclosing transaction ends; requires an open transaction
    Transaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    Exclusive,
    Shared,
}

/// One lock attempt: immutable, caller-owned, discarded after the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    key: LockKey,
    scope: LockScope,
    mode: LockMode,
}

impl LockRequest {
    pub fn new(key: LockKey, scope: LockScope, mode: LockMode) -> Self {
        Self { key, scope, mode }
    }

    /// Exclusive session-scoped request.
    pub fn session(key: LockKey) -> Self {
        Self::new(key, LockScope::Session, LockMode::Exclusive)
    }

    /// Exclusive transaction-scoped request.
    pub fn transaction(key: LockKey) -> Self {
        Self::new(key, LockScope::Transaction, LockMode::Exclusive)
    }

    /// Same request in shared mode.
    pub fn shared(self) -> Self {
        Self {
            mode: LockMode::Shared,
            ..self
        }
    }

    pub fn key(&self) -> LockKey {
        self.key
    }

    pub fn scope(&self) -> LockScope {
        self.scope
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}
