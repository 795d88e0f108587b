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

//! Request dispatcher.
//!
//! ## Purpose
//! Turns a [`LockRequest`] into exactly one provider invocation: which
//! advisory function to call and with which positional parameters.
//!
//! ## Design Decisions
//! - **Flat table**: the ten function names are one exhaustive match over
//!   (wait, scope, mode) for acquire and mode for release, so every
//!   combination is visible and testable in one place
//! - **Release is session-only**: transaction-scoped locks end with their
//!   transaction and have no unlock function
//! - **Arity follows the key**: `Int32Pair` keys pass two `INTEGER`
//!   parameters, every other encoding passes one `BIGINT`
//! - **Never fails**: context errors (no open transaction) are the
//!   provider's to report

use crate::key::{encode_int32_pair, encode_int64, LockKey};
use crate::request::{LockMode, LockRequest, LockScope};

/// Blocking or non-blocking acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitPolicy {
    /// Block until granted
    Wait,
    /// Return immediately with the outcome
    NoWait,
}

/// Advisory function the provider is asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvisoryFunction {
    Lock {
        wait: WaitPolicy,
        scope: LockScope,
        mode: LockMode,
    },
    Unlock {
        mode: LockMode,
    },
}

impl AdvisoryFunction {
    /// Function name without the provider's `pg_` prefix.
    pub fn name(&self) -> &'static str {
        use LockMode::{Exclusive, Shared};
        use LockScope::{Session, Transaction};
        use WaitPolicy::{NoWait, Wait};

        match *self {
            AdvisoryFunction::Lock { wait: Wait, scope: Session, mode: Exclusive } => "advisory_lock",
            AdvisoryFunction::Lock { wait: Wait, scope: Session, mode: Shared } => "advisory_lock_shared",
            AdvisoryFunction::Lock { wait: Wait, scope: Transaction, mode: Exclusive } => "advisory_xact_lock",
            AdvisoryFunction::Lock { wait: Wait, scope: Transaction, mode: Shared } => {
                "advisory_xact_lock_shared"
            }
            AdvisoryFunction::Lock { wait: NoWait, scope: Session, mode: Exclusive } => "try_advisory_lock",
            AdvisoryFunction::Lock { wait: NoWait, scope: Session, mode: Shared } => {
                "try_advisory_lock_shared"
            }
            AdvisoryFunction::Lock { wait: NoWait, scope: Transaction, mode: Exclusive } => {
                "try_advisory_xact_lock"
            }
            AdvisoryFunction::Lock { wait: NoWait, scope: Transaction, mode: Shared } => {
                "try_advisory_xact_lock_shared"
            }
            AdvisoryFunction::Unlock { mode: Exclusive } => "advisory_unlock",
            AdvisoryFunction::Unlock { mode: Shared } => "advisory_unlock_shared",
        }
    }

    pub fn scope(&self) -> LockScope {
        match self {
            AdvisoryFunction::Lock { scope, .. } => *scope,
            AdvisoryFunction::Unlock { .. } => LockScope::Session,
        }
    }

    pub fn mode(&self) -> LockMode {
        match self {
            AdvisoryFunction::Lock { mode, .. } | AdvisoryFunction::Unlock { mode } => *mode,
        }
    }

    /// Whether the provider answers with a boolean (everything but a blocking acquire).
    pub fn returns_bool(&self) -> bool {
        !matches!(self, AdvisoryFunction::Lock { wait: WaitPolicy::Wait, .. })
    }
}

/// Positional parameters of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationParams {
    /// One `BIGINT` key
    Single(i64),
    /// Two `INTEGER` keys (high, low)
    Pair(i32, i32),
}

impl InvocationParams {
    pub fn for_key(key: LockKey) -> Self {
        if key.is_pair() {
            let (high, low) = key.halves();
            InvocationParams::Pair(high, low)
        } else {
            InvocationParams::Single(key.value())
        }
    }

    /// Number of positional parameters.
    pub fn arity(&self) -> usize {
        match self {
            InvocationParams::Single(_) => 1,
            InvocationParams::Pair(..) => 2,
        }
    }

    /// Key these parameters address, tagged by arity.
    pub fn key(&self) -> LockKey {
        match *self {
            InvocationParams::Single(value) => encode_int64(value),
            InvocationParams::Pair(high, low) => encode_int32_pair(high, low),
        }
    }
}

/// A fully parameterized provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    function: AdvisoryFunction,
    params: InvocationParams,
}

impl Invocation {
    pub fn function(&self) -> AdvisoryFunction {
        self.function
    }

    pub fn params(&self) -> InvocationParams {
        self.params
    }

    pub fn name(&self) -> &'static str {
        self.function.name()
    }

    /// Schema-qualified SQL with positional placeholders.
    pub fn sql(&self) -> String {
        let placeholders = match self.params {
            InvocationParams::Single(_) => "$1",
            InvocationParams::Pair(..) => "$1, $2",
        };
        format!("SELECT pg_catalog.pg_{}({})", self.name(), placeholders)
    }
}

/// Build the acquire invocation for `request`.
pub fn acquire_invocation(request: &LockRequest, wait: WaitPolicy) -> Invocation {
    Invocation {
        function: AdvisoryFunction::Lock {
            wait,
            scope: request.scope(),
            mode: request.mode(),
        },
        params: InvocationParams::for_key(request.key()),
    }
}

/// Build the release invocation for `request`; always session scope.
pub fn release_invocation(request: &LockRequest) -> Invocation {
    Invocation {
        function: AdvisoryFunction::Unlock { mode: request.mode() },
        params: InvocationParams::for_key(request.key()),
    }
}
