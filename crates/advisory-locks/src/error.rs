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

//! Error types for advisory lock operations.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors raised by the key encoder when an identifier cannot be mapped to a key.
///
/// Always recoverable: pick another identifier form or enable hashing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Name has more characters than the ASCII encoding can pack
    #[error("Name too long for ASCII encoding: {len} characters, at most {max}")]
    TooLong { len: usize, max: usize },

    /// Name contains a code point above 127
    #[error("Name contains non-ASCII character {0:?}")]
    NonAscii(char),

    /// Text is neither 16 hex digits nor two 8-digit halves split by a comma
    #[error("Not a hash-pair string: {0:?}")]
    NotHashForm(String),

    /// No applicable encoding accepted the name
    #[error(
        "Unsupported lock name {name:?}: expected an ASCII name of at most 9 characters, \
         16 hex digits, or two 8-digit hex halves separated by a comma{}",
        hashing_note(.hashing_allowed)
    )]
    Unsupported { name: String, hashing_allowed: bool },
}

fn hashing_note(hashing_allowed: &bool) -> &'static str {
    if *hashing_allowed {
        ""
    } else {
        " (hashing of arbitrary names is disabled)"
    }
}

/// Preconditions the provider checks before running an invocation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionError {
    /// Transaction-scoped invocation issued with no transaction open
    #[error("Transaction-scoped lock requested with no active transaction")]
    NoActiveTransaction,
}

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Key encoding failed
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Provider rejected the call's context
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// Provider fault (connection loss, timeout, server error)
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[cfg(feature = "postgres-backend")]
impl From<sqlx::Error> for LockError {
    fn from(err: sqlx::Error) -> Self {
        LockError::ProviderError(format!("SQL error: {}", err))
    }
}
