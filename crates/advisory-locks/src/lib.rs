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

//! # PlexSpaces Advisory Locks
//!
//! ## Purpose
//! Client library for coordinating mutual exclusion through PostgreSQL
//! advisory locks. The database owns the lock table and the exclusion
//! algorithm; this crate maps identifiers onto the 64-bit advisory key space
//! and every lock request onto the right `pg_*advisory*` function.
//!
//! ## Architecture Context
//! - **Key Encoder** ([`key`]): integers, integer pairs, short ASCII names,
//!   hex pair strings and (opt-in) hashed names → [`LockKey`]
//! - **Request Model** ([`request`]): key + [`LockScope`] + [`LockMode`]
//! - **Dispatcher** ([`dispatch`]): request + wait policy → one [`Invocation`]
//! - **Client** ([`AdvisoryLockClient`]): `lock`, `try_lock`, `unlock`
//! - **Registry** ([`LockRegistry`]): monitoring-only view of held locks
//!
//! ## Design Decisions
//! - **No local lock state**: every call is one provider round trip
//! - **Session per provider value**: session-scoped locks belong to one
//!   dedicated connection, so providers are used through `&mut`
//! - **No retries**: provider faults surface unchanged
//!
//! ## Backend Support
//!
//! - **InMemory**: in-process lock table (feature: `memory-backend`, default)
//! - **PostgreSQL**: `pg_advisory_*` functions over `sqlx` (feature: `postgres-backend`)
//!
//! ## Examples
//!
//! ### Basic Usage
//! ```rust
//! use plexspaces_advisory_locks::{AdvisoryLockClient, LockRequest, memory::MemoryLockTable};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let table = MemoryLockTable::new();
//! let mut client = AdvisoryLockClient::new(table.session());
//! let mut other = AdvisoryLockClient::new(table.session());
//!
//! let request = LockRequest::session(client.encode_name("orders")?);
//! assert!(client.try_lock(&request).await?);
//! assert!(!other.try_lock(&request).await?);
//!
//! assert!(client.unlock(&request).await?);
//! assert!(!client.unlock(&request).await?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod key;
pub mod provider;
pub mod registry;
pub mod request;

#[cfg(feature = "memory-backend")]
pub mod memory;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub use client::AdvisoryLockClient;
pub use config::{BackendType, LockConfig};
pub use dispatch::{acquire_invocation, release_invocation, Invocation, WaitPolicy};
pub use error::{EncodingError, LockError, LockResult, PreconditionError};
pub use key::{encode_int32_pair, encode_int64, encode_name, KeyEncoding, LockKey};
pub use provider::LockProvider;
pub use registry::LockRegistry;
pub use request::{LockMode, LockRequest, LockScope};
