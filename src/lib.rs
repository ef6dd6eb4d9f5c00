/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A delegated-proof-of-stake block processing core.
//!
//! This library maintains a consistent, fork-aware ledger state by ingesting candidate blocks
//! and transactions, validating them against consensus rules, and committing or unwinding their
//! effects under an undo/redo discipline. It also produces new blocks when the local node's
//! witness is scheduled to do so.
//!
//! The four subsystems at the center of the design share state and preserve one invariant: the
//! in-memory state always matches the sequence of blocks from genesis to the current head, plus
//! an optional top-of-stack of pending transactions. The four are:
//!
//! - the [fork database](fork_db), which tracks competing chains and picks the best head,
//! - the [undo stack](state::undo), which lets speculative changes be committed or rolled back
//!   atomically at any nesting depth,
//! - the [pending pool](chain::Chain::pending_transactions), whose validity is re-derived every
//!   time the head moves, and
//! - the [block pipeline](chain), which orchestrates pushing, producing, and popping blocks.
//!
//! What this library deliberately does not contain: peer-to-peer networking, an RPC surface, a
//! durable ledger persistence format, and the domain logic of individual operations beyond the
//! built-in [evaluators](evaluator). Nodes plug their own evaluators in, the same way they plug
//! in a [block store](block_store).
//!
//! ## Threading
//!
//! A [`Chain`] is a single logical writer: wrap it in a read/write lock and serialize every
//! state-mutating call. The one internally parallel path is
//! [precomputation](chain::Chain::precompute_parallel), which only touches per-transaction
//! caches. [Events](events) are delivered on the separate [event bus](event_bus) thread.

pub mod block_store;

pub mod chain;

pub mod config;

pub mod evaluator;

pub mod event_bus;

pub mod events;

pub mod fork_db;

pub mod logging;

pub mod precompute;

pub mod state;

pub mod types;

// Re-exports
pub use chain::{BlockError, Chain, TransactionError};
