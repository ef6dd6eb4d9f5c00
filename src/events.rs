/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Notifications that are emitted when significant things happen in the local chain engine.
//!
//! ## Event enum
//!
//! Significant occurences in the engine include applying a block, accepting a transaction into
//! the pending pool, popping a block, and switching forks.
//!
//! Each of these significant occurences corresponds to a variant of the [event enum](Event). Each
//! variant tuple in turn contains an inner struct type storing information that summarizes the
//! particular kind of event, always including a timestamp corresponding to the exact time when
//! the event occured.
//!
//! ## Registering event handlers
//!
//! Library users can register event handler closures, which are then internally called by the
//! library's [event bus](crate::event_bus::start_event_bus) thread when the handler's particular
//! event variant happens. Default event handlers that log out events can be enabled alongside.
//!
//! ## Timing
//!
//! Events are emitted **after** the corresponding occurence is completed, and outside the
//! engine's writer critical section: the engine fires them and does not wait for handlers.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::block::SignedBlock;
use crate::types::data_types::BlockId;
use crate::types::transaction::SignedTransaction;

/// Enumerates all events defined for the chain engine.
pub enum Event {
    ApplyBlock(ApplyBlockEvent),
    PendingTransaction(PendingTransactionEvent),
    PopBlock(PopBlockEvent),
    SwitchFork(SwitchForkEvent),
    ChangedObjects(ChangedObjectsEvent),
}

impl Event {
    /// Publishes a given instance of the [Event](Event) enum on the event publisher channel (if
    /// the channel is defined).
    pub fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A block was applied and committed: its effects are now part of the ledger state and the block
/// has been written to the block store.
pub struct ApplyBlockEvent {
    pub timestamp: SystemTime,
    pub block: SignedBlock,
}

/// A transaction passed validation and was accepted into the pending pool.
pub struct PendingTransactionEvent {
    pub timestamp: SystemTime,
    pub transaction: SignedTransaction,
}

/// The block identified by the contained id was popped off the head of the chain and its effects
/// undone.
pub struct PopBlockEvent {
    pub timestamp: SystemTime,
    pub block: BlockId,
}

/// The engine abandoned its branch in favor of a longer fork whose head is the contained id.
pub struct SwitchForkEvent {
    pub timestamp: SystemTime,
    pub new_head: BlockId,
}

/// The set of ledger objects changed outside the regular flow of applying a block, e.g., because
/// a pending transaction mutated speculative state.
pub struct ChangedObjectsEvent {
    pub timestamp: SystemTime,
}
