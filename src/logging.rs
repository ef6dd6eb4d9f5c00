/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The engine logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values
//! are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following
//! snippet is how an [ApplyBlock](crate::events::ApplyBlockEvent) is printed:
//!
//! ```text
//! ApplyBlock, 1701329264, AAAAC37, 11, 3
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the block's id.
//! - The fourth value is the block's number.
//! - The fifth value is the number of transactions in the block.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const APPLY_BLOCK: &str = "ApplyBlock";
pub const PENDING_TRANSACTION: &str = "PendingTransaction";
pub const POP_BLOCK: &str = "PopBlock";
pub const SWITCH_FORK: &str = "SwitchFork";
pub const CHANGED_OBJECTS: &str = "ChangedObjects";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for ApplyBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |apply_block_event: &ApplyBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                APPLY_BLOCK,
                secs_since_unix_epoch(apply_block_event.timestamp),
                first_seven_base64_chars(&apply_block_event.block.id().bytes()),
                apply_block_event.block.block_num(),
                apply_block_event.block.transactions.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for PendingTransactionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |pending_transaction_event: &PendingTransactionEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PENDING_TRANSACTION,
                secs_since_unix_epoch(pending_transaction_event.timestamp),
                first_seven_base64_chars(&pending_transaction_event.transaction.id().bytes()),
                pending_transaction_event
                    .transaction
                    .transaction
                    .operations
                    .len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for PopBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |pop_block_event: &PopBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                POP_BLOCK,
                secs_since_unix_epoch(pop_block_event.timestamp),
                first_seven_base64_chars(&pop_block_event.block.bytes()),
                pop_block_event.block.number()
            )
        };
        Box::new(logger)
    }
}

impl Logger for SwitchForkEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |switch_fork_event: &SwitchForkEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SWITCH_FORK,
                secs_since_unix_epoch(switch_fork_event.timestamp),
                first_seven_base64_chars(&switch_fork_event.new_head.bytes()),
                switch_fork_event.new_head.number()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ChangedObjectsEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |changed_objects_event: &ChangedObjectsEvent| {
            log::info!(
                "{}, {}",
                CHANGED_OBJECTS,
                secs_since_unix_epoch(changed_objects_event.timestamp)
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first
// 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}
