/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The undo stack: reversible sessions of mutations over the
//! [object database](crate::state::object_db::ObjectDatabase).
//!
//! ## Sessions
//!
//! A session is a scope of mutations that can be reverted as a unit. Sessions nest: while a
//! session is open, starting another creates a child, and only the top of the stack may be
//! closed. Closing happens in one of three ways:
//!
//! - **commit**: the session's entries fold into the parent session; if the session is the bottom
//!   of the stack, it becomes the newest *committed* session.
//! - **merge**: identical to commit for nested sessions. The name signals that the parent stays
//!   open to absorb more children, which is how the pending-transaction session grows.
//! - **undo**: the session's entries are replayed in reverse against the database, erasing its
//!   effects.
//!
//! ## Committed sessions
//!
//! Committed sessions are retained, newest last, so that [`pop_commit`](UndoStack::pop_commit)
//! can rewind the database one committed session (one block) at a time. At most `max_size`
//! committed sessions are retained; when one too many is committed the oldest is hard-committed,
//! meaning its entries are dropped and the database can no longer rewind past it.
//!
//! ## Recording
//!
//! Every mutating table operation on the object database records its inverse here: a creation
//! records the new object's key, a modification records the old value, a removal records the
//! removed value. Mutations made while no session is open (only genesis initialization does
//! this) are permanent from the start.

use std::collections::VecDeque;

use crate::state::objects::{
    AccountObject, BlockSummaryObject, DynamicGlobalProperties, LimitOrderObject, ProposalObject,
    TransactionObject, WitnessObject, WitnessScheduleObject,
};
use crate::types::data_types::{
    AccountId, OrderId, ProposalId, TransactionId, WitnessId,
};

/// The inverse of one mutating table operation. Replaying a session's entries in reverse order
/// restores the database to the state it had when the session started.
#[derive(Clone, Debug)]
pub(crate) enum UndoEntry {
    AccountModified(AccountId, AccountObject),
    WitnessModified(WitnessId, WitnessObject),
    LimitOrderCreated(OrderId),
    LimitOrderRemoved(OrderId, LimitOrderObject),
    ProposalCreated(ProposalId),
    ProposalModified(ProposalId, ProposalObject),
    ProposalRemoved(ProposalId, ProposalObject),
    TransactionCreated(TransactionId),
    TransactionRemoved(TransactionId, TransactionObject),
    BlockSummaryModified(u16, BlockSummaryObject),
    WitnessScheduleModified(WitnessScheduleObject),
    DynamicGlobalPropertiesModified(DynamicGlobalProperties),
}

pub(crate) struct UndoStack {
    /// Open sessions, bottom first. The last element is the only one that may be closed.
    active: Vec<Vec<UndoEntry>>,
    /// Committed sessions, oldest first.
    committed: VecDeque<Vec<UndoEntry>>,
    max_size: usize,
}

impl UndoStack {
    pub(crate) fn new(max_size: usize) -> UndoStack {
        UndoStack {
            active: Vec::new(),
            committed: VecDeque::new(),
            max_size,
        }
    }

    /// Whether mutations are currently being recorded, i.e., whether any session is open.
    pub(crate) fn is_recording(&self) -> bool {
        !self.active.is_empty()
    }

    pub(crate) fn record(&mut self, entry: UndoEntry) {
        if let Some(top) = self.active.last_mut() {
            top.push(entry);
        }
    }

    pub(crate) fn start_session(&mut self) {
        self.active.push(Vec::new());
    }

    pub(crate) fn active_sessions(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn committed_sessions(&self) -> usize {
        self.committed.len()
    }

    /// Closes the top session, folding its entries into the parent, or retaining them as the
    /// newest committed session if the closed session was the bottom of the stack. Returns false
    /// if no session is open.
    pub(crate) fn commit_session(&mut self) -> bool {
        let entries = match self.active.pop() {
            Some(entries) => entries,
            None => return false,
        };
        match self.active.last_mut() {
            // The parent's entries precede the child's in time, so the child's are appended:
            // reverse replay then visits the child's entries first.
            Some(parent) => parent.extend(entries),
            None => {
                self.committed.push_back(entries);
                if self.committed.len() > self.max_size {
                    self.committed.pop_front();
                }
            }
        }
        true
    }

    /// Identical to [`commit_session`](Self::commit_session); see the module documentation for
    /// when to call which.
    pub(crate) fn merge_session(&mut self) -> bool {
        self.commit_session()
    }

    /// Closes the top session and hands its entries back for reverse replay. Returns `None` if no
    /// session is open.
    pub(crate) fn undo_session(&mut self) -> Option<Vec<UndoEntry>> {
        self.active.pop()
    }

    /// Removes the newest committed session and hands its entries back for reverse replay.
    /// Returns `None` if nothing committed remains within the undo horizon.
    ///
    /// # Precondition
    /// No session is open.
    pub(crate) fn pop_commit(&mut self) -> Option<Vec<UndoEntry>> {
        debug_assert!(
            self.active.is_empty(),
            "pop_commit with {} session(s) still open",
            self.active.len()
        );
        self.committed.pop_back()
    }
}
