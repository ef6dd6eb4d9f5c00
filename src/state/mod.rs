/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The mutable ledger state of the chain: the [object database](object_db::ObjectDatabase) of
//! [ledger entities](objects), and the [undo stack](undo) that makes every mutation reversible.
//!
//! The invariant this module exists to preserve: the database's contents always equal the result
//! of applying the blocks from genesis to the current head, plus the effects of whichever undo
//! sessions are currently open on top.

pub mod object_db;

pub mod objects;

pub mod undo;
