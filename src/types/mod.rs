/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The types defined in [`crate::types`] are common across the components of the engine. Types
//! specific to one component are defined in that component's module.

pub mod block;

pub mod data_types;

pub mod operations;

pub mod transaction;

use borsh::BorshSerialize;

pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};

/// The packed size of a value: the length of its serialization in bytes. Block and transaction
/// size limits are measured in packed sizes.
pub fn pack_size<T: BorshSerialize>(value: &T) -> usize {
    borsh::to_vec(value).unwrap().len()
}
