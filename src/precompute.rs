/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Parallel precomputation of the expensive, stateless parts of block validation.
//!
//! Before a block is pushed, its transactions can be fanned out across a worker pool in chunks of
//! ⌈n / workers⌉. Each worker runs the stateless structural check, computes the transaction id,
//! and verifies the signatures (each subject to the relevant skip flag), and the results are
//! written into the [caches](crate::types::transaction::SignedTransaction) carried by the
//! transactions of the original block. The block's own id and merkle root are computed and cached
//! alongside. The apply path then finds every expensive value already computed.
//!
//! The pass is idempotent: values cached earlier are kept, and precomputing the same block twice
//! is harmless. No worker ever touches mutable engine state, which is what makes this the one
//! place in the engine where parallelism is safe.

use std::collections::BTreeSet;
use std::sync::mpsc;
use threadpool::ThreadPool;

use crate::types::block::SignedBlock;
use crate::types::data_types::{ChainID, SkipFlags, TransactionId, VerifyingKeyBytes};
use crate::types::transaction::{MalformedTransactionError, SignedTransaction};

/// Everything a worker computed about one transaction.
type TransactionResults = (Option<TransactionId>, Option<BTreeSet<VerifyingKeyBytes>>);

/// Precomputes a block and its transactions on `pool`, blocking until every worker chunk has
/// finished. The first error any worker hit is returned, after all workers have completed.
pub(crate) fn precompute_block(
    pool: &ThreadPool,
    chain_id: ChainID,
    block: &SignedBlock,
    skip: SkipFlags,
) -> Result<(), PrecomputeError> {
    let mut first_error = None;

    if !block.transactions.is_empty() {
        if skip.contains(SkipFlags::EXPENSIVE) {
            // Everything expensive is skipped; the remaining structural checks are too cheap to
            // be worth shipping to workers.
            for trx in &block.transactions {
                if let Err(error) = precompute_transaction(chain_id, &trx.transaction, skip) {
                    first_error.get_or_insert(error);
                }
            }
        } else {
            let workers = pool.max_count().max(1);
            let count = block.transactions.len();
            let chunk_size = (count + workers - 1) / workers;
            let (result_sender, result_receiver) = mpsc::channel();

            let mut chunks = 0;
            for (chunk_index, chunk) in block.transactions.chunks(chunk_size).enumerate() {
                let transactions: Vec<SignedTransaction> =
                    chunk.iter().map(|trx| trx.transaction.clone()).collect();
                let result_sender = result_sender.clone();
                chunks += 1;
                pool.execute(move || {
                    let result = precompute_chunk(chain_id, &transactions, skip);
                    // The receiver outlives every worker; a send cannot fail.
                    let _ = result_sender.send((chunk_index, result));
                });
            }
            drop(result_sender);

            let base_of = |chunk_index: usize| chunk_index * chunk_size;
            for _ in 0..chunks {
                match result_receiver.recv() {
                    Ok((chunk_index, Ok(results))) => {
                        for (offset, (id, keys)) in results.into_iter().enumerate() {
                            block.transactions[base_of(chunk_index) + offset]
                                .transaction
                                .fill_caches(id, keys);
                        }
                    }
                    Ok((_, Err(error))) => {
                        first_error.get_or_insert(error);
                    }
                    Err(_) => break,
                }
            }
        }
    }

    if !skip.contains(SkipFlags::MERKLE_CHECK) {
        block.calculate_merkle_root();
    }
    block.fill_id_cache(block.header.compute_id());

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Precomputes a single transaction in place on the calling thread: structural validation, then
/// id and signature keys under the given skip flags.
pub(crate) fn precompute_transaction(
    chain_id: ChainID,
    trx: &SignedTransaction,
    skip: SkipFlags,
) -> Result<(), PrecomputeError> {
    trx.validate().map_err(PrecomputeError::Malformed)?;
    if !skip.contains(SkipFlags::TRANSACTION_DUPE_CHECK) {
        trx.id();
    }
    if !skip.contains(SkipFlags::TRANSACTION_SIGNATURES) {
        trx.signature_keys(chain_id)
            .map_err(PrecomputeError::Signature)?;
    }
    Ok(())
}

/// The worker side: computes results for a chunk of cloned transactions. The first invalid
/// transaction fails the whole chunk.
fn precompute_chunk(
    chain_id: ChainID,
    transactions: &[SignedTransaction],
    skip: SkipFlags,
) -> Result<Vec<TransactionResults>, PrecomputeError> {
    let mut results = Vec::with_capacity(transactions.len());
    for trx in transactions {
        trx.validate().map_err(PrecomputeError::Malformed)?;
        let id = if !skip.contains(SkipFlags::TRANSACTION_DUPE_CHECK) {
            Some(trx.id())
        } else {
            None
        };
        let keys = if !skip.contains(SkipFlags::TRANSACTION_SIGNATURES) {
            Some(
                trx.signature_keys(chain_id)
                    .map_err(PrecomputeError::Signature)?
                    .clone(),
            )
        } else {
            None
        };
        results.push((id, keys));
    }
    Ok(results)
}

/// Error found while precomputing a block or transaction. Every error found here would have
/// surfaced later on the apply path; precomputation merely finds it earlier and off the writer
/// thread.
#[derive(Debug)]
pub enum PrecomputeError {
    Malformed(MalformedTransactionError),
    Signature(ed25519_dalek::SignatureError),
}
