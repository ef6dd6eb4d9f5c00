/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types that are sent around and inspected but have no active behavior. These follow the
//! newtype pattern, and the API for using them is defined in this module.
//!
//! Identifiers of ledger objects ([`AccountId`], [`WitnessId`], [`AssetId`], [`OrderId`],
//! [`ProposalId`]) wrap the object's instance number. [`BlockId`] is special: its first four bytes
//! encode the block number in big-endian, so the number of a block can be read off its id without
//! fetching the block.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, BitOr, BitOrAssign, Sub},
};

/// Id of the blockchain, used to distinguish signatures made for different chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Number of an existing block in the blockchain. The genesis state is at number 0; the first
/// produced block has number 1.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct BlockNumber(u32);

impl BlockNumber {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for BlockNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u32> for BlockNumber {
    type Output = BlockNumber;
    fn add(self, rhs: u32) -> Self::Output {
        BlockNumber::new(self.0 + rhs)
    }
}

impl AddAssign<u32> for BlockNumber {
    fn add_assign(&mut self, rhs: u32) {
        self.0.add_assign(rhs)
    }
}

impl Sub<BlockNumber> for BlockNumber {
    type Output = u32;
    fn sub(self, rhs: BlockNumber) -> Self::Output {
        self.0 - rhs.0
    }
}

/// A point in time, in seconds since the Unix Epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct Timestamp(u32);

impl Timestamp {
    pub const fn new(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn secs(&self) -> u32 {
        self.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u32> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: u32) -> Self::Output {
        Timestamp::new(self.0 + rhs)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = u32;
    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.0 - rhs.0
    }
}

/// The id of a block: the first four bytes encode the block's number in big-endian, the remaining
/// 28 bytes are taken from the SHA256 digest of the block's signed header.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct BlockId([u8; 32]);

impl BlockId {
    pub fn new(number: BlockNumber, digest: [u8; 32]) -> Self {
        let mut bytes = digest;
        bytes[0..4].copy_from_slice(&number.int().to_be_bytes());
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// The block number encoded in the first four bytes of the id.
    pub fn number(&self) -> BlockNumber {
        let mut num = [0u8; 4];
        num.copy_from_slice(&self.0[0..4]);
        BlockNumber::new(u32::from_be_bytes(num))
    }

    /// The second 32-bit word of the id. Transactions embed this as their `ref_block_prefix` to
    /// tie themselves to a recent block.
    pub fn ref_prefix(&self) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.0[4..8]);
        u32::from_le_bytes(word)
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The id of a transaction: the SHA256 digest of the transaction without its signatures.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A SHA256 digest, e.g., the transaction merkle root of a block.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Instance number of an account object.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct AccountId(u64);

impl AccountId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Instance number of a witness object.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct WitnessId(u64);

impl WitnessId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for WitnessId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Instance number of an asset object.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct AssetId(u64);

impl AssetId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Instance number of a limit order object.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct OrderId(u64);

impl OrderId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Instance number of a proposal object.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct ProposalId(u64);

impl ProposalId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ProposalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Instance number of an object of any type. Operation results carry these when an operation
/// created a new object.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// An amount of some asset, denominated in the asset's smallest unit.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct Amount(i64);

impl Amount {
    pub const fn new(int: i64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> i64 {
        self.0
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<Amount> for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Self::Output {
        Amount::new(self.0 + rhs.0)
    }
}

impl Sub<Amount> for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Self::Output {
        Amount::new(self.0 - rhs.0)
    }
}

/// An [`Amount`] of a specific asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct AssetAmount {
    pub amount: Amount,
    pub asset_id: AssetId,
}

/// The price offered by a limit order: how much of the base asset is asked per unit of the quote
/// asset. Represented exactly, as a pair of asset amounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Price {
    pub base: AssetAmount,
    pub quote: AssetAmount,
}

impl Price {
    /// The highest representable price selling `base` for `quote`. Sorts before every real order
    /// in the by-price index.
    pub fn max(base: AssetId, quote: AssetId) -> Price {
        Price {
            base: AssetAmount {
                amount: Amount::new(i64::MAX),
                asset_id: base,
            },
            quote: AssetAmount {
                amount: Amount::new(1),
                asset_id: quote,
            },
        }
    }

    /// The lowest representable price selling `base` for `quote`. Sorts after every real order in
    /// the by-price index.
    pub fn min(base: AssetId, quote: AssetId) -> Price {
        Price {
            base: AssetAmount {
                amount: Amount::new(1),
                asset_id: base,
            },
            quote: AssetAmount {
                amount: Amount::new(i64::MAX),
                asset_id: quote,
            },
        }
    }

    /// Compares two prices over the same asset pair by cross-multiplying, which is exact.
    ///
    /// # Precondition
    /// Both prices have the same base asset and the same quote asset.
    pub fn cmp_ratio(&self, other: &Price) -> std::cmp::Ordering {
        let lhs = self.base.amount.int() as i128 * other.quote.amount.int() as i128;
        let rhs = other.base.amount.int() as i128 * self.quote.amount.int() as i128;
        lhs.cmp(&rhs)
    }
}

/// An Ed25519 signature represented in bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Default for SignatureBytes {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An Ed25519 verifying key represented in bytes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize,
    BorshSerialize,
)]
pub struct VerifyingKeyBytes([u8; 32]);

impl VerifyingKeyBytes {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

/// A bitset of checks that block and transaction application may be told to skip. A set bit
/// suppresses the corresponding check.
///
/// Skip flags are scoped: [`push_block`](crate::chain::Chain::push_block) and its siblings install
/// the flags they were called with for the duration of the call and restore the previous flags
/// afterwards, so nested calls observe the outer override while it is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SkipFlags(u32);

impl SkipFlags {
    pub const NOTHING: SkipFlags = SkipFlags(0);
    /// Skip verifying the producer signature on a block.
    pub const WITNESS_SIGNATURE: SkipFlags = SkipFlags(1 << 0);
    /// Skip verifying transaction signatures and authority satisfaction.
    pub const TRANSACTION_SIGNATURES: SkipFlags = SkipFlags(1 << 1);
    /// Skip recomputing and checking the transaction merkle root of a block.
    pub const MERKLE_CHECK: SkipFlags = SkipFlags(1 << 2);
    /// Skip checking the recent-transaction index for duplicates, and skip inserting into it.
    pub const TRANSACTION_DUPE_CHECK: SkipFlags = SkipFlags(1 << 3);
    /// Skip checking that a block's producer is the witness scheduled for the block's slot.
    pub const WITNESS_SCHEDULE_CHECK: SkipFlags = SkipFlags(1 << 4);
    /// Skip checking a block's packed size against the maximum block size.
    pub const BLOCK_SIZE_CHECK: SkipFlags = SkipFlags(1 << 5);
    /// Skip checking a transaction's `ref_block_prefix` against the block summary ring.
    pub const TAPOS_CHECK: SkipFlags = SkipFlags(1 << 6);

    /// The expensive checks, skipped together when replaying blocks known to be good.
    pub const EXPENSIVE: SkipFlags = SkipFlags(
        Self::WITNESS_SIGNATURE.0
            | Self::TRANSACTION_SIGNATURES.0
            | Self::MERKLE_CHECK.0
            | Self::TRANSACTION_DUPE_CHECK.0,
    );

    /// Every check. Blocks at or below the highest checkpoint are applied with these flags.
    pub const EVERYTHING: SkipFlags = SkipFlags(u32::MAX);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: SkipFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SkipFlags {
    type Output = SkipFlags;
    fn bitor(self, rhs: SkipFlags) -> Self::Output {
        SkipFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SkipFlags {
    fn bitor_assign(&mut self, rhs: SkipFlags) {
        self.0 |= rhs.0
    }
}
