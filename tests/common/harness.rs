use std::sync::mpsc::Sender;

use rand_core::OsRng;

use dpos_rs::block_store::MemBlockStore;
use dpos_rs::chain::Chain;
use dpos_rs::config::{
    ChainParameters, Configuration, GenesisAccount, GenesisAsset, GenesisBalance, GenesisConfig,
    GenesisWitness,
};
use dpos_rs::events::Event;
use dpos_rs::types::block::SignedBlock;
use dpos_rs::types::data_types::{
    AccountId, Amount, AssetAmount, AssetId, ChainID, SkipFlags, Timestamp, VerifyingKeyBytes,
    WitnessId,
};
use dpos_rs::types::operations::{Operation, TransferOperation};
use dpos_rs::types::transaction::{SignedTransaction, Transaction};
use dpos_rs::types::SigningKey;

pub(crate) const CHAIN_ID: ChainID = ChainID::new(0xD905);

/// Aligned to the default block interval, and past the proposal-history hardfork.
pub(crate) const GENESIS_TIME: Timestamp = Timestamp::new(1_700_000_000);

pub(crate) const CORE: AssetId = AssetId::new(0);
pub(crate) const USD: AssetId = AssetId::new(1);

pub(crate) const INITIAL_CORE_BALANCE: i64 = 1_000_000;

/// A chain over an in-memory block store, together with the keys behind its genesis accounts and
/// witnesses. Accounts and witnesses are numbered in genesis order; witness `i` is operated by
/// account `i`.
pub(crate) struct TestChain {
    pub(crate) chain: Chain<MemBlockStore>,
    pub(crate) account_keys: Vec<SigningKey>,
    pub(crate) witness_keys: Vec<SigningKey>,
}

impl TestChain {
    pub(crate) fn new(num_witnesses: usize) -> TestChain {
        Self::with_setup(num_witnesses, GENESIS_TIME, ChainParameters::default(), 1024)
    }

    pub(crate) fn with_setup(
        num_witnesses: usize,
        genesis_time: Timestamp,
        parameters: ChainParameters,
        max_undo_history: usize,
    ) -> TestChain {
        let mut csprg = OsRng {};
        let account_keys: Vec<SigningKey> = (0..num_witnesses + 2)
            .map(|_| SigningKey::generate(&mut csprg))
            .collect();
        let witness_keys: Vec<SigningKey> = (0..num_witnesses)
            .map(|_| SigningKey::generate(&mut csprg))
            .collect();
        let genesis = genesis_config(genesis_time, parameters, &account_keys, &witness_keys);
        Self::from_parts(genesis, account_keys, witness_keys, max_undo_history, None)
    }

    /// Two chains built from the same genesis, for tests where one node produces blocks and
    /// another ingests them (or the two race on competing forks).
    pub(crate) fn pair(num_witnesses: usize) -> (TestChain, TestChain) {
        let first = TestChain::new(num_witnesses);
        let second = first.sibling();
        (first, second)
    }

    /// Another chain with this chain's exact genesis.
    pub(crate) fn sibling(&self) -> TestChain {
        let genesis = genesis_config(
            GENESIS_TIME,
            self.chain.state().global_properties().parameters.clone(),
            &self.account_keys,
            &self.witness_keys,
        );
        Self::from_parts(
            genesis,
            self.account_keys.clone(),
            self.witness_keys.clone(),
            1024,
            None,
        )
    }

    pub(crate) fn with_event_publisher(
        num_witnesses: usize,
        event_publisher: Sender<Event>,
    ) -> TestChain {
        let mut csprg = OsRng {};
        let account_keys: Vec<SigningKey> = (0..num_witnesses + 2)
            .map(|_| SigningKey::generate(&mut csprg))
            .collect();
        let witness_keys: Vec<SigningKey> = (0..num_witnesses)
            .map(|_| SigningKey::generate(&mut csprg))
            .collect();
        let genesis = genesis_config(
            GENESIS_TIME,
            ChainParameters::default(),
            &account_keys,
            &witness_keys,
        );
        Self::from_parts(
            genesis,
            account_keys,
            witness_keys,
            1024,
            Some(event_publisher),
        )
    }

    fn from_parts(
        genesis: GenesisConfig,
        account_keys: Vec<SigningKey>,
        witness_keys: Vec<SigningKey>,
        max_undo_history: usize,
        event_publisher: Option<Sender<Event>>,
    ) -> TestChain {
        let configuration = Configuration {
            max_undo_history,
            precompute_workers: 2,
        };
        let chain = Chain::initialize(
            MemBlockStore::new(),
            genesis,
            configuration,
            event_publisher,
        )
        .unwrap();
        TestChain {
            chain,
            account_keys,
            witness_keys,
        }
    }

    /* ↓↓↓ Block production ↓↓↓ */

    /// Produces and installs a block in the next slot, signed by whichever witness is scheduled.
    pub(crate) fn produce_block(&mut self) -> SignedBlock {
        self.produce_block_at_slot(1)
    }

    pub(crate) fn produce_block_at_slot(&mut self, slot: u32) -> SignedBlock {
        let when = self.chain.get_slot_time(slot);
        let witness = self.chain.get_scheduled_witness(slot);
        let signing_key = self.witness_signing_key(witness);
        self.chain
            .generate_block(when, witness, &signing_key, SkipFlags::NOTHING)
            .unwrap()
    }

    pub(crate) fn witness_signing_key(&self, witness: WitnessId) -> SigningKey {
        self.witness_keys[witness.int() as usize].clone()
    }

    /* ↓↓↓ Transactions ↓↓↓ */

    /// A signed transfer of CORE from one genesis account to another, TaPoS-tied to the current
    /// head.
    pub(crate) fn transfer(&self, from: usize, to: usize, amount: i64) -> SignedTransaction {
        self.sign(
            from,
            vec![Operation::Transfer(TransferOperation {
                from: AccountId::new(from as u64),
                to: AccountId::new(to as u64),
                amount: AssetAmount {
                    amount: Amount::new(amount),
                    asset_id: CORE,
                },
            })],
        )
    }

    /// Wraps `operations` into a transaction TaPoS-tied to the current head, expiring in an hour,
    /// signed with `signer`'s active key.
    pub(crate) fn sign(&self, signer: usize, operations: Vec<Operation>) -> SignedTransaction {
        let transaction = Transaction {
            ref_block_num: (self.chain.head_block_num().int() & 0xffff) as u16,
            ref_block_prefix: self.chain.head_block_id().ref_prefix(),
            expiration: self.chain.head_block_time() + 3600,
            operations,
        };
        let mut trx = SignedTransaction::new(transaction);
        trx.sign(CHAIN_ID, &self.account_keys[signer]);
        trx
    }

    /* ↓↓↓ State shorthands ↓↓↓ */

    pub(crate) fn balance(&self, account: usize, asset: AssetId) -> i64 {
        self.chain
            .state()
            .account(AccountId::new(account as u64))
            .unwrap()
            .balance(asset)
            .int()
    }
}

fn genesis_config(
    genesis_time: Timestamp,
    parameters: ChainParameters,
    account_keys: &[SigningKey],
    witness_keys: &[SigningKey],
) -> GenesisConfig {
    let initial_accounts = account_keys
        .iter()
        .enumerate()
        .map(|(index, key)| GenesisAccount {
            name: format!("account-{}", index),
            owner_key: VerifyingKeyBytes::new(key.verifying_key().to_bytes()),
            active_key: VerifyingKeyBytes::new(key.verifying_key().to_bytes()),
        })
        .collect();
    let initial_witnesses = witness_keys
        .iter()
        .enumerate()
        .map(|(index, key)| GenesisWitness {
            account: AccountId::new(index as u64),
            signing_key: VerifyingKeyBytes::new(key.verifying_key().to_bytes()),
        })
        .collect();
    let initial_balances = (0..account_keys.len())
        .flat_map(|index| {
            [CORE, USD].map(|asset| GenesisBalance {
                account: AccountId::new(index as u64),
                asset,
                amount: Amount::new(INITIAL_CORE_BALANCE),
            })
        })
        .collect();
    GenesisConfig {
        chain_id: CHAIN_ID,
        genesis_time,
        parameters,
        initial_accounts,
        initial_witnesses,
        initial_assets: vec![
            GenesisAsset {
                symbol: "CORE".to_string(),
                precision: 5,
            },
            GenesisAsset {
                symbol: "USD".to_string(),
                precision: 4,
            },
        ],
        initial_balances,
    }
}
