use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use ethereum_types::U256;
use keccak_hash::keccak;
use shardex_blockchain::{Chain, initialize_with_gas_limit};
use shardex_common::constants::{
    BLKNUMBER, BLOCKHASHES, CASPER, EXECUTION_STATE, GAS_REMAINING, LOG, MAXSHARDS, RNGSEEDS,
    STATEROOTS, TXINDEX,
};
use shardex_common::types::{Block, BlockHeader, Transaction, TransactionGroupSummary};
use shardex_common::util::{big_endian_to_u256, big_endian_to_u64};
use shardex_common::{Address, ShardRange};
use shardex_rlp::decode::{decode_bytes, decode_rlp_item};
use shardex_rlp::encode::encode_slice;
use shardex_storage::{InMemoryStore, State, get_code};
use shardex_trie::{EMPTY_TRIE_HASH, TrieDB};
use shardex_vm::{Message, MsgOutcome, Vm, VmError, VmExt};

/// Deterministic stand-in interpreter. Every execution costs a flat 10 gas
/// plus one per code byte; init code returns itself, so deployments store
/// the supplied bytecode verbatim. A non-zero salt is written into the
/// target's storage, which lets tests perturb the post-state to exercise
/// the determinism check.
struct TestVm {
    salt: AtomicU64,
}

const VM_BASE_COST: u64 = 10;
const SALT_SLOT: u64 = 0x5a17;

impl TestVm {
    fn new() -> Self {
        Self {
            salt: AtomicU64::new(0),
        }
    }

    fn set_salt(&self, salt: u64) {
        self.salt.store(salt, Ordering::SeqCst);
    }
}

impl Vm for TestVm {
    fn execute(
        &self,
        ext: &mut VmExt<'_>,
        msg: &Message,
        code: &[u8],
    ) -> Result<MsgOutcome, VmError> {
        let salt = self.salt.load(Ordering::SeqCst);
        if salt != 0 {
            ext.set_storage(msg.to, SALT_SLOT, salt)?;
        }
        let cost = VM_BASE_COST + code.len() as u64;
        if msg.gas < cost {
            return Ok(MsgOutcome::revert(Bytes::new()));
        }
        Ok(MsgOutcome::success(
            msg.gas - cost,
            Bytes::copy_from_slice(code),
        ))
    }
}

fn new_chain() -> Chain {
    Chain::new(Arc::new(TestVm::new()))
}

fn new_state() -> State {
    State::new(Arc::new(InMemoryStore::new()))
}

fn account(tag: u8, shard: u64) -> Address {
    Address::system(tag).shardify(shard)
}

/// First status tag of a log entry (the head of the RLP list).
fn log_status(log: &[u8]) -> u8 {
    let (is_list, payload, _) = decode_rlp_item(log).unwrap();
    assert!(is_list, "log slot does not hold a list");
    let (item, _) = decode_bytes(payload).unwrap();
    if item.is_empty() { 0 } else { item[0] }
}

fn gas_remaining(state: &mut State, left_bound: u64) -> u64 {
    big_endian_to_u64(
        &state
            .get_storage(EXECUTION_STATE.shardify(left_bound), GAS_REMAINING)
            .unwrap(),
    )
}

#[test]
fn bootstraps_an_empty_chain() {
    let chain = new_chain();
    let mut state = new_state();
    assert_eq!(state.root().unwrap(), *EMPTY_TRIE_HASH);

    chain.block_state_transition(&mut state, None).unwrap();

    assert_eq!(
        big_endian_to_u64(&state.get_storage(BLKNUMBER, 0u64).unwrap()),
        1
    );
    assert_eq!(
        state.get_storage(BLOCKHASHES, 0u64).unwrap(),
        vec![0u8; 32]
    );
    assert!(!state.get_storage(RNGSEEDS, 0u64).unwrap().is_empty());
}

#[test]
fn empty_slots_replay_deterministically() {
    let chain = new_chain();

    let mut first = new_state();
    let post_first = chain.block_state_transition(&mut first, None).unwrap();

    // Same pre-root, same (absent) block: the memo accepts the replay and
    // the post-roots agree.
    let mut second = new_state();
    let post_second = chain.block_state_transition(&mut second, None).unwrap();
    assert_eq!(post_first, post_second);
}

#[test]
fn executes_an_auto_packed_deployment() {
    let chain = new_chain();
    let mut state = new_state();
    let target = account(0x77, 0);
    let code = Bytes::from_static(&[0x60, 0x01, 0x60, 0x02]);
    let tx = Transaction::new(target, 12_000, ShardRange::full()).with_code(code.clone());
    let exec_gas = tx.exec_gas();
    let block =
        Block::from_transactions(0, account(0x01, 0), Bytes::new(), vec![tx]).unwrap();

    chain.block_state_transition(&mut state, Some(&block)).unwrap();

    // the account's code-hash slot holds keccak(code) and the blob resolves
    assert_eq!(
        state.get_storage(target, Vec::new()).unwrap(),
        keccak(&code).as_bytes().to_vec()
    );
    assert_eq!(get_code(&mut state, target).unwrap(), code.to_vec());

    // the log begins with a success tag
    let log = state.get_storage(LOG.shardify(0), 0u64).unwrap();
    assert_eq!(log_status(&log), 2);

    // deploy consumed base+code, the main call consumed base+code again
    let consumed = 2 * (VM_BASE_COST + code.len() as u64);
    let budget = block.summaries()[0].gas_limit - block.summaries()[0].intrinsic_gas();
    assert_eq!(gas_remaining(&mut state, 0), budget - consumed);
    assert!(consumed <= exec_gas);
}

#[test]
fn skips_transactions_once_group_gas_runs_out() {
    let chain = new_chain();
    let mut state = new_state();
    // two transactions wanting 3000 exec gas each against a 5000 budget
    let txs: Vec<Transaction> = (1u8..=2)
        .map(|tag| Transaction::new(account(tag, 0), 4_000, ShardRange::full()))
        .collect();
    let summaries = vec![TransactionGroupSummary::new(
        5_000,
        ShardRange::full(),
        &txs,
    )];
    let header = BlockHeader {
        number: 0,
        txroot: keccak(encode_slice(&summaries)),
        proposer: Address::zero(),
        sig: Bytes::new(),
    };
    let block = Block::new(header, summaries, vec![txs]).unwrap();

    chain.block_state_transition(&mut state, Some(&block)).unwrap();

    let log_addr = LOG.shardify(0);
    assert_eq!(
        big_endian_to_u64(
            &state
                .get_storage(EXECUTION_STATE.shardify(0), TXINDEX)
                .unwrap()
        ),
        2
    );
    // the first transaction ran, the second was skipped with a bare [0] log
    assert_eq!(log_status(&state.get_storage(log_addr, 0u64).unwrap()), 2);
    assert_eq!(state.get_storage(log_addr, 1u64).unwrap(), vec![0xc1, 0x80]);
    // skipped transactions consume nothing
    assert_eq!(gas_remaining(&mut state, 0), 3_000 - VM_BASE_COST);
}

#[test]
fn out_of_range_recipient_is_an_observable_no_op() {
    let chain = new_chain();
    let mut state = new_state();
    let half = MAXSHARDS / 2;
    let stranger = account(0x55, half + 1);
    let tx = Transaction::new(stranger, 50_000, ShardRange::new(0, half).unwrap());
    let group = vec![tx];
    let summaries = vec![TransactionGroupSummary::new(
        100_000,
        ShardRange::new(0, half).unwrap(),
        &group,
    )];
    let header = BlockHeader {
        number: 0,
        txroot: keccak(encode_slice(&summaries)),
        proposer: Address::zero(),
        sig: Bytes::new(),
    };
    let block = Block::new(header, summaries, vec![group]).unwrap();

    chain.block_state_transition(&mut state, Some(&block)).unwrap();

    let log_addr = LOG.shardify(0);
    assert_eq!(state.get_storage(log_addr, 0u64).unwrap(), vec![0xc1, 0x80]);
    // no side effects on the target account
    assert!(state.dump_account(stranger).unwrap().is_empty());
    // and the budget is untouched
    let budget = 100_000 - block.summaries()[0].intrinsic_gas();
    assert_eq!(gas_remaining(&mut state, 0), budget);
}

#[test]
fn gas_remaining_drops_by_exactly_the_consumed_gas() {
    let chain = new_chain();
    let mut state = new_state();
    initialize_with_gas_limit(&mut state, 100_000, 0).unwrap();

    let tx = Transaction::new(account(0x09, 0), 5_000, ShardRange::full());
    let exec_gas = tx.exec_gas();
    chain
        .tx_state_transition(&mut state, &tx, ShardRange::full())
        .unwrap();

    // success: decreased by exec_gas - msg_gas_remained == the VM's cost
    assert_eq!(gas_remaining(&mut state, 0), 100_000 - VM_BASE_COST);
    assert!(VM_BASE_COST <= exec_gas);

    // a pre-check skip leaves the budget unchanged
    let greedy = Transaction::new(account(0x0a, 0), 500_000, ShardRange::full());
    chain
        .tx_state_transition(&mut state, &greedy, ShardRange::full())
        .unwrap();
    assert_eq!(gas_remaining(&mut state, 0), 100_000 - VM_BASE_COST);
    assert_eq!(
        state.get_storage(LOG.shardify(0), 1u64).unwrap(),
        vec![0xc1, 0x80]
    );
}

#[test]
fn records_prior_state_roots_and_block_numbers() {
    let chain = new_chain();
    let mut state = new_state();

    chain.block_state_transition(&mut state, None).unwrap();
    let root_after_first = state.root().unwrap();
    chain.block_state_transition(&mut state, None).unwrap();

    assert_eq!(
        big_endian_to_u64(&state.get_storage(BLKNUMBER, 0u64).unwrap()),
        2
    );
    assert_eq!(
        state.get_storage(STATEROOTS, 0u64).unwrap(),
        root_after_first.as_bytes().to_vec()
    );
}

#[test]
fn rng_seed_packs_validator_count_into_low_bits() {
    let chain = new_chain();
    let mut state = new_state();
    state.set_storage(CASPER, 0u64, 5u64).unwrap();

    chain.block_state_transition(&mut state, None).unwrap();

    let seed = big_endian_to_u256(&state.get_storage(RNGSEEDS, 0u64).unwrap());
    assert_eq!((seed & U256::from(u64::MAX)).low_u64(), 5);

    // upper 192 bits come from keccak(prevseed ++ proposer)
    let mut preimage = vec![0u8; 32];
    preimage.extend_from_slice(Address::zero().as_bytes());
    let mix = U256::from_big_endian(keccak(&preimage).as_bytes());
    assert_eq!(seed >> 64usize, mix >> 64usize);
}

#[test]
fn executes_groups_in_disjoint_shard_ranges() {
    let chain = new_chain();
    let mut state = new_state();
    let group_a = vec![Transaction::new(
        account(0x01, 0),
        20_000,
        ShardRange::new(0, 1).unwrap(),
    )];
    let group_b = vec![Transaction::new(
        account(0x02, 5),
        20_000,
        ShardRange::new(4, 8).unwrap(),
    )];
    let summaries = vec![
        TransactionGroupSummary::new(100_000, ShardRange::new(0, 1).unwrap(), &group_a),
        TransactionGroupSummary::new(100_000, ShardRange::new(4, 8).unwrap(), &group_b),
    ];
    let header = BlockHeader {
        number: 0,
        txroot: keccak(encode_slice(&summaries)),
        proposer: Address::zero(),
        sig: Bytes::new(),
    };
    let block = Block::new(header, summaries, vec![group_a, group_b]).unwrap();

    chain.block_state_transition(&mut state, Some(&block)).unwrap();

    // each group tracked its own per-shard execution state and logs
    for left in [0u64, 4] {
        assert_eq!(
            big_endian_to_u64(
                &state
                    .get_storage(EXECUTION_STATE.shardify(left), TXINDEX)
                    .unwrap()
            ),
            1
        );
        assert_eq!(
            log_status(&state.get_storage(LOG.shardify(left), 0u64).unwrap()),
            2
        );
    }
}

#[test]
fn applying_consecutive_blocks_advances_the_chain() {
    let chain = new_chain();
    let mut state = new_state();

    let block0 = Block::from_transactions(
        0,
        account(0x01, 0),
        Bytes::new(),
        vec![Transaction::new(account(0x10, 0), 20_000, ShardRange::full())],
    )
    .unwrap();
    chain.block_state_transition(&mut state, Some(&block0)).unwrap();

    let block1 = Block::from_transactions(
        1,
        account(0x02, 0),
        Bytes::new(),
        vec![Transaction::new(account(0x11, 3), 20_000, ShardRange::full())],
    )
    .unwrap();
    chain.block_state_transition(&mut state, Some(&block1)).unwrap();

    assert_eq!(
        big_endian_to_u64(&state.get_storage(BLKNUMBER, 0u64).unwrap()),
        2
    );
    assert_eq!(
        state.get_storage(BLOCKHASHES, 0u64).unwrap(),
        block0.hash().as_bytes().to_vec()
    );
    assert_eq!(
        state.get_storage(BLOCKHASHES, 1u64).unwrap(),
        block1.hash().as_bytes().to_vec()
    );
}

#[test]
#[should_panic(expected = "does not match the chain head")]
fn rejects_a_block_number_out_of_step() {
    let chain = new_chain();
    let mut state = new_state();
    let block = Block::from_transactions(5, Address::zero(), Bytes::new(), vec![]).unwrap();
    let _ = chain.block_state_transition(&mut state, Some(&block));
}

#[test]
#[should_panic(expected = "non-deterministic state transition")]
fn determinism_memo_rejects_a_corrupted_interpreter() {
    let vm = Arc::new(TestVm::new());
    let chain = Chain::new(vm.clone());
    let db: Arc<dyn TrieDB> = Arc::new(InMemoryStore::new());
    let mut state = State::new(db.clone());

    let tx = Transaction::new(account(0x42, 0), 20_000, ShardRange::full())
        .with_data(Bytes::from_static(b"ping"));
    let block = Block::from_transactions(0, account(0x01, 0), Bytes::new(), vec![tx]).unwrap();

    let pre = state.root().unwrap();
    chain.block_state_transition(&mut state, Some(&block)).unwrap();

    // corrupt the interpreter and replay the same block from the same root
    vm.set_salt(0xbad);
    let mut replay = State::open(pre, db);
    let _ = chain.block_state_transition(&mut replay, Some(&block));
}
