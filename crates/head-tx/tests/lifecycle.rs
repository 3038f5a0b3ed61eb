//! Lifecycle tests: every constructed head transaction must be recognised
//! by the observers as exactly the transition it implements, and unrelated
//! traffic must leave the tracked UTxO untouched.

use head_core::canonical::Hash32;
use head_core::chain::{ChainSlot, ChainTime};
use head_core::keys::VerificationKey;
use head_core::tx::{Tx, TxBody};
use head_core::utxo::{Address, NetworkId, TxIn, TxOut, UTxO};
use head_core::{ContestationPeriod, HeadId, HeadParameters, Party, Snapshot, SnapshotNumber};
use head_tx::{
    close, collect, commit, construct, contest, fanout, initialize, observe_all, observe_tx,
    ChainContext, CommitError, ContestError, HeadDatum, HeadObservation, OutputDatum,
};

const NETWORK: NetworkId = NetworkId::TESTNET;
const CP_SECS: u64 = 60;

fn context(seed: u8) -> ChainContext {
    ChainContext::new(
        NETWORK,
        VerificationKey([seed; 32]),
        ContestationPeriod::from_secs(CP_SECS),
    )
}

fn two_party_setup() -> (ChainContext, ChainContext, HeadParameters, Vec<VerificationKey>) {
    let alice = context(1);
    let bob = context(2);
    let params = HeadParameters {
        contestation_period: ContestationPeriod::from_secs(CP_SECS),
        parties: vec![alice.party, bob.party],
    };
    let keys = vec![alice.verification_key, bob.verification_key];
    (alice, bob, params, keys)
}

fn txin(seed: u8, index: u32) -> TxIn {
    TxIn::new(Hash32([seed; 32]), index)
}

fn payment_output(owner: u8, value: u64) -> TxOut {
    TxOut::new(
        Address::payment(NETWORK, VerificationKey([owner; 32]).credential()),
        value,
    )
}

fn user_utxo(seed: u8, value: u64) -> UTxO {
    UTxO::singleton(txin(seed, 0), payment_output(seed, value))
}

/// Drive init + both commits + collect, returning the tracked UTxO and id.
fn open_head(
    alice: &ChainContext,
    bob: &ChainContext,
    params: &HeadParameters,
    keys: &[VerificationKey],
) -> (UTxO, HeadId) {
    let seed_input = txin(0xEE, 0);
    let head_id = HeadId::from_seed(&seed_input).unwrap();

    let init_tx = initialize(alice, params, keys, seed_input).unwrap();
    let (tracked, obs) = observe_tx(NETWORK, &alice.scripts, &UTxO::new(), &init_tx);
    assert_eq!(obs.unwrap().kind(), "Init");

    let commit_a = commit(
        alice,
        head_id,
        &tracked,
        &UTxO::new(),
        &user_utxo(0xA1, 5_000_000),
    )
    .unwrap();
    let (tracked, obs) = observe_tx(NETWORK, &alice.scripts, &tracked, &commit_a);
    assert_eq!(obs.unwrap().kind(), "Commit");

    let commit_b = commit(
        bob,
        head_id,
        &tracked,
        &UTxO::new(),
        &user_utxo(0xB1, 3_000_000),
    )
    .unwrap();
    let (tracked, obs) = observe_tx(NETWORK, &bob.scripts, &tracked, &commit_b);
    assert_eq!(obs.unwrap().kind(), "Commit");

    let collect_tx = collect(alice, &tracked, head_id).unwrap();
    let (tracked, obs) = observe_tx(NETWORK, &alice.scripts, &tracked, &collect_tx);
    match obs.unwrap() {
        HeadObservation::CollectCom { utxo, .. } => {
            assert_eq!(utxo.len(), 2);
            assert_eq!(utxo.total_value(), 8_000_000);
        }
        other => panic!("expected CollectCom, got {:?}", other),
    }
    (tracked, head_id)
}

#[test]
fn init_is_observed_with_parameters() {
    let (alice, _bob, params, keys) = two_party_setup();
    let seed_input = txin(0xEE, 0);
    let init_tx = initialize(&alice, &params, &keys, seed_input).unwrap();

    let before = UTxO::new();
    let (after, obs) = observe_tx(NETWORK, &alice.scripts, &before, &init_tx);
    match obs.unwrap() {
        HeadObservation::Init {
            head_id,
            head_seed,
            parties,
            contestation_period,
        } => {
            assert_eq!(head_id, HeadId::from_seed(&seed_input).unwrap());
            assert_eq!(head_seed.to_tx_in().unwrap(), seed_input);
            assert_eq!(parties, params.parties);
            assert_eq!(contestation_period.as_secs(), CP_SECS);
        }
        other => panic!("expected Init, got {:?}", other),
    }
    // UTxO advancement: thread output plus one initial output per party.
    assert_ne!(after, before);
    assert_eq!(after.len(), 3);
}

#[test]
fn init_with_mismatched_keys_is_refused() {
    let (alice, _bob, params, _keys) = two_party_setup();
    let err = initialize(&alice, &params, &[alice.verification_key], txin(0xEE, 0));
    assert!(matches!(
        err,
        Err(construct::InitializeError::ParticipantKeyMismatch { parties: 2, keys: 1 })
    ));
}

#[test]
fn commit_refuses_wallet_owned_inputs() {
    let (alice, _bob, params, keys) = two_party_setup();
    let seed_input = txin(0xEE, 0);
    let head_id = HeadId::from_seed(&seed_input).unwrap();
    let init_tx = initialize(&alice, &params, &keys, seed_input).unwrap();
    let (tracked, _) = observe_tx(NETWORK, &alice.scripts, &UTxO::new(), &init_tx);

    let fuel = user_utxo(0xA1, 5_000_000);
    let err = commit(&alice, head_id, &tracked, &fuel, &fuel);
    assert!(matches!(err, Err(CommitError::SpendingNodeUtxoForbidden)));
}

#[test]
fn full_open_close_fanout_path() {
    let (alice, bob, params, keys) = two_party_setup();
    let (tracked, head_id) = open_head(&alice, &bob, &params, &keys);

    // Close with the initial snapshot over the collected UTxO.
    let upper_time = ChainTime::from_millis(1_000_000);
    let close_tx = close(
        &alice,
        &tracked,
        head_id,
        &Snapshot::initial(UTxO::new()),
        ChainSlot(100),
        ChainSlot(120),
        upper_time,
    )
    .unwrap();
    let (tracked, obs) = observe_tx(NETWORK, &alice.scripts, &tracked, &close_tx);
    match obs.unwrap() {
        HeadObservation::Close {
            snapshot_number,
            contestation_deadline,
            ..
        } => {
            assert_eq!(snapshot_number, SnapshotNumber(0));
            assert_eq!(
                contestation_deadline,
                upper_time.saturating_add_millis(CP_SECS * 1_000)
            );
        }
        other => panic!("expected Close, got {:?}", other),
    }

    let fanout_tx = fanout(&alice, &tracked, head_id, ChainSlot(200)).unwrap();
    assert_eq!(fanout_tx.body.validity.lower, Some(ChainSlot(200)));
    let before = tracked.clone();
    let (tracked, obs) = observe_tx(NETWORK, &alice.scripts, &tracked, &fanout_tx);
    assert_eq!(obs.unwrap().kind(), "Fanout");
    assert_ne!(tracked, before);
    // The final state is exactly the fanned-out outputs.
    assert_eq!(tracked.len(), 2);
    assert_eq!(tracked.total_value(), 8_000_000);
}

#[test]
fn contest_requires_strictly_newer_snapshot() {
    let (alice, bob, params, keys) = two_party_setup();
    let (tracked, head_id) = open_head(&alice, &bob, &params, &keys);

    let close_time = ChainTime::from_millis(1_000_000);
    let close_tx = close(
        &alice,
        &tracked,
        head_id,
        &Snapshot {
            number: SnapshotNumber(3),
            utxo: user_utxo(0xC1, 8_000_000),
            signatures: vec![],
        },
        ChainSlot(100),
        ChainSlot(120),
        close_time,
    )
    .unwrap();
    let (tracked, _) = observe_tx(NETWORK, &alice.scripts, &tracked, &close_tx);

    // Snapshot 5 supersedes 3 and extends the deadline by one period.
    let contest_tx = contest(
        &bob,
        &tracked,
        head_id,
        &Snapshot {
            number: SnapshotNumber(5),
            utxo: user_utxo(0xC2, 8_000_000),
            signatures: vec![],
        },
        ChainSlot(130),
        ChainTime::from_millis(1_010_000),
    )
    .unwrap();
    let (tracked, obs) = observe_tx(NETWORK, &bob.scripts, &tracked, &contest_tx);
    match obs.unwrap() {
        HeadObservation::Contest { snapshot_number, .. } => {
            assert_eq!(snapshot_number, SnapshotNumber(5))
        }
        other => panic!("expected Contest, got {:?}", other),
    }

    // Snapshot 4 no longer supersedes the tracked snapshot.
    let err = contest(
        &alice,
        &tracked,
        head_id,
        &Snapshot {
            number: SnapshotNumber(4),
            utxo: UTxO::new(),
            signatures: vec![],
        },
        ChainSlot(140),
        ChainTime::from_millis(1_020_000),
    );
    assert!(matches!(
        err,
        Err(ContestError::SnapshotNotNewer {
            current: SnapshotNumber(5),
            proposed: SnapshotNumber(4),
        })
    ));
}

#[test]
fn crafted_contest_with_lower_snapshot_is_not_observed() {
    let (alice, bob, params, keys) = two_party_setup();
    let (tracked, head_id) = open_head(&alice, &bob, &params, &keys);

    let close_tx = close(
        &alice,
        &tracked,
        head_id,
        &Snapshot {
            number: SnapshotNumber(3),
            utxo: UTxO::new(),
            signatures: vec![],
        },
        ChainSlot(100),
        ChainSlot(120),
        ChainTime::from_millis(1_000_000),
    )
    .unwrap();
    let (tracked, _) = observe_tx(NETWORK, &alice.scripts, &tracked, &close_tx);

    // Hand-craft a contest carrying a *lower* snapshot number: the ledger
    // would reject it, and the observer must not report it either.
    let (thread_input, thread_output, datum) =
        head_tx::construct::find_thread_output(&alice, &tracked, head_id).unwrap();
    let HeadDatum::Closed {
        parties,
        contestation_period,
        contestation_deadline,
        ..
    } = datum
    else {
        panic!("expected closed thread datum");
    };
    let bogus = TxOut::new(thread_output.address, thread_output.value).with_datum(
        OutputDatum::Head(HeadDatum::Closed {
            head_id,
            parties,
            contestation_period,
            snapshot_number: SnapshotNumber(1),
            utxo: UTxO::new(),
            contestation_deadline,
        })
        .encode()
        .unwrap(),
    );
    let bogus_tx = Tx::unsigned(TxBody::new(vec![thread_input], vec![bogus]));

    let (after, obs) = observe_tx(NETWORK, &alice.scripts, &tracked, &bogus_tx);
    assert!(obs.is_none());
    assert_eq!(after, tracked);
}

#[test]
fn abort_refunds_committed_outputs() {
    let (alice, _bob, params, keys) = two_party_setup();
    let seed_input = txin(0xEE, 0);
    let head_id = HeadId::from_seed(&seed_input).unwrap();

    let init_tx = initialize(&alice, &params, &keys, seed_input).unwrap();
    let (tracked, _) = observe_tx(NETWORK, &alice.scripts, &UTxO::new(), &init_tx);

    let committed = user_utxo(0xA1, 5_000_000);
    let commit_a = commit(&alice, head_id, &tracked, &UTxO::new(), &committed).unwrap();
    let (tracked, _) = observe_tx(NETWORK, &alice.scripts, &tracked, &commit_a);

    let abort_tx = head_tx::abort(&alice, seed_input, &tracked).unwrap();
    let (after, obs) = observe_tx(NETWORK, &alice.scripts, &tracked, &abort_tx);
    assert_eq!(obs.unwrap().kind(), "Abort");
    // Alice's committed output is refunded; nothing head-locked remains.
    assert_eq!(after.len(), 1);
    assert_eq!(after.total_value(), 5_000_000);
}

#[test]
fn abort_after_collect_is_refused() {
    let (alice, bob, params, keys) = two_party_setup();
    let (tracked, _head_id) = open_head(&alice, &bob, &params, &keys);
    let err = head_tx::abort(&alice, txin(0xEE, 0), &tracked);
    assert!(matches!(
        err,
        Err(construct::AbortError::HeadNotInitial { .. })
    ));
}

#[test]
fn close_requires_an_open_head() {
    let (alice, _bob, params, keys) = two_party_setup();
    let seed_input = txin(0xEE, 0);
    let head_id = HeadId::from_seed(&seed_input).unwrap();
    let init_tx = initialize(&alice, &params, &keys, seed_input).unwrap();
    let (tracked, _) = observe_tx(NETWORK, &alice.scripts, &UTxO::new(), &init_tx);

    let err = close(
        &alice,
        &tracked,
        head_id,
        &Snapshot::initial(UTxO::new()),
        ChainSlot(10),
        ChainSlot(20),
        ChainTime::from_millis(1_000),
    );
    assert!(matches!(err, Err(construct::CloseError::HeadNotOpen { .. })));
}

#[test]
fn unrelated_payments_do_not_disturb_the_tracked_utxo() {
    let (alice, bob, params, keys) = two_party_setup();
    let (tracked, _) = open_head(&alice, &bob, &params, &keys);

    let payments: Vec<Tx> = (0u8..4)
        .map(|i| {
            Tx::unsigned(TxBody::new(
                vec![txin(0x40 + i, 0)],
                vec![payment_output(0x50 + i, 1_000_000)],
            ))
        })
        .collect();

    let (after, observations) = observe_all(NETWORK, &alice.scripts, &tracked, &payments);
    assert!(observations.is_empty());
    assert_eq!(after, tracked);
}

#[test]
fn observe_all_reports_transitions_in_order() {
    let (alice, bob, params, keys) = two_party_setup();
    let seed_input = txin(0xEE, 0);
    let head_id = HeadId::from_seed(&seed_input).unwrap();

    let init_tx = initialize(&alice, &params, &keys, seed_input).unwrap();
    let (tracked, _) = observe_tx(NETWORK, &alice.scripts, &UTxO::new(), &init_tx);
    let commit_a = commit(
        &alice,
        head_id,
        &tracked,
        &UTxO::new(),
        &user_utxo(0xA1, 1_000_000),
    )
    .unwrap();
    let (tracked_after_a, _) = observe_tx(NETWORK, &alice.scripts, &tracked, &commit_a);
    let commit_b = commit(
        &bob,
        head_id,
        &tracked_after_a,
        &UTxO::new(),
        &user_utxo(0xB1, 1_000_000),
    )
    .unwrap();

    // One block carrying init and both commits, folded in order.
    let (_, observations) = observe_all(
        NETWORK,
        &alice.scripts,
        &UTxO::new(),
        &[init_tx, commit_a, commit_b],
    );
    let kinds: Vec<&str> = observations.iter().map(|o| o.kind()).collect();
    assert_eq!(kinds, vec!["Init", "Commit", "Commit"]);
}
