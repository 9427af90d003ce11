use std::time::Duration;

use vrf_engine::audit::AuditEventType;
use vrf_engine::crypto::bls::{self, PublicKeySet};
use vrf_engine::crypto::LocalKeypair;
use vrf_engine::crypto::keys::verify_prehash;
use vrf_engine::dkg::DealOutcome;
use vrf_engine::ledger::simulated::SimulatedLedger;
use vrf_engine::mpc::{RoundOutcome, RowOutcome};
use vrf_engine::orchestrator::local_group::member_address;
use vrf_engine::orchestrator::{LocalGroup, ProtocolClient, TickOutcome};
use vrf_engine::types::{Binary, GroupStatus};

#[tokio::test]
async fn test_five_member_group_produces_verifiable_randomness() {
    let mut group = LocalGroup::new(5, 3).unwrap();

    // Every member deals once; the last dealing moves the group on.
    let outcomes = group.sweep().await;
    assert!(outcomes.iter().all(|o| matches!(o, TickOutcome::Dealt(DealOutcome::Submitted(_)))));
    assert_eq!(group.ledger().status(), GroupStatus::WaitForRow);
    assert_eq!(group.ledger().writes_of("share_dealer").len(), 5);
    for i in 0..5 {
        let dealing = group.ledger().member(&member_address(i)).unwrap().shared_dealer.unwrap();
        assert_eq!(dealing.rows.len(), 5);
        assert_eq!(dealing.commits.len(), 6);
    }

    // Each member combines its five rows and publishes a public key share.
    let outcomes = group.sweep().await;
    assert!(outcomes.iter().all(|o| matches!(o, TickOutcome::Row(RowOutcome::Submitted(_)))));
    assert_eq!(group.ledger().status(), GroupStatus::WaitForRequest);

    let sums: Vec<Vec<u8>> = (0..5)
        .map(|i| {
            let member = group.ledger().member(&member_address(i)).unwrap();
            member.shared_dealer.unwrap().commits[0].to_vec()
        })
        .collect();
    let key_set = PublicKeySet::from_dealer_commits(&sums).unwrap();
    for i in 0..5 {
        let member = group.ledger().member(&member_address(i)).unwrap();
        assert_eq!(member.shared_row.unwrap().pk_share.to_vec(), key_set.public_key_share(i));
    }

    let input = Binary::from_base64("aGVsbG8=").unwrap();
    let round = group.run_round(&input).await.unwrap();
    assert_eq!(round.round, 1);
    assert_eq!(round.sigs.len(), 4);

    let combined = round.combined_sig.clone().unwrap();
    let group_key = group.ledger().group_public_key().unwrap();
    assert_eq!(round.combined_pubkey.as_ref().unwrap().as_slice(), group_key.as_slice());
    assert!(bls::verify_signature(&group_key, &bls::round_message(&input, 1), &combined));

    let randomness = round.randomness.clone().unwrap();
    assert_eq!(randomness.to_vec(), bls::derive_randomness(&combined));

    // The fifth member arrived after the combination and countersigned.
    let late = group.ledger().member(&member_address(4)).unwrap();
    assert_eq!(round.signed_pubkey.as_ref(), Some(&late.pubkey));
    assert!(verify_prehash(&late.pubkey, &randomness, round.signed_combined_sig.as_ref().unwrap()));
    assert!(!round.signed_by(&member_address(4)));
}

#[tokio::test]
async fn test_consecutive_rounds_are_independent() {
    let mut group = LocalGroup::new(3, 1).unwrap();
    group.complete_dkg().await.unwrap();

    let first = group.run_round(b"first").await.unwrap();
    let second = group.run_round(b"second").await.unwrap();
    assert_eq!((first.round, second.round), (1, 2));
    assert_ne!(first.randomness, second.randomness);

    let requester = group.nodes()[0].coordinator.audit();
    assert_eq!(requester.count(AuditEventType::RequestRandom), 2);
    assert_eq!(group.nodes()[1].coordinator.audit().count(AuditEventType::RequestRandom), 0);
    assert_eq!(group.ledger().writes_of("request_random").len(), 2);
}

#[tokio::test]
async fn test_incomplete_membership_blocks_dealing() {
    let ledger = SimulatedLedger::new(2, 5, 100);
    ledger.set_reported_total(Some(5));
    let mut group = LocalGroup::with_ledger(ledger, 4, 2).unwrap();

    let outcomes = group.sweep().await;
    for outcome in outcomes {
        match outcome {
            TickOutcome::NotReady(reason) => assert!(reason.contains("found 4 of 5")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert!(group.ledger().writes().is_empty());
    assert_eq!(group.ledger().status(), GroupStatus::WaitForDealer);
}

#[tokio::test]
async fn test_removed_member_keeps_its_slot() {
    let ledger = SimulatedLedger::new(1, 3, 100);
    let mut group = LocalGroup::with_ledger(ledger, 4, 2).unwrap();
    group.ledger().remove_member(&member_address(3));

    let outcomes = group.sweep().await;
    for outcome in &outcomes[..3] {
        assert!(matches!(outcome, TickOutcome::Dealt(DealOutcome::Submitted(_))));
    }
    assert_eq!(outcomes[3], TickOutcome::NotMember);
    assert_eq!(group.ledger().status(), GroupStatus::WaitForRow);
    let dealing = group.ledger().member(&member_address(0)).unwrap().shared_dealer.unwrap();
    assert_eq!(dealing.rows.len(), 4);

    group.complete_dkg().await.unwrap();
    let round = group.run_round(b"after removal").await.unwrap();
    assert!(round.signed_combined_sig.is_some());
    assert!(!round.signed_by(&member_address(3)));
    assert!(group.ledger().writes().iter().all(|w| w.sender != member_address(3)));
}

#[tokio::test]
async fn test_duplicate_round_submission_is_skipped() {
    let mut group = LocalGroup::new(3, 1).unwrap();
    group.complete_dkg().await.unwrap();
    for i in 0..6 {
        group.run_round(format!("round {i}").as_bytes()).await.unwrap();
    }

    let node = group.node_mut(0).unwrap();
    node.coordinator.request_random(Binary::from(&b"seventh"[..])).await.unwrap();
    let first = node.coordinator.tick().await;
    assert_eq!(first, TickOutcome::Round(RoundOutcome::Submitted { round: 7, countersigned: false }));

    let writes_before = group.ledger().writes().len();
    let node = group.node_mut(0).unwrap();
    let second = node.coordinator.tick().await;
    assert_eq!(second, TickOutcome::Round(RoundOutcome::AlreadySigned { round: 7 }));
    assert_eq!(group.ledger().writes().len(), writes_before);
}

#[tokio::test]
async fn test_tampered_row_aborts_assembly() {
    let mut group = LocalGroup::new(3, 1).unwrap();
    group.sweep().await;
    assert_eq!(group.ledger().status(), GroupStatus::WaitForRow);
    assert!(group.ledger().corrupt_dealer_row(&member_address(2), 0));

    let outcomes = group.sweep().await;
    match &outcomes[0] {
        TickOutcome::Failed(reason) => {
            assert!(reason.contains("Partial share failure"));
            assert!(reason.contains(&member_address(2)));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let row_senders: Vec<String> = group
        .ledger()
        .writes_of("share_row")
        .into_iter()
        .map(|w| w.sender)
        .collect();
    assert_eq!(row_senders, vec![member_address(1), member_address(2)]);
    assert_eq!(group.ledger().status(), GroupStatus::WaitForRow);
    assert!(group.nodes()[0].coordinator.state().is_empty());
}

#[tokio::test]
async fn test_registered_pubkey_mismatch_skips_dealing() {
    let mut group = LocalGroup::new(3, 1).unwrap();
    let stranger = LocalKeypair::generate();
    group.ledger().set_member_pubkey(&member_address(0), stranger.public_key_bytes());

    let outcomes = group.sweep().await;
    assert_eq!(outcomes[0], TickOutcome::Dealt(DealOutcome::PubkeyMismatch));
    assert!(group.ledger().writes_of("share_dealer").iter().all(|w| w.sender != member_address(0)));
}

#[tokio::test]
async fn test_ledger_outage_only_costs_a_tick() {
    let mut group = LocalGroup::new(2, 1).unwrap();
    group.ledger().fail_next_queries(1);

    let node = group.node_mut(0).unwrap();
    assert!(matches!(node.coordinator.tick().await, TickOutcome::Failed(_)));
    assert!(node.coordinator.state().is_empty());
    assert!(matches!(
        node.coordinator.tick().await,
        TickOutcome::Dealt(DealOutcome::Submitted(_))
    ));
    let again = node.coordinator.tick().await;
    assert_eq!(again, TickOutcome::Dealt(DealOutcome::AlreadyDealt));
}

#[tokio::test(start_paused = true)]
async fn test_background_loops_finish_dkg_and_stop() {
    let (ledger, nodes) = LocalGroup::new(3, 1).unwrap().into_parts();
    let clients: Vec<ProtocolClient> = nodes
        .into_iter()
        .map(|node| {
            ProtocolClient::spawn(
                node.coordinator,
                Duration::from_millis(5000),
                node.pinger,
                Duration::from_millis(5000),
            )
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ledger.status(), GroupStatus::WaitForRequest);
    assert_eq!(ledger.writes_of("ping").len(), 3);

    for client in clients {
        client.shutdown().await.unwrap();
    }
    let writes = ledger.writes().len();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ledger.writes().len(), writes);
}
