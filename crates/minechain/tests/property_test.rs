//! Property tests for tree construction and inclusion proofs:
//! - every leaf of every batch size verifies against the root
//! - changing any event field breaks the original proof
//! - hashing is deterministic

use minechain::crypto::hash_event;
use minechain::{verify_event, verify_proof, MerkleTree, MiningEvent};
use proptest::prelude::*;

fn arb_event() -> impl Strategy<Value = MiningEvent> {
    (
        "[a-f0-9]{8}",
        "[1-9A-HJ-NP-Za-km-z]{32,44}",
        "[a-z0-9-]{1,16}",
        "[0-9a-f]{64}",
        0u64..10_000,
        0u32..16,
        0u64..4_000_000_000_000,
    )
        .prop_map(|(id, wallet, challenge, solution, points, difficulty, ts)| MiningEvent {
            id,
            wallet_address: wallet,
            challenge_id: challenge,
            solution_hash: solution,
            points_awarded: points,
            difficulty,
            timestamp: ts,
        })
}

proptest! {
    #[test]
    fn every_leaf_round_trips(events in prop::collection::vec(arb_event(), 1..40)) {
        let tree = MerkleTree::from_events(&events).unwrap();
        for (i, e) in events.iter().enumerate() {
            let proof = tree.prove(i).unwrap();
            prop_assert!(verify_event(e, &proof, tree.root()));
        }
    }

    #[test]
    fn mutated_event_fails_original_proof(
        events in prop::collection::vec(arb_event(), 1..20),
        pick in any::<prop::sample::Index>(),
        field in 0usize..7,
    ) {
        let tree = MerkleTree::from_events(&events).unwrap();
        let i = pick.index(events.len());
        let proof = tree.prove(i).unwrap();

        let mut changed = events[i].clone();
        match field {
            0 => changed.id.push('x'),
            1 => changed.wallet_address.push('x'),
            2 => changed.challenge_id.push('x'),
            3 => changed.solution_hash.push('x'),
            4 => changed.points_awarded += 1,
            5 => changed.difficulty += 1,
            _ => changed.timestamp += 1,
        }

        prop_assert!(!verify_event(&changed, &proof, tree.root()));
    }

    #[test]
    fn leaf_hash_is_deterministic(e in arb_event()) {
        prop_assert_eq!(hash_event(&e), hash_event(&e.clone()));
    }

    #[test]
    fn shifted_index_fails(events in prop::collection::vec(arb_event(), 2..30), pick in any::<prop::sample::Index>()) {
        let tree = MerkleTree::from_events(&events).unwrap();
        let i = pick.index(events.len());
        let proof = tree.prove(i).unwrap();
        let leaf = hash_event(&events[i]);
        let other = (i + 1) % events.len();

        // duplicate events share a leaf digest, which makes positions interchangeable
        let distinct: std::collections::HashSet<_> = tree.leaves().iter().collect();
        prop_assume!(distinct.len() == events.len());
        prop_assert!(!verify_proof(&leaf, &proof.siblings, other, tree.root()));
    }
}
