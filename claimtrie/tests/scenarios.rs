// Copyright 2024 The Claimtrie Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end auction scenarios driven straight against `Node`, plus
//! whole-crate round-trip checks against the `ClaimTrie` facade.

use claimtrie::node::Node;
use claimtrie::params::ConsensusParams;
use claimtrie::types::OutPoint;
use claimtrie::ClaimTrie;

fn op(byte: u8, index: u32) -> OutPoint {
	OutPoint::new([byte; 32], index)
}

fn id_of(n: &Node, outpoint: OutPoint) -> claimtrie::types::Id {
	n.claims().iter().find(|c| c.outpoint == outpoint).unwrap().id
}

/// S1 from the whitepaper: a support-backed incumbent repels two lower bids
/// until a third bid, backed by nothing but its own size, finally clears the
/// bar and triggers a takeover that snaps every still-pending entry active.
#[test]
fn s1_whitepaper_takeover_cascade() {
	let mut n = Node::with_params(b"x".to_vec(), ConsensusParams::default());

	n.adjust_to(12);
	n.add_claim(op(1, 1), 10, vec![]).unwrap();
	n.advance_one();
	assert_eq!(n.best_claim().unwrap().outpoint, op(1, 1));
	let id_a = id_of(&n, op(1, 1));

	n.adjust_to(1000);
	n.add_claim(op(2, 2), 20, vec![]).unwrap();
	n.advance_one();
	assert_eq!(n.best_claim().unwrap().outpoint, op(1, 1));

	n.adjust_to(1009);
	n.add_support(op(3, 3), 14, id_a).unwrap();
	n.advance_one();
	assert_eq!(n.best_claim().unwrap().outpoint, op(1, 1));
	assert_eq!(n.best_claim().unwrap().effective_amount, 24);

	n.adjust_to(1019);
	n.add_claim(op(4, 4), 50, vec![]).unwrap();
	n.advance_one();
	assert_eq!(n.best_claim().unwrap().outpoint, op(1, 1));

	n.adjust_to(1031);
	assert_eq!(n.best_claim().unwrap().outpoint, op(1, 1));

	n.adjust_to(1039);
	n.add_claim(op(5, 5), 300, vec![]).unwrap();
	n.advance_one();

	n.adjust_to(1051);
	let best = n.best_claim().unwrap();
	assert_eq!(best.outpoint, op(5, 5));
	assert_eq!(best.effective_amount, 300);
	assert_eq!(n.tookover_at(), 1051);
}

/// S2: spending the incumbent falls back to the next-best claim immediately.
#[test]
fn s2_spend_restores_older_claim() {
	let mut n = Node::with_params(b"x".to_vec(), ConsensusParams::default());
	n.adjust_to(0);
	n.add_claim(op(1, 1), 2, vec![]).unwrap();
	n.add_claim(op(2, 2), 1, vec![]).unwrap();
	n.advance_one();
	assert_eq!(n.best_claim().unwrap().outpoint, op(1, 1));

	n.spend_claim(op(1, 1)).unwrap();
	n.advance_one();
	assert_eq!(n.best_claim().unwrap().outpoint, op(2, 2));
}

/// S3: equal bids favor whichever was accepted first.
#[test]
fn s3_tie_goes_to_the_older_claim() {
	let mut n = Node::with_params(b"x".to_vec(), ConsensusParams::default());
	n.adjust_to(0);
	n.add_claim(op(1, 1), 1, vec![]).unwrap();
	n.advance_one();
	n.add_claim(op(2, 2), 1, vec![]).unwrap();
	n.advance_one();
	assert_eq!(n.best_claim().unwrap().outpoint, op(1, 1));
}

/// S4: supports can flip the winner away from the larger bare bid.
#[test]
fn s4_supports_flip_the_winner() {
	let mut n = Node::with_params(b"x".to_vec(), ConsensusParams::default());
	n.adjust_to(0);
	n.add_claim(op(1, 1), 2, vec![]).unwrap();
	n.add_claim(op(2, 2), 1, vec![]).unwrap();
	n.advance_one();
	let id_a = id_of(&n, op(1, 1));
	let id_b = id_of(&n, op(2, 2));

	n.add_support(op(3, 3), 1, id_a).unwrap();
	n.add_support(op(4, 4), 10, id_b).unwrap();
	n.advance_one();

	let best = n.best_claim().unwrap();
	assert_eq!(best.outpoint, op(2, 2));
	assert_eq!(best.effective_amount, 11);
}

/// S5: with a fast delay factor, a late support takes a full cycle to kick
/// in, then flips the winner.
#[test]
fn s5_support_activation_delay() {
	let params = ConsensusParams {
		max_active_delay: 10,
		active_delay_factor: 1,
		original_expiration: 1_000_000,
		extended_expiration: 1_000_000,
		extended_expiration_fork_height: 1_000_000,
	};
	let mut n = Node::with_params(b"x".to_vec(), params);
	n.adjust_to(0);
	n.add_claim(op(1, 1), 1, vec![]).unwrap();
	n.add_claim(op(2, 2), 2, vec![]).unwrap();
	n.advance_one();
	let id_a = id_of(&n, op(1, 1));

	n.adjust_to(10);
	n.add_support(op(3, 3), 10, id_a).unwrap();
	n.advance_one();

	n.adjust_to(20);
	assert_eq!(n.best_claim().unwrap().outpoint, op(2, 2));
	assert_eq!(n.best_claim().unwrap().effective_amount, 2);

	n.adjust_to(21);
	assert_eq!(n.best_claim().unwrap().outpoint, op(1, 1));
	assert_eq!(n.best_claim().unwrap().effective_amount, 11);
}

/// S6 / invariant 6: the empty trie's Merkle root is the fixed sentinel hash.
#[test]
fn s6_empty_trie_merkle_root() {
	let dir = tempfile::tempdir().unwrap();
	let ct = ClaimTrie::open(dir.path(), ConsensusParams::default()).unwrap();
	assert_eq!(ct.merkle_hash(), claimtrie::trie::EMPTY_TRIE_HASH);
	assert_eq!(claimtrie::trie::EMPTY_TRIE_HASH[31], 1);
	assert!(claimtrie::trie::EMPTY_TRIE_HASH[..31].iter().all(|&b| b == 0));
}

/// Invariant 5: committing to a height and then resetting back to the
/// pre-commit height restores the exact prior Merkle root.
#[test]
fn invariant_commit_then_reset_round_trips_the_root() {
	let dir = tempfile::tempdir().unwrap();
	let mut ct = ClaimTrie::open(dir.path(), ConsensusParams::default()).unwrap();
	let root_before = ct.merkle_hash();

	ct.add_claim(b"example", op(1, 1), 10, b"value".to_vec())
		.unwrap();
	ct.commit(1).unwrap();
	assert_ne!(ct.merkle_hash(), root_before);

	ct.reset(0).unwrap();
	assert_eq!(ct.merkle_hash(), root_before);
	assert_eq!(ct.height(), 0);
}

/// Invariant 4 (replay determinism), exercised through the facade: closing
/// and reopening against the same data directory reproduces the exact same
/// root and node state.
#[test]
fn invariant_replay_determinism_across_reopen() {
	let dir = tempfile::tempdir().unwrap();
	let root = {
		let mut ct = ClaimTrie::open(dir.path(), ConsensusParams::default()).unwrap();
		ct.add_claim(b"example", op(1, 1), 10, vec![]).unwrap();
		ct.add_claim(b"other", op(2, 2), 5, vec![]).unwrap();
		ct.commit(1).unwrap()
	};

	let mut reopened = ClaimTrie::open(dir.path(), ConsensusParams::default()).unwrap();
	assert_eq!(reopened.merkle_hash(), root);
	assert_eq!(
		reopened.node(b"example").unwrap().best_claim().unwrap().outpoint,
		op(1, 1)
	);
	assert_eq!(
		reopened.node(b"other").unwrap().best_claim().unwrap().outpoint,
		op(2, 2)
	);
}
