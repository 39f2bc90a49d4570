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

//! The public facade: wires the change-log-backed node manager, the Merkle
//! trie and the commit history together into the single entry point callers
//! drive a block at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::change::{Change, ChangeOp};
use crate::commit::{Commit, CommitManager};
use crate::error::Error;
use crate::node::Node;
use crate::node_manager::{Name, NodeManager};
use crate::params::ConsensusParams;
use crate::store::{new_env, Store, DB_CHANGES, DB_COMMITS, DB_TRIE};
use crate::trie::Trie;
use crate::types::{Amount, Hash, Height, Id, OutPoint};

/// Ties the three pieces of consensus state together: the per-name node
/// manager, the Merkle trie over names, and the linear commit history that
/// records what has actually been finalized.
pub struct ClaimTrie {
	node_mgr: NodeManager,
	trie: Trie,
	commit_mgr: CommitManager,
	touched: BTreeSet<Name>,
}

impl ClaimTrie {
	/// Opens (creating if necessary) the on-disk state rooted at `data_dir`
	/// and replays it up to whatever height was last committed.
	pub fn open(data_dir: &Path, params: ConsensusParams) -> Result<Self, Error> {
		let env = new_env(data_dir)?;
		let changes_store = Store::open(env.clone(), DB_CHANGES)?;
		let trie_store = Store::open(env.clone(), DB_TRIE)?;
		let commits_store = Store::open(env, DB_COMMITS)?;

		let commit_mgr = CommitManager::open(&commits_store)?;
		let tip = commit_mgr.tip();

		let mut node_mgr = NodeManager::new(&changes_store, params);
		node_mgr.load(tip.height)?;

		let mut trie = Trie::new(&trie_store);
		trie.set_root(tip.merkle_root);

		Ok(ClaimTrie {
			node_mgr,
			trie,
			commit_mgr,
			touched: BTreeSet::new(),
		})
	}

	/// The height of the last finalized commit.
	pub fn height(&self) -> Height {
		self.commit_mgr.tip().height
	}

	/// The Merkle root of the last finalized commit.
	pub fn merkle_hash(&self) -> Hash {
		self.commit_mgr.tip().merkle_root
	}

	/// The last finalized commit record.
	pub fn tip(&self) -> Commit {
		self.commit_mgr.tip()
	}

	/// Iterates the commit history from the tip back to genesis.
	pub fn commit_log(&self) -> impl Iterator<Item = &Commit> {
		self.commit_mgr.log()
	}

	/// Returns `name`'s node, replayed up to the current height.
	pub fn node(&mut self, name: &[u8]) -> Result<&Node, Error> {
		let h = self.height();
		self.node_mgr.get(name, h)
	}

	/// Returns every change ever recorded for `name`.
	pub fn dump_changes(&self, name: &[u8]) -> Result<Vec<Change>, Error> {
		self.node_mgr.dump_changes(name)
	}

	/// Records a new claim bid.
	pub fn add_claim(
		&mut self,
		name: &[u8],
		outpoint: OutPoint,
		amount: Amount,
		value: Vec<u8>,
	) -> Result<(), Error> {
		self.apply(name, outpoint, ChangeOp::AddClaim { amount, value })
	}

	/// Spends a live claim.
	pub fn spend_claim(&mut self, name: &[u8], outpoint: OutPoint) -> Result<(), Error> {
		self.apply(name, outpoint, ChangeOp::SpendClaim)
	}

	/// Spends and re-adds a claim under the same id, in the same block.
	pub fn update_claim(
		&mut self,
		name: &[u8],
		outpoint: OutPoint,
		amount: Amount,
		id: Id,
		value: Vec<u8>,
	) -> Result<(), Error> {
		self.apply(
			name,
			outpoint,
			ChangeOp::UpdateClaim { amount, id, value },
		)
	}

	/// Adds stake backing an existing (or not-yet-seen) claim.
	pub fn add_support(
		&mut self,
		name: &[u8],
		outpoint: OutPoint,
		amount: Amount,
		id: Id,
	) -> Result<(), Error> {
		self.apply(name, outpoint, ChangeOp::AddSupport { amount, id })
	}

	/// Spends a live support.
	pub fn spend_support(&mut self, name: &[u8], outpoint: OutPoint) -> Result<(), Error> {
		self.apply(name, outpoint, ChangeOp::SpendSupport)
	}

	fn apply(&mut self, name: &[u8], outpoint: OutPoint, op: ChangeOp) -> Result<(), Error> {
		let chg = Change {
			height: self.height(),
			name: name.to_vec(),
			outpoint,
			op,
		};
		self.node_mgr.modify(name, chg)?;
		self.trie.update(name)?;
		self.touched.insert(name.to_vec());
		Ok(())
	}

	/// Finalizes every height up to and including `h`: advances the node
	/// manager through each intermediate height, dirtying the trie leaves of
	/// whatever names have scheduled activity, then recomputes the Merkle
	/// root and appends a new commit record.
	pub fn commit(&mut self, h: Height) -> Result<Hash, Error> {
		let current = self.height();
		for i in (current + 1)..=h {
			let node_mgr = &mut self.node_mgr;
			let trie = &mut self.trie;
			let touched = &mut self.touched;
			node_mgr.catch_up(i, |name| {
				touched.insert(name.to_vec());
				trie.update(name)
			})?;
		}

		let mut values = BTreeMap::new();
		for name in self.touched.iter() {
			if let Some(hash) = self.node_mgr.get(name, h)?.hash() {
				values.insert(name.clone(), hash);
			}
		}

		let root = self.trie.merkle_root(|path| values.get(path).copied())?;
		self.commit_mgr.commit(h, root)?;
		self.trie.set_root(root);
		self.touched.clear();
		Ok(root)
	}

	/// Rewinds to `h`: the commit history truncates, the node manager
	/// reloads every node whose state depended on a later height, and the
	/// trie re-roots at the commit that survives.
	pub fn reset(&mut self, h: Height) -> Result<(), Error> {
		self.commit_mgr.reset(h)?;
		self.node_mgr.reset(h)?;
		self.trie.set_root(self.commit_mgr.tip().merkle_root);
		self.touched.clear();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn open_trie() -> (tempfile::TempDir, ClaimTrie) {
		let dir = tempdir().unwrap();
		let ct = ClaimTrie::open(dir.path(), ConsensusParams::default()).unwrap();
		(dir, ct)
	}

	#[test]
	fn genesis_height_and_root() {
		let (_dir, ct) = open_trie();
		assert_eq!(ct.height(), 0);
		assert_eq!(ct.merkle_hash(), crate::trie::EMPTY_TRIE_HASH);
	}

	#[test]
	fn add_claim_then_commit_changes_the_root() {
		let (_dir, mut ct) = open_trie();
		let empty_root = ct.merkle_hash();

		ct.add_claim(b"foo", OutPoint::new([1u8; 32], 0), 10, b"bar".to_vec())
			.unwrap();
		let root = ct.commit(1).unwrap();

		assert_ne!(root, empty_root);
		assert_eq!(ct.height(), 1);
		assert_eq!(ct.merkle_hash(), root);
		assert!(ct.node(b"foo").unwrap().best_claim().is_some());
	}

	#[test]
	fn reset_undoes_a_commit() {
		let (_dir, mut ct) = open_trie();
		let empty_root = ct.merkle_hash();

		ct.add_claim(b"foo", OutPoint::new([1u8; 32], 0), 10, vec![])
			.unwrap();
		ct.commit(1).unwrap();

		ct.reset(0).unwrap();
		assert_eq!(ct.height(), 0);
		assert_eq!(ct.merkle_hash(), empty_root);
	}

	#[test]
	fn reopen_after_commit_replays_state() {
		let dir = tempdir().unwrap();
		let root = {
			let mut ct = ClaimTrie::open(dir.path(), ConsensusParams::default()).unwrap();
			ct.add_claim(b"foo", OutPoint::new([1u8; 32], 0), 10, vec![])
				.unwrap();
			ct.commit(1).unwrap()
		};

		let mut reopened = ClaimTrie::open(dir.path(), ConsensusParams::default()).unwrap();
		assert_eq!(reopened.height(), 1);
		assert_eq!(reopened.merkle_hash(), root);
		assert!(reopened.node(b"foo").unwrap().best_claim().is_some());
	}
}
