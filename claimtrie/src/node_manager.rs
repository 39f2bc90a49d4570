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

//! Lazily materializes per-name [`Node`]s from their change logs and tracks
//! which names have pending activity at a future height, so the facade only
//! has to touch names that actually changed.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::change::{Change, ChangeLog, ChangeOp};
use crate::error::Error;
use crate::node::Node;
use crate::params::ConsensusParams;
use crate::store::Store;
use crate::types::Height;

/// A name, as stored: an opaque byte string.
pub type Name = Vec<u8>;

/// Cache of live nodes plus a schedule of future per-name activity.
pub struct NodeManager {
	store: Store,
	changes: ChangeLog,
	height: Height,
	cache: BTreeMap<Name, Node>,
	next_updates: BTreeMap<Height, BTreeSet<Name>>,
	params: ConsensusParams,
}

impl NodeManager {
	/// Wraps the given store (expected to be opened against `DB_CHANGES`).
	pub fn new(store: &Store, params: ConsensusParams) -> Self {
		NodeManager {
			store: store.clone(),
			changes: ChangeLog::new(store),
			height: 0,
			cache: BTreeMap::new(),
			next_updates: BTreeMap::new(),
			params,
		}
	}

	/// Materializes every name that has a change log, advanced to `ht`.
	/// Intended for process startup.
	pub fn load(&mut self, ht: Height) -> Result<(), Error> {
		self.height = ht;
		for name in self.store.keys()? {
			let node = self.load_name(&name, ht)?;
			self.cache.insert(name, node);
		}
		Ok(())
	}

	/// Returns the node for `name`, advanced to `at_height`. If the cached
	/// node is newer than `at_height` (or than the manager's own height, e.g.
	/// after a rewind), it is reloaded from the change log first.
	pub fn get(&mut self, name: &[u8], at_height: Height) -> Result<&Node, Error> {
		self.node_at(name, at_height)
	}

	/// Applies `chg` to `name`'s node at the manager's current height,
	/// recording the change before mutating the in-memory node.
	pub fn modify(&mut self, name: &[u8], chg: Change) -> Result<(), Error> {
		let ht = self.height;
		self.node_at(name, ht)?;
		let node = self.cache.get_mut(name).expect("node_at just cached it");
		execute(node, &chg)?;

		let next = name.to_vec();
		self.next_updates
			.entry(ht + 1)
			.or_insert_with(BTreeSet::new)
			.insert(next);

		let mut changes = self.changes.load(name)?;
		changes.push(chg);
		self.changes.save(name, &changes)
	}

	/// Advances the manager to `ht`, visiting every name with activity
	/// scheduled there. `notify` is called once per such name (the facade
	/// uses it to mark the corresponding trie leaf dirty) and may fail.
	pub fn catch_up<F>(&mut self, ht: Height, mut notify: F) -> Result<(), Error>
	where
		F: FnMut(&[u8]) -> Result<(), Error>,
	{
		self.height = ht;
		let names: Vec<Name> = self
			.next_updates
			.get(&ht)
			.map(|s| s.iter().cloned().collect())
			.unwrap_or_default();

		for name in names {
			notify(&name)?;
			let next = self.node_at(&name, ht)?.next_update();
			if next > ht {
				self.next_updates
					.entry(next)
					.or_insert_with(BTreeSet::new)
					.insert(name);
			}
		}
		self.next_updates.remove(&ht);
		Ok(())
	}

	/// Reloads every cached node whose height now exceeds `h` from its
	/// change log truncated to `h`.
	pub fn reset(&mut self, h: Height) -> Result<(), Error> {
		self.height = h;
		let stale: Vec<Name> = self
			.cache
			.iter()
			.filter(|(_, n)| n.height() > h)
			.map(|(name, _)| name.clone())
			.collect();
		for name in stale {
			let node = self.load_name(&name, h)?;
			self.cache.insert(name, node);
		}
		self.next_updates.retain(|height, _| *height <= h);
		Ok(())
	}

	/// Number of nodes currently materialized in the cache.
	pub fn size(&self) -> usize {
		self.cache.len()
	}

	/// Every change ever recorded for `name`, for diagnostics.
	pub fn dump_changes(&self, name: &[u8]) -> Result<Vec<Change>, Error> {
		self.changes.dump(name)
	}

	fn node_at(&mut self, name: &[u8], ht: Height) -> Result<&Node, Error> {
		let stale = match self.cache.get(name) {
			Some(n) => n.height() > self.height || n.height() > ht,
			None => true,
		};
		if stale {
			let node = self.load_name(name, ht)?;
			self.cache.insert(name.to_vec(), node);
		}
		let node = self.cache.get_mut(name).expect("just inserted or already cached");
		node.adjust_to(ht);
		Ok(node)
	}

	/// Loads and replays `name`'s change log, truncated to entries with
	/// `height <= ht`. Does not touch the persisted log — unlike
	/// `ChangeLog::truncate`, this is a read-only view used to rebuild a
	/// node, e.g. after a rewind.
	fn load_name(&self, name: &[u8], ht: Height) -> Result<Node, Error> {
		let mut changes = self.changes.load(name)?;
		changes.retain(|c| c.height <= ht);
		trace!("replaying {} changes for {:?}", changes.len(), name);
		Ok(replay(name, &changes, self.params))
	}
}

/// Rebuilds a node from scratch by replaying its change log in order,
/// advancing the height between records as needed. A `Change`'s `height` is
/// the node's own height at the moment it was originally applied (the
/// mutation itself takes effect one block later, inside `Node::add_claim` and
/// friends) — so replay must land the node on that exact height before
/// executing, the same height `NodeManager::modify` was at when it first ran
/// the change live.
fn replay(name: &[u8], changes: &[Change], params: ConsensusParams) -> Node {
	let mut node = Node::with_params(name.to_vec(), params);
	for chg in changes {
		if node.height() < chg.height {
			node.adjust_to(chg.height);
		}
		if node.height() == chg.height {
			execute(&mut node, chg).expect("replaying a previously-accepted change");
		}
	}
	node
}

fn execute(node: &mut Node, chg: &Change) -> Result<(), Error> {
	match &chg.op {
		ChangeOp::AddClaim { amount, value } => {
			node.add_claim(chg.outpoint, *amount, value.clone())
		}
		ChangeOp::SpendClaim => node.spend_claim(chg.outpoint),
		ChangeOp::UpdateClaim { amount, id, value } => {
			node.update_claim(chg.outpoint, *amount, *id, value.clone())
		}
		ChangeOp::AddSupport { amount, id } => node.add_support(chg.outpoint, *amount, *id),
		ChangeOp::SpendSupport => node.spend_support(chg.outpoint),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{new_env, DB_CHANGES};
	use crate::types::OutPoint;
	use tempfile::tempdir;

	fn add_claim_change(height: Height, name: &[u8], byte: u8, amount: crate::types::Amount) -> Change {
		Change {
			height,
			name: name.to_vec(),
			outpoint: OutPoint::new([byte; 32], 0),
			op: ChangeOp::AddClaim {
				amount,
				value: vec![],
			},
		}
	}

	#[test]
	fn modify_persists_and_caches() {
		let dir = tempdir().unwrap();
		let env = new_env(dir.path()).unwrap();
		let store = Store::open(env, DB_CHANGES).unwrap();
		let mut nm = NodeManager::new(&store, ConsensusParams::default());

		nm.modify(b"foo", add_claim_change(1, b"foo", 1, 10)).unwrap();
		assert_eq!(nm.size(), 1);

		let loaded = nm.changes.load(b"foo").unwrap();
		assert_eq!(loaded.len(), 1);
	}

	#[test]
	fn get_replays_from_log_on_cache_miss() {
		let dir = tempdir().unwrap();
		let env = new_env(dir.path()).unwrap();
		let store = Store::open(env, DB_CHANGES).unwrap();
		let log = ChangeLog::new(&store);
		log.append(b"foo", add_claim_change(0, b"foo", 1, 10)).unwrap();

		let mut nm = NodeManager::new(&store, ConsensusParams::default());
		let node = nm.get(b"foo", 5).unwrap();
		assert!(node.best_claim().is_some());
	}

	#[test]
	fn reset_reloads_nodes_past_the_target_height() {
		let dir = tempdir().unwrap();
		let env = new_env(dir.path()).unwrap();
		let store = Store::open(env, DB_CHANGES).unwrap();
		let mut nm = NodeManager::new(&store, ConsensusParams::default());

		nm.modify(b"foo", add_claim_change(1, b"foo", 1, 10)).unwrap();
		nm.get(b"foo", 10).unwrap();
		assert!(nm.get(b"foo", 10).unwrap().height() >= 10);

		nm.reset(2).unwrap();
		assert!(nm.get(b"foo", 2).unwrap().height() <= 2);
	}
}
