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

//! A 256-ary byte-prefix Merkle trie over names. Nodes are resolved lazily:
//! a child that hasn't been walked into yet is represented only by its
//! pinned hash, fetched from the KV store on first visit.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::store::Store;
use crate::types::{double_sha256, Hash};

/// Hash of the empty trie: 32 bytes, all zero except the low bit of the
/// last byte.
pub const EMPTY_TRIE_HASH: Hash = [
	0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
];

/// One node of the trie, addressed by the path of bytes leading to it.
struct TrieNode {
	/// Cached hash. `None` means dirty (needs recomputing by `merkle_root`).
	hash: Option<Hash>,
	/// Whether a node-manager entry exists at this exact path.
	has_value: bool,
	/// Known children, by the byte that selects them.
	children: BTreeMap<u8, TrieNode>,
	/// Set when this node is a stand-in for a subtree that hasn't been
	/// walked into yet; its real children live on disk under this hash.
	unresolved: Option<Hash>,
}

impl TrieNode {
	fn empty() -> Self {
		TrieNode {
			hash: None,
			has_value: false,
			children: BTreeMap::new(),
			unresolved: None,
		}
	}

	fn pinned(hash: Hash) -> Self {
		TrieNode {
			hash: Some(hash),
			has_value: false,
			children: BTreeMap::new(),
			unresolved: Some(hash),
		}
	}
}

/// The trie itself, plus the store its disk forms are read from and written
/// to.
pub struct Trie {
	store: Store,
	root: TrieNode,
}

impl Trie {
	/// A fresh, empty trie backed by the given store (expected to be opened
	/// against `DB_TRIE`).
	pub fn new(store: &Store) -> Self {
		Trie {
			store: store.clone(),
			root: TrieNode::empty(),
		}
	}

	/// Discards all in-memory structure and installs an unresolved root
	/// carrying `hash`.
	pub fn set_root(&mut self, hash: Hash) {
		self.root = TrieNode::pinned(hash);
	}

	/// Walks `key` from the root, resolving and creating nodes as needed,
	/// clearing `hash` on every node along the path, and marking the
	/// terminal node as carrying a value.
	pub fn update(&mut self, key: &[u8]) -> Result<(), Error> {
		let mut node = &mut self.root;
		node.hash = None;
		for &byte in key {
			Self::resolve(&self.store, node)?;
			node = node.children.entry(byte).or_insert_with(TrieNode::empty);
			node.hash = None;
		}
		node.has_value = true;
		Ok(())
	}

	/// Recomputes `hash` bottom-up for every dirty node, writing each node's
	/// serialized form to the store along the way, and returns the new root
	/// hash. Writes are coalesced into a single batch.
	pub fn merkle_root<F>(&mut self, value_hash: F) -> Result<Hash, Error>
	where
		F: Fn(&[u8]) -> Option<Hash>,
	{
		let batch = self.store.batch()?;
		let mut path = Vec::new();
		let root_hash = Self::recompute(&self.store, &batch, &mut self.root, &mut path, &value_hash)?;
		batch.commit()?;
		Ok(root_hash.unwrap_or(EMPTY_TRIE_HASH))
	}

	fn recompute<F>(
		store: &Store,
		batch: &crate::store::Batch<'_>,
		node: &mut TrieNode,
		path: &mut Vec<u8>,
		value_hash: &F,
	) -> Result<Option<Hash>, Error>
	where
		F: Fn(&[u8]) -> Option<Hash>,
	{
		if let Some(h) = node.hash {
			return Ok(Some(h));
		}
		Self::resolve(store, node)?;

		// `BTreeMap` iterates in ascending key order already, so the
		// concatenation below is byte-ascending without an explicit sort.
		let mut serialized = Vec::new();
		for (&byte, child) in node.children.iter_mut() {
			path.push(byte);
			let child_hash = Self::recompute(store, batch, child, path, value_hash)?;
			path.pop();
			if let Some(h) = child_hash {
				serialized.push(byte);
				serialized.extend_from_slice(&h);
			}
		}

		let value = if node.has_value {
			value_hash(path.as_slice())
		} else {
			None
		};
		if let Some(h) = value {
			serialized.extend_from_slice(&h);
		}

		if serialized.is_empty() {
			node.hash = None;
			return Ok(None);
		}

		let hash = double_sha256(&serialized);
		batch.put(&hash, &serialized)?;
		node.hash = Some(hash);
		Ok(Some(hash))
	}

	/// If `node` is an unresolved stand-in, fetches its disk form and
	/// materializes its children (themselves unresolved) and `has_value`
	/// flag. A no-op if already resolved.
	fn resolve(store: &Store, node: &mut TrieNode) -> Result<(), Error> {
		let hash = match node.unresolved {
			Some(h) => h,
			None => return Ok(()),
		};
		node.unresolved = None;

		let bytes = match store.get(&hash)? {
			Some(b) => b,
			None => return Ok(()),
		};
		let (children, has_value_hash) = decode_disk_form(&bytes)?;
		for (byte, child_hash) in children {
			node.children.insert(byte, TrieNode::pinned(child_hash));
		}
		node.has_value = has_value_hash;
		Ok(())
	}
}

/// Parses a trie node's disk form: `(child_byte:u8 ‖ child_hash:32)*`
/// optionally followed by a trailing 32-byte value hash. The two cases are
/// told apart by the remaining length modulo 33 (each child entry is 33
/// bytes; a trailing value hash leaves a remainder of exactly 32).
fn decode_disk_form(bytes: &[u8]) -> Result<(Vec<(u8, Hash)>, bool), Error> {
	let rem = bytes.len() % 33;
	let (body, has_value) = if rem == 32 {
		(&bytes[..bytes.len() - 32], true)
	} else if rem == 0 {
		(bytes, false)
	} else {
		return Err(crate::error::ErrorKind::Decode(format!(
			"malformed trie node ({} bytes)",
			bytes.len()
		))
		.into());
	};

	let mut children = Vec::with_capacity(body.len() / 33);
	let mut i = 0;
	while i < body.len() {
		let byte = body[i];
		let mut hash = [0u8; 32];
		hash.copy_from_slice(&body[i + 1..i + 33]);
		children.push((byte, hash));
		i += 33;
	}
	Ok((children, has_value))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{new_env, DB_TRIE};
	use tempfile::tempdir;

	fn open_store() -> (tempfile::TempDir, Store) {
		let dir = tempdir().unwrap();
		let env = new_env(dir.path()).unwrap();
		let store = Store::open(env, DB_TRIE).unwrap();
		(dir, store)
	}

	#[test]
	fn empty_trie_has_the_defined_empty_hash() {
		let (_dir, store) = open_store();
		let mut trie = Trie::new(&store);
		let root = trie.merkle_root(|_| None).unwrap();
		assert_eq!(root, EMPTY_TRIE_HASH);
	}

	#[test]
	fn single_key_changes_the_root() {
		let (_dir, store) = open_store();
		let mut trie = Trie::new(&store);
		let empty = trie.merkle_root(|_| None).unwrap();

		trie.update(b"foo").unwrap();
		let with_value = trie.merkle_root(|k| if k == b"foo" { Some([7u8; 32]) } else { None }).unwrap();
		assert_ne!(empty, with_value);
	}

	#[test]
	fn set_root_then_resolve_round_trips() {
		let (_dir, store) = open_store();
		let mut trie = Trie::new(&store);
		trie.update(b"abc").unwrap();
		let root = trie
			.merkle_root(|k| if k == b"abc" { Some([9u8; 32]) } else { None })
			.unwrap();

		let mut reopened = Trie::new(&store);
		reopened.set_root(root);
		reopened.update(b"abc").unwrap();
		let root2 = reopened
			.merkle_root(|k| if k == b"abc" { Some([9u8; 32]) } else { None })
			.unwrap();
		assert_eq!(root, root2);
	}
}
