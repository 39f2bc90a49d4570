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

//! Keeps the linear history of `(height, merkle_root)` commits, the record
//! of what has actually been finalized as opposed to what is merely staged
//! in the trie and node manager.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, ErrorKind};
use crate::ser::{self, Readable, Writeable};
use crate::store::Store;
use crate::trie::EMPTY_TRIE_HASH;
use crate::types::{Hash, Height};

const COMMITS_KEY: &[u8] = b"commits";

/// One finalized height and the trie root it produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Commit {
	pub height: Height,
	pub merkle_root: Hash,
}

impl Writeable for Commit {
	fn write(&self, writer: &mut dyn Write) -> Result<(), ser::Error> {
		writer.write_i32::<BigEndian>(self.height)?;
		writer.write_all(&self.merkle_root)?;
		Ok(())
	}
}

impl Readable for Commit {
	fn read(reader: &mut dyn Read) -> Result<Self, ser::Error> {
		let height = reader.read_i32::<BigEndian>()?;
		let mut merkle_root = [0u8; 32];
		reader.read_exact(&mut merkle_root)?;
		Ok(Commit { height, merkle_root })
	}
}

struct CommitLog(Vec<Commit>);

impl Writeable for CommitLog {
	fn write(&self, writer: &mut dyn Write) -> Result<(), ser::Error> {
		writer.write_u32::<BigEndian>(self.0.len() as u32)?;
		for c in &self.0 {
			c.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for CommitLog {
	fn read(reader: &mut dyn Read) -> Result<Self, ser::Error> {
		let count = reader.read_u32::<BigEndian>()?;
		let mut commits = Vec::with_capacity(count as usize);
		for _ in 0..count {
			commits.push(Commit::read(reader)?);
		}
		Ok(CommitLog(commits))
	}
}

/// Linear history of commits, from genesis (height 0, the empty trie) to the
/// current tip.
pub struct CommitManager {
	store: Store,
	commits: Vec<Commit>,
}

impl CommitManager {
	/// Loads the commit history from the store, or starts a fresh genesis
	/// commit if none was ever saved.
	pub fn open(store: &Store) -> Result<Self, Error> {
		let commits = match store.get_ser::<CommitLog>(COMMITS_KEY)? {
			Some(log) if !log.0.is_empty() => log.0,
			_ => vec![Commit {
				height: 0,
				merkle_root: EMPTY_TRIE_HASH,
			}],
		};
		Ok(CommitManager {
			store: store.clone(),
			commits,
		})
	}

	/// The most recently committed height and root.
	pub fn tip(&self) -> Commit {
		*self.commits.last().expect("commits is never empty")
	}

	/// Appends a new commit. Fails `InvalidHeight` unless `h` is strictly
	/// past the current tip.
	pub fn commit(&mut self, h: Height, root: Hash) -> Result<(), Error> {
		if h <= self.tip().height {
			return Err(ErrorKind::InvalidHeight(h as i64).into());
		}
		self.commits.push(Commit {
			height: h,
			merkle_root: root,
		});
		self.save()
	}

	/// Rewinds the tip to the latest commit with `height <= h`. If no commit
	/// lands exactly on `h`, synthesizes one there carrying the surviving
	/// tip's root, so every height ever queried has a definite root.
	pub fn reset(&mut self, h: Height) -> Result<(), Error> {
		let keep = self
			.commits
			.iter()
			.rposition(|c| c.height <= h)
			.ok_or_else(|| ErrorKind::InvalidHeight(h as i64))?;
		self.commits.truncate(keep + 1);
		if self.tip().height != h {
			let root = self.tip().merkle_root;
			self.commits.push(Commit {
				height: h,
				merkle_root: root,
			});
		}
		self.save()
	}

	/// Iterates commits from the tip back to genesis.
	pub fn log(&self) -> impl Iterator<Item = &Commit> {
		self.commits.iter().rev()
	}

	/// Persists the full commit history.
	pub fn save(&self) -> Result<(), Error> {
		let batch = self.store.batch()?;
		batch.put_ser(COMMITS_KEY, &CommitLog(self.commits.clone()))?;
		batch.commit()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{new_env, DB_COMMITS};
	use tempfile::tempdir;

	fn open_store() -> (tempfile::TempDir, Store) {
		let dir = tempdir().unwrap();
		let env = new_env(dir.path()).unwrap();
		let store = Store::open(env, DB_COMMITS).unwrap();
		(dir, store)
	}

	#[test]
	fn genesis_commit_is_the_empty_trie() {
		let (_dir, store) = open_store();
		let cm = CommitManager::open(&store).unwrap();
		assert_eq!(cm.tip(), Commit { height: 0, merkle_root: EMPTY_TRIE_HASH });
	}

	#[test]
	fn commit_rejects_non_increasing_height() {
		let (_dir, store) = open_store();
		let mut cm = CommitManager::open(&store).unwrap();
		cm.commit(10, [1u8; 32]).unwrap();
		let err = cm.commit(10, [2u8; 32]).unwrap_err();
		assert!(matches!(err.kind(), ErrorKind::InvalidHeight(_)));
	}

	#[test]
	fn reset_to_exact_height_truncates() {
		let (_dir, store) = open_store();
		let mut cm = CommitManager::open(&store).unwrap();
		cm.commit(10, [1u8; 32]).unwrap();
		cm.commit(20, [2u8; 32]).unwrap();
		cm.commit(30, [3u8; 32]).unwrap();

		cm.reset(20).unwrap();
		assert_eq!(cm.tip(), Commit { height: 20, merkle_root: [2u8; 32] });
	}

	#[test]
	fn reset_between_heights_synthesizes_a_record() {
		let (_dir, store) = open_store();
		let mut cm = CommitManager::open(&store).unwrap();
		cm.commit(10, [1u8; 32]).unwrap();
		cm.commit(20, [2u8; 32]).unwrap();

		cm.reset(15).unwrap();
		assert_eq!(cm.tip(), Commit { height: 15, merkle_root: [1u8; 32] });
	}

	#[test]
	fn save_and_reopen_round_trips() {
		let (_dir, store) = open_store();
		{
			let mut cm = CommitManager::open(&store).unwrap();
			cm.commit(5, [9u8; 32]).unwrap();
		}
		let cm = CommitManager::open(&store).unwrap();
		assert_eq!(cm.tip(), Commit { height: 5, merkle_root: [9u8; 32] });
	}
}
