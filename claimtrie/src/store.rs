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

//! LMDB-backed key/value storage shared by the change log, the trie, and the
//! commit manager. One `Environment` holds three named sub-databases;
//! `Store::open` picks out one of them, the same way `grin_store::lmdb`
//! layers named databases under a single environment.

use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use lmdb_zero as lmdb;
use lmdb_zero::LmdbResultExt;

use crate::error::{Error, ErrorKind};
use crate::ser;

/// Sub-database holding per-name change-log entries.
pub const DB_CHANGES: &str = "changes";
/// Sub-database holding serialized trie-node disk forms, keyed by hash.
pub const DB_TRIE: &str = "trie";
/// Sub-database holding the commit chain.
pub const DB_COMMITS: &str = "commits";

/// Opens (creating if necessary) the LMDB environment rooted at `path`,
/// sized generously since claim-trie state is small relative to a full
/// chain's UTXO set.
pub fn new_env(path: &Path) -> Result<Arc<lmdb::Environment>, Error> {
	fs::create_dir_all(path)?;
	let env = unsafe {
		let mut builder = lmdb::EnvBuilder::new()
			.map_err(|e| Error::from(ErrorKind::StoreIo(e.to_string())))?;
		builder
			.set_maxdbs(8)
			.map_err(|e| Error::from(ErrorKind::StoreIo(e.to_string())))?;
		builder
			.set_mapsize(10 * 1024 * 1024 * 1024)
			.map_err(|e| Error::from(ErrorKind::StoreIo(e.to_string())))?;
		builder
			.open(
				path.to_str().ok_or_else(|| {
					Error::from(ErrorKind::Other("non-utf8 data path".to_owned()))
				})?,
				lmdb::open::Flags::empty(),
				0o600,
			)
			.map_err(|e| Error::from(ErrorKind::StoreIo(e.to_string())))?
	};
	Ok(Arc::new(env))
}

/// A single named key/value database within the shared environment. Cheap to
/// clone: both fields are reference-counted handles onto the same
/// environment and database.
#[derive(Clone)]
pub struct Store {
	env: Arc<lmdb::Environment>,
	db: Arc<lmdb::Database<'static>>,
}

impl Store {
	/// Opens (creating if necessary) the named sub-database.
	pub fn open(env: Arc<lmdb::Environment>, name: &str) -> Result<Store, Error> {
		let db = Arc::new(lmdb::Database::open(
			env.clone(),
			Some(name),
			&lmdb::DatabaseOptions::new(lmdb::db::CREATE),
		)?);
		Ok(Store { env, db })
	}

	/// Gets a raw value from the db.
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&[u8]> = access.get(&self.db, key);
		res.map(|r| r.to_vec()).to_opt().map_err(Error::from)
	}

	/// Gets and deserializes a `Readable` value from the db.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		match self.get(key)? {
			Some(bytes) => {
				let v = ser::deserialize(&bytes[..])?;
				Ok(Some(v))
			}
			None => Ok(None),
		}
	}

	/// Whether the given key exists.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&lmdb::Ignore> = access.get(&self.db, key);
		res.to_opt().map(|r| r.is_some()).map_err(Error::from)
	}

	/// Produces an iterator over `Readable` values whose keys start with
	/// `prefix`, in key order.
	pub fn iter<T: ser::Readable>(&self, prefix: &[u8]) -> Result<SerIterator<T>, Error> {
		let txn = Arc::new(lmdb::ReadTransaction::new(self.env.clone())?);
		let cursor = Arc::new(
			txn.cursor(self.db.clone())
				.map_err(|e| Error::from(ErrorKind::StoreIo(e.to_string())))?,
		);
		Ok(SerIterator {
			tx: txn,
			cursor,
			seek: false,
			prefix: prefix.to_vec(),
			_marker: PhantomData,
		})
	}

	/// Begins a new atomic write batch against this db.
	pub fn batch(&self) -> Result<Batch, Error> {
		let tx = lmdb::WriteTransaction::new(self.env.clone())?;
		Ok(Batch { store: self, tx })
	}

	/// Collects every key currently in the db, in key order. Used at startup
	/// to discover which names have a change log.
	pub fn keys(&self) -> Result<Vec<Vec<u8>>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let mut cursor = txn
			.cursor(self.db.clone())
			.map_err(|e| Error::from(ErrorKind::StoreIo(e.to_string())))?;
		let access = txn.access();
		let mut keys = Vec::new();
		let mut item: lmdb::error::Result<(&[u8], &lmdb::Ignore)> = cursor.first(&access);
		loop {
			match item {
				Ok((k, _)) => keys.push(k.to_vec()),
				Err(_) => break,
			}
			item = cursor.next(&access);
		}
		Ok(keys)
	}
}

/// A write transaction collecting multiple puts/deletes to be committed
/// atomically. Used so one block's worth of trie-node writes, or one
/// change-log append, lands as a single fsync.
pub struct Batch<'a> {
	store: &'a Store,
	tx: lmdb::WriteTransaction<'a>,
}

impl<'a> Batch<'a> {
	/// Writes a raw key/value pair.
	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
		self.tx
			.access()
			.put(&self.store.db, key, value, lmdb::put::Flags::empty())?;
		Ok(())
	}

	/// Serializes and writes a `Writeable` value.
	pub fn put_ser<W: ser::Writeable>(&self, key: &[u8], value: &W) -> Result<(), Error> {
		let bytes = ser::ser_vec(value)?;
		self.put(key, &bytes)
	}

	/// Deletes a key, tolerating the key's absence.
	pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
		match self.tx.access().del_key(&self.store.db, key) {
			Ok(()) => Ok(()),
			Err(lmdb::error::Error::Code(lmdb::error::NOTFOUND)) => Ok(()),
			Err(e) => Err(Error::from(e)),
		}
	}

	/// Commits every put/delete made against this batch atomically.
	pub fn commit(self) -> Result<(), Error> {
		self.tx.commit()?;
		Ok(())
	}
}

/// Iterator over `Readable` values stored under a shared key prefix.
pub struct SerIterator<T: ser::Readable> {
	tx: Arc<lmdb::ReadTransaction<'static>>,
	cursor: Arc<lmdb::Cursor<'static, 'static>>,
	seek: bool,
	prefix: Vec<u8>,
	_marker: PhantomData<T>,
}

impl<T: ser::Readable> Iterator for SerIterator<T> {
	type Item = T;

	fn next(&mut self) -> Option<T> {
		let access = self.tx.access();
		let kv: lmdb::error::Result<(&[u8], &[u8])> = if self.seek {
			Arc::get_mut(&mut self.cursor).unwrap().next(&access)
		} else {
			self.seek = true;
			Arc::get_mut(&mut self.cursor)
				.unwrap()
				.seek_range_k(&access, &self.prefix[..])
		};
		match kv {
			Ok((k, v)) => {
				let plen = self.prefix.len();
				if plen == 0 || k.len() >= plen && k[..plen] == self.prefix[..] {
					ser::deserialize(&mut &v[..]).ok()
				} else {
					None
				}
			}
			Err(_) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[derive(Debug, PartialEq)]
	struct Blob(Vec<u8>);

	impl ser::Writeable for Blob {
		fn write(&self, writer: &mut dyn std::io::Write) -> Result<(), ser::Error> {
			writer.write_all(&self.0)?;
			Ok(())
		}
	}

	impl ser::Readable for Blob {
		fn read(reader: &mut dyn std::io::Read) -> Result<Self, ser::Error> {
			let mut buf = Vec::new();
			reader.read_to_end(&mut buf)?;
			Ok(Blob(buf))
		}
	}

	#[test]
	fn batch_put_get_delete_round_trip() {
		let dir = tempdir().unwrap();
		let env = new_env(dir.path()).unwrap();
		let store = Store::open(env, DB_CHANGES).unwrap();

		let batch = store.batch().unwrap();
		batch.put_ser(b"k1", &Blob(vec![1, 2, 3])).unwrap();
		batch.commit().unwrap();

		let got: Blob = store.get_ser(b"k1").unwrap().unwrap();
		assert_eq!(got, Blob(vec![1, 2, 3]));
		assert!(store.exists(b"k1").unwrap());

		let batch = store.batch().unwrap();
		batch.delete(b"k1").unwrap();
		batch.commit().unwrap();
		assert!(!store.exists(b"k1").unwrap());
	}
}
