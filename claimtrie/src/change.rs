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

//! Append-only per-name change log. Every mutation on a name is recorded
//! here before it is applied to the in-memory node, so that the node can
//! always be rebuilt from scratch at any height (see `node_manager::replay`).

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Error;
use crate::ser::{self, Readable, ReaderExt, Writeable, WriterExt};
use crate::store::Store;
use crate::types::{Amount, Height, Id, OutPoint};

/// The five change kinds are a closed set; representing them as a tagged
/// variant keeps `Change` exhaustively matchable instead of spreading five
/// near-identical operations across a trait.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeOp {
	/// A brand new claim bid.
	AddClaim { amount: Amount, value: Vec<u8> },
	/// Removal of a live claim.
	SpendClaim,
	/// Spend-and-readd of a claim under the same id, in the same block as the
	/// paired `SpendClaim`.
	UpdateClaim {
		amount: Amount,
		id: Id,
		value: Vec<u8>,
	},
	/// Stake added to an existing (or not-yet-seen) claim.
	AddSupport { amount: Amount, id: Id },
	/// Removal of a live support.
	SpendSupport,
}

impl ChangeOp {
	fn tag(&self) -> u8 {
		match self {
			ChangeOp::AddClaim { .. } => 0,
			ChangeOp::SpendClaim => 1,
			ChangeOp::UpdateClaim { .. } => 2,
			ChangeOp::AddSupport { .. } => 3,
			ChangeOp::SpendSupport => 4,
		}
	}
}

/// A single recorded mutation, ordered within a name's log by `height`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
	/// Height at which this change was accepted into a block (the mutation
	/// itself takes effect at `height + 1`, per the node state machine).
	pub height: Height,
	/// The name this change applies to.
	pub name: Vec<u8>,
	/// The outpoint the claim or support lives at.
	pub outpoint: OutPoint,
	/// The operation and its payload.
	pub op: ChangeOp,
}

impl Writeable for Change {
	fn write(&self, writer: &mut dyn Write) -> Result<(), ser::Error> {
		writer.write_i32::<BigEndian>(self.height)?;
		writer.write_u8(self.op.tag())?;
		writer.write_var_bytes(&self.name)?;
		writer.write_all(&self.outpoint.tx_hash)?;
		writer.write_u32::<BigEndian>(self.outpoint.index)?;
		match &self.op {
			ChangeOp::AddClaim { amount, value } => {
				writer.write_i64::<BigEndian>(*amount)?;
				writer.write_var_bytes(value)?;
			}
			ChangeOp::SpendClaim => {}
			ChangeOp::UpdateClaim { amount, id, value } => {
				writer.write_i64::<BigEndian>(*amount)?;
				writer.write_all(&id.0)?;
				writer.write_var_bytes(value)?;
			}
			ChangeOp::AddSupport { amount, id } => {
				writer.write_i64::<BigEndian>(*amount)?;
				writer.write_all(&id.0)?;
			}
			ChangeOp::SpendSupport => {}
		}
		Ok(())
	}
}

impl Readable for Change {
	fn read(reader: &mut dyn Read) -> Result<Self, ser::Error> {
		let height = reader.read_i32::<BigEndian>()?;
		let tag = reader.read_u8()?;
		let name = reader.read_var_bytes()?;
		let tx_hash = reader.read_fixed_bytes(32)?;
		let mut tx_hash_arr = [0u8; 32];
		tx_hash_arr.copy_from_slice(&tx_hash);
		let index = reader.read_u32::<BigEndian>()?;
		let outpoint = OutPoint::new(tx_hash_arr, index);

		let op = match tag {
			0 => {
				let amount = reader.read_i64::<BigEndian>()?;
				let value = reader.read_var_bytes()?;
				ChangeOp::AddClaim { amount, value }
			}
			1 => ChangeOp::SpendClaim,
			2 => {
				let amount = reader.read_i64::<BigEndian>()?;
				let id_bytes = reader.read_fixed_bytes(20)?;
				let mut id_arr = [0u8; 20];
				id_arr.copy_from_slice(&id_bytes);
				let value = reader.read_var_bytes()?;
				ChangeOp::UpdateClaim {
					amount,
					id: Id(id_arr),
					value,
				}
			}
			3 => {
				let amount = reader.read_i64::<BigEndian>()?;
				let id_bytes = reader.read_fixed_bytes(20)?;
				let mut id_arr = [0u8; 20];
				id_arr.copy_from_slice(&id_bytes);
				ChangeOp::AddSupport {
					amount,
					id: Id(id_arr),
				}
			}
			4 => ChangeOp::SpendSupport,
			other => {
				return Err(ser::Error::Corrupted(format!(
					"unknown change tag {}",
					other
				)))
			}
		};

		Ok(Change {
			height,
			name,
			outpoint,
			op,
		})
	}
}

/// A sequence of changes for a single name, as stored in the log. Written as
/// a `u32` count prefix followed by each `Change`.
struct ChangeList(Vec<Change>);

impl Writeable for ChangeList {
	fn write(&self, writer: &mut dyn Write) -> Result<(), ser::Error> {
		writer.write_u32::<BigEndian>(self.0.len() as u32)?;
		for change in &self.0 {
			change.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for ChangeList {
	fn read(reader: &mut dyn Read) -> Result<Self, ser::Error> {
		let count = reader.read_u32::<BigEndian>()?;
		let mut changes = Vec::with_capacity(count as usize);
		for _ in 0..count {
			changes.push(Change::read(reader)?);
		}
		Ok(ChangeList(changes))
	}
}

/// Per-name append-only change log, backed by the `changes` sub-database.
pub struct ChangeLog {
	store: Store,
}

impl ChangeLog {
	/// Wraps the given store (expected to be opened against `DB_CHANGES`).
	pub fn new(store: &Store) -> Self {
		ChangeLog {
			store: store.clone(),
		}
	}

	/// Loads the full change list for `name`, empty if none was ever
	/// written.
	pub fn load(&self, name: &[u8]) -> Result<Vec<Change>, Error> {
		let list: Option<ChangeList> = self.store.get_ser(name)?;
		Ok(list.map(|l| l.0).unwrap_or_default())
	}

	/// Appends `change` to `name`'s log and persists the result.
	pub fn append(&self, name: &[u8], change: Change) -> Result<(), Error> {
		let mut changes = self.load(name)?;
		changes.push(change);
		self.save(name, &changes)
	}

	/// Overwrites `name`'s persisted log with `changes`.
	pub fn save(&self, name: &[u8], changes: &[Change]) -> Result<(), Error> {
		let batch = self.store.batch()?;
		batch.put_ser(name, &ChangeList(changes.to_vec()))?;
		batch.commit()
	}

	/// Drops every change with `height > h`, persisting the truncated log.
	pub fn truncate(&self, name: &[u8], h: Height) -> Result<Vec<Change>, Error> {
		let mut changes = self.load(name)?;
		changes.retain(|c| c.height <= h);
		self.save(name, &changes)?;
		Ok(changes)
	}

	/// Returns every change ever recorded for `name`, for diagnostics.
	pub fn dump(&self, name: &[u8]) -> Result<Vec<Change>, Error> {
		self.load(name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{new_env, DB_CHANGES};
	use tempfile::tempdir;

	fn sample_change(height: Height, index: u32) -> Change {
		Change {
			height,
			name: b"example".to_vec(),
			outpoint: OutPoint::new([1u8; 32], index),
			op: ChangeOp::AddClaim {
				amount: 10,
				value: b"v".to_vec(),
			},
		}
	}

	#[test]
	fn change_round_trips_through_ser() {
		let c = Change {
			height: 42,
			name: b"foo".to_vec(),
			outpoint: OutPoint::new([9u8; 32], 3),
			op: ChangeOp::UpdateClaim {
				amount: 5,
				id: Id([2u8; 20]),
				value: b"bar".to_vec(),
			},
		};
		let bytes = ser::ser_vec(&c).unwrap();
		let back: Change = ser::deserialize(&bytes[..]).unwrap();
		assert_eq!(c, back);
	}

	#[test]
	fn append_load_truncate() {
		let dir = tempdir().unwrap();
		let env = new_env(dir.path()).unwrap();
		let store = Store::open(env, DB_CHANGES).unwrap();
		let log = ChangeLog::new(&store);

		log.append(b"example", sample_change(1, 0)).unwrap();
		log.append(b"example", sample_change(2, 1)).unwrap();
		log.append(b"example", sample_change(3, 2)).unwrap();

		let loaded = log.load(b"example").unwrap();
		assert_eq!(loaded.len(), 3);

		let truncated = log.truncate(b"example", 2).unwrap();
		assert_eq!(truncated.len(), 2);
		assert_eq!(log.load(b"example").unwrap().len(), 2);
	}
}
