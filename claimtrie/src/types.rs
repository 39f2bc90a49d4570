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

//! Primitive value types shared by every layer of the claim-trie: outpoints,
//! claim ids, amounts, heights, and the double-hash helpers the consensus
//! rules are built from.

use std::cmp::Ordering;
use std::fmt;

use ripemd::{Digest as _, Ripemd160};
use sha2::Sha256;

/// Block height. Signed 32-bit, matching the reference chain's header field;
/// negative heights never occur in practice.
pub type Height = i32;

/// A coin amount. Signed to match the wire representation; valid input is
/// always non-negative.
pub type Amount = i64;

/// 32-byte double-SHA256 digest, used both for transaction hashes and for
/// every Merkle-style hash in this crate.
pub type Hash = [u8; 32];

/// `SHA256(SHA256(x))`.
pub fn double_sha256(data: &[u8]) -> Hash {
	let first = Sha256::digest(data);
	let second = Sha256::digest(&first);
	let mut out = [0u8; 32];
	out.copy_from_slice(&second);
	out
}

/// `RIPEMD160(SHA256(x))`, i.e. Bitcoin-style `Hash160`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
	let sha = Sha256::digest(data);
	let ripemd = Ripemd160::digest(&sha);
	let mut out = [0u8; 20];
	out.copy_from_slice(&ripemd);
	out
}

/// `(transaction-hash, output-index)`, the chain-wide unique identifier of a
/// claim or support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutPoint {
	/// Hash of the transaction that created this output.
	pub tx_hash: Hash,
	/// Index of the output within that transaction.
	pub index: u32,
}

impl OutPoint {
	/// Builds a new outpoint.
	pub fn new(tx_hash: Hash, index: u32) -> Self {
		OutPoint { tx_hash, index }
	}

	/// Bytes hashed to derive an [`Id`]: `tx_hash || be32(index)`.
	fn id_preimage(&self) -> Vec<u8> {
		let mut buf = Vec::with_capacity(36);
		buf.extend_from_slice(&self.tx_hash);
		buf.extend_from_slice(&self.index.to_be_bytes());
		buf
	}

	/// Derives this outpoint's claim [`Id`].
	pub fn derive_id(&self) -> Id {
		Id(hash160(&self.id_preimage()))
	}
}

/// Outpoints order lexicographically on `tx_hash` then `index` — the order
/// used for tie-breaking in the bidding algorithm and for deterministic
/// trie-child serialization.
impl Ord for OutPoint {
	fn cmp(&self, other: &Self) -> Ordering {
		self.tx_hash
			.cmp(&other.tx_hash)
			.then_with(|| self.index.cmp(&other.index))
	}
}

impl PartialOrd for OutPoint {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl fmt::Display for OutPoint {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for byte in self.tx_hash.iter().rev() {
			write!(f, "{:02x}", byte)?;
		}
		write!(f, ":{}", self.index)
	}
}

/// 20-byte digest of an [`OutPoint`], identifying a claim across `update`
/// operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub [u8; 20]);

impl Id {
	/// Derives the id for the given outpoint.
	pub fn from_outpoint(op: &OutPoint) -> Self {
		op.derive_id()
	}
}

impl fmt::Debug for Id {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Id({})", self)
	}
}

/// Displays the id's byte-reversed hex form, matching the reference chain's
/// consensus display order.
impl fmt::Display for Id {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for byte in self.0.iter().rev() {
			write!(f, "{:02x}", byte)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn outpoint_ordering_is_lexicographic() {
		let mut a = [0u8; 32];
		a[31] = 1;
		let mut b = [0u8; 32];
		b[31] = 2;
		let op_a = OutPoint::new(a, 5);
		let op_b = OutPoint::new(b, 0);
		assert!(op_a < op_b);

		let op_a2 = OutPoint::new(a, 0);
		let op_a3 = OutPoint::new(a, 5);
		assert!(op_a2 < op_a3);
	}

	#[test]
	fn id_derivation_is_deterministic() {
		let op = OutPoint::new([7u8; 32], 3);
		assert_eq!(op.derive_id(), op.derive_id());
	}

	#[test]
	fn double_sha256_is_not_identity() {
		let d = double_sha256(b"claimtrie");
		assert_ne!(d, [0u8; 32]);
	}
}
