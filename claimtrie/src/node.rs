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

//! The per-name node state machine: the auction between competing claims for
//! a single name, with supports staking extra weight behind a claim and a
//! takeover/activation-delay mechanism that makes a sudden large bid not
//! instantly decisive.

use crate::error::{Error, ErrorKind};
use crate::params::ConsensusParams;
use crate::types::{Amount, Height, Id, OutPoint};

/// A bid for a name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
	pub outpoint: OutPoint,
	pub id: Id,
	pub amount: Amount,
	pub value: Vec<u8>,
	pub accepted_at: Height,
	pub active_at: Height,
	pub effective_amount: Amount,
}

impl Claim {
	fn new(outpoint: OutPoint, amount: Amount, value: Vec<u8>, accepted_at: Height) -> Self {
		Claim {
			id: outpoint.derive_id(),
			outpoint,
			amount,
			value,
			accepted_at,
			active_at: accepted_at,
			effective_amount: 0,
		}
	}

	fn expire_at(&self, params: &ConsensusParams) -> Height {
		self.accepted_at + params.expiration(self.accepted_at)
	}
}

/// Stake backing one claim's bid, identified by the claim's id rather than
/// its outpoint so a support can outlive an `update_claim` of its target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Support {
	pub outpoint: OutPoint,
	pub id: Id,
	pub amount: Amount,
	pub accepted_at: Height,
	pub active_at: Height,
}

impl Support {
	fn new(outpoint: OutPoint, amount: Amount, id: Id, accepted_at: Height) -> Self {
		Support {
			outpoint,
			id,
			amount,
			accepted_at,
			active_at: accepted_at,
		}
	}

	fn expire_at(&self, params: &ConsensusParams) -> Height {
		self.accepted_at + params.expiration(self.accepted_at)
	}
}

fn is_active_at(active_at: Height, expire_at: Height, height: Height) -> bool {
	active_at <= height && height < expire_at
}

/// The auction state for a single name at some block height.
#[derive(Clone, Debug)]
pub struct Node {
	name: Vec<u8>,
	height: Height,
	best: Option<Claim>,
	tookover_at: Height,
	claims: Vec<Claim>,
	supports: Vec<Support>,
	/// Claims spent this block, held here so a paired `update_claim` in the
	/// same block can reclaim one by id. Cleared at the end of every `bid`.
	removed: Vec<Claim>,
	params: ConsensusParams,
}

impl Node {
	/// A fresh node for `name` at height zero, with default consensus
	/// parameters.
	pub fn new(name: Vec<u8>) -> Self {
		Node::with_params(name, ConsensusParams::default())
	}

	/// A fresh node using the given consensus parameters, for tests that
	/// exercise takeover/delay logic without simulating thousands of blocks.
	pub fn with_params(name: Vec<u8>, params: ConsensusParams) -> Self {
		Node {
			name,
			height: 0,
			best: None,
			tookover_at: 0,
			claims: Vec::new(),
			supports: Vec::new(),
			removed: Vec::new(),
			params,
		}
	}

	pub fn name(&self) -> &[u8] {
		&self.name
	}

	pub fn height(&self) -> Height {
		self.height
	}

	pub fn tookover_at(&self) -> Height {
		self.tookover_at
	}

	pub fn best_claim(&self) -> Option<&Claim> {
		self.best.as_ref()
	}

	pub fn claims(&self) -> &[Claim] {
		&self.claims
	}

	pub fn supports(&self) -> &[Support] {
		&self.supports
	}

	fn has_outpoint(&self, op: &OutPoint) -> bool {
		self.claims.iter().any(|c| &c.outpoint == op)
			|| self.supports.iter().any(|s| &s.outpoint == op)
	}

	fn is_best(&self, id: Id) -> bool {
		self.best.as_ref().map(|b| b.id) == Some(id)
	}

	/// Adds a new claim, effective at `height + 1`.
	pub fn add_claim(&mut self, outpoint: OutPoint, amount: Amount, value: Vec<u8>) -> Result<(), Error> {
		if self.has_outpoint(&outpoint) {
			return Err(ErrorKind::Duplicate(outpoint.to_string()).into());
		}
		let accepted = self.height + 1;
		let mut c = Claim::new(outpoint, amount, value, accepted);
		c.active_at = accepted + self.params.activation_delay(accepted, self.tookover_at);
		if !self.best_active_at(accepted) {
			c.active_at = accepted;
			self.tookover_at = accepted;
			self.best = Some(c.clone());
		}
		self.claims.push(c);
		Ok(())
	}

	fn best_active_at(&self, height: Height) -> bool {
		match &self.best {
			None => false,
			Some(b) => is_active_at(b.active_at, b.expire_at(&self.params), height),
		}
	}

	/// Removes a live claim, buffering it in `removed` for a same-block
	/// `update_claim`.
	pub fn spend_claim(&mut self, outpoint: OutPoint) -> Result<(), Error> {
		let pos = self
			.claims
			.iter()
			.position(|c| c.outpoint == outpoint)
			.ok_or_else(|| ErrorKind::NotFound(outpoint.to_string()))?;
		let c = self.claims.remove(pos);
		self.removed.push(c);
		Ok(())
	}

	/// Re-adds a spent claim under a new outpoint, keeping its id. Must be
	/// paired with a `spend_claim` of `id`'s outpoint earlier in the same
	/// block.
	pub fn update_claim(
		&mut self,
		outpoint: OutPoint,
		amount: Amount,
		id: Id,
		value: Vec<u8>,
	) -> Result<(), Error> {
		if self.has_outpoint(&outpoint) {
			return Err(ErrorKind::Duplicate(outpoint.to_string()).into());
		}
		let pos = self
			.removed
			.iter()
			.position(|c| c.id == id)
			.ok_or_else(|| ErrorKind::NotFound(format!("removed claim {}", id)))?;
		let mut c = self.removed.remove(pos);

		let accepted = self.height + 1;
		c.outpoint = outpoint;
		c.amount = amount;
		c.value = value;
		c.accepted_at = accepted;
		c.active_at = accepted + self.params.activation_delay(accepted, self.tookover_at);
		if self.is_best(id) {
			c.active_at = self.tookover_at;
		}
		self.claims.push(c);
		Ok(())
	}

	/// Adds stake behind a claim id. Always accepted, even if no claim with
	/// that id currently exists — the claim may appear in a later block.
	pub fn add_support(&mut self, outpoint: OutPoint, amount: Amount, id: Id) -> Result<(), Error> {
		if self.has_outpoint(&outpoint) {
			return Err(ErrorKind::Duplicate(outpoint.to_string()).into());
		}
		let accepted = self.height + 1;
		let mut s = Support::new(outpoint, amount, id, accepted);
		s.active_at = accepted + self.params.activation_delay(accepted, self.tookover_at);
		if self.is_best(id) {
			s.active_at = accepted;
		}
		self.supports.push(s);
		Ok(())
	}

	/// Removes a live support.
	pub fn spend_support(&mut self, outpoint: OutPoint) -> Result<(), Error> {
		let pos = self
			.supports
			.iter()
			.position(|s| s.outpoint == outpoint)
			.ok_or_else(|| ErrorKind::NotFound(outpoint.to_string()))?;
		self.supports.remove(pos);
		Ok(())
	}

	/// Advances by exactly one block height, running the bidding algorithm.
	pub fn advance_one(&mut self) {
		self.height += 1;
		self.bid();
	}

	/// Advances the node through block heights until it reaches `target`,
	/// running `bid` at every height something changes.
	pub fn adjust_to(&mut self, target: Height) {
		if target <= self.height {
			return;
		}
		while self.height < target {
			self.height += 1;
			self.bid();
			let next = self.next_update();
			if next > target || next == self.height {
				self.height = target;
				break;
			}
			self.height = next;
			self.bid();
		}
		self.bid();
	}

	/// Smallest height greater than the current one at which some claim or
	/// support would become active or expire; `height` itself if nothing is
	/// pending.
	pub fn next_update(&self) -> Height {
		let mut next = Height::max_value();
		let height = self.height;
		let params = &self.params;

		for c in &self.claims {
			let exp = c.expire_at(params);
			if height >= exp {
				continue;
			}
			if c.active_at > height && c.active_at < next {
				next = c.active_at;
			}
			if exp > height && exp < next {
				next = exp;
			}
		}
		for s in &self.supports {
			let exp = s.expire_at(params);
			if height >= exp {
				continue;
			}
			if s.active_at > height && s.active_at < next {
				next = s.active_at;
			}
			if exp > height && exp < next {
				next = exp;
			}
		}

		if next == Height::max_value() {
			height
		} else {
			next
		}
	}

	/// The hash of this name at the current best claim and takeover height,
	/// `None` if there is no controlling claim.
	pub fn hash(&self) -> Option<crate::types::Hash> {
		let best = self.best.as_ref()?;
		let tx_hash = crate::types::double_sha256(&best.outpoint.tx_hash);
		let index_hash = crate::types::double_sha256(best.outpoint.index.to_string().as_bytes());
		let tookover_hash = crate::types::double_sha256(&(self.tookover_at as u64).to_be_bytes());

		let mut buf = Vec::with_capacity(96);
		buf.extend_from_slice(&tx_hash);
		buf.extend_from_slice(&index_hash);
		buf.extend_from_slice(&tookover_hash);
		Some(crate::types::double_sha256(&buf))
	}

	fn bid(&mut self) {
		loop {
			if self.best.is_none()
				|| self.height >= self.best.as_ref().unwrap().expire_at(&self.params)
			{
				self.best = None;
				self.tookover_at = self.height;
				self.reschedule_active_heights();
			}

			self.update_effective_amounts();

			let candidate = self.find_candidate().cloned();
			if same_claim(self.best.as_ref(), candidate.as_ref()) {
				break;
			}
			self.best = candidate;
			self.tookover_at = self.height;
			self.reschedule_active_heights();
		}
		self.removed.clear();
	}

	fn update_effective_amounts(&mut self) {
		let height = self.height;
		let params = self.params;
		let supports = &self.supports;
		for c in self.claims.iter_mut() {
			c.effective_amount = 0;
			if !is_active_at(c.active_at, c.expire_at(&params), height) {
				continue;
			}
			let mut total = c.amount;
			for s in supports {
				if s.id != c.id || !is_active_at(s.active_at, s.expire_at(&params), height) {
					continue;
				}
				total += s.amount;
			}
			c.effective_amount = total;
		}
	}

	fn find_candidate(&self) -> Option<&Claim> {
		let height = self.height;
		let params = &self.params;
		let mut best: Option<&Claim> = None;
		for c in &self.claims {
			if !is_active_at(c.active_at, c.expire_at(params), height) {
				continue;
			}
			best = Some(match best {
				None => c,
				Some(cur) => {
					if c.effective_amount > cur.effective_amount {
						c
					} else if c.effective_amount < cur.effective_amount {
						cur
					} else if c.accepted_at < cur.accepted_at {
						c
					} else if c.accepted_at > cur.accepted_at {
						cur
					} else if cur.outpoint < c.outpoint {
						c
					} else {
						cur
					}
				}
			});
		}
		best
	}

	/// Reschedules every entry's `active_at` to `accepted_at + delay(height,
	/// tookover_at)`, called right after a takeover sets `tookover_at ==
	/// height` (so the delay is always zero: a takeover activates every
	/// pending entry immediately). Entries already active are left alone —
	/// they are never clawed back.
	fn reschedule_active_heights(&mut self) {
		let delay = self.params.activation_delay(self.height, self.tookover_at);
		let height = self.height;
		for c in self.claims.iter_mut() {
			if c.active_at > height {
				c.active_at = c.accepted_at + delay;
			}
		}
		for s in self.supports.iter_mut() {
			if s.active_at > height {
				s.active_at = s.accepted_at + delay;
			}
		}
	}
}

fn same_claim(a: Option<&Claim>, b: Option<&Claim>) -> bool {
	match (a, b) {
		(None, None) => true,
		(Some(x), Some(y)) => x.outpoint == y.outpoint,
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn op(byte: u8, index: u32) -> OutPoint {
		OutPoint::new([byte; 32], index)
	}

	fn test_params() -> ConsensusParams {
		ConsensusParams {
			max_active_delay: 10,
			active_delay_factor: 1,
			original_expiration: 1_000,
			extended_expiration: 1_000,
			extended_expiration_fork_height: 1_000_000,
		}
	}

	#[test]
	fn first_claim_becomes_best_immediately() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		n.advance_one();
		let best = n.best_claim().unwrap();
		assert_eq!(best.outpoint, op(1, 0));
		assert_eq!(n.tookover_at(), 1);
	}

	#[test]
	fn higher_bid_takes_over_after_delay() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		n.advance_one();
		assert_eq!(n.best_claim().unwrap().outpoint, op(1, 0));

		n.add_claim(op(2, 0), 100, vec![]).unwrap();
		n.advance_one();
		// still delayed: activation_delay(accepted=2, tookover=1) = 1
		assert_eq!(n.best_claim().unwrap().outpoint, op(1, 0));

		n.adjust_to(10);
		assert_eq!(n.best_claim().unwrap().outpoint, op(2, 0));
	}

	#[test]
	fn duplicate_outpoint_rejected() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		let err = n.add_claim(op(1, 0), 20, vec![]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Duplicate(op(1, 0).to_string()));
	}

	#[test]
	fn support_can_tip_the_balance() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		n.advance_one();
		let id = n.best_claim().unwrap().id;

		n.add_claim(op(2, 0), 15, vec![]).unwrap();
		n.add_support(op(3, 0), 10, id).unwrap();
		n.adjust_to(20);
		// claim 1 (amount 10) + support (amount 10) = 20 > claim 2's 15
		assert_eq!(n.best_claim().unwrap().outpoint, op(1, 0));
	}

	#[test]
	fn spend_then_update_preserves_id_and_incumbency() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		n.advance_one();
		let id = n.best_claim().unwrap().id;
		let tookover = n.tookover_at();

		n.spend_claim(op(1, 0)).unwrap();
		n.update_claim(op(1, 1), 10, id, b"v2".to_vec()).unwrap();
		n.advance_one();

		let best = n.best_claim().unwrap();
		assert_eq!(best.outpoint, op(1, 1));
		assert_eq!(best.id, id);
		// incumbent update is immediate, no activation delay
		assert_eq!(best.active_at, tookover);
	}

	#[test]
	fn update_without_prior_spend_not_found() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		n.advance_one();
		let err = n
			.update_claim(op(1, 1), 10, Id([9u8; 20]), vec![])
			.unwrap_err();
		assert!(matches!(err.kind(), ErrorKind::NotFound(_)));
	}

	#[test]
	fn claim_expires_and_best_falls_back() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		n.advance_one();
		assert!(n.best_claim().is_some());

		n.adjust_to(1_100);
		assert!(n.best_claim().is_none());
	}

	#[test]
	fn next_update_reports_pending_activation() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		n.advance_one();
		n.add_claim(op(2, 0), 100, vec![]).unwrap();
		// pending claim 2 activates at accepted(2) + delay(2,1)=1 -> height 3
		assert!(n.next_update() > n.height());
	}

	#[test]
	fn hash_is_none_without_best() {
		let n = Node::with_params(b"foo".to_vec(), test_params());
		assert!(n.hash().is_none());
	}

	#[test]
	fn hash_changes_with_takeover() {
		let mut n = Node::with_params(b"foo".to_vec(), test_params());
		n.add_claim(op(1, 0), 10, vec![]).unwrap();
		n.advance_one();
		let h1 = n.hash();

		n.add_claim(op(2, 0), 1000, vec![]).unwrap();
		n.adjust_to(20);
		let h2 = n.hash();
		assert_ne!(h1, h2);
	}
}
