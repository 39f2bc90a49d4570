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

//! Consensus-relevant constants for the claim-trie. As long as they're simple
//! enough, consensus parameters and the short functions derived from them
//! should be kept here rather than scattered through the state machine.

use crate::types::Height;

/// Maximum activation delay, in blocks.
pub const MAX_ACTIVE_DELAY: Height = 4032;

/// Divides the distance since the last takeover to compute the activation
/// delay of a claim or support.
pub const ACTIVE_DELAY_FACTOR: Height = 32;

/// Expiration window (in blocks) used before `EXTENDED_EXPIRATION_FORK_HEIGHT`.
pub const ORIGINAL_EXPIRATION: Height = 262_974;

/// Expiration window (in blocks) used from `EXTENDED_EXPIRATION_FORK_HEIGHT`
/// onward.
pub const EXTENDED_EXPIRATION: Height = 2_102_400;

/// Height at which the expiration window switches from `ORIGINAL_EXPIRATION`
/// to `EXTENDED_EXPIRATION`.
pub const EXTENDED_EXPIRATION_FORK_HEIGHT: Height = 278_160;

/// Runtime-overridable consensus parameters. Tests use smaller values (e.g.
/// `ACTIVE_DELAY_FACTOR = 1`) to exercise takeover and delay logic without
/// simulating thousands of blocks; production code should stick to
/// `ConsensusParams::default()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsensusParams {
	/// See [`MAX_ACTIVE_DELAY`].
	pub max_active_delay: Height,
	/// See [`ACTIVE_DELAY_FACTOR`].
	pub active_delay_factor: Height,
	/// See [`ORIGINAL_EXPIRATION`].
	pub original_expiration: Height,
	/// See [`EXTENDED_EXPIRATION`].
	pub extended_expiration: Height,
	/// See [`EXTENDED_EXPIRATION_FORK_HEIGHT`].
	pub extended_expiration_fork_height: Height,
}

impl Default for ConsensusParams {
	fn default() -> Self {
		ConsensusParams {
			max_active_delay: MAX_ACTIVE_DELAY,
			active_delay_factor: ACTIVE_DELAY_FACTOR,
			original_expiration: ORIGINAL_EXPIRATION,
			extended_expiration: EXTENDED_EXPIRATION,
			extended_expiration_fork_height: EXTENDED_EXPIRATION_FORK_HEIGHT,
		}
	}
}

impl ConsensusParams {
	/// Activation delay for an entry accepted at `accepted`, given the node's
	/// current `tookover_at`. Zero once there is no controlling claim to
	/// compete with (callers pass `tookover_at == accepted` in that case, so
	/// the numerator is zero).
	pub fn activation_delay(&self, accepted: Height, tookover_at: Height) -> Height {
		let since_takeover = (accepted - tookover_at).max(0);
		(since_takeover / self.active_delay_factor).min(self.max_active_delay)
	}

	/// Expiration window applicable to an entry accepted at `accepted`.
	pub fn expiration(&self, accepted: Height) -> Height {
		if accepted + self.original_expiration > self.extended_expiration_fork_height {
			self.extended_expiration
		} else {
			self.original_expiration
		}
	}
}
