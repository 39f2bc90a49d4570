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

//! Consensus-critical claim-trie: a block-height-indexed state machine that
//! resolves competing claims over names. Each name runs its own bid/support
//! auction with takeover delays ([`node`]); the set of names is exposed as a
//! 256-ary byte-prefix Merkle trie with lazily resolved subtrees
//! ([`trie`]); and every mutation is journaled to a per-name change log that
//! lets any past height be rebuilt exactly ([`change`], [`node_manager`]).
//! [`claimtrie::ClaimTrie`] ties the three together behind one entry point.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

pub mod change;
pub mod claimtrie;
pub mod commit;
pub mod config;
pub mod error;
pub mod node;
pub mod node_manager;
pub mod params;
pub mod ser;
pub mod store;
pub mod trie;
pub mod types;

pub use crate::claimtrie::ClaimTrie;
pub use crate::error::{Error, ErrorKind};
pub use crate::params::ConsensusParams;
