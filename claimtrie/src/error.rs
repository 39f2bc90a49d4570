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

//! Error types for the claim-trie core.

use std::fmt::{self, Display};
use std::io;

use failure::{Backtrace, Context, Fail};

use crate::ser;

/// Error returned by every public claim-trie operation.
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Claim-trie error variants.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// A new outpoint collides with an existing claim or support.
	#[fail(display = "Duplicate outpoint: {}", _0)]
	Duplicate(String),
	/// A spend, update, or remove targeted a missing entry.
	#[fail(display = "Not found: {}", _0)]
	NotFound(String),
	/// `commit(h)` with `h <= current`, or `reset(h)` with `h > current`.
	#[fail(display = "Invalid height: {}", _0)]
	InvalidHeight(i64),
	/// Propagated from the KV store layer.
	#[fail(display = "Store IO error: {}", _0)]
	StoreIo(String),
	/// Persisted form inconsistent with the current schema.
	#[fail(display = "Decode error: {}", _0)]
	Decode(String),
	/// Anything else.
	#[fail(display = "Other error: {}", _0)]
	Other(String),
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// Returns the error's kind.
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}

	/// Returns the underlying cause, if any.
	pub fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}

	/// Returns the backtrace captured at error-construction time.
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::Decode(format!("{}", e))),
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::StoreIo(e.to_string())),
		}
	}
}

impl From<lmdb_zero::error::Error> for Error {
	fn from(e: lmdb_zero::error::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::StoreIo(format!("{}", e))),
		}
	}
}
