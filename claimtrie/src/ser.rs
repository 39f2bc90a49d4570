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

//! Binary serialization layer used for everything this crate persists:
//! change-log records and trie-node disk forms. Deliberately small and
//! explicit rather than pulling in a schema-driven serializer — the encoding
//! is this crate's own and consensus never depends on its layout, only on
//! the Merkle root it produces (see `DESIGN.md`).

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Errors that can occur while writing or reading a `Writeable`/`Readable`.
#[derive(Debug)]
pub enum Error {
	/// Wraps an io error produced when reading or writing.
	Io(io::Error),
	/// Data wasn't in a consumable format (bad tag, length mismatch, ...).
	Corrupted(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::Io(e) => write!(f, "IO error: {}", e),
			Error::Corrupted(s) => write!(f, "corrupted data: {}", s),
		}
	}
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Io(e)
	}
}

/// Every type persisted by this crate implements `Writeable` to describe how
/// it turns into bytes.
pub trait Writeable {
	/// Writes `self` to the given writer.
	fn write(&self, writer: &mut dyn Write) -> Result<(), Error>;
}

/// Every type persisted by this crate implements `Readable` to describe how
/// it is reconstructed from bytes.
pub trait Readable: Sized {
	/// Reads an instance of `Self` from the given reader.
	fn read(reader: &mut dyn Read) -> Result<Self, Error>;
}

/// Serializes a `Writeable` into a freshly allocated `Vec<u8>`.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut vec = Vec::new();
	thing.write(&mut vec)?;
	Ok(vec)
}

/// Deserializes a `Readable` from any `Read` implementation.
pub fn deserialize<T: Readable>(mut source: impl Read) -> Result<T, Error> {
	T::read(&mut source)
}

/// Convenience extension methods used pervasively by `Writeable` impls.
pub trait WriterExt {
	/// Writes a length-prefixed (`u32` big-endian) byte slice.
	fn write_var_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
}

impl<W: Write + ?Sized> WriterExt for W {
	fn write_var_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.write_u32::<BigEndian>(bytes.len() as u32)?;
		self.write_all(bytes)?;
		Ok(())
	}
}

/// Convenience extension methods used pervasively by `Readable` impls.
pub trait ReaderExt {
	/// Reads a length-prefixed (`u32` big-endian) byte vector.
	fn read_var_bytes(&mut self) -> Result<Vec<u8>, Error>;
	/// Reads exactly `n` bytes.
	fn read_fixed_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error>;
}

impl<R: Read + ?Sized> ReaderExt for R {
	fn read_var_bytes(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_u32::<BigEndian>()? as usize;
		let mut buf = vec![0u8; len];
		self.read_exact(&mut buf)?;
		Ok(buf)
	}

	fn read_fixed_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error> {
		let mut buf = vec![0u8; n];
		self.read_exact(&mut buf)?;
		Ok(buf)
	}
}
