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

//! TOML-backed configuration, loaded once at startup and merged with
//! whatever the CLI overrides on the command line.

use std::fs;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::params::ConsensusParams;
use crate::types::Height;

const CONFIG_FILE_NAME: &str = "claimtrie.toml";
const DEFAULT_DATA_DIR: &str = ".claimtrie";

/// Errors that can occur while locating, reading or parsing a config file.
#[derive(Debug)]
pub enum ConfigError {
	/// The file existed but wasn't valid TOML, or didn't match the schema.
	ParseError(String, String),
	/// The file couldn't be read.
	FileIoError(String, String),
}

impl std::fmt::Display for ConfigError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			ConfigError::ParseError(file, msg) => {
				write!(f, "error parsing config file at {}: {}", file, msg)
			}
			ConfigError::FileIoError(file, msg) => write!(f, "{}: {}", file, msg),
		}
	}
}

impl std::error::Error for ConfigError {}

/// Deserializable knobs, kept separate from `GlobalConfig` so the latter can
/// carry runtime-derived fields (such as where the file was actually found)
/// without them leaking into the TOML schema.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigMembers {
	/// Directory the LMDB environment is rooted at. Defaults to
	/// `~/.claimtrie` when absent.
	pub data_dir: Option<String>,
	/// Consensus parameter overrides, meant for test nets; any field left
	/// out falls back to the hard-coded mainnet default.
	#[serde(default)]
	pub consensus: ConsensusOverrides,
}

/// Subset of [`ConsensusParams`] a config file may override. All fields are
/// optional; omitted ones keep the mainnet default.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ConsensusOverrides {
	pub max_active_delay: Option<Height>,
	pub active_delay_factor: Option<Height>,
	pub original_expiration: Option<Height>,
	pub extended_expiration: Option<Height>,
	pub extended_expiration_fork_height: Option<Height>,
}

impl ConsensusOverrides {
	/// Applies the overrides on top of the mainnet defaults.
	pub fn resolve(&self) -> ConsensusParams {
		let defaults = ConsensusParams::default();
		ConsensusParams {
			max_active_delay: self.max_active_delay.unwrap_or(defaults.max_active_delay),
			active_delay_factor: self
				.active_delay_factor
				.unwrap_or(defaults.active_delay_factor),
			original_expiration: self
				.original_expiration
				.unwrap_or(defaults.original_expiration),
			extended_expiration: self
				.extended_expiration
				.unwrap_or(defaults.extended_expiration),
			extended_expiration_fork_height: self
				.extended_expiration_fork_height
				.unwrap_or(defaults.extended_expiration_fork_height),
		}
	}
}

/// Top-level configuration, either loaded from a TOML file or defaulted.
#[derive(Clone, Debug)]
pub struct GlobalConfig {
	/// Path the config was actually read from, if any.
	pub config_file_path: Option<PathBuf>,
	/// `false` if no file was found and every value is a hard-coded default.
	pub using_config_file: bool,
	/// The deserialized (or defaulted) settings.
	pub members: ConfigMembers,
}

impl Default for GlobalConfig {
	fn default() -> Self {
		GlobalConfig {
			config_file_path: None,
			using_config_file: false,
			members: ConfigMembers::default(),
		}
	}
}

impl GlobalConfig {
	/// Reads and parses the config file at `path`.
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let text = fs::read_to_string(path)
			.map_err(|e| ConfigError::FileIoError(path.display().to_string(), e.to_string()))?;
		let members: ConfigMembers = toml::from_str(&text)
			.map_err(|e| ConfigError::ParseError(path.display().to_string(), e.to_string()))?;
		Ok(GlobalConfig {
			config_file_path: Some(path.to_path_buf()),
			using_config_file: true,
			members,
		})
	}

	/// Looks for `claimtrie.toml` in the current directory, then in the
	/// user's home directory; falls back to all-default settings if neither
	/// exists.
	pub fn discover() -> Result<Self, ConfigError> {
		let candidates = [
			PathBuf::from(CONFIG_FILE_NAME),
			dirs::home_dir()
				.unwrap_or_default()
				.join(DEFAULT_DATA_DIR)
				.join(CONFIG_FILE_NAME),
		];
		for path in &candidates {
			if path.exists() {
				return Self::from_file(path);
			}
		}
		Ok(GlobalConfig::default())
	}

	/// The directory the LMDB environment should be rooted at.
	pub fn data_dir(&self) -> PathBuf {
		match &self.members.data_dir {
			Some(dir) => PathBuf::from(dir),
			None => dirs::home_dir()
				.unwrap_or_default()
				.join(DEFAULT_DATA_DIR),
		}
	}

	/// Consensus parameters after applying any overrides in the config file.
	pub fn consensus_params(&self) -> ConsensusParams {
		self.members.consensus.resolve()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_without_a_file() {
		let cfg = GlobalConfig::default();
		assert!(!cfg.using_config_file);
		assert_eq!(cfg.consensus_params(), ConsensusParams::default());
	}

	#[test]
	fn parses_partial_overrides() {
		let toml_str = r#"
			data_dir = "/tmp/claimtrie-data"

			[consensus]
			max_active_delay = 10
		"#;
		let members: ConfigMembers = toml::from_str(toml_str).unwrap();
		let cfg = GlobalConfig {
			config_file_path: None,
			using_config_file: true,
			members,
		};
		assert_eq!(cfg.data_dir(), PathBuf::from("/tmp/claimtrie-data"));
		let params = cfg.consensus_params();
		assert_eq!(params.max_active_delay, 10);
		assert_eq!(
			params.active_delay_factor,
			ConsensusParams::default().active_delay_factor
		);
	}
}
