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

//! Command-line harness for driving a claim-trie outside of block-import
//! context: bids, supports, commits and rewinds, one subcommand at a time.

#[macro_use]
extern crate log;

use clap::{App, Arg, ArgMatches, SubCommand};

use claimtrie::change::Change;
use claimtrie::config::GlobalConfig;
use claimtrie::node::Node;
use claimtrie::types::{Id, OutPoint};
use claimtrie::ClaimTrie;

fn main() {
	env_logger::init();

	let matches = App::new("claimtrie-cli")
		.version("0.1.0")
		.about("Exercises the claim-trie core from the command line")
		.arg(
			Arg::with_name("data_dir")
				.long("data-dir")
				.takes_value(true)
				.help("Overrides the data directory from the config file"),
		)
		.subcommand(
			SubCommand::with_name("add-claim")
				.about("Records a new claim bid")
				.arg(Arg::with_name("name").required(true))
				.arg(Arg::with_name("txid").required(true))
				.arg(Arg::with_name("vout").required(true))
				.arg(Arg::with_name("amount").required(true))
				.arg(Arg::with_name("value").required(false)),
		)
		.subcommand(
			SubCommand::with_name("spend-claim")
				.about("Spends a live claim")
				.arg(Arg::with_name("name").required(true))
				.arg(Arg::with_name("txid").required(true))
				.arg(Arg::with_name("vout").required(true)),
		)
		.subcommand(
			SubCommand::with_name("update-claim")
				.about("Spends and re-adds a claim under the same id")
				.arg(Arg::with_name("name").required(true))
				.arg(Arg::with_name("txid").required(true))
				.arg(Arg::with_name("vout").required(true))
				.arg(Arg::with_name("amount").required(true))
				.arg(Arg::with_name("id").required(true))
				.arg(Arg::with_name("value").required(false)),
		)
		.subcommand(
			SubCommand::with_name("add-support")
				.about("Adds stake backing an existing claim")
				.arg(Arg::with_name("name").required(true))
				.arg(Arg::with_name("txid").required(true))
				.arg(Arg::with_name("vout").required(true))
				.arg(Arg::with_name("amount").required(true))
				.arg(Arg::with_name("id").required(true)),
		)
		.subcommand(
			SubCommand::with_name("spend-support")
				.about("Spends a live support")
				.arg(Arg::with_name("name").required(true))
				.arg(Arg::with_name("txid").required(true))
				.arg(Arg::with_name("vout").required(true)),
		)
		.subcommand(
			SubCommand::with_name("commit")
				.about("Finalizes every pending height up to and including H")
				.arg(Arg::with_name("height").required(true)),
		)
		.subcommand(
			SubCommand::with_name("reset")
				.about("Rewinds to height H")
				.arg(Arg::with_name("height").required(true)),
		)
		.subcommand(SubCommand::with_name("merkle").about("Prints the current Merkle root"))
		.subcommand(
			SubCommand::with_name("show")
				.about("Prints a name's current best claim and supports")
				.arg(Arg::with_name("name").required(true)),
		)
		.subcommand(
			SubCommand::with_name("log")
				.about("Dumps every change ever recorded for a name")
				.arg(Arg::with_name("name").required(true)),
		)
		.subcommand(SubCommand::with_name("commits").about("Prints the commit history, tip first"))
		.get_matches();

	if let Err(e) = run(&matches) {
		error!("{}", e);
		std::process::exit(1);
	}
}

fn run(matches: &ArgMatches) -> Result<(), String> {
	let config = GlobalConfig::discover().map_err(|e| e.to_string())?;
	let data_dir = match matches.value_of("data_dir") {
		Some(dir) => std::path::PathBuf::from(dir),
		None => config.data_dir(),
	};

	let mut claimtrie =
		ClaimTrie::open(&data_dir, config.consensus_params()).map_err(|e| e.to_string())?;

	match matches.subcommand() {
		("add-claim", Some(args)) => {
			let name = arg_bytes(args, "name");
			let outpoint = outpoint_arg(args)?;
			let amount = amount_arg(args)?;
			let value = args.value_of("value").unwrap_or("").as_bytes().to_vec();
			claimtrie
				.add_claim(&name, outpoint, amount, value)
				.map_err(|e| e.to_string())?;
			info!("recorded claim bid on {:?}", String::from_utf8_lossy(&name));
		}
		("spend-claim", Some(args)) => {
			let name = arg_bytes(args, "name");
			let outpoint = outpoint_arg(args)?;
			claimtrie
				.spend_claim(&name, outpoint)
				.map_err(|e| e.to_string())?;
		}
		("update-claim", Some(args)) => {
			let name = arg_bytes(args, "name");
			let outpoint = outpoint_arg(args)?;
			let amount = amount_arg(args)?;
			let id = id_arg(args)?;
			let value = args.value_of("value").unwrap_or("").as_bytes().to_vec();
			claimtrie
				.update_claim(&name, outpoint, amount, id, value)
				.map_err(|e| e.to_string())?;
		}
		("add-support", Some(args)) => {
			let name = arg_bytes(args, "name");
			let outpoint = outpoint_arg(args)?;
			let amount = amount_arg(args)?;
			let id = id_arg(args)?;
			claimtrie
				.add_support(&name, outpoint, amount, id)
				.map_err(|e| e.to_string())?;
		}
		("spend-support", Some(args)) => {
			let name = arg_bytes(args, "name");
			let outpoint = outpoint_arg(args)?;
			claimtrie
				.spend_support(&name, outpoint)
				.map_err(|e| e.to_string())?;
		}
		("commit", Some(args)) => {
			let h = height_arg(args)?;
			let root = claimtrie.commit(h).map_err(|e| e.to_string())?;
			println!("committed height {} with root {}", h, hex(&root));
		}
		("reset", Some(args)) => {
			let h = height_arg(args)?;
			claimtrie.reset(h).map_err(|e| e.to_string())?;
			println!("reset to height {}", h);
		}
		("merkle", Some(_)) => {
			println!("{}", hex(&claimtrie.merkle_hash()));
		}
		("show", Some(args)) => {
			let name = arg_bytes(args, "name");
			let node = claimtrie.node(&name).map_err(|e| e.to_string())?;
			print_node(&name, node);
		}
		("log", Some(args)) => {
			let name = arg_bytes(args, "name");
			let changes = claimtrie.dump_changes(&name).map_err(|e| e.to_string())?;
			for chg in &changes {
				print_change(chg);
			}
		}
		("commits", Some(_)) => {
			for commit in claimtrie.commit_log() {
				println!("{:>10}  {}", commit.height, hex(&commit.merkle_root));
			}
		}
		_ => {
			eprintln!("no subcommand given, use --help for usage");
			std::process::exit(1);
		}
	}
	Ok(())
}

fn arg_bytes(args: &ArgMatches, name: &str) -> Vec<u8> {
	args.value_of(name).unwrap_or("").as_bytes().to_vec()
}

fn amount_arg(args: &ArgMatches) -> Result<i64, String> {
	args.value_of("amount")
		.unwrap()
		.parse()
		.map_err(|e| format!("invalid amount: {}", e))
}

fn height_arg(args: &ArgMatches) -> Result<i32, String> {
	args.value_of("height")
		.unwrap()
		.parse()
		.map_err(|e| format!("invalid height: {}", e))
}

fn id_arg(args: &ArgMatches) -> Result<Id, String> {
	let bytes = from_hex(args.value_of("id").unwrap())?;
	if bytes.len() != 20 {
		return Err(format!("claim id must be 20 bytes, got {}", bytes.len()));
	}
	let mut arr = [0u8; 20];
	arr.copy_from_slice(&bytes);
	Ok(Id(arr))
}

fn outpoint_arg(args: &ArgMatches) -> Result<OutPoint, String> {
	let tx_hash = from_hex(args.value_of("txid").unwrap())?;
	if tx_hash.len() != 32 {
		return Err(format!("txid must be 32 bytes, got {}", tx_hash.len()));
	}
	let mut arr = [0u8; 32];
	arr.copy_from_slice(&tx_hash);
	let vout: u32 = args
		.value_of("vout")
		.unwrap()
		.parse()
		.map_err(|e| format!("invalid vout: {}", e))?;
	Ok(OutPoint::new(arr, vout))
}

fn print_node(name: &[u8], node: &Node) {
	println!("{}", String::from_utf8_lossy(name));
	match node.best_claim() {
		Some(claim) => println!(
			"  best claim: amount={} effective={} active_at={}",
			claim.amount, claim.effective_amount, claim.active_at
		),
		None => println!("  no active claim"),
	}
	for claim in node.claims() {
		println!(
			"  claim outpoint={}:{} amount={}",
			hex(&claim.outpoint.tx_hash),
			claim.outpoint.index,
			claim.amount
		);
	}
	for support in node.supports() {
		println!(
			"  support outpoint={}:{} amount={}",
			hex(&support.outpoint.tx_hash),
			support.outpoint.index,
			support.amount
		);
	}
}

fn print_change(chg: &Change) {
	println!(
		"height={} outpoint={}:{} op={:?}",
		chg.height,
		hex(&chg.outpoint.tx_hash),
		chg.outpoint.index,
		chg.op
	);
}

fn hex(bytes: &[u8]) -> String {
	let mut s = String::with_capacity(bytes.len() * 2);
	for byte in bytes {
		s.push_str(&format!("{:02x}", byte));
	}
	s
}

fn from_hex(s: &str) -> Result<Vec<u8>, String> {
	let s = s.trim();
	let s = s.strip_prefix("0x").unwrap_or(s);
	if s.len() % 2 != 0 {
		return Err("hex string must have an even number of digits".to_owned());
	}
	(0..s.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&s[i..i + 2], 16))
		.collect::<Result<Vec<u8>, _>>()
		.map_err(|e| e.to_string())
}
