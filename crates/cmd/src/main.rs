// Copyright 2025 itscheems
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

//! MES open API command-line client
//!
//! Thin front end over `mes-sdk`: loads credentials, signs and sends one or
//! more requests, and prints each response body to stdout.

mod config;
mod logging;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mes_sdk::{Client, TestDataRecord};
use serde_json::json;
use tracing::info;

use crate::{config::CmdConfig, logging::init_logging};

#[derive(Debug, Parser)]
#[command(name = "mes-cmd", about = "Signed client for the MES open API")]
struct Cli {
	/// Configuration file (toml, yaml or json); MES_* environment variables override it
	#[arg(long, short)]
	config: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Look up a device by test station and QR code
	Devices {
		#[arg(long)]
		test_station_id: i64,
		#[arg(long)]
		qrcode: String,
	},
	/// Submit test results read from a JSON array file
	SaveTestData {
		#[arg(long)]
		qrcode: String,
		#[arg(long)]
		file: PathBuf,
	},
	/// Upload a test image
	UploadImage { path: PathBuf },
	/// Send an instrument heartbeat
	Ping {
		#[arg(long)]
		instrument_id: i64,
	},
	/// Run the sample sequence against the configured server
	Demo {
		#[arg(long, default_value = "baidu.png")]
		image: PathBuf,
	},
}

const DEMO_TEST_STATION_ID: i64 = 67;
const DEMO_QRCODE: &str = "20210901103050484";
const DEMO_TEST_ITEM_ID: i64 = 10000;
const DEMO_INSTRUMENT_ID: i64 = 100;

fn demo_records() -> Vec<TestDataRecord> {
	let row = json!({"item1": 1, "item2": "2", "item3": true});
	let row = row.as_object().cloned().unwrap_or_default();
	vec![TestDataRecord::new(DEMO_TEST_ITEM_ID).with_row(row)]
}

fn read_records(path: &Path) -> Result<Vec<TestDataRecord>> {
	let content = std::fs::read_to_string(path)
		.with_context(|| format!("Failed to read {}", path.display()))?;
	serde_json::from_str(&content)
		.with_context(|| format!("Invalid test data in {}", path.display()))
}

async fn run(client: &Client, command: Command) -> Result<()> {
	match command {
		Command::Devices {
			test_station_id,
			qrcode,
		} => {
			println!("{}", client.get_devices(test_station_id, &qrcode).await?);
		}
		Command::SaveTestData { qrcode, file } => {
			let records = read_records(&file)?;
			println!("{}", client.save_test_data(&qrcode, &records).await?);
		}
		Command::UploadImage { path } => {
			println!("{}", client.upload_image(&path).await?);
		}
		Command::Ping { instrument_id } => {
			println!("{}", client.ping_instrument(instrument_id).await?);
		}
		Command::Demo { image } => {
			println!(
				"{}",
				client
					.get_devices(DEMO_TEST_STATION_ID, DEMO_QRCODE)
					.await
					.context("Device lookup failed")?
			);
			println!(
				"{}",
				client
					.save_test_data(DEMO_QRCODE, &demo_records())
					.await
					.context("Saving test data failed")?
			);
			println!(
				"{}",
				client
					.upload_image(&image)
					.await
					.context("Image upload failed")?
			);
			println!(
				"{}",
				client
					.ping_instrument(DEMO_INSTRUMENT_ID)
					.await
					.context("Instrument ping failed")?
			);
		}
	}

	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	init_logging()?;

	let cfg = CmdConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
	info!("Using open API at {}", cfg.base_url);

	let client = Client::new(cfg.client_config()).context("Failed to create client")?;

	run(&client, cli.command).await
}
