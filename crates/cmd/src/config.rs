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

use std::time::Duration;

use mes_sdk::{ClientConfig, Credentials};
use serde::{Deserialize, Serialize};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "mes-cmd";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

// Client configuration constants
/// Default open API base URL (can be overridden by MES_BASE_URL)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/api/open";

/// Default request timeout in seconds (can be overridden by MES_TIMEOUT_SECS)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MES";

/// Command-line client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdConfig {
	/// Open API base URL
	pub base_url: String,
	/// Issued app key
	pub app_key: String,
	/// Issued app secret
	pub app_secret: String,
	/// Request timeout in seconds
	pub timeout_secs: u64,
}

impl CmdConfig {
	/// Load configuration from defaults, an optional file, then `MES_*` environment variables
	///
	/// `app_key` and `app_secret` have no defaults and must come from one of the sources.
	pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
		dotenv::dotenv().ok();

		let mut builder = config::Config::builder()
			.set_default("base_url", DEFAULT_BASE_URL)?
			.set_default("timeout_secs", DEFAULT_TIMEOUT_SECS as i64)?;

		if let Some(path) = path {
			builder = builder.add_source(config::File::with_name(path));
		}

		builder
			.add_source(config::Environment::with_prefix(ENV_PREFIX))
			.build()?
			.try_deserialize()
	}

	/// Convert into the SDK's client configuration
	pub fn client_config(&self) -> ClientConfig {
		ClientConfig::new(
			self.base_url.clone(),
			Credentials::new(self.app_key.clone(), self.app_secret.clone()),
		)
		.with_timeout(Duration::from_secs(self.timeout_secs))
	}
}
