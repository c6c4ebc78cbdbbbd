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

use crate::multipart::MultipartForm;
use crate::signing::{Credentials, Method, RequestBody, RequestDescriptor, Signer, SigningError};
use crate::types::TestDataRecord;
use reqwest::{Client as ReqwestClient, StatusCode, Url, header::CONTENT_TYPE};
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error types for client operations
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("[Err] status code: {status}")]
	Status { status: u16, body: String },
	#[error("Signing error: {0}")]
	Signing(#[from] SigningError),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Invalid URL: {0}")]
	InvalidUrl(String),
	#[error("Failed to read response body: {0}")]
	ResponseBody(String),
}

/// Client configuration
///
/// Passed in explicitly; the SDK never reads process-wide settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Base URL of the open API, e.g. `http://127.0.0.1:8080/api/open`
	pub base_url: String,
	pub credentials: Credentials,
	pub timeout: Duration,
}

impl ClientConfig {
	pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
		Self {
			base_url: base_url.into(),
			credentials,
			timeout: DEFAULT_TIMEOUT,
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}
}

impl From<Method> for reqwest::Method {
	fn from(method: Method) -> Self {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Delete => reqwest::Method::DELETE,
		}
	}
}

/// Client for the open API
///
/// Every request is signed right before it is sent. Response bodies are
/// returned as text without interpretation.
pub struct Client {
	base_url: Url,
	signer: Signer,
	client: ReqwestClient,
}

impl Client {
	/// Create a new client from the given configuration
	pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
		let base_url = Url::parse(config.base_url.trim_end_matches('/'))
			.map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
		if base_url.cannot_be_a_base() {
			return Err(ClientError::InvalidUrl(format!(
				"{}: not a hierarchical URL",
				config.base_url
			)));
		}

		let client = ReqwestClient::builder()
			.timeout(config.timeout)
			.build()
			.map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			base_url,
			signer: Signer::new(config.credentials),
			client,
		})
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	pub fn signer(&self) -> &Signer {
		&self.signer
	}

	/// Start a request for an endpoint relative to the base URL
	///
	/// `endpoint` is a path such as `/devices/1`. Characters that are not
	/// allowed in a URL path are percent-encoded, so the signed path is the
	/// one sent on the wire.
	pub fn request(&self, method: Method, endpoint: &str) -> RequestDescriptor {
		let mut url = self.base_url.clone();
		url.set_path(&format!(
			"{}{}",
			self.base_url.path().trim_end_matches('/'),
			endpoint
		));
		RequestDescriptor::new(method, url.path())
	}

	/// Start a request from path segments appended to the base URL
	///
	/// Each segment is percent-encoded on its own, so values such as QR codes
	/// may contain `/`, `%` or spaces.
	pub fn request_segments(&self, method: Method, segments: &[&str]) -> RequestDescriptor {
		let mut url = self.base_url.clone();
		// Hierarchical base URLs are checked in `new`
		if let Ok(mut path) = url.path_segments_mut() {
			path.pop_if_empty().extend(segments);
		}
		RequestDescriptor::new(method, url.path())
	}

	/// Sign and send a request, returning the response body on HTTP 200
	///
	/// Any other status is an error; the body is still read first so the
	/// connection can be reused, and is kept in the error.
	pub async fn execute(&self, mut request: RequestDescriptor) -> Result<String, ClientError> {
		let mut url = self.base_url.clone();
		url.set_path(request.path());
		if url.path() != request.path() {
			return Err(ClientError::InvalidUrl(format!(
				"path is not percent-encoded: {}",
				request.path()
			)));
		}

		buffer_reader_body(&mut request).await?;
		let artifact = self.signer.sign(&mut request)?;

		url.set_query(None);
		if !request.query().is_empty() {
			url.query_pairs_mut().extend_pairs(
				request
					.query()
					.iter()
					.map(|(k, v)| (k.as_str(), v.as_str())),
			);
		}

		let mut builder = self.client.request(request.method().into(), url);
		if !request.content_type().is_empty() {
			builder = builder.header(CONTENT_TYPE, request.content_type());
		}
		for (name, value) in artifact.headers() {
			builder = builder.header(name, value);
		}
		if let Some(mut body) = request.take_body() {
			let bytes = body.capture().map_err(SigningError::BodyRead)?;
			builder = builder.body(bytes);
		}

		let response = builder
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))?;

		let status = response.status();
		let text = response
			.text()
			.await
			.map_err(|e| ClientError::ResponseBody(e.to_string()))?;

		if status != StatusCode::OK {
			warn!(
				"{} {} failed with status {}",
				request.method(),
				request.path(),
				status
			);
			return Err(ClientError::Status {
				status: status.as_u16(),
				body: text,
			});
		}

		debug!(
			"{} {} succeeded ({} bytes)",
			request.method(),
			request.path(),
			text.len()
		);

		Ok(text)
	}

	/// Look up a device by test station and QR code
	pub async fn get_devices(
		&self,
		test_station_id: i64,
		qrcode: &str,
	) -> Result<String, ClientError> {
		let request = self
			.request(Method::Get, "/devices")
			.with_query("test_station_id", test_station_id.to_string())
			.with_query("qrcode", qrcode);

		self.execute(request).await
	}

	/// Save test results for the device identified by `qrcode`
	pub async fn save_test_data(
		&self,
		qrcode: &str,
		records: &[TestDataRecord],
	) -> Result<String, ClientError> {
		let body = serde_json::to_vec(records)
			.map_err(|e| ClientError::Serialization(format!("Failed to encode test data: {}", e)))?;

		let request = self
			.request_segments(Method::Post, &["devices", qrcode, "test_data"])
			.with_content_type("application/json")
			.with_body(body);

		self.execute(request).await
	}

	/// Upload an image file as the `file` field of a multipart form
	pub async fn upload_image(&self, image_path: impl AsRef<Path>) -> Result<String, ClientError> {
		let image_path = image_path.as_ref();
		let filename = image_path
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.ok_or_else(|| {
				io::Error::new(
					io::ErrorKind::InvalidInput,
					format!("{} has no file name", image_path.display()),
				)
			})?;
		let data = tokio::fs::read(image_path).await?;

		let (content_type, body) = MultipartForm::new().file("file", &filename, &data).finish();

		let request = self
			.request(Method::Post, "/uploads")
			.with_content_type(content_type)
			.with_body(body);

		self.execute(request).await
	}

	/// Send an instrument heartbeat
	pub async fn ping_instrument(&self, instrument_id: i64) -> Result<String, ClientError> {
		let instrument_id = instrument_id.to_string();
		let request = self
			.request_segments(Method::Post, &["instruments", &instrument_id, "ping"])
			.with_body(Vec::new());

		self.execute(request).await
	}
}

/// Drain a reader body on the blocking pool so file or socket readers do not stall the runtime
async fn buffer_reader_body(request: &mut RequestDescriptor) -> Result<(), ClientError> {
	if !matches!(request.body(), Some(RequestBody::Reader(_))) {
		return Ok(());
	}
	let Some(mut body) = request.take_body() else {
		return Ok(());
	};

	let body = tokio::task::spawn_blocking(move || -> io::Result<RequestBody> {
		body.capture()?;
		Ok(body)
	})
	.await
	.map_err(|e| ClientError::Io(io::Error::other(e)))?
	.map_err(SigningError::BodyRead)?;

	request.set_body(body);
	Ok(())
}

/// Synchronous client wrapper
///
/// This wraps the async client and runs it in a tokio runtime.
/// For new code, prefer using the async Client directly.
pub struct SyncClient {
	client: Client,
	runtime: tokio::runtime::Runtime,
}

impl SyncClient {
	/// Create a new synchronous client
	pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
		let runtime = tokio::runtime::Runtime::new()?;
		Ok(Self {
			client: Client::new(config)?,
			runtime,
		})
	}

	pub fn execute(&self, request: RequestDescriptor) -> Result<String, ClientError> {
		self.runtime.block_on(self.client.execute(request))
	}

	pub fn get_devices(&self, test_station_id: i64, qrcode: &str) -> Result<String, ClientError> {
		self.runtime
			.block_on(self.client.get_devices(test_station_id, qrcode))
	}

	pub fn save_test_data(
		&self,
		qrcode: &str,
		records: &[TestDataRecord],
	) -> Result<String, ClientError> {
		self.runtime
			.block_on(self.client.save_test_data(qrcode, records))
	}

	pub fn upload_image(&self, image_path: impl AsRef<Path>) -> Result<String, ClientError> {
		self.runtime.block_on(self.client.upload_image(image_path))
	}

	pub fn ping_instrument(&self, instrument_id: i64) -> Result<String, ClientError> {
		self.runtime
			.block_on(self.client.ping_instrument(instrument_id))
	}
}
