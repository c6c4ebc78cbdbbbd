// Copyright 2025 chenjjiaa
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

//! Request signing
//!
//! Every request sent to the open API carries three headers derived from a
//! canonical string-to-sign:
//!
//! ```text
//! METHOD \n PATH \n CANONICAL_QUERY \n CONTENT_TYPE \n CONTENT_MD5 \n TIMESTAMP \n APP_SECRET
//! ```
//!
//! - `CANONICAL_QUERY`: `key=value` pairs sorted by key, joined with `&`
//! - `CONTENT_MD5`: Base64 MD5 of the body, only for POST and PUT
//! - `TIMESTAMP`: milliseconds since the Unix epoch
//!
//! The signature is the Base64 HMAC-SHA1 of that string, keyed by the app key.
//! Empty fields stay in place, so there are always six separators.

use std::{fmt, io::Read};

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;
use tracing::debug;

/// Header carrying the app key
pub const HEADER_APP_KEY: &str = "X-AppKey";
/// Header carrying the signing timestamp (decimal milliseconds)
pub const HEADER_TIMESTAMP: &str = "X-Timestamp";
/// Header carrying the Base64 signature
pub const HEADER_SIGNATURE: &str = "X-Signature";

type HmacSha1 = Hmac<Sha1>;

/// Error types for signing operations
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
	#[error("Failed to read request body: {0}")]
	BodyRead(#[from] std::io::Error),
	/// HMAC accepts keys of any length, so this is not produced with the current hash
	#[error("Invalid signing key: {0}")]
	InvalidKey(String),
}

/// Static app key / app secret pair issued by the server
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	app_key: String,
	app_secret: String,
}

impl Credentials {
	pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
		Self {
			app_key: app_key.into(),
			app_secret: app_secret.into(),
		}
	}

	pub fn app_key(&self) -> &str {
		&self.app_key
	}

	pub fn app_secret(&self) -> &str {
		&self.app_secret
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("app_key", &self.app_key)
			.field("app_secret", &"<redacted>")
			.finish()
	}
}

/// HTTP methods accepted by the open API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
	Get,
	Post,
	Put,
	Delete,
}

impl Method {
	pub fn as_str(&self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Delete => "DELETE",
		}
	}

	/// Whether the body takes part in the content digest.
	///
	/// GET and DELETE always sign an empty digest, even with a body attached.
	pub fn carries_body(&self) -> bool {
		matches!(self, Method::Post | Method::Put)
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Request body, either already buffered or still behind a one-shot reader
pub enum RequestBody {
	Bytes(Bytes),
	Reader(Box<dyn Read + Send>),
}

impl RequestBody {
	pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
		RequestBody::Reader(Box::new(reader))
	}

	/// Buffer the body so it can be digested and then sent.
	///
	/// A reader body is drained and replaced by the bytes it produced, so the
	/// transport sees exactly what was digested. Buffered bodies are returned
	/// as-is (a cheap reference-counted clone).
	pub fn capture(&mut self) -> std::io::Result<Bytes> {
		let bytes = match self {
			RequestBody::Bytes(bytes) => return Ok(bytes.clone()),
			RequestBody::Reader(reader) => {
				let mut buf = Vec::new();
				reader.read_to_end(&mut buf)?;
				Bytes::from(buf)
			}
		};
		*self = RequestBody::Bytes(bytes.clone());
		Ok(bytes)
	}

	/// Buffered bytes, if the body has been captured
	pub fn as_bytes(&self) -> Option<&Bytes> {
		match self {
			RequestBody::Bytes(bytes) => Some(bytes),
			RequestBody::Reader(_) => None,
		}
	}
}

impl fmt::Debug for RequestBody {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
			RequestBody::Reader(_) => f.write_str("Reader"),
		}
	}
}

impl From<Bytes> for RequestBody {
	fn from(bytes: Bytes) -> Self {
		RequestBody::Bytes(bytes)
	}
}

impl From<Vec<u8>> for RequestBody {
	fn from(bytes: Vec<u8>) -> Self {
		RequestBody::Bytes(Bytes::from(bytes))
	}
}

impl From<&'static [u8]> for RequestBody {
	fn from(bytes: &'static [u8]) -> Self {
		RequestBody::Bytes(Bytes::from_static(bytes))
	}
}

impl From<String> for RequestBody {
	fn from(body: String) -> Self {
		RequestBody::Bytes(Bytes::from(body))
	}
}

/// Outgoing request, as far as signing is concerned
#[derive(Debug)]
pub struct RequestDescriptor {
	method: Method,
	path: String,
	query: Vec<(String, String)>,
	content_type: String,
	body: Option<RequestBody>,
}

impl RequestDescriptor {
	/// `path` is the URL path only; query parameters go through [`with_query`](Self::with_query).
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			content_type: String::new(),
			body: None,
		}
	}

	/// Add a query parameter. An existing key keeps its position and takes the new value.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		let key = key.into();
		let value = value.into();
		match self.query.iter_mut().find(|(k, _)| *k == key) {
			Some(entry) => entry.1 = value,
			None => self.query.push((key, value)),
		}
		self
	}

	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = content_type.into();
		self
	}

	pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
		self.body = Some(body.into());
		self
	}

	pub fn method(&self) -> Method {
		self.method
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	/// Query parameters in insertion order
	pub fn query(&self) -> &[(String, String)] {
		&self.query
	}

	pub fn content_type(&self) -> &str {
		&self.content_type
	}

	pub fn body(&self) -> Option<&RequestBody> {
		self.body.as_ref()
	}

	pub fn body_mut(&mut self) -> Option<&mut RequestBody> {
		self.body.as_mut()
	}

	pub fn set_body(&mut self, body: impl Into<RequestBody>) {
		self.body = Some(body.into());
	}

	pub fn take_body(&mut self) -> Option<RequestBody> {
		self.body.take()
	}
}

/// Request-derived fields of the string-to-sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest<'a> {
	pub method: Method,
	pub path: &'a str,
	pub query: String,
	pub content_type: &'a str,
	pub content_md5: &'a str,
	pub timestamp: i64,
}

impl CanonicalRequest<'_> {
	pub fn string_to_sign(&self, app_secret: &str) -> String {
		[
			self.method.as_str(),
			self.path,
			&self.query,
			self.content_type,
			self.content_md5,
			&self.timestamp.to_string(),
			app_secret,
		]
		.join("\n")
	}
}

/// Result of signing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureArtifact {
	/// Milliseconds since the Unix epoch
	pub timestamp: i64,
	/// Base64 MD5 of the body, empty when no digest applies
	pub content_digest: String,
	/// Base64 HMAC-SHA1 of the string-to-sign
	pub signature: String,
	pub app_key: String,
}

impl SignatureArtifact {
	/// Headers to attach before transmission
	pub fn headers(&self) -> [(&'static str, String); 3] {
		[
			(HEADER_APP_KEY, self.app_key.clone()),
			(HEADER_TIMESTAMP, self.timestamp.to_string()),
			(HEADER_SIGNATURE, self.signature.clone()),
		]
	}
}

/// Signs request descriptors with a fixed set of credentials
///
/// Holds no mutable state, so one signer can be shared across concurrent requests.
#[derive(Debug, Clone)]
pub struct Signer {
	credentials: Credentials,
}

impl Signer {
	pub fn new(credentials: Credentials) -> Self {
		Self { credentials }
	}

	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	/// Sign a request using the current wall-clock time
	pub fn sign(&self, request: &mut RequestDescriptor) -> Result<SignatureArtifact, SigningError> {
		self.sign_at(request, chrono::Utc::now().timestamp_millis())
	}

	/// Sign a request at a fixed timestamp
	///
	/// For POST and PUT the body is captured first, leaving it buffered in the
	/// descriptor for the transport. A body read failure aborts signing.
	pub fn sign_at(
		&self,
		request: &mut RequestDescriptor,
		timestamp: i64,
	) -> Result<SignatureArtifact, SigningError> {
		let content_digest = match request.body.as_mut() {
			Some(body) if request.method.carries_body() => content_md5(&body.capture()?),
			_ => String::new(),
		};

		let canonical = CanonicalRequest {
			method: request.method,
			path: &request.path,
			query: canonical_query(&request.query),
			content_type: &request.content_type,
			content_md5: &content_digest,
			timestamp,
		};
		let string_to_sign = canonical.string_to_sign(self.credentials.app_secret());
		let signature = hmac_sha1(
			self.credentials.app_key().as_bytes(),
			string_to_sign.as_bytes(),
		)?;

		debug!(
			"Signed {} {} (query: {:?}, timestamp: {})",
			canonical.method, canonical.path, canonical.query, timestamp
		);

		Ok(SignatureArtifact {
			timestamp,
			content_digest,
			signature,
			app_key: self.credentials.app_key().to_string(),
		})
	}
}

/// Sort query parameters by key and join them as `key=value&...`
///
/// Values are used verbatim. No parameters gives an empty string.
pub fn canonical_query(params: &[(String, String)]) -> String {
	let mut sorted: Vec<&(String, String)> = params.iter().collect();
	sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
	sorted
		.iter()
		.map(|(key, value)| format!("{}={}", key, value))
		.collect::<Vec<_>>()
		.join("&")
}

/// Base64 MD5 digest of a body
pub fn content_md5(data: &[u8]) -> String {
	STANDARD.encode(Md5::digest(data))
}

/// Base64 HMAC-SHA1 of `message` under `key`
pub fn hmac_sha1(key: &[u8], message: &[u8]) -> Result<String, SigningError> {
	let mut mac =
		HmacSha1::new_from_slice(key).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
	mac.update(message);
	Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io;

	const TIMESTAMP: i64 = 1_630_462_250_000;

	fn signer() -> Signer {
		Signer::new(Credentials::new("appKey", "appSecret"))
	}

	struct FailingReader;

	impl Read for FailingReader {
		fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
			Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"))
		}
	}

	#[test]
	fn test_canonical_query_sorts_keys() {
		let params = vec![
			("test_station_id".to_string(), "67".to_string()),
			("qrcode".to_string(), "20210901103050484".to_string()),
			("b".to_string(), "2".to_string()),
			("B".to_string(), "1".to_string()),
		];
		assert_eq!(
			canonical_query(&params),
			"B=1&b=2&qrcode=20210901103050484&test_station_id=67"
		);
	}

	#[test]
	fn test_canonical_query_empty() {
		assert_eq!(canonical_query(&[]), "");
	}

	#[test]
	fn test_with_query_replaces_existing_key() {
		let request = RequestDescriptor::new(Method::Get, "/devices")
			.with_query("a", "1")
			.with_query("b", "2")
			.with_query("a", "3");
		assert_eq!(
			request.query(),
			&[
				("a".to_string(), "3".to_string()),
				("b".to_string(), "2".to_string())
			]
		);
	}

	#[test]
	fn test_content_md5() {
		assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
		assert_eq!(content_md5(b"hello world"), "XrY7u+Ae7tCTyyK7j1rNww==");
	}

	#[test]
	fn test_hmac_sha1_rfc2202() {
		let signature = hmac_sha1(b"Jefe", b"what do ya want for nothing?").unwrap();
		assert_eq!(signature, "7/zfauXrL6LSdBbV8YTfnCWafHk=");
	}

	#[test]
	fn test_string_to_sign_keeps_empty_fields() {
		let canonical = CanonicalRequest {
			method: Method::Get,
			path: "/api/open/devices",
			query: String::new(),
			content_type: "",
			content_md5: "",
			timestamp: TIMESTAMP,
		};
		let s = canonical.string_to_sign("appSecret");
		assert_eq!(s, "GET\n/api/open/devices\n\n\n\n1630462250000\nappSecret");
		assert_eq!(s.matches('\n').count(), 6);
	}

	#[test]
	fn test_sign_get_devices() {
		let mut request = RequestDescriptor::new(Method::Get, "/api/open/devices")
			.with_query("test_station_id", "67")
			.with_query("qrcode", "20210901103050484");

		let artifact = signer().sign_at(&mut request, TIMESTAMP).unwrap();

		assert_eq!(artifact.content_digest, "");
		assert_eq!(artifact.signature, "rvX18CvFjEvDP6ue8YY8m02K7XY=");
		assert_eq!(artifact.app_key, "appKey");
		assert_eq!(artifact.timestamp, TIMESTAMP);
	}

	#[test]
	fn test_get_and_delete_ignore_body() {
		for method in [Method::Get, Method::Delete] {
			let mut request =
				RequestDescriptor::new(method, "/api/open/devices").with_body(b"ignored".to_vec());
			let artifact = signer().sign_at(&mut request, TIMESTAMP).unwrap();
			assert_eq!(artifact.content_digest, "");
		}
	}

	#[test]
	fn test_get_does_not_drain_reader_body() {
		let mut request = RequestDescriptor::new(Method::Get, "/api/open/devices")
			.with_body(RequestBody::from_reader(FailingReader));
		assert!(signer().sign_at(&mut request, TIMESTAMP).is_ok());
		assert!(request.body().and_then(RequestBody::as_bytes).is_none());
	}

	#[test]
	fn test_post_empty_body_digests_empty_bytes() {
		let signer = signer();
		let mut request = RequestDescriptor::new(Method::Post, "/api/open/instruments/100/ping")
			.with_body(Vec::new());

		let first = signer.sign_at(&mut request, TIMESTAMP).unwrap();
		let second = signer.sign_at(&mut request, TIMESTAMP).unwrap();

		assert_eq!(first.content_digest, "1B2M2Y8AsgTpgAmY7PhCfg==");
		assert_eq!(first, second);
		assert_eq!(first.signature, "mjhF7/BQ8ICZoATWBsGbAF79WRA=");
		assert!(request.body().and_then(RequestBody::as_bytes).unwrap().is_empty());
	}

	#[test]
	fn test_post_without_body_has_empty_digest() {
		let mut request = RequestDescriptor::new(Method::Put, "/api/open/devices/1");
		let artifact = signer().sign_at(&mut request, TIMESTAMP).unwrap();
		assert_eq!(artifact.content_digest, "");
	}

	#[test]
	fn test_post_reader_body_is_restored() {
		let payload = b"[{\"test_item_id\":10000,\"test_data\":[]}]".to_vec();
		let mut request = RequestDescriptor::new(Method::Post, "/api/open/devices/1/test_data")
			.with_content_type("application/json")
			.with_body(RequestBody::from_reader(io::Cursor::new(payload.clone())));

		let artifact = signer().sign_at(&mut request, TIMESTAMP).unwrap();

		assert_eq!(artifact.content_digest, content_md5(&payload));
		let body = request.take_body().unwrap();
		assert_eq!(body.as_bytes().unwrap().as_ref(), payload.as_slice());
	}

	#[test]
	fn test_body_read_failure_aborts_signing() {
		let mut request = RequestDescriptor::new(Method::Post, "/api/open/uploads")
			.with_body(RequestBody::from_reader(FailingReader));

		let err = signer().sign_at(&mut request, TIMESTAMP).unwrap_err();
		assert!(matches!(err, SigningError::BodyRead(_)));
	}

	#[test]
	fn test_signing_is_deterministic_and_time_sensitive() {
		let signer = signer();
		let build = || {
			RequestDescriptor::new(Method::Post, "/api/open/uploads")
				.with_content_type("multipart/form-data; boundary=X")
				.with_body(b"image bytes".to_vec())
		};

		let a = signer.sign_at(&mut build(), TIMESTAMP).unwrap();
		let b = signer.sign_at(&mut build(), TIMESTAMP).unwrap();
		let c = signer.sign_at(&mut build(), TIMESTAMP + 1).unwrap();

		assert_eq!(a.signature, b.signature);
		assert_ne!(a.signature, c.signature);
		assert_eq!(a.content_digest, content_md5(b"image bytes"));
	}

	#[test]
	fn test_sign_uses_current_time() {
		let before = chrono::Utc::now().timestamp_millis();
		let artifact = signer()
			.sign(&mut RequestDescriptor::new(Method::Get, "/api/open/devices"))
			.unwrap();
		let after = chrono::Utc::now().timestamp_millis();
		assert!(artifact.timestamp >= before && artifact.timestamp <= after);
	}

	#[test]
	fn test_artifact_headers() {
		let artifact = SignatureArtifact {
			timestamp: TIMESTAMP,
			content_digest: String::new(),
			signature: "sig".to_string(),
			app_key: "appKey".to_string(),
		};
		assert_eq!(
			artifact.headers(),
			[
				(HEADER_APP_KEY, "appKey".to_string()),
				(HEADER_TIMESTAMP, "1630462250000".to_string()),
				(HEADER_SIGNATURE, "sig".to_string()),
			]
		);
	}

	#[test]
	fn test_credentials_debug_redacts_secret() {
		let debug = format!("{:?}", Credentials::new("appKey", "appSecret"));
		assert!(debug.contains("appKey"));
		assert!(!debug.contains("appSecret"));
	}
}
