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

//! Buffered `multipart/form-data` encoding
//!
//! Uploads are signed over the exact body bytes, so the form is encoded into
//! memory up front instead of being streamed by the HTTP client.

use bytes::Bytes;
use uuid::Uuid;

/// In-memory multipart form builder
#[derive(Debug, Clone)]
pub struct MultipartForm {
	boundary: String,
	body: Vec<u8>,
}

impl Default for MultipartForm {
	fn default() -> Self {
		Self::new()
	}
}

impl MultipartForm {
	/// Create a form with a random boundary
	pub fn new() -> Self {
		Self::with_boundary(Uuid::new_v4().simple().to_string())
	}

	pub fn with_boundary(boundary: impl Into<String>) -> Self {
		Self {
			boundary: boundary.into(),
			body: Vec::new(),
		}
	}

	pub fn boundary(&self) -> &str {
		&self.boundary
	}

	/// `Content-Type` header value for this form
	pub fn content_type(&self) -> String {
		format!("multipart/form-data; boundary={}", self.boundary)
	}

	/// Append a plain text field
	pub fn text(mut self, name: &str, value: &str) -> Self {
		let disposition = format!("form-data; name=\"{}\"", escape_quotes(name));
		self.push_part(&disposition, None, value.as_bytes());
		self
	}

	/// Append a file field
	pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
		let disposition = format!(
			"form-data; name=\"{}\"; filename=\"{}\"",
			escape_quotes(name),
			escape_quotes(filename)
		);
		self.push_part(&disposition, Some("application/octet-stream"), data);
		self
	}

	/// Close the form, returning the content type and the encoded body
	pub fn finish(mut self) -> (String, Bytes) {
		let content_type = self.content_type();
		self.body.extend_from_slice(b"--");
		self.body.extend_from_slice(self.boundary.as_bytes());
		self.body.extend_from_slice(b"--\r\n");
		(content_type, Bytes::from(self.body))
	}

	fn push_part(&mut self, disposition: &str, content_type: Option<&str>, data: &[u8]) {
		self.body.extend_from_slice(b"--");
		self.body.extend_from_slice(self.boundary.as_bytes());
		self.body.extend_from_slice(b"\r\nContent-Disposition: ");
		self.body.extend_from_slice(disposition.as_bytes());
		self.body.extend_from_slice(b"\r\n");
		if let Some(content_type) = content_type {
			self.body.extend_from_slice(b"Content-Type: ");
			self.body.extend_from_slice(content_type.as_bytes());
			self.body.extend_from_slice(b"\r\n");
		}
		self.body.extend_from_slice(b"\r\n");
		self.body.extend_from_slice(data);
		self.body.extend_from_slice(b"\r\n");
	}
}

fn escape_quotes(s: &str) -> String {
	s.replace('\\', "\\\\").replace('"', "\\\"")
}
