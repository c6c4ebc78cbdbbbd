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

//! MES SDK - Client library for the MES open API
//!
//! This crate provides signed access to the open API endpoints (device
//! lookup, test-data submission, image upload, instrument heartbeat) and the
//! request-signing scheme they share.
//!
//! The SDK is designed to be lightweight and embeddable:
//! - No background threads
//! - No runtime initialization
//! - No environment or configuration loading

pub mod client;
pub mod multipart;
pub mod signing;
pub mod types;

pub use client::{Client, ClientConfig, ClientError, SyncClient};
pub use signing::{
	Credentials, Method, RequestBody, RequestDescriptor, SignatureArtifact, Signer, SigningError,
};
pub use types::*;
