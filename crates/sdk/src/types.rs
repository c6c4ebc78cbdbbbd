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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One test-result record submitted for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDataRecord {
	/// Test item identifier
	pub test_item_id: i64,
	/// Free-form measurement rows
	#[serde(default)]
	pub test_data: Vec<Map<String, Value>>,
	/// Any additional fields, passed through untouched
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl TestDataRecord {
	pub fn new(test_item_id: i64) -> Self {
		Self {
			test_item_id,
			test_data: Vec::new(),
			extra: Map::new(),
		}
	}

	/// Append one measurement row
	pub fn with_row(mut self, row: Map<String, Value>) -> Self {
		self.test_data.push(row);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_record_serialization() {
		let row = json!({"item1": 1, "item2": "2", "item3": true});
		let record = TestDataRecord::new(10000).with_row(row.as_object().unwrap().clone());

		let value = serde_json::to_value(vec![record]).unwrap();
		assert_eq!(
			value,
			json!([{"test_item_id": 10000, "test_data": [{"item1": 1, "item2": "2", "item3": true}]}])
		);
	}

	#[test]
	fn test_extra_fields_survive() {
		let input = json!({"test_item_id": 7, "test_data": [], "operator": "li"});
		let record: TestDataRecord = serde_json::from_value(input.clone()).unwrap();

		assert_eq!(record.extra.get("operator"), Some(&json!("li")));
		assert_eq!(serde_json::to_value(&record).unwrap(), input);
	}
}
