//! Bundle Types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// STIX 2.1 bundle: `{"type":"bundle","id":"bundle--<uuid4>","objects":[...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub id: String,
    pub objects: Vec<Value>,
}

impl Bundle {
    pub fn new(objects: Vec<Value>) -> Self {
        Self {
            bundle_type: "bundle".to_string(),
            id: format!("bundle--{}", Uuid::new_v4()),
            objects,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Ids of the contained objects, in order
    pub fn object_ids(&self) -> Vec<&str> {
        self.objects
            .iter()
            .filter_map(|o| o.get("id").and_then(Value::as_str))
            .collect()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One object refused by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub id: String,
    pub reason: String,
}

/// Platform acknowledgement of one bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAck {
    pub accepted: usize,
    #[serde(default)]
    pub rejected: Vec<Rejection>,
}

/// Outcome of one dispatched batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub index: usize,
    pub bundle_id: String,
    pub submitted: usize,
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
    /// Durable failure of the whole batch
    pub error: Option<String>,
}

impl BatchResult {
    pub fn dispatched(&self) -> bool {
        self.error.is_none()
    }
}

/// All batch results of one emission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmitReport {
    pub batches: Vec<BatchResult>,
}

impl EmitReport {
    /// True when every batch reached the platform (per-object rejections allowed)
    pub fn fully_dispatched(&self) -> bool {
        self.batches.iter().all(BatchResult::dispatched)
    }

    pub fn accepted(&self) -> usize {
        self.batches.iter().map(|b| b.accepted).sum()
    }

    pub fn rejected(&self) -> usize {
        self.batches.iter().map(|b| b.rejected.len()).sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.batches.iter().filter(|b| !b.dispatched()).count()
    }
}
