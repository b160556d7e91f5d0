use serde::{Deserialize, Serialize};

/// Ingest payload. `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub amount: f64,
    pub timestamp: i64,
}

impl Transaction {
    pub fn new(amount: f64, timestamp: i64) -> Self {
        Self { amount, timestamp }
    }
}
