use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BusMessage;

/// One dispatched message, in dispatch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "M: BusMessage"))]
pub struct HistoryEntry<M> {
    pub name: String,
    pub message: M,
    pub recorded_at: DateTime<Utc>,
}

impl<M: BusMessage> HistoryEntry<M> {
    pub fn new(message: M) -> Self {
        Self {
            name: message.name().to_string(),
            message,
            recorded_at: Utc::now(),
        }
    }
}
